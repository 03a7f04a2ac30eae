//! In-memory [`ObjectStore`] for tests and offline use.
//!
//! Objects live in a `HashMap` behind `std::sync::RwLock`. Version tokens
//! are generated from a monotonic counter, so every write produces a fresh
//! token and conditional-write semantics match the real store: a write over
//! an existing object requires its current token, a write creating a new
//! object must carry none.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;

use super::{FetchedObject, ObjectStore, PutReceipt, VersionToken};
use crate::error::{Error, Result};

struct StoredObject {
    bytes: Vec<u8>,
    token: VersionToken,
}

pub struct MemoryStore {
    objects: RwLock<HashMap<String, StoredObject>>,
    counter: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore {
            objects: RwLock::new(HashMap::new()),
            counter: AtomicU64::new(0),
        }
    }

    fn next_token(&self) -> VersionToken {
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        VersionToken(format!("v{}", n))
    }

    /// Whether an object exists at `path`.
    pub fn contains(&self, path: &str) -> bool {
        self.objects.read().unwrap().contains_key(path)
    }

    /// Raw bytes at `path`, if present.
    pub fn object_bytes(&self, path: &str) -> Option<Vec<u8>> {
        self.objects
            .read()
            .unwrap()
            .get(path)
            .map(|o| o.bytes.clone())
    }

    /// Full snapshot of paths and contents, sorted by path. Used by tests to
    /// assert that a declined workflow left the store byte-identical.
    pub fn snapshot(&self) -> Vec<(String, Vec<u8>)> {
        let mut entries: Vec<(String, Vec<u8>)> = self
            .objects
            .read()
            .unwrap()
            .iter()
            .map(|(path, obj)| (path.clone(), obj.bytes.clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn get_object(&self, path: &str) -> Result<Option<FetchedObject>> {
        Ok(self.objects.read().unwrap().get(path).map(|o| FetchedObject {
            bytes: o.bytes.clone(),
            token: o.token.clone(),
        }))
    }

    async fn put_object(
        &self,
        path: &str,
        bytes: &[u8],
        _message: &str,
        expected: Option<&VersionToken>,
    ) -> Result<PutReceipt> {
        let token = self.next_token();
        let mut objects = self.objects.write().unwrap();
        match (objects.get(path), expected) {
            (Some(current), Some(expected)) if current.token == *expected => {}
            (None, None) => {}
            _ => return Err(Error::Conflict(path.to_string())),
        }
        objects.insert(
            path.to_string(),
            StoredObject {
                bytes: bytes.to_vec(),
                token: token.clone(),
            },
        );
        Ok(PutReceipt {
            token,
            download_url: format!("memory://{}", path),
        })
    }

    async fn delete_object(&self, path: &str, _message: &str, token: &VersionToken) -> Result<()> {
        let mut objects = self.objects.write().unwrap();
        match objects.get(path) {
            None => Err(Error::NotFound(path.to_string())),
            Some(current) if current.token != *token => Err(Error::Conflict(path.to_string())),
            Some(_) => {
                objects.remove(path);
                Ok(())
            }
        }
    }
}
