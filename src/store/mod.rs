//! Remote content store abstraction.
//!
//! The [`ObjectStore`] trait is the seam between workflows and the wire:
//! [`http::HttpStore`] talks to the real content store API, while
//! [`memory::MemoryStore`] backs tests and offline use. All writes are
//! conditional on a [`VersionToken`] — the store's optimistic-concurrency
//! primitive.

pub mod http;
pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{Error, Result};

/// Opaque compare-and-swap precondition returned by the store alongside
/// every read and write. Compared only by equality; never parsed or
/// constructed by calling code.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionToken(pub(crate) String);

/// An object read from the store.
#[derive(Clone, Debug)]
pub struct FetchedObject {
    pub bytes: Vec<u8>,
    pub token: VersionToken,
}

/// Receipt for a successful write.
#[derive(Clone, Debug)]
pub struct PutReceipt {
    pub token: VersionToken,
    pub download_url: String,
}

/// Progress callback: `(bytes_transferred, bytes_total)`.
pub type ProgressFn = Arc<dyn Fn(u64, u64) + Send + Sync>;

/// Remote object store operations.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch an object. Absence (404) is a valid result, not an error.
    async fn get_object(&self, path: &str) -> Result<Option<FetchedObject>>;

    /// Write an object. When `expected` is supplied the write fails with
    /// [`Error::Conflict`] unless the remote's current token matches.
    async fn put_object(
        &self,
        path: &str,
        bytes: &[u8],
        message: &str,
        expected: Option<&VersionToken>,
    ) -> Result<PutReceipt>;

    /// Like [`put_object`](ObjectStore::put_object), reporting transfer
    /// progress. The wire format carries the body as a single JSON document,
    /// so progress is coarse: start and completion.
    async fn put_object_with_progress(
        &self,
        path: &str,
        bytes: &[u8],
        message: &str,
        expected: Option<&VersionToken>,
        progress: ProgressFn,
    ) -> Result<PutReceipt> {
        let total = bytes.len() as u64;
        progress(0, total);
        let receipt = self.put_object(path, bytes, message, expected).await?;
        progress(total, total);
        Ok(receipt)
    }

    /// Delete an object. Requires the current token; the target must exist.
    async fn delete_object(&self, path: &str, message: &str, token: &VersionToken) -> Result<()>;
}

/// Join path segments, dropping empty segments and duplicate separators.
pub fn join_path(segments: &[&str]) -> String {
    segments
        .iter()
        .flat_map(|segment| segment.split('/'))
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// Bounded-retry policy shared by the HTTP store and the summarizer client.
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles per attempt, capped at 2^5.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    fn backoff(&self, attempt: u32) -> Duration {
        // attempt >= 1: exponential, capped
        self.base_delay * (1u32 << (attempt - 1).min(5))
    }
}

/// Run `op` under the retry policy. Transient errors (network, 5xx, 429) are
/// retried with exponential backoff; everything else fails immediately.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut last_err = None;
    for attempt in 0..policy.max_attempts {
        if attempt > 0 {
            tokio::time::sleep(policy.backoff(attempt)).await;
        }
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() => last_err = Some(e),
            Err(e) => return Err(e),
        }
    }
    Err(last_err.unwrap_or_else(|| Error::Network("retries exhausted".to_string())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn join_path_drops_empty_segments() {
        assert_eq!(join_path(&["a", "b", "c"]), "a/b/c");
        assert_eq!(join_path(&["a/", "/b/", "", "c"]), "a/b/c");
        assert_eq!(join_path(&["", "docs", "x.pdf"]), "docs/x.pdf");
        assert_eq!(join_path(&["a//b", "c"]), "a/b/c");
        assert_eq!(join_path(&[]), "");
    }

    #[tokio::test(start_paused = true)]
    async fn retry_succeeds_on_third_attempt() {
        let policy = RetryPolicy::default();
        let attempts = AtomicU32::new(0);
        let result = with_retry(&policy, || {
            let n = attempts.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if n < 3 {
                    Err(Error::Network(format!("attempt {} failed", n)))
                } else {
                    Ok(n)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 3);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_exhaustion_surfaces_last_error() {
        let policy = RetryPolicy::default();
        let attempts = AtomicU32::new(0);
        let result: Result<()> = with_retry(&policy, || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async {
                Err(Error::Remote {
                    status: 503,
                    message: "unavailable".to_string(),
                })
            }
        })
        .await;
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert!(matches!(result, Err(Error::Remote { status: 503, .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn non_retryable_error_fails_immediately() {
        let policy = RetryPolicy::default();
        let attempts = AtomicU32::new(0);
        let result: Result<()> = with_retry(&policy, || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err(Error::Conflict("index.json".to_string())) }
        })
        .await;
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(Error::Conflict(_))));
    }
}
