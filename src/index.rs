//! The document index and its synchronizer.
//!
//! The index is a single JSON array of [`Document`] records stored at
//! `{base}/index.json`. Every mutation is read-modify-write under the
//! index's version token, so concurrent writers surface as conflicts rather
//! than silently clobbering each other. Identity for upsert purposes is the
//! stored filename; a matching filename replaces the existing entry in place.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::store::{join_path, ObjectStore, VersionToken};
use crate::tokenize::token_set;

/// Review status of a catalog entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocStatus {
    Draft,
    #[serde(rename = "under review")]
    UnderReview,
    Approved,
    Final,
    Archived,
}

impl std::fmt::Display for DocStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            DocStatus::Draft => "draft",
            DocStatus::UnderReview => "under review",
            DocStatus::Approved => "approved",
            DocStatus::Final => "final",
            DocStatus::Archived => "archived",
        };
        f.write_str(label)
    }
}

impl std::str::FromStr for DocStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "draft" => Ok(DocStatus::Draft),
            "under review" | "under-review" => Ok(DocStatus::UnderReview),
            "approved" => Ok(DocStatus::Approved),
            "final" => Ok(DocStatus::Final),
            "archived" => Ok(DocStatus::Archived),
            other => Err(Error::Validation(format!("unknown status: {}", other))),
        }
    }
}

impl Default for DocStatus {
    fn default() -> Self {
        DocStatus::Draft
    }
}

/// One catalog entry as persisted in `index.json`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    /// Slug identifier, also the blob file stem under `docs/`.
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub meta: String,
    #[serde(default)]
    pub category: String,
    pub status: DocStatus,
    /// Original upload filename. Upsert identity.
    pub filename: String,
    #[serde(default)]
    pub url: String,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    #[serde(default)]
    pub summary: String,
    /// Sorted, deduplicated search tokens derived from the text fields.
    #[serde(default)]
    pub tokens: Vec<String>,
}

impl Document {
    /// Recompute the search token set from the document's text fields.
    pub fn rebuild_tokens(&mut self) {
        let combined = format!(
            "{} {} {} {} {} {}",
            self.title, self.description, self.meta, self.category, self.summary, self.filename
        );
        self.tokens = token_set(&combined);
    }
}

/// Canonical index order: newest first, title ascending on equal timestamps.
pub fn sort_index(documents: &mut [Document]) {
    documents.sort_by(|a, b| {
        b.last_updated
            .cmp(&a.last_updated)
            .then_with(|| a.title.cmp(&b.title))
    });
}

/// Read-modify-write access to the remote `index.json`.
pub struct IndexSynchronizer {
    store: Arc<dyn ObjectStore>,
    index_path: String,
}

impl IndexSynchronizer {
    pub fn new(store: Arc<dyn ObjectStore>, base_path: &str) -> Self {
        IndexSynchronizer {
            index_path: join_path(&[base_path, "index.json"]),
            store,
        }
    }

    pub fn index_path(&self) -> &str {
        &self.index_path
    }

    /// Current documents plus the token to write back under. An absent index
    /// is an empty catalog with no token (the first write creates it).
    async fn load(&self) -> Result<(Vec<Document>, Option<VersionToken>)> {
        match self.store.get_object(&self.index_path).await? {
            None => Ok((Vec::new(), None)),
            Some(fetched) => {
                let documents: Vec<Document> =
                    serde_json::from_slice(&fetched.bytes).map_err(|e| Error::Remote {
                        status: 200,
                        message: format!("index.json is not valid: {}", e),
                    })?;
                Ok((documents, Some(fetched.token)))
            }
        }
    }

    /// Fetch the catalog in canonical order.
    pub async fn fetch(&self) -> Result<Vec<Document>> {
        let (mut documents, _) = self.load().await?;
        sort_index(&mut documents);
        Ok(documents)
    }

    async fn write(
        &self,
        documents: &[Document],
        token: Option<&VersionToken>,
        message: &str,
    ) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(documents)
            .map_err(|e| Error::Pipeline(format!("index serialization failed: {}", e)))?;
        self.store
            .put_object(&self.index_path, &bytes, message, token)
            .await?;
        Ok(())
    }

    /// Insert or replace `doc`, keyed by filename. Tokens are rebuilt and the
    /// index re-sorted before the conditional write. Returns the updated
    /// catalog.
    pub async fn upsert(&self, mut doc: Document) -> Result<Vec<Document>> {
        doc.rebuild_tokens();
        let (mut documents, token) = self.load().await?;
        match documents
            .iter()
            .position(|existing| existing.filename == doc.filename)
        {
            Some(position) => documents[position] = doc.clone(),
            None => documents.push(doc.clone()),
        }
        sort_index(&mut documents);
        self.write(
            &documents,
            token.as_ref(),
            &format!("Update index for {}", doc.filename),
        )
        .await?;
        Ok(documents)
    }

    /// Remove the entry with `id`, if present. A missing id is a no-op with
    /// no write. Returns the updated catalog.
    pub async fn remove(&self, id: &str) -> Result<Vec<Document>> {
        let (mut documents, token) = self.load().await?;
        let before = documents.len();
        documents.retain(|doc| doc.id != id);
        if documents.len() == before {
            sort_index(&mut documents);
            return Ok(documents);
        }
        sort_index(&mut documents);
        self.write(
            &documents,
            token.as_ref(),
            &format!("Remove {} from index", id),
        )
        .await?;
        Ok(documents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use chrono::TimeZone;

    fn doc(id: &str, title: &str, filename: &str, updated: DateTime<Utc>) -> Document {
        Document {
            id: id.to_string(),
            title: title.to_string(),
            description: String::new(),
            meta: String::new(),
            category: String::new(),
            status: DocStatus::Draft,
            filename: filename.to_string(),
            url: String::new(),
            created_at: updated,
            last_updated: updated,
            summary: String::new(),
            tokens: Vec::new(),
        }
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn status_round_trips_through_json() {
        let json = serde_json::to_string(&DocStatus::UnderReview).unwrap();
        assert_eq!(json, "\"under review\"");
        let parsed: DocStatus = serde_json::from_str("\"under review\"").unwrap();
        assert_eq!(parsed, DocStatus::UnderReview);
        assert_eq!("FINAL".parse::<DocStatus>().unwrap(), DocStatus::Final);
        assert!("published".parse::<DocStatus>().is_err());
    }

    #[test]
    fn tokens_cover_all_text_fields() {
        let mut d = doc("q3-report", "Q3 Report", "Q3_Report.pdf", at(0));
        d.category = "Finance".to_string();
        d.summary = "Quarterly revenue overview".to_string();
        d.rebuild_tokens();
        for expected in ["q3", "report", "finance", "quarterly", "pdf"] {
            assert!(d.tokens.contains(&expected.to_string()), "{}", expected);
        }
        let mut sorted = d.tokens.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(d.tokens, sorted);
    }

    #[test]
    fn sort_is_newest_first_title_tiebreak() {
        let mut docs = vec![
            doc("a", "Beta", "b.txt", at(100)),
            doc("b", "Alpha", "a.txt", at(100)),
            doc("c", "Gamma", "c.txt", at(200)),
        ];
        sort_index(&mut docs);
        let titles: Vec<&str> = docs.iter().map(|d| d.title.as_str()).collect();
        assert_eq!(titles, vec!["Gamma", "Alpha", "Beta"]);
    }

    #[tokio::test]
    async fn absent_index_reads_as_empty_catalog() {
        let store = Arc::new(MemoryStore::new());
        let index = IndexSynchronizer::new(store, "acme/catalog");
        assert!(index.fetch().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn upsert_creates_then_replaces_by_filename() {
        let store = Arc::new(MemoryStore::new());
        let index = IndexSynchronizer::new(Arc::clone(&store) as Arc<dyn ObjectStore>, "acme/catalog");

        let first = doc("guide", "Guide", "guide.pdf", at(100));
        let documents = index.upsert(first).await.unwrap();
        assert_eq!(documents.len(), 1);

        let mut replacement = doc("guide", "Guide v2", "guide.pdf", at(200));
        replacement.summary = "revised".to_string();
        let documents = index.upsert(replacement).await.unwrap();
        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].title, "Guide v2");
        assert!(documents[0].tokens.contains(&"revised".to_string()));
    }

    #[tokio::test]
    async fn corrupt_index_surfaces_as_remote_error() {
        let store = Arc::new(MemoryStore::new());
        store
            .put_object("acme/catalog/index.json", b"not json", "seed", None)
            .await
            .unwrap();
        let index = IndexSynchronizer::new(Arc::clone(&store) as Arc<dyn ObjectStore>, "acme/catalog");
        let err = index.fetch().await.unwrap_err();
        assert!(matches!(err, Error::Remote { status: 200, .. }));
    }

    #[tokio::test]
    async fn remove_missing_id_writes_nothing() {
        let store = Arc::new(MemoryStore::new());
        let index = IndexSynchronizer::new(Arc::clone(&store) as Arc<dyn ObjectStore>, "acme/catalog");
        index
            .upsert(doc("keep", "Keep", "keep.txt", at(1)))
            .await
            .unwrap();
        let snapshot = store.snapshot();
        let documents = index.remove("absent").await.unwrap();
        assert_eq!(documents.len(), 1);
        assert_eq!(store.snapshot(), snapshot);
    }

    #[tokio::test]
    async fn remove_deletes_only_the_target() {
        let store = Arc::new(MemoryStore::new());
        let index = IndexSynchronizer::new(Arc::clone(&store) as Arc<dyn ObjectStore>, "acme/catalog");
        index
            .upsert(doc("one", "One", "one.txt", at(1)))
            .await
            .unwrap();
        index
            .upsert(doc("two", "Two", "two.txt", at(2)))
            .await
            .unwrap();
        let documents = index.remove("one").await.unwrap();
        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].id, "two");
    }
}
