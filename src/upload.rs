//! Upload and delete workflows over the content store.
//!
//! [`UploadCoordinator`] owns the observable workflow state (document list,
//! stage, progress, saving flag) and orchestrates the full submission:
//! validate, confirm, enrich, upload the blob, write the metadata sidecar,
//! update the index. Replacing an existing document and deleting one ask the
//! confirmation gate before any remote mutation, so declining leaves the
//! store untouched; a fresh upload is not gated. Submissions are
//! single-flight: a second submit while one is running is rejected, not
//! queued.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;

use crate::cell::{Disposer, ValueCell};
use crate::enrich::{EnrichmentPipeline, Stage};
use crate::error::{Error, Result};
use crate::extract::ContentKind;
use crate::index::{DocStatus, Document, IndexSynchronizer};
use crate::store::{join_path, ObjectStore, ProgressFn};
use crate::summarize::Summarizer;

/// A file picked for upload: its original name and raw contents.
#[derive(Clone, Debug)]
pub struct FileInput {
    pub name: String,
    pub bytes: Vec<u8>,
}

/// The editable submission form. Each field is an observable cell; the title
/// autofills from the picked file's name while the title is still empty.
pub struct UploadForm {
    pub file: ValueCell<Option<FileInput>>,
    pub title: ValueCell<String>,
    pub description: ValueCell<String>,
    pub category: ValueCell<String>,
    pub meta: ValueCell<String>,
    pub status: ValueCell<DocStatus>,
    autofill: Mutex<Option<Disposer>>,
}

impl UploadForm {
    pub fn new() -> Self {
        let file = ValueCell::new(None::<FileInput>);
        let title = ValueCell::new(String::new());
        let autofill = {
            let title = title.clone();
            file.subscribe(move |picked: &Option<FileInput>| {
                if let Some(picked) = picked {
                    if title.get().is_empty() {
                        title.set(file_stem(&picked.name).to_string());
                    }
                }
            })
        };
        UploadForm {
            file,
            title,
            description: ValueCell::new(String::new()),
            category: ValueCell::new(String::new()),
            meta: ValueCell::new(String::new()),
            status: ValueCell::new(DocStatus::Draft),
            autofill: Mutex::new(Some(autofill)),
        }
    }

    /// Detach the title autofill. Call when the form goes away.
    pub fn teardown(&self) {
        if let Some(disposer) = self.autofill.lock().unwrap().take() {
            disposer.dispose();
        }
    }
}

impl Default for UploadForm {
    fn default() -> Self {
        Self::new()
    }
}

/// Yes/no confirmation before a mutating workflow proceeds.
#[async_trait]
pub trait ConfirmGate: Send + Sync {
    async fn confirm(&self, message: &str) -> bool;
}

/// Fixed-answer gate for non-interactive use and tests.
pub struct AutoConfirm(pub bool);

#[async_trait]
impl ConfirmGate for AutoConfirm {
    async fn confirm(&self, _message: &str) -> bool {
        self.0
    }
}

/// Outcome of a submission attempt.
#[derive(Clone, Debug)]
pub enum UploadOutcome {
    /// The workflow ran to completion; this is the stored index entry.
    Completed(Document),
    /// The confirmation gate declined; nothing was written.
    Declined,
    /// Another submission is in flight.
    AlreadyRunning,
}

/// Outcome of a delete attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeleteOutcome {
    Completed,
    Declined,
    AlreadyRunning,
}

/// Blob transfer progress in bytes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Progress {
    pub transferred: u64,
    pub total: u64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MetaRecord<'a> {
    title: &'a str,
    path: &'a str,
    summary: &'a str,
}

pub struct UploadCoordinator {
    store: Arc<dyn ObjectStore>,
    index: IndexSynchronizer,
    pipeline: EnrichmentPipeline,
    gate: Arc<dyn ConfirmGate>,
    base_path: String,
    busy: AtomicBool,
    documents: ValueCell<Vec<Document>>,
    stage: ValueCell<Stage>,
    progress: ValueCell<Progress>,
    saving: ValueCell<bool>,
}

impl UploadCoordinator {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        summarizer: Arc<dyn Summarizer>,
        gate: Arc<dyn ConfirmGate>,
        base_path: &str,
        max_excerpt_chars: usize,
    ) -> Self {
        let stage = ValueCell::new(Stage::Idle);
        UploadCoordinator {
            index: IndexSynchronizer::new(Arc::clone(&store), base_path),
            pipeline: EnrichmentPipeline::new(summarizer, stage.clone(), max_excerpt_chars),
            store,
            gate,
            base_path: base_path.to_string(),
            busy: AtomicBool::new(false),
            documents: ValueCell::new(Vec::new()),
            stage,
            progress: ValueCell::new(Progress::default()),
            saving: ValueCell::new(false),
        }
    }

    /// The observable catalog. Updated after every completed workflow.
    pub fn documents(&self) -> ValueCell<Vec<Document>> {
        self.documents.clone()
    }

    pub fn stage(&self) -> ValueCell<Stage> {
        self.stage.clone()
    }

    pub fn progress(&self) -> ValueCell<Progress> {
        self.progress.clone()
    }

    /// True while a submission or delete is running.
    pub fn saving(&self) -> ValueCell<bool> {
        self.saving.clone()
    }

    fn blob_path(&self, id: &str, extension: &str) -> String {
        join_path(&[&self.base_path, "docs", &format!("{}{}", id, extension)])
    }

    fn meta_path(&self, id: &str) -> String {
        join_path(&[&self.base_path, "meta", &format!("{}.json", id)])
    }

    /// Create the `docs/` and `meta/` placeholder objects if absent, so the
    /// store layout exists before the first upload.
    pub async fn ensure_layout(&self) -> Result<()> {
        for dir in ["docs", "meta"] {
            let path = join_path(&[&self.base_path, dir, ".gitkeep"]);
            if self.store.get_object(&path).await?.is_none() {
                self.store
                    .put_object(&path, b"", &format!("Create {} directory", dir), None)
                    .await?;
            }
        }
        Ok(())
    }

    /// Populate the document list from the remote index.
    pub async fn hydrate(&self) -> Result<()> {
        let documents = self.index.fetch().await?;
        self.documents.set(documents);
        Ok(())
    }

    /// Run the full submission workflow. Whatever the outcome, the saving
    /// flag, stage, and progress are reset before returning.
    pub async fn submit(&self, form: &UploadForm) -> Result<UploadOutcome> {
        if self.busy.swap(true, Ordering::SeqCst) {
            return Ok(UploadOutcome::AlreadyRunning);
        }
        self.saving.set(true);
        let result = self.run_submit(form).await;
        self.saving.set(false);
        self.stage.set(Stage::Idle);
        self.progress.set(Progress::default());
        self.busy.store(false, Ordering::SeqCst);
        result
    }

    async fn run_submit(&self, form: &UploadForm) -> Result<UploadOutcome> {
        let file = form
            .file
            .get()
            .ok_or_else(|| Error::Validation("no file selected".to_string()))?;
        let title = form.title.get();
        if title.trim().is_empty() {
            return Err(Error::Validation("title must not be empty".to_string()));
        }

        let existing = self
            .documents
            .get()
            .into_iter()
            .find(|doc| doc.filename == file.name);

        // Only a replacement is destructive, so only a replacement asks the
        // gate. A fresh upload proceeds directly.
        if let Some(doc) = &existing {
            if !self
                .gate
                .confirm(&format!("Replace \"{}\"?", doc.filename))
                .await
            {
                return Ok(UploadOutcome::Declined);
            }
        }

        let kind = ContentKind::from_filename(&file.name);
        let extension = file_extension(&file.name);

        // A replacement keeps the existing id; the blob write is conditional
        // on the blob's current token. A new document gets a fresh slug.
        let (id, blob_token) = match &existing {
            Some(doc) => {
                let path = self.blob_path(&doc.id, &extension);
                let token = self.store.get_object(&path).await?.map(|f| f.token);
                (doc.id.clone(), token)
            }
            None => (self.resolve_slug(&title, &extension).await?, None),
        };

        let enrichment = self.pipeline.run(file.bytes.clone(), kind).await?;

        self.stage.set(Stage::Uploading);
        let progress_cell = self.progress.clone();
        let report: ProgressFn = Arc::new(move |transferred, total| {
            progress_cell.set(Progress { transferred, total });
        });
        let blob_path = self.blob_path(&id, &extension);
        let receipt = self
            .store
            .put_object_with_progress(
                &blob_path,
                &file.bytes,
                &format!("Upload {}", file.name),
                blob_token.as_ref(),
                report,
            )
            .await?;

        let meta_path = self.meta_path(&id);
        let meta_token = self.store.get_object(&meta_path).await?.map(|f| f.token);
        let meta = MetaRecord {
            title: &title,
            path: &blob_path,
            summary: &enrichment.summary,
        };
        let meta_bytes = serde_json::to_vec_pretty(&meta)
            .map_err(|e| Error::Pipeline(format!("metadata serialization failed: {}", e)))?;
        self.store
            .put_object(
                &meta_path,
                &meta_bytes,
                &format!("Update metadata for {}", id),
                meta_token.as_ref(),
            )
            .await?;

        self.stage.set(Stage::Indexing);
        let now = Utc::now();
        let document = Document {
            id: id.clone(),
            title,
            description: form.description.get(),
            meta: form.meta.get(),
            category: form.category.get(),
            status: form.status.get(),
            filename: file.name.clone(),
            url: receipt.download_url,
            created_at: existing.as_ref().map(|doc| doc.created_at).unwrap_or(now),
            last_updated: now,
            summary: enrichment.summary,
            tokens: Vec::new(),
        };
        let updated = self.index.upsert(document).await?;
        let stored = updated
            .iter()
            .find(|doc| doc.id == id)
            .cloned()
            .ok_or_else(|| Error::Pipeline("updated index is missing the stored entry".to_string()))?;
        self.documents.set(updated);
        Ok(UploadOutcome::Completed(stored))
    }

    /// Slug for a new document: slugified title, then `-2`, `-3`, … probed
    /// sequentially until a free slot is found. A candidate is taken when any
    /// index entry already uses it as its id, or when a blob or metadata
    /// object for it exists. The blob namespace alone is not enough: blobs
    /// keep their upload extension, so `docs/{slug}.md` being free says
    /// nothing about `{slug}` held by a `.txt` upload.
    async fn resolve_slug(&self, title: &str, extension: &str) -> Result<String> {
        let documents = self.documents.get();
        let base = slugify(title);
        let mut candidate = base.clone();
        let mut n = 2u32;
        loop {
            let taken = documents.iter().any(|doc| doc.id == candidate)
                || self
                    .store
                    .get_object(&self.blob_path(&candidate, extension))
                    .await?
                    .is_some()
                || self
                    .store
                    .get_object(&self.meta_path(&candidate))
                    .await?
                    .is_some();
            if !taken {
                return Ok(candidate);
            }
            candidate = format!("{}-{}", base, n);
            n += 1;
        }
    }

    /// Delete a document's three objects: blob, metadata sidecar, index
    /// entry, in that order. The index write is last, so a partial failure
    /// leaves the entry visible rather than orphaned-invisible.
    pub async fn delete(&self, id: &str) -> Result<DeleteOutcome> {
        if self.busy.swap(true, Ordering::SeqCst) {
            return Ok(DeleteOutcome::AlreadyRunning);
        }
        self.saving.set(true);
        let result = self.run_delete(id).await;
        self.saving.set(false);
        self.busy.store(false, Ordering::SeqCst);
        result
    }

    async fn run_delete(&self, id: &str) -> Result<DeleteOutcome> {
        let doc = self
            .documents
            .get()
            .into_iter()
            .find(|doc| doc.id == id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;

        if !self
            .gate
            .confirm(&format!("Delete \"{}\"?", doc.filename))
            .await
        {
            return Ok(DeleteOutcome::Declined);
        }

        let blob_path = self.blob_path(id, &file_extension(&doc.filename));
        if let Some(blob) = self.store.get_object(&blob_path).await? {
            self.store
                .delete_object(&blob_path, &format!("Delete {}", doc.filename), &blob.token)
                .await?;
        }

        let meta_path = self.meta_path(id);
        if let Some(meta) = self.store.get_object(&meta_path).await? {
            self.store
                .delete_object(&meta_path, &format!("Delete metadata for {}", id), &meta.token)
                .await?;
        }

        let updated = self.index.remove(id).await?;
        self.documents.set(updated);
        Ok(DeleteOutcome::Completed)
    }
}

/// Lowercased, hyphen-separated identifier derived from a title. Runs of
/// non-alphanumeric characters collapse to one hyphen; an empty result
/// falls back to `document`.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_hyphen = false;
    for c in title.chars() {
        if c.is_alphanumeric() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.extend(c.to_lowercase());
        } else {
            pending_hyphen = true;
        }
    }
    if slug.is_empty() {
        "document".to_string()
    } else {
        slug
    }
}

/// Extension including the dot, or empty when the name has none.
fn file_extension(name: &str) -> String {
    match name.rfind('.') {
        Some(idx) if idx > 0 => name[idx..].to_ascii_lowercase(),
        _ => String::new(),
    }
}

/// Name with its extension stripped.
fn file_stem(name: &str) -> &str {
    match name.rfind('.') {
        Some(idx) if idx > 0 => &name[..idx],
        _ => name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_collapses_and_trims() {
        assert_eq!(slugify("Q3 Financial Report"), "q3-financial-report");
        assert_eq!(slugify("  --Weird__ Title!!  "), "weird-title");
        assert_eq!(slugify("???"), "document");
        assert_eq!(slugify("Ünïcode Títle"), "ünïcode-títle");
    }

    #[test]
    fn extension_and_stem_split() {
        assert_eq!(file_extension("Report.PDF"), ".pdf");
        assert_eq!(file_extension("archive.tar.gz"), ".gz");
        assert_eq!(file_extension("README"), "");
        assert_eq!(file_extension(".env"), "");
        assert_eq!(file_stem("Report.PDF"), "Report");
        assert_eq!(file_stem("README"), "README");
    }

    #[test]
    fn title_autofills_from_filename_until_edited() {
        let form = UploadForm::new();
        form.file.set(Some(FileInput {
            name: "quarterly_report.pdf".to_string(),
            bytes: Vec::new(),
        }));
        assert_eq!(form.title.get(), "quarterly_report");

        form.title.set("Quarterly Report".to_string());
        form.file.set(Some(FileInput {
            name: "other.txt".to_string(),
            bytes: Vec::new(),
        }));
        assert_eq!(form.title.get(), "Quarterly Report");
        form.teardown();
    }

    #[test]
    fn teardown_stops_autofill() {
        let form = UploadForm::new();
        form.teardown();
        form.file.set(Some(FileInput {
            name: "notes.txt".to_string(),
            bytes: Vec::new(),
        }));
        assert_eq!(form.title.get(), "");
    }
}
