//! Enrichment pipeline: extract text, then summarize.
//!
//! The pipeline reports its position through an observable [`Stage`] cell so
//! a front end can render progress. Stages are strictly ordered; a failure
//! in either step surfaces as [`Error::Pipeline`](crate::error::Error) and
//! the caller resets the stage.

use std::sync::Arc;

use crate::cell::ValueCell;
use crate::error::{Error, Result};
use crate::extract::{extract_text, ContentKind};
use crate::summarize::Summarizer;

/// Where a workflow currently is. `Idle` between runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Idle,
    Extracting,
    Summarizing,
    Uploading,
    Indexing,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Stage::Idle => "idle",
            Stage::Extracting => "extracting text",
            Stage::Summarizing => "summarizing",
            Stage::Uploading => "uploading",
            Stage::Indexing => "updating index",
        };
        f.write_str(label)
    }
}

/// Result of a pipeline run: the (truncated) extracted text and its summary.
/// The summary is empty when summarization is disabled.
#[derive(Clone, Debug, Default)]
pub struct Enrichment {
    pub excerpt: String,
    pub summary: String,
}

pub struct EnrichmentPipeline {
    summarizer: Arc<dyn Summarizer>,
    stage: ValueCell<Stage>,
    max_excerpt_chars: usize,
}

impl EnrichmentPipeline {
    pub fn new(
        summarizer: Arc<dyn Summarizer>,
        stage: ValueCell<Stage>,
        max_excerpt_chars: usize,
    ) -> Self {
        EnrichmentPipeline {
            summarizer,
            stage,
            max_excerpt_chars,
        }
    }

    /// Run extraction and (when enabled) summarization over `bytes`,
    /// reporting each stage through the stage cell. The stage is left at the
    /// last stage entered; the caller resets it to `Idle` when the workflow
    /// finishes or fails.
    pub async fn run(&self, bytes: Vec<u8>, kind: ContentKind) -> Result<Enrichment> {
        self.stage.set(Stage::Extracting);
        let text = tokio::task::spawn_blocking(move || extract_text(&bytes, kind))
            .await
            .map_err(|e| Error::Pipeline(format!("extraction task failed: {}", e)))??;
        let excerpt = truncate_chars(&text, self.max_excerpt_chars);

        if !self.summarizer.is_enabled() {
            return Ok(Enrichment {
                excerpt,
                summary: String::new(),
            });
        }

        self.stage.set(Stage::Summarizing);
        let summary = self
            .summarizer
            .summarize(&excerpt)
            .await
            .map_err(|e| Error::Pipeline(format!("summarization failed: {}", e)))?;
        Ok(Enrichment { excerpt, summary })
    }
}

/// Truncate to at most `max` characters, on a character boundary.
fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::summarize::DisabledSummarizer;
    use async_trait::async_trait;

    struct CannedSummarizer(String);

    #[async_trait]
    impl Summarizer for CannedSummarizer {
        fn is_enabled(&self) -> bool {
            true
        }
        async fn summarize(&self, _text: &str) -> Result<String> {
            Ok(self.0.clone())
        }
    }

    struct FailingSummarizer;

    #[async_trait]
    impl Summarizer for FailingSummarizer {
        fn is_enabled(&self) -> bool {
            true
        }
        async fn summarize(&self, _text: &str) -> Result<String> {
            Err(Error::Remote {
                status: 503,
                message: "model loading".to_string(),
            })
        }
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("short", 100), "short");
        assert_eq!(truncate_chars("", 10), "");
    }

    #[tokio::test]
    async fn disabled_summarizer_skips_summarizing_stage() {
        let stage = ValueCell::new(Stage::Idle);
        let seen = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let log = std::sync::Arc::clone(&seen);
        let _d = stage.subscribe(move |s| log.lock().unwrap().push(*s));

        let pipeline = EnrichmentPipeline::new(Arc::new(DisabledSummarizer), stage, 4000);
        let enriched = pipeline
            .run(b"plain body".to_vec(), ContentKind::PlainText)
            .await
            .unwrap();
        assert_eq!(enriched.excerpt, "plain body");
        assert_eq!(enriched.summary, "");
        assert_eq!(*seen.lock().unwrap(), vec![Stage::Idle, Stage::Extracting]);
    }

    #[tokio::test]
    async fn enabled_summarizer_runs_both_stages() {
        let stage = ValueCell::new(Stage::Idle);
        let pipeline = EnrichmentPipeline::new(
            Arc::new(CannedSummarizer("a digest".to_string())),
            stage.clone(),
            4000,
        );
        let enriched = pipeline
            .run(b"full text".to_vec(), ContentKind::PlainText)
            .await
            .unwrap();
        assert_eq!(enriched.summary, "a digest");
        assert_eq!(stage.get(), Stage::Summarizing);
    }

    #[tokio::test]
    async fn excerpt_is_truncated_before_summarization() {
        let stage = ValueCell::new(Stage::Idle);
        let pipeline =
            EnrichmentPipeline::new(Arc::new(CannedSummarizer(String::new())), stage, 5);
        let enriched = pipeline
            .run(b"0123456789".to_vec(), ContentKind::PlainText)
            .await
            .unwrap();
        assert_eq!(enriched.excerpt, "01234");
    }

    #[tokio::test]
    async fn summarizer_failure_is_a_pipeline_error() {
        let stage = ValueCell::new(Stage::Idle);
        let pipeline = EnrichmentPipeline::new(Arc::new(FailingSummarizer), stage, 4000);
        let err = pipeline
            .run(b"text".to_vec(), ContentKind::PlainText)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Pipeline(_)));
    }
}
