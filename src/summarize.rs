//! Summarization service abstraction.
//!
//! [`HttpSummarizer`] calls a hosted summarization model
//! (`POST {inputs} → [{summary_text}]`) with the same bounded-retry policy
//! as the content store. [`DisabledSummarizer`] stands in when no credential
//! is configured: summarization is skipped and the summary stays empty —
//! a valid "feature disabled" state, not an error.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use crate::config::SummarizerConfig;
use crate::error::{Error, Result};
use crate::store::{with_retry, RetryPolicy};

#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Whether summarization is configured. When false the pipeline skips
    /// the summarizing stage entirely.
    fn is_enabled(&self) -> bool;

    async fn summarize(&self, text: &str) -> Result<String>;
}

/// No-credential stand-in: always disabled, summarizes to the empty string.
pub struct DisabledSummarizer;

#[async_trait]
impl Summarizer for DisabledSummarizer {
    fn is_enabled(&self) -> bool {
        false
    }

    async fn summarize(&self, _text: &str) -> Result<String> {
        Ok(String::new())
    }
}

pub struct HttpSummarizer {
    client: reqwest::Client,
    endpoint: String,
    credential: String,
    retry: RetryPolicy,
}

#[derive(Deserialize)]
struct SummaryItem {
    summary_text: String,
}

impl HttpSummarizer {
    pub fn new(
        endpoint: &str,
        credential: &str,
        retry: RetryPolicy,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Network(e.to_string()))?;
        Ok(HttpSummarizer {
            client,
            endpoint: endpoint.to_string(),
            credential: credential.to_string(),
            retry,
        })
    }

    async fn summarize_once(&self, text: &str) -> Result<String> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.credential)
            .json(&serde_json::json!({ "inputs": text }))
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(Error::Remote {
                status: status.as_u16(),
                message,
            });
        }

        let items: Vec<SummaryItem> = response
            .json()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;
        items
            .into_iter()
            .next()
            .map(|item| item.summary_text)
            .ok_or_else(|| Error::Remote {
                status: status.as_u16(),
                message: "summarization returned no candidates".to_string(),
            })
    }
}

#[async_trait]
impl Summarizer for HttpSummarizer {
    fn is_enabled(&self) -> bool {
        true
    }

    async fn summarize(&self, text: &str) -> Result<String> {
        with_retry(&self.retry, || self.summarize_once(text)).await
    }
}

/// Build the summarizer for the given configuration: HTTP-backed when a
/// credential is configured, disabled otherwise.
pub fn create_summarizer(
    config: &SummarizerConfig,
    retry: RetryPolicy,
    timeout: Duration,
) -> Result<Arc<dyn Summarizer>> {
    if !config.is_enabled() {
        return Ok(Arc::new(DisabledSummarizer));
    }
    let credential = config
        .credential()
        .map_err(|e| Error::Validation(e.to_string()))?;
    Ok(Arc::new(HttpSummarizer::new(
        &config.endpoint,
        &credential,
        retry,
        timeout,
    )?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn disabled_summarizer_returns_empty_summary() {
        let summarizer = DisabledSummarizer;
        assert!(!summarizer.is_enabled());
        assert_eq!(summarizer.summarize("anything").await.unwrap(), "");
    }

    #[test]
    fn create_summarizer_without_credential_is_disabled() {
        let config = SummarizerConfig::default();
        let summarizer =
            create_summarizer(&config, RetryPolicy::default(), Duration::from_secs(5)).unwrap();
        assert!(!summarizer.is_enabled());
    }
}
