//! TOML configuration for the catalog.
//!
//! Configuration is an explicit value threaded into every component
//! constructor; there are no ambient globals. Service credentials are stored
//! at rest with a reversible base64 text encoding — obfuscation, not
//! encryption. This is a known weakness of the persisted settings format,
//! kept for compatibility and flagged here rather than hidden.

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::store::RetryPolicy;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    pub account: AccountConfig,
    pub store: StoreConfig,
    #[serde(default)]
    pub summarizer: SummarizerConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AccountConfig {
    pub username: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StoreConfig {
    /// Content store API root, e.g. `https://store.example.com`.
    pub base_url: String,
    pub owner: String,
    pub name: String,
    /// Path prefix inside the store under which all catalog objects live.
    #[serde(default)]
    pub path: String,
    /// Bearer credential, base64-encoded at rest.
    #[serde(default)]
    pub credential: String,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_base_ms")]
    pub retry_base_ms: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_max_attempts() -> u32 {
    3
}
fn default_retry_base_ms() -> u64 {
    500
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SummarizerConfig {
    #[serde(default = "default_summarizer_endpoint")]
    pub endpoint: String,
    /// Bearer credential, base64-encoded at rest. Empty means summarization
    /// is disabled — a valid state, not an error.
    #[serde(default)]
    pub credential: String,
    /// Extracted text is truncated to this many characters before
    /// summarization.
    #[serde(default = "default_max_excerpt_chars")]
    pub max_excerpt_chars: usize,
}

fn default_summarizer_endpoint() -> String {
    "https://api-inference.huggingface.co/models/facebook/bart-large-cnn".to_string()
}
fn default_max_excerpt_chars() -> usize {
    4000
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        SummarizerConfig {
            endpoint: default_summarizer_endpoint(),
            credential: String::new(),
            max_excerpt_chars: default_max_excerpt_chars(),
        }
    }
}

impl StoreConfig {
    /// Decoded bearer credential.
    pub fn credential(&self) -> Result<String> {
        decode_credential(&self.credential)
    }

    /// Encode and store a plain-text credential.
    pub fn set_credential(&mut self, plain: &str) {
        self.credential = encode_credential(plain);
    }

    /// Path prefix for all catalog objects: `owner/name/path`.
    pub fn base_path(&self) -> String {
        crate::store::join_path(&[&self.owner, &self.name, &self.path])
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.retry_base_ms),
        }
    }
}

impl SummarizerConfig {
    pub fn credential(&self) -> Result<String> {
        decode_credential(&self.credential)
    }

    pub fn set_credential(&mut self, plain: &str) {
        self.credential = encode_credential(plain);
    }

    pub fn is_enabled(&self) -> bool {
        !self.credential.is_empty()
    }
}

/// Reversible at-rest encoding for credentials. Not encryption.
pub fn encode_credential(plain: &str) -> String {
    if plain.is_empty() {
        return String::new();
    }
    BASE64.encode(plain.as_bytes())
}

/// Decode an at-rest credential. Empty input decodes to empty.
pub fn decode_credential(encoded: &str) -> Result<String> {
    if encoded.is_empty() {
        return Ok(String::new());
    }
    let bytes = BASE64
        .decode(encoded.as_bytes())
        .context("credential is not valid base64")?;
    String::from_utf8(bytes).context("credential is not valid UTF-8")
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.store.base_url.trim().is_empty() {
        anyhow::bail!("store.base_url must not be empty");
    }
    if config.store.owner.trim().is_empty() || config.store.name.trim().is_empty() {
        anyhow::bail!("store.owner and store.name must not be empty");
    }
    if config.store.max_attempts == 0 {
        anyhow::bail!("store.max_attempts must be >= 1");
    }
    if config.summarizer.max_excerpt_chars == 0 {
        anyhow::bail!("summarizer.max_excerpt_chars must be > 0");
    }

    // Fail early on undecodable credentials rather than at first request.
    config.store.credential()?;
    config.summarizer.credential()?;

    Ok(config)
}

pub fn save_config(path: &Path, config: &Config) -> Result<()> {
    let content = toml::to_string_pretty(config).context("Failed to serialize config")?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write config file: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Config {
        Config {
            account: AccountConfig {
                username: "casey".into(),
            },
            store: StoreConfig {
                base_url: "https://store.example.com".into(),
                owner: "acme".into(),
                name: "catalog".into(),
                path: "library".into(),
                credential: encode_credential("tok-123"),
                max_attempts: 3,
                retry_base_ms: 500,
                timeout_secs: 30,
            },
            summarizer: SummarizerConfig::default(),
        }
    }

    #[test]
    fn credential_encoding_round_trips() {
        let encoded = encode_credential("s3cr3t token");
        assert_ne!(encoded, "s3cr3t token");
        assert_eq!(decode_credential(&encoded).unwrap(), "s3cr3t token");
        assert_eq!(decode_credential("").unwrap(), "");
    }

    #[test]
    fn config_round_trips_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("docshelf.toml");
        save_config(&path, &sample()).unwrap();
        let loaded = load_config(&path).unwrap();
        assert_eq!(loaded.store.credential().unwrap(), "tok-123");
        assert_eq!(loaded.store.base_path(), "acme/catalog/library");
        assert!(!loaded.summarizer.is_enabled());
    }

    #[test]
    fn zero_attempts_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("docshelf.toml");
        let mut config = sample();
        config.store.max_attempts = 0;
        save_config(&path, &config).unwrap();
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn defaults_fill_optional_sections() {
        let toml = r#"
[account]
username = "casey"

[store]
base_url = "https://store.example.com"
owner = "acme"
name = "catalog"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.store.max_attempts, 3);
        assert_eq!(config.summarizer.max_excerpt_chars, 4000);
        assert!(!config.summarizer.is_enabled());
    }
}
