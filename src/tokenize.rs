//! Word normalization for index tokens.
//!
//! Tokens power client-side filtering over the document index: every entry
//! carries the deduplicated word set of its text fields.

/// Split `text` into lowercase word tokens. A word is a maximal run of
/// alphanumeric characters or underscores; everything else separates.
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|w| !w.is_empty())
        .map(|w| w.to_string())
        .collect()
}

/// Deduplicated, sorted token set of `text`.
pub fn token_set(text: &str) -> Vec<String> {
    let mut tokens = tokenize(text);
    tokens.sort();
    tokens.dedup();
    tokens
}
