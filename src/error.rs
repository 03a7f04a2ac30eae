//! Crate error taxonomy.
//!
//! Transient faults (`Network`, retryable `Remote`) are absorbed at the store
//! and summarizer boundaries by the retry loop; everything else propagates up
//! to the orchestrating workflow, which resets its in-progress cells and
//! surfaces the error to the caller.

/// Errors produced by the catalog core.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Network-level failure (connect, timeout, protocol). Retried internally.
    #[error("network error: {0}")]
    Network(String),

    /// A required remote object is absent. Reads treat 404 as a valid
    /// "absent" result; this variant appears only where presence is required
    /// (e.g. the target of a delete).
    #[error("not found: {0}")]
    NotFound(String),

    /// Version-token mismatch on a conditional write. Surfaced to the
    /// caller, never retried automatically.
    #[error("version conflict on {0}")]
    Conflict(String),

    /// Missing or invalid user input. No network call was made.
    #[error("{0}")]
    Validation(String),

    /// Remote service rejected the request. Carries the remote-provided
    /// message. 5xx and 429 responses are retried before this surfaces.
    #[error("remote error {status}: {message}")]
    Remote { status: u16, message: String },

    /// Text extraction or summarization failed; aborts the enclosing upload.
    #[error("pipeline error: {0}")]
    Pipeline(String),
}

impl Error {
    /// Whether the retry loop should try again after this error.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Network(_) => true,
            Error::Remote { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
