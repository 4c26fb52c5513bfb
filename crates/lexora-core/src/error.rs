use thiserror::Error;

/// Errors surfaced by the core library.
///
/// The client only distinguishes "succeeded" from "did not succeed", so callers
/// generally log these and revert UI state rather than matching on variants.
#[derive(Debug, Error)]
pub enum LexoraError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("backend returned {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("no data received for {0} seconds")]
    Timeout(u64),

    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, LexoraError>;
