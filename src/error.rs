//! Error types for Courier

use thiserror::Error;

/// Result type alias for Courier operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in Courier
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    /// AI, mail or OAuth provider unreachable or rejected the request.
    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Tool error: {0}")]
    Tool(String),

    /// The authorization server refused a code or refresh token (HTTP 400/401).
    /// Unlike `Upstream`, retrying cannot succeed.
    #[error("Grant rejected: {0}")]
    GrantRejected(String),

    #[error("Invalid or expired OAuth state")]
    InvalidOAuthState,

    #[error("Unsupported auth provider: {0}")]
    UnsupportedProvider(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Max iterations reached")]
    IterationLimitExceeded,

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Telegram error: {0}")]
    Telegram(#[from] teloxide::RequestError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether the error came from a collaborator rather than from us.
    pub fn is_upstream(&self) -> bool {
        matches!(self, Error::Upstream(_) | Error::GrantRejected(_) | Error::Http(_))
    }
}
