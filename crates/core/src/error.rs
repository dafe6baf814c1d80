//! Error types shared by all Rollcall crates.

use thiserror::Error;

/// Top-level error type for Rollcall operations.
///
/// Every variant is fatal to a sync run. Expected absences (unlicensed users,
/// classes still provisioning) never surface here; the gateway reports those
/// as non-error outcomes.
#[derive(Debug, Error)]
pub enum RollcallError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Graph error: {0}")]
    Graph(String),

    #[error("{operation} still failing after {retries} retries (last status {status})")]
    RetriesExhausted {
        operation: String,
        retries: u32,
        status: u16,
    },

    #[error("malformed roster data: {0}")]
    MalformedRoster(String),

    #[error("authentication error: {0}")]
    Auth(String),
}

impl From<serde_json::Error> for RollcallError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// A convenience Result alias that defaults to [`RollcallError`].
pub type Result<T> = std::result::Result<T, RollcallError>;
