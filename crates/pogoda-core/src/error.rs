//! Error types for Pogoda.

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, PogodaError>;

#[derive(Debug, Error)]
pub enum PogodaError {
    /// Malformed input, rejected before anything is persisted.
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// The store could not be read or written.
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Missing credentials or unusable settings. Fatal at startup.
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Scheduler error: {0}")]
    Scheduler(String),

    #[error("Weather error: {0}")]
    Weather(String),

    #[error("Delivery error: {0}")]
    Delivery(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PogodaError {
    /// Shorthand used by validation helpers.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// True for errors that only affect the current request or user.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}
