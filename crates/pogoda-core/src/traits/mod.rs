//! Capability interfaces for external collaborators.
//!
//! The notifier only depends on these call contracts. Concrete adapters
//! (OpenWeatherMap, Telegram) live in their own crates and are picked at
//! construction time, so tests can substitute in-memory doubles.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::types::WeatherSnapshot;

/// Why an adapter call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The call did not complete in time.
    Timeout,
    /// The provider asked us to slow down.
    RateLimited,
    /// Network error, 5xx, or a response we could not read.
    Unavailable,
    /// The provider refused the request for good (unknown location,
    /// blocked chat, bad credentials). Retrying today will not help.
    Rejected,
}

impl FailureKind {
    pub fn is_transient(&self) -> bool {
        !matches!(self, Self::Rejected)
    }
}

/// Explicit failure value returned by adapters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl AdapterFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Timeout, message)
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(FailureKind::RateLimited, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Unavailable, message)
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Rejected, message)
    }

    pub fn is_transient(&self) -> bool {
        self.kind.is_transient()
    }
}

impl std::fmt::Display for AdapterFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for AdapterFailure {}

/// Fetches current conditions for a location.
#[async_trait]
pub trait WeatherClient: Send + Sync {
    fn name(&self) -> &str;

    async fn fetch(&self, location: &str) -> Result<WeatherSnapshot, AdapterFailure>;
}

/// Sends opaque formatted text to a chat endpoint.
#[async_trait]
pub trait DeliveryGateway: Send + Sync {
    fn name(&self) -> &str;

    async fn send(&self, channel_id: &str, text: &str) -> Result<(), AdapterFailure>;
}
