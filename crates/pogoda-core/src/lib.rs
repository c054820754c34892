//! # Pogoda Core
//!
//! Shared building blocks for the Pogoda weather bot: configuration,
//! the error taxonomy, data types exchanged between crates, and the
//! capability traits that external adapters implement.

pub mod config;
pub mod error;
pub mod format;
pub mod traits;
pub mod types;

pub use config::PogodaConfig;
pub use error::{PogodaError, Result};
pub use traits::{AdapterFailure, DeliveryGateway, FailureKind, WeatherClient};
pub use types::{
    DailyForecast, DeliveryRecord, DeliveryStatus, Subscription, WeatherCondition,
    WeatherSnapshot,
};
