//! # Pogoda Weather
//!
//! Weather adapter for the notifier and the CLI: OpenWeatherMap current
//! conditions and forecast, the community's settlement table and TTL caches.

pub mod cache;
pub mod openweather;
pub mod settlements;

pub use cache::{TtlCache, WeatherService};
pub use openweather::OpenWeatherClient;
pub use settlements::{SETTLEMENTS, Settlement};
