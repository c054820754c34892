//! Notification messages: what a subscriber actually receives.

use chrono::{DateTime, Utc};
use pogoda_core::format::{escape_markdown, weather_details};
use pogoda_core::types::WeatherSnapshot;
use serde::{Deserialize, Serialize};

/// A message ready to hand to a delivery gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub timestamp: DateTime<Utc>,
}

impl Notification {
    /// Daily weather notification for a subscriber's location.
    pub fn weather(snapshot: &WeatherSnapshot, now: DateTime<Utc>) -> Self {
        Self {
            title: format!("Сповіщення про погоду у {}", snapshot.location),
            body: weather_details(snapshot),
            timestamp: now,
        }
    }

    /// Telegram Markdown text.
    pub fn render(&self) -> String {
        format!("🔔 *{}*\n\n{}", escape_markdown(&self.title), self.body)
    }
}
