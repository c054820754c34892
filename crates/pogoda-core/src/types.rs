//! Data model shared by the store, the notifier and the adapters.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{PogodaError, Result};

/// A user's standing request for a daily weather notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    /// Chat user identity (unique per channel).
    pub user_id: i64,
    /// Where the message is delivered (Telegram chat id).
    pub channel_id: String,
    /// Settlement name the weather is fetched for.
    pub location: String,
    /// Local wall-clock time-of-day, minute precision.
    #[serde(with = "hhmm")]
    pub notify_time: NaiveTime,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Subscription {
    pub fn new(user_id: i64, channel_id: &str, location: &str, notify_time: NaiveTime) -> Self {
        let now = Utc::now();
        Self {
            user_id,
            channel_id: channel_id.to_string(),
            location: location.to_string(),
            notify_time,
            enabled: true,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Parse a `HH:MM` time-of-day (hours 00-23, minutes 00-59).
pub fn parse_notify_time(raw: &str) -> Result<NaiveTime> {
    let raw = raw.trim();
    let (h, m) = raw
        .split_once(':')
        .ok_or_else(|| PogodaError::validation(format!("expected HH:MM, got '{raw}'")))?;
    let digits = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
    if h.is_empty() || h.len() > 2 || m.len() != 2 || !digits(h) || !digits(m) {
        return Err(PogodaError::validation(format!("expected HH:MM, got '{raw}'")));
    }
    let hours: u32 = h
        .parse()
        .map_err(|_| PogodaError::validation(format!("invalid hour in '{raw}'")))?;
    let minutes: u32 = m
        .parse()
        .map_err(|_| PogodaError::validation(format!("invalid minute in '{raw}'")))?;
    NaiveTime::from_hms_opt(hours, minutes, 0)
        .ok_or_else(|| PogodaError::validation(format!("time out of range: '{raw}'")))
}

/// Render a time-of-day as `HH:MM`.
pub fn format_notify_time(time: NaiveTime) -> String {
    time.format("%H:%M").to_string()
}

mod hhmm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(time: &NaiveTime, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&super::format_notify_time(*time))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(d)?;
        super::parse_notify_time(&raw).map_err(serde::de::Error::custom)
    }
}

/// Outcome of a day's notification for one user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Sent,
    Failed,
    Skipped,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sent => "sent",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "sent" => Some(Self::Sent),
            "failed" => Some(Self::Failed),
            "skipped" => Some(Self::Skipped),
            _ => None,
        }
    }
}

impl std::fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Durable proof of a day's outcome for one user. One per (user_id, date).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryRecord {
    pub user_id: i64,
    /// Local calendar date in the configured timezone.
    pub date: NaiveDate,
    pub status: DeliveryStatus,
    /// Attempts made so far on this date.
    pub attempts: u32,
    pub last_error: Option<String>,
    /// A failed record is not retried before this instant.
    pub next_attempt_at: DateTime<Utc>,
    pub timestamp: DateTime<Utc>,
}

/// Weather groups reported by the provider, with their display emoji.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WeatherCondition {
    Clear,
    Clouds,
    Rain,
    Drizzle,
    Thunderstorm,
    Snow,
    /// Mist, fog, haze, smoke, dust, sand, ash.
    Haze,
    Squall,
    Tornado,
    #[default]
    Other,
}

impl WeatherCondition {
    /// Map the provider's `weather[].main` group name.
    pub fn from_main(main: &str) -> Self {
        match main {
            "Clear" => Self::Clear,
            "Clouds" => Self::Clouds,
            "Rain" => Self::Rain,
            "Drizzle" => Self::Drizzle,
            "Thunderstorm" => Self::Thunderstorm,
            "Snow" => Self::Snow,
            "Mist" | "Fog" | "Haze" | "Smoke" | "Dust" | "Sand" | "Ash" => Self::Haze,
            "Squall" => Self::Squall,
            "Tornado" => Self::Tornado,
            _ => Self::Other,
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            Self::Clear => "☀️",
            Self::Clouds => "☁️",
            Self::Rain => "🌧️",
            Self::Drizzle => "🌦️",
            Self::Thunderstorm => "⛈️",
            Self::Snow => "❄️",
            Self::Haze => "🌫️",
            Self::Squall => "💨",
            Self::Tornado => "🌪️",
            Self::Other => "🌈",
        }
    }
}

/// Current conditions for a location. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherSnapshot {
    pub location: String,
    pub condition: WeatherCondition,
    pub description: String,
    pub temperature_c: f64,
    pub feels_like_c: f64,
    pub humidity: u8,
    pub wind_speed: f64,
    pub observed_at: DateTime<Utc>,
}

/// One day of the multi-day forecast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyForecast {
    pub date: NaiveDate,
    pub condition: WeatherCondition,
    pub description: String,
    pub temperature_c: f64,
}
