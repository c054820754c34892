//! Pogoda configuration system.

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{PogodaError, Result};

/// Environment variable holding the Telegram bot token.
pub const ENV_BOT_TOKEN: &str = "BOT_TOKEN";
/// Environment variable holding the OpenWeatherMap key.
pub const ENV_WEATHER_API_KEY: &str = "WEATHER_API_KEY";

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PogodaConfig {
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub weather: WeatherConfig,
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl PogodaConfig {
    /// Load config from the default path (~/.pogoda/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| PogodaError::Config(format!("Failed to read config {}: {e}", path.display())))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| PogodaError::Config(format!("Failed to parse config: {e}")))?;
        Ok(config)
    }

    /// Save config to the given path.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| PogodaError::Config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the Pogoda home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".pogoda")
    }

    /// Overlay credentials from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    /// Overlay credentials from any key lookup. Empty values are ignored.
    pub fn apply_env_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(token) = lookup(ENV_BOT_TOKEN).filter(|v| !v.trim().is_empty()) {
            self.telegram.bot_token = token;
        }
        if let Some(key) = lookup(ENV_WEATHER_API_KEY).filter(|v| !v.trim().is_empty()) {
            self.weather.api_key = key;
        }
    }

    /// Check everything the long-running service needs before it starts.
    pub fn validate_for_serve(&self) -> Result<()> {
        if self.telegram.bot_token.trim().is_empty() {
            return Err(PogodaError::Config(format!(
                "{ENV_BOT_TOKEN} not found in environment or [telegram] config"
            )));
        }
        if self.weather.api_key.trim().is_empty() {
            return Err(PogodaError::Config(format!(
                "{ENV_WEATHER_API_KEY} not found in environment or [weather] config"
            )));
        }
        self.scheduler.validate()
    }
}

/// Backoff shape between retries of a failed delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackoffKind {
    Linear,
    #[default]
    Exponential,
}

/// Notification scheduling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_tick_interval")]
    pub tick_interval_secs: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_secs: u64,
    #[serde(default)]
    pub backoff: BackoffKind,
    /// IANA timezone that decides what "today" is.
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

fn default_tick_interval() -> u64 { 60 }
fn default_max_attempts() -> u32 { 3 }
fn default_retry_backoff() -> u64 { 60 }
fn default_timezone() -> String { "Europe/Kyiv".into() }

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: default_tick_interval(),
            max_attempts: default_max_attempts(),
            retry_backoff_secs: default_retry_backoff(),
            backoff: BackoffKind::default(),
            timezone: default_timezone(),
        }
    }
}

impl SchedulerConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }

    pub fn timezone(&self) -> Result<Tz> {
        self.timezone
            .parse::<Tz>()
            .map_err(|_| PogodaError::Config(format!("Unknown timezone '{}'", self.timezone)))
    }

    pub fn validate(&self) -> Result<()> {
        if self.tick_interval_secs == 0 {
            return Err(PogodaError::Config("tick_interval_secs must be > 0".into()));
        }
        if self.max_attempts == 0 {
            return Err(PogodaError::Config("max_attempts must be >= 1".into()));
        }
        self.timezone()?;
        Ok(())
    }
}

/// OpenWeatherMap access.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_weather_url")]
    pub base_url: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_lang")]
    pub lang: String,
    #[serde(default = "default_units")]
    pub units: String,
    /// Current-conditions cache lifetime; 0 disables caching.
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: u64,
    #[serde(default = "default_forecast_cache_ttl")]
    pub forecast_cache_ttl_secs: u64,
}

fn default_weather_url() -> String { "https://api.openweathermap.org/data/2.5".into() }
fn default_timeout() -> u64 { 10 }
fn default_lang() -> String { "uk".into() }
fn default_units() -> String { "metric".into() }
fn default_cache_ttl() -> u64 { 1800 }
fn default_forecast_cache_ttl() -> u64 { 3600 }

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: default_weather_url(),
            timeout_secs: default_timeout(),
            lang: default_lang(),
            units: default_units(),
            cache_ttl_secs: default_cache_ttl(),
            forecast_cache_ttl_secs: default_forecast_cache_ttl(),
        }
    }
}

/// Telegram Bot API access.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    #[serde(default)]
    pub bot_token: String,
    #[serde(default = "default_telegram_api")]
    pub api_base: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_telegram_api() -> String { "https://api.telegram.org".into() }

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            api_base: default_telegram_api(),
            timeout_secs: default_timeout(),
        }
    }
}

/// Where the database and its backups live.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_db_path")]
    pub db_path: String,
    #[serde(default = "default_backup_dir")]
    pub backup_dir: String,
}

fn default_db_path() -> String { "~/.pogoda/pogoda.db".into() }
fn default_backup_dir() -> String { "~/.pogoda/backups".into() }

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            backup_dir: default_backup_dir(),
        }
    }
}

impl StorageConfig {
    pub fn db_path(&self) -> PathBuf {
        expand_path(&self.db_path)
    }

    pub fn backup_dir(&self) -> PathBuf {
        expand_path(&self.backup_dir)
    }
}

/// Log output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive; `RUST_LOG` takes precedence.
    #[serde(default = "default_log_filter")]
    pub filter: String,
    #[serde(default)]
    pub json: bool,
}

fn default_log_filter() -> String { "info".into() }

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            json: false,
        }
    }
}

fn expand_path(p: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(p).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PogodaConfig::default();
        assert_eq!(config.scheduler.tick_interval_secs, 60);
        assert_eq!(config.scheduler.max_attempts, 3);
        assert_eq!(config.scheduler.backoff, BackoffKind::Exponential);
        assert_eq!(config.weather.lang, "uk");
        assert_eq!(config.telegram.api_base, "https://api.telegram.org");
        assert!(config.scheduler.validate().is_ok());
    }

    #[test]
    fn test_config_from_toml() {
        let toml_str = r#"
            [scheduler]
            tick_interval_secs = 30
            max_attempts = 5
            backoff = "linear"
            timezone = "UTC"

            [weather]
            api_key = "abc"
            cache_ttl_secs = 0

            [telegram]
            bot_token = "123:xyz"
        "#;

        let config: PogodaConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.scheduler.tick_interval_secs, 30);
        assert_eq!(config.scheduler.max_attempts, 5);
        assert_eq!(config.scheduler.backoff, BackoffKind::Linear);
        assert_eq!(config.scheduler.timezone().unwrap(), chrono_tz::UTC);
        assert_eq!(config.weather.cache_ttl_secs, 0);
        assert_eq!(config.weather.lang, "uk");
        assert!(config.validate_for_serve().is_ok());
    }

    #[test]
    fn test_config_missing_fields_use_defaults() {
        let config: PogodaConfig = toml::from_str("").unwrap();
        assert_eq!(config.scheduler.timezone, "Europe/Kyiv");
        assert_eq!(config.storage.db_path, "~/.pogoda/pogoda.db");
    }

    #[test]
    fn test_missing_credentials_are_fatal() {
        let mut config = PogodaConfig::default();
        let err = config.validate_for_serve().unwrap_err();
        assert!(matches!(err, PogodaError::Config(ref m) if m.contains(ENV_BOT_TOKEN)));

        config.telegram.bot_token = "123:xyz".into();
        let err = config.validate_for_serve().unwrap_err();
        assert!(matches!(err, PogodaError::Config(ref m) if m.contains(ENV_WEATHER_API_KEY)));
    }

    #[test]
    fn test_env_overlay() {
        let mut config = PogodaConfig::default();
        config.apply_env_from(|key| match key {
            ENV_BOT_TOKEN => Some("tok".into()),
            ENV_WEATHER_API_KEY => Some("  ".into()),
            _ => None,
        });
        assert_eq!(config.telegram.bot_token, "tok");
        assert!(config.weather.api_key.is_empty());
    }

    #[test]
    fn test_bad_scheduler_values() {
        let mut sched = SchedulerConfig {
            timezone: "Mars/Olympus".into(),
            ..SchedulerConfig::default()
        };
        assert!(sched.validate().is_err());
        sched.timezone = "UTC".into();
        sched.max_attempts = 0;
        assert!(sched.validate().is_err());
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut config = PogodaConfig::default();
        config.scheduler.max_attempts = 7;
        config.save_to(&path).unwrap();

        let loaded = PogodaConfig::load_from(&path).unwrap();
        assert_eq!(loaded.scheduler.max_attempts, 7);
    }
}
