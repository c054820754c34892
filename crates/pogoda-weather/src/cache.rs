//! TTL caches in front of the OpenWeatherMap client.
//!
//! On-demand lookups (CLI `weather` / `forecast`) and the notifier share
//! one service, so a location asked about twice within the TTL costs one
//! API call. Only successful responses are cached.

use async_trait::async_trait;
use pogoda_core::config::WeatherConfig;
use pogoda_core::error::Result;
use pogoda_core::traits::{AdapterFailure, WeatherClient};
use pogoda_core::types::{DailyForecast, WeatherSnapshot};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::openweather::OpenWeatherClient;

/// Map of values that expire `ttl` after insertion. A zero TTL caches nothing.
pub struct TtlCache<V> {
    ttl: Duration,
    entries: Mutex<HashMap<String, (Instant, V)>>,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn key(raw: &str) -> String {
        raw.trim().to_lowercase()
    }

    pub fn get(&self, key: &str) -> Option<V> {
        if self.ttl.is_zero() {
            return None;
        }
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries
            .get(&Self::key(key))
            .filter(|(stored, _)| stored.elapsed() < self.ttl)
            .map(|(_, v)| v.clone())
    }

    pub fn insert(&self, key: &str, value: V) {
        if self.ttl.is_zero() {
            return;
        }
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.retain(|_, (stored, _)| stored.elapsed() < self.ttl);
        entries.insert(Self::key(key), (Instant::now(), value));
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Weather lookups with separate caches for current conditions and forecasts.
pub struct WeatherService {
    client: OpenWeatherClient,
    current: TtlCache<WeatherSnapshot>,
    forecast: TtlCache<Vec<DailyForecast>>,
}

impl WeatherService {
    pub fn new(client: OpenWeatherClient, current_ttl: Duration, forecast_ttl: Duration) -> Self {
        Self {
            client,
            current: TtlCache::new(current_ttl),
            forecast: TtlCache::new(forecast_ttl),
        }
    }

    pub fn from_config(config: &WeatherConfig) -> Result<Self> {
        Ok(Self::new(
            OpenWeatherClient::new(config)?,
            Duration::from_secs(config.cache_ttl_secs),
            Duration::from_secs(config.forecast_cache_ttl_secs),
        ))
    }

    pub async fn current(&self, location: &str) -> std::result::Result<WeatherSnapshot, AdapterFailure> {
        if let Some(hit) = self.current.get(location) {
            tracing::debug!("Weather cache hit for '{}'", location.trim());
            return Ok(hit);
        }
        let snapshot = self.client.current(location).await?;
        self.current.insert(location, snapshot.clone());
        Ok(snapshot)
    }

    pub async fn forecast(&self, location: &str) -> std::result::Result<Vec<DailyForecast>, AdapterFailure> {
        if let Some(hit) = self.forecast.get(location) {
            tracing::debug!("Forecast cache hit for '{}'", location.trim());
            return Ok(hit);
        }
        let days = self.client.forecast(location).await?;
        self.forecast.insert(location, days.clone());
        Ok(days)
    }
}

#[async_trait]
impl WeatherClient for WeatherService {
    fn name(&self) -> &str {
        self.client.name()
    }

    async fn fetch(&self, location: &str) -> std::result::Result<WeatherSnapshot, AdapterFailure> {
        self.current(location).await
    }
}
