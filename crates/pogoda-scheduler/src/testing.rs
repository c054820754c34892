//! In-memory adapter doubles shared by the notifier and engine tests.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use pogoda_core::traits::{AdapterFailure, DeliveryGateway, WeatherClient};
use pogoda_core::types::{WeatherCondition, WeatherSnapshot};
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

pub fn at(day: u32, h: u32, m: u32, s: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, day, h, m, s).unwrap()
}

pub fn snapshot(location: &str) -> WeatherSnapshot {
    WeatherSnapshot {
        location: location.to_string(),
        condition: WeatherCondition::Clouds,
        description: "хмарно".into(),
        temperature_c: 11.5,
        feels_like_c: 9.0,
        humidity: 70,
        wind_speed: 3.2,
        observed_at: at(19, 8, 0, 0),
    }
}

#[derive(Default)]
pub struct MockWeather {
    by_location: Mutex<HashMap<String, AdapterFailure>>,
    fail_next: AtomicUsize,
    delay: Duration,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockWeather {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Every fetch for `location` fails.
    pub fn fail_location(&self, location: &str, failure: AdapterFailure) {
        self.by_location
            .lock()
            .unwrap()
            .insert(location.to_string(), failure);
    }

    /// The next `n` fetches fail with a timeout, whatever the location.
    pub fn fail_next(&self, n: usize) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WeatherClient for MockWeather {
    fn name(&self) -> &str {
        "mock"
    }

    async fn fetch(&self, location: &str) -> Result<WeatherSnapshot, AdapterFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let consumed = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if consumed {
            return Err(AdapterFailure::timeout("mock timeout"));
        }
        if let Some(failure) = self.by_location.lock().unwrap().get(location) {
            return Err(failure.clone());
        }
        Ok(snapshot(location))
    }
}

#[derive(Default)]
pub struct MockGateway {
    sent: Mutex<Vec<(String, String)>>,
    failing: Mutex<HashMap<String, AdapterFailure>>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_channel(&self, channel_id: &str, failure: AdapterFailure) {
        self.failing
            .lock()
            .unwrap()
            .insert(channel_id.to_string(), failure);
    }

    /// (channel_id, text) of every successful send.
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_to(&self, channel_id: &str) -> usize {
        self.sent().iter().filter(|(c, _)| c == channel_id).count()
    }
}

#[async_trait]
impl DeliveryGateway for MockGateway {
    fn name(&self) -> &str {
        "mock"
    }

    async fn send(&self, channel_id: &str, text: &str) -> Result<(), AdapterFailure> {
        if let Some(failure) = self.failing.lock().unwrap().get(channel_id) {
            return Err(failure.clone());
        }
        self.sent
            .lock()
            .unwrap()
            .push((channel_id.to_string(), text.to_string()));
        Ok(())
    }
}
