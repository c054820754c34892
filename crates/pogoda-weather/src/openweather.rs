//! OpenWeatherMap client: current conditions and the 5-day forecast.
//!
//! Known settlements are queried by coordinates, anything else by name.
//! Every failure is classified so the notifier can tell a timeout or a
//! rate limit (retry later) from a location the provider does not know.

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, Offset, Utc};
use pogoda_core::config::WeatherConfig;
use pogoda_core::error::{PogodaError, Result};
use pogoda_core::traits::{AdapterFailure, WeatherClient};
use pogoda_core::types::{DailyForecast, WeatherCondition, WeatherSnapshot};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Duration;

use crate::settlements;

pub struct OpenWeatherClient {
    api_key: String,
    base_url: String,
    lang: String,
    units: String,
    client: reqwest::Client,
}

impl OpenWeatherClient {
    pub fn new(config: &WeatherConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| PogodaError::Weather(format!("HTTP client: {e}")))?;
        Ok(Self {
            api_key: config.api_key.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            lang: config.lang.clone(),
            units: config.units.clone(),
            client,
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        location: &str,
    ) -> std::result::Result<T, AdapterFailure> {
        let mut query: Vec<(&str, String)> = vec![
            ("appid", self.api_key.clone()),
            ("units", self.units.clone()),
            ("lang", self.lang.clone()),
        ];
        match settlements::find(location) {
            Some(s) => {
                query.push(("lat", s.lat.to_string()));
                query.push(("lon", s.lon.to_string()));
            }
            None => query.push(("q", location.trim().to_string())),
        }

        let response = self
            .client
            .get(format!("{}/{endpoint}", self.base_url))
            .query(&query)
            .send()
            .await
            .map_err(request_failure)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_failure(status, &body, location));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| AdapterFailure::unavailable(format!("Invalid weather response: {e}")))
    }

    /// Current conditions.
    pub async fn current(&self, location: &str) -> std::result::Result<WeatherSnapshot, AdapterFailure> {
        let data: CurrentResponse = self.get_json("weather", location).await?;
        let entry = data
            .weather
            .first()
            .ok_or_else(|| AdapterFailure::unavailable("Weather response has no conditions"))?;

        Ok(WeatherSnapshot {
            location: location.trim().to_string(),
            condition: WeatherCondition::from_main(&entry.main),
            description: entry.description.clone(),
            temperature_c: data.main.temp,
            feels_like_c: data.main.feels_like,
            humidity: data.main.humidity,
            wind_speed: data.wind.speed,
            observed_at: DateTime::from_timestamp(data.dt, 0).unwrap_or_else(Utc::now),
        })
    }

    /// One entry per local calendar day: the first 3-hour slot of each day.
    pub async fn forecast(&self, location: &str) -> std::result::Result<Vec<DailyForecast>, AdapterFailure> {
        let data: ForecastResponse = self.get_json("forecast", location).await?;
        let offset = data
            .city
            .and_then(|c| FixedOffset::east_opt(c.timezone))
            .unwrap_or(Utc.fix());

        let mut days: Vec<DailyForecast> = Vec::new();
        for item in data.list {
            let Some(at) = DateTime::from_timestamp(item.dt, 0) else {
                continue;
            };
            let date: NaiveDate = at.with_timezone(&offset).date_naive();
            if days.last().is_some_and(|d| d.date == date) {
                continue;
            }
            let Some(entry) = item.weather.first() else {
                continue;
            };
            days.push(DailyForecast {
                date,
                condition: WeatherCondition::from_main(&entry.main),
                description: entry.description.clone(),
                temperature_c: item.main.temp,
            });
        }

        if days.is_empty() {
            return Err(AdapterFailure::unavailable("Forecast response is empty"));
        }
        Ok(days)
    }
}

#[async_trait]
impl WeatherClient for OpenWeatherClient {
    fn name(&self) -> &str {
        "openweathermap"
    }

    async fn fetch(&self, location: &str) -> std::result::Result<WeatherSnapshot, AdapterFailure> {
        self.current(location).await
    }
}

fn request_failure(e: reqwest::Error) -> AdapterFailure {
    if e.is_timeout() {
        AdapterFailure::timeout(format!("Weather request timed out: {e}"))
    } else {
        AdapterFailure::unavailable(format!("Weather request failed: {e}"))
    }
}

fn status_failure(status: reqwest::StatusCode, body: &str, location: &str) -> AdapterFailure {
    let message = serde_json::from_str::<ApiError>(body)
        .map(|e| e.message)
        .unwrap_or_else(|_| body.chars().take(200).collect());
    match status.as_u16() {
        429 => AdapterFailure::rate_limited(format!("Weather API rate limit: {message}")),
        404 => AdapterFailure::rejected(format!("Unknown location '{location}': {message}")),
        401 | 403 => AdapterFailure::rejected(format!("Weather API key refused: {message}")),
        s if s >= 500 => AdapterFailure::unavailable(format!("Weather API {status}: {message}")),
        _ => AdapterFailure::rejected(format!("Weather API {status}: {message}")),
    }
}

// --- OpenWeatherMap API Types ---

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct Conditions {
    main: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct CurrentMain {
    temp: f64,
    feels_like: f64,
    humidity: u8,
}

#[derive(Debug, Deserialize)]
struct Wind {
    speed: f64,
}

#[derive(Debug, Deserialize)]
struct CurrentResponse {
    weather: Vec<Conditions>,
    main: CurrentMain,
    wind: Wind,
    #[serde(default)]
    dt: i64,
}

#[derive(Debug, Deserialize)]
struct ForecastMain {
    temp: f64,
}

#[derive(Debug, Deserialize)]
struct ForecastItem {
    dt: i64,
    main: ForecastMain,
    weather: Vec<Conditions>,
}

#[derive(Debug, Deserialize)]
struct City {
    /// Shift from UTC in seconds.
    #[serde(default)]
    timezone: i32,
}

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    list: Vec<ForecastItem>,
    city: Option<City>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pogoda_core::traits::FailureKind;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> OpenWeatherClient {
        let config = WeatherConfig {
            api_key: "test-key".into(),
            base_url: server.uri(),
            timeout_secs: 1,
            ..WeatherConfig::default()
        };
        OpenWeatherClient::new(&config).unwrap()
    }

    fn current_body() -> serde_json::Value {
        json!({
            "weather": [{"main": "Rain", "description": "легкий дощ"}],
            "main": {"temp": 12.34, "feels_like": 10.5, "humidity": 81},
            "wind": {"speed": 4.1},
            "dt": 1_792_393_200,
            "name": "Bilobozhnytsya"
        })
    }

    #[tokio::test]
    async fn test_current_for_settlement() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/weather"))
            .and(query_param("appid", "test-key"))
            .and(query_param("lang", "uk"))
            .and(query_param("units", "metric"))
            .respond_with(ResponseTemplate::new(200).set_body_json(current_body()))
            .expect(1)
            .mount(&server)
            .await;

        let snapshot = client(&server).fetch("Білобожниця").await.unwrap();
        assert_eq!(snapshot.location, "Білобожниця");
        assert_eq!(snapshot.condition, WeatherCondition::Rain);
        assert_eq!(snapshot.description, "легкий дощ");
        assert_eq!(snapshot.humidity, 81);
        assert!((snapshot.temperature_c - 12.34).abs() < 1e-9);

        let requests = server.received_requests().await.unwrap();
        let query = requests[0].url.query().unwrap_or_default().to_string();
        assert!(query.contains("lat="));
        assert!(!query.contains("q="));
    }

    #[tokio::test]
    async fn test_unknown_settlement_queries_by_name() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/weather"))
            .and(query_param("q", "Тернопіль"))
            .respond_with(ResponseTemplate::new(200).set_body_json(current_body()))
            .expect(1)
            .mount(&server)
            .await;

        let snapshot = client(&server).current(" Тернопіль ").await.unwrap();
        assert_eq!(snapshot.location, "Тернопіль");
    }

    #[tokio::test]
    async fn test_failure_classification() {
        let cases = [
            (429, FailureKind::RateLimited),
            (404, FailureKind::Rejected),
            (401, FailureKind::Rejected),
            (503, FailureKind::Unavailable),
        ];
        for (status, kind) in cases {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .respond_with(
                    ResponseTemplate::new(status)
                        .set_body_json(json!({"cod": status, "message": "nope"})),
                )
                .mount(&server)
                .await;

            let failure = client(&server).fetch("Косів").await.unwrap_err();
            assert_eq!(failure.kind, kind, "status {status}");
            assert!(failure.message.contains("nope"));
        }
    }

    #[tokio::test]
    async fn test_timeout_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(current_body())
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let failure = client(&server).fetch("Косів").await.unwrap_err();
        assert_eq!(failure.kind, FailureKind::Timeout);
        assert!(failure.is_transient());
    }

    #[tokio::test]
    async fn test_malformed_body_is_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"weather": []})))
            .mount(&server)
            .await;

        let failure = client(&server).fetch("Косів").await.unwrap_err();
        assert_eq!(failure.kind, FailureKind::Unavailable);
    }

    #[tokio::test]
    async fn test_forecast_one_entry_per_day() {
        let server = MockServer::start().await;
        // 21:00 UTC on the 19th is already the 20th at UTC+3.
        let body = json!({
            "list": [
                {"dt": 1_792_432_800, "main": {"temp": 9.0},
                 "weather": [{"main": "Clouds", "description": "хмарно"}]},
                {"dt": 1_792_454_400, "main": {"temp": 7.5},
                 "weather": [{"main": "Clear", "description": "ясно"}]},
                {"dt": 1_792_465_200, "main": {"temp": 6.0},
                 "weather": [{"main": "Clear", "description": "ясно"}]},
                {"dt": 1_792_540_800, "main": {"temp": 8.0},
                 "weather": [{"main": "Snow", "description": "сніг"}]}
            ],
            "city": {"timezone": 10800}
        });
        Mock::given(method("GET"))
            .and(path("/forecast"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&server)
            .await;

        let days = client(&server).forecast("Звиняч").await.unwrap();
        let dates: Vec<String> = days.iter().map(|d| d.date.to_string()).collect();
        assert_eq!(dates, ["2026-10-19", "2026-10-20", "2026-10-21"]);
        assert_eq!(days[1].condition, WeatherCondition::Clear);
        assert_eq!(days[2].condition, WeatherCondition::Snow);
    }
}
