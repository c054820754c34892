//! Notifier: one scheduling tick worth of daily weather deliveries.
//!
//! A tick picks the due subscribers, claims one attempt per user in the
//! store, fetches weather once per location and sends to every claimed
//! user concurrently. Failures stay inside the user they belong to.

use chrono::{DateTime, LocalResult, NaiveDate, NaiveTime, TimeDelta, TimeZone, Utc};
use chrono_tz::Tz;
use futures::future::join_all;
use pogoda_core::config::SchedulerConfig;
use pogoda_core::error::Result;
use pogoda_core::traits::{AdapterFailure, DeliveryGateway, WeatherClient};
use pogoda_core::types::{DeliveryRecord, DeliveryStatus, Subscription, WeatherSnapshot};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::notify::Notification;
use crate::persistence::SubscriptionDb;
use crate::retry::RetryPolicy;

/// Counters for one tick. Only used for logging.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub due: usize,
    pub sent: usize,
    pub failed: usize,
    pub skipped: usize,
    pub errors: usize,
}

impl TickReport {
    pub fn is_empty(&self) -> bool {
        self.due == 0 && self.errors == 0
    }
}

impl fmt::Display for TickReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "due={} sent={} failed={} skipped={} errors={}",
            self.due, self.sent, self.failed, self.skipped, self.errors
        )
    }
}

struct Claimed {
    sub: Subscription,
    date: NaiveDate,
    attempt: u32,
}

enum Outcome {
    Sent,
    Failed,
    Skipped,
    Error,
}

type FetchResult = std::result::Result<WeatherSnapshot, AdapterFailure>;

/// Longest spring-forward gap a notify time is pushed across, in minutes.
const MAX_GAP_MINUTES: i64 = 180;

/// A subscription owed an attempt, and the local day that attempt counts for.
#[derive(Debug, Clone, PartialEq)]
pub struct DueDelivery {
    pub date: NaiveDate,
    pub subscription: Subscription,
}

pub struct Notifier {
    db: Arc<SubscriptionDb>,
    weather: Arc<dyn WeatherClient>,
    gateway: Arc<dyn DeliveryGateway>,
    policy: RetryPolicy,
    tz: Tz,
    granularity: Duration,
    /// End of the last window a tick covered.
    covered_until: Mutex<Option<DateTime<Utc>>>,
}

impl Notifier {
    pub fn new(
        db: Arc<SubscriptionDb>,
        weather: Arc<dyn WeatherClient>,
        gateway: Arc<dyn DeliveryGateway>,
    ) -> Self {
        Self {
            db,
            weather,
            gateway,
            policy: RetryPolicy::default(),
            tz: chrono_tz::Europe::Kyiv,
            granularity: Duration::from_secs(60),
            covered_until: Mutex::new(None),
        }
    }

    /// Build from `[scheduler]` settings.
    pub fn from_config(
        db: Arc<SubscriptionDb>,
        weather: Arc<dyn WeatherClient>,
        gateway: Arc<dyn DeliveryGateway>,
        config: &SchedulerConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self::new(db, weather, gateway)
            .with_policy(RetryPolicy::from_config(config))
            .with_timezone(config.timezone()?)
            .with_granularity(config.tick_interval()))
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_timezone(mut self, tz: Tz) -> Self {
        self.tz = tz;
        self
    }

    /// Width of the first tick's notify-time window; match the tick interval.
    /// Later ticks cover everything since the previous one.
    pub fn with_granularity(mut self, granularity: Duration) -> Self {
        self.granularity = granularity;
        self
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Calendar day `now` falls on in the configured timezone.
    pub fn local_date(&self, now: DateTime<Utc>) -> NaiveDate {
        now.with_timezone(&self.tz).date_naive()
    }

    /// Instant a notify time falls on for `date` in the configured timezone.
    ///
    /// A time skipped by a spring-forward jump moves to the first instant
    /// after the gap; a time repeated by a fall-back takes the earlier one.
    pub fn scheduled_at(&self, date: NaiveDate, time: NaiveTime) -> Option<DateTime<Utc>> {
        let mut local = date.and_time(time);
        for _ in 0..=MAX_GAP_MINUTES {
            match self.tz.from_local_datetime(&local) {
                LocalResult::Single(t) => return Some(t.with_timezone(&Utc)),
                LocalResult::Ambiguous(earliest, _) => return Some(earliest.with_timezone(&Utc)),
                LocalResult::None => local += TimeDelta::minutes(1),
            }
        }
        None
    }

    /// Start of the window the tick at `now` covers: the previous tick's
    /// `now`, or `now - granularity` on the first tick.
    fn window_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let covered = *self
            .covered_until
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        covered.unwrap_or_else(|| {
            let width = TimeDelta::from_std(self.granularity).unwrap_or(TimeDelta::minutes(1));
            now - width
        })
    }

    fn advance_window(&self, now: DateTime<Utc>) {
        let mut covered = self
            .covered_until
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        if covered.is_none_or(|c| c < now) {
            *covered = Some(now);
        }
    }

    /// Subscriptions that should get an attempt at `now`.
    ///
    /// A first attempt is due when the user's notify time falls between
    /// the previous tick and `now` and nothing is recorded for that day.
    /// When the window crosses local midnight the previous day is checked
    /// too, but never further back. A retry is due when today's record is
    /// `failed`, under the attempt cap and past its backoff.
    pub fn due_subscriptions(&self, now: DateTime<Utc>) -> Result<Vec<DueDelivery>> {
        let start = self.window_start(now);
        let today = self.local_date(now);
        let mut day = self.local_date(start).min(today);
        if let Some(yesterday) = today.pred_opt() {
            day = day.max(yesterday);
        }

        let subs = self.db.enabled_subscriptions()?;
        let mut due = Vec::new();
        loop {
            let records: HashMap<i64, DeliveryRecord> = self
                .db
                .delivery_records_on(day)?
                .into_iter()
                .map(|r| (r.user_id, r))
                .collect();

            for sub in &subs {
                let owed = match records.get(&sub.user_id) {
                    None => self
                        .scheduled_at(day, sub.notify_time)
                        .is_some_and(|t| t > start && t <= now),
                    Some(rec) => {
                        day == today
                            && rec.status == DeliveryStatus::Failed
                            && self.policy.allows_another(rec.attempts)
                            && rec.next_attempt_at <= now
                    }
                };
                if owed {
                    due.push(DueDelivery {
                        date: day,
                        subscription: sub.clone(),
                    });
                }
            }

            if day >= today {
                break;
            }
            match day.succ_opt() {
                Some(next) => day = next,
                None => break,
            }
        }
        Ok(due)
    }

    /// Run one tick. `now` must not go backwards between calls.
    ///
    /// Only a failure to compute the due set is returned as an error;
    /// everything after that is per user and ends up in the report.
    /// Store writes are short single-row statements and run inline on
    /// the tick task.
    pub async fn run_tick(&self, now: DateTime<Utc>) -> Result<TickReport> {
        let today = self.local_date(now);
        let due = self.due_subscriptions(now)?;
        self.advance_window(now);
        let mut report = TickReport {
            due: due.len(),
            ..TickReport::default()
        };
        if due.is_empty() {
            return Ok(report);
        }

        let mut claimed = Vec::with_capacity(due.len());
        for DueDelivery { date, subscription } in due {
            match self
                .db
                .claim_attempt(subscription.user_id, date, now, &self.policy)
            {
                Ok(Some(attempt)) => claimed.push(Claimed {
                    sub: subscription,
                    date,
                    attempt,
                }),
                Ok(None) => {
                    tracing::debug!(
                        user_id = subscription.user_id,
                        "Attempt already claimed, skipping"
                    );
                }
                Err(e) => {
                    tracing::error!(
                        user_id = subscription.user_id,
                        "❌ Could not claim attempt: {e}"
                    );
                    report.errors += 1;
                }
            }
        }

        let snapshots = self.fetch_locations(&claimed).await;
        let outcomes = join_all(claimed.iter().map(|c| self.deliver(c, now, &snapshots))).await;

        for outcome in outcomes {
            match outcome {
                Outcome::Sent => report.sent += 1,
                Outcome::Failed => report.failed += 1,
                Outcome::Skipped => report.skipped += 1,
                Outcome::Error => report.errors += 1,
            }
        }

        tracing::info!("🌤️ Tick {today}: {report}");
        Ok(report)
    }

    async fn fetch_locations(&self, claimed: &[Claimed]) -> HashMap<String, FetchResult> {
        let mut locations: Vec<&str> = claimed.iter().map(|c| c.sub.location.as_str()).collect();
        locations.sort_unstable();
        locations.dedup();

        let results = join_all(locations.iter().map(|loc| self.weather.fetch(loc))).await;
        for (location, result) in locations.iter().zip(&results) {
            if let Err(failure) = result {
                tracing::warn!(
                    "⚠️ {} fetch for '{location}' failed: {failure}",
                    self.weather.name()
                );
            }
        }
        locations.into_iter().map(String::from).zip(results).collect()
    }

    async fn deliver(
        &self,
        claimed: &Claimed,
        now: DateTime<Utc>,
        snapshots: &HashMap<String, FetchResult>,
    ) -> Outcome {
        let sub = &claimed.sub;
        let (date, attempt) = (claimed.date, claimed.attempt);
        let result = match snapshots.get(&sub.location) {
            Some(Ok(snapshot)) => {
                let text = Notification::weather(snapshot, now).render();
                self.gateway.send(&sub.channel_id, &text).await
            }
            Some(Err(failure)) => Err(failure.clone()),
            None => Err(AdapterFailure::unavailable("no weather fetched")),
        };

        let (outcome, written) = match result {
            Ok(()) => {
                tracing::info!(user_id = sub.user_id, attempt, "📨 Sent weather for {}", sub.location);
                (Outcome::Sent, self.db.mark_sent(sub.user_id, date, now))
            }
            Err(failure) if failure.is_transient() => {
                if self.policy.allows_another(attempt) {
                    tracing::warn!(
                        user_id = sub.user_id,
                        attempt,
                        "🔄 Delivery failed, will retry: {failure}"
                    );
                } else {
                    tracing::warn!(
                        user_id = sub.user_id,
                        attempt,
                        "🚫 Delivery failed, giving up for {date}: {failure}"
                    );
                }
                let reason = failure.to_string();
                (Outcome::Failed, self.db.mark_failed(sub.user_id, date, &reason, now))
            }
            Err(failure) => {
                tracing::warn!(user_id = sub.user_id, "⏭️ Skipping {date}: {failure}");
                let reason = failure.to_string();
                (Outcome::Skipped, self.db.mark_skipped(sub.user_id, date, &reason, now))
            }
        };

        match written {
            Ok(()) => outcome,
            Err(e) => {
                tracing::error!(user_id = sub.user_id, "❌ Could not record delivery: {e}");
                Outcome::Error
            }
        }
    }
}
