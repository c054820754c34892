//! # Pogoda Scheduler
//!
//! Daily weather notifications: subscriptions, per-day delivery records,
//! and the tick loop that sends each subscriber one message a day.
//!
//! ## Architecture
//! ```text
//! Scheduler (tokio interval, one tick at a time)
//!   └── Notifier::run_tick(now)
//!         ├── due set: notify times since the last tick + scheduled retries
//!         ├── claim attempt (SQLite, per user per day)
//!         ├── WeatherClient::fetch, once per location per tick
//!         ├── DeliveryGateway::send, users in parallel
//!         └── record sent / failed / skipped
//!
//! SubscriptionManager ── subscribe / unsubscribe / reschedule / set_location
//!         └── SubscriptionDb (same store, read by the next tick)
//! ```

pub mod engine;
pub mod notifier;
pub mod notify;
pub mod persistence;
pub mod retry;
pub mod subscriptions;

pub use engine::Scheduler;
pub use notifier::{DueDelivery, Notifier, TickReport};
pub use notify::Notification;
pub use persistence::SubscriptionDb;
pub use retry::RetryPolicy;
pub use subscriptions::{SubscriptionExport, SubscriptionManager};

#[cfg(test)]
pub(crate) mod testing;
