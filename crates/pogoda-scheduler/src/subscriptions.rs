//! Subscription Manager: validated opt-in, opt-out and reschedule operations.
//!
//! Called by whatever front end talks to users. Every change goes straight
//! to the store; the notifier sees it on its next tick.

use chrono::Utc;
use pogoda_core::error::{PogodaError, Result};
use pogoda_core::types::{DeliveryRecord, Subscription, parse_notify_time};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::persistence::SubscriptionDb;

/// Portable copy of one user's settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionExport {
    pub subscription: Subscription,
    #[serde(default)]
    pub last_delivery: Option<DeliveryRecord>,
}

pub struct SubscriptionManager {
    db: Arc<SubscriptionDb>,
    known_locations: Option<BTreeSet<String>>,
}

impl SubscriptionManager {
    pub fn new(db: Arc<SubscriptionDb>) -> Self {
        Self {
            db,
            known_locations: None,
        }
    }

    /// Only accept locations from this list.
    pub fn with_known_locations<I, S>(mut self, locations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.known_locations = Some(locations.into_iter().map(Into::into).collect());
        self
    }

    /// Opt in, or update the existing subscription (re-enabling it).
    pub fn subscribe(
        &self,
        user_id: i64,
        channel_id: &str,
        location: &str,
        notify_time: &str,
    ) -> Result<Subscription> {
        let notify_time = parse_notify_time(notify_time)?;
        let location = self.validate_location(location)?;
        let channel_id = channel_id.trim();
        if channel_id.is_empty() {
            return Err(PogodaError::validation("channel id must not be empty"));
        }

        let now = Utc::now();
        let sub = match self.db.get_subscription(user_id)? {
            Some(mut existing) => {
                existing.channel_id = channel_id.to_string();
                existing.location = location;
                existing.notify_time = notify_time;
                existing.enabled = true;
                existing.updated_at = now;
                existing
            }
            None => Subscription::new(user_id, channel_id, &location, notify_time),
        };
        self.db.upsert_subscription(&sub)?;
        tracing::info!(
            user_id,
            location = %sub.location,
            notify_time = %sub.notify_time.format("%H:%M"),
            "📝 Subscribed"
        );
        Ok(sub)
    }

    /// Opt out. Returns false if the user was not subscribed.
    pub fn unsubscribe(&self, user_id: i64) -> Result<bool> {
        let removed = self.db.delete_subscription(user_id)?;
        if removed {
            tracing::info!(user_id, "🗑️ Unsubscribed");
        }
        Ok(removed)
    }

    /// Move the daily notification to another time-of-day.
    pub fn reschedule(&self, user_id: i64, notify_time: &str) -> Result<Subscription> {
        let notify_time = parse_notify_time(notify_time)?;
        if !self.db.update_notify_time(user_id, notify_time, Utc::now())? {
            return Err(not_subscribed(user_id));
        }
        self.require(user_id)
    }

    pub fn set_location(&self, user_id: i64, location: &str) -> Result<Subscription> {
        let location = self.validate_location(location)?;
        if !self.db.update_location(user_id, &location, Utc::now())? {
            return Err(not_subscribed(user_id));
        }
        self.require(user_id)
    }

    /// Keep the subscription but stop sending.
    pub fn pause(&self, user_id: i64) -> Result<Subscription> {
        self.set_enabled(user_id, false)
    }

    pub fn resume(&self, user_id: i64) -> Result<Subscription> {
        self.set_enabled(user_id, true)
    }

    fn set_enabled(&self, user_id: i64, enabled: bool) -> Result<Subscription> {
        if !self.db.set_enabled(user_id, enabled, Utc::now())? {
            return Err(not_subscribed(user_id));
        }
        self.require(user_id)
    }

    pub fn get(&self, user_id: i64) -> Result<Option<Subscription>> {
        self.db.get_subscription(user_id)
    }

    pub fn list(&self) -> Result<Vec<Subscription>> {
        self.db.list_subscriptions()
    }

    pub fn export(&self, user_id: i64) -> Result<SubscriptionExport> {
        Ok(SubscriptionExport {
            subscription: self.require(user_id)?,
            last_delivery: self.db.last_delivery(user_id)?,
        })
    }

    /// Restore exported settings. Delivery history is not imported.
    pub fn import(&self, export: &SubscriptionExport) -> Result<Subscription> {
        let mut sub = export.subscription.clone();
        sub.location = self.validate_location(&sub.location)?;
        if sub.channel_id.trim().is_empty() {
            return Err(PogodaError::validation("channel id must not be empty"));
        }
        sub.updated_at = Utc::now();
        self.db.upsert_subscription(&sub)?;
        Ok(sub)
    }

    fn require(&self, user_id: i64) -> Result<Subscription> {
        self.db
            .get_subscription(user_id)?
            .ok_or_else(|| not_subscribed(user_id))
    }

    fn validate_location(&self, location: &str) -> Result<String> {
        let location = location.trim();
        if location.is_empty() {
            return Err(PogodaError::validation("location must not be empty"));
        }
        if let Some(known) = &self.known_locations {
            if !known.contains(location) {
                return Err(PogodaError::validation(format!("unknown location '{location}'")));
            }
        }
        Ok(location.to_string())
    }
}

fn not_subscribed(user_id: i64) -> PogodaError {
    PogodaError::NotFound(format!("user {user_id} has no subscription"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pogoda_core::types::format_notify_time;

    fn manager() -> SubscriptionManager {
        SubscriptionManager::new(Arc::new(SubscriptionDb::open_in_memory().unwrap()))
    }

    #[test]
    fn test_subscribe_validates_input() {
        let m = manager();
        assert!(m.subscribe(42, "42", "Білобожниця", "25:00").unwrap_err().is_validation());
        assert!(m.subscribe(42, "42", "   ", "08:00").unwrap_err().is_validation());
        assert!(m.subscribe(42, "", "Білобожниця", "08:00").unwrap_err().is_validation());
        // Nothing was persisted.
        assert!(m.list().unwrap().is_empty());
    }

    #[test]
    fn test_subscribe_is_idempotent() {
        let m = manager();
        m.subscribe(42, "42", "Білобожниця", "08:00").unwrap();
        m.pause(42).unwrap();
        let again = m.subscribe(42, "42", " Звиняч ", "09:15").unwrap();

        assert_eq!(m.list().unwrap().len(), 1);
        assert_eq!(again.location, "Звиняч");
        assert_eq!(format_notify_time(again.notify_time), "09:15");
        assert!(again.enabled);
    }

    #[test]
    fn test_subscribe_then_unsubscribe() {
        let m = manager();
        m.subscribe(42, "42", "Білобожниця", "08:00").unwrap();
        assert!(m.unsubscribe(42).unwrap());
        assert!(!m.unsubscribe(42).unwrap());
        assert!(m.get(42).unwrap().is_none());
    }

    #[test]
    fn test_reschedule_and_set_location() {
        let m = manager();
        m.subscribe(42, "42", "Білобожниця", "08:00").unwrap();

        let sub = m.reschedule(42, "20:00").unwrap();
        assert_eq!(format_notify_time(sub.notify_time), "20:00");
        assert!(m.reschedule(42, "8am").unwrap_err().is_validation());

        let sub = m.set_location(42, "Косів").unwrap();
        assert_eq!(sub.location, "Косів");

        assert!(matches!(m.reschedule(7, "08:00"), Err(PogodaError::NotFound(_))));
        assert!(matches!(m.set_location(7, "Косів"), Err(PogodaError::NotFound(_))));
    }

    #[test]
    fn test_pause_resume() {
        let m = manager();
        m.subscribe(42, "42", "Білобожниця", "08:00").unwrap();
        assert!(!m.pause(42).unwrap().enabled);
        assert!(m.resume(42).unwrap().enabled);
        assert!(matches!(m.pause(7), Err(PogodaError::NotFound(_))));
    }

    #[test]
    fn test_known_locations() {
        let m = manager().with_known_locations(["Білобожниця", "Косів"]);
        assert!(m.subscribe(42, "42", "Косів", "08:00").is_ok());
        assert!(m.subscribe(42, "42", "Київ", "08:00").unwrap_err().is_validation());
        assert!(m.set_location(42, "Київ").unwrap_err().is_validation());
    }

    #[test]
    fn test_export_import() {
        let source = manager();
        source.subscribe(42, "42", "Білобожниця", "08:00").unwrap();
        let export = source.export(42).unwrap();
        assert!(export.last_delivery.is_none());

        let json = serde_json::to_string(&export).unwrap();
        let parsed: SubscriptionExport = serde_json::from_str(&json).unwrap();

        let target = manager();
        let imported = target.import(&parsed).unwrap();
        assert_eq!(imported.user_id, 42);
        assert_eq!(target.get(42).unwrap().unwrap().location, "Білобожниця");

        assert!(matches!(source.export(7), Err(PogodaError::NotFound(_))));
    }
}
