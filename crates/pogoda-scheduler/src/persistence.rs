//! SQLite-backed persistence for subscriptions and delivery records.
//! Survives restarts; one connection behind a mutex serializes writers.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use pogoda_core::error::{PogodaError, Result};
use pogoda_core::types::{
    DeliveryRecord, DeliveryStatus, Subscription, format_notify_time, parse_notify_time,
};
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use crate::retry::RetryPolicy;

/// Reason stored on a record while its attempt is still running.
pub const IN_FLIGHT: &str = "attempt in flight";

const DATE_FMT: &str = "%Y-%m-%d";

/// SQLite-backed store for all notification state.
pub struct SubscriptionDb {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl SubscriptionDb {
    /// Open or create the database file.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(|e| db_err("DB open", e))?;
        conn.busy_timeout(Duration::from_secs(5))
            .map_err(|e| db_err("busy timeout", e))?;
        // WAL lets the CLI read while the service writes.
        conn.execute_batch("PRAGMA journal_mode = WAL;").ok();
        let db = Self {
            conn: Mutex::new(conn),
            path: Some(path.to_path_buf()),
        };
        db.migrate()?;
        Ok(db)
    }

    /// Private in-memory database, used by tests and dry runs.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| db_err("DB open", e))?;
        let db = Self {
            conn: Mutex::new(conn),
            path: None,
        };
        db.migrate()?;
        Ok(db)
    }

    /// File backing this store, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| PogodaError::Persistence(format!("connection lock poisoned: {e}")))
    }

    /// Run migrations to create tables.
    fn migrate(&self) -> Result<()> {
        self.conn()?
            .execute_batch(
                "
            CREATE TABLE IF NOT EXISTS subscriptions (
                user_id INTEGER PRIMARY KEY,
                channel_id TEXT NOT NULL,
                location TEXT NOT NULL,
                notify_time TEXT NOT NULL,         -- HH:MM, local wall clock
                enabled INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            -- One row per user per local calendar day
            CREATE TABLE IF NOT EXISTS delivery_records (
                user_id INTEGER NOT NULL,
                date TEXT NOT NULL,                -- YYYY-MM-DD
                status TEXT NOT NULL,              -- sent, failed, skipped
                attempts INTEGER NOT NULL DEFAULT 0,
                last_error TEXT,
                next_attempt_at INTEGER NOT NULL,  -- unix seconds
                updated_at TEXT NOT NULL,
                PRIMARY KEY (user_id, date)
            );

            CREATE INDEX IF NOT EXISTS idx_delivery_records_date
                ON delivery_records (date, status);
         ",
            )
            .map_err(|e| db_err("Migration", e))?;
        Ok(())
    }

    // ─── Subscriptions ──────────────────────────────────────

    /// Insert or replace a subscription, keyed by user_id.
    pub fn upsert_subscription(&self, sub: &Subscription) -> Result<()> {
        self.conn()?
            .execute(
                "INSERT INTO subscriptions
                 (user_id, channel_id, location, notify_time, enabled, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(user_id) DO UPDATE SET
                    channel_id = excluded.channel_id,
                    location = excluded.location,
                    notify_time = excluded.notify_time,
                    enabled = excluded.enabled,
                    updated_at = excluded.updated_at",
                params![
                    sub.user_id,
                    sub.channel_id,
                    sub.location,
                    format_notify_time(sub.notify_time),
                    sub.enabled as i32,
                    ts(sub.created_at),
                    ts(sub.updated_at),
                ],
            )
            .map_err(|e| db_err("Save subscription", e))?;
        Ok(())
    }

    /// Get one user's subscription.
    pub fn get_subscription(&self, user_id: i64) -> Result<Option<Subscription>> {
        self.conn()?
            .query_row(
                &format!("{SUBSCRIPTION_COLUMNS} WHERE user_id = ?1"),
                [user_id],
                subscription_from_row,
            )
            .optional()
            .map_err(|e| db_err("Load subscription", e))
    }

    /// All subscriptions, enabled or not.
    pub fn list_subscriptions(&self) -> Result<Vec<Subscription>> {
        self.query_subscriptions(&format!("{SUBSCRIPTION_COLUMNS} ORDER BY user_id"))
    }

    /// Snapshot of every enabled subscription.
    pub fn enabled_subscriptions(&self) -> Result<Vec<Subscription>> {
        self.query_subscriptions(&format!(
            "{SUBSCRIPTION_COLUMNS} WHERE enabled = 1 ORDER BY user_id"
        ))
    }

    fn query_subscriptions(&self, sql: &str) -> Result<Vec<Subscription>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(sql).map_err(|e| db_err("Query subscriptions", e))?;
        let rows = stmt
            .query_map([], subscription_from_row)
            .map_err(|e| db_err("Query subscriptions", e))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| db_err("Read subscription", e))
    }

    /// Delete a subscription. Returns false if the user had none.
    pub fn delete_subscription(&self, user_id: i64) -> Result<bool> {
        let n = self
            .conn()?
            .execute("DELETE FROM subscriptions WHERE user_id = ?1", [user_id])
            .map_err(|e| db_err("Delete subscription", e))?;
        Ok(n > 0)
    }

    /// Change the notify time. Returns false if the user had no subscription.
    pub fn update_notify_time(
        &self,
        user_id: i64,
        notify_time: chrono::NaiveTime,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        self.update_subscription_field("notify_time", format_notify_time(notify_time), user_id, now)
    }

    /// Change the location. Returns false if the user had no subscription.
    pub fn update_location(&self, user_id: i64, location: &str, now: DateTime<Utc>) -> Result<bool> {
        self.update_subscription_field("location", location.to_string(), user_id, now)
    }

    /// Enable or disable. Returns false if the user had no subscription.
    pub fn set_enabled(&self, user_id: i64, enabled: bool, now: DateTime<Utc>) -> Result<bool> {
        let n = self
            .conn()?
            .execute(
                "UPDATE subscriptions SET enabled = ?1, updated_at = ?2 WHERE user_id = ?3",
                params![enabled as i32, ts(now), user_id],
            )
            .map_err(|e| db_err("Update subscription", e))?;
        Ok(n > 0)
    }

    fn update_subscription_field(
        &self,
        column: &'static str,
        value: String,
        user_id: i64,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let n = self
            .conn()?
            .execute(
                &format!("UPDATE subscriptions SET {column} = ?1, updated_at = ?2 WHERE user_id = ?3"),
                params![value, ts(now), user_id],
            )
            .map_err(|e| db_err("Update subscription", e))?;
        Ok(n > 0)
    }

    // ─── Delivery records ───────────────────────────────────

    /// Record for one user on one date.
    pub fn delivery_record(&self, user_id: i64, date: NaiveDate) -> Result<Option<DeliveryRecord>> {
        self.conn()?
            .query_row(
                &format!("{RECORD_COLUMNS} WHERE user_id = ?1 AND date = ?2"),
                params![user_id, date.format(DATE_FMT).to_string()],
                record_from_row,
            )
            .optional()
            .map_err(|e| db_err("Load delivery record", e))
    }

    /// Every record for a date.
    pub fn delivery_records_on(&self, date: NaiveDate) -> Result<Vec<DeliveryRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!("{RECORD_COLUMNS} WHERE date = ?1 ORDER BY user_id"))
            .map_err(|e| db_err("Query delivery records", e))?;
        let rows = stmt
            .query_map([date.format(DATE_FMT).to_string()], record_from_row)
            .map_err(|e| db_err("Query delivery records", e))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| db_err("Read delivery record", e))
    }

    /// Most recent record for a user, any date.
    pub fn last_delivery(&self, user_id: i64) -> Result<Option<DeliveryRecord>> {
        self.conn()?
            .query_row(
                &format!("{RECORD_COLUMNS} WHERE user_id = ?1 ORDER BY date DESC LIMIT 1"),
                [user_id],
                record_from_row,
            )
            .optional()
            .map_err(|e| db_err("Load delivery record", e))
    }

    /// Atomically reserve the next attempt for (user, date).
    ///
    /// Succeeds when no record exists yet, or when the record is `failed`,
    /// below the attempt cap, and its backoff has elapsed. The record is
    /// written as `failed` right away so an interrupted attempt counts.
    /// Returns the attempt number, or `None` if the slot was not claimable.
    pub fn claim_attempt(
        &self,
        user_id: i64,
        date: NaiveDate,
        now: DateTime<Utc>,
        policy: &RetryPolicy,
    ) -> Result<Option<u32>> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(|e| db_err("Begin claim", e))?;
        let date_str = date.format(DATE_FMT).to_string();

        let changed = tx
            .execute(
                "INSERT INTO delivery_records
                 (user_id, date, status, attempts, last_error, next_attempt_at, updated_at)
                 VALUES (?1, ?2, 'failed', 1, ?3, ?4, ?5)
                 ON CONFLICT(user_id, date) DO UPDATE SET
                    attempts = delivery_records.attempts + 1,
                    last_error = excluded.last_error,
                    updated_at = excluded.updated_at
                 WHERE delivery_records.status = 'failed'
                   AND delivery_records.attempts < ?6
                   AND delivery_records.next_attempt_at <= ?4",
                params![
                    user_id,
                    date_str,
                    IN_FLIGHT,
                    now.timestamp(),
                    ts(now),
                    policy.max_attempts,
                ],
            )
            .map_err(|e| db_err("Claim attempt", e))?;
        if changed == 0 {
            return Ok(None);
        }

        let attempt: u32 = tx
            .query_row(
                "SELECT attempts FROM delivery_records WHERE user_id = ?1 AND date = ?2",
                params![user_id, date_str],
                |row| row.get(0),
            )
            .map_err(|e| db_err("Claim attempt", e))?;

        let retry_at = now + policy.delay_after(attempt);
        tx.execute(
            "UPDATE delivery_records SET next_attempt_at = ?1 WHERE user_id = ?2 AND date = ?3",
            params![retry_at.timestamp(), user_id, date_str],
        )
        .map_err(|e| db_err("Claim attempt", e))?;

        tx.commit().map_err(|e| db_err("Commit claim", e))?;
        Ok(Some(attempt))
    }

    /// Mark the day as delivered. A `sent` record is never downgraded.
    pub fn mark_sent(&self, user_id: i64, date: NaiveDate, now: DateTime<Utc>) -> Result<()> {
        self.write_outcome(user_id, date, DeliveryStatus::Sent, None, now)
    }

    /// Record a failed attempt; retry timing was set when it was claimed.
    pub fn mark_failed(
        &self,
        user_id: i64,
        date: NaiveDate,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.write_outcome(user_id, date, DeliveryStatus::Failed, Some(reason), now)
    }

    /// Give up for the day without retrying.
    pub fn mark_skipped(
        &self,
        user_id: i64,
        date: NaiveDate,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.write_outcome(user_id, date, DeliveryStatus::Skipped, Some(reason), now)
    }

    fn write_outcome(
        &self,
        user_id: i64,
        date: NaiveDate,
        status: DeliveryStatus,
        reason: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.conn()?
            .execute(
                "INSERT INTO delivery_records
                 (user_id, date, status, attempts, last_error, next_attempt_at, updated_at)
                 VALUES (?1, ?2, ?3, 1, ?4, ?5, ?6)
                 ON CONFLICT(user_id, date) DO UPDATE SET
                    status = excluded.status,
                    last_error = excluded.last_error,
                    updated_at = excluded.updated_at
                 WHERE delivery_records.status != 'sent'",
                params![
                    user_id,
                    date.format(DATE_FMT).to_string(),
                    status.as_str(),
                    reason,
                    now.timestamp(),
                    ts(now),
                ],
            )
            .map_err(|e| db_err("Save delivery record", e))?;
        Ok(())
    }

    /// Drop records older than `date`. Returns how many were removed.
    pub fn purge_records_before(&self, date: NaiveDate) -> Result<usize> {
        self.conn()?
            .execute(
                "DELETE FROM delivery_records WHERE date < ?1",
                [date.format(DATE_FMT).to_string()],
            )
            .map_err(|e| db_err("Purge delivery records", e))
    }

    // ─── Backups ────────────────────────────────────────────

    /// Write a consistent copy of the database into `dir`.
    pub fn backup_to(&self, dir: &Path, now: DateTime<Utc>) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let file = dir.join(format!("backup_{}.db", now.format("%Y%m%d_%H%M%S")));
        if file.exists() {
            return Err(PogodaError::Persistence(format!(
                "backup {} already exists",
                file.display()
            )));
        }
        self.conn()?
            .execute("VACUUM INTO ?1", [file.to_string_lossy().to_string()])
            .map_err(|e| db_err("Backup", e))?;
        tracing::info!("💾 Database backup created: {}", file.display());
        Ok(file)
    }
}

const SUBSCRIPTION_COLUMNS: &str = "SELECT user_id, channel_id, location, notify_time, enabled, created_at, updated_at FROM subscriptions";

const RECORD_COLUMNS: &str = "SELECT user_id, date, status, attempts, last_error, next_attempt_at, updated_at FROM delivery_records";

fn subscription_from_row(row: &Row<'_>) -> rusqlite::Result<Subscription> {
    let notify_time: String = row.get(3)?;
    Ok(Subscription {
        user_id: row.get(0)?,
        channel_id: row.get(1)?,
        location: row.get(2)?,
        notify_time: parse_notify_time(&notify_time).map_err(|e| conversion_err(3, e))?,
        enabled: row.get::<_, i32>(4)? != 0,
        created_at: parse_ts(5, &row.get::<_, String>(5)?)?,
        updated_at: parse_ts(6, &row.get::<_, String>(6)?)?,
    })
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<DeliveryRecord> {
    let date: String = row.get(1)?;
    let status: String = row.get(2)?;
    let next_attempt_at: i64 = row.get(5)?;
    Ok(DeliveryRecord {
        user_id: row.get(0)?,
        date: NaiveDate::parse_from_str(&date, DATE_FMT).map_err(|e| conversion_err(1, e))?,
        status: DeliveryStatus::parse(&status).ok_or_else(|| {
            conversion_err(2, PogodaError::Persistence(format!("unknown status '{status}'")))
        })?,
        attempts: row.get(3)?,
        last_error: row.get(4)?,
        next_attempt_at: DateTime::from_timestamp(next_attempt_at, 0).ok_or_else(|| {
            conversion_err(5, PogodaError::Persistence("timestamp out of range".into()))
        })?,
        timestamp: parse_ts(6, &row.get::<_, String>(6)?)?,
    })
}

fn ts(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

fn parse_ts(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| conversion_err(idx, e))
}

fn conversion_err<E>(idx: usize, e: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
}

fn db_err(context: &str, e: rusqlite::Error) -> PogodaError {
    PogodaError::Persistence(format!("{context}: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveTime, TimeZone};

    fn sub(user_id: i64, time: &str) -> Subscription {
        Subscription::new(
            user_id,
            &user_id.to_string(),
            "Білобожниця",
            parse_notify_time(time).unwrap(),
        )
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()
    }

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 19, h, m, 0).unwrap()
    }

    fn policy() -> RetryPolicy {
        RetryPolicy::exponential(3, Duration::from_secs(60))
    }

    #[test]
    fn test_open_and_migrate() {
        let dir = tempfile::tempdir().unwrap();
        let db = SubscriptionDb::open(&dir.path().join("nested").join("test.db")).unwrap();
        assert!(db.list_subscriptions().unwrap().is_empty());
        assert!(db.path().is_some());
    }

    #[test]
    fn test_subscription_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pogoda.db");
        {
            let db = SubscriptionDb::open(&path).unwrap();
            db.upsert_subscription(&sub(42, "08:00")).unwrap();
        }
        let db = SubscriptionDb::open(&path).unwrap();
        let loaded = db.get_subscription(42).unwrap().unwrap();
        assert_eq!(loaded.notify_time, NaiveTime::from_hms_opt(8, 0, 0).unwrap());
        assert_eq!(loaded.location, "Білобожниця");
    }

    #[test]
    fn test_upsert_updates_in_place() {
        let db = SubscriptionDb::open_in_memory().unwrap();
        let first = sub(42, "08:00");
        db.upsert_subscription(&first).unwrap();

        let mut second = sub(42, "09:30");
        second.location = "Звиняч".into();
        db.upsert_subscription(&second).unwrap();

        let all = db.list_subscriptions().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].location, "Звиняч");
        // created_at is kept from the first insert
        assert_eq!(all[0].created_at, first.created_at);
    }

    #[test]
    fn test_enabled_filter_and_updates() {
        let db = SubscriptionDb::open_in_memory().unwrap();
        db.upsert_subscription(&sub(1, "08:00")).unwrap();
        db.upsert_subscription(&sub(2, "08:00")).unwrap();

        assert!(db.set_enabled(2, false, at(7, 0)).unwrap());
        let enabled = db.enabled_subscriptions().unwrap();
        assert_eq!(enabled.len(), 1);
        assert_eq!(enabled[0].user_id, 1);

        assert!(db.update_notify_time(1, NaiveTime::from_hms_opt(20, 0, 0).unwrap(), at(7, 0)).unwrap());
        assert!(db.update_location(1, "Косів", at(7, 0)).unwrap());
        let one = db.get_subscription(1).unwrap().unwrap();
        assert_eq!(format_notify_time(one.notify_time), "20:00");
        assert_eq!(one.location, "Косів");

        assert!(!db.update_location(99, "Косів", at(7, 0)).unwrap());
        assert!(db.delete_subscription(1).unwrap());
        assert!(!db.delete_subscription(1).unwrap());
    }

    #[test]
    fn test_claim_only_once_until_backoff_elapses() {
        let db = SubscriptionDb::open_in_memory().unwrap();
        let p = policy();

        assert_eq!(db.claim_attempt(42, day(), at(8, 0), &p).unwrap(), Some(1));
        // Claimed record reads as failed while the attempt runs.
        let rec = db.delivery_record(42, day()).unwrap().unwrap();
        assert_eq!(rec.status, DeliveryStatus::Failed);
        assert_eq!(rec.last_error.as_deref(), Some(IN_FLIGHT));
        assert_eq!(rec.next_attempt_at, at(8, 1));

        // Same instant: backoff not elapsed.
        assert_eq!(db.claim_attempt(42, day(), at(8, 0), &p).unwrap(), None);
        assert_eq!(db.claim_attempt(42, day(), at(8, 1), &p).unwrap(), Some(2));
        assert_eq!(db.claim_attempt(42, day(), at(8, 3), &p).unwrap(), Some(3));
        // Cap reached.
        assert_eq!(db.claim_attempt(42, day(), at(12, 0), &p).unwrap(), None);
        assert_eq!(db.delivery_record(42, day()).unwrap().unwrap().attempts, 3);
    }

    #[test]
    fn test_sent_is_never_overwritten() {
        let db = SubscriptionDb::open_in_memory().unwrap();
        let p = policy();
        db.claim_attempt(42, day(), at(8, 0), &p).unwrap();
        db.mark_sent(42, day(), at(8, 0)).unwrap();

        db.mark_failed(42, day(), "late failure", at(8, 5)).unwrap();
        db.mark_skipped(42, day(), "late skip", at(8, 5)).unwrap();
        assert_eq!(db.claim_attempt(42, day(), at(9, 0), &p).unwrap(), None);

        let rec = db.delivery_record(42, day()).unwrap().unwrap();
        assert_eq!(rec.status, DeliveryStatus::Sent);
        assert_eq!(rec.attempts, 1);
        assert!(rec.last_error.is_none());
    }

    #[test]
    fn test_skipped_is_not_claimable() {
        let db = SubscriptionDb::open_in_memory().unwrap();
        let p = policy();
        db.claim_attempt(42, day(), at(8, 0), &p).unwrap();
        db.mark_skipped(42, day(), "unknown location", at(8, 0)).unwrap();
        assert_eq!(db.claim_attempt(42, day(), at(10, 0), &p).unwrap(), None);
    }

    #[test]
    fn test_records_per_date_and_purge() {
        let db = SubscriptionDb::open_in_memory().unwrap();
        let yesterday = day().pred_opt().unwrap();
        db.mark_sent(1, yesterday, at(8, 0)).unwrap();
        db.mark_sent(1, day(), at(8, 0)).unwrap();
        db.mark_failed(2, day(), "timeout", at(8, 0)).unwrap();

        assert_eq!(db.delivery_records_on(day()).unwrap().len(), 2);
        assert_eq!(db.last_delivery(1).unwrap().unwrap().date, day());

        assert_eq!(db.purge_records_before(day()).unwrap(), 1);
        assert!(db.delivery_record(1, yesterday).unwrap().is_none());
    }

    #[test]
    fn test_backup_creates_readable_copy() {
        let dir = tempfile::tempdir().unwrap();
        let db = SubscriptionDb::open(&dir.path().join("pogoda.db")).unwrap();
        db.upsert_subscription(&sub(42, "08:00")).unwrap();

        let backup = db.backup_to(&dir.path().join("backups"), at(8, 0)).unwrap();
        assert!(backup.ends_with("backup_20261019_080000.db"));

        let copy = SubscriptionDb::open(&backup).unwrap();
        assert_eq!(copy.list_subscriptions().unwrap().len(), 1);

        // Same timestamp twice is refused rather than overwritten.
        assert!(db.backup_to(&dir.path().join("backups"), at(8, 0)).is_err());
    }
}
