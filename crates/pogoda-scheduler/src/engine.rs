//! Scheduler engine: the tick loop driving the notifier.
//! Uses tokio::interval; sleeps between ticks and never runs two at once.

use chrono::{DateTime, Utc};
use pogoda_core::error::{PogodaError, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::notifier::Notifier;

/// Source of tick timestamps.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Owns the background tick task. Start and stop it explicitly.
pub struct Scheduler {
    notifier: Arc<Notifier>,
    interval: Duration,
    clock: Clock,
    shutdown: Option<watch::Sender<bool>>,
    handle: Option<JoinHandle<()>>,
}

impl Scheduler {
    pub fn new(notifier: Arc<Notifier>, interval: Duration) -> Self {
        Self {
            notifier,
            interval,
            clock: Arc::new(Utc::now),
            shutdown: None,
            handle: None,
        }
    }

    /// Replace the wall clock, e.g. with a fixed instant in tests.
    pub fn with_clock<F>(mut self, clock: F) -> Self
    where
        F: Fn() -> DateTime<Utc> + Send + Sync + 'static,
    {
        self.clock = Arc::new(clock);
        self
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Spawn the tick loop on the current tokio runtime.
    pub fn start(&mut self) -> Result<()> {
        if self.is_running() {
            return Err(PogodaError::Scheduler("scheduler is already running".into()));
        }
        if self.interval.is_zero() {
            return Err(PogodaError::Scheduler("tick interval must be > 0".into()));
        }

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(run_loop(
            self.notifier.clone(),
            self.interval,
            self.clock.clone(),
            rx,
        ));
        self.shutdown = Some(tx);
        self.handle = Some(handle);
        tracing::info!("⏰ Scheduler started (tick every {}s)", self.interval.as_secs_f64());
        Ok(())
    }

    /// Signal shutdown and wait for the loop. A tick in progress finishes first.
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(true);
        }
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                tracing::error!("❌ Scheduler task ended abnormally: {e}");
            }
            tracing::info!("⏹️ Scheduler stopped");
        }
    }
}

async fn run_loop(
    notifier: Arc<Notifier>,
    period: Duration,
    clock: Clock,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(period);
    // A slow tick pushes the next one back instead of bunching them up.
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last: Option<DateTime<Utc>> = None;

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.changed() => break,
        }
        if *shutdown.borrow() {
            break;
        }

        let mut now = clock();
        if let Some(prev) = last {
            if now < prev {
                tracing::warn!("⚠️ Clock went backwards ({now} < {prev}), reusing last tick time");
                now = prev;
            }
        }
        last = Some(now);

        let notifier = notifier.clone();
        let tick = tokio::spawn(async move { notifier.run_tick(now).await });
        match tick.await {
            Ok(Ok(report)) => {
                if !report.is_empty() {
                    tracing::debug!("Tick done: {report}");
                }
            }
            Ok(Err(e)) => tracing::error!("❌ Tick failed: {e}"),
            Err(e) if e.is_panic() => tracing::error!("💥 Tick panicked: {e}"),
            Err(e) => tracing::error!("❌ Tick task cancelled: {e}"),
        }
    }
}
