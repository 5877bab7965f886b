//! Background refresh scheduler.
//!
//! # Lifecycle
//!
//! ```text
//! spawn(token)
//!   ├─ check immediately ("startup")
//!   └─ every tick ("scheduled"), until token is cancelled:
//!         should_run(now)?  → refresh_many(configured sources)
//! ```
//!
//! The tick is much finer than the refresh interval, so a missed or delayed
//! wake-up costs at most one tick of staleness.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::refresh::{normalize_urls, RefreshEngine};
use crate::store::{SourceStore, StoreError};

/// Minimum age of the last full refresh before another one runs.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// How often the scheduler wakes up to check.
pub const DEFAULT_TICK: Duration = Duration::from_secs(60 * 60);

pub struct RefreshScheduler {
    engine: Arc<RefreshEngine>,
    sources: Arc<dyn SourceStore>,
    interval: Duration,
    tick: Duration,
}

impl RefreshScheduler {
    pub fn new(engine: Arc<RefreshEngine>, sources: Arc<dyn SourceStore>) -> Self {
        Self {
            engine,
            sources,
            interval: DEFAULT_REFRESH_INTERVAL,
            tick: DEFAULT_TICK,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    /// Whether a full refresh is due at `now` (Unix seconds).
    ///
    /// Never with no configured sources; always if no full refresh has been
    /// recorded; otherwise once the last one is at least `interval` old.
    pub fn should_run(&self, now: i64) -> Result<bool, StoreError> {
        let urls = self.sources.configured_sources()?;
        if normalize_urls(&urls).is_empty() {
            return Ok(false);
        }

        let last_run_at = self.engine.cache().last_run_at()?;
        if last_run_at <= 0 {
            return Ok(true);
        }
        let interval = i64::try_from(self.interval.as_secs()).unwrap_or(i64::MAX);
        Ok(now.saturating_sub(last_run_at) >= interval)
    }

    /// One scheduler check. Errors are logged; the loop keeps going.
    pub async fn run_once(&self, trigger: &str) {
        let now = chrono::Utc::now().timestamp();
        match self.should_run(now) {
            Ok(true) => self.refresh_all(trigger).await,
            Ok(false) => tracing::debug!(trigger, "proxy cache refresh not due"),
            Err(e) => tracing::error!(trigger, error = %e, "failed to check proxy cache refresh time"),
        }
    }

    async fn refresh_all(&self, trigger: &str) {
        let urls = match self.sources.configured_sources() {
            Ok(urls) => urls,
            Err(e) => {
                tracing::error!(trigger, error = %e, "failed to load subscription sources");
                return;
            }
        };
        match self.engine.refresh_many(&urls).await {
            Ok(result) if result.total == 0 => {
                tracing::info!(trigger, "proxy cache refresh skipped: no subscription sources");
            }
            Ok(result) => tracing::info!(
                trigger,
                success = result.success,
                failed = result.failed,
                total = result.total,
                "proxy cache refreshed"
            ),
            Err(e) => tracing::error!(trigger, error = %e, "proxy cache refresh failed"),
        }
    }

    /// Spawn the background loop. Cancel `token` to stop it; an in-flight
    /// batch is allowed to finish first.
    pub fn spawn(self: Arc<Self>, token: CancellationToken) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.tick);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // First tick fires immediately.
            ticker.tick().await;
            self.run_once("startup").await;
            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        tracing::debug!("refresh scheduler cancelled");
                        break;
                    }
                    _ = ticker.tick() => self.run_once("scheduled").await,
                }
            }
        })
    }
}
