//! Sliding-window error-rate monitor.
//!
//! Recorders append timestamped entries without ever waiting on the leak task.
//! The leak task periodically expires entries older than the window; when the
//! bag still holds more than `capacity` entries it trims the oldest, flags the
//! bag as throttled and pauses for `throttler_wait` before leaking again.
//! `is_throttled` is the hook for callers that want to back off non-critical
//! work; the fetch and crawl loops only feed the bag.

use anyhow::bail;
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Clone, Debug)]
pub struct ErrBagConfig {
    pub throttler_wait: Duration,
    pub capacity: usize,
    pub window: Duration,
    pub leak_interval: Duration,
}

struct ErrEntry {
    recorded_at: Instant,
    wall_time: OffsetDateTime,
    message: String,
}

#[derive(Clone)]
pub struct ErrBag {
    inner: Arc<ErrBagInner>,
}

struct ErrBagInner {
    config: ErrBagConfig,
    entries: Mutex<VecDeque<ErrEntry>>,
    throttled: AtomicBool,
    deflated: AtomicBool,
    shutdown: CancellationToken,
    leak_task: Mutex<Option<JoinHandle<()>>>,
}

impl ErrBag {
    pub fn new(config: ErrBagConfig) -> anyhow::Result<Self> {
        if config.capacity == 0 {
            bail!("error bag capacity must be at least 1");
        }
        if config.leak_interval.is_zero() {
            bail!("error bag leak interval must be positive");
        }
        Ok(Self {
            inner: Arc::new(ErrBagInner {
                config,
                entries: Mutex::new(VecDeque::new()),
                throttled: AtomicBool::new(false),
                deflated: AtomicBool::new(false),
                shutdown: CancellationToken::new(),
                leak_task: Mutex::new(None),
            }),
        })
    }

    pub fn config(&self) -> &ErrBagConfig {
        &self.inner.config
    }

    /// Starts the leak task. Must be called from within a tokio runtime.
    pub fn inflate(&self) {
        if self.inner.deflated.load(Ordering::SeqCst) {
            warn!("error bag already deflated; not restarting leak task");
            return;
        }
        let Ok(mut slot) = self.inner.leak_task.lock() else {
            return;
        };
        if slot.is_some() {
            return;
        }
        let bag = self.clone();
        *slot = Some(tokio::spawn(async move { bag.leak_loop().await }));
        debug!(
            capacity = self.inner.config.capacity,
            window_ms = self.inner.config.window.as_millis() as u64,
            "error bag inflated"
        );
    }

    pub fn record(&self, err: impl fmt::Display) {
        let entry = ErrEntry {
            recorded_at: Instant::now(),
            wall_time: OffsetDateTime::now_utc(),
            message: err.to_string(),
        };
        if let Ok(mut entries) = self.inner.entries.lock() {
            entries.push_back(entry);
        }
    }

    /// Number of recorded entries still inside the window.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.inner
            .entries
            .lock()
            .map(|entries| {
                entries
                    .iter()
                    .filter(|entry| !self.is_expired(entry, now))
                    .count()
            })
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_throttled(&self) -> bool {
        self.inner.throttled.load(Ordering::SeqCst)
    }

    /// Runs one leak pass and reports whether the bag was over capacity.
    pub fn leak(&self) -> bool {
        let now = Instant::now();
        let Ok(mut entries) = self.inner.entries.lock() else {
            return false;
        };
        while entries
            .front()
            .is_some_and(|entry| self.is_expired(entry, now))
        {
            entries.pop_front();
        }
        let capacity = self.inner.config.capacity;
        if entries.len() <= capacity {
            return false;
        }
        let excess = entries.len() - capacity;
        entries.drain(..excess);
        true
    }

    /// Stops the leak task and logs what is left in the bag. Later calls are
    /// no-ops.
    pub fn deflate(&self) {
        if self.inner.deflated.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.shutdown.cancel();
        if let Ok(mut slot) = self.inner.leak_task.lock()
            && let Some(handle) = slot.take()
        {
            handle.abort();
        }
        self.inner.throttled.store(false, Ordering::SeqCst);

        let remaining: Vec<ErrEntry> = self
            .inner
            .entries
            .lock()
            .map(|mut entries| entries.drain(..).collect())
            .unwrap_or_default();
        if remaining.is_empty() {
            info!("error bag deflated; no pending errors");
            return;
        }
        warn!(count = remaining.len(), "error bag deflated with pending errors");
        for entry in remaining {
            let ts = entry
                .wall_time
                .format(&Rfc3339)
                .unwrap_or_else(|_| entry.wall_time.unix_timestamp().to_string());
            warn!(recorded_at = %ts, error = %entry.message, "pending error");
        }
    }

    fn is_expired(&self, entry: &ErrEntry, now: Instant) -> bool {
        now.saturating_duration_since(entry.recorded_at) >= self.inner.config.window
    }

    async fn leak_loop(self) {
        let config = self.inner.config.clone();
        let shutdown = self.inner.shutdown.clone();
        let mut ticker = tokio::time::interval(config.leak_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }
            if !self.leak() {
                continue;
            }
            self.inner.throttled.store(true, Ordering::SeqCst);
            warn!(
                capacity = config.capacity,
                wait_secs = config.throttler_wait.as_secs(),
                "error rate over capacity; throttling"
            );
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(config.throttler_wait) => {}
            }
            self.inner.throttled.store(false, Ordering::SeqCst);
            info!("error bag throttle lifted");
        }
    }
}
