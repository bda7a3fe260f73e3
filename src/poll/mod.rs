//! Poll scheduler
//!
//! Runs the fetch-and-refresh cycle: fetch `/api/states`, swap the snapshot
//! into the cache, then run one projection pass. Failures are logged and the
//! previous snapshot stays in place until a later tick succeeds.
//!
//! `start` fetches immediately and then on every interval tick. Each tick's
//! cycle runs as its own task, so `stop` only cancels future ticks and a
//! request already in flight still applies its result.

pub mod client;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::cache::StateCache;
use crate::dom::Document;
use crate::projection::DomProjector;
use crate::types::{Result, Snapshot};

pub use client::{StatesClient, DEFAULT_REQUEST_TIMEOUT};

/// Default interval between poll cycles
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(5000);

/// Shortest tick period; shorter requests are raised to it
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Result of one completed cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Snapshot replaced and projected
    Applied { entities: usize },
    /// A newer response was already applied; this one was dropped
    Stale { sequence: u64 },
}

/// Poll cycle counters
#[derive(Debug, Default)]
pub struct PollStats {
    successes: AtomicU64,
    failures: AtomicU64,
    stale: AtomicU64,
    last_success: Mutex<Option<DateTime<Utc>>>,
}

impl PollStats {
    pub fn successes(&self) -> u64 {
        self.successes.load(Ordering::SeqCst)
    }

    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::SeqCst)
    }

    /// Responses dropped as out of order
    pub fn stale_dropped(&self) -> u64 {
        self.stale.load(Ordering::SeqCst)
    }

    /// Time the last snapshot was applied
    pub fn last_success(&self) -> Option<DateTime<Utc>> {
        *self.last_success.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record_success(&self) {
        self.successes.fetch_add(1, Ordering::SeqCst);
        *self.last_success.lock().unwrap_or_else(PoisonError::into_inner) = Some(Utc::now());
    }

    fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::SeqCst);
    }

    fn record_stale(&self) {
        self.stale.fetch_add(1, Ordering::SeqCst);
    }
}

/// Periodic fetch-and-refresh driver
pub struct PollScheduler<D: Document> {
    client: StatesClient,
    cache: Arc<StateCache>,
    projector: Arc<DomProjector<D>>,
    /// Handle of the tick loop while running
    ticker: Mutex<Option<JoinHandle<()>>>,
    stats: PollStats,
    discard_stale: bool,
    issued: AtomicU64,
    /// Sequence of the last applied response; held across check and replace
    applied: Mutex<u64>,
}

impl<D: Document> PollScheduler<D> {
    pub fn new(client: StatesClient, cache: Arc<StateCache>, projector: Arc<DomProjector<D>>) -> Self {
        Self {
            client,
            cache,
            projector,
            ticker: Mutex::new(None),
            stats: PollStats::default(),
            discard_stale: false,
            issued: AtomicU64::new(0),
            applied: Mutex::new(0),
        }
    }

    /// Drop responses that resolve after a newer one was applied
    pub fn with_stale_discard(mut self, enabled: bool) -> Self {
        self.discard_stale = enabled;
        self
    }

    pub fn client(&self) -> &StatesClient {
        &self.client
    }

    pub fn stats(&self) -> &PollStats {
        &self.stats
    }

    /// Run one fetch-and-refresh cycle now.
    ///
    /// On error the cache is left untouched.
    pub async fn refresh(&self) -> Result<RefreshOutcome> {
        let sequence = self.issued.fetch_add(1, Ordering::SeqCst) + 1;

        let snapshot = match self.client.fetch_states().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                self.stats.record_failure();
                return Err(e);
            }
        };

        Ok(self.apply(sequence, snapshot))
    }

    /// Swap in a fetched snapshot and project it.
    ///
    /// With stale discard enabled the ordering check, the cache swap and the
    /// projection happen under one lock, so an older response can never land
    /// after a newer one on any runtime flavour.
    fn apply(&self, sequence: u64, snapshot: Snapshot) -> RefreshOutcome {
        let mut applied = self.applied.lock().unwrap_or_else(PoisonError::into_inner);
        if self.discard_stale && *applied > sequence {
            self.stats.record_stale();
            debug!(sequence, newest = *applied, "Discarding stale state response");
            return RefreshOutcome::Stale { sequence };
        }
        *applied = (*applied).max(sequence);

        let entities = snapshot.len();
        self.cache.replace(snapshot);
        self.projector.project();
        self.stats.record_success();
        RefreshOutcome::Applied { entities }
    }

    /// Whether the tick loop is scheduled
    pub fn is_running(&self) -> bool {
        self.ticker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Fetch now, then every `interval` until [`stop`](Self::stop).
    ///
    /// Must be called from within a tokio runtime. Calling it while already
    /// running keeps the existing schedule. A zero interval is raised to
    /// [`MIN_POLL_INTERVAL`].
    pub fn start(self: &Arc<Self>, interval: Duration) {
        let mut ticker = self.ticker.lock().unwrap_or_else(PoisonError::into_inner);
        if ticker.as_ref().is_some_and(|handle| !handle.is_finished()) {
            warn!("Poll scheduler already running");
            return;
        }

        if interval < MIN_POLL_INTERVAL {
            warn!(
                requested_ms = interval.as_millis() as u64,
                "Poll interval below minimum, using 1ms"
            );
        }
        let interval = interval.max(MIN_POLL_INTERVAL);

        info!(
            url = %self.client.states_url(),
            interval_ms = interval.as_millis() as u64,
            "Starting poll scheduler"
        );

        let scheduler = Arc::clone(self);
        *ticker = Some(tokio::spawn(async move {
            let mut ticks = tokio::time::interval(interval);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticks.tick().await;

                let cycle = Arc::clone(&scheduler);
                tokio::spawn(async move {
                    if let Err(e) = cycle.refresh().await {
                        error!(error = %e, "Failed to refresh entity states");
                    }
                });
            }
        }));
    }

    /// Cancel future ticks. Safe to call when stopped.
    pub fn stop(&self) {
        let handle = self
            .ticker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            handle.abort();
            info!("Poll scheduler stopped");
        }
    }
}

impl<D: Document> Drop for PollScheduler<D> {
    fn drop(&mut self) {
        if let Some(handle) = self
            .ticker
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }
    }
}
