//! The order fetcher daemon: the recurring synchronization loop
//!
//! Owns the fetch→transform→upsert cycle between the CRM deal source and the
//! local order store, independent of any user session. One cycle runs at a
//! time per process: the recurring timer tick and externally triggered
//! [`OrderFetcher::force_sync`] calls serialize on an in-process guard, so
//! the same external identifier is never written by two cycles at once.

use crate::policy::FetcherPolicy;
use crate::source::DealSource;
use crate::status::{SyncEvent, SyncResult, SyncStats, SyncStatus};
use crate::store::{OrderStore, StoreError};
use crate::transform::transform_deal;
use chrono::Utc;
use dealsync_core_resilience::{
    AdaptiveRateLimiter, CircuitBreaker, CircuitBreakerConfig, RateLimiterConfig, ResilienceError,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use thiserror::Error;
use tokio::sync::{broadcast, Mutex, Notify};
use tracing::{debug, error, info, warn};

/// A fully aborted cycle; per-record failures never surface here, they are
/// aggregated into [`SyncResult::errors`]
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("upstream fetch failed: {0}")]
    Upstream(#[from] ResilienceError),

    #[error("order store failed: {0}")]
    Store(#[from] StoreError),
}

/// The global order fetcher
///
/// Constructed once at process start and handed to the HTTP layer by
/// reference; there are no module-level globals.
pub struct OrderFetcher {
    source: Arc<dyn DealSource>,
    store: Arc<dyn OrderStore>,
    breaker: CircuitBreaker,
    limiter: AdaptiveRateLimiter,
    policy: FetcherPolicy,

    /// Snapshot read by the status endpoints; only the cycle logic writes it
    status: RwLock<SyncStatus>,

    /// Mutual exclusion for the cycle body. The timer tick skips when the
    /// guard is held; `force_sync` waits its turn.
    cycle_guard: Mutex<()>,

    event_tx: broadcast::Sender<SyncEvent>,
    running: AtomicBool,
    shutdown: Notify,
}

impl OrderFetcher {
    /// Create a fetcher with default resilience settings
    pub fn new(
        source: Arc<dyn DealSource>,
        store: Arc<dyn OrderStore>,
        policy: FetcherPolicy,
    ) -> Self {
        Self::with_resilience(
            source,
            store,
            policy,
            CircuitBreaker::new(CircuitBreakerConfig::default()),
            AdaptiveRateLimiter::new(RateLimiterConfig::default()),
        )
    }

    /// Create a fetcher with explicit resilience primitives
    ///
    /// The breaker and limiter are cheap cloneable handles, so callers can
    /// keep one to observe state the fetcher mutates.
    pub fn with_resilience(
        source: Arc<dyn DealSource>,
        store: Arc<dyn OrderStore>,
        policy: FetcherPolicy,
        breaker: CircuitBreaker,
        limiter: AdaptiveRateLimiter,
    ) -> Self {
        if let Err(e) = policy.validate() {
            panic!("invalid fetcher policy: {}", e);
        }

        let (event_tx, _) = broadcast::channel(64);
        let interval_ms = policy.interval().as_millis() as u64;

        Self {
            source,
            store,
            breaker,
            limiter,
            policy,
            status: RwLock::new(SyncStatus::new(interval_ms)),
            cycle_guard: Mutex::new(()),
            event_tx,
            running: AtomicBool::new(false),
            shutdown: Notify::new(),
        }
    }

    /// Start the recurring synchronization loop
    ///
    /// Idempotent: calling it while the loop is active is a no-op. The first
    /// cycle runs immediately, then every `policy.interval_s` seconds. Cycle
    /// failures are logged and the loop keeps ticking.
    pub fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            debug!("order fetcher already running");
            return;
        }

        self.status.write().unwrap().is_running = true;

        let fetcher = Arc::clone(self);
        tokio::spawn(async move {
            info!(
                interval_s = fetcher.policy.interval_s,
                page_limit = fetcher.policy.page_limit,
                "order fetcher online"
            );

            let mut interval = tokio::time::interval(fetcher.policy.interval());
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = fetcher.shutdown.notified() => {
                        info!("order fetcher stopped");
                        break;
                    }
                    _ = interval.tick() => {
                        // A cycle already in flight means this tick is
                        // skipped, never doubled
                        match fetcher.cycle_guard.try_lock() {
                            Ok(_guard) => {
                                if let Err(e) = fetcher.run_cycle_locked().await {
                                    warn!(error = %e, "sync cycle failed");
                                }
                            }
                            Err(_) => {
                                debug!("sync cycle in flight, skipping tick");
                            }
                        }
                    }
                }
            }
        });
    }

    /// Stop the recurring timer
    ///
    /// An in-flight cycle holds the guard and finishes; only the timer is
    /// cancelled.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }

        self.status.write().unwrap().is_running = false;
        self.shutdown.notify_one();
    }

    /// Run one synchronization cycle immediately, regardless of timer state
    ///
    /// Serializes with the timer-driven cycle: a cycle in progress makes this
    /// call wait, it never runs in parallel against the same storage.
    pub async fn force_sync(&self) -> Result<SyncResult, SyncError> {
        let _guard = self.cycle_guard.lock().await;
        self.run_cycle_locked().await
    }

    /// Current state snapshot, no side effects
    pub fn status(&self) -> SyncStatus {
        self.status.read().unwrap().clone()
    }

    /// Storage-derived summary; reads persisted state and may fail
    /// independently of sync health
    pub async fn sync_stats(&self) -> Result<SyncStats, SyncError> {
        let total_orders = self.store.count_orders().await?;
        let most_recent_order_at = self.store.most_recent_order_at().await?;

        Ok(SyncStats {
            total_orders,
            most_recent_order_at,
        })
    }

    /// Subscribe to cycle completion/failure events
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.event_tx.subscribe()
    }

    /// One fetch→transform→upsert pass; the caller must hold `cycle_guard`
    async fn run_cycle_locked(&self) -> Result<SyncResult, SyncError> {
        self.limiter.wait_for_next_request().await;

        let page = match self.breaker.call(|| self.source.fetch_recent_deals()).await {
            Ok(page) => {
                self.limiter.on_success().await;
                page
            }
            Err(e) => {
                if e.is_rate_limited() {
                    self.limiter.on_rate_limit().await;
                } else if !e.is_circuit_open() {
                    // A fail-fast rejection never reached the wire, so it
                    // must not widen the spacing
                    self.limiter.on_error().await;
                }

                self.record_cycle_failure();
                self.emit(SyncEvent::failed(e.to_string()));
                return Err(SyncError::Upstream(e));
            }
        };

        let mut result = SyncResult::new(page.result.len() as u64);

        for deal in &page.result {
            let order = match transform_deal(deal) {
                Ok(order) => order,
                Err(e) => {
                    warn!(deal_id = %deal.id, error = %e, "skipping malformed deal");
                    result.record_error();
                    continue;
                }
            };

            match self.store.upsert_order(&order).await {
                Ok(outcome) => result.record(outcome),
                Err(e @ StoreError::Query(_)) => {
                    warn!(external_id = %order.external_id, error = %e, "order upsert failed");
                    result.record_error();
                }
                Err(e @ StoreError::Unavailable(_)) => {
                    // No value in looping through the rest of the batch
                    // against a dead store
                    error!(error = %e, "order store unreachable, aborting cycle");
                    self.record_cycle_failure();
                    self.emit(SyncEvent::failed(e.to_string()));
                    return Err(SyncError::Store(e));
                }
            }
        }

        // A full pass counts as success even when individual records failed
        {
            let mut status = self.status.write().unwrap();
            status.last_sync_at = Some(Utc::now());
            status.retry_count = 0;
        }

        info!("sync cycle completed: {}", result.summary());
        self.emit(SyncEvent::completed(result.clone()));

        Ok(result)
    }

    fn record_cycle_failure(&self) {
        let mut status = self.status.write().unwrap();
        status.retry_count += 1;
    }

    fn emit(&self, event: SyncEvent) {
        // Ignore send errors (no subscribers is OK)
        let _ = self.event_tx.send(event);
    }
}
