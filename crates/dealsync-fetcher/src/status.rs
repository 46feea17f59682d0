//! Sync status, cycle results, and completion events

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::store::UpsertOutcome;

/// Process-wide snapshot of the synchronizer, read by the status endpoints
///
/// Mutated only by the fetcher during a cycle; a single instance lives for
/// the process lifetime.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    /// Whether the recurring timer is active
    pub is_running: bool,

    /// Completion time of the most recent fully successful cycle; only
    /// advances forward
    pub last_sync_at: Option<DateTime<Utc>>,

    /// Consecutive failed cycles since the last success
    pub retry_count: u32,

    /// Configured period between cycles
    pub interval_ms: u64,
}

impl SyncStatus {
    pub fn new(interval_ms: u64) -> Self {
        Self {
            is_running: false,
            last_sync_at: None,
            retry_count: 0,
            interval_ms,
        }
    }
}

/// Counters from a single synchronization cycle
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncResult {
    /// Records received from the source
    pub fetched: u64,
    /// Orders inserted for a previously unseen external id
    pub created: u64,
    /// Orders rewritten because a field changed
    pub updated: u64,
    /// Orders already stored and unchanged
    pub skipped: u64,
    /// Per-record transform/upsert failures (the batch continued past them)
    pub errors: u64,
}

impl SyncResult {
    pub fn new(fetched: u64) -> Self {
        Self {
            fetched,
            ..Default::default()
        }
    }

    /// Record the outcome of one upsert
    pub fn record(&mut self, outcome: UpsertOutcome) {
        match outcome {
            UpsertOutcome::Created => self.created += 1,
            UpsertOutcome::Updated => self.updated += 1,
            UpsertOutcome::Unchanged => self.skipped += 1,
        }
    }

    /// Record a per-record failure
    pub fn record_error(&mut self) {
        self.errors += 1;
    }

    /// Format a human-readable summary for the cycle log line
    pub fn summary(&self) -> String {
        format!(
            "{} fetched | {} created | {} updated | {} unchanged | {} errors",
            self.fetched, self.created, self.updated, self.skipped, self.errors
        )
    }
}

/// Storage-derived summary, independent of in-memory sync health
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStats {
    pub total_orders: u64,
    pub most_recent_order_at: Option<DateTime<Utc>>,
}

/// Events broadcast to external listeners (UI polling clients, tests)
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum SyncEvent {
    /// A cycle ran to completion (possibly with per-record errors)
    SyncCompleted {
        result: SyncResult,
        at: DateTime<Utc>,
    },

    /// A cycle aborted before completing
    SyncFailed { error: String, at: DateTime<Utc> },
}

impl SyncEvent {
    pub fn completed(result: SyncResult) -> Self {
        SyncEvent::SyncCompleted {
            result,
            at: Utc::now(),
        }
    }

    pub fn failed(error: String) -> Self {
        SyncEvent::SyncFailed {
            error,
            at: Utc::now(),
        }
    }
}
