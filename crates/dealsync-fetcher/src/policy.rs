//! Fetcher policy: cadence and page sizing for the sync loop

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Operational policy for the order fetcher
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetcherPolicy {
    /// Period between synchronization cycles, in seconds
    ///
    /// **Default:** 300 (5 minutes)
    pub interval_s: u64,

    /// Maximum number of deals requested per cycle
    ///
    /// **Default:** 50
    pub page_limit: u64,
}

impl Default for FetcherPolicy {
    fn default() -> Self {
        Self {
            interval_s: 300,
            page_limit: 50,
        }
    }
}

impl FetcherPolicy {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_s)
    }

    /// Validate the policy configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.interval_s == 0 {
            return Err("interval_s must be greater than 0".to_string());
        }

        if self.page_limit == 0 {
            return Err("page_limit must be at least 1".to_string());
        }

        Ok(())
    }
}
