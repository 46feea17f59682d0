//! Shared application state for the control plane

use dealsync_fetcher::OrderFetcher;
use std::sync::Arc;

/// Global application state shared across all handlers
///
/// The fetcher is constructed once at process start and injected here; the
/// handlers only ever read its snapshots or trigger a serialized cycle.
#[derive(Clone)]
pub struct AppState {
    pub fetcher: Arc<OrderFetcher>,
}
