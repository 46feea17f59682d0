//! Axum server setup for the sync control plane

use crate::error::ApiError;
use crate::state::AppState;
use crate::ServerConfig;
use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use dealsync_fetcher::{SyncResult, SyncStatus};
use serde::Serialize;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Health payload: the status snapshot plus storage-derived totals
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    #[serde(flatten)]
    pub status: SyncStatus,
    pub total_orders: u64,
    pub most_recent_order_at: Option<DateTime<Utc>>,
}

/// Response for a manually triggered sync
#[derive(Debug, Serialize)]
pub struct SyncResponse {
    pub success: bool,
    pub result: SyncResult,
}

/// Liveness probe
async fn ping_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "dealsync-server",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Current sync status snapshot
async fn status_handler(State(state): State<AppState>) -> Json<SyncStatus> {
    Json(state.fetcher.status())
}

/// Status snapshot plus storage totals for uptime monitors
async fn health_handler(State(state): State<AppState>) -> Result<Json<HealthResponse>, ApiError> {
    let status = state.fetcher.status();
    let stats = state.fetcher.sync_stats().await?;

    Ok(Json(HealthResponse {
        status,
        total_orders: stats.total_orders,
        most_recent_order_at: stats.most_recent_order_at,
    }))
}

/// Trigger one synchronization cycle and report its counters
///
/// Serializes with the timer-driven cycle inside the fetcher; concurrent
/// requests simply wait their turn.
async fn sync_handler(State(state): State<AppState>) -> Result<Json<SyncResponse>, ApiError> {
    tracing::info!("manual sync requested");

    let result = state.fetcher.force_sync().await?;

    Ok(Json(SyncResponse {
        success: true,
        result,
    }))
}

/// Build the control plane router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/ping", get(ping_handler))
        .route("/api/status", get(status_handler))
        .route("/api/health", get(health_handler))
        .route("/api/sync", post(sync_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run the control plane server
pub async fn run_server(config: &ServerConfig, state: AppState) -> anyhow::Result<()> {
    let app = router(state);

    let addr = format!("{}:{}", config.host, config.port);
    tracing::info!("control plane listening on http://{}", addr);
    tracing::info!("   Status: http://{}/api/status", addr);
    tracing::info!("   Health: http://{}/api/health", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Method, Request, StatusCode};
    use dealsync_core_resilience::ResilienceError;
    use dealsync_fetcher::{
        DealPage, DealSource, FetcherPolicy, OrderFetcher, OrderRecord, OrderStore, StoreError,
        UpsertOutcome,
    };
    use http_body_util::BodyExt;
    use std::sync::Arc;
    use tower::ServiceExt;

    struct EmptySource;

    #[async_trait]
    impl DealSource for EmptySource {
        async fn fetch_recent_deals(&self) -> Result<DealPage, ResilienceError> {
            Ok(DealPage::default())
        }
    }

    struct DownSource;

    #[async_trait]
    impl DealSource for DownSource {
        async fn fetch_recent_deals(&self) -> Result<DealPage, ResilienceError> {
            Err(ResilienceError::Upstream("connection refused".to_string()))
        }
    }

    struct NullStore;

    #[async_trait]
    impl OrderStore for NullStore {
        async fn upsert_order(&self, _order: &OrderRecord) -> Result<UpsertOutcome, StoreError> {
            Ok(UpsertOutcome::Created)
        }

        async fn count_orders(&self) -> Result<u64, StoreError> {
            Ok(0)
        }

        async fn most_recent_order_at(
            &self,
        ) -> Result<Option<chrono::DateTime<Utc>>, StoreError> {
            Ok(None)
        }
    }

    fn app(source: Arc<dyn DealSource>) -> Router {
        let fetcher = Arc::new(OrderFetcher::new(
            source,
            Arc::new(NullStore),
            FetcherPolicy::default(),
        ));
        router(AppState { fetcher })
    }

    async fn request(
        app: Router,
        method: Method,
        uri: &str,
    ) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri(uri)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = serde_json::from_slice(&bytes).unwrap();
        (status, json)
    }

    #[tokio::test]
    async fn test_status_endpoint() {
        let (status, body) = request(app(Arc::new(EmptySource)), Method::GET, "/api/status").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["isRunning"], false);
        assert_eq!(body["retryCount"], 0);
        assert!(body["lastSyncAt"].is_null());
        assert_eq!(body["intervalMs"], 300_000);
    }

    #[tokio::test]
    async fn test_health_endpoint_includes_storage_totals() {
        let (status, body) = request(app(Arc::new(EmptySource)), Method::GET, "/api/health").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["isRunning"], false);
        assert_eq!(body["totalOrders"], 0);
        assert!(body["mostRecentOrderAt"].is_null());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sync_endpoint_reports_counters() {
        let (status, body) = request(app(Arc::new(EmptySource)), Method::POST, "/api/sync").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["result"]["fetched"], 0);
        assert_eq!(body["result"]["errors"], 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sync_endpoint_surfaces_upstream_failure() {
        let (status, body) = request(app(Arc::new(DownSource)), Method::POST, "/api/sync").await;

        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "sync cycle failed");
        assert!(body["details"]
            .as_str()
            .unwrap()
            .contains("connection refused"));
    }

    #[tokio::test]
    async fn test_ping() {
        let (status, body) = request(app(Arc::new(EmptySource)), Method::GET, "/api/ping").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["service"], "dealsync-server");
    }
}
