//! Dealsync server binary entry point

use anyhow::Context;
use dealsync_fetcher::{CrmRestSource, FetcherPolicy, OrderFetcher, SqliteOrderStore};
use dealsync_server::{server, AppState, ServerConfig};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,dealsync=debug".into()),
        )
        .init();

    let config = ServerConfig::from_env();
    tracing::info!(
        "starting dealsync control plane v{}",
        env!("CARGO_PKG_VERSION")
    );
    tracing::info!("order db: {}", config.database_path);
    tracing::info!("crm base url: {}", config.crm_base_url);

    let store = Arc::new(
        SqliteOrderStore::open(&config.database_path)
            .await
            .context("opening order store")?,
    );
    let source = Arc::new(
        CrmRestSource::new(config.crm_base_url.as_str(), config.page_limit)
            .context("building CRM client")?,
    );

    let policy = FetcherPolicy {
        interval_s: config.sync_interval_s,
        page_limit: config.page_limit,
    };
    let fetcher = Arc::new(OrderFetcher::new(source, store, policy));

    // Background loop: immediate cycle, then every interval
    fetcher.start();

    server::run_server(&config, AppState { fetcher }).await
}
