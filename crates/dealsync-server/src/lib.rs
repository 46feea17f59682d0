//! Dealsync Server - Control Plane
//!
//! Status, health, and manual-trigger API for the order synchronizer.
//! Consumed by uptime monitors and the admin dashboard.

pub mod error;
pub mod server;
pub mod state;

pub use error::ApiError;
pub use state::AppState;

/// Configuration for the control plane server and the fetcher it owns
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_path: String,
    pub crm_base_url: String,
    pub sync_interval_s: u64,
    pub page_limit: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            database_path: "dealsync.db".to_string(),
            crm_base_url: "http://localhost:9000/rest".to_string(),
            sync_interval_s: 300,
            page_limit: 50,
        }
    }
}

impl ServerConfig {
    /// Build a config from `DEALSYNC_*` environment variables, falling back
    /// to defaults for anything unset or unparseable.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            host: env_or("DEALSYNC_HOST", defaults.host),
            port: env_parse("DEALSYNC_PORT", defaults.port),
            database_path: env_or("DEALSYNC_DB", defaults.database_path),
            crm_base_url: env_or("DEALSYNC_CRM_URL", defaults.crm_base_url),
            sync_interval_s: env_parse("DEALSYNC_SYNC_INTERVAL_S", defaults.sync_interval_s),
            page_limit: env_parse("DEALSYNC_PAGE_LIMIT", defaults.page_limit),
        }
    }
}

fn env_or(key: &str, default: String) -> String {
    std::env::var(key).unwrap_or(default)
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
