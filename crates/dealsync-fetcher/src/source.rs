//! CRM deal source: wire types and the fetch contract
//!
//! The synchronizer consumes deals through the [`DealSource`] trait so the
//! daemon can be exercised against in-memory fakes; [`CrmRestSource`] is the
//! production implementation speaking the CRM's `crm.deal.list` JSON
//! endpoint.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dealsync_core_resilience::ResilienceError;
use serde::Deserialize;
use std::time::Duration;

/// Deadline for a single upstream fetch; expiry counts as a breaker failure
const FETCH_TIMEOUT: Duration = Duration::from_secs(15);

/// A CRM-side deal record, the source of truth the synchronizer pulls from
///
/// Field names follow the CRM's upper-case wire convention. Numeric fields
/// arrive as strings and are parsed during the transform, not here.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Deal {
    #[serde(rename = "ID")]
    pub id: String,

    #[serde(rename = "TITLE", default)]
    pub title: String,

    #[serde(rename = "STAGE_ID", default)]
    pub stage: Option<String>,

    /// Deal amount as the CRM sends it, e.g. "1500.00"
    #[serde(rename = "OPPORTUNITY", default)]
    pub opportunity: Option<String>,

    /// Free-text block carrying customer name, mobile, address and time slot
    #[serde(rename = "COMMENTS", default)]
    pub comments: Option<String>,

    #[serde(rename = "DATE_CREATE", default)]
    pub date_create: Option<DateTime<Utc>>,

    #[serde(rename = "DATE_MODIFY", default)]
    pub date_modify: Option<DateTime<Utc>>,
}

/// One page of deals as returned by the list endpoint
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DealPage {
    #[serde(default)]
    pub result: Vec<Deal>,

    #[serde(default)]
    pub total: u64,
}

/// Contract for fetching the most recent deals from the CRM
///
/// Implementations must return deals in the source's recency order (newest
/// first) and classify failures so the resilience layer can react: explicit
/// 429 rejections as `RateLimited`, deadline expiry as `Timeout`, anything
/// else as `Upstream`.
#[async_trait]
pub trait DealSource: Send + Sync {
    async fn fetch_recent_deals(&self) -> Result<DealPage, ResilienceError>;
}

/// Production deal source hitting the CRM REST list endpoint
pub struct CrmRestSource {
    client: reqwest::Client,
    base_url: String,
    page_limit: u64,
}

impl CrmRestSource {
    /// Create a client for the given CRM webhook base URL
    ///
    /// `base_url` is the portal prefix up to, but not including, the method
    /// name, e.g. `https://portal.example.com/rest/1/token`.
    pub fn new(base_url: impl Into<String>, page_limit: u64) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(FETCH_TIMEOUT).build()?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            page_limit,
        })
    }
}

#[async_trait]
impl DealSource for CrmRestSource {
    async fn fetch_recent_deals(&self) -> Result<DealPage, ResilienceError> {
        let url = format!("{}/crm.deal.list.json", self.base_url.trim_end_matches('/'));
        let limit = self.page_limit.to_string();

        let response = self
            .client
            .get(&url)
            .query(&[
                ("order[DATE_CREATE]", "DESC"),
                ("start", "0"),
                ("limit", limit.as_str()),
            ])
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ResilienceError::Timeout(e.to_string())
                } else {
                    ResilienceError::Upstream(e.to_string())
                }
            })?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(ResilienceError::RateLimited(format!(
                "deal list rejected with HTTP {}",
                response.status()
            )));
        }

        if !response.status().is_success() {
            return Err(ResilienceError::Upstream(format!(
                "deal list returned HTTP {}",
                response.status()
            )));
        }

        response
            .json::<DealPage>()
            .await
            .map_err(|e| ResilienceError::Upstream(format!("malformed deal list payload: {}", e)))
    }
}
