//! Order store: persistence contract and SQLite implementation
//!
//! Orders are keyed by the CRM-assigned external identifier. The store
//! distinguishes connection-level failures (`Unavailable`, the whole cycle
//! should stop) from single-statement failures (`Query`, the batch keeps
//! going).

use crate::transform::OrderRecord;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use thiserror::Error;

/// Storage failure classification
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    /// The store itself is unreachable; looping through the rest of the
    /// batch against a dead store has no value
    #[error("order store unavailable: {0}")]
    Unavailable(String),

    /// A single statement failed; other records may still succeed
    #[error("order store query failed: {0}")]
    Query(String),
}

impl StoreError {
    fn from_sqlx(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed => StoreError::Unavailable(e.to_string()),
            _ => StoreError::Query(e.to_string()),
        }
    }
}

/// Result of writing one order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// No order existed for the external id
    Created,
    /// An order existed and at least one field changed
    Updated,
    /// An order existed and nothing changed
    Unchanged,
}

/// Persistence contract for synchronized orders
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Insert or update an order keyed by its external identifier
    async fn upsert_order(&self, order: &OrderRecord) -> Result<UpsertOutcome, StoreError>;

    /// Total number of stored orders
    async fn count_orders(&self) -> Result<u64, StoreError>;

    /// Source-side creation time of the newest stored order
    async fn most_recent_order_at(&self) -> Result<Option<DateTime<Utc>>, StoreError>;
}

/// SQLite-backed order store
pub struct SqliteOrderStore {
    pool: SqlitePool,
}

impl SqliteOrderStore {
    /// Open (and create if needed) the order database at the given path
    pub async fn open(db_path: &str) -> Result<Self, StoreError> {
        let pool = SqlitePool::connect(&format!("sqlite:{}?mode=rwc", db_path))
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Build a store on an existing pool (shared with the control plane)
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS orders (
                external_id TEXT PRIMARY KEY NOT NULL,
                title TEXT NOT NULL DEFAULT '',
                customer_name TEXT,
                customer_mobile TEXT,
                address TEXT,
                amount REAL,
                time_slot TEXT,
                stage TEXT,
                source_created_at TEXT,
                source_modified_at TEXT,
                created_at INTEGER NOT NULL DEFAULT 0,
                updated_at INTEGER NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)?;

        tracing::info!("orders table initialized");
        Ok(())
    }

    async fn fetch_existing(&self, external_id: &str) -> Result<Option<OrderRecord>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT external_id, title, customer_name, customer_mobile, address,
                   amount, time_slot, stage, source_created_at, source_modified_at
            FROM orders
            WHERE external_id = ?
            "#,
        )
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)?;

        Ok(row.map(|row| OrderRecord {
            external_id: row.get(0),
            title: row.get(1),
            customer_name: row.get(2),
            customer_mobile: row.get(3),
            address: row.get(4),
            amount: row.get(5),
            time_slot: row.get(6),
            stage: row.get(7),
            source_created_at: row.get(8),
            source_modified_at: row.get(9),
        }))
    }
}

#[async_trait]
impl OrderStore for SqliteOrderStore {
    async fn upsert_order(&self, order: &OrderRecord) -> Result<UpsertOutcome, StoreError> {
        let now = Utc::now().timestamp();

        match self.fetch_existing(&order.external_id).await? {
            None => {
                sqlx::query(
                    r#"
                    INSERT INTO orders (external_id, title, customer_name, customer_mobile,
                                        address, amount, time_slot, stage,
                                        source_created_at, source_modified_at,
                                        created_at, updated_at)
                    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                    "#,
                )
                .bind(&order.external_id)
                .bind(&order.title)
                .bind(&order.customer_name)
                .bind(&order.customer_mobile)
                .bind(&order.address)
                .bind(order.amount)
                .bind(&order.time_slot)
                .bind(&order.stage)
                .bind(order.source_created_at)
                .bind(order.source_modified_at)
                .bind(now)
                .bind(now)
                .execute(&self.pool)
                .await
                .map_err(StoreError::from_sqlx)?;

                Ok(UpsertOutcome::Created)
            }
            Some(existing) if existing == *order => Ok(UpsertOutcome::Unchanged),
            Some(_) => {
                sqlx::query(
                    r#"
                    UPDATE orders
                    SET title = ?, customer_name = ?, customer_mobile = ?, address = ?,
                        amount = ?, time_slot = ?, stage = ?,
                        source_created_at = ?, source_modified_at = ?, updated_at = ?
                    WHERE external_id = ?
                    "#,
                )
                .bind(&order.title)
                .bind(&order.customer_name)
                .bind(&order.customer_mobile)
                .bind(&order.address)
                .bind(order.amount)
                .bind(&order.time_slot)
                .bind(&order.stage)
                .bind(order.source_created_at)
                .bind(order.source_modified_at)
                .bind(now)
                .bind(&order.external_id)
                .execute(&self.pool)
                .await
                .map_err(StoreError::from_sqlx)?;

                Ok(UpsertOutcome::Updated)
            }
        }
    }

    async fn count_orders(&self) -> Result<u64, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders")
            .fetch_one(&self.pool)
            .await
            .map_err(StoreError::from_sqlx)?;

        Ok(count as u64)
    }

    async fn most_recent_order_at(&self) -> Result<Option<DateTime<Utc>>, StoreError> {
        // RFC 3339 text sorts chronologically, so MAX works on the column
        let newest: Option<DateTime<Utc>> =
            sqlx::query_scalar("SELECT MAX(source_created_at) FROM orders")
                .fetch_one(&self.pool)
                .await
                .map_err(StoreError::from_sqlx)?;

        Ok(newest)
    }
}
