use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use tokio::sync::RwLock;

use crate::api::{Marketplace, NormalizedItem};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("failed to prepare database location: {0}")]
    Io(#[from] std::io::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Persistence surface of the pipeline: which items were seen and which were
/// alerted, both keyed by `(id, source)`.
///
/// Both inserts are idempotent: writing an existing key is a no-op, so a race
/// between a check and an insert never surfaces as an error.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DedupStore: Send + Sync {
    async fn exists(&self, id: &str, source: Marketplace) -> Result<bool, StoreError>;

    async fn insert(&self, item: &NormalizedItem) -> Result<(), StoreError>;

    async fn alert_sent(&self, id: &str, source: Marketplace) -> Result<bool, StoreError>;

    async fn record_alert(&self, id: &str, source: Marketplace) -> Result<(), StoreError>;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreStatistics {
    pub seen_items: usize,
    pub alerts_sent: usize,
    pub seen_by_source: BTreeMap<String, usize>,
}

/// Durable dedup store backed by SQLite.
pub struct SqliteDedupStore {
    pool: SqlitePool,
}

impl SqliteDedupStore {
    pub async fn new(database_path: &str) -> Result<Self, StoreError> {
        if !database_path.starts_with("sqlite:") {
            if let Some(parent) = Path::new(database_path).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
        }

        let connection_string = if database_path.starts_with("sqlite:") {
            database_path.to_string()
        } else {
            format!("sqlite://{}?mode=rwc", database_path)
        };

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&connection_string)
            .await?;

        let store = Self { pool };
        store.initialize_schema().await?;

        Ok(store)
    }

    /// Private in-memory database; a single long-lived connection keeps it alive.
    pub async fn in_memory() -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;

        let store = Self { pool };
        store.initialize_schema().await?;

        Ok(store)
    }

    async fn initialize_schema(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS items (
                id TEXT NOT NULL,
                source TEXT NOT NULL,
                title TEXT NOT NULL,
                url TEXT NOT NULL,
                price TEXT NOT NULL,
                buyer_protection TEXT NOT NULL,
                shipping_cost TEXT NOT NULL,
                seller_score TEXT,
                listed_at DATETIME,
                created_at DATETIME NOT NULL,
                PRIMARY KEY (id, source)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS alerts (
                item_id TEXT NOT NULL,
                source TEXT NOT NULL,
                sent_at DATETIME NOT NULL,
                PRIMARY KEY (item_id, source)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        tracing::info!("✅ Dedup store schema initialized");

        Ok(())
    }

    pub async fn ping(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }

    pub async fn get_statistics(&self) -> Result<StoreStatistics, StoreError> {
        let (alerts_sent,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM alerts")
            .fetch_one(&self.pool)
            .await?;

        let rows: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT source, COUNT(*) FROM items GROUP BY source
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let seen_by_source: BTreeMap<String, usize> = rows
            .into_iter()
            .map(|(source, count)| (source, count as usize))
            .collect();

        Ok(StoreStatistics {
            seen_items: seen_by_source.values().sum(),
            alerts_sent: alerts_sent as usize,
            seen_by_source,
        })
    }
}

#[async_trait]
impl DedupStore for SqliteDedupStore {
    async fn exists(&self, id: &str, source: Marketplace) -> Result<bool, StoreError> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM items WHERE id = ? AND source = ?")
            .bind(id)
            .bind(source.as_str())
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.is_some())
    }

    async fn insert(&self, item: &NormalizedItem) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO items (
                id, source, title, url, price, buyer_protection,
                shipping_cost, seller_score, listed_at, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id, source) DO NOTHING
            "#,
        )
        .bind(&item.id)
        .bind(item.source.as_str())
        .bind(&item.title)
        .bind(&item.url)
        .bind(item.price.to_string())
        .bind(item.buyer_protection_fee.to_string())
        .bind(item.shipping_cost.to_string())
        .bind(item.seller_score.map(|score| score.to_string()))
        .bind(item.listed_at)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn alert_sent(&self, id: &str, source: Marketplace) -> Result<bool, StoreError> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT 1 FROM alerts WHERE item_id = ? AND source = ?")
                .bind(id)
                .bind(source.as_str())
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.is_some())
    }

    async fn record_alert(&self, id: &str, source: Marketplace) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO alerts (item_id, source, sent_at)
            VALUES (?, ?, ?)
            ON CONFLICT(item_id, source) DO NOTHING
            "#,
        )
        .bind(id)
        .bind(source.as_str())
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

/// Non-durable store for tests and dry runs.
#[derive(Debug, Default)]
pub struct InMemoryDedupStore {
    seen: RwLock<HashSet<(String, Marketplace)>>,
    alerts: RwLock<HashSet<(String, Marketplace)>>,
}

impl InMemoryDedupStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn seen_count(&self) -> usize {
        self.seen.read().await.len()
    }

    pub async fn alert_count(&self) -> usize {
        self.alerts.read().await.len()
    }
}

#[async_trait]
impl DedupStore for InMemoryDedupStore {
    async fn exists(&self, id: &str, source: Marketplace) -> Result<bool, StoreError> {
        Ok(self.seen.read().await.contains(&(id.to_string(), source)))
    }

    async fn insert(&self, item: &NormalizedItem) -> Result<(), StoreError> {
        self.seen.write().await.insert((item.id.clone(), item.source));
        Ok(())
    }

    async fn alert_sent(&self, id: &str, source: Marketplace) -> Result<bool, StoreError> {
        Ok(self.alerts.read().await.contains(&(id.to_string(), source)))
    }

    async fn record_alert(&self, id: &str, source: Marketplace) -> Result<(), StoreError> {
        self.alerts.write().await.insert((id.to_string(), source));
        Ok(())
    }
}
