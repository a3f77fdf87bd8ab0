//! Storage abstraction layer for the time-series store
//!
//! The reconciliation engine only ever reads from the store: every refresh
//! pulls the full, unfiltered set of rows for one collection. This module
//! defines that contract and its SQLite and in-memory implementations.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use sqlx::{sqlite::SqlitePoolOptions, FromRow, Pool, Sqlite};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{debug, info};

use crate::types::RawObservation;

/// Read-only contract for the time-series store.
#[async_trait]
pub trait TimeSeriesStore: Send + Sync {
    /// Retrieves every row of a collection, in retrieval order.
    async fn fetch_all(&self, collection: &str) -> Result<Vec<RawObservation>>;

    /// Health check for the storage backend.
    async fn health_check(&self) -> Result<bool>;
}

/// Helper type for deserializing observation rows from SQLite
#[derive(FromRow)]
struct ObservationRow {
    date: NaiveDateTime,
    hour: i64,
    value: f64,
}

impl From<ObservationRow> for RawObservation {
    fn from(row: ObservationRow) -> Self {
        RawObservation {
            timestamp: row.date,
            hour_of_day: row.hour,
            value: row.value,
        }
    }
}

/// SQLite implementation of the TimeSeriesStore trait.
///
/// Each collection is one table with `date`, `hour` and `value` columns.
pub struct SqliteSeriesStore {
    pool: Pool<Sqlite>,
}

impl SqliteSeriesStore {
    /// Connect to the store at `url` (e.g. `sqlite:indexes.db`).
    pub async fn connect(url: &str) -> Result<Arc<Self>> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(url)
            .await
            .context("Failed to connect to time-series store")?;

        info!("Connected to time-series store");
        Ok(Arc::new(Self { pool }))
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    /// Get a reference to the database pool
    pub fn get_db_pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}

/// Quote a collection key for use as an SQLite identifier.
fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[async_trait]
impl TimeSeriesStore for SqliteSeriesStore {
    async fn fetch_all(&self, collection: &str) -> Result<Vec<RawObservation>> {
        debug!("Querying collection {}", collection);

        let sql = format!(
            "SELECT date, hour, value FROM {} ORDER BY rowid ASC",
            quote_identifier(collection)
        );
        let rows: Vec<ObservationRow> = sqlx::query_as(&sql)
            .fetch_all(&self.pool)
            .await
            .with_context(|| format!("Failed to fetch rows from {}", collection))?;

        Ok(rows.into_iter().map(RawObservation::from).collect())
    }

    async fn health_check(&self) -> Result<bool> {
        let result: (i64,) = sqlx::query_as("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("Store health check failed")?;
        Ok(result.0 == 1)
    }
}

/// In-process store holding collections in memory.
#[derive(Default)]
pub struct MemorySeriesStore {
    collections: RwLock<HashMap<String, Vec<RawObservation>>>,
}

impl MemorySeriesStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the rows of a collection.
    pub fn insert_collection(&self, collection: impl Into<String>, rows: Vec<RawObservation>) {
        if let Ok(mut collections) = self.collections.write() {
            collections.insert(collection.into(), rows);
        }
    }
}

#[async_trait]
impl TimeSeriesStore for MemorySeriesStore {
    async fn fetch_all(&self, collection: &str) -> Result<Vec<RawObservation>> {
        let collections = self
            .collections
            .read()
            .map_err(|_| anyhow!("memory store lock poisoned"))?;
        collections
            .get(collection)
            .cloned()
            .ok_or_else(|| anyhow!("unknown collection {}", collection))
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }
}
