//! Core types and data structures for the reconciliation engine.

use crate::types::{Category, EntityConfig};
use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;

/// Timeframe classes (hours) for which a value is recorded on-chain.
pub const TIMEFRAMES: [u64; 6] = [1, 2, 4, 6, 8, 24];

/// Fatal failures of a reconciliation cycle.
#[derive(Debug, Error)]
pub enum ResolverError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("failed to fetch series for {entity}")]
    Store {
        entity: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("no value for {entity} at {hour}")]
    ValueNotFound { entity: String, hour: DateTime<Utc> },

    #[error("cannot scale value {value} to an integer")]
    Scaling { value: f64 },

    #[error("fetch task failed: {0}")]
    FetchTask(#[from] tokio::task::JoinError),
}

/// Normalized time series of one entity.
///
/// Four index-aligned sequences; element `i` of each describes one
/// observation. The fields stay private so every mutation keeps them the
/// same length.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Series {
    timestamps: Vec<DateTime<Utc>>,
    hours: Vec<i64>,
    values: Vec<f64>,
    epoch_seconds: Vec<i64>,
}

impl Series {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            timestamps: Vec::with_capacity(capacity),
            hours: Vec::with_capacity(capacity),
            values: Vec::with_capacity(capacity),
            epoch_seconds: Vec::with_capacity(capacity),
        }
    }

    /// Append one observation. `epoch_seconds` is derived from the timestamp.
    pub fn push(&mut self, timestamp: DateTime<Utc>, hour_of_day: i64, value: f64) {
        self.timestamps.push(timestamp);
        self.hours.push(hour_of_day);
        self.values.push(value);
        self.epoch_seconds.push(timestamp.timestamp());
    }

    /// Stable sort of all four sequences by timestamp; ties keep insertion order.
    pub fn sort_by_timestamp(&mut self) {
        let mut order: Vec<usize> = (0..self.len()).collect();
        order.sort_by_key(|&i| self.timestamps[i]);

        self.timestamps = order.iter().map(|&i| self.timestamps[i]).collect();
        self.hours = order.iter().map(|&i| self.hours[i]).collect();
        self.values = order.iter().map(|&i| self.values[i]).collect();
        self.epoch_seconds = order.iter().map(|&i| self.epoch_seconds[i]).collect();
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn timestamps(&self) -> &[DateTime<Utc>] {
        &self.timestamps
    }

    pub fn hours(&self) -> &[i64] {
        &self.hours
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn epoch_seconds(&self) -> &[i64] {
        &self.epoch_seconds
    }

    /// Latest effective timestamp, independent of ordering.
    pub fn latest(&self) -> Option<DateTime<Utc>> {
        self.timestamps.iter().max().copied()
    }
}

/// Consecutive alert-eligible ticks for one entity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReminderState {
    pub count: u32,
}

/// A tracked entity with its current series and reminder state.
#[derive(Debug, Clone)]
pub struct Entity {
    pub config: EntityConfig,
    pub series: Series,
    pub reminder: ReminderState,
}

impl Entity {
    pub fn new(config: EntityConfig) -> Self {
        Self {
            config,
            series: Series::default(),
            reminder: ReminderState::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn category(&self) -> &Category {
        &self.config.category
    }

    pub fn collection_key(&self) -> String {
        self.config.collection_key()
    }
}

/// Engine tunables.
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// How often the wall clock is polled for an hour change
    pub poll_interval: Duration,
    /// Timeframe classes filled per entity each cycle
    pub timeframes: Vec<u64>,
    /// Upper bound on concurrent store fetches
    pub max_concurrent_fetches: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(10),
            timeframes: TIMEFRAMES.to_vec(),
            max_concurrent_fetches: 8,
        }
    }
}
