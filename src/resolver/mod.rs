//! Resolver module - hourly reconciliation of the on-chain index oracle.
//!
//! Keeps the oracle in step with the hourly index values stored for a fixed
//! set of entities: the registry names the entities, the fetcher refreshes
//! their series from the store, the resolver and freshness monitor pick the
//! value for the current hour, and the dispatcher writes it on-chain. The
//! scheduler drives all of it once per hour.

pub mod types;
pub mod registry;
pub mod storage;
pub mod fetcher;
pub mod freshness;
pub mod resolve;
pub mod dispatch;
pub mod scheduler;

use std::sync::Arc;
use std::time::Duration;

// Re-export main types
pub use types::{Entity, ReminderState, ResolverConfig, ResolverError, Series, TIMEFRAMES};

// Re-export key components
pub use dispatch::{
    scaled_value, AptosCliClient, CommandOutput, DispatchReport, DryRunClient, LedgerClient,
    LedgerOperation, UpdateDispatcher,
};
pub use fetcher::SeriesFetcher;
pub use freshness::{FreshnessAlert, FreshnessTier};
pub use registry::EntityRegistry;
pub use resolve::{find_current_value, resolve_current_value, truncate_to_hour};
pub use scheduler::{Clock, ReconciliationScheduler, SchedulerState, SystemClock};
pub use storage::{MemorySeriesStore, SqliteSeriesStore, TimeSeriesStore};

/// Scheduler builder for convenient construction with sensible defaults.
pub struct ResolverBuilder {
    config: ResolverConfig,
}

impl ResolverBuilder {
    /// Create a new builder with default configuration.
    pub fn new() -> Self {
        Self {
            config: ResolverConfig::default(),
        }
    }

    /// Set how often the wall clock is polled.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval = interval;
        self
    }

    /// Set the timeframe classes filled each cycle.
    pub fn with_timeframes(mut self, timeframes: Vec<u64>) -> Self {
        self.config.timeframes = timeframes;
        self
    }

    /// Set the concurrent fetch bound.
    pub fn with_max_concurrent_fetches(mut self, max_fetches: usize) -> Self {
        self.config.max_concurrent_fetches = max_fetches;
        self
    }

    /// Build the resolver configuration.
    pub fn build_config(self) -> ResolverConfig {
        self.config
    }

    /// Build the scheduler.
    pub fn build(
        self,
        registry: EntityRegistry,
        store: Arc<dyn TimeSeriesStore>,
        client: Arc<dyn LedgerClient>,
    ) -> ReconciliationScheduler {
        ReconciliationScheduler::new(registry, store, client, self.config)
    }
}

impl Default for ResolverBuilder {
    fn default() -> Self {
        Self::new()
    }
}
