//! ReconciliationScheduler - the hourly driver
//!
//! Polls the wall clock at a fixed interval and runs one reconciliation cycle
//! whenever the UTC hour differs from the last reconciled one. A cycle
//! refreshes every entity's series concurrently, resolves the current value
//! of each entity in registry order, and then submits the planned ledger
//! operations one by one. Cycles never overlap: the next poll only happens
//! after the current cycle has returned.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::time::MissedTickBehavior;
use tracing::{info, instrument};

use crate::resolver::dispatch::{
    plan_cycle, scaled_value, DispatchReport, EntityUpdate, LedgerClient, UpdateDispatcher,
};
use crate::resolver::fetcher::SeriesFetcher;
use crate::resolver::registry::EntityRegistry;
use crate::resolver::resolve::{resolve_current_value, truncate_to_hour};
use crate::resolver::storage::TimeSeriesStore;
use crate::resolver::types::{ResolverConfig, ResolverError};

/// Source of the current instant.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Waiting for the next hour
    Idle,
    /// Fetch, resolve and dispatch in progress
    Reconciling,
}

pub struct ReconciliationScheduler {
    registry: EntityRegistry,
    fetcher: SeriesFetcher,
    dispatcher: UpdateDispatcher,
    clock: Arc<dyn Clock>,
    config: ResolverConfig,
    state: SchedulerState,
    last_hour: Option<DateTime<Utc>>,
}

impl ReconciliationScheduler {
    pub fn new(
        registry: EntityRegistry,
        store: Arc<dyn TimeSeriesStore>,
        client: Arc<dyn LedgerClient>,
        config: ResolverConfig,
    ) -> Self {
        Self {
            registry,
            fetcher: SeriesFetcher::new(store, config.max_concurrent_fetches),
            dispatcher: UpdateDispatcher::new(client),
            clock: Arc::new(SystemClock),
            config,
            state: SchedulerState::Idle,
            last_hour: None,
        }
    }

    /// Replace the wall clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn registry(&self) -> &EntityRegistry {
        &self.registry
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn last_reconciled_hour(&self) -> Option<DateTime<Utc>> {
        self.last_hour
    }

    /// Whether the current hour has not been reconciled yet.
    pub fn hour_changed(&self) -> bool {
        self.last_hour != Some(truncate_to_hour(self.clock.now()))
    }

    /// Run one full cycle for the current hour.
    ///
    /// Every entity is resolved before the first operation is submitted, so
    /// a fatal error leaves the oracle untouched for this hour.
    #[instrument(skip(self))]
    pub async fn reconcile(&mut self) -> Result<DispatchReport, ResolverError> {
        let hour = truncate_to_hour(self.clock.now());
        self.state = SchedulerState::Reconciling;

        let result = self.reconcile_hour(hour).await;

        self.state = SchedulerState::Idle;
        let report = result?;
        self.last_hour = Some(hour);
        info!(
            "Reconciled {}: {} operations issued, {} failed",
            hour, report.issued, report.failed
        );
        Ok(report)
    }

    async fn reconcile_hour(
        &mut self,
        hour: DateTime<Utc>,
    ) -> Result<DispatchReport, ResolverError> {
        info!("Refreshing {} entities", self.registry.len());
        self.fetcher.refresh_all(&mut self.registry).await?;

        let mut updates = Vec::with_capacity(self.registry.len());
        for entity in self.registry.iter_mut() {
            let resolution = resolve_current_value(entity, hour)?;
            updates.push(EntityUpdate {
                entity: entity.name().to_string(),
                category: entity.category().code(),
                value: scaled_value(resolution.value)?,
            });
        }

        let ops = plan_cycle(hour, &updates, &self.config.timeframes);
        Ok(self.dispatcher.dispatch_all(&ops).await)
    }

    /// Poll once: reconcile if the hour has changed.
    pub async fn tick(&mut self) -> Result<Option<DispatchReport>, ResolverError> {
        if !self.hour_changed() {
            return Ok(None);
        }

        let now = truncate_to_hour(self.clock.now());
        match self.last_hour {
            Some(previous) => info!("Hour change detected: {} -> {}", previous, now),
            None => info!("Initial reconciliation for {}", now),
        }
        self.reconcile().await.map(Some)
    }

    /// Reconcile immediately, then poll forever. Returns only on a fatal error.
    pub async fn run(mut self) -> Result<(), ResolverError> {
        if self.config.poll_interval.is_zero() {
            return Err(ResolverError::Config("poll interval must be non-zero".to_string()));
        }
        self.reconcile().await?;

        info!(
            "Scheduler is running. Polling every {} seconds.",
            self.config.poll_interval.as_secs()
        );
        let mut interval = tokio::time::interval(self.config.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            self.tick().await?;
        }
    }
}
