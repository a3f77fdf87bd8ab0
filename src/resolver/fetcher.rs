//! SeriesFetcher - refreshes entity series from the time-series store
//!
//! Every refresh pulls the full collection of each entity, shifts each row's
//! naive timestamp by the entity's UTC offset and day delay, and produces a
//! freshly sorted [`Series`]. Fetches run concurrently, one task per entity,
//! and are joined before any series is swapped into the registry, so a cycle
//! either sees every new series or none of them.

use anyhow::anyhow;
use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, instrument};

use crate::resolver::registry::EntityRegistry;
use crate::resolver::storage::TimeSeriesStore;
use crate::resolver::types::{ResolverError, Series};
use crate::types::{EntityConfig, RawObservation};

/// Effective timestamp of a stored row.
///
/// The naive store timestamp is read as UTC, then shifted by the entity's
/// offset and day delay. The offset counts whole hours only, truncated toward
/// zero, so a 5.5 offset shifts by 5 hours and rows stay on the hour. Returns
/// `None` if the result falls outside the representable range.
pub fn normalize_timestamp(
    raw: NaiveDateTime,
    utc_offset_hours: f64,
    day_delay_days: i64,
) -> Option<DateTime<Utc>> {
    let offset = Duration::try_hours(utc_offset_hours.trunc() as i64)?;
    let delay = Duration::try_days(day_delay_days)?;
    Utc.from_utc_datetime(&raw)
        .checked_add_signed(offset)?
        .checked_add_signed(delay)
}

/// Turn raw rows into a sorted series for one entity.
pub fn normalize(
    rows: Vec<RawObservation>,
    config: &EntityConfig,
) -> Result<Series, ResolverError> {
    let mut series = Series::with_capacity(rows.len());

    for (i, row) in rows.into_iter().enumerate() {
        if !row.value.is_finite() {
            return Err(ResolverError::Store {
                entity: config.name.clone(),
                source: anyhow!("row {} has non-finite value {}", i, row.value),
            });
        }
        let timestamp =
            normalize_timestamp(row.timestamp, config.utc_offset_hours, config.day_delay_days)
                .ok_or_else(|| ResolverError::Store {
                    entity: config.name.clone(),
                    source: anyhow!("row {} timestamp {} out of range", i, row.timestamp),
                })?;
        series.push(timestamp, row.hour_of_day, row.value);
    }

    series.sort_by_timestamp();
    Ok(series)
}

/// Fetches and normalizes entity series from a [`TimeSeriesStore`].
pub struct SeriesFetcher {
    store: Arc<dyn TimeSeriesStore>,
    permits: Arc<Semaphore>,
}

impl SeriesFetcher {
    /// Create a fetcher allowing at most `max_concurrent` store calls at once.
    ///
    /// The limit is clamped to `1..=Semaphore::MAX_PERMITS`.
    pub fn new(store: Arc<dyn TimeSeriesStore>, max_concurrent: usize) -> Self {
        let permits = max_concurrent.clamp(1, Semaphore::MAX_PERMITS);
        Self {
            store,
            permits: Arc::new(Semaphore::new(permits)),
        }
    }

    /// Fetch one entity's full collection and normalize it.
    #[instrument(skip(store, config), fields(entity = %config.name, category = %config.category))]
    pub async fn fetch(
        store: &dyn TimeSeriesStore,
        config: &EntityConfig,
    ) -> Result<Series, ResolverError> {
        let collection = config.collection_key();
        info!("Fetching {} ({}) from {}", config.name, config.category, collection);
        let rows = store
            .fetch_all(&collection)
            .await
            .map_err(|source| ResolverError::Store {
                entity: config.name.clone(),
                source,
            })?;

        debug!("Fetched {} rows from {}, normalizing", rows.len(), collection);
        let series = normalize(rows, config)?;
        info!("Refreshed {} ({}): {} observations", config.name, config.category, series.len());
        Ok(series)
    }

    /// Refresh every entity concurrently and swap the new series in.
    ///
    /// The first failure aborts the outstanding fetches and leaves every
    /// entity's previous series untouched.
    pub async fn refresh_all(&self, registry: &mut EntityRegistry) -> Result<(), ResolverError> {
        let mut tasks = JoinSet::new();

        for (index, entity) in registry.iter().enumerate() {
            let store = Arc::clone(&self.store);
            let permits = Arc::clone(&self.permits);
            let config = entity.config.clone();

            tasks.spawn(async move {
                let _permit = permits
                    .acquire_owned()
                    .await
                    .map_err(|e| ResolverError::Store {
                        entity: config.name.clone(),
                        source: e.into(),
                    })?;
                let series = Self::fetch(store.as_ref(), &config).await?;
                Ok::<_, ResolverError>((index, series))
            });
        }

        let mut refreshed: Vec<Option<Series>> = vec![None; registry.len()];
        while let Some(joined) = tasks.join_next().await {
            let (index, series) = joined??;
            refreshed[index] = Some(series);
        }

        for (entity, series) in registry.iter_mut().zip(refreshed) {
            if let Some(series) = series {
                entity.series = series;
            }
        }
        Ok(())
    }
}
