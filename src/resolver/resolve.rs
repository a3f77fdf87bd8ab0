//! CurrentValueResolver - picks the value for the current hour
//!
//! Lookup is an exact match on the effective timestamp: an observation
//! stamped anywhere other than the top of the current hour does not count,
//! and a miss is fatal for the cycle rather than falling back to an older
//! value.

use chrono::{DateTime, DurationRound, TimeDelta, Utc};
use tracing::debug;

use crate::resolver::freshness::{check_freshness, FreshnessAlert};
use crate::resolver::types::{Entity, ResolverError, Series};

/// Truncate an instant to the top of its UTC hour.
pub fn truncate_to_hour(now: DateTime<Utc>) -> DateTime<Utc> {
    now.duration_trunc(TimeDelta::hours(1)).unwrap_or(now)
}

/// Value whose effective timestamp equals `hour` exactly.
pub fn find_current_value(series: &Series, hour: DateTime<Utc>) -> Option<f64> {
    series
        .timestamps()
        .iter()
        .position(|ts| *ts == hour)
        .map(|i| series.values()[i])
}

/// Result of resolving one entity for the current hour.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub value: f64,
    pub alert: Option<FreshnessAlert>,
}

/// Resolve the current value of `entity` and update its reminder state.
///
/// An empty series, or one without an observation at `hour`, yields
/// [`ResolverError::ValueNotFound`].
pub fn resolve_current_value(
    entity: &mut Entity,
    hour: DateTime<Utc>,
) -> Result<Resolution, ResolverError> {
    let name = entity.name().to_string();
    let not_found = || ResolverError::ValueNotFound {
        entity: name.clone(),
        hour,
    };

    let Some(latest) = entity.series.latest() else {
        return Err(not_found());
    };

    let alert = check_freshness(&name, &mut entity.reminder, latest, hour);

    let value = find_current_value(&entity.series, hour).ok_or_else(not_found)?;
    debug!("Resolved {} at {}: {}", name, hour, value);
    Ok(Resolution { value, alert })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Category, EntityConfig};
    use chrono::{Duration, TimeZone};

    fn hour(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 2, 10, h, 0, 0).unwrap()
    }

    fn entity_with(points: &[(u32, f64)]) -> Entity {
        let mut entity = Entity::new(EntityConfig {
            name: "X".to_string(),
            category: Category::new("secondary"),
            utc_offset_hours: 0.0,
            day_delay_days: 0,
        });
        for (h, v) in points {
            entity.series.push(hour(*h), *h as i64, *v);
        }
        entity
    }

    #[test]
    fn test_truncate_to_hour() {
        let instant = Utc.with_ymd_and_hms(2024, 2, 10, 14, 37, 59).unwrap();
        assert_eq!(truncate_to_hour(instant), hour(14));
        assert_eq!(truncate_to_hour(hour(14)), hour(14));
    }

    #[test]
    fn test_exact_match_only() {
        let entity = entity_with(&[(13, 1.0), (14, 2.0)]);
        assert_eq!(find_current_value(&entity.series, hour(14)), Some(2.0));
        assert_eq!(find_current_value(&entity.series, hour(15)), None);
        assert_eq!(find_current_value(&entity.series, hour(14) + Duration::minutes(1)), None);
        assert_eq!(find_current_value(&Series::default(), hour(14)), None);
    }

    #[test]
    fn test_empty_series_is_not_found_and_skips_reminder() {
        let mut entity = entity_with(&[]);
        let result = resolve_current_value(&mut entity, hour(3));

        assert!(matches!(result, Err(ResolverError::ValueNotFound { .. })));
        assert_eq!(entity.reminder.count, 0);
    }

    #[test]
    fn test_missing_hour_is_not_found_but_still_counts_reminder() {
        let mut entity = entity_with(&[(1, 1.0), (2, 2.0)]);
        let result = resolve_current_value(&mut entity, hour(5));

        assert!(
            matches!(result, Err(ResolverError::ValueNotFound { ref entity, .. }) if entity == "X")
        );
        assert_eq!(entity.reminder.count, 1);
    }

    #[test]
    fn test_resolves_value_with_alert_when_data_is_short() {
        let mut entity = entity_with(&[(10, 4.5), (11, 5.5), (12, 6.5)]);
        let resolution = resolve_current_value(&mut entity, hour(11)).unwrap();

        assert_eq!(resolution.value, 5.5);
        let alert = resolution.alert.unwrap();
        assert_eq!(alert.remaining_hours, 1.0);
        assert_eq!(alert.latest, hour(12));
    }
}
