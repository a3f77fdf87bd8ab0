//! FreshnessMonitor - reminders when an entity's data is about to run out
//!
//! Each cycle compares the latest effective timestamp of an entity's series
//! with the current hour. While the remaining horizon is within a reminder
//! tier the entity's [`ReminderState`] counts up and an alert fires on the
//! first tick and every `interval`-th tick after that; once the data is
//! comfortably fresh again the counter resets.

use chrono::{DateTime, Utc};
use std::fmt;
use tracing::warn;

use crate::resolver::types::ReminderState;

/// Reminder cadence bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FreshnessTier {
    /// Alert every 8th tick
    Every8,
    /// Alert every 4th tick
    Every4,
    /// Alert every tick
    Every1,
}

impl FreshnessTier {
    /// Classify a remaining horizon, first match wins.
    ///
    /// The thresholds are checked as 48, then 24, then 6 hours. Every value
    /// that would fall in the 24h or 6h band already matches the 48h band, so
    /// only [`FreshnessTier::Every8`] is ever returned.
    pub fn classify(remaining_hours: f64) -> Option<Self> {
        if remaining_hours <= 48.0 {
            Some(Self::Every8)
        } else if remaining_hours <= 24.0 {
            Some(Self::Every4)
        } else if remaining_hours <= 6.0 {
            Some(Self::Every1)
        } else {
            None
        }
    }

    pub fn interval(self) -> u32 {
        match self {
            Self::Every8 => 8,
            Self::Every4 => 4,
            Self::Every1 => 1,
        }
    }
}

/// Human-readable data exhaustion warning.
#[derive(Debug, Clone, PartialEq)]
pub struct FreshnessAlert {
    pub entity: String,
    pub remaining_hours: f64,
    pub latest: DateTime<Utc>,
    pub now: DateTime<Utc>,
    pub tier: FreshnessTier,
}

impl fmt::Display for FreshnessAlert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Only {:.0} hours left with the current data set for {} (latest: {}, now: {})",
            self.remaining_hours, self.entity, self.latest, self.now
        )
    }
}

/// Hours between `now` and `latest`, negative once the data has run out.
pub fn remaining_hours(latest: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    (latest - now).num_seconds() as f64 / 3600.0
}

/// Update the reminder counter and return an alert if one is due.
pub fn check_freshness(
    entity: &str,
    reminder: &mut ReminderState,
    latest: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Option<FreshnessAlert> {
    let remaining = remaining_hours(latest, now);

    let Some(tier) = FreshnessTier::classify(remaining) else {
        reminder.count = 0;
        return None;
    };

    reminder.count += 1;
    if (reminder.count - 1) % tier.interval() != 0 {
        return None;
    }

    let alert = FreshnessAlert {
        entity: entity.to_string(),
        remaining_hours: remaining,
        latest,
        now,
        tier,
    };
    warn!("{}", alert);
    Some(alert)
}
