//! Core types and data structures shared across the index resolver.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Coarse classification of a tracked entity.
///
/// The label is kept verbatim because it also names the entity's collection
/// in the time-series store; only the on-chain code is derived from it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Category(String);

impl Category {
    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    pub fn label(&self) -> &str {
        &self.0
    }

    /// Numeric code sent on-chain: primary is 0, everything else is 1.
    ///
    /// `realestate` is the label older configuration files use for the
    /// primary category.
    pub fn code(&self) -> u8 {
        match self.0.as_str() {
            "primary" | "realestate" => 0,
            _ => 1,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One tracked entity as declared in the configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityConfig {
    /// Entity name, e.g. a city
    pub name: String,
    /// Category label
    #[serde(alias = "type")]
    pub category: Category,
    /// Hours added to every stored timestamp
    #[serde(alias = "timezone", default)]
    pub utc_offset_hours: f64,
    /// Whole days added to every stored timestamp
    #[serde(alias = "timeDelay", default)]
    pub day_delay_days: i64,
}

impl EntityConfig {
    /// Store collection holding this entity's rows: `name_category`.
    pub fn collection_key(&self) -> String {
        format!("{}_{}", self.name, self.category)
    }
}

/// One row as retrieved from the time-series store.
#[derive(Debug, Clone, PartialEq)]
pub struct RawObservation {
    /// Naive, store-local timestamp
    pub timestamp: NaiveDateTime,
    pub hour_of_day: i64,
    pub value: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_codes() {
        assert_eq!(Category::new("primary").code(), 0);
        assert_eq!(Category::new("realestate").code(), 0);
        assert_eq!(Category::new("secondary").code(), 1);
        assert_eq!(Category::new("weather").code(), 1);
    }

    #[test]
    fn test_entity_config_accepts_legacy_field_names() {
        let json = r#"{"name":"London","type":"realestate","timezone":1.0,"timeDelay":2}"#;
        let config: EntityConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.name, "London");
        assert_eq!(config.category.label(), "realestate");
        assert_eq!(config.utc_offset_hours, 1.0);
        assert_eq!(config.day_delay_days, 2);
    }
}
