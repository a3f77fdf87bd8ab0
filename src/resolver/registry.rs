//! EntityRegistry - the fixed set of tracked entities
//!
//! Loaded once at startup from a JSON list of entity records. Iteration order
//! is the order of the configuration file and never changes afterwards, so
//! dispatch order is reproducible across cycles.

use anyhow::{Context, Result};
use std::collections::HashSet;
use std::path::Path;
use tracing::info;

use crate::resolver::types::{Entity, ResolverError};
use crate::types::EntityConfig;

/// Owned collection of all tracked entities.
#[derive(Debug, Clone, Default)]
pub struct EntityRegistry {
    entities: Vec<Entity>,
}

impl EntityRegistry {
    /// Build a registry from already-parsed records.
    pub fn from_configs(configs: Vec<EntityConfig>) -> Result<Self, ResolverError> {
        if configs.is_empty() {
            return Err(ResolverError::Config("no entities configured".to_string()));
        }

        let mut seen = HashSet::new();
        for config in &configs {
            if config.name.trim().is_empty() {
                return Err(ResolverError::Config("entity with empty name".to_string()));
            }
            if !config.utc_offset_hours.is_finite() {
                return Err(ResolverError::Config(format!(
                    "non-finite UTC offset for {}",
                    config.name
                )));
            }
            if !seen.insert((config.name.clone(), config.category.clone())) {
                return Err(ResolverError::Config(format!(
                    "duplicate entity {} ({})",
                    config.name, config.category
                )));
            }
        }

        Ok(Self {
            entities: configs.into_iter().map(Entity::new).collect(),
        })
    }

    /// Parse a JSON document holding a list of entity records.
    pub fn from_json(json: &str) -> Result<Self> {
        let configs: Vec<EntityConfig> =
            serde_json::from_str(json).context("Malformed entity configuration")?;
        Ok(Self::from_configs(configs)?)
    }

    /// Read and parse the entity configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read entity configuration {}", path.display()))?;
        let registry = Self::from_json(&json)
            .with_context(|| format!("Invalid entity configuration {}", path.display()))?;

        info!("Loaded {} entities from {}", registry.len(), path.display());
        Ok(registry)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.entities.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Entity> {
        self.entities.iter_mut()
    }

    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    pub fn get(&self, name: &str) -> Option<&Entity> {
        self.entities.iter().find(|e| e.name() == name)
    }
}
