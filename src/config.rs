//! Process environment settings.
//!
//! Values come from the real environment, optionally seeded from a `.env`
//! file. The store connection string and the admin address are required.

use anyhow::{anyhow, bail, Context, Result};
use std::path::Path;
use std::time::Duration;
use tokio::sync::Semaphore;

use crate::resolver::{ResolverBuilder, ResolverConfig};

#[derive(Debug, Clone)]
pub struct Settings {
    /// Time-series store connection string
    pub store_url: String,
    /// On-chain admin address namespacing every ledger function
    pub admin_address: String,
    /// Ledger CLI binary
    pub aptos_bin: String,
    /// Ledger CLI profile
    pub aptos_profile: String,
    pub poll_interval: Duration,
    pub max_concurrent_fetches: usize,
}

impl Settings {
    /// Load `.env` (or `env_file`) into the environment, then read settings.
    pub fn load(env_file: Option<&Path>) -> Result<Self> {
        match env_file {
            Some(path) => {
                dotenv::from_path(path)
                    .with_context(|| format!("Failed to load env file {}", path.display()))?;
            }
            None => {
                // A missing default .env is fine; the real environment may carry everything
                let _ = dotenv::dotenv();
            }
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let store_url = non_empty("INDEX_STORE_URL")
            .or_else(|| non_empty("MONGODB_CONNECTION_URI"))
            .ok_or_else(|| anyhow!("INDEX_STORE_URL is not set"))?;
        let admin_address =
            non_empty("ADMIN_ADDRESS").ok_or_else(|| anyhow!("ADMIN_ADDRESS is not set"))?;

        let defaults = ResolverConfig::default();
        let poll_interval = match non_empty("POLL_INTERVAL_SECS") {
            Some(v) => {
                let secs: u64 = v.parse().context("POLL_INTERVAL_SECS must be an integer")?;
                if secs == 0 {
                    bail!("POLL_INTERVAL_SECS must be at least 1");
                }
                Duration::from_secs(secs)
            }
            None => defaults.poll_interval,
        };
        let max_concurrent_fetches = match non_empty("MAX_CONCURRENT_FETCHES") {
            Some(v) => {
                let limit: usize = v.parse().context("MAX_CONCURRENT_FETCHES must be an integer")?;
                if limit == 0 || limit > Semaphore::MAX_PERMITS {
                    bail!(
                        "MAX_CONCURRENT_FETCHES must be between 1 and {}",
                        Semaphore::MAX_PERMITS
                    );
                }
                limit
            }
            None => defaults.max_concurrent_fetches,
        };

        Ok(Self {
            store_url,
            admin_address,
            aptos_bin: non_empty("APTOS_BIN").unwrap_or_else(|| "aptos".to_string()),
            aptos_profile: non_empty("APTOS_PROFILE").unwrap_or_else(|| "default".to_string()),
            poll_interval,
            max_concurrent_fetches,
        })
    }

    /// Scheduler builder seeded from these settings.
    pub fn resolver_builder(&self) -> ResolverBuilder {
        ResolverBuilder::new()
            .with_poll_interval(self.poll_interval)
            .with_max_concurrent_fetches(self.max_concurrent_fetches)
    }
}
