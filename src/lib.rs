//! index-resolver - hourly on-chain index oracle synchronisation
//!
//! This crate keeps an on-chain oracle in step with the hourly index values
//! stored for a fixed set of entities (cities), writing the current value and
//! the per-timeframe fills once every hour.

pub mod config;
pub mod types;
pub mod resolver;

// Re-export main types for convenience
pub use types::{Category, EntityConfig, RawObservation};
