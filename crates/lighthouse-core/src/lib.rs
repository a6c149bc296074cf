//! Lighthouse Core - Device presence model and persistent store
//!
//! This crate provides the foundational pieces of Lighthouse:
//! - Device records and the raw observations they are merged from
//! - The SQLite-backed device store (merge, staleness sweep, stats)
//! - Local network descriptions shared with the discovery layer

pub mod device;
pub mod network;
pub mod store;

pub use device::{Device, DeviceId, Observation};
pub use network::Network;
pub use store::{DeviceStore, Stats, StoreError, UpsertOutcome, DEFAULT_STALE_MINUTES};
