//! Lighthouse Discovery - Finding devices on the local network
//!
//! This crate provides:
//! - Local interface enumeration and primary network selection
//! - The probe adapter that runs an external scanner against a subnet
//! - The presence service tying scans, staleness sweeps and the store together

pub mod interfaces;
pub mod probe;
pub mod scanner;

pub use interfaces::{
    InterfaceSnapshot, InterfaceSource, NetworkEnumerator, NetworkError, SystemInterfaces,
};
pub use probe::{CommandProber, ProbeError, Prober, DEFAULT_PROBE_PROGRAM};
pub use scanner::{
    ImportFailure, ImportReport, PresenceService, ScanError, ScanReport, ScanTarget,
};
