//! Presence service: composes enumeration, probing and the device store
//!
//! Reads always run a staleness sweep before touching the store so that the
//! returned view reflects current reachability. A scan runs the probe and the
//! import together on a blocking thread that owns the scan lock, so it runs to
//! completion and stays exclusive even if the caller stops waiting for it.

use lighthouse_core::{Device, DeviceStore, Network, Observation, Stats, StoreError};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use crate::interfaces::{NetworkEnumerator, NetworkError};
use crate::probe::{ProbeError, Prober};

#[derive(Error, Debug)]
pub enum ScanError {
    #[error(transparent)]
    Network(#[from] NetworkError),
    #[error(transparent)]
    Probe(#[from] ProbeError),
    #[error("A scan is already in progress")]
    InProgress,
    #[error("Scan task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// The subnet a scan runs against
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanTarget {
    pub cidr: String,
    /// Set when the target was auto-detected rather than given
    pub detected: Option<Network>,
}

/// Outcome of saving one scan's observations
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub attempted: usize,
    pub saved: usize,
    /// Saved observations that created a new device
    pub created: usize,
    pub failures: Vec<ImportFailure>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportFailure {
    pub ip: String,
    pub error: String,
}

impl ImportReport {
    pub fn failed(&self, ip: &str) -> bool {
        self.failures.iter().any(|f| f.ip == ip)
    }
}

/// Result of a completed scan
#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    pub target: ScanTarget,
    pub observations: Vec<Observation>,
    pub import: ImportReport,
}

/// Presence tracking over a shared device store
pub struct PresenceService {
    store: Arc<DeviceStore>,
    prober: Arc<dyn Prober>,
    enumerator: NetworkEnumerator,
    stale_after_minutes: u32,
    scan_lock: Arc<Mutex<()>>,
}

impl PresenceService {
    pub fn new(
        store: Arc<DeviceStore>,
        prober: Arc<dyn Prober>,
        enumerator: NetworkEnumerator,
        stale_after_minutes: u32,
    ) -> Self {
        Self {
            store,
            prober,
            enumerator,
            stale_after_minutes,
            scan_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn store(&self) -> &Arc<DeviceStore> {
        &self.store
    }

    pub fn stale_after_minutes(&self) -> u32 {
        self.stale_after_minutes
    }

    /// Sweep, then list every device (online first, then by IP)
    pub fn devices(&self) -> Result<Vec<Device>, StoreError> {
        self.sweep();
        self.store.list_all()
    }

    /// Sweep, then count devices
    pub fn stats(&self) -> Result<Stats, StoreError> {
        self.sweep();
        self.store.stats()
    }

    /// Local networks available for scanning
    pub fn networks(&self) -> Vec<Network> {
        self.enumerator.list_networks()
    }

    pub fn primary_network(&self) -> Result<Network, NetworkError> {
        self.enumerator.primary_network()
    }

    /// A sweep failure must not fail the read it precedes
    fn sweep(&self) {
        if let Err(e) = self.store.sweep_stale(self.stale_after_minutes) {
            warn!(error = %e, "Failed to mark stale devices offline");
        }
    }

    /// Use the given CIDR, or fall back to the primary network
    pub fn resolve_target(&self, target: Option<&str>) -> Result<ScanTarget, NetworkError> {
        match target.map(str::trim).filter(|t| !t.is_empty()) {
            Some(cidr) => Ok(ScanTarget {
                cidr: cidr.to_string(),
                detected: None,
            }),
            None => {
                let primary = self.enumerator.primary_network()?;
                info!(
                    cidr = %primary.cidr,
                    interface = %primary.interface,
                    ip = %primary.ip,
                    "Auto-detected network"
                );
                Ok(ScanTarget {
                    cidr: primary.cidr.clone(),
                    detected: Some(primary),
                })
            }
        }
    }

    /// Scan and import, waiting for any scan already running to finish
    pub async fn scan(&self, target: Option<&str>) -> Result<ScanReport, ScanError> {
        let target = self.resolve_target(target)?;
        let guard = self.scan_lock.clone().lock_owned().await;
        self.scan_locked(target, guard).await
    }

    /// Scan and import, or fail with [`ScanError::InProgress`] if busy
    pub async fn try_scan(&self, target: Option<&str>) -> Result<ScanReport, ScanError> {
        let target = self.resolve_target(target)?;
        let guard = self
            .scan_lock
            .clone()
            .try_lock_owned()
            .map_err(|_| ScanError::InProgress)?;
        self.scan_locked(target, guard).await
    }

    /// The blocking task holds `guard` until the import has finished.
    /// Dropping the returned future detaches the task; it is not cancelled.
    async fn scan_locked(
        &self,
        target: ScanTarget,
        guard: OwnedMutexGuard<()>,
    ) -> Result<ScanReport, ScanError> {
        info!(cidr = %target.cidr, "Starting scan");

        let prober = self.prober.clone();
        let store = self.store.clone();
        let task = tokio::task::spawn_blocking(move || -> Result<ScanReport, ProbeError> {
            let _guard = guard;
            let observations = prober.scan(&target.cidr)?;

            let import = import_into(&store, &observations);
            info!(
                cidr = %target.cidr,
                found = observations.len(),
                saved = import.saved,
                created = import.created,
                failed = import.failures.len(),
                "Scan complete"
            );

            Ok(ScanReport {
                target,
                observations,
                import,
            })
        });

        Ok(task.await??)
    }

    /// Save every observation independently; one failure never aborts the rest
    pub fn import(&self, observations: &[Observation]) -> ImportReport {
        import_into(&self.store, observations)
    }

    /// Rescan on a fixed period until the task is dropped
    pub async fn run(&self, period: Duration, target: Option<String>) {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        info!(period_secs = period.as_secs(), "Background scanning started");

        loop {
            ticker.tick().await;
            debug!("Running scheduled scan");
            match self.try_scan(target.as_deref()).await {
                Ok(_) => {}
                Err(ScanError::InProgress) => debug!("Skipping scheduled scan, one is running"),
                Err(e) => warn!(error = %e, "Scheduled scan failed"),
            }
        }
    }
}

fn import_into(store: &DeviceStore, observations: &[Observation]) -> ImportReport {
    let mut report = ImportReport {
        attempted: observations.len(),
        ..Default::default()
    };

    for observation in observations {
        match store.upsert(observation) {
            Ok(outcome) => {
                report.saved += 1;
                if outcome.is_created() {
                    report.created += 1;
                }
            }
            Err(e) => {
                warn!(ip = %observation.ip, error = %e, "Failed to save device");
                report.failures.push(ImportFailure {
                    ip: observation.ip.clone(),
                    error: e.to_string(),
                });
            }
        }
    }

    report
}
