//! SQLite-backed device store
//!
//! The store is the single writer of device presence. Observations are merged
//! into one row per IP address:
//! - `last_seen_at` and `is_online` are refreshed on every observation
//! - optional fields (MAC, hostname, vendor) only move from unknown to known,
//!   an observation that omits a field never erases what was learned before
//! - `is_online` is cleared only by [`DeviceStore::sweep_stale`]
//!
//! Every mutation and every multi-step read runs inside its own transaction
//! on a connection guarded by a mutex, so readers never see a half-applied
//! merge or a partially swept table.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

use crate::device::{known, Device, DeviceId, Observation};

/// Staleness threshold used by the serving layer unless configured otherwise
pub const DEFAULT_STALE_MINUTES: u32 = 10;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("Failed to prepare database location: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid timestamp {millis} stored for {ip}")]
    InvalidTimestamp { ip: String, millis: i64 },
    #[error("Observation has no IP address")]
    MissingAddress,
}

/// Aggregate presence counts, taken from one consistent snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    pub total: usize,
    pub online: usize,
    pub offline: usize,
}

/// Whether an upsert created a new device or merged into an existing one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created(DeviceId),
    Updated(DeviceId),
}

impl UpsertOutcome {
    pub fn id(&self) -> DeviceId {
        match self {
            Self::Created(id) | Self::Updated(id) => *id,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, Self::Created(_))
    }
}

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS devices (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        ip_address TEXT NOT NULL UNIQUE,
        mac_address TEXT,
        hostname TEXT,
        vendor TEXT,
        is_online INTEGER NOT NULL DEFAULT 1,
        first_seen_at INTEGER NOT NULL
            DEFAULT (CAST((julianday('now') - 2440587.5) * 86400000 AS INTEGER)),
        last_seen_at INTEGER NOT NULL
            DEFAULT (CAST((julianday('now') - 2440587.5) * 86400000 AS INTEGER))
    );

    CREATE INDEX IF NOT EXISTS idx_devices_mac ON devices(mac_address);
    CREATE INDEX IF NOT EXISTS idx_devices_online ON devices(is_online);
";

const SELECT_DEVICE: &str = "
    SELECT id, ip_address, mac_address, hostname, vendor, is_online, first_seen_at, last_seen_at
    FROM devices
";

/// Persistent device store
///
/// Open one per process at startup, share it by reference (or `Arc`), and
/// close it explicitly at shutdown.
pub struct DeviceStore {
    conn: Mutex<Connection>,
}

impl DeviceStore {
    /// Open (or create) a store at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA synchronous=NORMAL;
             PRAGMA busy_timeout=5000;",
        )?;

        let store = Self::from_connection(conn)?;
        info!(path = %path.display(), "Opened device store");
        Ok(store)
    }

    /// Create a store that lives only as long as this handle
    pub fn in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Merge an observation taken now
    pub fn upsert(&self, observation: &Observation) -> Result<UpsertOutcome, StoreError> {
        self.upsert_at(observation, Utc::now())
    }

    /// Merge an observation taken at `now`
    pub fn upsert_at(
        &self,
        observation: &Observation,
        now: DateTime<Utc>,
    ) -> Result<UpsertOutcome, StoreError> {
        let ip = observation.ip.trim();
        if ip.is_empty() {
            return Err(StoreError::MissingAddress);
        }
        let mac = known(observation.mac.as_deref());
        let hostname = known(observation.hostname.as_deref());
        let vendor = known(observation.vendor.as_deref());
        let now_ms = now.timestamp_millis();

        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let existing: Option<i64> = tx
            .query_row(
                "SELECT id FROM devices WHERE ip_address = ?1",
                params![ip],
                |row| row.get(0),
            )
            .optional()?;

        let outcome = match existing {
            Some(id) => {
                tx.execute(
                    "UPDATE devices SET
                        mac_address = COALESCE(?2, mac_address),
                        hostname = COALESCE(?3, hostname),
                        vendor = COALESCE(?4, vendor),
                        is_online = 1,
                        last_seen_at = MAX(last_seen_at, ?5)
                     WHERE id = ?1",
                    params![id, mac, hostname, vendor, now_ms],
                )?;
                UpsertOutcome::Updated(DeviceId(id))
            }
            None => {
                tx.execute(
                    "INSERT INTO devices
                        (ip_address, mac_address, hostname, vendor, is_online, first_seen_at, last_seen_at)
                     VALUES (?1, ?2, ?3, ?4, 1, ?5, ?5)",
                    params![ip, mac, hostname, vendor, now_ms],
                )?;
                UpsertOutcome::Created(DeviceId(tx.last_insert_rowid()))
            }
        };

        tx.commit()?;
        debug!(ip = %ip, outcome = ?outcome, "Recorded observation");
        Ok(outcome)
    }

    /// All devices, online first, then by IP address string ascending
    pub fn list_all(&self) -> Result<Vec<Device>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt =
            conn.prepare(&format!("{SELECT_DEVICE} ORDER BY is_online DESC, ip_address ASC"))?;

        let rows = stmt
            .query_map([], DeviceRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter().map(DeviceRow::into_device).collect()
    }

    /// Look up the device recorded for an IP address
    pub fn get(&self, ip: &str) -> Result<Option<Device>, StoreError> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                &format!("{SELECT_DEVICE} WHERE ip_address = ?1"),
                params![ip.trim()],
                DeviceRow::from_row,
            )
            .optional()?;

        row.map(DeviceRow::into_device).transpose()
    }

    /// Mark devices not seen within `threshold_minutes` as offline.
    ///
    /// Returns how many devices changed state.
    pub fn sweep_stale(&self, threshold_minutes: u32) -> Result<usize, StoreError> {
        self.sweep_stale_at(threshold_minutes, Utc::now())
    }

    /// Staleness sweep evaluated against `now`
    pub fn sweep_stale_at(
        &self,
        threshold_minutes: u32,
        now: DateTime<Utc>,
    ) -> Result<usize, StoreError> {
        let cutoff = now - chrono::Duration::minutes(i64::from(threshold_minutes));

        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let changed = tx.execute(
            "UPDATE devices SET is_online = 0 WHERE is_online = 1 AND last_seen_at < ?1",
            params![cutoff.timestamp_millis()],
        )?;
        tx.commit()?;

        if changed > 0 {
            info!(count = changed, threshold_minutes, "Marked stale devices offline");
        }
        Ok(changed)
    }

    /// Presence counts from a single snapshot; `offline` is derived, never counted
    pub fn stats(&self) -> Result<Stats, StoreError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let (total, online): (i64, i64) = tx.query_row(
            "SELECT COUNT(*), COALESCE(SUM(is_online), 0) FROM devices",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        tx.commit()?;

        let total = usize::try_from(total).unwrap_or_default();
        let online = usize::try_from(online).unwrap_or_default();
        Ok(Stats {
            total,
            online,
            offline: total - online,
        })
    }

    /// Flush and close the underlying connection
    pub fn close(self) -> Result<(), StoreError> {
        self.conn
            .into_inner()
            .close()
            .map_err(|(_, e)| StoreError::Database(e))?;
        info!("Closed device store");
        Ok(())
    }
}

/// Raw column values, converted to a [`Device`] outside the row callback
struct DeviceRow {
    id: i64,
    ip_address: String,
    mac_address: Option<String>,
    hostname: Option<String>,
    vendor: Option<String>,
    is_online: bool,
    first_seen_ms: i64,
    last_seen_ms: i64,
}

impl DeviceRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            ip_address: row.get(1)?,
            mac_address: row.get(2)?,
            hostname: row.get(3)?,
            vendor: row.get(4)?,
            is_online: row.get(5)?,
            first_seen_ms: row.get(6)?,
            last_seen_ms: row.get(7)?,
        })
    }

    fn into_device(self) -> Result<Device, StoreError> {
        let first_seen_at = timestamp(&self.ip_address, self.first_seen_ms)?;
        let last_seen_at = timestamp(&self.ip_address, self.last_seen_ms)?;
        Ok(Device {
            id: DeviceId(self.id),
            ip_address: self.ip_address,
            hardware_address: self.mac_address,
            hostname: self.hostname,
            vendor: self.vendor,
            is_online: self.is_online,
            first_seen_at,
            last_seen_at,
        })
    }
}

fn timestamp(ip: &str, millis: i64) -> Result<DateTime<Utc>, StoreError> {
    DateTime::from_timestamp_millis(millis).ok_or_else(|| StoreError::InvalidTimestamp {
        ip: ip.to_string(),
        millis,
    })
}
