//! Local network description produced by interface enumeration

use serde::{Deserialize, Serialize};

/// A local IPv4 network reachable through one interface. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Network {
    /// Interface name (e.g., "en0", "wlan0")
    pub interface: String,
    /// This host's address on the interface
    pub ip: String,
    /// Network address and prefix length (e.g., "192.168.1.0/24")
    pub cidr: String,
}
