//! Local interface enumeration and primary network selection

use ipnetwork::Ipv4Network;
use lighthouse_core::Network;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, trace};

/// Interface name prefixes that never carry a scannable LAN
const SKIP_PREFIXES: &[&str] = &[
    "awdl",   // Apple Wireless Direct Link
    "llw",    // Low latency WLAN
    "utun",   // VPN tunnels
    "bridge", // Bridges
    "docker", // Docker
    "veth",   // Virtual ethernet (containers)
    "virbr",  // Libvirt bridges
];

/// Conventional name of the primary interface on macOS
const PRIMARY_INTERFACE: &str = "en0";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum NetworkError {
    #[error("No usable network detected")]
    NoNetworkFound,
}

/// Point-in-time view of one local interface
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceSnapshot {
    pub name: String,
    pub is_up: bool,
    pub is_loopback: bool,
    /// IPv4 addresses with their prefix length; other families are dropped
    pub ipv4: Vec<Ipv4Network>,
}

/// Source of local interface snapshots
pub trait InterfaceSource: Send + Sync {
    fn interfaces(&self) -> Vec<InterfaceSnapshot>;
}

/// Reads the host's interfaces through the datalink layer
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemInterfaces;

impl InterfaceSource for SystemInterfaces {
    fn interfaces(&self) -> Vec<InterfaceSnapshot> {
        pnet::datalink::interfaces()
            .into_iter()
            .map(|iface| InterfaceSnapshot {
                is_up: iface.is_up(),
                is_loopback: iface.is_loopback(),
                ipv4: iface
                    .ips
                    .iter()
                    .filter_map(|net| match net.ip() {
                        std::net::IpAddr::V4(ip) => Ipv4Network::new(ip, net.prefix()).ok(),
                        std::net::IpAddr::V6(_) => None,
                    })
                    .collect(),
                name: iface.name,
            })
            .collect()
    }
}

/// Lists scannable networks and picks the primary one
#[derive(Clone)]
pub struct NetworkEnumerator {
    source: Arc<dyn InterfaceSource>,
}

impl NetworkEnumerator {
    pub fn new(source: Arc<dyn InterfaceSource>) -> Self {
        Self { source }
    }

    /// Enumerator backed by the host's real interfaces
    pub fn system() -> Self {
        Self::new(Arc::new(SystemInterfaces))
    }

    /// Active, non-virtual IPv4 networks, in interface order
    pub fn list_networks(&self) -> Vec<Network> {
        let networks = networks_from(&self.source.interfaces());
        debug!(count = networks.len(), "Enumerated local networks");
        networks
    }

    /// The network to scan when no target is given
    pub fn primary_network(&self) -> Result<Network, NetworkError> {
        select_primary(self.list_networks())
    }
}

/// Filter interface snapshots down to scannable networks
pub fn networks_from(interfaces: &[InterfaceSnapshot]) -> Vec<Network> {
    let mut networks = Vec::new();

    for iface in interfaces {
        if iface.is_loopback || !iface.is_up || should_skip(&iface.name) {
            trace!(interface = %iface.name, "Skipping interface");
            continue;
        }

        for addr in &iface.ipv4 {
            if addr.ip().is_loopback() {
                continue;
            }
            networks.push(Network {
                interface: iface.name.clone(),
                ip: addr.ip().to_string(),
                cidr: format!("{}/{}", addr.network(), addr.prefix()),
            });
        }
    }

    networks
}

/// Pick the primary network: `en0`, then wireless, then ethernet, then anything
pub fn select_primary(networks: Vec<Network>) -> Result<Network, NetworkError> {
    let rank = |net: &Network| {
        let name = net.interface.as_str();
        if name == PRIMARY_INTERFACE {
            0
        } else if name.starts_with("wlan") {
            1
        } else if name.starts_with("eth") || name.starts_with("en") {
            2
        } else {
            3
        }
    };

    // min_by_key keeps the first of equally ranked networks
    networks
        .into_iter()
        .min_by_key(rank)
        .ok_or(NetworkError::NoNetworkFound)
}

fn should_skip(name: &str) -> bool {
    SKIP_PREFIXES.iter().any(|prefix| name.starts_with(prefix))
}
