//! Device records and the raw scan observations they are built from

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Stable identifier assigned to a device on first insert, never reused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(pub i64);

impl DeviceId {
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A device tracked by the store, one per IP address ever observed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    /// Assigned at first insert
    pub id: DeviceId,
    /// Identity of the device for merge purposes
    pub ip_address: String,
    /// MAC address, once learned never cleared
    pub hardware_address: Option<String>,
    /// Resolved hostname, once learned never cleared
    pub hostname: Option<String>,
    /// Vendor label reported by the probe, once learned never cleared
    pub vendor: Option<String>,
    /// True after an observation, false only after a staleness sweep
    pub is_online: bool,
    /// When the device was first observed
    pub first_seen_at: DateTime<Utc>,
    /// When the device was most recently observed
    pub last_seen_at: DateTime<Utc>,
}

impl Device {
    pub fn status_label(&self) -> &'static str {
        if self.is_online {
            "online"
        } else {
            "offline"
        }
    }
}

/// One raw scan result for a single address, possibly partial.
///
/// Deserializes directly from the probe's JSON output, where every key but
/// `ip` may be missing. A missing or null `ip` yields a blank observation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub ip: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mac: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vendor: Option<String>,
}

impl Observation {
    pub fn new(ip: impl Into<String>) -> Self {
        Self {
            ip: ip.into(),
            ..Default::default()
        }
    }

    pub fn with_mac(mut self, mac: impl Into<String>) -> Self {
        self.mac = Some(mac.into());
        self
    }

    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = Some(hostname.into());
        self
    }

    pub fn with_vendor(mut self, vendor: impl Into<String>) -> Self {
        self.vendor = Some(vendor.into());
        self
    }

    /// Trim every field and collapse blank optional values to `None`
    pub fn normalized(self) -> Self {
        Self {
            ip: self.ip.trim().to_string(),
            mac: known(self.mac.as_deref()).map(str::to_string),
            hostname: known(self.hostname.as_deref()).map(str::to_string),
            vendor: known(self.vendor.as_deref()).map(str::to_string),
        }
    }

    /// True when the observation carries no address to key a device on
    pub fn is_blank(&self) -> bool {
        self.ip.trim().is_empty()
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// An empty or whitespace-only value means "unknown", not a value
pub(crate) fn known(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_observation_from_probe_json() {
        let json = r#"[
            {"ip": "192.168.1.1", "mac": "AA:BB:CC:DD:EE:FF", "vendor": "Netgear"},
            {"ip": "192.168.1.20", "hostname": "nas.local"}
        ]"#;
        let observations: Vec<Observation> = serde_json::from_str(json).unwrap();

        assert_eq!(observations.len(), 2);
        assert_eq!(observations[0].mac.as_deref(), Some("AA:BB:CC:DD:EE:FF"));
        assert_eq!(observations[0].hostname, None);
        assert_eq!(observations[1].hostname.as_deref(), Some("nas.local"));
        assert_eq!(observations[1].vendor, None);
    }

    #[test]
    fn test_normalized_collapses_blank_fields() {
        let obs = Observation::new(" 10.0.0.5 ")
            .with_mac("")
            .with_hostname("  printer ")
            .with_vendor("   ")
            .normalized();

        assert_eq!(obs.ip, "10.0.0.5");
        assert_eq!(obs.mac, None);
        assert_eq!(obs.hostname.as_deref(), Some("printer"));
        assert_eq!(obs.vendor, None);
    }

    #[test]
    fn test_blank_observation() {
        assert!(Observation::new("  ").is_blank());
        assert!(Observation::default().is_blank());
        assert!(!Observation::new("10.0.0.1").is_blank());
    }

    #[test]
    fn test_null_ip_is_blank() {
        let observations: Vec<Observation> =
            serde_json::from_str(r#"[{"ip": null, "mac": "AA:BB:CC:DD:EE:FF"}, {"hostname": "x"}]"#)
                .unwrap();

        assert!(observations[0].is_blank());
        assert_eq!(observations[0].mac.as_deref(), Some("AA:BB:CC:DD:EE:FF"));
        assert!(observations[1].is_blank());
    }

    #[test]
    fn test_device_serializes_camel_case() {
        let now = Utc::now();
        let device = Device {
            id: DeviceId(7),
            ip_address: "10.0.0.7".to_string(),
            hardware_address: Some("AA:BB:CC:DD:EE:FF".to_string()),
            hostname: None,
            vendor: None,
            is_online: false,
            first_seen_at: now,
            last_seen_at: now,
        };
        let value = serde_json::to_value(&device).unwrap();

        assert_eq!(value["id"], 7);
        assert_eq!(value["ipAddress"], "10.0.0.7");
        assert_eq!(value["hardwareAddress"], "AA:BB:CC:DD:EE:FF");
        assert_eq!(value["isOnline"], false);
        assert_eq!(device.status_label(), "offline");
    }
}
