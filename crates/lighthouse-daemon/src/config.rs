//! Configuration loading

use anyhow::{Context, Result};
use lighthouse_core::DEFAULT_STALE_MINUTES;
use lighthouse_discovery::DEFAULT_PROBE_PROGRAM;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub presence: PresenceConfig,
    #[serde(default)]
    pub probe: ProbeConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Bind address for web server
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Directory holding the static dashboard
    #[serde(default = "default_web_root")]
    pub web_root: String,
    /// Background rescan period in seconds (0 to disable)
    #[serde(default)]
    pub scan_interval_secs: u64,
    /// Network scanned in the background; the primary network when unset
    #[serde(default)]
    pub scan_network: Option<String>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            web_root: default_web_root(),
            scan_interval_secs: 0,
            scan_network: None,
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_web_root() -> String {
    "web".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// SQLite database file
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> String {
    "data/lighthouse.db".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenceConfig {
    /// Devices not seen for this many minutes are reported offline
    #[serde(default = "default_stale_minutes")]
    pub stale_after_minutes: u32,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            stale_after_minutes: default_stale_minutes(),
        }
    }
}

fn default_stale_minutes() -> u32 {
    DEFAULT_STALE_MINUTES
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeConfig {
    /// External discovery program, invoked with the CIDR as its last argument
    #[serde(default = "default_probe_program")]
    pub program: String,
    /// Arguments placed before the CIDR
    #[serde(default)]
    pub args: Vec<String>,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            program: default_probe_program(),
            args: Vec::new(),
        }
    }
}

fn default_probe_program() -> String {
    DEFAULT_PROBE_PROGRAM.to_string()
}

/// Load configuration from file, falling back to defaults when it is missing
pub fn load_config(path: &Path) -> Result<Config> {
    if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    } else {
        info!(
            path = %path.display(),
            "Configuration file not found, using defaults"
        );
        Ok(Config::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config = load_config(&temp_dir.path().join("lighthouse.toml")).unwrap();

        assert_eq!(config.daemon.bind, "0.0.0.0:8080");
        assert_eq!(config.daemon.scan_interval_secs, 0);
        assert_eq!(config.storage.path, "data/lighthouse.db");
        assert_eq!(config.presence.stale_after_minutes, 10);
        assert_eq!(config.probe.program, "lighthouse-probe");
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("lighthouse.toml");
        std::fs::write(
            &path,
            r#"
[presence]
stale_after_minutes = 3

[probe]
program = "ruby"
args = ["scripts/scanner.rb"]
"#,
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.presence.stale_after_minutes, 3);
        assert_eq!(config.probe.program, "ruby");
        assert_eq!(config.probe.args, vec!["scripts/scanner.rb"]);
        assert_eq!(config.daemon.web_root, "web");
        assert_eq!(config.daemon.scan_network, None);
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("lighthouse.toml");
        std::fs::write(&path, "[presence]\nstale_after_minutes = \"soon\"\n").unwrap();

        assert!(load_config(&path).is_err());
    }
}
