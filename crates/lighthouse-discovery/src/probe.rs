//! Probe adapter: runs an external discovery mechanism against a subnet
//!
//! The probe is a blocking call with no latency bound. Callers on an async
//! runtime should move it onto a blocking thread.

use ipnetwork::Ipv4Network;
use lighthouse_core::Observation;
use std::process::Command;
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Default executable invoked by [`CommandProber`]
pub const DEFAULT_PROBE_PROGRAM: &str = "lighthouse-probe";

/// Longest slice of probe output carried inside an error
const MAX_ERROR_OUTPUT: usize = 2048;

#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("Invalid scan target '{0}', expected IPv4 CIDR such as 192.168.1.0/24")]
    InvalidTarget(String),
    #[error("Probe failed: could not run '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Probe failed: exited with {status}\nOutput: {output}")]
    Exit { status: String, output: String },
    #[error("Probe failed: unparseable scan results: {source}\nOutput: {output}")]
    Parse {
        #[source]
        source: serde_json::Error,
        output: String,
    },
}

/// Capability to discover devices on a subnet
pub trait Prober: Send + Sync {
    /// Scan `cidr` and return every device observed.
    ///
    /// A failed scan is an error, never an empty result.
    fn scan(&self, cidr: &str) -> Result<Vec<Observation>, ProbeError>;
}

/// Runs an external program as `<program> [args...] <cidr>` and reads a JSON
/// array of `{ip, mac?, hostname?, vendor?}` objects from its stdout.
///
/// Only stdout is parsed. A program that writes nothing to stderr behaves
/// exactly as if its combined output were parsed; diagnostics on stderr are
/// logged at debug and do not corrupt the result. On a non-zero exit both
/// streams are carried in [`ProbeError::Exit`].
#[derive(Debug, Clone)]
pub struct CommandProber {
    program: String,
    args: Vec<String>,
}

impl CommandProber {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

impl Default for CommandProber {
    fn default() -> Self {
        Self::new(DEFAULT_PROBE_PROGRAM, Vec::new())
    }
}

impl Prober for CommandProber {
    fn scan(&self, cidr: &str) -> Result<Vec<Observation>, ProbeError> {
        let target = validate_target(cidr)?;

        info!(program = %self.program, cidr = %target, "Running probe");
        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(target.to_string())
            .output()
            .map_err(|source| ProbeError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if !output.status.success() {
            let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
            combined.push_str(&String::from_utf8_lossy(&output.stderr));
            return Err(ProbeError::Exit {
                status: output.status.to_string(),
                output: excerpt(&combined),
            });
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            debug!(stderr = %stderr.trim(), "Probe wrote diagnostics");
        }

        let observations = parse_observations(&output.stdout)?;
        info!(cidr = %target, count = observations.len(), "Probe finished");
        Ok(observations)
    }
}

/// Accept only dotted-quad IPv4 CIDR notation (`a.b.c.d/nn`)
pub fn validate_target(cidr: &str) -> Result<Ipv4Network, ProbeError> {
    let cidr = cidr.trim();
    if !cidr.contains('/') {
        return Err(ProbeError::InvalidTarget(cidr.to_string()));
    }
    Ipv4Network::from_str(cidr).map_err(|_| ProbeError::InvalidTarget(cidr.to_string()))
}

/// Parse probe output into normalized observations.
///
/// Entries without an address are dropped with a warning; anything that is
/// not a JSON array of objects is an error.
pub fn parse_observations(stdout: &[u8]) -> Result<Vec<Observation>, ProbeError> {
    let raw: Vec<Observation> =
        serde_json::from_slice(stdout).map_err(|source| ProbeError::Parse {
            source,
            output: excerpt(&String::from_utf8_lossy(stdout)),
        })?;

    let mut observations = Vec::with_capacity(raw.len());
    for observation in raw {
        if observation.is_blank() {
            warn!(entry = ?observation, "Skipping probe entry without an IP address");
            continue;
        }
        observations.push(observation.normalized());
    }
    Ok(observations)
}

fn excerpt(output: &str) -> String {
    let trimmed = output.trim();
    if trimmed.len() <= MAX_ERROR_OUTPUT {
        return trimmed.to_string();
    }
    let mut end = MAX_ERROR_OUTPUT;
    while !trimmed.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &trimmed[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_target() {
        assert!(validate_target("192.168.1.0/24").is_ok());
        assert!(validate_target(" 10.0.0.0/8 ").is_ok());
        assert!(matches!(
            validate_target("192.168.1.0"),
            Err(ProbeError::InvalidTarget(_))
        ));
        assert!(matches!(
            validate_target("192.168.1.0/33"),
            Err(ProbeError::InvalidTarget(_))
        ));
        assert!(matches!(
            validate_target("example.com/24"),
            Err(ProbeError::InvalidTarget(_))
        ));
        assert!(matches!(
            validate_target("192.168.1.0/24; rm -rf /"),
            Err(ProbeError::InvalidTarget(_))
        ));
    }

    #[test]
    fn test_parse_observations() {
        let stdout = br#"[
            {"ip": "192.168.1.1", "mac": "AA:BB:CC:DD:EE:FF", "vendor": "Netgear"},
            {"ip": "192.168.1.50", "hostname": " tv.local "},
            {"mac": "11:22:33:44:55:66"},
            {"ip": null, "hostname": "ghost"},
            {"ip": "192.168.1.60", "vendor": ""}
        ]"#;

        let observations = parse_observations(stdout).unwrap();
        assert_eq!(observations.len(), 3);
        assert_eq!(observations[0].vendor.as_deref(), Some("Netgear"));
        assert_eq!(observations[1].hostname.as_deref(), Some("tv.local"));
        assert_eq!(observations[2].ip, "192.168.1.60");
        assert_eq!(observations[2].vendor, None);
    }

    #[test]
    fn test_empty_array_is_zero_devices() {
        assert!(parse_observations(b"[]\n").unwrap().is_empty());
    }

    #[test]
    fn test_garbage_output_is_an_error() {
        let outputs: [&[u8]; 3] = [b"", b"Error: nmap command failed", br#"{"ip": "10.0.0.1"}"#];
        for output in outputs {
            assert!(matches!(
                parse_observations(output),
                Err(ProbeError::Parse { .. })
            ));
        }
    }

    #[test]
    fn test_excerpt_truncates_long_output() {
        let long = "x".repeat(MAX_ERROR_OUTPUT + 100);
        let short = excerpt(&long);
        assert!(short.ends_with("..."));
        assert_eq!(short.len(), MAX_ERROR_OUTPUT + 3);
    }

    #[test]
    fn test_missing_program() {
        let prober = CommandProber::new("lighthouse-probe-does-not-exist", Vec::new());
        assert!(matches!(
            prober.scan("192.168.1.0/24"),
            Err(ProbeError::Spawn { .. })
        ));
    }

    #[test]
    fn test_invalid_target_does_not_spawn() {
        let prober = CommandProber::new("lighthouse-probe-does-not-exist", Vec::new());
        assert!(matches!(
            prober.scan("not-a-network"),
            Err(ProbeError::InvalidTarget(_))
        ));
    }

    #[cfg(unix)]
    fn shell(script: &str) -> CommandProber {
        // sh -c '<script>' <argv0> <cidr>: the CIDR arrives as $1
        CommandProber::new(
            "sh",
            vec!["-c".to_string(), script.to_string(), "probe".to_string()],
        )
    }

    #[cfg(unix)]
    #[test]
    fn test_command_prober_reads_stdout() {
        let prober = shell(r#"printf '[{"ip":"%s","hostname":"gw"}]' "${1%/*}""#);
        let observations = prober.scan("10.0.0.0/24").unwrap();

        assert_eq!(observations.len(), 1);
        assert_eq!(observations[0].ip, "10.0.0.0");
        assert_eq!(observations[0].hostname.as_deref(), Some("gw"));
    }

    #[cfg(unix)]
    #[test]
    fn test_command_prober_ignores_stderr_noise() {
        let prober = shell("echo 'Warning: slow network' >&2; echo '[]'");
        assert!(prober.scan("10.0.0.0/24").unwrap().is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_command_prober_nonzero_exit() {
        let prober = shell("echo 'nmap not installed' >&2; exit 3");
        match prober.scan("10.0.0.0/24") {
            Err(ProbeError::Exit { output, .. }) => assert!(output.contains("nmap not installed")),
            other => panic!("expected exit error, got {other:?}"),
        }
    }
}
