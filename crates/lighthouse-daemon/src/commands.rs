//! CLI subcommand handlers

use anyhow::Result;
use lighthouse_core::Device;
use lighthouse_discovery::{PresenceService, ScanError, ScanReport};

use crate::OutputFormat;

/// `lighthouse scan [CIDR]`
pub async fn cmd_scan(
    presence: &PresenceService,
    target: Option<&str>,
    format: OutputFormat,
) -> Result<()> {
    let target = match presence.resolve_target(target) {
        Ok(target) => target,
        Err(e) => {
            eprintln!("Failed to detect network: {}", e);
            eprintln!("Please specify network manually: lighthouse scan 192.168.1.0/24");
            return Err(ScanError::from(e).into());
        }
    };

    if let (OutputFormat::Text, Some(net)) = (format, &target.detected) {
        println!(
            "Auto-detected network: {} (interface: {}, your IP: {})",
            net.cidr, net.interface, net.ip
        );
    }
    if let OutputFormat::Text = format {
        println!("Scanning network {}...", target.cidr);
        println!("   (This may take 30-60 seconds)");
        println!();
    }

    let report = match presence.scan(Some(&target.cidr)).await {
        Ok(report) => report,
        Err(e) => {
            eprintln!("Scan failed: {}", e);
            return Err(e.into());
        }
    };

    match format {
        OutputFormat::Text => print_scan_report(&report),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
    }
    Ok(())
}

fn print_scan_report(report: &ScanReport) {
    println!("Found {} device(s)\n", report.observations.len());

    for failure in &report.import.failures {
        eprintln!("Failed to save {}: {}", failure.ip, failure.error);
    }

    for obs in &report.observations {
        if report.import.failed(&obs.ip) {
            continue;
        }
        let mut line = format!("{:<15}", obs.ip);
        if let Some(mac) = &obs.mac {
            line.push_str(&format!(" | MAC: {:<17}", mac));
        }
        if let Some(hostname) = &obs.hostname {
            line.push_str(&format!(" | {}", hostname));
        }
        if let Some(vendor) = &obs.vendor {
            line.push_str(&format!(" [{}]", vendor));
        }
        println!("{}", line);
    }

    println!("\nSaved {} devices to database", report.import.saved);
}

/// `lighthouse list`
pub fn cmd_list(presence: &PresenceService, format: OutputFormat) -> Result<()> {
    let devices = presence.devices()?;

    if let OutputFormat::Json = format {
        println!("{}", serde_json::to_string_pretty(&devices)?);
        return Ok(());
    }

    if devices.is_empty() {
        println!("No devices found. Run 'lighthouse scan' first.");
        return Ok(());
    }

    println!("Found {} device(s):\n", devices.len());
    println!(
        "{:<15}  {:<17}  {:<20} {:<8} {}",
        "IP Address", "MAC Address", "Vendor", "Status", "Hostname"
    );
    println!("{}", "─".repeat(88));
    for device in &devices {
        println!("{}", device_row(device));
    }
    Ok(())
}

fn device_row(device: &Device) -> String {
    format!(
        "{:<15}  {:<17}  {:<20} {:<8} {}",
        device.ip_address,
        dash(device.hardware_address.as_deref()),
        truncate(device.vendor.as_deref(), 20),
        device.status_label(),
        dash(device.hostname.as_deref()),
    )
}

/// `lighthouse networks`
pub fn cmd_networks(presence: &PresenceService, format: OutputFormat) -> Result<()> {
    let networks = presence.networks();

    if let OutputFormat::Json = format {
        println!("{}", serde_json::to_string_pretty(&networks)?);
        return Ok(());
    }

    if networks.is_empty() {
        println!("No networks detected");
        return Ok(());
    }

    println!("Detected {} network(s):\n", networks.len());
    println!("{:<12} {:<15}  {}", "Interface", "IP Address", "Network CIDR");
    println!("{}", "─".repeat(54));
    for net in &networks {
        println!("{:<12} {:<15}  {}", net.interface, net.ip, net.cidr);
    }

    println!("\nTo scan a specific network:");
    println!("  sudo lighthouse scan <CIDR>");
    Ok(())
}

/// Exit code for a failed command
pub fn exit_code(e: &anyhow::Error) -> i32 {
    match e.downcast_ref::<ScanError>() {
        Some(ScanError::Probe(_)) => 3,
        Some(ScanError::Network(_)) => 2,
        _ => 1,
    }
}

fn dash(value: Option<&str>) -> &str {
    value.unwrap_or("-")
}

fn truncate(value: Option<&str>, max: usize) -> String {
    match value {
        None => "-".to_string(),
        Some(s) if s.chars().count() > max => {
            let head: String = s.chars().take(max.saturating_sub(3)).collect();
            format!("{}...", head)
        }
        Some(s) => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use lighthouse_core::DeviceId;
    use lighthouse_discovery::{NetworkError, ProbeError};

    #[test]
    fn test_truncate() {
        assert_eq!(truncate(None, 20), "-");
        assert_eq!(truncate(Some("HP"), 20), "HP");
        assert_eq!(
            truncate(Some("Hon Hai Precision Ind. Co.,Ltd."), 20),
            "Hon Hai Precision..."
        );
        assert_eq!(truncate(Some("Hon Hai Precision..."), 20).chars().count(), 20);
    }

    #[test]
    fn test_device_row_fills_unknowns() {
        let now = Utc::now();
        let device = Device {
            id: DeviceId(1),
            ip_address: "10.0.0.5".to_string(),
            hardware_address: None,
            hostname: Some("printer".to_string()),
            vendor: None,
            is_online: false,
            first_seen_at: now,
            last_seen_at: now,
        };

        let row = device_row(&device);
        assert!(row.starts_with("10.0.0.5"));
        assert!(row.contains(" - "));
        assert!(row.contains("offline"));
        assert!(row.ends_with("printer"));
    }

    #[test]
    fn test_exit_codes() {
        let no_net = anyhow::Error::from(ScanError::Network(NetworkError::NoNetworkFound));
        assert_eq!(exit_code(&no_net), 2);

        let probe_failed = anyhow::Error::from(ScanError::Probe(ProbeError::Exit {
            status: "exit status: 1".to_string(),
            output: "nmap not installed".to_string(),
        }));
        assert_eq!(exit_code(&probe_failed), 3);

        let invalid = anyhow::Error::from(ScanError::Probe(ProbeError::InvalidTarget("x".into())));
        assert_eq!(exit_code(&invalid), 3);

        assert_eq!(exit_code(&ScanError::InProgress.into()), 1);
        assert_eq!(exit_code(&anyhow::anyhow!("other")), 1);
    }
}
