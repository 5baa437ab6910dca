//! Endpoint discovery report.

use serde_json::json;
use tracing::warn;

use klipperstat_core::OutputFormat;
use klipperstat_discovery::{ResolvedEndpoint, is_socket};

use crate::config::ClientConfig;
use crate::error::ClientResult;

/// Runs the configured resolver and prints what it found.
pub fn run(config: &ClientConfig, format: OutputFormat) -> ClientResult<()> {
    let resolved = config.resolver().resolve()?;
    if !is_socket(resolved.endpoint.socket_path()) {
        warn!(path = %resolved.endpoint, "Resolved path is not a socket");
    }
    println!("{}", render(&resolved, format));
    Ok(())
}

/// Renders a resolution result.
pub fn render(resolved: &ResolvedEndpoint, format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => json!({
            "socket_path": resolved.endpoint.socket_path,
            "api_key": resolved.endpoint.api_key.is_some(),
            "moonraker_port": resolved.moonraker_port,
            "moonraker_api_key": resolved.moonraker_api_key.is_some(),
            "services": resolved.services.iter().map(|s| json!({
                "kind": s.kind.as_str(),
                "pid": s.pid,
                "cmdline": s.joined_cmdline(),
            })).collect::<Vec<_>>(),
            "config_files": resolved.config_files,
        })
        .to_string(),
        OutputFormat::Tty => {
            let mut lines = vec!["Services:".to_string()];
            if resolved.services.is_empty() {
                lines.push("  (none)".to_string());
            }
            for service in &resolved.services {
                lines.push(format!(
                    "  {} (pid {}): {}",
                    service.kind,
                    service.pid,
                    service.joined_cmdline()
                ));
            }
            lines.push("Config files:".to_string());
            if resolved.config_files.is_empty() {
                lines.push("  (none)".to_string());
            }
            for path in &resolved.config_files {
                lines.push(format!("  {}", path.display()));
            }
            lines.push(format!("Socket: {}", resolved.endpoint));
            lines.push(format!(
                "API key: {}",
                if resolved.endpoint.api_key.is_some() { "set" } else { "not set" }
            ));
            if let Some(port) = resolved.moonraker_port {
                lines.push(format!("Moonraker port: {}", port));
            }
            lines.join("\n")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use klipperstat_core::Endpoint;
    use klipperstat_discovery::{DiscoveredService, ServiceKind};
    use std::path::PathBuf;

    fn resolved() -> ResolvedEndpoint {
        ResolvedEndpoint {
            endpoint: Endpoint::new("/tmp/klippy_uds").with_api_key(Some("secret".into())),
            moonraker_port: Some(7125),
            moonraker_api_key: None,
            services: vec![DiscoveredService {
                kind: ServiceKind::Klipper,
                pid: 812,
                cmdline: vec!["python".into(), "klippy.py".into(), "/cfg/printer.cfg".into()],
            }],
            config_files: vec![PathBuf::from("/cfg/printer.cfg")],
        }
    }

    #[test]
    fn tty_report() {
        assert_eq!(
            render(&resolved(), OutputFormat::Tty),
            "Services:\n  klipper (pid 812): python klippy.py /cfg/printer.cfg\n\
             Config files:\n  /cfg/printer.cfg\n\
             Socket: /tmp/klippy_uds\n\
             API key: set\n\
             Moonraker port: 7125"
        );
    }

    #[test]
    fn json_report_hides_keys() {
        let out = render(&resolved(), OutputFormat::Json);
        assert!(!out.contains("secret"));
        let parsed: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed["socket_path"], "/tmp/klippy_uds");
        assert_eq!(parsed["api_key"], true);
        assert_eq!(parsed["services"][0]["kind"], "klipper");
        assert!(parsed["moonraker_api_key"].is_boolean());
    }

    #[test]
    fn empty_report() {
        let resolved = ResolvedEndpoint::from_endpoint(Endpoint::new("/x.sock"));
        let out = render(&resolved, OutputFormat::Tty);
        assert!(out.starts_with("Services:\n  (none)\nConfig files:\n  (none)\n"));
        assert!(out.ends_with("API key: not set"));
    }
}
