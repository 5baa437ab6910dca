//! Running printer service detection.
//!
//! Processes are read from a procfs-style directory: every numeric entry
//! holds a `cmdline` file with the NUL-separated argv. Processes that vanish
//! or cannot be read mid-scan are skipped.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{DiscoveryError, DiscoveryResult};

/// Printer-related services recognised on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceKind {
    /// Klipper host process (`klippy.py`).
    Klipper,
    /// Moonraker API server.
    Moonraker,
    /// Fluidd web UI.
    Fluidd,
    /// Mainsail web UI.
    Mainsail,
    /// Crowsnest webcam daemon.
    Crowsnest,
    /// Moonraker timelapse component.
    Timelapse,
}

impl ServiceKind {
    /// Classifies a space-joined command line.
    ///
    /// Checked in declaration order; the first match wins.
    pub fn classify(cmdline: &str) -> Option<Self> {
        const MARKERS: [(&str, ServiceKind); 6] = [
            ("klippy.py", ServiceKind::Klipper),
            ("moonraker", ServiceKind::Moonraker),
            ("fluidd", ServiceKind::Fluidd),
            ("mainsail", ServiceKind::Mainsail),
            ("crowsnest", ServiceKind::Crowsnest),
            ("timelapse", ServiceKind::Timelapse),
        ];
        MARKERS
            .iter()
            .find(|(marker, _)| cmdline.contains(marker))
            .map(|(_, kind)| *kind)
    }

    /// Returns a short lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Klipper => "klipper",
            Self::Moonraker => "moonraker",
            Self::Fluidd => "fluidd",
            Self::Mainsail => "mainsail",
            Self::Crowsnest => "crowsnest",
            Self::Timelapse => "timelapse",
        }
    }
}

impl std::fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A running process recognised as a printer service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredService {
    pub kind: ServiceKind,
    pub pid: u32,
    pub cmdline: Vec<String>,
}

impl DiscoveredService {
    /// Returns the API socket passed to Klipper with `-a` / `--api-server`.
    pub fn api_socket_arg(&self) -> Option<PathBuf> {
        if self.kind != ServiceKind::Klipper {
            return None;
        }
        let mut args = self.cmdline.iter();
        while let Some(arg) = args.next() {
            if arg == "-a" || arg == "--api-server" {
                return args.next().map(PathBuf::from);
            }
            if let Some(path) = arg.strip_prefix("--api-server=") {
                return Some(PathBuf::from(path));
            }
        }
        None
    }

    /// Returns the command line joined with spaces.
    pub fn joined_cmdline(&self) -> String {
        self.cmdline.join(" ")
    }
}

/// Scans `proc_root` for printer services, sorted by pid.
///
/// The calling process itself is never reported.
pub fn scan_services(proc_root: &Path) -> DiscoveryResult<Vec<DiscoveredService>> {
    let entries = fs::read_dir(proc_root).map_err(|e| DiscoveryError::io(proc_root, e))?;
    let own_pid = std::process::id();

    let mut services: Vec<DiscoveredService> = entries
        .filter_map(Result::ok)
        .filter_map(|entry| {
            let pid: u32 = entry.file_name().to_str()?.parse().ok()?;
            if pid == own_pid {
                return None;
            }
            let raw = fs::read(entry.path().join("cmdline")).ok()?;
            let cmdline = split_cmdline(&raw);
            let kind = ServiceKind::classify(&cmdline.join(" "))?;
            Some(DiscoveredService { kind, pid, cmdline })
        })
        .collect();

    services.sort_by_key(|s| s.pid);
    for service in &services {
        debug!(
            kind = %service.kind,
            pid = service.pid,
            cmdline = %service.joined_cmdline(),
            "Found service"
        );
    }
    Ok(services)
}

fn split_cmdline(raw: &[u8]) -> Vec<String> {
    raw.split(|&b| b == 0)
        .filter(|arg| !arg.is_empty())
        .map(|arg| String::from_utf8_lossy(arg).into_owned())
        .collect()
}

/// Collects the config files referenced by the discovered services.
///
/// - Klipper: each `*.cfg` argument, plus `moonraker.conf` and
///   `mainsail.conf` next to it when present
/// - Moonraker: `-d <dir>` / `-d<dir>` gives `<dir>/moonraker.conf` and
///   `<dir>/config/moonraker.conf` when present
/// - Crowsnest: each `*.conf` argument
///
/// Duplicates are dropped, first occurrence wins.
pub fn config_candidates(services: &[DiscoveredService]) -> Vec<PathBuf> {
    let mut files = Vec::new();
    let mut push = |path: PathBuf| {
        if !files.contains(&path) {
            files.push(path);
        }
    };

    for service in services {
        match service.kind {
            ServiceKind::Klipper => {
                for arg in service.cmdline.iter().filter(|a| a.ends_with(".cfg")) {
                    let cfg = PathBuf::from(arg);
                    let dir = cfg.parent().map(Path::to_path_buf).unwrap_or_default();
                    push(cfg);
                    for sibling in ["moonraker.conf", "mainsail.conf"] {
                        let path = dir.join(sibling);
                        if path.exists() {
                            push(path);
                        }
                    }
                }
            }
            ServiceKind::Moonraker => {
                for dir in moonraker_data_dirs(&service.cmdline) {
                    for rel in ["moonraker.conf", "config/moonraker.conf"] {
                        let path = dir.join(rel);
                        if path.exists() {
                            push(path);
                        }
                    }
                }
            }
            ServiceKind::Crowsnest => {
                for arg in service.cmdline.iter().filter(|a| a.ends_with(".conf")) {
                    push(PathBuf::from(arg));
                }
            }
            ServiceKind::Fluidd | ServiceKind::Mainsail | ServiceKind::Timelapse => {}
        }
    }

    files
}

fn moonraker_data_dirs(cmdline: &[String]) -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    let mut args = cmdline.iter();
    while let Some(arg) = args.next() {
        if arg == "-d" {
            if let Some(dir) = args.next() {
                dirs.push(PathBuf::from(dir.trim()));
            }
        } else if let Some(dir) = arg.strip_prefix("-d") {
            let dir = dir.trim();
            if !dir.is_empty() {
                dirs.push(PathBuf::from(dir));
            }
        }
    }
    dirs
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn service(kind: ServiceKind, args: &[&str]) -> DiscoveredService {
        DiscoveredService {
            kind,
            pid: 1,
            cmdline: args.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn write_proc(root: &Path, pid: u32, argv: &[&str]) {
        let dir = root.join(pid.to_string());
        fs::create_dir_all(&dir).unwrap();
        let mut raw = argv.join("\0").into_bytes();
        raw.push(0);
        fs::write(dir.join("cmdline"), raw).unwrap();
    }

    #[test]
    fn classify_order() {
        assert_eq!(
            ServiceKind::classify("python klippy.py printer.cfg"),
            Some(ServiceKind::Klipper)
        );
        assert_eq!(
            ServiceKind::classify("python -m moonraker -d /data"),
            Some(ServiceKind::Moonraker)
        );
        // klippy wins over a moonraker path in the same argv
        assert_eq!(
            ServiceKind::classify("klippy.py /home/moonraker/printer.cfg"),
            Some(ServiceKind::Klipper)
        );
        assert_eq!(ServiceKind::classify("/usr/bin/bash"), None);
    }

    #[test]
    fn scan_reads_procfs_layout() {
        let proc = TempDir::new().unwrap();
        write_proc(
            proc.path(),
            4_190_300,
            &["python", "/klipper/klippy/klippy.py", "/cfg/printer.cfg"],
        );
        write_proc(proc.path(), 4_190_020, &["moonraker", "-d", "/data"]);
        write_proc(proc.path(), 4_190_055, &["/usr/sbin/sshd"]);
        fs::create_dir_all(proc.path().join("self")).unwrap();
        // kernel thread: empty cmdline
        fs::create_dir_all(proc.path().join("2")).unwrap();
        fs::write(proc.path().join("2/cmdline"), b"").unwrap();

        let services = scan_services(proc.path()).unwrap();
        assert_eq!(services.len(), 2);
        assert_eq!(services[0].pid, 4_190_020);
        assert_eq!(services[0].kind, ServiceKind::Moonraker);
        assert_eq!(services[1].pid, 4_190_300);
        assert_eq!(services[1].cmdline[2], "/cfg/printer.cfg");
    }

    #[test]
    fn scan_missing_root_errors() {
        let result = scan_services(Path::new("/nonexistent/proc/root"));
        assert!(matches!(result, Err(DiscoveryError::Io { .. })));
    }

    #[test]
    fn api_socket_arg_forms() {
        let s = service(
            ServiceKind::Klipper,
            &["klippy.py", "printer.cfg", "-a", "/tmp/klippy_uds"],
        );
        assert_eq!(s.api_socket_arg(), Some(PathBuf::from("/tmp/klippy_uds")));

        let s = service(
            ServiceKind::Klipper,
            &["klippy.py", "--api-server=/run/k.sock"],
        );
        assert_eq!(s.api_socket_arg(), Some(PathBuf::from("/run/k.sock")));

        let s = service(ServiceKind::Moonraker, &["moonraker", "-a", "/x"]);
        assert_eq!(s.api_socket_arg(), None);
    }

    #[test]
    fn candidates_follow_service_rules() {
        let cfg_dir = TempDir::new().unwrap();
        let printer_cfg = cfg_dir.path().join("printer.cfg");
        fs::write(&printer_cfg, "").unwrap();
        fs::write(cfg_dir.path().join("moonraker.conf"), "").unwrap();

        let data_dir = TempDir::new().unwrap();
        fs::create_dir_all(data_dir.path().join("config")).unwrap();
        fs::write(data_dir.path().join("config/moonraker.conf"), "").unwrap();

        let klipper_arg = printer_cfg.to_string_lossy().to_string();
        let moonraker_arg = format!("-d{}", data_dir.path().display());
        let services = vec![
            service(ServiceKind::Klipper, &["klippy.py", &klipper_arg]),
            service(ServiceKind::Moonraker, &["moonraker", &moonraker_arg]),
            service(ServiceKind::Crowsnest, &["crowsnest", "-c", "/cfg/crowsnest.conf"]),
            service(ServiceKind::Fluidd, &["nginx: fluidd"]),
        ];

        let files = config_candidates(&services);
        assert_eq!(
            files,
            vec![
                printer_cfg.clone(),
                cfg_dir.path().join("moonraker.conf"),
                data_dir.path().join("config/moonraker.conf"),
                PathBuf::from("/cfg/crowsnest.conf"),
            ]
        );
    }

    #[test]
    fn candidates_deduplicate() {
        let services = vec![
            service(ServiceKind::Crowsnest, &["crowsnest", "/a.conf"]),
            service(ServiceKind::Crowsnest, &["crowsnest", "/a.conf"]),
        ];
        assert_eq!(config_candidates(&services), vec![PathBuf::from("/a.conf")]);
    }

    #[test]
    fn moonraker_dir_forms() {
        let dirs = moonraker_data_dirs(&[
            "moonraker".into(),
            "-d".into(),
            "/one".into(),
            "-d/two".into(),
        ]);
        assert_eq!(dirs, vec![PathBuf::from("/one"), PathBuf::from("/two")]);
    }
}
