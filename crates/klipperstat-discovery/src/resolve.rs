//! Endpoint resolution.
//!
//! [`SystemResolver`] combines the process scan and config scraping into an
//! [`Endpoint`]. Sources are consulted in this order; the first socket path
//! found wins:
//!
//! 1. config files of the running services (`klippy_uds_address`, then
//!    `unix_socket_path` / `socket_path`, later files overriding earlier)
//! 2. the `-a` argument of the running Klipper process
//! 3. `<socket_dir>/klippy.sock`
//! 4. `klippy_uds_address` in a Moonraker config under the home directory

use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};

use klipperstat_core::Endpoint;
use tracing::{debug, warn};

use crate::error::{DiscoveryError, DiscoveryResult};
use crate::process::{DiscoveredService, config_candidates, scan_services};
use crate::scrape::ScrapedConfig;

/// Longest path that fits in `sockaddr_un.sun_path` with its NUL.
pub const MAX_SOCKET_PATH_LEN: usize = 107;

const HOME_MOONRAKER_CONFIGS: [&str; 3] = [
    ".config/moonraker.conf",
    "klipper_config/moonraker.conf",
    "printer_data/config/moonraker.conf",
];

/// Produces the endpoint the protocol client connects to.
///
/// Called again before every connection sequence, so an implementation may
/// pick up a socket that appeared since the last attempt.
pub trait EndpointResolver: Send + Sync {
    fn resolve(&self) -> DiscoveryResult<ResolvedEndpoint>;
}

/// Everything the resolver learned, with the endpoint in front.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedEndpoint {
    pub endpoint: Endpoint,
    /// Moonraker HTTP port; informational only.
    pub moonraker_port: Option<u16>,
    /// Moonraker API key; informational only.
    pub moonraker_api_key: Option<String>,
    pub services: Vec<DiscoveredService>,
    pub config_files: Vec<PathBuf>,
}

impl ResolvedEndpoint {
    /// Wraps a fixed endpoint with no discovery details.
    pub fn from_endpoint(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            moonraker_port: None,
            moonraker_api_key: None,
            services: Vec::new(),
            config_files: Vec::new(),
        }
    }
}

/// Resolver that always returns the same endpoint.
#[derive(Debug, Clone)]
pub struct StaticResolver {
    endpoint: Endpoint,
}

impl StaticResolver {
    pub fn new(endpoint: Endpoint) -> Self {
        Self { endpoint }
    }
}

impl EndpointResolver for StaticResolver {
    fn resolve(&self) -> DiscoveryResult<ResolvedEndpoint> {
        Ok(ResolvedEndpoint::from_endpoint(self.endpoint.clone()))
    }
}

/// Resolver that inspects the running system.
#[derive(Debug, Clone)]
pub struct SystemResolver {
    proc_root: PathBuf,
    socket_dir: PathBuf,
    home_dir: Option<PathBuf>,
}

impl Default for SystemResolver {
    fn default() -> Self {
        Self {
            proc_root: PathBuf::from("/proc"),
            socket_dir: PathBuf::from("/tmp"),
            home_dir: dirs::home_dir(),
        }
    }
}

impl SystemResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: set the procfs root.
    pub fn with_proc_root(mut self, proc_root: impl Into<PathBuf>) -> Self {
        self.proc_root = proc_root.into();
        self
    }

    /// Builder: set the directory searched for `klippy.sock`.
    pub fn with_socket_dir(mut self, socket_dir: impl Into<PathBuf>) -> Self {
        self.socket_dir = socket_dir.into();
        self
    }

    /// Builder: set the home directory for fallback config lookup.
    pub fn with_home_dir(mut self, home_dir: Option<PathBuf>) -> Self {
        self.home_dir = home_dir;
        self
    }

    fn fallback_socket(&self) -> Option<PathBuf> {
        let well_known = self.socket_dir.join("klippy.sock");
        if well_known.exists() {
            debug!(path = %well_known.display(), "Found Klipper socket in socket directory");
            return Some(well_known);
        }

        let home = self.home_dir.as_ref()?;
        HOME_MOONRAKER_CONFIGS.iter().find_map(|rel| {
            let path = home.join(rel);
            if !path.exists() {
                return None;
            }
            let config = ScrapedConfig::load(&path)
                .inspect_err(|e| warn!(error = %e, "Skipping unreadable config"))
                .ok()?;
            let address = config.get("klippy_uds_address")?;
            debug!(config = %path.display(), address, "Found klippy_uds_address in home config");
            Some(PathBuf::from(address))
        })
    }

    fn expand_home(&self, path: PathBuf) -> PathBuf {
        match (path.strip_prefix("~"), &self.home_dir) {
            (Ok(rest), Some(home)) => home.join(rest),
            _ => path,
        }
    }
}

impl EndpointResolver for SystemResolver {
    fn resolve(&self) -> DiscoveryResult<ResolvedEndpoint> {
        let services = match scan_services(&self.proc_root) {
            Ok(services) => services,
            Err(e) => {
                warn!(error = %e, "Process scan failed, continuing without it");
                Vec::new()
            }
        };

        let mut queue: VecDeque<PathBuf> = config_candidates(&services).into();
        let mut seen = HashSet::new();
        let mut config_files = Vec::new();
        let mut scraped = ScrapeState::default();

        while let Some(path) = queue.pop_front() {
            if !seen.insert(path.clone()) {
                continue;
            }
            let config = match ScrapedConfig::load(&path) {
                Ok(config) => config,
                Err(e) => {
                    warn!(error = %e, "Skipping unreadable config");
                    continue;
                }
            };
            scraped.absorb(&config);
            for linked in config.linked_configs() {
                if linked.exists() {
                    debug!(from = %path.display(), linked = %linked.display(), "Found additional config file");
                    queue.push_back(linked);
                }
            }
            config_files.push(path);
        }

        let socket = scraped
            .socket
            .take()
            .or_else(|| services.iter().find_map(DiscoveredService::api_socket_arg))
            .or_else(|| self.fallback_socket())
            .ok_or(DiscoveryError::SocketNotFound)?;
        let socket = validate_socket_path(self.expand_home(socket))?;

        Ok(ResolvedEndpoint {
            endpoint: Endpoint::new(socket).with_api_key(scraped.klipper_api_key),
            moonraker_port: scraped.moonraker_port,
            moonraker_api_key: scraped.moonraker_api_key,
            services,
            config_files,
        })
    }
}

#[derive(Debug, Default)]
struct ScrapeState {
    socket: Option<PathBuf>,
    klipper_api_key: Option<String>,
    moonraker_api_key: Option<String>,
    moonraker_port: Option<u16>,
}

impl ScrapeState {
    fn absorb(&mut self, config: &ScrapedConfig) {
        let file = config.path.display();

        if let Some(address) = config.get("klippy_uds_address") {
            debug!(config = %file, address, "Found klippy_uds_address");
            self.socket = Some(PathBuf::from(address));
        }
        if let Some(path) = config
            .get("unix_socket_path")
            .or_else(|| config.get("socket_path"))
        {
            debug!(config = %file, path, "Found socket path");
            self.socket = Some(PathBuf::from(path));
        }

        if let Some(key) = config.get("api_key") {
            if config.path_ends_with("printer.cfg") {
                debug!(config = %file, "Found Klipper API key");
                self.klipper_api_key = Some(key.to_string());
            } else if config.path_ends_with("moonraker.conf") {
                debug!(config = %file, "Found Moonraker API key");
                self.moonraker_api_key = Some(key.to_string());
            }
        }

        if let Some(port) = config.get("port").or_else(|| config.get("moonraker_port")) {
            match port.parse() {
                Ok(port) => {
                    debug!(config = %file, port, "Found Moonraker port");
                    self.moonraker_port = Some(port);
                }
                Err(_) => warn!(config = %file, port, "Ignoring non-numeric port"),
            }
        }
    }
}

fn validate_socket_path(path: PathBuf) -> DiscoveryResult<PathBuf> {
    let trimmed = PathBuf::from(path.to_string_lossy().trim());
    let len = trimmed.as_os_str().len();
    if len > MAX_SOCKET_PATH_LEN {
        return Err(DiscoveryError::SocketPathTooLong {
            path: trimmed,
            len,
            max: MAX_SOCKET_PATH_LEN,
        });
    }
    Ok(trimmed)
}

/// Returns true if `path` looks like a Unix socket on this system.
pub fn is_socket(path: &Path) -> bool {
    #[cfg(unix)]
    {
        use std::os::unix::fs::FileTypeExt;
        std::fs::metadata(path)
            .map(|m| m.file_type().is_socket())
            .unwrap_or(false)
    }
    #[cfg(not(unix))]
    {
        path.exists()
    }
}
