//! Endpoint discovery for the Klipper API socket.
//!
//! Finds the running printer services, scrapes their configuration files
//! and resolves the socket path and credentials the protocol client needs:
//!
//! ```text
//! /proc/<pid>/cmdline ──► ServiceKind + config files ──► scrape_pairs()
//!                                                            │
//!                                                            ▼
//!                                  ResolvedEndpoint { Endpoint, port, .. }
//! ```
//!
//! - [`scan_services`] - classify running processes
//! - [`scrape_pairs`] - ad-hoc `key = value` / `key: value` extraction
//! - [`EndpointResolver`] - the seam the client re-runs before each attempt

pub mod error;
pub mod process;
pub mod resolve;
pub mod scrape;

pub use error::{DiscoveryError, DiscoveryResult};
pub use process::{DiscoveredService, ServiceKind, config_candidates, scan_services};
pub use resolve::{
    EndpointResolver, MAX_SOCKET_PATH_LEN, ResolvedEndpoint, StaticResolver, SystemResolver,
    is_socket,
};
pub use scrape::{ScrapedConfig, scrape_pairs};
