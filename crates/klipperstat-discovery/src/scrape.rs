//! Loose key/value extraction from printer config files.
//!
//! Klipper (`printer.cfg`), Moonraker (`moonraker.conf`) and friends use
//! slightly different INI dialects. Rather than parse each one, every line
//! is matched against three patterns in separate passes:
//!
//! 1. `key = value`
//! 2. `key: value`
//! 3. `key: "value"` (quotes stripped)
//!
//! Later passes override earlier ones for the same key, and within a pass
//! the last occurrence wins. Section headers are ignored, so keys from
//! different sections share one namespace.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

use crate::error::{DiscoveryError, DiscoveryResult};

static EQUALS_PAIR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\w+)[ \t]*=[ \t]*(.+?)[ \t]*$").expect("valid regex"));
static COLON_PAIR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\w+)[ \t]*:[ \t]*(.+?)[ \t]*$").expect("valid regex"));
static QUOTED_PAIR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(\w+)[ \t]*:[ \t]*"(.+?)"[ \t]*$"#).expect("valid regex"));

/// Extracts key/value pairs from config text.
///
/// Lines starting with `#` or `;` are comments and never produce pairs.
pub fn scrape_pairs(content: &str) -> BTreeMap<String, String> {
    let lines: Vec<&str> = content
        .lines()
        .filter(|line| {
            let trimmed = line.trim_start();
            !(trimmed.starts_with('#') || trimmed.starts_with(';'))
        })
        .collect();

    let mut pairs = BTreeMap::new();
    for pattern in [&*EQUALS_PAIR, &*COLON_PAIR, &*QUOTED_PAIR] {
        for line in &lines {
            if let Some(caps) = pattern.captures(line) {
                pairs.insert(caps[1].to_string(), caps[2].trim().to_string());
            }
        }
    }
    pairs
}

/// The pairs scraped from one config file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrapedConfig {
    pub path: PathBuf,
    pub pairs: BTreeMap<String, String>,
}

impl ScrapedConfig {
    /// Reads and scrapes a config file.
    pub fn load(path: &Path) -> DiscoveryResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| DiscoveryError::io(path, e))?;
        Ok(Self::parse(path, &content))
    }

    /// Scrapes already-loaded content.
    pub fn parse(path: impl Into<PathBuf>, content: &str) -> Self {
        Self {
            path: path.into(),
            pairs: scrape_pairs(content),
        }
    }

    /// Returns the value for a key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs.get(key).map(String::as_str)
    }

    /// Returns true if the file path ends with `suffix`.
    pub fn path_ends_with(&self, suffix: &str) -> bool {
        self.path.to_string_lossy().ends_with(suffix)
    }

    /// Returns `*.conf` paths named by `*_config` keys.
    pub fn linked_configs(&self) -> Vec<PathBuf> {
        self.pairs
            .iter()
            .filter(|(key, value)| key.ends_with("_config") && value.ends_with(".conf"))
            .map(|(_, value)| PathBuf::from(value))
            .collect()
    }
}
