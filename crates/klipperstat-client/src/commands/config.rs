//! Configuration commands.

use std::path::{Path, PathBuf};

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};

/// Dump the effective configuration to stdout.
///
/// The API key is masked.
pub fn dump(config: &ClientConfig, path: Option<&Path>) -> ClientResult<()> {
    let mut shown = config.clone();
    if shown.connection.api_key.is_some() {
        shown.connection.api_key = Some("<redacted>".to_string());
    }
    let toml_str = toml::to_string_pretty(&shown)
        .map_err(|e| ClientError::config(format!("failed to serialize config: {}", e)))?;
    println!("# config.toml ({})", config_path(path).display());
    println!("{}", toml_str);
    Ok(())
}

/// Validate the configuration.
pub fn validate(config: &ClientConfig) -> ClientResult<()> {
    config.validate()?;
    println!("Configuration is valid.");
    Ok(())
}

/// Show the configuration file path.
pub fn path(path: Option<&Path>) -> ClientResult<()> {
    println!("config: {}", config_path(path).display());
    Ok(())
}

fn config_path(path: Option<&Path>) -> PathBuf {
    path.map(Path::to_path_buf)
        .unwrap_or_else(ClientConfig::default_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_path_wins() {
        assert_eq!(
            config_path(Some(Path::new("/etc/klipperstat.toml"))),
            PathBuf::from("/etc/klipperstat.toml")
        );
        assert!(config_path(None).ends_with("klipperstat/config.toml"));
    }

    #[test]
    fn default_config_serializes() {
        let out = toml::to_string_pretty(&ClientConfig::default()).unwrap();
        assert!(out.contains("connect_attempts = 3"));
        let back: ClientConfig = toml::from_str(&out).unwrap();
        assert_eq!(back, ClientConfig::default());
    }
}
