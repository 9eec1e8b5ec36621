//! Configuration schema for Gantry
//!
//! Configuration is stored at `~/.config/gantry/config.toml`

use crate::cache::CacheScope;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Fetch coordination settings
    pub fetch: FetchConfig,

    /// Resource script locations
    pub script: ScriptConfig,

    /// Container settings
    pub container: ContainerConfig,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Verbosity: 0 = warn, 1 = info, 2+ = debug
    pub verbose: u8,

    /// Log format: "text" or "json"
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            verbose: 0,
            log_format: "text".to_string(),
        }
    }
}

/// Fetch coordinator settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Delay between lock attempts in milliseconds
    pub retry_interval_ms: u64,

    /// Whether caches are per worker or shared across the cluster
    pub cache_scope: CacheScope,
}

impl FetchConfig {
    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            retry_interval_ms: 5_000,
            cache_scope: CacheScope::Worker,
        }
    }
}

/// Locations of the resource scripts inside a resource container
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptConfig {
    /// Executable for the check action
    pub check_path: String,

    /// Executable for the get action
    pub in_path: String,

    /// Executable for the put action
    pub out_path: String,

    /// Destination directory for fetched bits
    pub get_dir: String,

    /// Source directory for put inputs
    pub put_dir: String,
}

impl Default for ScriptConfig {
    fn default() -> Self {
        Self {
            check_path: "/opt/resource/check".to_string(),
            in_path: "/opt/resource/in".to_string(),
            out_path: "/opt/resource/out".to_string(),
            get_dir: "/tmp/build/get".to_string(),
            put_dir: "/tmp/build/put".to_string(),
        }
    }
}

/// Container settings applied to every resource container
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerConfig {
    /// Host directory holding the TLS trust bundle (optional)
    pub certs_dir: Option<PathBuf>,

    /// Mount point for the trust bundle inside the container
    pub certs_mount: String,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            certs_dir: None,
            certs_mount: "/etc/ssl/certs".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = Config::default();
        let toml = toml::to_string_pretty(&config).unwrap();
        assert!(toml.contains("[general]"));
        assert!(toml.contains("[fetch]"));
        assert!(toml.contains("cache_scope = \"worker\""));
    }

    #[test]
    fn config_deserializes_empty() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.fetch.retry_interval(), Duration::from_secs(5));
        assert_eq!(config.script.in_path, "/opt/resource/in");
    }

    #[test]
    fn config_deserializes_partial() {
        let toml = r#"
            [fetch]
            retry_interval_ms = 250
            cache_scope = "cluster"

            [container]
            certs_dir = "/etc/pki/tls"
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.fetch.retry_interval(), Duration::from_millis(250));
        assert_eq!(config.fetch.cache_scope, CacheScope::Cluster);
        assert_eq!(config.container.certs_dir, Some(PathBuf::from("/etc/pki/tls")));
        assert_eq!(config.container.certs_mount, "/etc/ssl/certs"); // default preserved
    }
}
