//! Daemon-level configuration — the listen address, upstream timeout, and
//! disk cache directory that sit around `cache_core::CacheConfig`, the way
//! the donor's `Config` nests `HostConfig`/`ClientConfig`/`CacheConfig`/
//! `SignalConfig`/`NetworkConfig` around one TOML document.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use cache_core::CacheConfig;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Top-level configuration document for the `proxyd` binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Address the client-facing listener binds to.
    pub listen: SocketAddr,
    /// Seconds to wait for an upstream connection/response before aborting.
    pub upstream_timeout_secs: u64,
    /// Directory persisted chunks are written under. `None` resolves to
    /// the platform cache directory at startup.
    pub disk_cache_dir: Option<PathBuf>,
    /// The Object Store and Cache Coherence Engine's own tunables.
    pub cache: CacheConfig,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), 8123),
            upstream_timeout_secs: 60,
            disk_cache_dir: None,
            cache: CacheConfig::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum ConfigError {
    Io(String),
    Parse(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "failed to read config file: {}", e),
            ConfigError::Parse(e) => write!(f, "failed to parse config file: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl ProxyConfig {
    /// Loads configuration from the platform default path
    /// (`~/.config/polipo-rs/config.toml` on Linux), falling back to
    /// `ProxyConfig::default()` if no file exists.
    pub fn load() -> Result<Self, ConfigError> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => {
                debug!("no config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn load_from(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "polipo-rs").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Resolves `disk_cache_dir`'s `None` to the platform cache directory.
    pub fn resolved_disk_cache_dir(&self) -> PathBuf {
        if let Some(dir) = &self.disk_cache_dir {
            return dir.clone();
        }
        ProjectDirs::from("", "", "polipo-rs")
            .map(|dirs| dirs.cache_dir().join("objects"))
            .unwrap_or_else(|| {
                warn!("could not determine platform cache directory, using ./cache");
                PathBuf::from("./cache")
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_listens_on_loopback_8123() {
        let cfg = ProxyConfig::default();
        assert_eq!(cfg.listen.port(), 8123);
        assert!(cfg.listen.ip().is_loopback());
    }

    #[test]
    fn toml_round_trip_with_partial_overrides() {
        let toml_str = "upstream_timeout_secs = 10\n";
        let cfg: ProxyConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.upstream_timeout_secs, 10);
        assert_eq!(cfg.listen.port(), 8123);
    }
}
