//! Configuration management for swarm-browser

mod cluster;
mod dev;
pub mod serde_utils;
mod session;
mod tunnel;

pub use cluster::{ClusterProfile, NodeProfile};
pub use dev::{DevConfig, DevService, DevStack, DevTask};
pub use session::{EngineConfig, SessionConfig};
pub use tunnel::{TunnelConfig, HOST_PLACEHOLDER, LOCAL_PLACEHOLDER, REMOTE_PLACEHOLDER};

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Contents of `config.toml`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    /// Cluster used when `--cluster` is not given
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_cluster: Option<String>,

    pub clusters: BTreeMap<String, ClusterProfile>,

    pub tunnel: TunnelConfig,

    pub engine: EngineConfig,

    pub session: SessionConfig,

    /// Offline data for the development browser
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dev: Option<DevConfig>,
}

impl ConfigFile {
    /// Look up a cluster by its key
    pub fn cluster(&self, name: &str) -> Result<&ClusterProfile, ConfigError> {
        self.clusters
            .get(name)
            .ok_or_else(|| ConfigError::UnknownCluster(name.to_string()))
    }

    /// Pick the requested cluster, else the default one, else the only one
    pub fn select_cluster(&self, requested: Option<&str>) -> Result<(&str, &ClusterProfile), ConfigError> {
        let name = match requested.or(self.default_cluster.as_deref()) {
            Some(name) => name,
            None if self.clusters.len() == 1 => self
                .clusters
                .keys()
                .next()
                .map(String::as_str)
                .unwrap_or_default(),
            None => return Err(ConfigError::MissingField("default_cluster".to_string())),
        };
        let (key, profile) = self
            .clusters
            .get_key_value(name)
            .ok_or_else(|| ConfigError::UnknownCluster(name.to_string()))?;
        Ok((key.as_str(), profile))
    }

    /// Load from disk, then normalize the dev section against the clusters
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config: ConfigFile = load_config(path)?;
        let clusters = config.clusters.clone();
        for (key, profile) in config.clusters.iter_mut() {
            if profile.name.is_empty() {
                profile.name = key.clone();
            }
        }
        if let Some(dev) = config.dev.as_mut() {
            dev.normalize(&clusters)?;
        }
        tracing::debug!(
            "Loaded config from {:?} ({} clusters)",
            path,
            config.clusters.len()
        );
        Ok(config)
    }
}

/// Get the default configuration directory
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("swarm-browser")
}

/// Get the default configuration file path
pub fn default_config_path() -> PathBuf {
    default_config_dir().join("config.toml")
}

/// Load configuration from a file
pub fn load_config<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Invalid(format!("Failed to read config: {}", e)))?;

    Ok(toml::from_str(&content)?)
}

/// Save configuration to a file, creating the parent directory
pub fn save_config<T: serde::Serialize>(path: &Path, config: &T) -> Result<(), ConfigError> {
    let content = toml::to_string_pretty(config)?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| ConfigError::Invalid(format!("Failed to create config dir: {}", e)))?;
    }

    std::fs::write(path, content)
        .map_err(|e| ConfigError::Invalid(format!("Failed to write config: {}", e)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Host;
    use std::time::Duration;

    const SAMPLE: &str = r#"
default_cluster = "prod"

[clusters.prod]
host = "manager-01.example.com"
[clusters.prod.nodes.manager-01]
host = "manager-01.example.com"
hostname = "manager-01"

[tunnel]
ready_timeout_ms = 1500

[session]
fallback_shell = ["/bin/ash"]
"#;

    #[test]
    fn test_load_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, SAMPLE).unwrap();

        let config = ConfigFile::load(&path).unwrap();
        let prod = config.cluster("prod").unwrap();
        assert_eq!(prod.name, "prod");
        assert_eq!(prod.host, Host::new("manager-01.example.com"));
        assert_eq!(config.tunnel.ready_timeout, Duration::from_millis(1500));
        assert_eq!(config.tunnel.poll_interval, Duration::from_millis(500));
        assert_eq!(config.session.shell, vec!["/bin/bash"]);
        assert_eq!(config.session.fallback_shell, vec!["/bin/ash"]);
        assert!(config.dev.is_none());
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        assert!(matches!(
            ConfigFile::load(&path),
            Err(ConfigError::NotFound(p)) if p == path
        ));
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut config = ConfigFile::default();
        config.clusters.insert(
            "lab".into(),
            ClusterProfile {
                name: "Lab".into(),
                host: Host::new("lab-manager"),
                nodes: BTreeMap::new(),
            },
        );
        save_config(&path, &config).unwrap();

        let loaded = ConfigFile::load(&path).unwrap();
        assert_eq!(loaded.cluster("lab").unwrap().name, "Lab");
        assert_eq!(loaded.tunnel.kill_grace, Duration::from_secs(2));
    }

    #[test]
    fn test_select_cluster() {
        let config: ConfigFile = toml::from_str(SAMPLE).unwrap();
        assert_eq!(config.select_cluster(None).unwrap().0, "prod");
        assert!(matches!(
            config.select_cluster(Some("qa")),
            Err(ConfigError::UnknownCluster(name)) if name == "qa"
        ));

        let empty = ConfigFile::default();
        assert!(matches!(
            empty.select_cluster(None),
            Err(ConfigError::MissingField(_))
        ));
    }
}
