//! Session and engine configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::serde_utils::duration_millis;
use crate::error::ConfigError;

/// Interactive session settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Command run when none is requested
    pub shell: Vec<String>,

    /// Command retried once when the requested one fails to start
    pub fallback_shell: Vec<String>,

    /// Detach key, written as `ctrl-<char>`
    pub detach_key: String,

    /// TERM exported to the remote process
    pub term: String,

    /// Upper bound for joining the second pump during teardown
    #[serde(rename = "teardown_timeout_ms", with = "duration_millis")]
    pub teardown_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            shell: vec!["/bin/bash".to_string()],
            fallback_shell: vec!["/bin/sh".to_string()],
            detach_key: "ctrl-\\".to_string(),
            term: "xterm-256color".to_string(),
            teardown_timeout: Duration::from_secs(2),
        }
    }
}

/// Engine API client settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// API version such as `v1.41`; the client default when unset
    pub api_version: Option<String>,

    /// Timeout applied to each engine request
    #[serde(rename = "request_timeout_ms", with = "duration_millis")]
    pub request_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            api_version: None,
            request_timeout: Duration::from_secs(120),
        }
    }
}

impl EngineConfig {
    /// Parse `api_version` into `(major, minor)`
    pub fn version(&self) -> Result<Option<(usize, usize)>, ConfigError> {
        let Some(raw) = self.api_version.as_deref() else {
            return Ok(None);
        };
        let invalid = || ConfigError::Invalid(format!("Invalid engine api_version: {:?}", raw));
        let (major, minor) = raw
            .trim()
            .trim_start_matches('v')
            .split_once('.')
            .ok_or_else(invalid)?;
        let major = major.parse().map_err(|_| invalid())?;
        let minor = minor.parse().map_err(|_| invalid())?;
        Ok(Some((major, minor)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.shell, vec!["/bin/bash"]);
        assert_eq!(config.fallback_shell, vec!["/bin/sh"]);
        assert_eq!(config.detach_key, "ctrl-\\");
    }

    #[test]
    fn test_engine_version() {
        assert_eq!(EngineConfig::default().version().unwrap(), None);

        let versioned = EngineConfig {
            api_version: Some("v1.41".into()),
            ..EngineConfig::default()
        };
        assert_eq!(versioned.version().unwrap(), Some((1, 41)));

        let bare = EngineConfig {
            api_version: Some("1.43".into()),
            ..EngineConfig::default()
        };
        assert_eq!(bare.version().unwrap(), Some((1, 43)));

        let broken = EngineConfig {
            api_version: Some("latest".into()),
            ..EngineConfig::default()
        };
        assert!(matches!(broken.version(), Err(ConfigError::Invalid(_))));
    }
}
