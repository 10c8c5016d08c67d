//! Core error types for swarm-browser

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::types::{ContainerRef, Host};

/// Top-level error type
#[derive(Error, Debug)]
pub enum SbError {
    /// Tunnel or client could not be established
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    /// Remote exec could not be created or attached
    #[error("Attach error: {0}")]
    Attach(#[from] AttachError),

    /// I/O failure on an active session
    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Orchestration API call failed
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    /// Pool shutdown left some hosts unclosed
    #[error(transparent)]
    PoolClose(#[from] PoolCloseError),
}

/// Tunnel and client lifecycle errors
#[derive(Error, Debug, Clone)]
pub enum ConnectionError {
    /// The forwarding subprocess could not be started or exited before the
    /// socket appeared
    #[error("Failed to start tunnel to {host}: {reason}")]
    SpawnFailed { host: Host, reason: String },

    /// The forwarded socket never appeared
    #[error("Timed out after {waited:?} waiting for tunnel socket to {host}")]
    TunnelTimeout { host: Host, waited: Duration },

    /// The tunnel went away after it was ready
    #[error("Tunnel to {host} was lost")]
    TunnelLost { host: Host },

    /// The tunnel subprocess could not be terminated cleanly
    #[error("Failed to close tunnel to {host}: {reason}")]
    CloseFailed { host: Host, reason: String },

    /// The engine client could not be built or closed
    #[error("Client error for {host}: {reason}")]
    Client { host: Host, reason: String },

    /// The pool was already shut down
    #[error("Connection pool is closed")]
    PoolClosed,
}

impl ConnectionError {
    /// Host this error refers to, if any
    pub fn host(&self) -> Option<&Host> {
        match self {
            ConnectionError::SpawnFailed { host, .. }
            | ConnectionError::TunnelTimeout { host, .. }
            | ConnectionError::TunnelLost { host }
            | ConnectionError::CloseFailed { host, .. }
            | ConnectionError::Client { host, .. } => Some(host),
            ConnectionError::PoolClosed => None,
        }
    }
}

/// Failures while creating or attaching a remote exec session
#[derive(Error, Debug)]
pub enum AttachError {
    /// No task of the service is in the running state
    #[error("No running task found for service {service}")]
    NoRunningTask { service: String },

    /// The selected task is not running
    #[error("Task {task} is not running (state: {state})")]
    TaskNotRunning { task: String, state: String },

    /// create-exec call failed
    #[error("Failed to create exec {command:?} in container {container}: {source}")]
    CreateExec {
        container: ContainerRef,
        command: Vec<String>,
        #[source]
        source: EngineError,
    },

    /// attach-exec call failed
    #[error("Failed to attach to exec in container {container}: {source}")]
    AttachExec {
        container: ContainerRef,
        #[source]
        source: EngineError,
    },

    /// Both the requested command and the fallback shell failed
    #[error("{primary}; fallback shell also failed: {fallback}")]
    FallbackFailed {
        primary: Box<AttachError>,
        fallback: Box<AttachError>,
    },
}

/// I/O failures on an active session
#[derive(Error, Debug)]
pub enum StreamError {
    /// Raw mode could not be engaged
    #[error("Failed to enter raw mode: {0}")]
    RawMode(#[source] std::io::Error),

    /// Reading from the remote stream failed
    #[error("Remote read failed: {0}")]
    Read(#[source] std::io::Error),

    /// Writing to the remote stream failed
    #[error("Remote write failed: {0}")]
    Write(#[source] std::io::Error),

    /// Writing to the local display failed
    #[error("Local display write failed: {0}")]
    Display(#[source] std::io::Error),

    /// The tunnel carrying the session went away
    #[error("Tunnel to {host} was lost")]
    TunnelLost { host: Host },

    /// A pump task panicked or was aborted
    #[error("Stream pump stopped unexpectedly: {0}")]
    PumpPanicked(String),
}

/// Resize failures. Logged, never surfaced as a session failure
#[derive(Error, Debug)]
#[error("Failed to resize exec on {host} to {cols}x{rows}: {source}")]
pub struct ResizeError {
    pub host: Host,
    pub cols: u16,
    pub rows: u16,
    #[source]
    pub source: EngineError,
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialize error
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// Missing required field
    #[error("Missing required field: {0}")]
    MissingField(String),

    /// No cluster with this name is configured
    #[error("Cluster '{0}' not found in config")]
    UnknownCluster(String),

    /// A node hostname reported by the cluster has no configured host
    #[error("Node hostname {hostname} is missing from cluster '{cluster}' config")]
    UnknownNode { cluster: String, hostname: String },
}

/// Errors from the remote engine API client
#[derive(Error, Debug)]
pub enum EngineError {
    /// Socket I/O failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Response could not be parsed
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Engine answered with an error status
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    /// The request could not be sent or its response not read
    #[error("Engine request failed: {0}")]
    Request(String),

    /// JSON encode/decode failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Aggregated failures from closing every pooled host
#[derive(Error, Debug)]
pub struct PoolCloseError {
    pub failures: Vec<(Host, ConnectionError)>,
}

impl fmt::Display for PoolCloseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Failed to close {} host connection(s):",
            self.failures.len()
        )?;
        for (host, err) in &self.failures {
            write!(f, " [{}: {}]", host, err)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tunnel_timeout_message() {
        let err = ConnectionError::TunnelTimeout {
            host: Host::new("worker-02"),
            waited: Duration::from_secs(5),
        };
        assert_eq!(
            err.to_string(),
            "Timed out after 5s waiting for tunnel socket to worker-02"
        );
        assert_eq!(err.host(), Some(&Host::new("worker-02")));
        assert_eq!(ConnectionError::PoolClosed.host(), None);
    }

    #[test]
    fn test_pool_close_error_lists_every_host() {
        let err = PoolCloseError {
            failures: vec![
                (
                    Host::new("a"),
                    ConnectionError::CloseFailed {
                        host: Host::new("a"),
                        reason: "boom".into(),
                    },
                ),
                (
                    Host::new("b"),
                    ConnectionError::CloseFailed {
                        host: Host::new("b"),
                        reason: "bang".into(),
                    },
                ),
            ],
        };
        let shown = err.to_string();
        assert!(shown.starts_with("Failed to close 2 host connection(s):"));
        assert!(shown.contains("[a: Failed to close tunnel to a: boom]"));
        assert!(shown.contains("[b: Failed to close tunnel to b: bang]"));
    }

    #[test]
    fn test_fallback_error_mentions_both_causes() {
        let primary = AttachError::CreateExec {
            container: ContainerRef::new("ac43c88fac17"),
            command: vec!["bash".into()],
            source: EngineError::Api {
                status: 500,
                message: "no bash".into(),
            },
        };
        let fallback = AttachError::AttachExec {
            container: ContainerRef::new("ac43c88fac17"),
            source: EngineError::Protocol("eof".into()),
        };
        let err = AttachError::FallbackFailed {
            primary: Box::new(primary),
            fallback: Box::new(fallback),
        };
        let shown = err.to_string();
        assert!(shown.contains("no bash"));
        assert!(shown.contains("fallback shell also failed"));
    }

    #[test]
    fn test_sb_error_from_conversions() {
        let err: SbError = ConfigError::UnknownCluster("prod".into()).into();
        assert!(matches!(err, SbError::Config(_)));
        assert_eq!(
            err.to_string(),
            "Configuration error: Cluster 'prod' not found in config"
        );
    }
}
