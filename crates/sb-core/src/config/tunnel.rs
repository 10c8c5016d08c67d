//! Tunnel configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::serde_utils::duration_millis;

/// Placeholder replaced with the generated local socket path
pub const LOCAL_PLACEHOLDER: &str = "{local}";
/// Placeholder replaced with the remote control-plane socket
pub const REMOTE_PLACEHOLDER: &str = "{remote}";
/// Placeholder replaced with the target host
pub const HOST_PLACEHOLDER: &str = "{host}";

/// How forwarding tunnels are spawned and supervised
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TunnelConfig {
    /// Forwarding program
    pub program: String,

    /// Argument template, see the placeholder constants
    pub args: Vec<String>,

    /// Control-plane socket on the remote host
    pub remote_socket: String,

    /// Directory for local sockets (system temp dir when unset)
    pub socket_dir: Option<PathBuf>,

    /// How long to wait for the local socket to appear
    #[serde(rename = "ready_timeout_ms", with = "duration_millis")]
    pub ready_timeout: Duration,

    /// Interval between socket checks
    #[serde(rename = "poll_interval_ms", with = "duration_millis")]
    pub poll_interval: Duration,

    /// Grace period between SIGTERM and SIGKILL on close
    #[serde(rename = "kill_grace_ms", with = "duration_millis")]
    pub kill_grace: Duration,
}

impl Default for TunnelConfig {
    fn default() -> Self {
        Self {
            program: "ssh".to_string(),
            args: vec![
                "-N".to_string(),
                "-L".to_string(),
                format!("{}:{}", LOCAL_PLACEHOLDER, REMOTE_PLACEHOLDER),
                HOST_PLACEHOLDER.to_string(),
            ],
            remote_socket: "/var/run/docker.sock".to_string(),
            socket_dir: None,
            ready_timeout: Duration::from_secs(5),
            poll_interval: Duration::from_millis(500),
            kill_grace: Duration::from_secs(2),
        }
    }
}

impl TunnelConfig {
    /// Directory in which local sockets are created
    pub fn socket_dir(&self) -> PathBuf {
        self.socket_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir)
    }

    /// Expand the argument template for one tunnel
    pub fn render_args(&self, local: &str, host: &str) -> Vec<String> {
        self.args
            .iter()
            .map(|arg| {
                arg.replace(LOCAL_PLACEHOLDER, local)
                    .replace(REMOTE_PLACEHOLDER, &self.remote_socket)
                    .replace(HOST_PLACEHOLDER, host)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_args_render_ssh_forward() {
        let config = TunnelConfig::default();
        let args = config.render_args("/tmp/x.sock", "worker-02");
        assert_eq!(
            args,
            vec!["-N", "-L", "/tmp/x.sock:/var/run/docker.sock", "worker-02"]
        );
    }

    #[test]
    fn test_timeouts_from_toml() {
        let config: TunnelConfig =
            toml::from_str("ready_timeout_ms = 250\npoll_interval_ms = 25").unwrap();
        assert_eq!(config.ready_timeout, Duration::from_millis(250));
        assert_eq!(config.poll_interval, Duration::from_millis(25));
        assert_eq!(config.program, "ssh");
    }
}
