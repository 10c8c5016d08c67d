//! Cluster profile configuration

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::ConfigError;
use crate::types::Host;

/// A node of a cluster and how to reach it
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeProfile {
    /// Tunnel destination for this node (usually an `~/.ssh/config` alias)
    pub host: Host,

    /// Hostname the orchestrator reports for this node
    pub hostname: String,
}

/// A configured cluster
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterProfile {
    /// Display name
    #[serde(default)]
    pub name: String,

    /// Manager host used for orchestration queries
    pub host: Host,

    /// Nodes keyed by a short name
    #[serde(default)]
    pub nodes: BTreeMap<String, NodeProfile>,
}

impl ClusterProfile {
    /// Find the node whose orchestrator hostname matches
    pub fn node_by_hostname(&self, hostname: &str) -> Option<&NodeProfile> {
        self.nodes
            .values()
            .find(|n| n.hostname.eq_ignore_ascii_case(hostname))
    }

    /// Resolve an orchestrator hostname to the host used for tunnelling
    pub fn resolve_host(&self, hostname: &str) -> Result<Host, ConfigError> {
        self.node_by_hostname(hostname)
            .map(|n| n.host.clone())
            .ok_or_else(|| ConfigError::UnknownNode {
                cluster: self.name.clone(),
                hostname: hostname.to_string(),
            })
    }

    /// Node names in sorted order
    pub fn node_names(&self) -> Vec<&str> {
        self.nodes.keys().map(String::as_str).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn staging() -> ClusterProfile {
        toml::from_str(
            r#"
name = "Staging"
host = "swarm-02.test.com"

[nodes.swarm-02]
host = "swarm-02.test.com"
hostname = "swarm-02.test.com"

[nodes.worker-01]
host = "worker-01"
hostname = "worker-01.test.com"
"#,
        )
        .unwrap()
    }

    #[test]
    fn test_node_by_hostname() {
        let cluster = staging();
        let node = cluster.node_by_hostname("worker-01.test.com").unwrap();
        assert_eq!(node.host, Host::new("worker-01"));
        assert!(cluster.node_by_hostname("nope").is_none());
        assert_eq!(cluster.node_names(), vec!["swarm-02", "worker-01"]);
    }

    #[test]
    fn test_default_profile_is_empty() {
        let cluster = ClusterProfile::default();
        assert_eq!(cluster.host, Host::default());
        assert!(cluster.host.as_str().is_empty());
        assert!(cluster.node_names().is_empty());
        assert_eq!(NodeProfile::default().host, Host::new(""));
    }

    #[test]
    fn test_resolve_unknown_node() {
        let cluster = staging();
        let err = cluster.resolve_host("db-07.test.com").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::UnknownNode { ref hostname, .. } if hostname == "db-07.test.com"
        ));
    }
}
