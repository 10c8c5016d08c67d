//! Offline data for the development browser

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::ClusterProfile;
use crate::error::ConfigError;

/// Mock stacks served by `--dev`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DevConfig {
    pub stacks: Vec<DevStack>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DevStack {
    pub name: String,

    /// Key of the cluster in `[clusters]`
    pub cluster: String,

    #[serde(default)]
    pub services: Vec<DevService>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DevService {
    /// Generated as `<stack>-<service>-NNN` when empty
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,

    pub name: String,

    #[serde(default)]
    pub running_tasks: u64,

    #[serde(default)]
    pub desired_tasks: u64,

    /// Explicit tasks; generated from the replica counts when empty
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tasks: Vec<DevTask>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DevTask {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub container_id: String,

    /// Key of the node in the cluster's `nodes` table
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub node: String,

    #[serde(default = "default_status")]
    pub status: String,
}

fn default_status() -> String {
    "running".to_string()
}

impl DevConfig {
    /// Fill generated ids, clamp replica counts and check cluster/node references
    pub fn normalize(
        &mut self,
        clusters: &BTreeMap<String, ClusterProfile>,
    ) -> Result<(), ConfigError> {
        for stack in &mut self.stacks {
            let cluster = clusters.get(&stack.cluster).ok_or_else(|| {
                ConfigError::Invalid(format!(
                    "stack '{}' references non-existent cluster '{}'",
                    stack.name, stack.cluster
                ))
            })?;

            for (index, service) in stack.services.iter_mut().enumerate() {
                if service.id.is_empty() {
                    service.id = format!("{}-{}-{:03}", stack.name, service.name, index + 1);
                }
                if service.running_tasks > service.desired_tasks {
                    service.running_tasks = service.desired_tasks;
                }
                for task in &service.tasks {
                    if !task.node.is_empty() && !cluster.nodes.contains_key(&task.node) {
                        return Err(ConfigError::Invalid(format!(
                            "task in service '{}' references non-existent node '{}' in cluster '{}'",
                            service.name, task.node, stack.cluster
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    /// Stacks bound to one cluster
    pub fn stacks_for_cluster<'a>(&'a self, cluster: &'a str) -> impl Iterator<Item = &'a DevStack> {
        self.stacks.iter().filter(move |s| s.cluster == cluster)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NodeProfile;
    use crate::types::Host;

    fn clusters() -> BTreeMap<String, ClusterProfile> {
        let mut nodes = BTreeMap::new();
        nodes.insert(
            "node-1".to_string(),
            NodeProfile {
                host: Host::new("localhost"),
                hostname: "node-1".to_string(),
            },
        );
        let mut clusters = BTreeMap::new();
        clusters.insert(
            "local".to_string(),
            ClusterProfile {
                name: "Local".to_string(),
                host: Host::new("localhost"),
                nodes,
            },
        );
        clusters
    }

    #[test]
    fn test_normalize_generates_ids_and_clamps() {
        let mut dev: DevConfig = toml::from_str(
            r#"
[[stacks]]
name = "web"
cluster = "local"
[[stacks.services]]
name = "api"
running_tasks = 5
desired_tasks = 2
"#,
        )
        .unwrap();
        dev.normalize(&clusters()).unwrap();
        let service = &dev.stacks[0].services[0];
        assert_eq!(service.id, "web-api-001");
        assert_eq!(service.running_tasks, 2);
    }

    #[test]
    fn test_normalize_rejects_unknown_references() {
        let mut dev = DevConfig {
            stacks: vec![DevStack {
                name: "web".into(),
                cluster: "prod".into(),
                services: vec![],
            }],
        };
        assert!(matches!(
            dev.normalize(&clusters()),
            Err(ConfigError::Invalid(msg)) if msg.contains("'prod'")
        ));

        let mut dev = DevConfig {
            stacks: vec![DevStack {
                name: "web".into(),
                cluster: "local".into(),
                services: vec![DevService {
                    name: "api".into(),
                    tasks: vec![DevTask {
                        node: "node-9".into(),
                        status: default_status(),
                        ..Default::default()
                    }],
                    ..Default::default()
                }],
            }],
        };
        assert!(dev.normalize(&clusters()).is_err());
    }
}
