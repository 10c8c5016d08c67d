//! Core domain types

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Address of a cluster node, as understood by the tunnel program.
///
/// Also the cache key for tunnels and pooled clients.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Host(pub String);

impl Host {
    /// Create a new host
    pub fn new(host: impl Into<String>) -> Self {
        Self(host.into())
    }

    /// Get the raw host string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for Host {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for Host {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Identifier of a container on a remote engine
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContainerRef(pub String);

impl ContainerRef {
    /// Create a new container reference
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the raw container id
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContainerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ContainerRef {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Identifier of an exec instance created on a remote engine
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecId(pub String);

impl ExecId {
    /// Get the raw exec id
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExecId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for an interactive session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    /// Generate a fresh random session id
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short form is enough to tell sessions apart in logs
        let s = self.0.simple().to_string();
        write!(f, "session-{}", &s[..8])
    }
}

/// Terminal dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalSize {
    pub cols: u16,
    pub rows: u16,
}

impl TerminalSize {
    pub fn new(cols: u16, rows: u16) -> Self {
        Self { cols, rows }
    }
}

impl Default for TerminalSize {
    fn default() -> Self {
        Self { cols: 80, rows: 24 }
    }
}

impl fmt::Display for TerminalSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.cols, self.rows)
    }
}

/// A named group of services
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Stack {
    pub name: String,
}

impl fmt::Display for Stack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// A replicated workload definition inside a stack
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub id: String,
    pub name: String,
    pub running_tasks: u64,
    pub desired_tasks: u64,
    pub stack: Stack,
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}/{} replicas)",
            self.name, self.running_tasks, self.desired_tasks
        )
    }
}

/// Scheduling state of a task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    New,
    Pending,
    Assigned,
    Accepted,
    Preparing,
    Starting,
    Running,
    Complete,
    Shutdown,
    Failed,
    Rejected,
    Remove,
    Orphaned,
    #[serde(other)]
    Unknown,
}

impl TaskState {
    /// Parse the engine's lowercase state name
    pub fn parse(state: &str) -> Self {
        match state.to_ascii_lowercase().as_str() {
            "new" => TaskState::New,
            "pending" => TaskState::Pending,
            "assigned" => TaskState::Assigned,
            "accepted" => TaskState::Accepted,
            "preparing" => TaskState::Preparing,
            "starting" => TaskState::Starting,
            "running" => TaskState::Running,
            "complete" => TaskState::Complete,
            "shutdown" => TaskState::Shutdown,
            "failed" => TaskState::Failed,
            "rejected" => TaskState::Rejected,
            "remove" => TaskState::Remove,
            "orphaned" => TaskState::Orphaned,
            _ => TaskState::Unknown,
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, TaskState::Running)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskState::New => "new",
            TaskState::Pending => "pending",
            TaskState::Assigned => "assigned",
            TaskState::Accepted => "accepted",
            TaskState::Preparing => "preparing",
            TaskState::Starting => "starting",
            TaskState::Running => "running",
            TaskState::Complete => "complete",
            TaskState::Shutdown => "shutdown",
            TaskState::Failed => "failed",
            TaskState::Rejected => "rejected",
            TaskState::Remove => "remove",
            TaskState::Orphaned => "orphaned",
            TaskState::Unknown => "unknown",
        };
        write!(f, "{}", s)
    }
}

/// One scheduled instance of a service, placed on a configured node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub task_id: String,
    pub container: ContainerRef,
    /// Host used to reach the node running this task
    pub host: Host,
    /// Node hostname as reported by the orchestrator
    pub node_hostname: String,
    pub state: TaskState,
}

/// Raw service listing entry returned by the orchestration API
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ServiceSummary {
    pub id: String,
    pub name: String,
    pub labels: std::collections::HashMap<String, String>,
    pub running_tasks: u64,
    pub desired_tasks: u64,
}

/// Raw task listing entry returned by the orchestration API
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSummary {
    pub id: String,
    pub node_id: String,
    pub container_id: String,
    pub state: TaskState,
}

/// Raw node description returned by the orchestration API
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeSummary {
    pub id: String,
    pub hostname: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_display() {
        let host = Host::new("worker-02");
        assert_eq!(format!("{}", host), "worker-02");
        assert_eq!(Host::from("worker-02"), host);
    }

    #[test]
    fn test_session_id_display_is_short() {
        let id = SessionId::new();
        let shown = id.to_string();
        assert!(shown.starts_with("session-"));
        assert_eq!(shown.len(), "session-".len() + 8);
        assert_ne!(SessionId::new(), id);
    }

    #[test]
    fn test_task_state_parse() {
        assert_eq!(TaskState::parse("running"), TaskState::Running);
        assert_eq!(TaskState::parse("Failed"), TaskState::Failed);
        assert_eq!(TaskState::parse("bogus"), TaskState::Unknown);
        assert!(TaskState::Running.is_running());
        assert!(!TaskState::Pending.is_running());
    }

    #[test]
    fn test_task_state_serde_lowercase() {
        let json = serde_json::to_string(&TaskState::Running).unwrap();
        assert_eq!(json, "\"running\"");
        let parsed: TaskState = serde_json::from_str("\"whatever\"").unwrap();
        assert_eq!(parsed, TaskState::Unknown);
    }

    #[test]
    fn test_service_display() {
        let service = Service {
            id: "abc".into(),
            name: "web_api".into(),
            running_tasks: 2,
            desired_tasks: 3,
            stack: Stack { name: "web".into() },
        };
        assert_eq!(service.to_string(), "web_api (2/3 replicas)");
    }
}
