//! Remote engine capabilities

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::EngineError;
use crate::types::{ContainerRef, ExecId, NodeSummary, ServiceSummary, TaskSummary, TerminalSize};

/// Bidirectional byte stream of an attached exec
pub trait DuplexStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> DuplexStream for T {}

/// Boxed stream handed out by [`ExecEngine::attach_exec`]
pub type ExecStream = Box<dyn DuplexStream>;

/// Parameters of an exec instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecSpec {
    pub command: Vec<String>,
    /// `KEY=value` pairs
    pub env: Vec<String>,
    pub tty: bool,
}

impl ExecSpec {
    /// Interactive TTY exec with `TERM` exported
    pub fn interactive(command: Vec<String>, term: &str) -> Self {
        Self {
            command,
            env: vec![format!("TERM={}", term)],
            tty: true,
        }
    }
}

/// Exec lifecycle on a single engine
#[async_trait]
pub trait ExecEngine: Send + Sync + 'static {
    /// Create an exec instance in a container
    async fn create_exec(
        &self,
        container: &ContainerRef,
        spec: &ExecSpec,
    ) -> Result<ExecId, EngineError>;

    /// Start the exec and hand back its raw stream
    async fn attach_exec(&self, exec: &ExecId) -> Result<ExecStream, EngineError>;

    /// Resize the exec's pseudo-terminal
    async fn resize_exec(&self, exec: &ExecId, size: TerminalSize) -> Result<(), EngineError>;

    /// Release client resources
    async fn close(&self) -> Result<(), EngineError> {
        Ok(())
    }
}

/// Orchestrator queries issued against a manager node
#[async_trait]
pub trait SwarmApi: Send + Sync {
    /// List services, optionally restricted to a stack namespace
    async fn list_services(&self, stack: Option<&str>) -> Result<Vec<ServiceSummary>, EngineError>;

    /// List running tasks of a service
    async fn list_tasks(&self, service_id: &str) -> Result<Vec<TaskSummary>, EngineError>;

    /// Describe a node
    async fn inspect_node(&self, node_id: &str) -> Result<NodeSummary, EngineError>;
}
