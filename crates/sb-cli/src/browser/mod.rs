//! Cluster browsing
//!
//! A [`ClusterBrowser`] lists the stacks, services and tasks of one cluster
//! and attaches interactive sessions to task containers. [`SwarmBrowser`]
//! talks to a real manager node through the host pool; [`DevBrowser`]
//! serves the `[dev]` config section and runs sessions in local
//! pseudo-terminals.

mod dev;
mod swarm;

pub use dev::{DevBrowser, LocalConnector, LocalLink, LocalPtyEngine};
pub use swarm::SwarmBrowser;

use async_trait::async_trait;

use sb_core::error::{AttachError, SbError};
use sb_core::traits::ExecEngine;
use sb_core::types::{Service, Stack, Task};
use sb_session::Session;

/// Browse one cluster and attach to its containers
#[async_trait]
pub trait ClusterBrowser: Send + Sync {
    type Engine: ExecEngine;

    /// Key of the cluster in the config file
    fn cluster_name(&self) -> &str;

    async fn list_stacks(&self) -> Result<Vec<Stack>, SbError>;

    async fn list_services(&self, stack: &Stack) -> Result<Vec<Service>, SbError>;

    async fn list_tasks(&self, service: &Service) -> Result<Vec<Task>, SbError>;

    /// Attach to a task's container. An empty command runs the configured shell.
    async fn attach_to_task(
        &self,
        task: &Task,
        command: Vec<String>,
    ) -> Result<Session<Self::Engine>, SbError>;

    /// Attach to the first running task of a service
    async fn attach_to_service(
        &self,
        service: &Service,
        command: Vec<String>,
    ) -> Result<Session<Self::Engine>, SbError> {
        let tasks = self.list_tasks(service).await?;
        let task = first_running(&tasks).ok_or_else(|| AttachError::NoRunningTask {
            service: service.name.clone(),
        })?;
        tracing::debug!("Picked task {} of {}", task.task_id, service.name);
        self.attach_to_task(task, command).await
    }

    /// Release every connection held by the browser
    async fn close(&self) -> Result<(), SbError>;
}

/// First task in the running state
pub fn first_running(tasks: &[Task]) -> Option<&Task> {
    tasks.iter().find(|t| t.state.is_running())
}

pub(crate) fn ensure_running(task: &Task) -> Result<(), AttachError> {
    if task.state.is_running() {
        Ok(())
    } else {
        Err(AttachError::TaskNotRunning {
            task: task.task_id.clone(),
            state: task.state.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sb_core::types::TaskState;
    use sb_core::{ContainerRef, Host};

    fn task(id: &str, state: TaskState) -> Task {
        Task {
            task_id: id.to_string(),
            container: ContainerRef::new(format!("c-{}", id)),
            host: Host::new("worker-01"),
            node_hostname: "worker-01".to_string(),
            state,
        }
    }

    #[test]
    fn test_first_running_skips_pending() {
        let tasks = vec![
            task("a", TaskState::Pending),
            task("b", TaskState::Running),
            task("c", TaskState::Running),
        ];
        assert_eq!(first_running(&tasks).map(|t| t.task_id.as_str()), Some("b"));
        assert!(first_running(&tasks[..1]).is_none());
    }

    #[test]
    fn test_ensure_running_reports_state() {
        let err = ensure_running(&task("a", TaskState::Failed)).unwrap_err();
        assert_eq!(err.to_string(), "Task a is not running (state: failed)");
        assert!(ensure_running(&task("b", TaskState::Running)).is_ok());
    }
}
