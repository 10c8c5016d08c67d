//! Docker Engine API calls used by swarm-browser

use async_trait::async_trait;
use bollard::errors::Error as BollardError;
use bollard::exec::{CreateExecOptions, ResizeExecOptions, StartExecOptions, StartExecResults};
use bollard::service::ListServicesOptions;
use bollard::task::ListTasksOptions;
use bollard::{ClientVersion, Docker, API_DEFAULT_VERSION};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use sb_core::config::EngineConfig;
use sb_core::error::EngineError;
use sb_core::traits::{ExecEngine, ExecSpec, ExecStream, SwarmApi};
use sb_core::types::{
    ContainerRef, ExecId, NodeSummary, ServiceSummary, TaskState, TaskSummary, TerminalSize,
};
use sb_core::STACK_NAMESPACE_LABEL;

use super::stream::ExecIo;

/// Engine client bound to one local socket
#[derive(Clone)]
pub struct DockerClient {
    socket: PathBuf,
    docker: Docker,
}

impl DockerClient {
    /// Build a client for the engine listening on `socket`.
    ///
    /// No connection is made until the first request.
    pub fn connect(socket: impl Into<PathBuf>, config: &EngineConfig) -> Result<Self, EngineError> {
        let socket = socket.into();
        let requested = config
            .version()
            .map_err(|e| EngineError::Request(e.to_string()))?
            .map(|(major_version, minor_version)| ClientVersion {
                major_version,
                minor_version,
            });
        let docker = Docker::connect_with_unix(
            &socket.to_string_lossy(),
            config.request_timeout.as_secs().max(1),
            requested.as_ref().unwrap_or(API_DEFAULT_VERSION),
        )
        .map_err(engine_error)?;
        Ok(Self { socket, docker })
    }

    /// Socket this client talks to
    pub fn socket(&self) -> &Path {
        &self.socket
    }
}

impl std::fmt::Debug for DockerClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DockerClient")
            .field("socket", &self.socket)
            .finish()
    }
}

fn engine_error(err: BollardError) -> EngineError {
    match err {
        BollardError::DockerResponseServerError {
            status_code,
            message,
        } => EngineError::Api {
            status: status_code,
            message,
        },
        other => EngineError::Request(other.to_string()),
    }
}

#[async_trait]
impl ExecEngine for DockerClient {
    async fn create_exec(
        &self,
        container: &ContainerRef,
        spec: &ExecSpec,
    ) -> Result<ExecId, EngineError> {
        let options = CreateExecOptions {
            attach_stdin: Some(true),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            tty: Some(spec.tty),
            cmd: Some(spec.command.clone()),
            env: Some(spec.env.clone()),
            ..Default::default()
        };
        let created = self
            .docker
            .create_exec(container.as_str(), options)
            .await
            .map_err(engine_error)?;
        tracing::debug!("Created exec {} in container {}", created.id, container);
        Ok(ExecId(created.id))
    }

    async fn attach_exec(&self, exec: &ExecId) -> Result<ExecStream, EngineError> {
        let options = StartExecOptions {
            detach: false,
            tty: true,
            ..Default::default()
        };
        match self
            .docker
            .start_exec(exec.as_str(), Some(options))
            .await
            .map_err(engine_error)?
        {
            StartExecResults::Attached { output, input } => {
                tracing::debug!("Attached to exec {}", exec);
                Ok(Box::new(ExecIo::new(output, input)))
            }
            StartExecResults::Detached => Err(EngineError::Protocol(format!(
                "exec {} started detached",
                exec
            ))),
        }
    }

    async fn resize_exec(&self, exec: &ExecId, size: TerminalSize) -> Result<(), EngineError> {
        self.docker
            .resize_exec(
                exec.as_str(),
                ResizeExecOptions {
                    height: size.rows,
                    width: size.cols,
                },
            )
            .await
            .map_err(engine_error)
    }
}

#[async_trait]
impl SwarmApi for DockerClient {
    async fn list_services(&self, stack: Option<&str>) -> Result<Vec<ServiceSummary>, EngineError> {
        let mut filters = HashMap::new();
        if let Some(stack) = stack {
            filters.insert(
                "label".to_string(),
                vec![format!("{}={}", STACK_NAMESPACE_LABEL, stack)],
            );
        }
        let services = self
            .docker
            .list_services(Some(ListServicesOptions {
                filters,
                status: true,
            }))
            .await
            .map_err(engine_error)?;

        Ok(services
            .into_iter()
            .map(|s| {
                let spec = s.spec.unwrap_or_default();
                let status = s.service_status.unwrap_or_default();
                ServiceSummary {
                    id: s.id.unwrap_or_default(),
                    name: spec.name.unwrap_or_default(),
                    labels: spec.labels.unwrap_or_default(),
                    running_tasks: status.running_tasks.unwrap_or(0),
                    desired_tasks: status.desired_tasks.unwrap_or(0),
                }
            })
            .collect())
    }

    async fn list_tasks(&self, service_id: &str) -> Result<Vec<TaskSummary>, EngineError> {
        let filters = HashMap::from([
            ("service".to_string(), vec![service_id.to_string()]),
            ("desired-state".to_string(), vec!["running".to_string()]),
        ]);
        let tasks = self
            .docker
            .list_tasks(Some(ListTasksOptions { filters }))
            .await
            .map_err(engine_error)?;

        Ok(tasks
            .into_iter()
            .map(|t| {
                let status = t.status.unwrap_or_default();
                TaskSummary {
                    id: t.id.unwrap_or_default(),
                    node_id: t.node_id.unwrap_or_default(),
                    container_id: status
                        .container_status
                        .and_then(|c| c.container_id)
                        .unwrap_or_default(),
                    state: status
                        .state
                        .map(|state| TaskState::parse(&state.to_string()))
                        .unwrap_or(TaskState::Unknown),
                }
            })
            .collect())
    }

    async fn inspect_node(&self, node_id: &str) -> Result<NodeSummary, EngineError> {
        let node = self
            .docker
            .inspect_node(node_id)
            .await
            .map_err(engine_error)?;
        Ok(NodeSummary {
            id: node.id.unwrap_or_default(),
            hostname: node
                .description
                .and_then(|d| d.hostname)
                .unwrap_or_default(),
        })
    }
}
