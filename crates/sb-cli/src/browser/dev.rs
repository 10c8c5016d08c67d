//! Offline browser over the `[dev]` config section
//!
//! Stacks, services and tasks come from the config file. Attaching spawns
//! the command in a pseudo-terminal on this machine, with `MOCK_*`
//! variables describing the task it stands in for.

use anyhow::Context;
use async_trait::async_trait;
use dashmap::DashMap;
use portable_pty::{native_pty_system, Child, CommandBuilder, MasterPty, PtyPair, PtySize, PtySystem};
use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use sb_connect::{ClientHandle, HostConnector, HostPool, TunnelLink, TunnelState};
use sb_core::config::{ClusterProfile, ConfigFile, DevConfig, DevService, DevStack};
use sb_core::error::{ConnectionError, EngineError, SbError};
use sb_core::traits::{ExecEngine, ExecSpec, ExecStream};
use sb_core::types::{Service, Stack, Task, TaskState};
use sb_core::{ContainerRef, ExecId, Host, TerminalSize};
use sb_session::{AttachRequest, Session, SessionBridge};

use super::{ensure_running, ClusterBrowser};

const PTY_CHUNK: usize = 4096;
const PIPE_CAPACITY: usize = 64 * 1024;

type ContainerEnv = Arc<DashMap<ContainerRef, Vec<(String, String)>>>;
type SharedChild = Arc<Mutex<Box<dyn Child + Send + Sync>>>;

struct PendingExec {
    container: ContainerRef,
    spec: ExecSpec,
}

struct LocalExec {
    master: Mutex<Box<dyn MasterPty + Send>>,
    child: SharedChild,
}

/// Runs execs as local processes in pseudo-terminals
pub struct LocalPtyEngine {
    host: Host,
    containers: ContainerEnv,
    pending: DashMap<ExecId, PendingExec>,
    running: Arc<DashMap<ExecId, Arc<LocalExec>>>,
    next_id: AtomicU64,
}

impl LocalPtyEngine {
    fn new(host: Host, containers: ContainerEnv) -> Self {
        Self {
            host,
            containers,
            pending: DashMap::new(),
            running: Arc::new(DashMap::new()),
            next_id: AtomicU64::new(0),
        }
    }
}

fn no_such_exec(exec: &ExecId) -> EngineError {
    EngineError::Api {
        status: 404,
        message: format!("No such exec instance: {}", exec),
    }
}

#[async_trait]
impl ExecEngine for LocalPtyEngine {
    async fn create_exec(
        &self,
        container: &ContainerRef,
        spec: &ExecSpec,
    ) -> Result<ExecId, EngineError> {
        if !self.containers.contains_key(container) {
            return Err(EngineError::Api {
                status: 404,
                message: format!("No such container: {}", container),
            });
        }
        if spec.command.is_empty() {
            return Err(EngineError::Api {
                status: 400,
                message: "No exec command specified".to_string(),
            });
        }

        let id = ExecId(format!(
            "local-exec-{}",
            self.next_id.fetch_add(1, Ordering::Relaxed) + 1
        ));
        self.pending.insert(
            id.clone(),
            PendingExec {
                container: container.clone(),
                spec: spec.clone(),
            },
        );
        Ok(id)
    }

    async fn attach_exec(&self, exec: &ExecId) -> Result<ExecStream, EngineError> {
        let (_, pending) = self.pending.remove(exec).ok_or_else(|| no_such_exec(exec))?;
        let env = self
            .containers
            .get(&pending.container)
            .map(|e| e.value().clone())
            .unwrap_or_default();

        let spawned = spawn_in_pty(&pending.spec, &env).map_err(|e| EngineError::Api {
            status: 500,
            message: format!("{:#}", e),
        })?;
        tracing::info!(
            "Started {:?} for {} on {} (pid {:?})",
            pending.spec.command,
            pending.container,
            self.host,
            spawned.child.process_id()
        );

        let child: SharedChild = Arc::new(Mutex::new(spawned.child));
        self.running.insert(
            exec.clone(),
            Arc::new(LocalExec {
                master: Mutex::new(spawned.master),
                child: child.clone(),
            }),
        );

        let (local, remote) = tokio::io::duplex(PIPE_CAPACITY);
        let (mut local_rd, mut local_wr) = tokio::io::split(local);

        // pty -> session
        let (out_tx, mut out_rx) = mpsc::channel::<Vec<u8>>(64);
        spawn_pty_reader(
            exec.clone(),
            spawned.reader,
            out_tx,
            child.clone(),
            self.running.clone(),
        )?;
        tokio::spawn(async move {
            while let Some(chunk) = out_rx.recv().await {
                if local_wr.write_all(&chunk).await.is_err() {
                    break;
                }
            }
            let _ = local_wr.shutdown().await;
        });

        // session -> pty
        let (in_tx, in_rx) = mpsc::channel::<Vec<u8>>(64);
        spawn_pty_writer(exec.clone(), spawned.writer, in_rx)?;
        let exec_id = exec.clone();
        tokio::spawn(async move {
            let mut buf = vec![0u8; PTY_CHUNK];
            loop {
                match local_rd.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        if in_tx.send(buf[..n].to_vec()).await.is_err() {
                            break;
                        }
                    }
                }
            }
            drop(in_tx);
            // Session input is gone, the process goes with it
            kill_child(&exec_id, &child);
        });

        Ok(Box::new(remote))
    }

    async fn resize_exec(&self, exec: &ExecId, size: TerminalSize) -> Result<(), EngineError> {
        let local = self
            .running
            .get(exec)
            .map(|e| e.value().clone())
            .ok_or_else(|| no_such_exec(exec))?;
        let master = local
            .master
            .lock()
            .map_err(|_| EngineError::Protocol("pty lock poisoned".to_string()))?;
        tracing::debug!("Resizing {} to {}", exec, size);
        master
            .resize(PtySize {
                rows: size.rows,
                cols: size.cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| EngineError::Api {
                status: 500,
                message: e.to_string(),
            })
    }

    async fn close(&self) -> Result<(), EngineError> {
        let execs: Vec<(ExecId, Arc<LocalExec>)> = self
            .running
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        self.pending.clear();
        for (id, exec) in execs {
            kill_child(&id, &exec.child);
        }
        Ok(())
    }
}

struct SpawnedPty {
    master: Box<dyn MasterPty + Send>,
    child: Box<dyn Child + Send + Sync>,
    reader: Box<dyn Read + Send>,
    writer: Box<dyn Write + Send>,
}

fn spawn_in_pty(spec: &ExecSpec, env: &[(String, String)]) -> anyhow::Result<SpawnedPty> {
    let pty_system = native_pty_system();
    let PtyPair { slave, master } = pty_system
        .openpty(PtySize {
            rows: 24,
            cols: 80,
            pixel_width: 0,
            pixel_height: 0,
        })
        .context("Failed to open PTY")?;

    let (program, args) = spec
        .command
        .split_first()
        .context("No exec command specified")?;
    let mut cmd = CommandBuilder::new(program);
    cmd.args(args);
    for (key, value) in env {
        cmd.env(key, value);
    }
    for pair in &spec.env {
        if let Some((key, value)) = pair.split_once('=') {
            cmd.env(key, value);
        }
    }

    let child = slave
        .spawn_command(cmd)
        .with_context(|| format!("Failed to spawn {}", program))?;
    // Only the child keeps the slave open, so reads end when it exits
    drop(slave);

    let reader = master
        .try_clone_reader()
        .context("Failed to clone PTY reader")?;
    let writer = master.take_writer().context("Failed to take PTY writer")?;

    Ok(SpawnedPty {
        master,
        child,
        reader,
        writer,
    })
}

fn spawn_pty_reader(
    exec: ExecId,
    mut reader: Box<dyn Read + Send>,
    tx: mpsc::Sender<Vec<u8>>,
    child: SharedChild,
    running: Arc<DashMap<ExecId, Arc<LocalExec>>>,
) -> Result<(), EngineError> {
    std::thread::Builder::new()
        .name(format!("pty-read-{}", exec))
        .spawn(move || {
            let mut buf = [0u8; PTY_CHUNK];
            loop {
                match reader.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        if tx.blocking_send(buf[..n].to_vec()).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        // EIO once the child side is gone
                        tracing::debug!("PTY reader for {} stopped: {}", exec, e);
                        break;
                    }
                }
            }
            reap_child(&exec, &child);
            running.remove(&exec);
        })?;
    Ok(())
}

fn spawn_pty_writer(
    exec: ExecId,
    mut writer: Box<dyn Write + Send>,
    mut rx: mpsc::Receiver<Vec<u8>>,
) -> Result<(), EngineError> {
    std::thread::Builder::new()
        .name(format!("pty-write-{}", exec))
        .spawn(move || {
            while let Some(chunk) = rx.blocking_recv() {
                if let Err(e) = writer.write_all(&chunk).and_then(|_| writer.flush()) {
                    tracing::debug!("PTY writer for {} stopped: {}", exec, e);
                    break;
                }
            }
        })?;
    Ok(())
}

fn kill_child(exec: &ExecId, child: &SharedChild) {
    let Ok(mut child) = child.lock() else {
        return;
    };
    if let Ok(None) = child.try_wait() {
        tracing::debug!("Killing local exec {}", exec);
        let _ = child.kill();
    }
}

fn reap_child(exec: &ExecId, child: &SharedChild) {
    let Ok(mut child) = child.lock() else {
        return;
    };
    match child.try_wait() {
        Ok(Some(status)) => {
            tracing::info!("Local exec {} exited with code {}", exec, status.exit_code());
        }
        _ => {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

/// Link of a local engine. Ready until closed.
pub struct LocalLink {
    host: Host,
    closed: AtomicBool,
    lost: CancellationToken,
}

impl LocalLink {
    pub fn new(host: Host) -> Self {
        Self {
            host,
            closed: AtomicBool::new(false),
            lost: CancellationToken::new(),
        }
    }
}

#[async_trait]
impl TunnelLink for LocalLink {
    fn host(&self) -> &Host {
        &self.host
    }

    fn state(&self) -> TunnelState {
        if self.closed.load(Ordering::SeqCst) {
            TunnelState::Closed
        } else {
            TunnelState::Ready
        }
    }

    fn lost(&self) -> CancellationToken {
        self.lost.clone()
    }

    async fn close(&self) -> Result<(), ConnectionError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Hands out [`LocalPtyEngine`]s that know the registered containers
#[derive(Debug, Clone, Default)]
pub struct LocalConnector {
    containers: ContainerEnv,
}

impl LocalConnector {
    /// Make a container attachable, with extra environment for its processes
    pub fn register(&self, container: ContainerRef, env: Vec<(String, String)>) {
        self.containers.insert(container, env);
    }
}

#[async_trait]
impl HostConnector for LocalConnector {
    type Engine = LocalPtyEngine;

    async fn connect(&self, host: &Host) -> Result<ClientHandle<LocalPtyEngine>, ConnectionError> {
        tracing::debug!("Local engine for {}", host);
        let engine = LocalPtyEngine::new(host.clone(), self.containers.clone());
        Ok(ClientHandle::new(
            host.clone(),
            engine,
            Arc::new(LocalLink::new(host.clone())),
        ))
    }
}

/// Serves the `[dev]` stacks of one cluster
pub struct DevBrowser {
    name: String,
    cluster: ClusterProfile,
    stacks: Vec<DevStack>,
    pool: HostPool<LocalConnector>,
    bridge: SessionBridge,
}

impl DevBrowser {
    /// Build a browser for the requested (or default) cluster
    pub fn from_config(config: &ConfigFile, cluster: Option<&str>) -> Result<Self, SbError> {
        let (name, profile) = config.select_cluster(cluster)?;
        let dev = config.dev.clone().unwrap_or_default();
        let bridge = SessionBridge::new(config.session.clone())?;
        Ok(Self::new(name, profile.clone(), &dev, bridge))
    }

    pub fn new(
        name: impl Into<String>,
        cluster: ClusterProfile,
        dev: &DevConfig,
        bridge: SessionBridge,
    ) -> Self {
        let name = name.into();
        let stacks = dev.stacks_for_cluster(&name).cloned().collect();
        Self {
            name,
            cluster,
            stacks,
            pool: HostPool::new(LocalConnector::default()),
            bridge,
        }
    }

    pub fn pool(&self) -> &HostPool<LocalConnector> {
        &self.pool
    }

    /// Nodes tasks are spread over; the manager host when none are configured
    fn nodes(&self) -> Vec<(Host, String)> {
        if self.cluster.nodes.is_empty() {
            return vec![(self.cluster.host.clone(), self.cluster.host.to_string())];
        }
        self.cluster
            .nodes
            .values()
            .map(|n| (n.host.clone(), n.hostname.clone()))
            .collect()
    }

    fn find_service(&self, service: &Service) -> Option<&DevService> {
        self.stacks
            .iter()
            .filter(|s| s.name == service.stack.name)
            .flat_map(|s| s.services.iter())
            .find(|s| s.id == service.id)
    }

    fn build_tasks(&self, service: &Service, dev: &DevService) -> Vec<Task> {
        let nodes = self.nodes();
        let node_at = |i: usize| nodes[i % nodes.len()].clone();

        if !dev.tasks.is_empty() {
            return dev
                .tasks
                .iter()
                .enumerate()
                .map(|(i, t)| {
                    let (host, node_hostname) = match self.cluster.nodes.get(&t.node) {
                        Some(node) => (node.host.clone(), node.hostname.clone()),
                        None => node_at(i),
                    };
                    let task_id = if t.id.is_empty() {
                        generated_task_id(&service.id, i)
                    } else {
                        t.id.clone()
                    };
                    let container = if t.container_id.is_empty() {
                        generated_container_id(&service.id, i)
                    } else {
                        t.container_id.clone()
                    };
                    Task {
                        task_id,
                        container: ContainerRef::new(container),
                        host,
                        node_hostname,
                        state: TaskState::parse(&t.status),
                    }
                })
                .collect();
        }

        (0..dev.desired_tasks as usize)
            .map(|i| {
                let state = if (i as u64) < dev.running_tasks {
                    TaskState::Running
                } else if i % 2 == 1 {
                    TaskState::Failed
                } else {
                    TaskState::Pending
                };
                let (host, node_hostname) = node_at(i);
                Task {
                    task_id: generated_task_id(&service.id, i),
                    container: ContainerRef::new(generated_container_id(&service.id, i)),
                    host,
                    node_hostname,
                    state,
                }
            })
            .collect()
    }
}

fn generated_task_id(service_id: &str, index: usize) -> String {
    format!("{}-task-{:03}", service_id, index + 1)
}

fn generated_container_id(service_id: &str, index: usize) -> String {
    format!("container-{}-{:03}", service_id, index + 1)
}

#[async_trait]
impl ClusterBrowser for DevBrowser {
    type Engine = LocalPtyEngine;

    fn cluster_name(&self) -> &str {
        &self.name
    }

    async fn list_stacks(&self) -> Result<Vec<Stack>, SbError> {
        Ok(self
            .stacks
            .iter()
            .map(|s| Stack {
                name: s.name.clone(),
            })
            .collect())
    }

    async fn list_services(&self, stack: &Stack) -> Result<Vec<Service>, SbError> {
        let Some(dev) = self.stacks.iter().find(|s| s.name == stack.name) else {
            return Ok(Vec::new());
        };
        Ok(dev
            .services
            .iter()
            .map(|s| Service {
                id: s.id.clone(),
                name: format!("{}_{}", stack.name, s.name),
                running_tasks: s.running_tasks,
                desired_tasks: s.desired_tasks,
                stack: stack.clone(),
            })
            .collect())
    }

    async fn list_tasks(&self, service: &Service) -> Result<Vec<Task>, SbError> {
        let Some(dev) = self.find_service(service) else {
            return Ok(Vec::new());
        };
        let tasks = self.build_tasks(service, dev);
        for task in &tasks {
            self.pool.connector().register(
                task.container.clone(),
                vec![
                    ("MOCK_SERVICE_NAME".to_string(), service.name.clone()),
                    ("MOCK_TASK_ID".to_string(), task.task_id.clone()),
                    ("MOCK_CONTAINER_ID".to_string(), task.container.to_string()),
                ],
            );
        }
        Ok(tasks)
    }

    async fn attach_to_task(
        &self,
        task: &Task,
        command: Vec<String>,
    ) -> Result<Session<LocalPtyEngine>, SbError> {
        ensure_running(task)?;
        self.bridge
            .attach_request(
                &self.pool,
                AttachRequest {
                    host: task.host.clone(),
                    container: task.container.clone(),
                    command,
                },
            )
            .await
    }

    async fn close(&self) -> Result<(), SbError> {
        self.pool.close().await?;
        Ok(())
    }
}
