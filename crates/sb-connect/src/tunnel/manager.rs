//! Tunnel spawning, readiness polling and supervision

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, Command};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use sb_core::config::TunnelConfig;
use sb_core::error::ConnectionError;
use sb_core::Host;

use super::socket::{self, is_socket, remove_socket};
use super::{TunnelLink, TunnelState};

/// Opens forwarding tunnels according to a [`TunnelConfig`]
#[derive(Debug, Clone)]
pub struct TunnelManager {
    config: TunnelConfig,
}

impl TunnelManager {
    pub fn new(config: TunnelConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TunnelConfig {
        &self.config
    }

    /// Spawn the forwarding program for `host` and wait for its socket
    pub async fn open(&self, host: &Host) -> Result<Tunnel, ConnectionError> {
        let socket_path = socket::socket_path(&self.config.socket_dir(), host);
        let local = socket_path.to_string_lossy();
        let args = self.config.render_args(&local, host.as_str());

        tracing::debug!("Spawning tunnel: {} {}", self.config.program, args.join(" "));

        let mut child = Command::new(&self.config.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ConnectionError::SpawnFailed {
                host: host.clone(),
                reason: format!("{}: {}", self.config.program, e),
            })?;

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_stderr(host.clone(), stderr));
        }

        let waited = wait_for_socket(
            &socket_path,
            &mut child,
            self.config.ready_timeout,
            self.config.poll_interval,
        )
        .await;

        match waited {
            Ok(SocketWait::Ready) => {}
            Ok(SocketWait::Exited(status)) => {
                remove_socket(&socket_path);
                return Err(ConnectionError::SpawnFailed {
                    host: host.clone(),
                    reason: format!("tunnel process exited before the socket appeared ({})", status),
                });
            }
            Ok(SocketWait::TimedOut) => {
                abandon(&mut child, host, &socket_path).await;
                return Err(ConnectionError::TunnelTimeout {
                    host: host.clone(),
                    waited: self.config.ready_timeout,
                });
            }
            Err(e) => {
                abandon(&mut child, host, &socket_path).await;
                return Err(ConnectionError::SpawnFailed {
                    host: host.clone(),
                    reason: format!("failed to poll tunnel process: {}", e),
                });
            }
        }

        tracing::info!("Tunnel to {} ready at {}", host, socket_path.display());
        Ok(Tunnel::supervise(
            host.clone(),
            socket_path,
            child,
            self.config.kill_grace,
        ))
    }
}

/// Kill a tunnel process that never became ready and drop its socket
async fn abandon(child: &mut Child, host: &Host, socket_path: &Path) {
    if let Err(e) = child.kill().await {
        tracing::warn!("Failed to kill abandoned tunnel to {}: {}", host, e);
    }
    remove_socket(socket_path);
}

/// Outcome of [`wait_for_socket`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketWait {
    Ready,
    Exited(ExitStatus),
    TimedOut,
}

/// Poll until `path` is a socket, the child exits, or `timeout` elapses
pub async fn wait_for_socket(
    path: &Path,
    child: &mut Child,
    timeout: Duration,
    interval: Duration,
) -> std::io::Result<SocketWait> {
    let deadline = Instant::now() + timeout;
    loop {
        if is_socket(path) {
            return Ok(SocketWait::Ready);
        }
        if let Some(status) = child.try_wait()? {
            return Ok(SocketWait::Exited(status));
        }
        let now = Instant::now();
        if now >= deadline {
            return Ok(SocketWait::TimedOut);
        }
        tracing::debug!("Waiting for tunnel socket {}", path.display());
        tokio::time::sleep(interval.min(deadline - now)).await;
    }
}

async fn forward_stderr(host: Host, stderr: ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        tracing::debug!(host = %host, "tunnel: {}", line);
    }
}

/// A ready forwarding tunnel
pub struct Tunnel {
    host: Host,
    socket_path: PathBuf,
    pid: Option<u32>,
    state: Arc<watch::Sender<TunnelState>>,
    lost: CancellationToken,
    shutdown: CancellationToken,
    supervisor: Mutex<Option<JoinHandle<Result<(), String>>>>,
}

impl Tunnel {
    /// Hand a running child to a supervisor task
    pub(crate) fn supervise(
        host: Host,
        socket_path: PathBuf,
        child: Child,
        kill_grace: Duration,
    ) -> Self {
        let pid = child.id();
        let (state, _) = watch::channel(TunnelState::Ready);
        let state = Arc::new(state);
        let lost = CancellationToken::new();
        let shutdown = CancellationToken::new();

        let supervisor = tokio::spawn(run_supervisor(
            host.clone(),
            child,
            Arc::clone(&state),
            lost.clone(),
            shutdown.clone(),
            kill_grace,
        ));

        Self {
            host,
            socket_path,
            pid,
            state,
            lost,
            shutdown,
            supervisor: Mutex::new(Some(supervisor)),
        }
    }

    pub fn host(&self) -> &Host {
        &self.host
    }

    /// Local end of the forward
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Process id of the forwarding program
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn state(&self) -> TunnelState {
        *self.state.borrow()
    }

    /// Watch state changes
    pub fn subscribe(&self) -> watch::Receiver<TunnelState> {
        self.state.subscribe()
    }

    pub fn lost(&self) -> CancellationToken {
        self.lost.clone()
    }

    /// Terminate the forwarding program and remove the socket
    pub async fn close(&self) -> Result<(), ConnectionError> {
        let first = self.state.send_if_modified(|state| {
            if *state == TunnelState::Closed {
                false
            } else {
                *state = TunnelState::Closed;
                true
            }
        });
        if !first {
            return Ok(());
        }

        tracing::info!("Closing tunnel to {}", self.host);
        self.lost.cancel();
        self.shutdown.cancel();

        let supervisor = self.supervisor.lock().await.take();
        let result = match supervisor {
            Some(handle) => match handle.await {
                Ok(Ok(())) => Ok(()),
                Ok(Err(reason)) => Err(ConnectionError::CloseFailed {
                    host: self.host.clone(),
                    reason,
                }),
                Err(e) => Err(ConnectionError::CloseFailed {
                    host: self.host.clone(),
                    reason: format!("supervisor task failed: {}", e),
                }),
            },
            None => Ok(()),
        };

        remove_socket(&self.socket_path);
        result
    }
}

impl Drop for Tunnel {
    fn drop(&mut self) {
        if self.state() != TunnelState::Closed {
            self.lost.cancel();
            self.shutdown.cancel();
            remove_socket(&self.socket_path);
        }
    }
}

impl std::fmt::Debug for Tunnel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tunnel")
            .field("host", &self.host)
            .field("socket_path", &self.socket_path)
            .field("pid", &self.pid)
            .field("state", &self.state())
            .finish()
    }
}

#[async_trait]
impl TunnelLink for Tunnel {
    fn host(&self) -> &Host {
        &self.host
    }

    fn state(&self) -> TunnelState {
        Tunnel::state(self)
    }

    fn lost(&self) -> CancellationToken {
        Tunnel::lost(self)
    }

    async fn close(&self) -> Result<(), ConnectionError> {
        Tunnel::close(self).await
    }
}

async fn run_supervisor(
    host: Host,
    mut child: Child,
    state: Arc<watch::Sender<TunnelState>>,
    lost: CancellationToken,
    shutdown: CancellationToken,
    kill_grace: Duration,
) -> Result<(), String> {
    tokio::select! {
        status = child.wait() => {
            let failed = state.send_if_modified(|s| {
                if *s == TunnelState::Ready {
                    *s = TunnelState::Failed;
                    true
                } else {
                    false
                }
            });
            if failed {
                match status {
                    Ok(status) => tracing::warn!("Tunnel to {} exited unexpectedly ({})", host, status),
                    Err(e) => tracing::warn!("Tunnel to {} could not be awaited: {}", host, e),
                }
            }
            lost.cancel();
            Ok(())
        }
        _ = shutdown.cancelled() => terminate(&host, &mut child, kill_grace).await,
    }
}

/// SIGTERM, then SIGKILL after `grace`
async fn terminate(host: &Host, child: &mut Child, grace: Duration) -> Result<(), String> {
    if let Ok(Some(_)) = child.try_wait() {
        return Ok(());
    }

    send_terminate(child);
    match tokio::time::timeout(grace, child.wait()).await {
        Ok(Ok(status)) => {
            tracing::debug!("Tunnel to {} terminated ({})", host, status);
            return Ok(());
        }
        Ok(Err(e)) => return Err(format!("failed to wait for tunnel process: {}", e)),
        Err(_) => {
            tracing::warn!("Tunnel to {} ignored SIGTERM, killing it", host);
        }
    }

    child
        .start_kill()
        .map_err(|e| format!("failed to kill tunnel process: {}", e))?;
    match tokio::time::timeout(grace, child.wait()).await {
        Ok(Ok(_)) => Ok(()),
        Ok(Err(e)) => Err(format!("failed to wait for tunnel process: {}", e)),
        Err(_) => Err(format!(
            "tunnel process {:?} still running after SIGKILL",
            child.id()
        )),
    }
}

#[cfg(unix)]
fn send_terminate(child: &mut Child) {
    if let Some(pid) = child.id() {
        // SAFETY: plain signal delivery to our own child
        let result = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
        if result != 0 {
            tracing::debug!(
                "SIGTERM to {} failed: {}",
                pid,
                std::io::Error::last_os_error()
            );
        }
    }
}

#[cfg(not(unix))]
fn send_terminate(child: &mut Child) {
    let _ = child.start_kill();
}
