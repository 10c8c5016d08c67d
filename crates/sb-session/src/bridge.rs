//! Session bridge: exec attach plus the byte pumps between a remote exec
//! and the local terminal

use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;

use sb_connect::{ClientHandle, HostConnector, HostPool};
use sb_core::config::SessionConfig;
use sb_core::error::{AttachError, ConfigError, ResizeError, SbError, StreamError};
use sb_core::traits::{ExecEngine, ExecSpec, ExecStream};
use sb_core::{ContainerRef, ExecId, Host, SessionId, TerminalSize};

use crate::keys::{translate, DetachKey, InputEvent, KeyAction};
use crate::output::OutputSink;
use crate::terminal::{RestoreGuard, TerminalMode};

const READ_CHUNK: usize = 4096;

/// Where and what to run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachRequest {
    pub host: Host,
    pub container: ContainerRef,
    /// Empty means the configured shell
    pub command: Vec<String>,
}

/// Lifecycle of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Created,
    Attaching,
    Active,
    Detached,
    Closed,
    Errored,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Created => "created",
            SessionState::Attaching => "attaching",
            SessionState::Active => "active",
            SessionState::Detached => "detached",
            SessionState::Closed => "closed",
            SessionState::Errored => "errored",
        };
        write!(f, "{}", s)
    }
}

/// How a session ended
#[derive(Debug)]
pub enum SessionOutcome {
    /// The user pressed the detach key or local input ended
    Detached,
    /// The remote process closed its stream
    Closed,
    Errored(StreamError),
}

impl SessionOutcome {
    pub fn state(&self) -> SessionState {
        match self {
            SessionOutcome::Detached => SessionState::Detached,
            SessionOutcome::Closed => SessionState::Closed,
            SessionOutcome::Errored(_) => SessionState::Errored,
        }
    }
}

/// Creates sessions on pooled clients
#[derive(Debug, Clone)]
pub struct SessionBridge {
    config: SessionConfig,
    detach: DetachKey,
}

impl SessionBridge {
    pub fn new(config: SessionConfig) -> Result<Self, ConfigError> {
        let detach = DetachKey::parse(&config.detach_key)?;
        Ok(Self { config, detach })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Resolve the host through the pool, then attach
    pub async fn attach_request<C: HostConnector>(
        &self,
        pool: &HostPool<C>,
        request: AttachRequest,
    ) -> Result<Session<C::Engine>, SbError> {
        let client = pool.client_for(&request.host).await?;
        Ok(self
            .attach(client, request.container, request.command)
            .await?)
    }

    /// Create and attach an exec, retrying once with the fallback shell
    pub async fn attach<E: ExecEngine>(
        &self,
        client: Arc<ClientHandle<E>>,
        container: ContainerRef,
        command: Vec<String>,
    ) -> Result<Session<E>, AttachError> {
        let command = if command.is_empty() {
            self.config.shell.clone()
        } else {
            command
        };

        let (state, _) = watch::channel(SessionState::Created);
        state.send_replace(SessionState::Attaching);
        tracing::debug!("Attaching {:?} in {} on {}", command, container, client.host());

        let (command, exec, stream) = match self.open_exec(&client, &container, &command).await {
            Ok((exec, stream)) => (command, exec, stream),
            Err(primary) => {
                let fallback = &self.config.fallback_shell;
                if fallback.is_empty() || *fallback == command {
                    state.send_replace(SessionState::Errored);
                    return Err(primary);
                }
                tracing::warn!("{}; retrying with {:?}", primary, fallback);
                match self.open_exec(&client, &container, fallback).await {
                    Ok((exec, stream)) => (fallback.clone(), exec, stream),
                    Err(fallback) => {
                        state.send_replace(SessionState::Errored);
                        return Err(AttachError::FallbackFailed {
                            primary: Box::new(primary),
                            fallback: Box::new(fallback),
                        });
                    }
                }
            }
        };

        Ok(Session {
            id: SessionId::new(),
            container,
            command,
            exec,
            stream,
            client,
            state,
            detach: self.detach,
            teardown_timeout: self.config.teardown_timeout,
        })
    }

    async fn open_exec<E: ExecEngine>(
        &self,
        client: &ClientHandle<E>,
        container: &ContainerRef,
        command: &[String],
    ) -> Result<(ExecId, ExecStream), AttachError> {
        let spec = ExecSpec::interactive(command.to_vec(), &self.config.term);
        let exec = client
            .engine()
            .create_exec(container, &spec)
            .await
            .map_err(|source| AttachError::CreateExec {
                container: container.clone(),
                command: command.to_vec(),
                source,
            })?;
        let stream = client
            .engine()
            .attach_exec(&exec)
            .await
            .map_err(|source| AttachError::AttachExec {
                container: container.clone(),
                source,
            })?;
        Ok((exec, stream))
    }
}

/// Fire-and-forget resize requests for one exec
pub struct Resizer<E> {
    engine: Arc<E>,
    exec: ExecId,
    host: Host,
}

impl<E> Clone for Resizer<E> {
    fn clone(&self) -> Self {
        Self {
            engine: Arc::clone(&self.engine),
            exec: self.exec.clone(),
            host: self.host.clone(),
        }
    }
}

impl<E: ExecEngine> Resizer<E> {
    /// Issue one remote resize in the background. Failures are logged.
    pub fn resize(&self, size: TerminalSize) -> JoinHandle<()> {
        let engine = Arc::clone(&self.engine);
        let exec = self.exec.clone();
        let host = self.host.clone();
        tokio::spawn(async move {
            match engine.resize_exec(&exec, size).await {
                Ok(()) => tracing::debug!("Resized exec {} to {}", exec, size),
                Err(source) => {
                    let err = ResizeError {
                        host,
                        cols: size.cols,
                        rows: size.rows,
                        source,
                    };
                    tracing::warn!("{}", err);
                }
            }
        })
    }
}

/// An attached exec, ready to be bridged to a terminal
pub struct Session<E: ExecEngine> {
    id: SessionId,
    container: ContainerRef,
    command: Vec<String>,
    exec: ExecId,
    stream: ExecStream,
    client: Arc<ClientHandle<E>>,
    state: watch::Sender<SessionState>,
    detach: DetachKey,
    teardown_timeout: Duration,
}

impl<E: ExecEngine> Session<E> {
    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn host(&self) -> &Host {
        self.client.host()
    }

    pub fn container(&self) -> &ContainerRef {
        &self.container
    }

    /// Command actually running, after any fallback
    pub fn command(&self) -> &[String] {
        &self.command
    }

    pub fn exec_id(&self) -> &ExecId {
        &self.exec
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn resizer(&self) -> Resizer<E> {
        Resizer {
            engine: Arc::clone(self.client.engine()),
            exec: self.exec.clone(),
            host: self.client.host().clone(),
        }
    }

    pub fn resize(&self, size: TerminalSize) -> JoinHandle<()> {
        self.resizer().resize(size)
    }

    /// Take over the terminal and pump bytes until the session ends
    pub async fn start<S: OutputSink>(
        self,
        terminal: Arc<dyn TerminalMode>,
        input: mpsc::Receiver<InputEvent>,
        output: S,
    ) -> SessionOutcome {
        let Session {
            id,
            container,
            exec,
            stream,
            client,
            state,
            detach,
            teardown_timeout,
            ..
        } = self;
        let resizer = Resizer {
            engine: Arc::clone(client.engine()),
            exec,
            host: client.host().clone(),
        };
        let host = client.host().clone();
        let finish = |outcome: SessionOutcome| {
            state.send_replace(outcome.state());
            match &outcome {
                SessionOutcome::Errored(e) => tracing::warn!("Session {} on {} failed: {}", id, host, e),
                other => tracing::info!("Session {} on {} ended: {:?}", id, host, other),
            }
            outcome
        };

        let snapshot = match terminal.capture() {
            Ok(snapshot) => snapshot,
            Err(e) => return finish(SessionOutcome::Errored(StreamError::RawMode(e))),
        };
        let guard = RestoreGuard::new(Arc::clone(&terminal), snapshot);
        if let Err(e) = terminal.enter_raw() {
            guard.restore();
            drop(stream);
            return finish(SessionOutcome::Errored(StreamError::RawMode(e)));
        }

        state.send_replace(SessionState::Active);
        tracing::info!("Session {} active on {} in {}", id, host, container);

        if let Some(size) = terminal.size() {
            resizer.resize(size);
        }

        let (reader, writer) = tokio::io::split(stream);
        let cancel = CancellationToken::new();
        let lost = client.link().lost();

        let mut input_task = tokio::spawn(input_pump(
            writer,
            input,
            detach,
            resizer,
            cancel.clone(),
        ));
        let mut output_task = tokio::spawn(output_pump(reader, output, cancel.clone()));

        let outcome = tokio::select! {
            result = &mut input_task => {
                cancel.cancel();
                join_pump("output", output_task, teardown_timeout).await;
                pump_outcome(result)
            }
            result = &mut output_task => {
                cancel.cancel();
                join_pump("input", input_task, teardown_timeout).await;
                pump_outcome(result)
            }
            _ = lost.cancelled() => {
                cancel.cancel();
                join_pump("input", input_task, teardown_timeout).await;
                join_pump("output", output_task, teardown_timeout).await;
                SessionOutcome::Errored(StreamError::TunnelLost { host: host.clone() })
            }
        };

        guard.restore();
        finish(outcome)
    }
}

impl<E: ExecEngine> fmt::Debug for Session<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("host", self.client.host())
            .field("container", &self.container)
            .field("command", &self.command)
            .field("exec", &self.exec)
            .field("state", &self.state())
            .finish()
    }
}

fn pump_outcome(result: Result<SessionOutcome, JoinError>) -> SessionOutcome {
    match result {
        Ok(outcome) => outcome,
        Err(e) => SessionOutcome::Errored(StreamError::PumpPanicked(e.to_string())),
    }
}

async fn join_pump(name: &str, mut handle: JoinHandle<SessionOutcome>, limit: Duration) {
    match tokio::time::timeout(limit, &mut handle).await {
        Ok(Ok(_)) => {}
        Ok(Err(e)) => tracing::warn!("{} pump failed during teardown: {}", name, e),
        Err(_) => {
            tracing::warn!("{} pump still running after {:?}, aborting", name, limit);
            handle.abort();
        }
    }
}

async fn input_pump<W, E>(
    mut writer: W,
    mut input: mpsc::Receiver<InputEvent>,
    detach: DetachKey,
    resizer: Resizer<E>,
    cancel: CancellationToken,
) -> SessionOutcome
where
    W: AsyncWrite + Unpin,
    E: ExecEngine,
{
    let outcome = loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => break SessionOutcome::Closed,
            event = input.recv() => event,
        };

        let bytes = match event {
            None => break SessionOutcome::Detached,
            Some(InputEvent::Key(key)) => match translate(&key, &detach) {
                KeyAction::Send(bytes) => bytes,
                KeyAction::Detach => break SessionOutcome::Detached,
                KeyAction::Ignore => continue,
            },
            Some(InputEvent::Paste(text)) => text.into_bytes(),
            Some(InputEvent::Resize(size)) => {
                resizer.resize(size);
                continue;
            }
        };

        if let Err(e) = write_all_flush(&mut writer, &bytes).await {
            break SessionOutcome::Errored(StreamError::Write(e));
        }
    };

    if let Err(e) = writer.shutdown().await {
        tracing::debug!("Failed to shut down exec stream: {}", e);
    }
    outcome
}

async fn write_all_flush<W: AsyncWrite + Unpin>(writer: &mut W, bytes: &[u8]) -> std::io::Result<()> {
    writer.write_all(bytes).await?;
    writer.flush().await
}

async fn output_pump<R, S>(mut reader: R, mut sink: S, cancel: CancellationToken) -> SessionOutcome
where
    R: AsyncRead + Unpin,
    S: OutputSink,
{
    let mut buf = vec![0u8; READ_CHUNK];
    loop {
        let read = tokio::select! {
            _ = cancel.cancelled() => return SessionOutcome::Closed,
            read = reader.read(&mut buf) => read,
        };
        match read {
            Ok(0) => return SessionOutcome::Closed,
            Ok(n) => {
                if let Err(e) = sink.write(&buf[..n]).await {
                    return SessionOutcome::Errored(StreamError::Display(e));
                }
            }
            Err(e) => return SessionOutcome::Errored(StreamError::Read(e)),
        }
    }
}
