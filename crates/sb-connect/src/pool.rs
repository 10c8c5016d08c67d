//! Host connection pool
//!
//! At most one client (and therefore one tunnel) per host. Creation is
//! single-flight: concurrent callers for the same host share one connect
//! attempt through a per-host `OnceCell`. The cell holds the outcome, so a
//! failed attempt is reported to every caller that waited on it and is
//! never re-run inside a slot that has already left the map.

use async_trait::async_trait;
use dashmap::DashMap;
use futures::future::join_all;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::OnceCell;

use sb_core::config::{EngineConfig, TunnelConfig};
use sb_core::error::{ConnectionError, PoolCloseError};
use sb_core::traits::ExecEngine;
use sb_core::Host;

use crate::engine::DockerClient;
use crate::tunnel::{TunnelLink, TunnelManager, TunnelState};

/// An engine client bound to the link that carries it
pub struct ClientHandle<E> {
    host: Host,
    engine: Arc<E>,
    link: Arc<dyn TunnelLink>,
}

impl<E: ExecEngine> ClientHandle<E> {
    pub fn new(host: Host, engine: E, link: Arc<dyn TunnelLink>) -> Self {
        Self {
            host,
            engine: Arc::new(engine),
            link,
        }
    }

    pub fn host(&self) -> &Host {
        &self.host
    }

    pub fn engine(&self) -> &Arc<E> {
        &self.engine
    }

    pub fn link(&self) -> &Arc<dyn TunnelLink> {
        &self.link
    }

    /// Whether the underlying link is still ready
    pub fn is_usable(&self) -> bool {
        self.link.state() == TunnelState::Ready
    }

    /// Close the engine client, then the link. Both always run.
    pub async fn close(&self) -> Result<(), ConnectionError> {
        let engine = self
            .engine
            .close()
            .await
            .map_err(|e| ConnectionError::Client {
                host: self.host.clone(),
                reason: e.to_string(),
            });
        let link = self.link.close().await;
        engine.and(link)
    }
}

impl<E> std::fmt::Debug for ClientHandle<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientHandle")
            .field("host", &self.host)
            .field("link", &self.link.state())
            .finish()
    }
}

/// Creates clients for hosts
#[async_trait]
pub trait HostConnector: Send + Sync + 'static {
    type Engine: ExecEngine;

    async fn connect(&self, host: &Host) -> Result<ClientHandle<Self::Engine>, ConnectionError>;
}

/// Opens an ssh tunnel and binds a [`DockerClient`] to its socket
#[derive(Debug, Clone)]
pub struct SshConnector {
    tunnels: TunnelManager,
    engine: EngineConfig,
}

impl SshConnector {
    pub fn new(tunnel: TunnelConfig, engine: EngineConfig) -> Self {
        Self {
            tunnels: TunnelManager::new(tunnel),
            engine,
        }
    }
}

#[async_trait]
impl HostConnector for SshConnector {
    type Engine = DockerClient;

    async fn connect(&self, host: &Host) -> Result<ClientHandle<DockerClient>, ConnectionError> {
        let tunnel = self.tunnels.open(host).await?;
        let client = match DockerClient::connect(tunnel.socket_path(), &self.engine) {
            Ok(client) => client,
            Err(e) => {
                if let Err(close) = tunnel.close().await {
                    tracing::warn!("Failed to close tunnel to {}: {}", host, close);
                }
                return Err(ConnectionError::Client {
                    host: host.clone(),
                    reason: e.to_string(),
                });
            }
        };
        Ok(ClientHandle::new(host.clone(), client, Arc::new(tunnel)))
    }
}

type Slot<E> = Arc<OnceCell<Result<Arc<ClientHandle<E>>, ConnectionError>>>;

/// Pool of per-host clients
pub struct HostPool<C: HostConnector> {
    connector: C,
    slots: DashMap<Host, Slot<C::Engine>>,
    closed: AtomicBool,
}

impl<C: HostConnector> HostPool<C> {
    pub fn new(connector: C) -> Self {
        Self {
            connector,
            slots: DashMap::new(),
            closed: AtomicBool::new(false),
        }
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Get the client for `host`, connecting if needed
    pub async fn client_for(
        &self,
        host: &Host,
    ) -> Result<Arc<ClientHandle<C::Engine>>, ConnectionError> {
        // A freshly created handle that is already unusable is reported
        // rather than retried forever.
        for _ in 0..2 {
            if self.closed.load(Ordering::Acquire) {
                return Err(ConnectionError::PoolClosed);
            }

            let slot = self
                .slots
                .entry(host.clone())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone();

            let result = slot
                .get_or_init(|| async {
                    tracing::debug!("Connecting to {}", host);
                    let result = self.connector.connect(host).await.map(Arc::new);
                    if let Err(e) = &result {
                        tracing::warn!("Connection to {} failed: {}", host, e);
                    }
                    result
                })
                .await;

            let handle = match result {
                Ok(handle) => Arc::clone(handle),
                Err(e) => {
                    self.evict(host, &slot);
                    return Err(e.clone());
                }
            };

            if self.closed.load(Ordering::Acquire) {
                self.evict(host, &slot);
                if let Err(e) = handle.close().await {
                    tracing::warn!("Closing connection to {} after shutdown failed: {}", host, e);
                }
                return Err(ConnectionError::PoolClosed);
            }

            if handle.is_usable() {
                return Ok(handle);
            }

            tracing::warn!(
                "Evicting stale connection to {} (tunnel {})",
                host,
                handle.link().state()
            );
            self.evict(host, &slot);
            if let Err(e) = handle.close().await {
                tracing::debug!("Closing stale connection to {} failed: {}", host, e);
            }
        }

        Err(ConnectionError::TunnelLost { host: host.clone() })
    }

    /// Drop the slot only if it is still the one we used
    fn evict(&self, host: &Host, slot: &Slot<C::Engine>) {
        self.slots
            .remove_if(host, |_, current| Arc::ptr_eq(current, slot));
    }

    /// Hosts with a live or pending client
    pub fn hosts(&self) -> Vec<Host> {
        self.slots.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Close every cached client concurrently.
    ///
    /// Every close is attempted; failures are collected per host.
    pub async fn close(&self) -> Result<(), PoolCloseError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let handles: Vec<_> = self
            .slots
            .iter()
            .filter_map(|entry| entry.value().get().and_then(|r| r.as_ref().ok()).cloned())
            .collect();
        self.slots.clear();

        tracing::info!("Closing {} pooled connection(s)", handles.len());

        let results = join_all(handles.iter().map(|handle| async move {
            (handle.host().clone(), handle.close().await)
        }))
        .await;

        let failures: Vec<_> = results
            .into_iter()
            .filter_map(|(host, result)| result.err().map(|e| (host, e)))
            .collect();

        if failures.is_empty() {
            Ok(())
        } else {
            for (host, err) in &failures {
                tracing::warn!("Failed to close connection to {}: {}", host, err);
            }
            Err(PoolCloseError { failures })
        }
    }
}
