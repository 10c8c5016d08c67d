//! Forwarding tunnels to remote control-plane sockets
//!
//! A tunnel is a `ssh -N -L <local>:<remote> <host>` subprocess (the program
//! and argument template are configurable) exposing a remote engine socket
//! as a local Unix socket. Once ready, a supervisor task owns the child and
//! reports unexpected exits through [`TunnelLink::lost`].

mod manager;
pub mod socket;

pub use manager::{wait_for_socket, SocketWait, Tunnel, TunnelManager};

use async_trait::async_trait;
use std::fmt;
use tokio_util::sync::CancellationToken;

use sb_core::error::ConnectionError;
use sb_core::Host;

/// Lifecycle of a tunnel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TunnelState {
    /// Subprocess spawned, socket not there yet
    Starting,
    /// Socket available
    Ready,
    /// Subprocess exited on its own
    Failed,
    /// Closed by its owner
    Closed,
}

impl fmt::Display for TunnelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TunnelState::Starting => "starting",
            TunnelState::Ready => "ready",
            TunnelState::Failed => "failed",
            TunnelState::Closed => "closed",
        };
        write!(f, "{}", s)
    }
}

/// What a pooled client needs to know about the transport under it
#[async_trait]
pub trait TunnelLink: Send + Sync {
    /// Host the link reaches
    fn host(&self) -> &Host;

    /// Current state
    fn state(&self) -> TunnelState;

    /// Cancelled once the link stops being usable
    fn lost(&self) -> CancellationToken;

    /// Tear the link down. Calling it again is a no-op.
    async fn close(&self) -> Result<(), ConnectionError>;
}
