//! sb-connect: tunnels, pooled engine clients and the Docker Engine client
//!
//! - [`tunnel`]: spawns and supervises `ssh -N -L` forwards
//! - [`pool`]: one client per host, created single-flight
//! - [`engine`]: Docker Engine client (bollard) over the forwarded socket

pub mod engine;
pub mod pool;
pub mod tunnel;

pub use engine::DockerClient;
pub use pool::{ClientHandle, HostConnector, HostPool, SshConnector};
pub use tunnel::{Tunnel, TunnelLink, TunnelManager, TunnelState};
