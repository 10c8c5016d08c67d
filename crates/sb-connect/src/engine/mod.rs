//! Docker Engine API client over a forwarded socket

mod docker;
mod stream;

pub use docker::DockerClient;
pub use stream::ExecIo;
