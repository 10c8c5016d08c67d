//! Core trait definitions

mod engine;

pub use engine::{DuplexStream, ExecEngine, ExecSpec, ExecStream, SwarmApi};
