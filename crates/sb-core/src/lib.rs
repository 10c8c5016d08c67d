//! sb-core: Core abstractions and configuration for swarm-browser
//!
//! This crate provides the domain types, error taxonomy, configuration
//! file model and engine traits shared by the connection, session and CLI
//! crates.

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use error::SbError;
pub use types::{ContainerRef, ExecId, Host, SessionId, TerminalSize};

/// Label carrying the stack a service belongs to
pub const STACK_NAMESPACE_LABEL: &str = "com.docker.stack.namespace";
