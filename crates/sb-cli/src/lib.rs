//! swarm-browser library interface
//!
//! Exposes the cluster browsers, command implementations and output helpers
//! behind the `swarm-browser` binary.

pub mod browser;
pub mod commands;
pub mod output;
