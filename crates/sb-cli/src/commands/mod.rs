//! CLI command implementations

mod attach;
mod browse;
mod config;
mod exec;

pub use attach::{attach_command, run_session};
pub use browse::{find_service, run_browse, services_command, stacks_command, tasks_command, BrowseAction};
pub use config::{clusters_command, config_get, config_init, config_path, config_show};
pub use exec::exec_command;
