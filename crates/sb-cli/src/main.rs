//! swarm-browser CLI
//!
//! Browse the stacks, services and tasks of a Docker Swarm cluster over ssh
//! tunnels and attach an interactive shell to any running task.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sb_connect::{HostPool, SshConnector};
use sb_core::config::{self, ConfigFile};
use sb_core::{ContainerRef, Host};
use sb_session::{AttachRequest, SessionBridge};
use swarm_browser::browser::{DevBrowser, LocalConnector, SwarmBrowser};
use swarm_browser::commands::{self, BrowseAction};
use swarm_browser::output::print_error;

#[derive(Parser)]
#[command(name = "swarm-browser")]
#[command(author, version, about = "Browse Docker Swarm clusters and attach to running containers")]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, env = "SWARM_BROWSER_CONFIG")]
    config: Option<PathBuf>,

    /// Cluster to browse (defaults to `default_cluster`)
    #[arg(long, global = true)]
    cluster: Option<String>,

    /// Serve the [dev] config section and run sessions locally
    #[arg(long, global = true)]
    dev: bool,

    /// Enable verbose output
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Write logs to this file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List configured clusters
    Clusters,

    /// List stacks of the cluster
    Stacks,

    /// List services of a stack
    Services {
        /// Stack name
        stack: String,
    },

    /// List tasks of a service
    Tasks {
        /// Stack name
        stack: String,
        /// Service name, with or without the stack prefix
        service: String,
    },

    /// Open an interactive shell in a running task of a service
    Attach {
        /// Stack name
        stack: String,
        /// Service name, with or without the stack prefix
        service: String,
        /// Attach to this task instead of the first running one
        #[arg(short, long)]
        task: Option<String>,
        /// Command to run instead of the configured shell
        #[arg(short, long)]
        shell: Option<String>,
    },

    /// Attach to a container on a host directly
    Exec {
        /// Host to tunnel to
        #[arg(long)]
        host: String,
        /// Container id or name
        #[arg(long)]
        container: String,
        /// Command to run (defaults to the configured shell)
        #[arg(last = true)]
        command: Vec<String>,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration
    Show,
    /// Get specific config value
    Get { key: String },
    /// Write a default config file
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
    /// Show config file path
    Path,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = init_logging(cli.quiet, cli.verbose, cli.log_file.as_deref()) {
        print_error(&format!("{:#}", e));
        std::process::exit(1);
    }

    if let Err(e) = run(cli).await {
        tracing::debug!("Command failed: {:?}", e);
        print_error(&format!("{:#}", e));
        std::process::exit(1);
    }
}

fn init_logging(quiet: bool, verbose: u8, log_file: Option<&Path>) -> Result<()> {
    let log_level = match (quiet, verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        (false, _) => "trace",
    };
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.into()),
    );

    match log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file: {:?}", path))?;
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_target(false)
                        .with_ansi(false)
                        .with_writer(std::sync::Mutex::new(file)),
                )
                .init();
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_target(false)
                        .with_writer(std::io::stderr),
                )
                .init();
        }
    }
    Ok(())
}

/// Explicit paths must exist; a missing default file means defaults
fn load_config(path: Option<&PathBuf>) -> Result<ConfigFile> {
    match path {
        Some(path) => ConfigFile::load(path)
            .with_context(|| format!("Failed to load config from {:?}", path)),
        None => {
            let path = config::default_config_path();
            if path.exists() {
                ConfigFile::load(&path)
                    .with_context(|| format!("Failed to load config from {:?}", path))
            } else {
                tracing::debug!("No config at {:?}, using defaults", path);
                Ok(ConfigFile::default())
            }
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let action = match cli.command {
        Commands::Config { action } => {
            return match action {
                ConfigAction::Show => commands::config_show(cli.config.as_ref()),
                ConfigAction::Get { key } => commands::config_get(cli.config.as_ref(), &key),
                ConfigAction::Init { force } => commands::config_init(cli.config.as_ref(), force),
                ConfigAction::Path => {
                    commands::config_path(cli.config.as_ref());
                    Ok(())
                }
            };
        }
        Commands::Clusters => {
            let config = load_config(cli.config.as_ref())?;
            return commands::clusters_command(&config);
        }
        Commands::Exec {
            host,
            container,
            command,
        } => {
            let config = load_config(cli.config.as_ref())?;
            let bridge = SessionBridge::new(config.session.clone())?;
            let request = AttachRequest {
                host: Host::new(host),
                container: ContainerRef::new(container),
                command,
            };
            return if cli.dev {
                let connector = LocalConnector::default();
                connector.register(
                    request.container.clone(),
                    vec![("MOCK_CONTAINER_ID".to_string(), request.container.to_string())],
                );
                commands::exec_command(&HostPool::new(connector), &bridge, request).await
            } else {
                let connector = SshConnector::new(config.tunnel.clone(), config.engine.clone());
                commands::exec_command(&HostPool::new(connector), &bridge, request).await
            };
        }
        Commands::Stacks => BrowseAction::Stacks,
        Commands::Services { stack } => BrowseAction::Services { stack },
        Commands::Tasks { stack, service } => BrowseAction::Tasks { stack, service },
        Commands::Attach {
            stack,
            service,
            task,
            shell,
        } => BrowseAction::Attach {
            stack,
            service,
            task,
            command: shell
                .map(|s| s.split_whitespace().map(String::from).collect())
                .unwrap_or_default(),
        },
    };

    let config = load_config(cli.config.as_ref())?;
    let detach_key = config.session.detach_key.clone();
    if cli.dev {
        let browser = DevBrowser::from_config(&config, cli.cluster.as_deref())?;
        commands::run_browse(&browser, action, &detach_key).await
    } else {
        let browser = SwarmBrowser::from_config(&config, cli.cluster.as_deref())?;
        commands::run_browse(&browser, action, &detach_key).await
    }
}
