//! Listing stacks, services and tasks

use anyhow::{anyhow, Context, Result};

use sb_core::types::{Service, Stack};

use super::attach::attach_command;
use crate::browser::ClusterBrowser;
use crate::output::{format_services, format_stacks, format_tasks, print_warning};

/// A command that needs a cluster browser
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrowseAction {
    Stacks,
    Services {
        stack: String,
    },
    Tasks {
        stack: String,
        service: String,
    },
    Attach {
        stack: String,
        service: String,
        task: Option<String>,
        command: Vec<String>,
    },
}

/// Run one action, then close the browser's connections
pub async fn run_browse<B: ClusterBrowser>(
    browser: &B,
    action: BrowseAction,
    detach_key: &str,
) -> Result<()> {
    tracing::debug!("Browsing cluster {}", browser.cluster_name());
    let result = match action {
        BrowseAction::Stacks => stacks_command(browser).await,
        BrowseAction::Services { stack } => services_command(browser, &stack).await,
        BrowseAction::Tasks { stack, service } => tasks_command(browser, &stack, &service).await,
        BrowseAction::Attach {
            stack,
            service,
            task,
            command,
        } => {
            attach_command(
                browser,
                &stack,
                &service,
                task.as_deref(),
                command,
                detach_key,
            )
            .await
        }
    };

    if let Err(e) = browser.close().await {
        print_warning(&format!("Failed to close connections: {}", e));
    }
    result
}

pub async fn stacks_command<B: ClusterBrowser>(browser: &B) -> Result<()> {
    let stacks = browser
        .list_stacks()
        .await
        .with_context(|| format!("Failed to list stacks of cluster '{}'", browser.cluster_name()))?;
    println!("{}", format_stacks(&stacks));
    Ok(())
}

pub async fn services_command<B: ClusterBrowser>(browser: &B, stack: &str) -> Result<()> {
    let services = browser
        .list_services(&Stack {
            name: stack.to_string(),
        })
        .await
        .with_context(|| format!("Failed to list services of stack '{}'", stack))?;
    println!("{}", format_services(&services));
    Ok(())
}

pub async fn tasks_command<B: ClusterBrowser>(browser: &B, stack: &str, service: &str) -> Result<()> {
    let service = find_service(browser, stack, service).await?;
    let tasks = browser
        .list_tasks(&service)
        .await
        .with_context(|| format!("Failed to list tasks of service '{}'", service.name))?;
    println!("{}", format_tasks(&tasks));
    Ok(())
}

/// Look a service up by full name, by name without the stack prefix, or by id
pub async fn find_service<B: ClusterBrowser>(browser: &B, stack: &str, service: &str) -> Result<Service> {
    let services = browser
        .list_services(&Stack {
            name: stack.to_string(),
        })
        .await
        .with_context(|| format!("Failed to list services of stack '{}'", stack))?;
    let prefixed = format!("{}_{}", stack, service);
    services
        .into_iter()
        .find(|s| s.name == service || s.name == prefixed || s.id == service)
        .ok_or_else(|| anyhow!("Service '{}' not found in stack '{}'", service, stack))
}
