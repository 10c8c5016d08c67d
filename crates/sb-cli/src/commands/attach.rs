//! Interactive sessions on the local terminal

use anyhow::{anyhow, Context, Result};
use std::sync::Arc;

use sb_core::traits::ExecEngine;
use sb_session::{stdout_sink, terminal_input, CrosstermTerminal, Session, SessionOutcome};

use super::browse::find_service;
use crate::browser::ClusterBrowser;
use crate::output::print_info;

/// Attach to a service's task and hand it the terminal
pub async fn attach_command<B: ClusterBrowser>(
    browser: &B,
    stack: &str,
    service: &str,
    task: Option<&str>,
    command: Vec<String>,
    detach_key: &str,
) -> Result<()> {
    let service = find_service(browser, stack, service).await?;
    let session = match task {
        Some(id) => {
            let tasks = browser
                .list_tasks(&service)
                .await
                .with_context(|| format!("Failed to list tasks of service '{}'", service.name))?;
            let task = tasks
                .iter()
                .find(|t| t.task_id == id)
                .or_else(|| tasks.iter().find(|t| t.task_id.starts_with(id)))
                .ok_or_else(|| anyhow!("Task '{}' not found in service '{}'", id, service.name))?;
            browser.attach_to_task(task, command).await?
        }
        None => browser.attach_to_service(&service, command).await?,
    };
    run_session(session, detach_key).await
}

/// Run a session against the process's terminal until it ends
pub async fn run_session<E: ExecEngine>(session: Session<E>, detach_key: &str) -> Result<()> {
    print_info(&format!(
        "Attached to {} on {} running {:?} (press {} to detach)",
        session.container(),
        session.host(),
        session.command(),
        detach_key
    ));

    let (input, reader) = terminal_input();
    let outcome = session
        .start(Arc::new(CrosstermTerminal), input, stdout_sink())
        .await;
    // The reader exits on its next poll once the receiver is gone
    if let Err(e) = reader.await {
        tracing::debug!("Terminal reader ended abnormally: {}", e);
    }

    match outcome {
        SessionOutcome::Detached => {
            print_info("Detached");
            Ok(())
        }
        SessionOutcome::Closed => {
            print_info("Session closed");
            Ok(())
        }
        SessionOutcome::Errored(e) => Err(e).context("Session ended with an error"),
    }
}
