//! Output formatting utilities for the CLI
//!
//! Tables for clusters, stacks, services and tasks, plus colored status
//! messages.

use std::collections::BTreeMap;

use tabled::{settings::Style, Table, Tabled};

use sb_core::config::ClusterProfile;
use sb_core::types::{Service, Stack, Task};

/// Format the configured clusters as a table
///
/// The cluster named by `default` is marked with `*`. Returns
/// "No clusters configured" when there are none.
pub fn format_clusters(clusters: &BTreeMap<String, ClusterProfile>, default: Option<&str>) -> String {
    if clusters.is_empty() {
        return "No clusters configured".to_string();
    }

    #[derive(Tabled)]
    struct ClusterRow {
        #[tabled(rename = "")]
        default: &'static str,
        #[tabled(rename = "CLUSTER")]
        key: String,
        #[tabled(rename = "NAME")]
        name: String,
        #[tabled(rename = "MANAGER")]
        host: String,
        #[tabled(rename = "NODES")]
        nodes: String,
    }

    let rows: Vec<ClusterRow> = clusters
        .iter()
        .map(|(key, profile)| ClusterRow {
            default: if Some(key.as_str()) == default { "*" } else { "" },
            key: key.clone(),
            name: profile.name.clone(),
            host: profile.host.to_string(),
            nodes: match profile.node_names() {
                names if names.is_empty() => "-".to_string(),
                names => names.join(", "),
            },
        })
        .collect();

    Table::new(rows).with(Style::rounded()).to_string()
}

/// Format stacks as a single-column table
pub fn format_stacks(stacks: &[Stack]) -> String {
    if stacks.is_empty() {
        return "No stacks found".to_string();
    }

    #[derive(Tabled)]
    struct StackRow {
        #[tabled(rename = "STACK")]
        name: String,
    }

    let rows: Vec<StackRow> = stacks
        .iter()
        .map(|s| StackRow {
            name: s.name.clone(),
        })
        .collect();

    Table::new(rows).with(Style::rounded()).to_string()
}

pub fn format_services(services: &[Service]) -> String {
    if services.is_empty() {
        return "No services found".to_string();
    }

    #[derive(Tabled)]
    struct ServiceRow {
        #[tabled(rename = "ID")]
        id: String,
        #[tabled(rename = "NAME")]
        name: String,
        #[tabled(rename = "REPLICAS")]
        replicas: String,
    }

    let rows: Vec<ServiceRow> = services
        .iter()
        .map(|s| ServiceRow {
            id: truncate(&s.id, 12),
            name: s.name.clone(),
            replicas: format!("{}/{}", s.running_tasks, s.desired_tasks),
        })
        .collect();

    Table::new(rows).with(Style::rounded()).to_string()
}

/// Format tasks with their node and state
pub fn format_tasks(tasks: &[Task]) -> String {
    if tasks.is_empty() {
        return "No tasks found".to_string();
    }

    #[derive(Tabled)]
    struct TaskRow {
        #[tabled(rename = "TASK ID")]
        id: String,
        #[tabled(rename = "CONTAINER")]
        container: String,
        #[tabled(rename = "NODE")]
        node: String,
        #[tabled(rename = "HOST")]
        host: String,
        #[tabled(rename = "STATE")]
        state: String,
    }

    let rows: Vec<TaskRow> = tasks
        .iter()
        .map(|t| TaskRow {
            id: t.task_id.clone(),
            container: if t.container.as_str().is_empty() {
                "-".to_string()
            } else {
                truncate(t.container.as_str(), 20)
            },
            node: t.node_hostname.clone(),
            host: t.host.to_string(),
            state: t.state.to_string(),
        })
        .collect();

    Table::new(rows).with(Style::rounded()).to_string()
}

/// Truncate a string with ellipsis if too long
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Print a success message in green with a checkmark prefix
pub fn print_success(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stdout = std::io::stdout();
    let _ = crossterm::execute!(
        stdout,
        SetForegroundColor(Color::Green),
        Print("✓ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print an error message in red with an X prefix, to stderr
pub fn print_error(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stderr = std::io::stderr();
    let _ = crossterm::execute!(
        stderr,
        SetForegroundColor(Color::Red),
        Print("✗ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print a warning message in yellow, to stderr
pub fn print_warning(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stderr = std::io::stderr();
    let _ = crossterm::execute!(
        stderr,
        SetForegroundColor(Color::Yellow),
        Print("⚠ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print an informational message in cyan
///
/// Goes to stderr so that tables on stdout stay pipeable.
pub fn print_info(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stderr = std::io::stderr();
    let _ = crossterm::execute!(
        stderr,
        SetForegroundColor(Color::Cyan),
        Print("ℹ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use sb_core::config::NodeProfile;
    use sb_core::types::TaskState;
    use sb_core::{ContainerRef, Host};

    #[test]
    fn test_empty_lists_have_messages() {
        assert_eq!(format_clusters(&BTreeMap::new(), None), "No clusters configured");
        assert_eq!(format_stacks(&[]), "No stacks found");
        assert_eq!(format_services(&[]), "No services found");
        assert_eq!(format_tasks(&[]), "No tasks found");
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 12), "short");
        assert_eq!(truncate("abcdefghijklmnop", 12), "abcdefghi...");
    }

    #[test]
    fn test_clusters_table_marks_default() {
        let mut nodes = BTreeMap::new();
        nodes.insert(
            "worker-02".to_string(),
            NodeProfile {
                host: Host::new("worker-02.example.com"),
                hostname: "worker-02".to_string(),
            },
        );
        let mut clusters = BTreeMap::new();
        clusters.insert(
            "prod".to_string(),
            ClusterProfile {
                name: "Production".into(),
                host: Host::new("manager-01.example.com"),
                nodes,
            },
        );
        let table = format_clusters(&clusters, Some("prod"));
        assert!(table.contains("Production"));
        assert!(table.contains("manager-01.example.com"));
        assert!(table.contains("worker-02"));
        assert!(table.contains('*'));
    }

    #[test]
    fn test_tasks_table() {
        let tasks = vec![Task {
            task_id: "t1".into(),
            container: ContainerRef::new("ac43c88fac17"),
            host: Host::new("worker-02.example.com"),
            node_hostname: "worker-02".into(),
            state: TaskState::Running,
        }];
        let table = format_tasks(&tasks);
        assert!(table.contains("ac43c88fac17"));
        assert!(table.contains("running"));
        assert!(table.contains("TASK ID"));
    }
}
