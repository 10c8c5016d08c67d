//! Config command implementations

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};

use crate::output::{format_clusters, print_info, print_success, print_warning};
use sb_core::config::{self, ConfigFile};

fn resolve(config_path: Option<&PathBuf>) -> PathBuf {
    config_path
        .cloned()
        .unwrap_or_else(config::default_config_path)
}

/// List configured clusters
pub fn clusters_command(config: &ConfigFile) -> Result<()> {
    println!(
        "{}",
        format_clusters(&config.clusters, config.default_cluster.as_deref())
    );
    Ok(())
}

/// Print the config file in use
pub fn config_show(config_path: Option<&PathBuf>) -> Result<()> {
    let path = resolve(config_path);

    if !path.exists() {
        print_warning(&format!("No configuration file found at {:?}", path));
        print_info("Run 'swarm-browser config init' to create one");
        return Ok(());
    }

    print_info(&format!("Configuration file: {:?}", path));

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;
    println!("{}", content);

    Ok(())
}

pub fn config_path(config_path: Option<&PathBuf>) {
    println!("{}", resolve(config_path).display());
}

/// Print one value by dotted key, e.g. `tunnel.program`
pub fn config_get(config_path: Option<&PathBuf>, key: &str) -> Result<()> {
    let path = resolve(config_path);
    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;
    let root: toml::Value = toml::from_str(&content).context("Failed to parse config file")?;

    let value = lookup(&root, key).ok_or_else(|| anyhow!("Key not found: {}", key))?;
    match value {
        toml::Value::String(s) => println!("{}", s),
        toml::Value::Array(items) => {
            for item in items {
                match item {
                    toml::Value::String(s) => println!("{}", s),
                    other => println!("{}", other),
                }
            }
        }
        toml::Value::Table(_) => println!("{}", toml::to_string_pretty(value)?),
        other => println!("{}", other),
    }
    Ok(())
}

fn lookup<'a>(root: &'a toml::Value, key: &str) -> Option<&'a toml::Value> {
    key.split('.').try_fold(root, |value, part| value.get(part))
}

/// Write a default configuration file
pub fn config_init(config_path: Option<&PathBuf>, force: bool) -> Result<()> {
    let path = resolve(config_path);

    if path.exists() && !force {
        print_warning(&format!("Config file already exists: {:?}", path));
        print_info("Use --force to overwrite");
        return Ok(());
    }

    write_default(&path)?;
    print_success(&format!("Created configuration file: {:?}", path));
    print_info("Add a [clusters.<name>] section with the manager host to get started");
    Ok(())
}

fn write_default(path: &Path) -> Result<()> {
    config::save_config(path, &ConfigFile::default())
        .with_context(|| format!("Failed to write config file: {:?}", path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_dotted_keys() {
        let root: toml::Value = toml::from_str(
            r#"
[tunnel]
program = "ssh"
[clusters.prod]
host = "manager-01"
"#,
        )
        .unwrap();
        assert_eq!(
            lookup(&root, "tunnel.program").and_then(|v| v.as_str()),
            Some("ssh")
        );
        assert_eq!(
            lookup(&root, "clusters.prod.host").and_then(|v| v.as_str()),
            Some("manager-01")
        );
        assert!(lookup(&root, "tunnel.missing").is_none());
        assert!(lookup(&root, "tunnel.program.deeper").is_none());
    }

    #[test]
    fn test_default_config_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        write_default(&path).unwrap();

        let loaded = ConfigFile::load(&path).unwrap();
        assert!(loaded.clusters.is_empty());
        assert_eq!(loaded.tunnel.program, "ssh");
    }
}
