//! Local socket paths for forwarding tunnels

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use sb_core::Host;

/// Longest host fragment kept in a socket file name.
/// Unix socket addresses are limited to ~108 bytes.
const MAX_HOST_COMPONENT: usize = 32;

/// Build a fresh socket path for a tunnel to `host` inside `dir`
pub fn socket_path(dir: &Path, host: &Host) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let name = format!(
        "swarm-browser-{}-{}-{:08x}.sock",
        sanitize_host(host.as_str()),
        nanos,
        rand::random::<u32>()
    );
    dir.join(name)
}

fn sanitize_host(host: &str) -> String {
    let cleaned: String = host
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' {
                c
            } else {
                '-'
            }
        })
        .take(MAX_HOST_COMPONENT)
        .collect();
    if cleaned.is_empty() {
        "host".to_string()
    } else {
        cleaned
    }
}

/// Whether `path` exists and is a Unix socket
#[cfg(unix)]
pub fn is_socket(path: &Path) -> bool {
    use std::os::unix::fs::FileTypeExt;

    std::fs::metadata(path)
        .map(|m| m.file_type().is_socket())
        .unwrap_or(false)
}

#[cfg(not(unix))]
pub fn is_socket(path: &Path) -> bool {
    path.exists()
}

/// Remove a socket file, logging anything other than "already gone"
pub fn remove_socket(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => tracing::debug!("Removed tunnel socket {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!("Failed to remove tunnel socket {}: {}", path.display(), e),
    }
}
