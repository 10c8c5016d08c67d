//! Direct exec into a known container

use anyhow::Result;

use sb_connect::{HostConnector, HostPool};
use sb_session::{AttachRequest, SessionBridge};

use super::attach::run_session;
use crate::output::print_warning;

/// Attach to `request.container` on `request.host` without browsing
pub async fn exec_command<C: HostConnector>(
    pool: &HostPool<C>,
    bridge: &SessionBridge,
    request: AttachRequest,
) -> Result<()> {
    let result = match bridge.attach_request(pool, request).await {
        Ok(session) => run_session(session, &bridge.config().detach_key).await,
        Err(e) => Err(e.into()),
    };

    if let Err(e) = pool.close().await {
        print_warning(&format!("Failed to close connections: {}", e));
    }
    result
}
