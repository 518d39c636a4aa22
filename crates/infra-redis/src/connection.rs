// Redis Connection Setup

use corrflow_core::error::{AppError, Result};
use redis::aio::ConnectionManager;
use tracing::info;

/// Open a managed connection to the shared store.
///
/// The manager reconnects on its own, so transient network trouble on site
/// surfaces as per-command errors instead of a dead handle.
pub async fn connect(url: &str) -> Result<ConnectionManager> {
    let client =
        redis::Client::open(url).map_err(|e| AppError::Config(format!("bad redis URL: {e}")))?;
    let manager = ConnectionManager::new(client)
        .await
        .map_err(|e| AppError::Store(format!("redis connect failed: {e}")))?;
    info!(url, "connected to redis");
    Ok(manager)
}
