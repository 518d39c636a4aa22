// M&C Connection Pool Setup

use std::time::Duration;

use sqlx::postgres::{PgPool, PgPoolOptions};

use corrflow_core::error::{AppError, Result};

/// Connect to the M&C database.
///
/// A small pool: registration is two statements per converted file, and the
/// site database serves many other clients.
pub async fn create_pool(database_url: &str) -> Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(4)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url)
        .await
        .map_err(|e| AppError::Database(format!("M&C pool creation failed: {e}")))
}
