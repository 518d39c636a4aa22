// Observation & file registration against the M&C schema

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::debug;

use corrflow_core::error::{AppError, Result};
use corrflow_core::port::{FileRecord, ObservationRecord, ObservatoryDb};

// Helper to convert sqlx::Error to AppError with structured information
fn map_sqlx_error(err: sqlx::Error) -> AppError {
    match &err {
        sqlx::Error::Database(db_err) => {
            if let Some(code) = db_err.code() {
                // PostgreSQL SQLSTATE codes
                match code.as_ref() {
                    "23505" => AppError::Database(format!(
                        "Unique constraint violation: {}",
                        db_err.message()
                    )),
                    "23503" => AppError::Database(format!(
                        "Foreign key constraint violation: {}",
                        db_err.message()
                    )),
                    code => AppError::Database(format!(
                        "Database error [{code}]: {}",
                        db_err.message()
                    )),
                }
            } else {
                AppError::Database(format!("Database error: {}", db_err.message()))
            }
        }
        sqlx::Error::RowNotFound => AppError::Database("Row not found".to_string()),
        sqlx::Error::PoolTimedOut => AppError::Database("M&C pool timed out".to_string()),
        _ => AppError::Database(err.to_string()),
    }
}

pub struct PgObservatoryDb {
    pool: PgPool,
}

impl PgObservatoryDb {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ObservatoryDb for PgObservatoryDb {
    async fn register_observation(&self, obs: &ObservationRecord) -> Result<()> {
        // Upsert: conversion retries re-register the same obsid and must not
        // error or duplicate.
        sqlx::query(
            r#"
            INSERT INTO corr_observations (obsid, jd_start, jd_stop, lst_start, tag)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (obsid) DO NOTHING
            "#,
        )
        .bind(obs.obsid)
        .bind(obs.jd_start)
        .bind(obs.jd_stop)
        .bind(obs.lst_start_rad)
        .bind(&obs.tag)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        debug!(obsid = obs.obsid, "observation registered");
        Ok(())
    }

    async fn register_file(&self, file: &FileRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO corr_files (filename, obsid, size_bytes, created_at)
            VALUES ($1, $2, $3, NOW())
            ON CONFLICT (filename) DO UPDATE
                SET obsid = EXCLUDED.obsid,
                    size_bytes = EXCLUDED.size_bytes
            "#,
        )
        .bind(&file.filename)
        .bind(file.obsid)
        .bind(file.size_bytes)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        debug!(filename = %file.filename, obsid = file.obsid, "file registered");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_errors_become_database_errors() {
        let err = map_sqlx_error(sqlx::Error::RowNotFound);
        assert!(matches!(err, AppError::Database(_)));

        let err = map_sqlx_error(sqlx::Error::PoolTimedOut);
        assert!(matches!(err, AppError::Database(m) if m.contains("timed out")));
    }
}
