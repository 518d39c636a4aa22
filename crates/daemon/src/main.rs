//! corrflow daemon - conversion and upload stage pools
//!
//! Composition root: wires the Redis store, the converter, the archive
//! client and the optional M&C registration into one dispatcher per
//! configured stage, recovers in-flight work left by a previous process,
//! and runs until interrupted.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use corrflow_core::application::{
    shutdown_channel, ConversionService, Dispatcher, RecoveryService, StageJob, UploadConfig,
    UploadService,
};
use corrflow_core::domain::StageConfig;
use corrflow_core::port::{ArchiveClient, Converter, FileQueue, ObservatoryDb, TelescopeState};
use corrflow_infra_archive::{LibrarianClient, LibrarianConfig};
use corrflow_infra_convert::UvConverter;
use corrflow_infra_mc::PgObservatoryDb;
use corrflow_infra_redis::RedisStore;

const VERSION: &str = env!("CARGO_PKG_VERSION");
const DEFAULT_REDIS_URL: &str = "redis://redishost/";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StageSelection {
    Convert,
    Upload,
    All,
}

impl StageSelection {
    fn from_env() -> Result<Self> {
        match std::env::var("CORRFLOW_STAGE").as_deref() {
            Ok("convert") => Ok(Self::Convert),
            Ok("upload") => Ok(Self::Upload),
            Ok("all") | Err(_) => Ok(Self::All),
            Ok(other) => anyhow::bail!("CORRFLOW_STAGE must be convert|upload|all, got {other:?}"),
        }
    }

    fn runs_convert(self) -> bool {
        matches!(self, Self::Convert | Self::All)
    }

    fn runs_upload(self) -> bool {
        matches!(self, Self::Upload | Self::All)
    }
}

fn env_workers(var: &str) -> Option<usize> {
    std::env::var(var).ok().and_then(|s| s.parse().ok())
}

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize logging (JSON for production, pretty for development)
    let log_format = std::env::var("CORRFLOW_LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("corrflow=info"))
        .expect("Failed to create env filter");

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().pretty())
                .init();
        }
    }

    info!("corrflow daemon v{} starting...", VERSION);

    // 2. Load configuration
    let stages = StageSelection::from_env()?;
    let redis_url =
        std::env::var("CORRFLOW_REDIS_URL").unwrap_or_else(|_| DEFAULT_REDIS_URL.to_string());

    // 3. Connect the shared store
    let store = Arc::new(RedisStore::new(
        corrflow_infra_redis::connect(&redis_url)
            .await
            .context("redis connection failed")?,
    ));
    let queue: Arc<dyn FileQueue> = store.clone();
    let state: Arc<dyn TelescopeState> = store.clone();

    // 4. Build the stage services
    let mut jobs: Vec<Arc<dyn StageJob>> = Vec::new();
    let mut dispatchers = Vec::new();

    if stages.runs_convert() {
        let mut config = StageConfig::convert();
        if let Some(workers) = env_workers("CORRFLOW_CONVERT_WORKERS") {
            config = config.with_workers(workers);
        }

        // M&C registration is optional; conversion still runs on an outage
        let observatory_db: Option<Arc<dyn ObservatoryDb>> =
            match std::env::var("CORRFLOW_MC_URL") {
                Ok(url) => {
                    let pool = corrflow_infra_mc::create_pool(&url)
                        .await
                        .context("M&C connection failed")?;
                    Some(Arc::new(PgObservatoryDb::new(pool)))
                }
                Err(_) => {
                    warn!("CORRFLOW_MC_URL not set, skipping M&C registration");
                    None
                }
            };

        let converter: Arc<dyn Converter> =
            Arc::new(UvConverter::new(config.cpu_affinity.clone()));
        let service: Arc<dyn StageJob> = Arc::new(ConversionService::new(
            queue.clone(),
            state.clone(),
            converter,
            observatory_db,
        ));
        jobs.push(service.clone());
        dispatchers.push(Dispatcher::new(config, queue.clone(), service));
    }

    if stages.runs_upload() {
        let mut config = StageConfig::upload();
        if let Some(workers) = env_workers("CORRFLOW_UPLOAD_WORKERS") {
            config = config.with_workers(workers);
        }

        let archive_url = std::env::var("CORRFLOW_ARCHIVE_URL")
            .context("CORRFLOW_ARCHIVE_URL is required for the upload stage")?;
        let mut archive_config = LibrarianConfig::new(archive_url);
        archive_config.auth_token = std::env::var("CORRFLOW_ARCHIVE_TOKEN").ok();
        let archive: Arc<dyn ArchiveClient> = Arc::new(LibrarianClient::new(archive_config)?);

        let upload_config = UploadConfig {
            data_dir: std::env::var("CORRFLOW_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| UploadConfig::default().data_dir),
            upload_diff: std::env::var("CORRFLOW_UPLOAD_DIFF").is_ok(),
        };

        let service: Arc<dyn StageJob> = Arc::new(UploadService::new(
            queue.clone(),
            archive,
            upload_config,
        ));
        jobs.push(service.clone());
        dispatchers.push(Dispatcher::new(config, queue.clone(), service));
    }

    // 5. Recover in-flight work left by a crashed process
    info!("Running in-flight recovery...");
    let recovery = RecoveryService::new(queue.clone(), jobs);
    match recovery.recover_in_flight().await {
        Ok(count) => info!(recovered = count, "Recovery completed"),
        Err(e) => tracing::error!(error = ?e, "Recovery failed"),
    }

    // 6. Start the dispatchers
    let (shutdown_tx, shutdown_rx) = shutdown_channel();
    let mut handles = Vec::new();
    for dispatcher in dispatchers {
        let token = shutdown_rx.clone();
        handles.push(tokio::spawn(async move {
            if let Err(e) = dispatcher.run(token).await {
                tracing::error!(error = ?e, "Dispatcher failed");
            }
        }));
    }

    info!("All stages running. Press Ctrl+C to shut down.");

    // 7. Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received. Draining workers...");

    // 8. Graceful shutdown: dispatchers requeue their in-flight entries
    shutdown_tx.shutdown();
    for handle in handles {
        let _ = tokio::time::timeout(std::time::Duration::from_secs(30), handle).await;
    }

    info!("Shutdown complete.");
    Ok(())
}
