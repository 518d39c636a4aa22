// Conversion stage - raw dump to UVH5
//
// Worker body for the convert dispatcher: resolve the companion filenames,
// fetch the conversion context from the shared store, run the converter on a
// blocking thread, register the result with M&C, then hand the output name
// to the upload stage.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use hifitime::{Duration, Epoch};
use marlu::precession::get_lmst;
use tracing::{info, warn};

use crate::domain::{filename, QueueKey, Stage};
use crate::error::{AppError, Result};
use crate::port::{
    ConversionContext, Converter, FileQueue, FileRecord, ObservationRecord, ObservatoryDb,
    TelescopeState,
};

use super::dispatcher::StageJob;

pub struct ConversionService {
    queue: Arc<dyn FileQueue>,
    state: Arc<dyn TelescopeState>,
    converter: Arc<dyn Converter>,
    /// Absent when running without the site database
    observatory_db: Option<Arc<dyn ObservatoryDb>>,
}

impl ConversionService {
    pub fn new(
        queue: Arc<dyn FileQueue>,
        state: Arc<dyn TelescopeState>,
        converter: Arc<dyn Converter>,
        observatory_db: Option<Arc<dyn ObservatoryDb>>,
    ) -> Self {
        Self {
            queue,
            state,
            converter,
            observatory_db,
        }
    }

    async fn cwd(&self) -> Result<Option<String>> {
        self.state.catcher_cwd().await
    }

    async fn register(
        &self,
        report: &crate::port::ConversionReport,
        output_name: &str,
        longitude_rad: f64,
    ) -> Result<()> {
        let Some(db) = &self.observatory_db else {
            return Ok(());
        };

        let epoch = Epoch::from_jde_utc(report.start_jd);
        let lst_start_rad = get_lmst(longitude_rad, epoch, Duration::from_seconds(0.0));
        let obsid = ObservationRecord::obsid_for_jd(report.start_jd);

        db.register_observation(&ObservationRecord {
            obsid,
            jd_start: report.start_jd,
            jd_stop: report.stop_jd,
            lst_start_rad,
            tag: report.tag.clone(),
        })
        .await?;
        db.register_file(&FileRecord {
            filename: output_name.to_string(),
            obsid,
            size_bytes: report.size_bytes as i64,
        })
        .await?;
        Ok(())
    }
}

#[async_trait]
impl StageJob for ConversionService {
    fn stage(&self) -> Stage {
        Stage::Convert
    }

    async fn process(&self, entry: &str) -> Result<()> {
        info!(file = %entry, "processing");

        let cwd = self.cwd().await?;
        let triplet = filename::match_up(entry, cwd.as_deref().map(Path::new))?;
        let ctx = ConversionContext {
            cminfo: self.state.cminfo().await?,
            freq: self.state.freq_setup().await?,
        };
        let longitude_rad = ctx.cminfo.array_position().longitude_rad;

        let converter = Arc::clone(&self.converter);
        let blocking_triplet = triplet.clone();
        let report = tokio::task::spawn_blocking(move || {
            converter.convert(&blocking_triplet, &ctx)
        })
        .await
        .map_err(|e| AppError::Internal(format!("conversion worker died: {e}")))??;

        let output_name = filename::relative_output(&triplet, cwd.as_deref().map(Path::new));

        // M&C registration sits between the file write and the queue push:
        // a crash here re-runs the conversion, and the upserts absorb the
        // duplicate registration.
        self.register(&report, &output_name, longitude_rad).await?;

        self.queue.push(QueueKey::Converted, &output_name).await?;
        self.queue.purgatory_remove(Stage::Convert, entry).await?;
        info!(file = %entry, output = %output_name, nblts = report.nblts, "finished");
        Ok(())
    }

    async fn discard(&self, entry: &str) -> Result<()> {
        let cwd = self.cwd().await.unwrap_or(None);
        match filename::match_up(entry, cwd.as_deref().map(Path::new)) {
            Ok(triplet) => self.converter.discard_partial(&triplet),
            Err(e) => {
                // not a raw dump name; nothing on disk to clean up
                warn!(file = %entry, error = %e, "cannot derive output path for discard");
                Ok(())
            }
        }
    }
}
