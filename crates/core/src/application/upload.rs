// Upload stage - converted outputs to the archive
//
// Worker body for the upload dispatcher. The archive search runs before
// every upload so an entry that was re-delivered (crash, requeue) is
// recorded as done instead of uploaded twice. When the queue drains, the
// per-day counters of fully converted days are advanced to "uploaded".

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::domain::queue::{DAY_CONVERTED, DAY_UPLOADED};
use crate::domain::{QueueKey, Stage};
use crate::error::Result;
use crate::port::{ArchiveClient, FileQueue};

use super::dispatcher::StageJob;

#[derive(Debug, Clone)]
pub struct UploadConfig {
    /// Root the queue entries are relative to
    pub data_dir: PathBuf,
    /// Also archive diff files (normally only sums are kept)
    pub upload_diff: bool,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("/mnt/sn1"),
            upload_diff: false,
        }
    }
}

pub struct UploadService {
    queue: Arc<dyn FileQueue>,
    archive: Arc<dyn ArchiveClient>,
    config: UploadConfig,
}

impl UploadService {
    pub fn new(
        queue: Arc<dyn FileQueue>,
        archive: Arc<dyn ArchiveClient>,
        config: UploadConfig,
    ) -> Self {
        Self {
            queue,
            archive,
            config,
        }
    }
}

#[async_trait]
impl StageJob for UploadService {
    fn stage(&self) -> Stage {
        Stage::Upload
    }

    fn accepts(&self, entry: &str) -> bool {
        self.config.upload_diff || !entry.contains("diff")
    }

    async fn process(&self, entry: &str) -> Result<()> {
        info!(file = %entry, "processing");

        let base_name = entry.rsplit('/').next().unwrap_or(entry);
        if self.archive.has_instance(base_name).await? {
            info!(file = %entry, "archive already has an instance");
        } else {
            let local_path = self.config.data_dir.join(entry);
            info!(file = %entry, "uploading");
            self.archive.upload(&local_path, entry).await?;
        }

        self.queue.push(QueueKey::Uploaded, entry).await?;
        self.queue.purgatory_remove(Stage::Upload, entry).await?;
        info!(file = %entry, "finished");
        Ok(())
    }

    /// Caught up and the queue is empty: mark fully converted days uploaded
    async fn on_drained(&self) -> Result<()> {
        for (day, counter) in self.queue.day_counters().await? {
            if counter == DAY_CONVERTED {
                debug!(%day, "day fully drained, advancing counter");
                self.queue.set_day_counter(&day, DAY_UPLOADED).await?;
            }
        }
        Ok(())
    }
}
