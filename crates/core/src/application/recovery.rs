// Crash recovery
//
// On daemon startup, purgatory entries left by a previous process are
// in-flight work that died with it. Each one is returned to its stage's
// source queue, after discarding whatever partial output it left on disk.

use std::sync::Arc;

use tracing::{info, warn};

use crate::error::Result;
use crate::port::FileQueue;

use super::dispatcher::StageJob;

/// Startup recovery service
pub struct RecoveryService {
    queue: Arc<dyn FileQueue>,
    jobs: Vec<Arc<dyn StageJob>>,
}

impl RecoveryService {
    pub fn new(queue: Arc<dyn FileQueue>, jobs: Vec<Arc<dyn StageJob>>) -> Self {
        Self { queue, jobs }
    }

    /// Requeue every purgatory leftover; returns how many were recovered
    pub async fn recover_in_flight(&self) -> Result<usize> {
        let mut recovered = 0;

        for job in &self.jobs {
            let stage = job.stage();
            let leftovers = self.queue.purgatory_entries(stage).await?;
            if leftovers.is_empty() {
                continue;
            }

            info!(%stage, count = leftovers.len(), "recovering in-flight entries");
            for entry in leftovers {
                if let Err(e) = job.discard(&entry).await {
                    warn!(file = %entry, error = %e, "failed to discard partial output");
                }
                self.queue.push(stage.source(), &entry).await?;
                self.queue.purgatory_remove(stage, &entry).await?;
                info!(%stage, file = %entry, "returned to queue");
                recovered += 1;
            }
        }

        info!(recovered, "in-flight recovery complete");
        Ok(recovered)
    }
}
