//! Startup recovery: purgatory leftovers from a dead process go back onto
//! their stage's source queue.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use corrflow_core::application::{RecoveryService, StageJob};
use corrflow_core::domain::{QueueKey, Stage};
use corrflow_core::error::Result;
use corrflow_core::port::file_queue::mocks::MemoryFileQueue;
use corrflow_core::port::FileQueue;

/// Stage stub that only records discards
struct InertJob {
    stage: Stage,
    discarded: Mutex<Vec<String>>,
}

impl InertJob {
    fn new(stage: Stage) -> Self {
        Self {
            stage,
            discarded: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl StageJob for InertJob {
    fn stage(&self) -> Stage {
        self.stage
    }

    async fn process(&self, _entry: &str) -> Result<()> {
        panic!("recovery must not process entries");
    }

    async fn discard(&self, entry: &str) -> Result<()> {
        self.discarded.lock().unwrap().push(entry.to_string());
        Ok(())
    }
}

#[tokio::test]
async fn leftovers_return_to_their_source_queues() {
    let queue = Arc::new(MemoryFileQueue::new());
    queue
        .purgatory_insert(Stage::Convert, "zen.1.1.sum.dat")
        .await
        .unwrap();
    queue
        .purgatory_insert(Stage::Convert, "zen.1.2.sum.dat")
        .await
        .unwrap();
    queue
        .purgatory_insert(Stage::Upload, "zen.1.1.sum.uvh5")
        .await
        .unwrap();

    let convert_job = Arc::new(InertJob::new(Stage::Convert));
    let upload_job = Arc::new(InertJob::new(Stage::Upload));
    let recovery = RecoveryService::new(
        queue.clone(),
        vec![
            convert_job.clone() as Arc<dyn StageJob>,
            upload_job.clone() as Arc<dyn StageJob>,
        ],
    );

    let recovered = recovery.recover_in_flight().await.unwrap();
    assert_eq!(recovered, 3);

    let mut raw = queue.items(QueueKey::Raw);
    raw.sort();
    assert_eq!(raw, vec!["zen.1.1.sum.dat", "zen.1.2.sum.dat"]);
    assert_eq!(
        queue.items(QueueKey::Converted),
        vec!["zen.1.1.sum.uvh5"]
    );

    for stage in [Stage::Convert, Stage::Upload] {
        assert!(queue.purgatory_entries(stage).await.unwrap().is_empty());
    }

    // partial outputs were discarded before requeueing
    assert_eq!(convert_job.discarded.lock().unwrap().len(), 2);
    assert_eq!(upload_job.discarded.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn empty_purgatory_recovers_nothing() {
    let queue = Arc::new(MemoryFileQueue::new());
    let recovery = RecoveryService::new(
        queue.clone(),
        vec![Arc::new(InertJob::new(Stage::Convert)) as Arc<dyn StageJob>],
    );
    assert_eq!(recovery.recover_in_flight().await.unwrap(), 0);
    assert!(queue.items(QueueKey::Raw).is_empty());
}
