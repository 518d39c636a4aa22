// Dispatcher - polling supervisor for one pipeline stage
//
// The contract: once an entry is popped from the source queue it is either
// finished or returned; it is never dropped. The purgatory hash is the
// ledger for that promise. A worker that succeeds clears its own entry; a
// worker that dies leaves it behind, and the dispatcher's sweep of finished
// workers turns leftovers into a requeue or, after too many attempts, a move
// to the failed queue. On shutdown everything still in purgatory goes back
// to the source queue.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::domain::{Stage, StageConfig};
use crate::error::Result;
use crate::port::FileQueue;

/// One stage's per-entry work, as seen by the dispatcher
#[async_trait]
pub trait StageJob: Send + Sync {
    fn stage(&self) -> Stage;

    /// Entries rejected here are dropped without processing
    fn accepts(&self, _entry: &str) -> bool {
        true
    }

    /// Process one entry. On success the implementation pushes the result
    /// onto its done queue and clears its purgatory entry; on failure it
    /// leaves the purgatory entry for the dispatcher's sweep.
    async fn process(&self, entry: &str) -> Result<()>;

    /// Undo partial side effects for an entry being returned to its queue
    async fn discard(&self, _entry: &str) -> Result<()> {
        Ok(())
    }

    /// Called when the source queue is empty and no workers are live
    async fn on_drained(&self) -> Result<()> {
        Ok(())
    }
}

/// Shutdown signal for graceful termination
#[derive(Clone)]
pub struct ShutdownToken {
    rx: watch::Receiver<bool>,
}

impl ShutdownToken {
    pub fn is_shutdown(&self) -> bool {
        *self.rx.borrow()
    }

    pub async fn wait(&mut self) {
        let _ = self.rx.changed().await;
    }
}

pub struct ShutdownSender {
    tx: watch::Sender<bool>,
}

impl ShutdownSender {
    /// Signal shutdown to every dispatcher holding a token
    pub fn shutdown(&self) {
        let _ = self.tx.send(true);
    }
}

pub fn shutdown_channel() -> (ShutdownSender, ShutdownToken) {
    let (tx, rx) = watch::channel(false);
    (ShutdownSender { tx }, ShutdownToken { rx })
}

/// Polling supervisor: bounded pool of workers over one queue
pub struct Dispatcher {
    config: StageConfig,
    queue: Arc<dyn FileQueue>,
    job: Arc<dyn StageJob>,
    /// In-flight workers by queue entry
    running: HashMap<String, JoinHandle<()>>,
    /// Process-local attempt counts; survives requeues, not restarts
    attempts: HashMap<String, u32>,
}

impl Dispatcher {
    pub fn new(config: StageConfig, queue: Arc<dyn FileQueue>, job: Arc<dyn StageJob>) -> Self {
        debug_assert_eq!(config.stage, job.stage());
        Self {
            config,
            queue,
            job,
            running: HashMap::new(),
            attempts: HashMap::new(),
        }
    }

    /// Run the poll loop until shutdown, then drain purgatory back to the
    /// source queue.
    pub async fn run(mut self, mut shutdown: ShutdownToken) -> Result<()> {
        let stage = self.config.stage;
        info!(%stage, workers = self.config.max_workers, "dispatcher started");

        loop {
            if shutdown.is_shutdown() {
                break;
            }

            self.sweep_finished().await?;

            let source = self.config.stage.source();
            let depth = self.queue.depth(source).await?;
            debug!(
                %stage,
                queue_depth = depth,
                workers = self.running.len(),
                max_workers = self.config.max_workers,
                "poll"
            );

            if depth > 0 && self.running.len() < self.config.max_workers {
                if let Some(entry) = self.queue.pop_latest(source).await? {
                    self.dispatch(entry).await?;
                }
            } else if depth == 0 && self.running.is_empty() {
                self.job.on_drained().await?;
                tokio::select! {
                    _ = sleep(self.config.poll_drained) => {}
                    _ = shutdown.wait() => break,
                }
            } else {
                tokio::select! {
                    _ = sleep(self.config.poll_busy) => {}
                    _ = shutdown.wait() => break,
                }
            }
        }

        self.drain().await
    }

    /// Hand one entry to a worker, recording it in purgatory first
    async fn dispatch(&mut self, entry: String) -> Result<()> {
        let stage = self.config.stage;

        if !self.job.accepts(&entry) {
            debug!(%stage, file = %entry, "entry not accepted by stage, dropping");
            return Ok(());
        }

        // Purgatory before the worker exists: a crash between these two
        // points loses nothing, recovery returns the entry to the queue.
        self.queue.purgatory_insert(stage, &entry).await?;

        info!(%stage, file = %entry, "starting worker");
        let job = Arc::clone(&self.job);
        let file = entry.clone();
        let handle = tokio::spawn(async move {
            if let Err(e) = job.process(&file).await {
                error!(file = %file, error = %e, "worker failed, leaving entry in purgatory");
            }
        });
        self.running.insert(entry, handle);
        Ok(())
    }

    /// Reap finished workers; entries they left in purgatory are requeued or
    /// moved to the failed queue.
    async fn sweep_finished(&mut self) -> Result<()> {
        let finished: Vec<String> = self
            .running
            .iter()
            .filter(|(_, handle)| handle.is_finished())
            .map(|(entry, _)| entry.clone())
            .collect();
        if finished.is_empty() {
            return Ok(());
        }

        let stage = self.config.stage;
        let purgatory = self.queue.purgatory_entries(stage).await?;

        for entry in finished {
            if let Some(handle) = self.running.remove(&entry) {
                if let Err(e) = handle.await {
                    error!(file = %entry, error = %e, "worker task panicked or was aborted");
                }
            }

            if !purgatory.contains(&entry) {
                // worker finished cleanly and cleared its own record
                self.attempts.remove(&entry);
                continue;
            }

            let attempts = {
                let count = self.attempts.entry(entry.clone()).or_insert(0);
                *count += 1;
                *count
            };
            self.queue.purgatory_remove(stage, &entry).await?;

            if attempts < self.config.max_attempts {
                warn!(
                    file = %entry,
                    attempts,
                    max_attempts = self.config.max_attempts,
                    "worker left entry in purgatory, returning it to the queue"
                );
                self.queue.defer(stage.source(), &entry).await?;
            } else {
                warn!(
                    file = %entry,
                    attempts,
                    "entry exhausted its attempts, moving to the failed queue"
                );
                self.queue.push(stage.failed(), &entry).await?;
                self.attempts.remove(&entry);
            }
        }
        Ok(())
    }

    /// Abort outstanding workers and push purgatory leftovers back onto the
    /// source queue, discarding partial outputs.
    async fn drain(mut self) -> Result<()> {
        let stage = self.config.stage;
        info!(%stage, workers = self.running.len(), "terminating outstanding workers");

        for handle in self.running.values() {
            handle.abort();
        }
        for (entry, handle) in self.running.drain() {
            if let Err(e) = handle.await {
                if !e.is_cancelled() {
                    error!(file = %entry, error = %e, "worker ended abnormally during shutdown");
                }
            }
        }

        for entry in self.queue.purgatory_entries(stage).await? {
            info!(%stage, file = %entry, "returning in-flight entry to the queue");
            if let Err(e) = self.job.discard(&entry).await {
                warn!(file = %entry, error = %e, "failed to discard partial output");
            }
            self.queue.push(stage.source(), &entry).await?;
            self.queue.purgatory_remove(stage, &entry).await?;
        }

        info!(%stage, "dispatcher stopped");
        Ok(())
    }
}
