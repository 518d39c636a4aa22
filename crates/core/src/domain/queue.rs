// Queue Domain Model
//
// Queue and purgatory names are the shared vocabulary between the pipeline
// stages, the store adapter and the CLI; keep every key in one place.

use std::fmt;
use std::time::Duration;

/// Key of the per-day completion counter hash (day -> stage counter)
pub const JD_COUNTER_KEY: &str = "corr:files:jds";

/// Day-counter value meaning "every file of this day has been converted"
pub const DAY_CONVERTED: i64 = 1;
/// Day-counter value meaning "every file of this day has been uploaded"
pub const DAY_UPLOADED: i64 = 2;

/// The shared lists the pipeline moves filenames through
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueKey {
    /// Raw dumps written by the catcher, awaiting conversion
    Raw,
    /// Converted outputs awaiting upload
    Converted,
    /// Dumps that exhausted their conversion attempts
    ConvertFailed,
    /// Outputs that exhausted their upload attempts
    UploadFailed,
    /// Outputs confirmed present in the archive
    Uploaded,
}

impl QueueKey {
    pub fn key(&self) -> &'static str {
        match self {
            QueueKey::Raw => "corr:files:raw",
            QueueKey::Converted => "corr:files:converted",
            QueueKey::ConvertFailed => "corr:files:failed",
            QueueKey::UploadFailed => "corr:files:lib_failed",
            QueueKey::Uploaded => "corr:files:uploaded",
        }
    }
}

impl fmt::Display for QueueKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// A pipeline stage with its own queue, purgatory and worker pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Convert,
    Upload,
}

impl Stage {
    /// The queue this stage consumes
    pub fn source(&self) -> QueueKey {
        match self {
            Stage::Convert => QueueKey::Raw,
            Stage::Upload => QueueKey::Converted,
        }
    }

    /// Where items go after exhausting their attempts
    pub fn failed(&self) -> QueueKey {
        match self {
            Stage::Convert => QueueKey::ConvertFailed,
            Stage::Upload => QueueKey::UploadFailed,
        }
    }

    /// The in-flight tracking hash for this stage
    pub fn purgatory_key(&self) -> &'static str {
        match self {
            Stage::Convert => "corr:files:purgatory",
            Stage::Upload => "corr:files:lib_purgatory",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Convert => write!(f, "convert"),
            Stage::Upload => write!(f, "upload"),
        }
    }
}

/// Pool-level knobs for one stage's dispatcher
#[derive(Debug, Clone)]
pub struct StageConfig {
    pub stage: Stage,
    pub max_workers: usize,
    /// Sleep when workers are busy or the queue has entries we cannot take
    pub poll_busy: Duration,
    /// Sleep when the queue is drained and no workers are live
    pub poll_drained: Duration,
    /// Attempts per item before it is moved to the failed queue
    pub max_attempts: u32,
    /// CPUs the stage's blocking work may run on (empty = unpinned)
    pub cpu_affinity: Vec<usize>,
}

impl StageConfig {
    /// Conversion defaults: the first six CPUs, the rest belong to the catcher
    pub fn convert() -> Self {
        Self {
            stage: Stage::Convert,
            max_workers: 6,
            poll_busy: Duration::from_secs(1),
            poll_drained: Duration::from_secs(10),
            max_attempts: 3,
            cpu_affinity: (0..6).collect(),
        }
    }

    /// Upload defaults: I/O bound, so several workers per pinned CPU
    pub fn upload() -> Self {
        let cpus = vec![3, 4, 5, 6];
        Self {
            stage: Stage::Upload,
            max_workers: 3 * cpus.len(),
            poll_busy: Duration::from_secs(2),
            poll_drained: Duration::from_secs(10),
            max_attempts: 3,
            cpu_affinity: cpus,
        }
    }

    pub fn with_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_wiring() {
        assert_eq!(Stage::Convert.source().key(), "corr:files:raw");
        assert_eq!(Stage::Convert.failed().key(), "corr:files:failed");
        assert_eq!(Stage::Upload.source().key(), "corr:files:converted");
        assert_eq!(Stage::Upload.purgatory_key(), "corr:files:lib_purgatory");
    }

    #[test]
    fn default_pools() {
        let c = StageConfig::convert();
        assert_eq!(c.max_workers, 6);
        assert_eq!(c.cpu_affinity, vec![0, 1, 2, 3, 4, 5]);

        let u = StageConfig::upload();
        assert_eq!(u.max_workers, 12);
    }
}
