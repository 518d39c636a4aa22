// Observatory Database Port (Interface)
//
// The M&C database records which observations and files exist. Registration
// must be idempotent: conversion retries re-register the same obsid.

use crate::error::Result;
use async_trait::async_trait;

/// One observation, keyed by obsid (whole seconds of the start JD)
#[derive(Debug, Clone, PartialEq)]
pub struct ObservationRecord {
    pub obsid: i64,
    pub jd_start: f64,
    pub jd_stop: f64,
    /// Local sidereal time at the start, radians
    pub lst_start_rad: f64,
    pub tag: String,
}

impl ObservationRecord {
    /// Obsid convention: whole seconds of the start Julian date
    pub fn obsid_for_jd(jd_start: f64) -> i64 {
        (jd_start * 86400.0).floor() as i64
    }
}

/// One produced file belonging to an observation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub filename: String,
    pub obsid: i64,
    pub size_bytes: i64,
}

#[async_trait]
pub trait ObservatoryDb: Send + Sync {
    async fn register_observation(&self, obs: &ObservationRecord) -> Result<()>;

    async fn register_file(&self, file: &FileRecord) -> Result<()>;
}

// ============================================================================
// Mock Implementation for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::sync::Mutex;

    /// Records registrations for assertion
    #[derive(Default)]
    pub struct RecordingDb {
        observations: Mutex<Vec<ObservationRecord>>,
        files: Mutex<Vec<FileRecord>>,
    }

    impl RecordingDb {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn observations(&self) -> Vec<ObservationRecord> {
            self.observations.lock().unwrap().clone()
        }

        pub fn files(&self) -> Vec<FileRecord> {
            self.files.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ObservatoryDb for RecordingDb {
        async fn register_observation(&self, obs: &ObservationRecord) -> Result<()> {
            self.observations.lock().unwrap().push(obs.clone());
            Ok(())
        }

        async fn register_file(&self, file: &FileRecord) -> Result<()> {
            self.files.lock().unwrap().push(file.clone());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn obsid_is_whole_seconds_of_jd() {
        assert_eq!(
            ObservationRecord::obsid_for_jd(2459866.51702),
            (2459866.51702f64 * 86400.0) as i64
        );
    }
}
