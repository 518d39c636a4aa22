// Converter Port (Interface)
//
// The conversion itself is blocking, CPU-bound work; callers run it on a
// blocking thread. The context is fetched from the shared store by the
// caller so the converter stays a pure file-to-file function.

use std::path::PathBuf;

use crate::domain::{CmInfo, FileTriplet, FreqSetup};
use crate::error::Result;

/// Everything a conversion needs besides the files themselves
#[derive(Debug, Clone)]
pub struct ConversionContext {
    pub cminfo: CmInfo,
    pub freq: FreqSetup,
}

/// What a finished conversion produced
#[derive(Debug, Clone)]
pub struct ConversionReport {
    pub output: PathBuf,
    pub nblts: usize,
    pub ntimes: usize,
    /// Julian date of the first and last integration in the file
    pub start_jd: f64,
    pub stop_jd: f64,
    pub size_bytes: u64,
    /// Observation tag carried in the dump's metadata
    pub tag: String,
}

pub trait Converter: Send + Sync {
    /// Convert one raw dump + metadata pair into the output file
    fn convert(&self, triplet: &FileTriplet, ctx: &ConversionContext) -> Result<ConversionReport>;

    /// Remove a partially written output left by a failed or aborted run
    fn discard_partial(&self, triplet: &FileTriplet) -> Result<()>;
}

// ============================================================================
// Mock Implementation for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::sync::Mutex;

    /// Converter that succeeds or fails on demand, recording calls
    pub struct MockConverter {
        fail: bool,
        converted: Mutex<Vec<String>>,
        discarded: Mutex<Vec<String>>,
    }

    impl MockConverter {
        pub fn new_success() -> Self {
            Self {
                fail: false,
                converted: Mutex::new(Vec::new()),
                discarded: Mutex::new(Vec::new()),
            }
        }

        pub fn new_fail() -> Self {
            Self {
                fail: true,
                converted: Mutex::new(Vec::new()),
                discarded: Mutex::new(Vec::new()),
            }
        }

        pub fn converted(&self) -> Vec<String> {
            self.converted.lock().unwrap().clone()
        }

        pub fn discarded(&self) -> Vec<String> {
            self.discarded.lock().unwrap().clone()
        }
    }

    impl Converter for MockConverter {
        fn convert(
            &self,
            triplet: &FileTriplet,
            _ctx: &ConversionContext,
        ) -> Result<ConversionReport> {
            if self.fail {
                return Err(crate::error::AppError::Conversion(
                    "mock conversion failure".to_string(),
                ));
            }
            self.converted
                .lock()
                .unwrap()
                .push(triplet.name.raw_name());
            let start_jd = triplet.name.start_jd();
            Ok(ConversionReport {
                output: triplet.output.clone(),
                nblts: 6,
                ntimes: 2,
                start_jd,
                stop_jd: start_jd + 2e-4,
                size_bytes: 1024,
                tag: "engineering".to_string(),
            })
        }

        fn discard_partial(&self, triplet: &FileTriplet) -> Result<()> {
            self.discarded
                .lock()
                .unwrap()
                .push(triplet.name.output_name());
            Ok(())
        }
    }
}
