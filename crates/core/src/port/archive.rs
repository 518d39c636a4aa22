// Archive Client Port (Interface)
//
// The long-term archive ("Librarian") keeps one instance per file name.
// Upload is preceded by a search so re-delivered queue entries are harmless.

use std::path::Path;

use crate::error::Result;
use async_trait::async_trait;

#[async_trait]
pub trait ArchiveClient: Send + Sync {
    /// Whether the archive already holds an instance of this file name
    async fn has_instance(&self, file_name: &str) -> Result<bool>;

    /// Upload a local file under its store name
    async fn upload(&self, local_path: &Path, store_name: &str) -> Result<()>;
}

// ============================================================================
// Mock Implementation for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::collections::HashSet;
    use std::path::PathBuf;
    use std::sync::Mutex;

    /// In-memory archive for tests
    #[derive(Default)]
    pub struct MemoryArchive {
        existing: Mutex<HashSet<String>>,
        uploaded: Mutex<Vec<(PathBuf, String)>>,
        fail_uploads: bool,
    }

    impl MemoryArchive {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn new_failing() -> Self {
            Self {
                fail_uploads: true,
                ..Self::default()
            }
        }

        pub fn seed_instance(&self, name: &str) {
            self.existing.lock().unwrap().insert(name.to_string());
        }

        pub fn uploaded(&self) -> Vec<(PathBuf, String)> {
            self.uploaded.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ArchiveClient for MemoryArchive {
        async fn has_instance(&self, file_name: &str) -> Result<bool> {
            Ok(self.existing.lock().unwrap().contains(file_name))
        }

        async fn upload(&self, local_path: &Path, store_name: &str) -> Result<()> {
            if self.fail_uploads {
                return Err(crate::error::AppError::Archive(
                    "mock upload failure".to_string(),
                ));
            }
            self.existing.lock().unwrap().insert(store_name.to_string());
            self.uploaded
                .lock()
                .unwrap()
                .push((local_path.to_path_buf(), store_name.to_string()));
            Ok(())
        }
    }
}
