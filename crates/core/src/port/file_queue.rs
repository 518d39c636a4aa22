// File Queue Port (Interface)
//
// The shared store's list/hash primitives, seen through the pipeline's
// vocabulary. Queues behave as stacks: `push` adds to the recent end,
// `pop_latest` takes from it, `defer` returns an entry to the far end so a
// troublesome file does not hot-loop at the top.

use crate::domain::{QueueKey, Stage};
use crate::error::Result;
use async_trait::async_trait;

#[async_trait]
pub trait FileQueue: Send + Sync {
    /// Number of entries in a queue
    async fn depth(&self, queue: QueueKey) -> Result<usize>;

    /// Pop the most recently pushed entry (LIFO)
    async fn pop_latest(&self, queue: QueueKey) -> Result<Option<String>>;

    /// Append an entry at the recent end
    async fn push(&self, queue: QueueKey, entry: &str) -> Result<()>;

    /// Return an entry to the far end of the queue
    async fn defer(&self, queue: QueueKey, entry: &str) -> Result<()>;

    /// Record an entry as in-flight for a stage
    async fn purgatory_insert(&self, stage: Stage, entry: &str) -> Result<()>;

    /// Clear an entry's in-flight record
    async fn purgatory_remove(&self, stage: Stage, entry: &str) -> Result<()>;

    /// All entries currently recorded as in-flight for a stage
    async fn purgatory_entries(&self, stage: Stage) -> Result<Vec<String>>;

    /// Per-day stage counters (day -> counter)
    async fn day_counters(&self) -> Result<Vec<(String, i64)>>;

    async fn set_day_counter(&self, day: &str, value: i64) -> Result<()>;
}

// ============================================================================
// Mock Implementation for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::collections::{BTreeMap, HashMap, VecDeque};
    use std::sync::Mutex;

    /// In-memory queue store mirroring the adapter's list/hash semantics
    #[derive(Default)]
    pub struct MemoryFileQueue {
        lists: Mutex<HashMap<&'static str, VecDeque<String>>>,
        purgatory: Mutex<HashMap<&'static str, BTreeMap<String, String>>>,
        days: Mutex<BTreeMap<String, i64>>,
    }

    impl MemoryFileQueue {
        pub fn new() -> Self {
            Self::default()
        }

        /// Snapshot of a queue, oldest first (test helper)
        pub fn items(&self, queue: QueueKey) -> Vec<String> {
            self.lists
                .lock()
                .unwrap()
                .get(queue.key())
                .map(|q| q.iter().cloned().collect())
                .unwrap_or_default()
        }

        pub fn seed(&self, queue: QueueKey, entries: &[&str]) {
            let mut lists = self.lists.lock().unwrap();
            let list = lists.entry(queue.key()).or_default();
            for e in entries {
                list.push_back((*e).to_string());
            }
        }

        pub fn day_counter(&self, day: &str) -> Option<i64> {
            self.days.lock().unwrap().get(day).copied()
        }
    }

    #[async_trait]
    impl FileQueue for MemoryFileQueue {
        async fn depth(&self, queue: QueueKey) -> Result<usize> {
            Ok(self
                .lists
                .lock()
                .unwrap()
                .get(queue.key())
                .map_or(0, |q| q.len()))
        }

        async fn pop_latest(&self, queue: QueueKey) -> Result<Option<String>> {
            Ok(self
                .lists
                .lock()
                .unwrap()
                .entry(queue.key())
                .or_default()
                .pop_back())
        }

        async fn push(&self, queue: QueueKey, entry: &str) -> Result<()> {
            self.lists
                .lock()
                .unwrap()
                .entry(queue.key())
                .or_default()
                .push_back(entry.to_string());
            Ok(())
        }

        async fn defer(&self, queue: QueueKey, entry: &str) -> Result<()> {
            self.lists
                .lock()
                .unwrap()
                .entry(queue.key())
                .or_default()
                .push_front(entry.to_string());
            Ok(())
        }

        async fn purgatory_insert(&self, stage: Stage, entry: &str) -> Result<()> {
            self.purgatory
                .lock()
                .unwrap()
                .entry(stage.purgatory_key())
                .or_default()
                .insert(entry.to_string(), "0".to_string());
            Ok(())
        }

        async fn purgatory_remove(&self, stage: Stage, entry: &str) -> Result<()> {
            self.purgatory
                .lock()
                .unwrap()
                .entry(stage.purgatory_key())
                .or_default()
                .remove(entry);
            Ok(())
        }

        async fn purgatory_entries(&self, stage: Stage) -> Result<Vec<String>> {
            Ok(self
                .purgatory
                .lock()
                .unwrap()
                .get(stage.purgatory_key())
                .map(|m| m.keys().cloned().collect())
                .unwrap_or_default())
        }

        async fn day_counters(&self) -> Result<Vec<(String, i64)>> {
            Ok(self
                .days
                .lock()
                .unwrap()
                .iter()
                .map(|(k, v)| (k.clone(), *v))
                .collect())
        }

        async fn set_day_counter(&self, day: &str, value: i64) -> Result<()> {
            self.days.lock().unwrap().insert(day.to_string(), value);
            Ok(())
        }
    }
}
