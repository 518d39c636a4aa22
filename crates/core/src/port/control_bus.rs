// Control Bus Port (Interface)
//
// Hashpipe status buffers are updated by publishing `KEY=VALUE` lines to
// per-host pub/sub channels; a gateway on each host applies them.

use crate::error::Result;
use async_trait::async_trait;

#[async_trait]
pub trait ControlBus: Send + Sync {
    async fn publish(&self, channel: &str, message: &str) -> Result<()>;
}

/// Channel of a hashpipe gateway instance
pub fn gateway_channel(host: &str, instance: u32) -> String {
    format!("hashpipe://{host}/{instance}/set")
}

// ============================================================================
// Mock Implementation for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::sync::Mutex;

    /// Records every publish for assertion
    #[derive(Default)]
    pub struct RecordingBus {
        published: Mutex<Vec<(String, String)>>,
    }

    impl RecordingBus {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn published(&self) -> Vec<(String, String)> {
            self.published.lock().unwrap().clone()
        }

        /// Messages sent to one channel, in order
        pub fn on_channel(&self, channel: &str) -> Vec<String> {
            self.published
                .lock()
                .unwrap()
                .iter()
                .filter(|(c, _)| c == channel)
                .map(|(_, m)| m.clone())
                .collect()
        }
    }

    #[async_trait]
    impl ControlBus for RecordingBus {
        async fn publish(&self, channel: &str, message: &str) -> Result<()> {
            self.published
                .lock()
                .unwrap()
                .push((channel.to_string(), message.to_string()));
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_format() {
        assert_eq!(gateway_channel("hera-sn1", 0), "hashpipe://hera-sn1/0/set");
    }
}
