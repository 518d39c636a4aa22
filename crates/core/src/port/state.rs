// Telescope State Port (Interface)
//
// Scalar keys and the `corr` hash in the shared store: observation timing,
// F-engine parameters, the catcher's working directory and the mapping/BDA
// tables. The conversion context (cminfo + frequency setup) is read through
// here as well.

use crate::domain::{CmInfo, FreqSetup, ObservationPlan};
use crate::error::Result;
use async_trait::async_trait;

#[async_trait]
pub trait TelescopeState: Send + Sync {
    /// Directory the catcher writes raw dumps into
    async fn catcher_cwd(&self) -> Result<Option<String>>;

    /// Array layout snapshot published by M&C
    async fn cminfo(&self) -> Result<CmInfo>;

    /// F-engine sampling parameters
    async fn freq_setup(&self) -> Result<FreqSetup>;

    async fn acc_len(&self) -> Result<u32>;

    async fn feng_sync_time_ms(&self) -> Result<i64>;

    /// Persist a resolved observation plan to the timing keys
    async fn store_plan(&self, plan: &ObservationPlan) -> Result<()>;

    /// Field of the `corr` hash (mapping/BDA tables, catcher cwd, ...)
    async fn corr_field(&self, field: &str) -> Result<Option<String>>;

    async fn set_corr_field(&self, field: &str, value: &str) -> Result<()>;

    /// Raw antenna -> SNAP assignment (JSON)
    async fn ant_to_snap(&self) -> Result<String>;

    /// Raw SNAP configuration (YAML)
    async fn snap_config(&self) -> Result<String>;
}

/// Field names within the `corr` hash
pub mod corr_fields {
    pub const CATCHER_CWD: &str = "catcher_cwd";
    pub const CORR_TO_ANT_MAP: &str = "corr_to_hera_map";
    pub const INTEGRATION_BIN: &str = "integration_bin";
    pub const BDA_TIERS: &str = "bl_bda_tiers";
}

// ============================================================================
// Mock Implementation for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::error::AppError;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory telescope state for tests
    #[derive(Default)]
    pub struct MemoryTelescopeState {
        cminfo: Mutex<Option<CmInfo>>,
        freq: Mutex<Option<FreqSetup>>,
        keys: Mutex<HashMap<String, String>>,
        corr: Mutex<HashMap<String, String>>,
        ant_to_snap: Mutex<Option<String>>,
        snap_config: Mutex<Option<String>>,
    }

    impl MemoryTelescopeState {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn set_cminfo(&self, info: CmInfo) {
            *self.cminfo.lock().unwrap() = Some(info);
        }

        pub fn set_freq_setup(&self, freq: FreqSetup) {
            *self.freq.lock().unwrap() = Some(freq);
        }

        pub fn set_key(&self, key: &str, value: &str) {
            self.keys
                .lock()
                .unwrap()
                .insert(key.to_string(), value.to_string());
        }

        pub fn key(&self, key: &str) -> Option<String> {
            self.keys.lock().unwrap().get(key).cloned()
        }

        pub fn corr_value(&self, field: &str) -> Option<String> {
            self.corr.lock().unwrap().get(field).cloned()
        }

        pub fn set_corr(&self, field: &str, value: &str) {
            self.corr
                .lock()
                .unwrap()
                .insert(field.to_string(), value.to_string());
        }

        pub fn set_snap_tables(&self, ant_to_snap: &str, snap_config: &str) {
            *self.ant_to_snap.lock().unwrap() = Some(ant_to_snap.to_string());
            *self.snap_config.lock().unwrap() = Some(snap_config.to_string());
        }

        fn required_key(&self, key: &str) -> Result<String> {
            self.key(key)
                .ok_or_else(|| AppError::NotFound(format!("state key {key}")))
        }
    }

    #[async_trait]
    impl TelescopeState for MemoryTelescopeState {
        async fn catcher_cwd(&self) -> Result<Option<String>> {
            Ok(self.corr.lock().unwrap().get(corr_fields::CATCHER_CWD).cloned())
        }

        async fn cminfo(&self) -> Result<CmInfo> {
            self.cminfo
                .lock()
                .unwrap()
                .clone()
                .ok_or_else(|| AppError::NotFound("cminfo snapshot".to_string()))
        }

        async fn freq_setup(&self) -> Result<FreqSetup> {
            self.freq
                .lock()
                .unwrap()
                .ok_or_else(|| AppError::NotFound("frequency setup".to_string()))
        }

        async fn acc_len(&self) -> Result<u32> {
            self.required_key("corr:acc_len")?
                .parse()
                .map_err(|e| AppError::Store(format!("bad corr:acc_len: {e}")))
        }

        async fn feng_sync_time_ms(&self) -> Result<i64> {
            // float-tolerant parse, older writers stored fractional ms
            let raw = self.required_key("corr:feng_sync_time")?;
            raw.parse::<f64>()
                .map(|v| v as i64)
                .map_err(|e| AppError::Store(format!("bad corr:feng_sync_time: {e}")))
        }

        async fn store_plan(&self, plan: &ObservationPlan) -> Result<()> {
            let mut keys = self.keys.lock().unwrap();
            keys.insert("corr:acc_len".into(), plan.acc_len.to_string());
            keys.insert("corr:start_time".into(), plan.start_time_ms.to_string());
            keys.insert("corr:obs_len".into(), plan.obs_len_s.to_string());
            keys.insert("corr:trig_mcnt".into(), plan.trig_mcnt.to_string());
            keys.insert("corr:trig_time".into(), plan.trig_time_ms.to_string());
            keys.insert("corr:int_time".into(), plan.int_time_s.to_string());
            Ok(())
        }

        async fn corr_field(&self, field: &str) -> Result<Option<String>> {
            Ok(self.corr.lock().unwrap().get(field).cloned())
        }

        async fn set_corr_field(&self, field: &str, value: &str) -> Result<()> {
            self.corr
                .lock()
                .unwrap()
                .insert(field.to_string(), value.to_string());
            Ok(())
        }

        async fn ant_to_snap(&self) -> Result<String> {
            self.ant_to_snap
                .lock()
                .unwrap()
                .clone()
                .ok_or_else(|| AppError::NotFound("ant_to_snap".to_string()))
        }

        async fn snap_config(&self) -> Result<String> {
            self.snap_config
                .lock()
                .unwrap()
                .clone()
                .ok_or_else(|| AppError::NotFound("snap_configuration".to_string()))
        }
    }
}
