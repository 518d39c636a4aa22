// Redis implementation of the FileQueue, TelescopeState and ControlBus ports

use std::collections::HashMap;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::warn;

use corrflow_core::domain::queue::JD_COUNTER_KEY;
use corrflow_core::domain::{CmInfo, FreqSetup, ObservationPlan, QueueKey, Stage};
use corrflow_core::error::{AppError, Result};
use corrflow_core::port::{ControlBus, FileQueue, TelescopeState};

const CORR_HASH: &str = "corr";
const CMINFO_KEY: &str = "corr:cminfo";
const ACC_LEN_KEY: &str = "corr:acc_len";
const START_TIME_KEY: &str = "corr:start_time";
const OBS_LEN_KEY: &str = "corr:obs_len";
const TRIG_MCNT_KEY: &str = "corr:trig_mcnt";
const TRIG_TIME_KEY: &str = "corr:trig_time";
const INT_TIME_KEY: &str = "corr:int_time";
const FENG_SYNC_TIME_KEY: &str = "corr:feng_sync_time";
const SAMPLE_FREQ_KEY: &str = "feng:sample_freq";
const SAMPLES_PER_MCNT_KEY: &str = "feng:samples_per_mcnt";
const CORR_MAP_HASH: &str = "corr:map";
const ANT_TO_SNAP_FIELD: &str = "ant_to_snap";
const SNAP_CONFIG_HASH: &str = "snap_configuration";
const SNAP_CONFIG_FIELD: &str = "config";

fn map_redis_error(err: redis::RedisError) -> AppError {
    AppError::Store(err.to_string())
}

/// One handle for everything the pipeline keeps in Redis
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    async fn get_key(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        conn.get(key).await.map_err(map_redis_error)
    }

    async fn required_key(&self, key: &str) -> Result<String> {
        self.get_key(key)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("redis key {key}")))
    }

    async fn set_key(&self, key: &str, value: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.set::<_, _, ()>(key, value)
            .await
            .map_err(map_redis_error)
    }
}

#[async_trait]
impl FileQueue for RedisStore {
    async fn depth(&self, queue: QueueKey) -> Result<usize> {
        let mut conn = self.conn.clone();
        conn.llen(queue.key()).await.map_err(map_redis_error)
    }

    async fn pop_latest(&self, queue: QueueKey) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        conn.rpop(queue.key(), None).await.map_err(map_redis_error)
    }

    async fn push(&self, queue: QueueKey, entry: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.rpush::<_, _, ()>(queue.key(), entry)
            .await
            .map_err(map_redis_error)
    }

    async fn defer(&self, queue: QueueKey, entry: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.lpush::<_, _, ()>(queue.key(), entry)
            .await
            .map_err(map_redis_error)
    }

    async fn purgatory_insert(&self, stage: Stage, entry: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.hset::<_, _, _, ()>(stage.purgatory_key(), entry, 0)
            .await
            .map_err(map_redis_error)
    }

    async fn purgatory_remove(&self, stage: Stage, entry: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.hdel::<_, _, ()>(stage.purgatory_key(), entry)
            .await
            .map_err(map_redis_error)
    }

    async fn purgatory_entries(&self, stage: Stage) -> Result<Vec<String>> {
        let mut conn = self.conn.clone();
        let entries: HashMap<String, String> = conn
            .hgetall(stage.purgatory_key())
            .await
            .map_err(map_redis_error)?;
        Ok(entries.into_keys().collect())
    }

    async fn day_counters(&self) -> Result<Vec<(String, i64)>> {
        let mut conn = self.conn.clone();
        let raw: HashMap<String, String> = conn
            .hgetall(JD_COUNTER_KEY)
            .await
            .map_err(map_redis_error)?;

        let mut counters = Vec::with_capacity(raw.len());
        for (day, value) in raw {
            match value.parse::<i64>() {
                Ok(v) => counters.push((day, v)),
                Err(_) => warn!(%day, %value, "unparseable day counter, skipping"),
            }
        }
        counters.sort();
        Ok(counters)
    }

    async fn set_day_counter(&self, day: &str, value: i64) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.hset::<_, _, _, ()>(JD_COUNTER_KEY, day, value)
            .await
            .map_err(map_redis_error)
    }
}

#[async_trait]
impl TelescopeState for RedisStore {
    async fn catcher_cwd(&self) -> Result<Option<String>> {
        self.corr_field(corrflow_core::port::state::corr_fields::CATCHER_CWD)
            .await
    }

    async fn cminfo(&self) -> Result<CmInfo> {
        let raw = self.required_key(CMINFO_KEY).await?;
        Ok(CmInfo::from_json(&raw)?)
    }

    async fn freq_setup(&self) -> Result<FreqSetup> {
        let sample_freq_hz = self
            .required_key(SAMPLE_FREQ_KEY)
            .await?
            .parse()
            .map_err(|e| AppError::Store(format!("bad {SAMPLE_FREQ_KEY}: {e}")))?;
        let samples_per_mcnt = self
            .required_key(SAMPLES_PER_MCNT_KEY)
            .await?
            .parse()
            .map_err(|e| AppError::Store(format!("bad {SAMPLES_PER_MCNT_KEY}: {e}")))?;
        Ok(FreqSetup {
            sample_freq_hz,
            samples_per_mcnt,
        })
    }

    async fn acc_len(&self) -> Result<u32> {
        self.required_key(ACC_LEN_KEY)
            .await?
            .parse()
            .map_err(|e| AppError::Store(format!("bad {ACC_LEN_KEY}: {e}")))
    }

    async fn feng_sync_time_ms(&self) -> Result<i64> {
        // float-tolerant, older writers stored fractional milliseconds
        self.required_key(FENG_SYNC_TIME_KEY)
            .await?
            .parse::<f64>()
            .map(|v| v as i64)
            .map_err(|e| AppError::Store(format!("bad {FENG_SYNC_TIME_KEY}: {e}")))
    }

    async fn store_plan(&self, plan: &ObservationPlan) -> Result<()> {
        self.set_key(ACC_LEN_KEY, &plan.acc_len.to_string()).await?;
        self.set_key(START_TIME_KEY, &plan.start_time_ms.to_string())
            .await?;
        self.set_key(OBS_LEN_KEY, &plan.obs_len_s.to_string()).await?;
        self.set_key(TRIG_MCNT_KEY, &plan.trig_mcnt.to_string())
            .await?;
        self.set_key(TRIG_TIME_KEY, &plan.trig_time_ms.to_string())
            .await?;
        self.set_key(INT_TIME_KEY, &plan.int_time_s.to_string())
            .await
    }

    async fn corr_field(&self, field: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        conn.hget(CORR_HASH, field).await.map_err(map_redis_error)
    }

    async fn set_corr_field(&self, field: &str, value: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.hset::<_, _, _, ()>(CORR_HASH, field, value)
            .await
            .map_err(map_redis_error)
    }

    async fn ant_to_snap(&self) -> Result<String> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn
            .hget(CORR_MAP_HASH, ANT_TO_SNAP_FIELD)
            .await
            .map_err(map_redis_error)?;
        raw.ok_or_else(|| AppError::NotFound(format!("{CORR_MAP_HASH}/{ANT_TO_SNAP_FIELD}")))
    }

    async fn snap_config(&self) -> Result<String> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn
            .hget(SNAP_CONFIG_HASH, SNAP_CONFIG_FIELD)
            .await
            .map_err(map_redis_error)?;
        raw.ok_or_else(|| AppError::NotFound(format!("{SNAP_CONFIG_HASH}/{SNAP_CONFIG_FIELD}")))
    }
}

#[async_trait]
impl ControlBus for RedisStore {
    async fn publish(&self, channel: &str, message: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.publish::<_, _, ()>(channel, message)
            .await
            .map_err(map_redis_error)
    }
}
