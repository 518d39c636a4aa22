// Observation control
//
// Resolves observation requests into timing keys, synchronizes the X-engine
// pipelines and triggers/stops the catcher, all over the shared store and
// the hashpipe control bus.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::domain::{DomainError, ObservationPlan, ObservationSpec};
use crate::error::Result;
use crate::port::{gateway_channel, ControlBus, TelescopeState, TimeProvider};

use super::mapping::MappingService;

pub const DEFAULT_CATCHER_HOST: &str = "hera-sn1";

/// Parameters settle in the status buffers before the trigger fires
const TRIGGER_SETTLE: Duration = Duration::from_millis(100);

/// Min/max network statistics reset alongside an observation stop
const NET_STAT_PREFIXES: [&str; 3] = ["NETWAT", "NETREC", "NETPRC"];

/// Where the X-engine pipelines live
#[derive(Debug, Clone)]
pub struct XengineLayout {
    pub n_hosts: u32,
    /// Independent time-slice correlators (even/odd)
    pub slices: u32,
    /// Whole hosts per slice instead of instances per host
    pub slice_by_host: bool,
    /// MCNT offset between slices
    pub mcnt_step: u64,
    pub host_prefix: String,
    /// Pipeline instances per host
    pub instances: u32,
}

impl Default for XengineLayout {
    fn default() -> Self {
        Self {
            n_hosts: 8,
            slices: 2,
            slice_by_host: false,
            mcnt_step: 2,
            host_prefix: "px".to_string(),
            instances: 2,
        }
    }
}

impl XengineLayout {
    fn host(&self, index: u32) -> String {
        format!("{}{}", self.host_prefix, index + 1)
    }
}

/// Catcher-side knobs for starting an observation
#[derive(Debug, Clone)]
pub struct StartOptions {
    pub catcher_host: String,
    pub nants_data: u32,
    pub nants: u32,
}

impl Default for StartOptions {
    fn default() -> Self {
        Self {
            catcher_host: DEFAULT_CATCHER_HOST.to_string(),
            nants_data: 192,
            nants: 352,
        }
    }
}

pub struct ObservationService {
    state: Arc<dyn TelescopeState>,
    bus: Arc<dyn ControlBus>,
    time_provider: Arc<dyn TimeProvider>,
}

impl ObservationService {
    pub fn new(
        state: Arc<dyn TelescopeState>,
        bus: Arc<dyn ControlBus>,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            state,
            bus,
            time_provider,
        }
    }

    /// Resolve a request against the clock and persist the timing keys.
    pub async fn plan_and_store(&self, spec: &ObservationSpec) -> Result<ObservationPlan> {
        let cminfo = self.state.cminfo().await?;
        let longitude_rad = cminfo.array_position().longitude_rad;
        let plan = spec.plan(self.time_provider.now_millis(), longitude_rad)?;

        debug!(
            acc_len = plan.acc_len,
            start_time = plan.start_time_ms,
            obs_len = plan.obs_len_s,
            trig_mcnt = plan.trig_mcnt,
            trig_time = plan.trig_time_ms,
            int_time = plan.int_time_s,
            "storing observation plan"
        );
        info!(
            trigger_in_s = (plan.trig_time_ms - self.time_provider.now_millis()) / 1000,
            nfiles = plan.nfiles,
            file_duration_ms = plan.file_duration_ms,
            "observation planned"
        );

        self.state.store_plan(&plan).await?;
        Ok(plan)
    }

    /// Arm every X-engine pipeline with the trigger MCNT and integration
    /// parameters.
    pub async fn sync_xengines(&self, plan: &ObservationPlan, layout: &XengineLayout) -> Result<()> {
        for slice in 0..layout.slices {
            let message = format!(
                "INTSYNC={}\nINTCOUNT={}\nINTSTAT=start\nOUTDUMPS=0",
                plan.trig_mcnt + u64::from(slice) * layout.mcnt_step,
                plan.acc_len
            );

            if layout.slice_by_host {
                // every host runs every slice as a separate instance
                for h in 0..layout.slices * layout.n_hosts {
                    self.bus
                        .publish(&gateway_channel(&layout.host(h), slice), &message)
                        .await?;
                }
            } else {
                // hosts are partitioned between slices
                for h in 0..layout.n_hosts {
                    let host = layout.host(slice * layout.n_hosts + h);
                    for instance in 0..layout.instances {
                        self.bus
                            .publish(&gateway_channel(&host, instance), &message)
                            .await?;
                    }
                }
            }
        }
        info!(trig_mcnt = plan.trig_mcnt, "X-engines synchronized");
        Ok(())
    }

    /// Refresh the catcher's tables and fire the trigger.
    pub async fn start_observing(
        &self,
        tag: &str,
        plan: &ObservationPlan,
        mapping: &MappingService,
        opts: &StartOptions,
    ) -> Result<()> {
        if tag.len() > 127 {
            return Err(DomainError::TagTooLong(tag.len()).into());
        }

        mapping
            .refresh_corr_map(opts.nants_data, opts.nants)
            .await?;
        let config = mapping.stored_bda_config().await?;
        mapping
            .refresh_integration_bins(&config, &opts.catcher_host)
            .await?;

        let channel = gateway_channel(&opts.catcher_host, 0);
        let params = [
            ("MSPERFIL", plan.file_duration_ms.to_string()),
            ("NFILES", plan.nfiles.to_string()),
            ("SYNCTIME", plan.feng_sync_time_ms.to_string()),
            ("INTTIME", plan.acc_len.to_string()),
            ("TAG", tag.to_string()),
        ];
        for (key, value) in &params {
            self.bus.publish(&channel, &format!("{key}={value}")).await?;
        }

        // trigger only after the parameters have had time to land
        tokio::time::sleep(TRIGGER_SETTLE).await;
        self.bus.publish(&channel, "TRIGGER=1").await?;
        info!(tag, catcher = %opts.catcher_host, "observation triggered");
        Ok(())
    }

    /// Reset the catcher's trigger and statistics keys.
    pub async fn clear_catcher_keys(&self, catcher_host: &str) -> Result<()> {
        let channel = gateway_channel(catcher_host, 0);
        for message in ["NFILES=0", "TRIGGER=0", "MSPERFIL=0"] {
            self.bus.publish(&channel, message).await?;
        }
        for prefix in NET_STAT_PREFIXES {
            self.bus.publish(&channel, &format!("{prefix}MN=99999")).await?;
            self.bus.publish(&channel, &format!("{prefix}MX=0")).await?;
        }
        self.bus.publish(&channel, "MISSEDPK=0").await
    }

    /// Reset the catcher's counters and stop the X-engines.
    pub async fn stop_observing(&self, catcher_host: &str) -> Result<()> {
        self.clear_catcher_keys(catcher_host).await?;

        // broadcast to every pipeline
        self.bus.publish("hashpipe:///set", "INTSTAT=stop").await?;
        info!(catcher = %catcher_host, "observation stopped");
        Ok(())
    }
}
