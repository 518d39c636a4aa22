// Mapping & BDA table management
//
// Keeps the store's correlator-input map, BDA tier table and integration
// bins in sync with the SNAP assignment, and tells the catcher how many
// baselines land in each averaging bucket.

use std::sync::Arc;

use tracing::info;

use crate::domain::{bda, mapping, BdaConfig};
use crate::error::{AppError, Result};
use crate::port::state::corr_fields;
use crate::port::{gateway_channel, ControlBus, TelescopeState};

pub struct MappingService {
    state: Arc<dyn TelescopeState>,
    bus: Arc<dyn ControlBus>,
}

impl MappingService {
    pub fn new(state: Arc<dyn TelescopeState>, bus: Arc<dyn ControlBus>) -> Self {
        Self { state, bus }
    }

    /// Rebuild the correlator-input -> antenna map from the SNAP tables and
    /// store it.
    pub async fn refresh_corr_map(&self, nants_data: u32, nants: u32) -> Result<Vec<u32>> {
        let ant_to_snap = self.state.ant_to_snap().await?;
        let snap_config = self.state.snap_config().await?;
        let map = mapping::corr_to_ant_map(&ant_to_snap, &snap_config, nants_data, nants)?;

        self.state
            .set_corr_field(corr_fields::CORR_TO_ANT_MAP, &mapping::render_map(&map))
            .await?;
        info!(nants_data, "correlator map refreshed");
        Ok(map)
    }

    /// Build a fresh BDA tier table from the SNAP connectivity and store it.
    pub async fn init_bda(&self, nants: u32) -> Result<BdaConfig> {
        let ant_to_snap = self.state.ant_to_snap().await?;
        let snap_config = self.state.snap_config().await?;
        let connected = mapping::connected_inputs(&ant_to_snap, &snap_config)?;
        let config = bda::assign_tiers(&connected, nants);

        self.store_bda_config(&config).await?;
        info!(
            nants,
            connected = connected.len(),
            "BDA tier table initialized"
        );
        Ok(config)
    }

    pub async fn store_bda_config(&self, config: &[bda::BdaTier]) -> Result<()> {
        self.state
            .set_corr_field(corr_fields::BDA_TIERS, &bda::render(config))
            .await
    }

    pub async fn stored_bda_config(&self) -> Result<BdaConfig> {
        let raw = self
            .state
            .corr_field(corr_fields::BDA_TIERS)
            .await?
            .ok_or_else(|| AppError::NotFound("BDA tier table".to_string()))?;
        Ok(bda::parse(&raw)?)
    }

    /// Store the integration-bin list and publish the per-bucket baseline
    /// counts to the catcher.
    pub async fn refresh_integration_bins(
        &self,
        config: &[bda::BdaTier],
        catcher_host: &str,
    ) -> Result<()> {
        let bins = bda::integration_bins(config);
        let rendered = bins
            .iter()
            .map(|b| b.to_string())
            .collect::<Vec<_>>()
            .join("\n");
        self.state
            .set_corr_field(corr_fields::INTEGRATION_BIN, &rendered)
            .await?;

        let counts = bda::tier_counts(config);
        let channel = gateway_channel(catcher_host, 0);
        for (i, count) in counts.per_bucket.iter().enumerate() {
            let seconds = 2u32.pow(i as u32 + 1);
            self.bus
                .publish(&channel, &format!("NBL{seconds}SEC={count}"))
                .await?;
        }
        self.bus
            .publish(&channel, &format!("BDANANT={}", counts.nants))
            .await?;

        info!(bins = bins.len(), "integration bins refreshed");
        Ok(())
    }
}
