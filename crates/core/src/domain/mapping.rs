// Correlator-input to antenna mapping
//
// The SNAP F-engine assignment lives in two places: `ant_to_snap` (JSON,
// antenna -> SNAP host/channel) and the SNAP configuration (YAML, host ->
// correlator input numbers). Joining them yields the map from correlator
// input to antenna number that the catcher needs to label baselines.

use std::collections::BTreeMap;

use tracing::warn;

use super::error::{DomainError, Result};

/// Build the correlator-input -> antenna map.
///
/// Inputs without a known SNAP keep a default antenna number outside the
/// range of real antennas (`nants + input`), matching what the catcher
/// expects for dark inputs.
pub fn corr_to_ant_map(
    ant_to_snap_json: &str,
    snap_config_yaml: &str,
    nants_data: u32,
    nants: u32,
) -> Result<Vec<u32>> {
    let ant_to_snap: BTreeMap<String, serde_json::Value> = serde_json::from_str(ant_to_snap_json)
        .map_err(|e| DomainError::InvalidMapEntry(format!("bad ant_to_snap JSON: {e}")))?;
    let config: serde_yaml::Value = serde_yaml::from_str(snap_config_yaml)
        .map_err(|e| DomainError::InvalidMapEntry(format!("bad SNAP config YAML: {e}")))?;

    let mut out: Vec<u32> = (nants..nants + nants_data).collect();

    for (ant, pols) in &ant_to_snap {
        let ant_num: u32 = ant
            .parse()
            .map_err(|_| DomainError::InvalidMapEntry(format!("antenna key {ant:?}")))?;

        // Any polarization will do; both feeds share a SNAP board
        let Some(pol) = pols.as_object().and_then(|o| o.values().next()) else {
            warn!(ant = ant_num, "no polarization entry for antenna");
            continue;
        };
        let (Some(host), Some(chan)) = (
            pol.get("host").and_then(|h| h.as_str()),
            pol.get("channel").and_then(|c| c.as_u64()),
        ) else {
            warn!(ant = ant_num, "incomplete SNAP assignment for antenna");
            continue;
        };

        let Some(inputs) = snap_inputs(&config, host) else {
            warn!(host, "couldn't find antenna indices for SNAP host");
            continue;
        };

        // channel runs 0-5 over both pols; inputs are indexed per-antenna
        let slot = (chan / 2) as usize;
        let corr_input = *inputs.get(slot).ok_or_else(|| {
            DomainError::InvalidMapEntry(format!("SNAP {host} has no input slot {slot}"))
        })?;
        if corr_input >= nants_data {
            return Err(DomainError::InvalidMapEntry(format!(
                "correlator input {corr_input} out of range for {nants_data} data antennas"
            )));
        }
        out[corr_input as usize] = ant_num;
    }

    Ok(out)
}

/// Correlator inputs that have a connected antenna, per the SNAP tables.
///
/// This is the connectivity set the BDA tier assignment keys off: a baseline
/// is only written when both of its correlator inputs appear here.
pub fn connected_inputs(ant_to_snap_json: &str, snap_config_yaml: &str) -> Result<Vec<u32>> {
    let ant_to_snap: BTreeMap<String, serde_json::Value> = serde_json::from_str(ant_to_snap_json)
        .map_err(|e| DomainError::InvalidMapEntry(format!("bad ant_to_snap JSON: {e}")))?;
    let config: serde_yaml::Value = serde_yaml::from_str(snap_config_yaml)
        .map_err(|e| DomainError::InvalidMapEntry(format!("bad SNAP config YAML: {e}")))?;

    let mut inputs_out = Vec::new();
    for (ant, pols) in &ant_to_snap {
        let Some(pol) = pols.as_object().and_then(|o| o.values().next()) else {
            continue;
        };
        let (Some(host), Some(chan)) = (
            pol.get("host").and_then(|h| h.as_str()),
            pol.get("channel").and_then(|c| c.as_u64()),
        ) else {
            continue;
        };
        let Some(inputs) = snap_inputs(&config, host) else {
            warn!(ant = %ant, host, "couldn't find antenna indices for SNAP host");
            continue;
        };
        if let Some(input) = inputs.get((chan / 2) as usize) {
            inputs_out.push(*input);
        }
    }
    Ok(inputs_out)
}

/// Correlator input numbers of a SNAP host.
///
/// The config stores these either as a YAML sequence or as a stringified
/// JSON list; accept both.
fn snap_inputs(config: &serde_yaml::Value, host: &str) -> Option<Vec<u32>> {
    let node = config.get("fengines")?.get(host)?.get("ants")?;
    match node {
        serde_yaml::Value::Sequence(seq) => seq
            .iter()
            .map(|v| v.as_u64().map(|n| n as u32))
            .collect::<Option<Vec<_>>>(),
        serde_yaml::Value::String(s) => serde_json::from_str(s).ok(),
        _ => None,
    }
}

/// One antenna number per line, the store's wire format for the map
pub fn render_map(map: &[u32]) -> String {
    map.iter()
        .map(|a| a.to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn parse_map(s: &str) -> Result<Vec<u32>> {
    s.lines()
        .map(|line| {
            line.trim()
                .parse()
                .map_err(|_| DomainError::InvalidMapEntry(format!("map line {line:?}")))
        })
        .collect()
}
