//! Observation control against the in-memory state and a recording bus.

use std::sync::Arc;

use corrflow_core::application::observation::{StartOptions, XengineLayout};
use corrflow_core::application::{MappingService, ObservationService};
use corrflow_core::domain::{CmInfo, ObservationSpec};
use corrflow_core::error::AppError;
use corrflow_core::port::control_bus::mocks::RecordingBus;
use corrflow_core::port::state::mocks::MemoryTelescopeState;
use corrflow_core::port::time_provider::mocks::FixedTimeProvider;

const NOW_MS: i64 = 1_600_000_000_000;

const ANT_TO_SNAP: &str = r#"{
    "12": {"n": {"host": "heraNode1Snap0", "channel": 0}},
    "51": {"n": {"host": "heraNode1Snap0", "channel": 4}}
}"#;

const SNAP_CONFIG: &str = "
fengines:
  heraNode1Snap0:
    ants: [0, 1, 2]
";

fn fixture_cminfo() -> CmInfo {
    CmInfo {
        cofa_lat: -30.721,
        cofa_lon: 21.428,
        cofa_alt: 1051.7,
        antenna_numbers: vec![0, 1],
        antenna_names: vec!["HH0".to_string(), "HH1".to_string()],
        antenna_positions: vec![[0.0, 0.0, 0.0], [14.6, 0.0, 0.0]],
    }
}

struct Harness {
    state: Arc<MemoryTelescopeState>,
    bus: Arc<RecordingBus>,
    observation: ObservationService,
    mapping: MappingService,
}

fn harness() -> Harness {
    let state = Arc::new(MemoryTelescopeState::new());
    state.set_cminfo(fixture_cminfo());
    state.set_key("corr:feng_sync_time", &(NOW_MS - 3_600_000).to_string());
    state.set_snap_tables(ANT_TO_SNAP, SNAP_CONFIG);

    let bus = Arc::new(RecordingBus::new());
    let observation = ObservationService::new(
        state.clone(),
        bus.clone(),
        Arc::new(FixedTimeProvider(NOW_MS)),
    );
    let mapping = MappingService::new(state.clone(), bus.clone());
    Harness {
        state,
        bus,
        observation,
        mapping,
    }
}

#[tokio::test]
async fn plan_and_store_writes_timing_keys() {
    let h = harness();

    let spec = ObservationSpec::new(2.0, NOW_MS - 3_600_000);
    let plan = h.observation.plan_and_store(&spec).await.unwrap();

    assert_eq!(
        h.state.key("corr:acc_len").unwrap(),
        plan.acc_len.to_string()
    );
    assert_eq!(
        h.state.key("corr:start_time").unwrap(),
        plan.start_time_ms.to_string()
    );
    assert_eq!(h.state.key("corr:obs_len").unwrap(), "7200");
    assert_eq!(
        h.state.key("corr:trig_mcnt").unwrap(),
        plan.trig_mcnt.to_string()
    );
    assert!(plan.start_time_ms >= NOW_MS + 60_000);
}

#[tokio::test]
async fn sync_xengines_arms_every_pipeline() {
    let h = harness();
    let spec = ObservationSpec::new(1.0, NOW_MS - 3_600_000);
    let plan = h.observation.plan_and_store(&spec).await.unwrap();

    let layout = XengineLayout {
        n_hosts: 2,
        ..XengineLayout::default()
    };
    h.observation.sync_xengines(&plan, &layout).await.unwrap();

    // 2 slices x 2 hosts x 2 instances
    let published = h.bus.published();
    assert_eq!(published.len(), 8);

    // slice 0 lands on px1/px2, slice 1 on px3/px4, offset by the MCNT step
    let msg_px1 = &h.bus.on_channel("hashpipe://px1/0/set")[0];
    assert!(msg_px1.contains(&format!("INTSYNC={}", plan.trig_mcnt)));
    assert!(msg_px1.contains("INTSTAT=start"));
    assert!(msg_px1.contains(&format!("INTCOUNT={}", plan.acc_len)));

    let msg_px3 = &h.bus.on_channel("hashpipe://px3/1/set")[0];
    assert!(msg_px3.contains(&format!("INTSYNC={}", plan.trig_mcnt + 2)));
}

#[tokio::test]
async fn start_observing_ends_with_the_trigger() {
    let h = harness();
    let spec = ObservationSpec::new(1.0, NOW_MS - 3_600_000);
    let plan = h.observation.plan_and_store(&spec).await.unwrap();

    h.mapping.init_bda(8).await.unwrap();
    let opts = StartOptions {
        catcher_host: "hera-sn1".to_string(),
        nants_data: 8,
        nants: 352,
    };
    h.observation
        .start_observing("science", &plan, &h.mapping, &opts)
        .await
        .unwrap();

    let catcher = h.bus.on_channel("hashpipe://hera-sn1/0/set");
    // baseline-count keys from the mapping refresh come first
    assert!(catcher.iter().any(|m| m.starts_with("NBL2SEC=")));
    assert!(catcher.iter().any(|m| m.starts_with("BDANANT=")));
    // then the runtime parameters, trigger strictly last
    assert!(catcher.contains(&"TAG=science".to_string()));
    assert!(catcher
        .contains(&format!("MSPERFIL={}", plan.file_duration_ms)));
    assert!(catcher.contains(&format!("NFILES={}", plan.nfiles)));
    assert_eq!(catcher.last().unwrap(), "TRIGGER=1");

    // the mapping refresh also stored the tables
    assert!(h.state.corr_value("corr_to_hera_map").is_some());
    assert!(h.state.corr_value("integration_bin").is_some());
}

#[tokio::test]
async fn oversized_tag_is_rejected() {
    let h = harness();
    let spec = ObservationSpec::new(1.0, NOW_MS - 3_600_000);
    let plan = h.observation.plan_and_store(&spec).await.unwrap();
    h.mapping.init_bda(8).await.unwrap();

    let tag = "x".repeat(128);
    let err = h
        .observation
        .start_observing(&tag, &plan, &h.mapping, &StartOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Domain(_)));

    // nothing was published
    assert!(h.bus.published().is_empty());
}

#[tokio::test]
async fn stop_observing_resets_and_broadcasts() {
    let h = harness();
    h.observation.stop_observing("hera-sn1").await.unwrap();

    let catcher = h.bus.on_channel("hashpipe://hera-sn1/0/set");
    assert!(catcher.contains(&"NFILES=0".to_string()));
    assert!(catcher.contains(&"TRIGGER=0".to_string()));
    assert!(catcher.contains(&"NETWATMN=99999".to_string()));
    assert!(catcher.contains(&"MISSEDPK=0".to_string()));

    assert_eq!(
        h.bus.on_channel("hashpipe:///set"),
        vec!["INTSTAT=stop".to_string()]
    );
}
