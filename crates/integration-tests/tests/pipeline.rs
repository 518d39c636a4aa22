//! Conversion and upload stage bodies against the real converter and the
//! in-memory store adapters.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use byteorder::{LittleEndian, WriteBytesExt};

use corrflow_core::application::{ConversionService, StageJob, UploadConfig, UploadService};
use corrflow_core::domain::{CmInfo, FreqSetup, QueueKey, Stage};
use corrflow_core::port::archive::mocks::MemoryArchive;
use corrflow_core::port::file_queue::mocks::MemoryFileQueue;
use corrflow_core::port::observatory_db::mocks::RecordingDb;
use corrflow_core::port::state::corr_fields;
use corrflow_core::port::state::mocks::MemoryTelescopeState;
use corrflow_core::port::{FileQueue, ObservationRecord};
use corrflow_infra_convert::{write_metadata, RawMetadata, UvConverter};

const NFREQ: usize = 6;
const NSTOKES: usize = 4;
const ENTRY: &str = "zen.2459866.51702.sum.dat";

fn fixture_cminfo() -> CmInfo {
    let lon: f64 = 21.428;
    let east = [-lon.to_radians().sin() * 14.6, lon.to_radians().cos() * 14.6, 0.0];
    CmInfo {
        cofa_lat: -30.721,
        cofa_lon: lon,
        cofa_alt: 1051.7,
        antenna_numbers: vec![0, 1],
        antenna_names: vec!["HH0".to_string(), "HH1".to_string()],
        antenna_positions: vec![[0.0, 0.0, 0.0], east],
    }
}

/// Raw + meta pair for 2 times x 3 baselines in `dir`
fn write_fixture(dir: &Path) {
    let metadata = RawMetadata {
        t0: 1_600_000_000_000,
        mcnt: 98_304,
        nfreq: NFREQ as u32,
        nstokes: NSTOKES as u32,
        corr_ver: "deadbeef".to_string(),
        tag: "science".to_string(),
        ant_0: vec![0, 0, 1, 0, 0, 1],
        ant_1: vec![0, 1, 1, 0, 1, 1],
        time: vec![
            2459866.51702,
            2459866.51702,
            2459866.51702,
            2459866.51724,
            2459866.51724,
            2459866.51724,
        ],
        integration_time: vec![9.66; 6],
    };
    write_metadata(&dir.join("zen.2459866.51702.meta.hdf5"), &metadata).unwrap();

    let mut buf = Vec::new();
    for n in 0..(6 * NFREQ * NSTOKES) as i32 {
        buf.write_i32::<LittleEndian>(n).unwrap();
        buf.write_i32::<LittleEndian>(-n).unwrap();
    }
    std::fs::File::create(dir.join(ENTRY))
        .unwrap()
        .write_all(&buf)
        .unwrap();
}

fn fixture_state(dir: &Path) -> Arc<MemoryTelescopeState> {
    let state = Arc::new(MemoryTelescopeState::new());
    state.set_cminfo(fixture_cminfo());
    state.set_freq_setup(FreqSetup {
        sample_freq_hz: 500e6,
        samples_per_mcnt: 64,
    });
    state.set_corr(corr_fields::CATCHER_CWD, dir.to_str().unwrap());
    state
}

#[tokio::test]
async fn convert_stage_produces_and_registers() {
    let dir = tempfile::tempdir().unwrap();
    write_fixture(dir.path());

    let queue = Arc::new(MemoryFileQueue::new());
    let state = fixture_state(dir.path());
    let db = Arc::new(RecordingDb::new());
    let service = ConversionService::new(
        queue.clone(),
        state.clone(),
        Arc::new(UvConverter::new(vec![])),
        Some(db.clone()),
    );

    queue.purgatory_insert(Stage::Convert, ENTRY).await.unwrap();
    service.process(ENTRY).await.unwrap();

    // output written next to the raw dump
    assert!(dir.path().join("zen.2459866.51702.sum.uvh5").exists());

    // queue entry is relative to the catcher cwd
    assert_eq!(
        queue.items(QueueKey::Converted),
        vec!["zen.2459866.51702.sum.uvh5"]
    );
    assert!(queue
        .purgatory_entries(Stage::Convert)
        .await
        .unwrap()
        .is_empty());

    // M&C got the observation and the file, with the obsid convention
    let observations = db.observations();
    assert_eq!(observations.len(), 1);
    assert_eq!(
        observations[0].obsid,
        ObservationRecord::obsid_for_jd(2459866.51702)
    );
    assert_eq!(observations[0].tag, "science");

    let files = db.files();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].filename, "zen.2459866.51702.sum.uvh5");
    assert_eq!(files[0].obsid, observations[0].obsid);
    assert!(files[0].size_bytes > 0);
}

#[tokio::test]
async fn convert_stage_leaves_purgatory_on_failure() {
    let dir = tempfile::tempdir().unwrap();
    write_fixture(dir.path());
    // truncate the dump so the shape check fails
    let f = std::fs::OpenOptions::new()
        .write(true)
        .open(dir.path().join(ENTRY))
        .unwrap();
    f.set_len(64).unwrap();

    let queue = Arc::new(MemoryFileQueue::new());
    let state = fixture_state(dir.path());
    let service = ConversionService::new(
        queue.clone(),
        state,
        Arc::new(UvConverter::new(vec![])),
        None,
    );

    queue.purgatory_insert(Stage::Convert, ENTRY).await.unwrap();
    assert!(service.process(ENTRY).await.is_err());

    // the dispatcher's sweep owns the entry now
    assert_eq!(
        queue.purgatory_entries(Stage::Convert).await.unwrap(),
        vec![ENTRY.to_string()]
    );
    assert!(queue.items(QueueKey::Converted).is_empty());
}

#[tokio::test]
async fn upload_stage_skips_known_instances() {
    let queue = Arc::new(MemoryFileQueue::new());
    let archive = Arc::new(MemoryArchive::new());
    archive.seed_instance("zen.2459866.51702.sum.uvh5");

    let service = UploadService::new(
        queue.clone(),
        archive.clone(),
        UploadConfig {
            data_dir: "/data".into(),
            upload_diff: false,
        },
    );

    let entry = "2459866/zen.2459866.51702.sum.uvh5";
    queue.purgatory_insert(Stage::Upload, entry).await.unwrap();
    service.process(entry).await.unwrap();

    // searched by base name, found, recorded without uploading again
    assert!(archive.uploaded().is_empty());
    assert_eq!(queue.items(QueueKey::Uploaded), vec![entry.to_string()]);
    assert!(queue
        .purgatory_entries(Stage::Upload)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn upload_stage_uploads_new_files() {
    let queue = Arc::new(MemoryFileQueue::new());
    let archive = Arc::new(MemoryArchive::new());

    let service = UploadService::new(
        queue.clone(),
        archive.clone(),
        UploadConfig {
            data_dir: "/data".into(),
            upload_diff: false,
        },
    );

    let entry = "2459866/zen.2459866.51702.sum.uvh5";
    queue.purgatory_insert(Stage::Upload, entry).await.unwrap();
    service.process(entry).await.unwrap();

    let uploaded = archive.uploaded();
    assert_eq!(uploaded.len(), 1);
    assert_eq!(
        uploaded[0].0,
        std::path::PathBuf::from("/data/2459866/zen.2459866.51702.sum.uvh5")
    );
    assert_eq!(uploaded[0].1, entry);
}

#[tokio::test]
async fn upload_stage_rejects_diff_files_by_default() {
    let queue = Arc::new(MemoryFileQueue::new());
    let archive = Arc::new(MemoryArchive::new());

    let default_service =
        UploadService::new(queue.clone(), archive.clone(), UploadConfig::default());
    assert!(!default_service.accepts("zen.2459866.51702.diff.uvh5"));
    assert!(default_service.accepts("zen.2459866.51702.sum.uvh5"));

    let keep_diff = UploadService::new(
        queue,
        archive,
        UploadConfig {
            data_dir: "/data".into(),
            upload_diff: true,
        },
    );
    assert!(keep_diff.accepts("zen.2459866.51702.diff.uvh5"));
}

#[tokio::test]
async fn drained_upload_stage_advances_day_counters() {
    let queue = Arc::new(MemoryFileQueue::new());
    queue.set_day_counter("2459866", 1).await.unwrap();
    queue.set_day_counter("2459867", 0).await.unwrap();

    let service = UploadService::new(
        queue.clone(),
        Arc::new(MemoryArchive::new()),
        UploadConfig::default(),
    );
    service.on_drained().await.unwrap();

    // only the fully converted day advances
    assert_eq!(queue.day_counter("2459866"), Some(2));
    assert_eq!(queue.day_counter("2459867"), Some(0));
}
