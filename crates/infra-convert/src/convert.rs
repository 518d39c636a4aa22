// Converter implementation
//
// Straight-line ETL: read metadata, read the dump, derive geometry and the
// frequency axis, write UVH5, then verify what landed on disk. Runs on a
// blocking thread pinned to the stage's CPU set.

use std::path::Path;

use tracing::{debug, info, warn};

use corrflow_core::domain::FileTriplet;
use corrflow_core::error::Result;
use corrflow_core::port::{ConversionContext, ConversionReport, Converter};

use crate::{geometry, meta, raw, uvh5};

pub struct UvConverter {
    cpu_affinity: Vec<usize>,
}

impl UvConverter {
    pub fn new(cpu_affinity: Vec<usize>) -> Self {
        Self { cpu_affinity }
    }

    #[cfg(target_os = "linux")]
    fn pin_thread(&self) {
        if self.cpu_affinity.is_empty() {
            return;
        }
        let mut cpu_set = nix::sched::CpuSet::new();
        for &cpu in &self.cpu_affinity {
            if cpu_set.set(cpu).is_err() {
                warn!(cpu, "cpu outside the affinity mask range");
            }
        }
        if let Err(e) = nix::sched::sched_setaffinity(nix::unistd::Pid::from_raw(0), &cpu_set) {
            warn!(error = %e, "failed to set cpu affinity");
        }
    }

    #[cfg(not(target_os = "linux"))]
    fn pin_thread(&self) {}
}

impl Converter for UvConverter {
    fn convert(&self, triplet: &FileTriplet, ctx: &ConversionContext) -> Result<ConversionReport> {
        self.pin_thread();

        let metadata = meta::read_metadata(&triplet.meta)?;
        let nblts = metadata.validate()?;
        debug!(
            file = %triplet.raw.display(),
            nblts,
            nfreq = metadata.nfreq,
            nstokes = metadata.nstokes,
            "read metadata"
        );

        let data = raw::read_raw_vis(
            &triplet.raw,
            nblts,
            metadata.nfreq as usize,
            metadata.nstokes as usize,
        )?;

        let positions = geometry::geodetic_positions(&ctx.cminfo);
        let uvw = geometry::compute_uvws(
            &metadata.ant_0,
            &metadata.ant_1,
            &positions,
            ctx.cminfo.array_position().latitude_rad,
        )?;

        uvh5::write_uvh5(&triplet.output, &metadata, &ctx.cminfo, &ctx.freq, &data, &uvw)?;
        uvh5::check_file(&triplet.output)?;

        let size_bytes = std::fs::metadata(&triplet.output)?.len();
        info!(output = %triplet.output.display(), size_bytes, "conversion written");

        Ok(ConversionReport {
            output: triplet.output.clone(),
            nblts,
            ntimes: metadata.ntimes(),
            start_jd: metadata.start_jd(),
            stop_jd: metadata.stop_jd(),
            size_bytes,
            tag: metadata.tag.clone(),
        })
    }

    fn discard_partial(&self, triplet: &FileTriplet) -> Result<()> {
        remove_if_present(&triplet.output)
    }
}

fn remove_if_present(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => {
            info!(file = %path.display(), "removed partial output");
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::{LittleEndian, WriteBytesExt};
    use corrflow_core::domain::{filename, CmInfo, FreqSetup};
    use std::io::Write;

    // samples_per_mcnt 64 -> 32 fine channels -> 6 output channels
    const NFREQ: usize = 6;
    const NSTOKES: usize = 4;

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

    fn fixture_ctx() -> ConversionContext {
        ConversionContext {
            cminfo: fixture_cminfo(),
            freq: FreqSetup {
                sample_freq_hz: 500e6,
                samples_per_mcnt: 64,
            },
        }
    }

    /// Write a matching raw + meta pair; 2 times x 3 baselines
    fn write_fixture(dir: &Path) -> FileTriplet {
        let entry = "zen.2459866.51702.sum.dat";
        let triplet = filename::match_up(entry, Some(dir)).unwrap();

        let metadata = meta::RawMetadata {
            t0: 1_600_000_000_000,
            mcnt: 98_304,
            nfreq: NFREQ as u32,
            nstokes: NSTOKES as u32,
            corr_ver: "deadbeef".to_string(),
            tag: "engineering".to_string(),
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
        meta::write_metadata(&triplet.meta, &metadata).unwrap();

        let mut buf = Vec::new();
        for n in 0..(6 * NFREQ * NSTOKES) as i32 {
            buf.write_i32::<LittleEndian>(n).unwrap();
            buf.write_i32::<LittleEndian>(-n).unwrap();
        }
        let mut f = std::fs::File::create(&triplet.raw).unwrap();
        f.write_all(&buf).unwrap();

        triplet
    }

    #[test]
    fn converts_and_verifies() {
        let dir = tempfile::tempdir().unwrap();
        let triplet = write_fixture(dir.path());

        let converter = UvConverter::new(vec![]);
        let report = converter.convert(&triplet, &fixture_ctx()).unwrap();

        assert_eq!(report.nblts, 6);
        assert_eq!(report.ntimes, 2);
        assert_eq!(report.tag, "engineering");
        assert!((report.start_jd - 2459866.51702).abs() < 1e-9);
        assert!((report.stop_jd - 2459866.51724).abs() < 1e-9);
        assert!(report.size_bytes > 0);
        assert!(triplet.output.exists());

        // data survives the roundtrip
        let file = hdf5::File::open(&triplet.output).unwrap();
        let vis: ndarray::Array3<raw::CorrVis> =
            file.dataset("Data/visdata").unwrap().read().unwrap();
        assert_eq!(vis.dim(), (6, NFREQ, NSTOKES));
        assert_eq!(vis[(0, 0, 1)], raw::CorrVis { r: 1, i: -1 });

        let nblts: i64 = file.dataset("Header/Nblts").unwrap().read_scalar().unwrap();
        assert_eq!(nblts, 6);
        let nbls: i64 = file.dataset("Header/Nbls").unwrap().read_scalar().unwrap();
        assert_eq!(nbls, 3);
        let ntimes: i64 = file.dataset("Header/Ntimes").unwrap().read_scalar().unwrap();
        assert_eq!(ntimes, 2);

        let freqs: Vec<f64> = file.dataset("Header/freq_array").unwrap().read_raw().unwrap();
        assert_eq!(freqs.len(), NFREQ);

        // autos phased to zenith carry zero uvw
        let uvw: ndarray::Array2<f64> =
            file.dataset("Header/uvw_array").unwrap().read().unwrap();
        assert!(uvw[(0, 0)].abs() < 1e-6);
        assert!(uvw[(1, 0)].abs() > 14.0); // the east-west cross baseline
    }

    #[test]
    fn mismatched_channel_count_fails() {
        let dir = tempfile::tempdir().unwrap();
        let triplet = write_fixture(dir.path());

        let mut ctx = fixture_ctx();
        // 128 samples -> 12 output channels, metadata says 6
        ctx.freq.samples_per_mcnt = 128;

        assert!(UvConverter::new(vec![]).convert(&triplet, &ctx).is_err());
    }

    #[test]
    fn short_dump_fails_shape_check() {
        let dir = tempfile::tempdir().unwrap();
        let triplet = write_fixture(dir.path());
        let f = std::fs::OpenOptions::new()
            .write(true)
            .open(&triplet.raw)
            .unwrap();
        f.set_len(100).unwrap();

        assert!(UvConverter::new(vec![])
            .convert(&triplet, &fixture_ctx())
            .is_err());
    }

    #[test]
    fn discard_partial_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let triplet = write_fixture(dir.path());
        let converter = UvConverter::new(vec![]);

        // nothing on disk yet
        converter.discard_partial(&triplet).unwrap();

        converter.convert(&triplet, &fixture_ctx()).unwrap();
        assert!(triplet.output.exists());
        converter.discard_partial(&triplet).unwrap();
        assert!(!triplet.output.exists());
        converter.discard_partial(&triplet).unwrap();
    }
}
