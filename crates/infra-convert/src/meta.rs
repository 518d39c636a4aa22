// Companion metadata container
//
// One HDF5 file per dump, written by the catcher: timing scalars, the
// observation tag, and the per-baseline-time bookkeeping arrays.

use std::collections::BTreeSet;
use std::path::Path;

use hdf5::types::VarLenUnicode;
use hdf5::File;

use corrflow_core::domain::DomainError;
use corrflow_core::error::{AppError, Result};

fn h5err(err: hdf5::Error) -> AppError {
    AppError::Conversion(err.to_string())
}

/// Metadata for one raw dump
#[derive(Debug, Clone)]
pub struct RawMetadata {
    /// F-engine sync time, UTC milliseconds
    pub t0: u64,
    /// MCNT of the last integration in the dump
    pub mcnt: u64,
    pub nfreq: u32,
    pub nstokes: u32,
    /// Correlator git hash
    pub corr_ver: String,
    pub tag: String,
    pub ant_0: Vec<i32>,
    pub ant_1: Vec<i32>,
    /// JD per baseline-time row
    pub time: Vec<f64>,
    /// Seconds per baseline-time row
    pub integration_time: Vec<f64>,
}

impl RawMetadata {
    /// Check the four bookkeeping arrays agree and return `nblts`.
    pub fn validate(&self) -> Result<usize> {
        let nblts = self.ant_0.len();
        let actual = [
            self.ant_1.len(),
            self.time.len(),
            self.integration_time.len(),
        ];
        if actual.iter().any(|&len| len != nblts) {
            return Err(DomainError::ShapeMismatch {
                expected: format!("{nblts} rows in every bookkeeping array"),
                actual: format!("{actual:?}"),
            }
            .into());
        }
        if nblts == 0 {
            return Err(DomainError::ShapeMismatch {
                expected: "at least one baseline-time row".to_string(),
                actual: "0".to_string(),
            }
            .into());
        }
        Ok(nblts)
    }

    pub fn ntimes(&self) -> usize {
        self.time
            .iter()
            .map(|t| t.to_bits())
            .collect::<BTreeSet<_>>()
            .len()
    }

    pub fn start_jd(&self) -> f64 {
        self.time.iter().copied().fold(f64::INFINITY, f64::min)
    }

    pub fn stop_jd(&self) -> f64 {
        self.time.iter().copied().fold(f64::NEG_INFINITY, f64::max)
    }
}

pub fn read_metadata(path: &Path) -> Result<RawMetadata> {
    let file = File::open(path).map_err(h5err)?;

    let scalar_u64 = |name: &str| -> Result<u64> {
        file.dataset(name).map_err(h5err)?.read_scalar().map_err(h5err)
    };
    let scalar_u32 = |name: &str| -> Result<u32> {
        file.dataset(name).map_err(h5err)?.read_scalar().map_err(h5err)
    };
    let scalar_str = |name: &str| -> Result<String> {
        let s: VarLenUnicode = file
            .dataset(name)
            .map_err(h5err)?
            .read_scalar()
            .map_err(h5err)?;
        Ok(s.as_str().to_string())
    };

    Ok(RawMetadata {
        t0: scalar_u64("t0")?,
        mcnt: scalar_u64("mcnt")?,
        nfreq: scalar_u32("nfreq")?,
        nstokes: scalar_u32("nstokes")?,
        corr_ver: scalar_str("corr_ver")?,
        tag: scalar_str("tag")?,
        ant_0: file
            .dataset("ant_0_array")
            .map_err(h5err)?
            .read_raw()
            .map_err(h5err)?,
        ant_1: file
            .dataset("ant_1_array")
            .map_err(h5err)?
            .read_raw()
            .map_err(h5err)?,
        time: file
            .dataset("time_array")
            .map_err(h5err)?
            .read_raw()
            .map_err(h5err)?,
        integration_time: file
            .dataset("integration_time")
            .map_err(h5err)?
            .read_raw()
            .map_err(h5err)?,
    })
}

/// Write a metadata container in the catcher's layout.
///
/// The catcher's C code is the production writer; this one exists for tests
/// and bench fixtures.
pub fn write_metadata(path: &Path, meta: &RawMetadata) -> Result<()> {
    let file = File::create(path).map_err(h5err)?;

    let parse_str = |s: &str| -> Result<VarLenUnicode> {
        s.parse()
            .map_err(|e| AppError::Conversion(format!("bad metadata string: {e}")))
    };

    file.new_dataset::<u64>()
        .create("t0")
        .map_err(h5err)?
        .write_scalar(&meta.t0)
        .map_err(h5err)?;
    file.new_dataset::<u64>()
        .create("mcnt")
        .map_err(h5err)?
        .write_scalar(&meta.mcnt)
        .map_err(h5err)?;
    file.new_dataset::<u32>()
        .create("nfreq")
        .map_err(h5err)?
        .write_scalar(&meta.nfreq)
        .map_err(h5err)?;
    file.new_dataset::<u32>()
        .create("nstokes")
        .map_err(h5err)?
        .write_scalar(&meta.nstokes)
        .map_err(h5err)?;
    file.new_dataset::<VarLenUnicode>()
        .create("corr_ver")
        .map_err(h5err)?
        .write_scalar(&parse_str(&meta.corr_ver)?)
        .map_err(h5err)?;
    file.new_dataset::<VarLenUnicode>()
        .create("tag")
        .map_err(h5err)?
        .write_scalar(&parse_str(&meta.tag)?)
        .map_err(h5err)?;

    file.new_dataset_builder()
        .with_data(&meta.ant_0)
        .create("ant_0_array")
        .map_err(h5err)?;
    file.new_dataset_builder()
        .with_data(&meta.ant_1)
        .create("ant_1_array")
        .map_err(h5err)?;
    file.new_dataset_builder()
        .with_data(&meta.time)
        .create("time_array")
        .map_err(h5err)?;
    file.new_dataset_builder()
        .with_data(&meta.integration_time)
        .create("integration_time")
        .map_err(h5err)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> RawMetadata {
        RawMetadata {
            t0: 1_600_000_000_000,
            mcnt: 123_456,
            nfreq: 6,
            nstokes: 4,
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
        }
    }

    #[test]
    fn roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("zen.meta.hdf5");
        let meta = sample();
        write_metadata(&path, &meta).unwrap();

        let back = read_metadata(&path).unwrap();
        assert_eq!(back.t0, meta.t0);
        assert_eq!(back.mcnt, meta.mcnt);
        assert_eq!(back.nfreq, 6);
        assert_eq!(back.corr_ver, "deadbeef");
        assert_eq!(back.tag, "engineering");
        assert_eq!(back.ant_0, meta.ant_0);
        assert_eq!(back.time, meta.time);
        assert_eq!(back.validate().unwrap(), 6);
        assert_eq!(back.ntimes(), 2);
        assert!((back.start_jd() - 2459866.51702).abs() < 1e-9);
        assert!((back.stop_jd() - 2459866.51724).abs() < 1e-9);
    }

    #[test]
    fn validate_rejects_ragged_arrays() {
        let mut meta = sample();
        meta.time.pop();
        assert!(meta.validate().is_err());
    }
}
