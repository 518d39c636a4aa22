// UVH5 writer
//
// Layout per the UVH5 memo: a /Header group of UVParameters plus a /Data
// group holding visdata, flags and nsamples. The visibility dataset keeps
// the correlator's compound (r, i) int32 dtype and is bitshuffle+LZ4
// compressed when the plugin is present; flags and nsamples use LZF.

use std::path::Path;

use hdf5::types::{TypeDescriptor, VarLenUnicode};
use hdf5::{File, Group, H5Type};
use ndarray::{Array1, Array2, Array3};
use tracing::warn;

use corrflow_core::domain::{CmInfo, DomainError, FreqSetup};
use corrflow_core::error::{AppError, Result};

use crate::meta::RawMetadata;
use crate::raw::CorrVis;

/// Registered HDF5 filter id of bitshuffle
const BITSHUFFLE_FILTER: i32 = 32008;
/// Bitshuffle cd_values: automatic block size, LZ4 compression
const BITSHUFFLE_OPTS: [u32; 2] = [0, 2];

/// Chunk target: ~1 MB at the production channel count
const CHUNK_BLTS: usize = 128;

fn h5err(err: hdf5::Error) -> AppError {
    AppError::Conversion(err.to_string())
}

fn vlu(s: &str) -> Result<VarLenUnicode> {
    s.parse()
        .map_err(|e| AppError::Conversion(format!("bad header string: {e}")))
}

fn write_str(group: &Group, name: &str, value: &str) -> Result<()> {
    group
        .new_dataset::<VarLenUnicode>()
        .create(name)
        .map_err(h5err)?
        .write_scalar(&vlu(value)?)
        .map_err(h5err)
}

fn write_scalar<T: H5Type>(group: &Group, name: &str, value: T) -> Result<()> {
    group
        .new_dataset::<T>()
        .create(name)
        .map_err(h5err)?
        .write_scalar(&value)
        .map_err(h5err)
}

/// Write the output file. `uvw` is `(nblts, 3)`, `data` is
/// `(nblts, nfreq, nstokes)`.
pub fn write_uvh5(
    path: &Path,
    meta: &RawMetadata,
    cminfo: &CmInfo,
    freq: &FreqSetup,
    data: &Array3<CorrVis>,
    uvw: &Array2<f64>,
) -> Result<()> {
    let (nblts, nfreq, nstokes) = data.dim();

    let freqs = freq.channel_freqs_hz()?;
    if freqs.len() != nfreq {
        return Err(DomainError::ShapeMismatch {
            expected: format!("{nfreq} channels from the metadata"),
            actual: format!("{} channels from the F-engine setup", freqs.len()),
        }
        .into());
    }

    let file = File::create(path).map_err(h5err)?;
    let header = file.create_group("Header").map_err(h5err)?;
    let extra = header.create_group("extra_keywords").map_err(h5err)?;
    let data_grp = file.create_group("Data").map_err(h5err)?;

    // telescope + phasing info
    write_scalar(&header, "latitude", cminfo.cofa_lat)?;
    write_scalar(&header, "longitude", cminfo.cofa_lon)?;
    write_scalar(&header, "altitude", cminfo.cofa_alt)?;
    write_str(&header, "telescope_name", "HERA")?;
    write_str(&header, "instrument", "HERA")?;
    write_str(&header, "object_name", "zenith")?;
    write_str(&header, "phase_type", "drift")?;

    // required UVParameters
    let nants_data = {
        let mut ants = meta.ant_0.clone();
        ants.sort_unstable();
        ants.dedup();
        ants.len()
    };
    let nbls = {
        let mut pairs: Vec<(i32, i32)> = meta
            .ant_0
            .iter()
            .zip(meta.ant_1.iter())
            .map(|(&a, &b)| (a, b))
            .collect();
        pairs.sort_unstable();
        pairs.dedup();
        pairs.len()
    };
    write_scalar(&header, "Nants_data", nants_data as i64)?;
    write_scalar(&header, "Nants_telescope", cminfo.nants() as i64)?;
    write_scalar(&header, "Nbls", nbls as i64)?;
    write_scalar(&header, "Nblts", nblts as i64)?;
    write_scalar(&header, "Nfreqs", nfreq as i64)?;
    write_scalar(&header, "Npols", nstokes as i64)?;
    write_scalar(&header, "Nspws", 1i64)?;
    write_scalar(&header, "Ntimes", meta.ntimes() as i64)?;

    let ant_numbers: Array1<i32> = cminfo.antenna_numbers.iter().map(|&n| n as i32).collect();
    header
        .new_dataset_builder()
        .with_data(&ant_numbers)
        .create("antenna_numbers")
        .map_err(h5err)?;
    header
        .new_dataset_builder()
        .with_data(uvw)
        .create("uvw_array")
        .map_err(h5err)?;
    write_str(&header, "vis_units", "uncalib")?;
    header
        .new_dataset_builder()
        .with_data(&Array1::from(freq.channel_widths_hz()))
        .create("channel_width")
        .map_err(h5err)?;
    header
        .new_dataset_builder()
        .with_data(&meta.time)
        .create("time_array")
        .map_err(h5err)?;
    header
        .new_dataset_builder()
        .with_data(&Array1::from(freqs))
        .create("freq_array")
        .map_err(h5err)?;
    header
        .new_dataset_builder()
        .with_data(&meta.integration_time)
        .create("integration_time")
        .map_err(h5err)?;
    header
        .new_dataset_builder()
        .with_data(&Array1::from(vec![-5i32, -6, -7, -8]))
        .create("polarization_array")
        .map_err(h5err)?;
    header
        .new_dataset_builder()
        .with_data(&Array1::from(vec![0i32]))
        .create("spw_array")
        .map_err(h5err)?;
    header
        .new_dataset_builder()
        .with_data(&meta.ant_0)
        .create("ant_1_array")
        .map_err(h5err)?;
    header
        .new_dataset_builder()
        .with_data(&meta.ant_1)
        .create("ant_2_array")
        .map_err(h5err)?;

    let positions = Array2::from_shape_fn((cminfo.nants(), 3), |(i, j)| {
        cminfo.antenna_positions[i][j]
    });
    header
        .new_dataset_builder()
        .with_data(&positions)
        .create("antenna_positions")
        .map_err(h5err)?;
    write_scalar(&header, "flex_spw", false)?;
    write_scalar(&header, "multi_phase_center", false)?;

    let names: Result<Vec<VarLenUnicode>> =
        cminfo.antenna_names.iter().map(|n| vlu(n)).collect();
    header
        .new_dataset_builder()
        .with_data(&Array1::from(names?))
        .create("antenna_names")
        .map_err(h5err)?;
    write_str(
        &header,
        "history",
        &format!(
            "Written by the correlator pipeline on {}.",
            chrono::Utc::now().to_rfc2822()
        ),
    )?;

    // optional parameters
    write_str(&header, "x_orientation", "north")?;
    header
        .new_dataset_builder()
        .with_data(&Array1::from(cminfo.antenna_diameters()))
        .create("antenna_diameters")
        .map_err(h5err)?;

    // extra keywords
    write_scalar(&extra, "t0", meta.t0)?;
    write_scalar(&extra, "mcnt", meta.mcnt)?;
    write_str(&extra, "corr_ver", &meta.corr_ver)?;
    write_str(&extra, "tag", &meta.tag)?;

    // data
    let chunks = (CHUNK_BLTS.min(nblts), nfreq, 1);
    let with_bitshuffle = data_grp
        .new_dataset_builder()
        .with_data(data)
        .chunk(chunks)
        .add_filter(BITSHUFFLE_FILTER, &BITSHUFFLE_OPTS)
        .create("visdata");
    if let Err(e) = with_bitshuffle {
        warn!(error = %e, "bitshuffle unavailable, writing visdata uncompressed");
        data_grp
            .new_dataset_builder()
            .with_data(data)
            .chunk(chunks)
            .create("visdata")
            .map_err(h5err)?;
    }

    let flags = Array3::<bool>::from_elem((nblts, nfreq, nstokes), false);
    data_grp
        .new_dataset_builder()
        .with_data(&flags)
        .chunk(chunks)
        .lzf()
        .create("flags")
        .map_err(h5err)?;

    let nsamples = Array3::<f32>::from_elem((nblts, nfreq, nstokes), 1.0);
    data_grp
        .new_dataset_builder()
        .with_data(&nsamples)
        .chunk(chunks)
        .lzf()
        .create("nsamples")
        .map_err(h5err)?;

    Ok(())
}

/// Make sure a converted file has the expected data/flag/nsample datasets
/// with the right shapes and dtypes.
pub fn check_file(path: &Path) -> Result<()> {
    let file = File::open(path).map_err(h5err)?;

    let members = file.group("Data").map_err(h5err)?.member_names().map_err(h5err)?;
    if members.len() != 3 {
        return Err(AppError::Conversion(format!(
            "/Data has {} datasets, expected 3",
            members.len()
        )));
    }

    let header = file.group("Header").map_err(h5err)?;
    let scalar_i64 = |name: &str| -> Result<i64> {
        header
            .dataset(name)
            .map_err(h5err)?
            .read_scalar()
            .map_err(h5err)
    };
    let expected = vec![
        scalar_i64("Nblts")? as usize,
        scalar_i64("Nfreqs")? as usize,
        scalar_i64("Npols")? as usize,
    ];

    let expect = |name: &str, descriptor: TypeDescriptor| -> Result<()> {
        let ds = file.dataset(&format!("Data/{name}")).map_err(h5err)?;
        if ds.shape() != expected {
            return Err(DomainError::ShapeMismatch {
                expected: format!("{expected:?}"),
                actual: format!("{name}: {:?}", ds.shape()),
            }
            .into());
        }
        let actual = ds.dtype().map_err(h5err)?.to_descriptor().map_err(h5err)?;
        if actual != descriptor {
            return Err(AppError::Conversion(format!(
                "{name} has dtype {actual:?}, expected {descriptor:?}"
            )));
        }
        Ok(())
    };

    expect("visdata", CorrVis::type_descriptor())?;
    expect("flags", bool::type_descriptor())?;
    expect("nsamples", f32::type_descriptor())?;
    Ok(())
}
