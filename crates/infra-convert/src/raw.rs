// Raw visibility dump codec
//
// The catcher writes a flat stream of little-endian (i32 real, i32 imag)
// records, baseline-time fastest over frequency over polarization. There is
// no header; the shape comes entirely from the companion metadata.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt};
use hdf5::H5Type;
use ndarray::Array3;

use corrflow_core::domain::DomainError;
use corrflow_core::error::{AppError, Result};

/// One visibility sample as the correlator emits it
#[derive(H5Type, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(C)]
pub struct CorrVis {
    pub r: i32,
    pub i: i32,
}

pub const RECORD_BYTES: usize = 8;

/// Read a dump and reshape it to `(nblts, nfreq, nstokes)`.
pub fn read_raw_vis(
    path: &Path,
    nblts: usize,
    nfreq: usize,
    nstokes: usize,
) -> Result<Array3<CorrVis>> {
    let expected = nblts * nfreq * nstokes;
    let file_len = std::fs::metadata(path)?.len() as usize;
    let available = file_len / RECORD_BYTES;
    if available != expected || file_len % RECORD_BYTES != 0 {
        return Err(DomainError::ShapeMismatch {
            expected: format!("({nblts}, {nfreq}, {nstokes}) = {expected} records"),
            actual: format!("{file_len} bytes = {available} records"),
        }
        .into());
    }

    let mut reader = BufReader::new(File::open(path)?);
    let mut records = Vec::with_capacity(expected);
    for _ in 0..expected {
        let r = reader.read_i32::<LittleEndian>()?;
        let i = reader.read_i32::<LittleEndian>()?;
        records.push(CorrVis { r, i });
    }

    // a longer file than stat reported means someone is still writing it
    let mut probe = [0u8; 1];
    if reader.read(&mut probe)? != 0 {
        return Err(AppError::Conversion(format!(
            "{} grew while being read",
            path.display()
        )));
    }

    Array3::from_shape_vec((nblts, nfreq, nstokes), records)
        .map_err(|e| AppError::Conversion(format!("reshape failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::WriteBytesExt;
    use std::io::Write;

    fn write_records(path: &Path, count: usize) {
        let mut buf = Vec::new();
        for n in 0..count as i32 {
            buf.write_i32::<LittleEndian>(n).unwrap();
            buf.write_i32::<LittleEndian>(-n).unwrap();
        }
        let mut f = File::create(path).unwrap();
        f.write_all(&buf).unwrap();
    }

    #[test]
    fn read_and_reshape() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("zen.dat");
        write_records(&path, 2 * 3 * 4);

        let data = read_raw_vis(&path, 2, 3, 4).unwrap();
        assert_eq!(data.dim(), (2, 3, 4));
        assert_eq!(data[(0, 0, 0)], CorrVis { r: 0, i: 0 });
        assert_eq!(data[(0, 0, 1)], CorrVis { r: 1, i: -1 });
        assert_eq!(data[(1, 2, 3)], CorrVis { r: 23, i: -23 });
    }

    #[test]
    fn wrong_size_is_shape_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("zen.dat");
        write_records(&path, 10);

        let err = read_raw_vis(&path, 2, 3, 4).unwrap_err();
        assert!(matches!(
            err,
            AppError::Domain(DomainError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn truncated_record_is_shape_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("zen.dat");
        write_records(&path, 4);
        // chop half a record off
        let f = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
        f.set_len(4 * 8 - 3).unwrap();

        assert!(read_raw_vis(&path, 1, 2, 2).is_err());
    }
}
