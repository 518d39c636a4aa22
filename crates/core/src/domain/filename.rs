// Raw dump file naming
//
// The catcher writes `zen.<jd>.<frac>.<sum|diff>.dat` plus a shared
// `zen.<jd>.<frac>.meta.hdf5` per integration window. Everything downstream
// (conversion output name, M&C obsid, day counters) is derived from that
// pattern.

use std::fmt;
use std::path::{Path, PathBuf};

use lazy_static::lazy_static;
use regex::Regex;

use super::error::{DomainError, Result};

lazy_static! {
    static ref RAW_NAME: Regex = Regex::new(r"^zen\.(\d+)\.(\d+)\.(sum|diff)\.dat$").unwrap();
}

/// Whether a dump holds the even+odd sum or the even-odd difference
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Sum,
    Diff,
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileKind::Sum => write!(f, "sum"),
            FileKind::Diff => write!(f, "diff"),
        }
    }
}

/// Parsed `zen.<jd>.<frac>.<sum|diff>.dat` name
///
/// The fractional day is kept as the original zero-padded digit string so
/// that derived names match the catcher's byte-for-byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFileName {
    pub jd_day: u32,
    pub jd_frac: String,
    pub kind: FileKind,
}

impl RawFileName {
    pub fn parse(name: &str) -> Result<Self> {
        let caps = RAW_NAME
            .captures(name)
            .ok_or_else(|| DomainError::FilenameMismatch(name.to_string()))?;

        let jd_day: u32 = caps[1]
            .parse()
            .map_err(|_| DomainError::FilenameMismatch(name.to_string()))?;
        let kind = match &caps[3] {
            "sum" => FileKind::Sum,
            _ => FileKind::Diff,
        };

        Ok(Self {
            jd_day,
            jd_frac: caps[2].to_string(),
            kind,
        })
    }

    /// Start of the dump as a Julian date
    pub fn start_jd(&self) -> f64 {
        let frac: f64 = format!("0.{}", self.jd_frac).parse().unwrap_or(0.0);
        f64::from(self.jd_day) + frac
    }

    /// Day identifier used by the per-day completion counters
    pub fn day(&self) -> String {
        self.jd_day.to_string()
    }

    pub fn raw_name(&self) -> String {
        format!("zen.{}.{}.{}.dat", self.jd_day, self.jd_frac, self.kind)
    }

    pub fn meta_name(&self) -> String {
        format!("zen.{}.{}.meta.hdf5", self.jd_day, self.jd_frac)
    }

    pub fn output_name(&self) -> String {
        format!("zen.{}.{}.{}.uvh5", self.jd_day, self.jd_frac, self.kind)
    }
}

/// A raw dump plus its companion metadata and output paths
#[derive(Debug, Clone)]
pub struct FileTriplet {
    pub name: RawFileName,
    pub raw: PathBuf,
    pub meta: PathBuf,
    pub output: PathBuf,
}

/// Derive the companion metadata and output paths for a queue entry.
///
/// `entry` is the string popped from the raw queue; it may carry a directory
/// component relative to the catcher's working directory `cwd`.
pub fn match_up(entry: &str, cwd: Option<&Path>) -> Result<FileTriplet> {
    let entry_path = Path::new(entry);
    let file_name = entry_path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| DomainError::FilenameMismatch(entry.to_string()))?;
    let name = RawFileName::parse(file_name)?;

    let mut dir = match cwd {
        // join() keeps already-absolute entry paths as-is
        Some(cwd) => cwd.join(entry_path.parent().unwrap_or_else(|| Path::new(""))),
        None => entry_path.parent().unwrap_or_else(|| Path::new("")).to_path_buf(),
    };
    if dir.as_os_str().is_empty() {
        dir = PathBuf::from(".");
    }

    Ok(FileTriplet {
        raw: dir.join(name.raw_name()),
        meta: dir.join(name.meta_name()),
        output: dir.join(name.output_name()),
        name,
    })
}

/// Record a finished output relative to the catcher's working directory, the
/// form downstream consumers expect on the converted queue.
pub fn relative_output(triplet: &FileTriplet, cwd: Option<&Path>) -> String {
    let out = &triplet.output;
    match cwd.and_then(|cwd| out.strip_prefix(cwd).ok()) {
        Some(rel) => rel.to_string_lossy().into_owned(),
        None => out.to_string_lossy().into_owned(),
    }
}
