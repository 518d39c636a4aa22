// Telescope configuration-management snapshot
//
// The M&C system publishes a JSON snapshot of the array layout to the shared
// store; the conversion stage reads it rather than querying M&C directly, so
// conversions keep working when the site database is unreachable.

use marlu::LatLngHeight;
use serde::{Deserialize, Serialize};

use super::error::{DomainError, Result};

/// Array layout snapshot ("cminfo")
///
/// Antenna positions are geocentric XYZ in metres, relative to the array
/// centre (the "centre of array" station).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CmInfo {
    /// Centre-of-array latitude, degrees
    pub cofa_lat: f64,
    /// Centre-of-array longitude, degrees
    pub cofa_lon: f64,
    /// Centre-of-array altitude, metres
    pub cofa_alt: f64,
    pub antenna_numbers: Vec<u32>,
    pub antenna_names: Vec<String>,
    pub antenna_positions: Vec<[f64; 3]>,
}

impl CmInfo {
    pub fn from_json(json: &str) -> Result<Self> {
        let info: Self = serde_json::from_str(json)
            .map_err(|e| DomainError::ValidationError(format!("bad cminfo snapshot: {e}")))?;
        info.validate()?;
        Ok(info)
    }

    pub fn validate(&self) -> Result<()> {
        let n = self.antenna_numbers.len();
        if self.antenna_names.len() != n || self.antenna_positions.len() != n {
            return Err(DomainError::ShapeMismatch {
                expected: format!("{n} antenna names and positions"),
                actual: format!(
                    "{} names, {} positions",
                    self.antenna_names.len(),
                    self.antenna_positions.len()
                ),
            });
        }
        if n == 0 {
            return Err(DomainError::ValidationError(
                "cminfo snapshot lists no antennas".to_string(),
            ));
        }
        Ok(())
    }

    pub fn nants(&self) -> usize {
        self.antenna_numbers.len()
    }

    pub fn array_position(&self) -> LatLngHeight {
        LatLngHeight {
            longitude_rad: self.cofa_lon.to_radians(),
            latitude_rad: self.cofa_lat.to_radians(),
            height_metres: self.cofa_alt,
        }
    }

    /// Uniform dish diameters, metres
    pub fn antenna_diameters(&self) -> Vec<f64> {
        vec![14.0; self.nants()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_validate() {
        let info = CmInfo::from_json(
            r#"{
                "cofa_lat": -30.72, "cofa_lon": 21.43, "cofa_alt": 1051.7,
                "antenna_numbers": [0, 1],
                "antenna_names": ["HH0", "HH1"],
                "antenna_positions": [[0.0, 0.0, 0.0], [14.6, 0.0, 0.0]]
            }"#,
        )
        .unwrap();
        assert_eq!(info.nants(), 2);
        assert!((info.array_position().latitude_rad - (-30.72f64).to_radians()).abs() < 1e-12);
    }

    #[test]
    fn mismatched_tables_rejected() {
        let err = CmInfo::from_json(
            r#"{
                "cofa_lat": -30.72, "cofa_lon": 21.43, "cofa_alt": 1051.7,
                "antenna_numbers": [0, 1],
                "antenna_names": ["HH0"],
                "antenna_positions": [[0.0, 0.0, 0.0], [14.6, 0.0, 0.0]]
            }"#,
        );
        assert!(err.is_err());
    }
}
