// Array geometry
//
// The cminfo snapshot carries antenna positions as geocentric XYZ relative
// to the centre of array. UVWs are phased to the zenith (drift scan), i.e.
// hour angle zero at the array latitude; that rotation needs the positions
// in the local geodetic frame.

use std::collections::HashMap;

use marlu::{HADec, LatLngHeight, XyzGeocentric, XyzGeodetic, UVW};
use ndarray::Array2;

use corrflow_core::domain::CmInfo;
use corrflow_core::error::{AppError, Result};

/// Per-antenna-number geodetic positions
pub fn geodetic_positions(cminfo: &CmInfo) -> HashMap<u32, XyzGeodetic> {
    let array_pos: LatLngHeight = cminfo.array_position();
    let cofa = XyzGeocentric::get_geocentric_vector(array_pos);
    let (s_long, c_long) = array_pos.longitude_rad.sin_cos();

    cminfo
        .antenna_numbers
        .iter()
        .zip(cminfo.antenna_positions.iter())
        .map(|(&num, rel)| {
            let absolute = XyzGeocentric {
                x: cofa.x + rel[0],
                y: cofa.y + rel[1],
                z: cofa.z + rel[2],
            };
            (num, absolute.to_geodetic_inner(cofa, s_long, c_long))
        })
        .collect()
}

/// Zenith-phased UVW per baseline-time row, metres, shape `(nblts, 3)`.
pub fn compute_uvws(
    ant_0: &[i32],
    ant_1: &[i32],
    positions: &HashMap<u32, XyzGeodetic>,
    latitude_rad: f64,
) -> Result<Array2<f64>> {
    let zenith = HADec::from_radians(0.0, latitude_rad);

    let mut uvws = Array2::zeros((ant_0.len(), 3));
    for (row, (&a0, &a1)) in ant_0.iter().zip(ant_1.iter()).enumerate() {
        let lookup = |ant: i32| {
            u32::try_from(ant)
                .ok()
                .and_then(|num| positions.get(&num))
                .ok_or_else(|| {
                    AppError::Conversion(format!("antenna {ant} has no position in cminfo"))
                })
        };
        let baseline = *lookup(a0)? - *lookup(a1)?;
        let uvw = UVW::from_xyz(baseline, zenith);
        uvws[(row, 0)] = uvw.u;
        uvws[(row, 1)] = uvw.v;
        uvws[(row, 2)] = uvw.w;
    }
    Ok(uvws)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_ant_cminfo() -> CmInfo {
        let lon: f64 = 21.428;
        // antenna 1 sits 14.6 m due east of antenna 0
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

    #[test]
    fn autos_have_zero_uvw() {
        let cminfo = two_ant_cminfo();
        let positions = geodetic_positions(&cminfo);
        let uvws = compute_uvws(
            &[0, 1],
            &[0, 1],
            &positions,
            cminfo.array_position().latitude_rad,
        )
        .unwrap();
        for row in 0..2 {
            for col in 0..3 {
                assert!(uvws[(row, col)].abs() < 1e-6);
            }
        }
    }

    #[test]
    fn east_baseline_is_horizontal() {
        let cminfo = two_ant_cminfo();
        let positions = geodetic_positions(&cminfo);
        let uvws = compute_uvws(
            &[0],
            &[1],
            &positions,
            cminfo.array_position().latitude_rad,
        )
        .unwrap();

        let (u, v, w) = (uvws[(0, 0)], uvws[(0, 1)], uvws[(0, 2)]);
        let norm = (u * u + v * v + w * w).sqrt();
        assert!((norm - 14.6).abs() < 0.05, "baseline length {norm}");
        // zenith phase centre: an east-west baseline has essentially no w
        assert!(w.abs() < 0.1, "w = {w}");
        assert!(u.abs() > 14.0, "u = {u}");
    }

    #[test]
    fn unknown_antenna_is_an_error() {
        let cminfo = two_ant_cminfo();
        let positions = geodetic_positions(&cminfo);
        assert!(compute_uvws(&[0], &[7], &positions, -0.5).is_err());
    }
}
