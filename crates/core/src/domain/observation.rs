// Observation timing arithmetic
//
// Everything here is pure: the inputs come from the shared store and the
// clock, the outputs are written back by the observation service. MCNT is
// the correlator's master count; for this instrument one MCNT is one
// F-engine spectrum.

use std::f64::consts::TAU;

use hifitime::{Duration, Epoch};
use marlu::precession::get_lmst;

use super::error::{DomainError, Result};

pub const DEFAULT_ACC_LEN: u32 = 147456 / 4;
pub const DEFAULT_SAMPLE_RATE_HZ: f64 = 500e6;
pub const DEFAULT_NCHAN: u32 = 8192;
pub const DEFAULT_XPIPES: u32 = 2;
pub const DEFAULT_MCNT_BLOCK_SIZE: u32 = 2048;
pub const DEFAULT_SLICES: u32 = 2;
pub const DEFAULT_START_DELAY_S: f64 = 60.0;

const SIDEREAL_DAY_S: f64 = 86164.0905;

/// Number of MCNTs in one second
pub fn mcnts_per_second(sample_rate_hz: f64, nchan: u32) -> f64 {
    sample_rate_hz / (f64::from(nchan) * 2.0)
}

/// Requested observation, before timing resolution
#[derive(Debug, Clone)]
pub struct ObservationSpec {
    /// Observation length in hours
    pub obs_len_hr: f64,
    /// F-engine synchronization time, UTC milliseconds
    pub feng_sync_time_ms: i64,
    /// Earliest start is now + this delay
    pub start_delay_s: f64,
    /// Accumulated spectra per integration
    pub acc_len: u32,
    /// X-engine pipeline instances per host
    pub xpipes: u32,
    /// ADC sample rate, Hz
    pub sample_rate_hz: f64,
    /// F-engine output channels
    pub nchan: u32,
    /// xGPU integration granularity, MCNTs
    pub mcnt_block_size: u32,
    /// Independent time-slice correlators (even/odd)
    pub slices: u32,
}

impl ObservationSpec {
    pub fn new(obs_len_hr: f64, feng_sync_time_ms: i64) -> Self {
        Self {
            obs_len_hr,
            feng_sync_time_ms,
            start_delay_s: DEFAULT_START_DELAY_S,
            acc_len: DEFAULT_ACC_LEN,
            xpipes: DEFAULT_XPIPES,
            sample_rate_hz: DEFAULT_SAMPLE_RATE_HZ,
            nchan: DEFAULT_NCHAN,
            mcnt_block_size: DEFAULT_MCNT_BLOCK_SIZE,
            slices: DEFAULT_SLICES,
        }
    }

    /// Resolve the request against the clock and the array longitude.
    ///
    /// The start time lands on the next LST bin boundary (bins are one file
    /// duration wide) so files line up across nights; the trigger MCNT is
    /// rounded down to the xGPU block granularity.
    pub fn plan(&self, now_ms: i64, longitude_rad: f64) -> Result<ObservationPlan> {
        if self.acc_len % self.mcnt_block_size != 0 {
            return Err(DomainError::ValidationError(format!(
                "acc_len {} must be divisible by the xGPU block size {}",
                self.acc_len, self.mcnt_block_size
            )));
        }

        let obs_len_s = (self.obs_len_hr * 3600.0) as u64;
        let file_duration_ms = (2.0
            * 2.0
            * (f64::from(self.acc_len) * 2.0)
            * f64::from(self.xpipes)
            * 2.0
            * f64::from(self.nchan)
            / self.sample_rate_hz
            * 1000.0) as u64;
        let file_duration_s = file_duration_ms as f64 / 1000.0;
        let nfiles = (obs_len_s as f64 / file_duration_s) as u64;

        let earliest_ms = now_ms + (self.start_delay_s * 1000.0) as i64;
        let start_time_ms = lst_aligned_start_ms(earliest_ms, file_duration_s, longitude_rad);

        let mcnt_per_s = mcnts_per_second(self.sample_rate_hz, self.nchan);
        let t0_s = self.feng_sync_time_ms as f64 / 1000.0;
        let mcnt_delay = (start_time_ms as f64 / 1000.0 - t0_s) * mcnt_per_s;
        if mcnt_delay < 0.0 {
            return Err(DomainError::ValidationError(format!(
                "start time {start_time_ms} ms predates the F-engine sync time {}",
                self.feng_sync_time_ms
            )));
        }

        let granularity = u64::from(self.mcnt_block_size) * u64::from(self.slices);
        let trig_mcnt = mcnt_delay as u64 / granularity * granularity;
        let trig_time_ms = ((trig_mcnt as f64 / mcnt_per_s + t0_s) * 1000.0).round() as i64;
        let int_time_s = f64::from(self.acc_len) * f64::from(self.slices) / mcnt_per_s;

        Ok(ObservationPlan {
            acc_len: self.acc_len,
            obs_len_s,
            file_duration_ms,
            nfiles,
            start_time_ms,
            trig_mcnt,
            trig_time_ms,
            int_time_s,
            feng_sync_time_ms: self.feng_sync_time_ms,
        })
    }
}

/// Resolved observation timing, as persisted to the shared store
#[derive(Debug, Clone, PartialEq)]
pub struct ObservationPlan {
    pub acc_len: u32,
    pub obs_len_s: u64,
    pub file_duration_ms: u64,
    pub nfiles: u64,
    /// UTC milliseconds, on an LST bin boundary
    pub start_time_ms: i64,
    pub trig_mcnt: u64,
    pub trig_time_ms: i64,
    pub int_time_s: f64,
    pub feng_sync_time_ms: i64,
}

/// First instant at or after `earliest_ms` whose LST is a whole multiple of
/// the `bin_seconds`-wide LST bin.
pub fn lst_aligned_start_ms(earliest_ms: i64, bin_seconds: f64, longitude_rad: f64) -> i64 {
    let epoch = Epoch::from_unix_seconds(earliest_ms as f64 / 1000.0);
    let lst = get_lmst(longitude_rad, epoch, Duration::from_seconds(0.0));

    // LST advances TAU per sidereal day; a bin of N solar seconds spans
    // N * (TAU / sidereal day) radians of LST.
    let rate = TAU / SIDEREAL_DAY_S;
    let bin_rad = bin_seconds * rate;
    let wait_rad = (lst / bin_rad).ceil() * bin_rad - lst;
    let wait_ms = (wait_rad / rate * 1000.0).round() as i64;

    earliest_ms + wait_ms
}

#[cfg(test)]
mod tests {
    use super::*;

    const LONGITUDE_RAD: f64 = 0.37399448506783717; // 21.428 degrees east

    #[test]
    fn mcnt_rate() {
        assert!((mcnts_per_second(500e6, 8192) - 30517.578125).abs() < 1e-9);
    }

    #[test]
    fn production_file_duration() {
        let spec = ObservationSpec::new(2.0, 1_600_000_000_000);
        let plan = spec.plan(1_600_000_100_000, LONGITUDE_RAD).unwrap();
        // 2*2*(36864*2)*2*2*8192/500e6*1000
        assert_eq!(plan.file_duration_ms, 19327);
        assert_eq!(plan.nfiles, (7200.0f64 / 19.327) as u64);
        assert_eq!(plan.obs_len_s, 7200);
    }

    #[test]
    fn trigger_lands_on_block_boundary() {
        let spec = ObservationSpec::new(1.0, 1_600_000_000_000);
        let plan = spec.plan(1_600_000_100_000, LONGITUDE_RAD).unwrap();
        assert_eq!(plan.trig_mcnt % (2048 * 2), 0);
        assert!(plan.trig_time_ms >= plan.feng_sync_time_ms);
        // trigger cannot be later than the requested start
        let mcnt_per_s = mcnts_per_second(500e6, 8192);
        let trig_s = plan.trig_mcnt as f64 / mcnt_per_s + 1_600_000_000.0;
        assert!(trig_s * 1000.0 <= plan.start_time_ms as f64 + 1.0);
    }

    #[test]
    fn start_respects_delay_and_alignment() {
        let now_ms = 1_600_000_000_000;
        let spec = ObservationSpec::new(1.0, now_ms - 3_600_000);
        let plan = spec.plan(now_ms, LONGITUDE_RAD).unwrap();
        assert!(plan.start_time_ms >= now_ms + 60_000);

        // The start's LST sits on a bin boundary
        let rate = TAU / SIDEREAL_DAY_S;
        let bin_rad = plan.file_duration_ms as f64 / 1000.0 * rate;
        let epoch = Epoch::from_unix_seconds(plan.start_time_ms as f64 / 1000.0);
        let lst = get_lmst(LONGITUDE_RAD, epoch, Duration::from_seconds(0.0));
        let frac = (lst / bin_rad).fract();
        assert!(
            frac < 1e-4 || frac > 1.0 - 1e-4,
            "LST {lst} not on a {bin_rad}-radian bin boundary (frac {frac})"
        );
    }

    #[test]
    fn misaligned_acc_len_rejected() {
        let mut spec = ObservationSpec::new(1.0, 1_600_000_000_000);
        spec.acc_len = 1000;
        assert!(spec.plan(1_600_000_100_000, LONGITUDE_RAD).is_err());
    }

    #[test]
    fn start_before_sync_rejected() {
        let now_ms = 1_600_000_000_000;
        // sync time far in the future
        let spec = ObservationSpec::new(1.0, now_ms + 86_400_000);
        assert!(spec.plan(now_ms, LONGITUDE_RAD).is_err());
    }
}
