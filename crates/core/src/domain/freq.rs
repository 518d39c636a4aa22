// Frequency axis derivation
//
// The F-engines publish only the ADC sample rate and samples per MCNT; the
// written channel grid is derived from those. The X-engines sum groups of 4
// fine channels and keep the central 3/4 of the band, so the output axis is
// a downselected, averaged version of the full linspace(0, bandwidth) grid.

use serde::{Deserialize, Serialize};

use super::error::{DomainError, Result};

/// Fine channels summed per output channel
pub const NCHAN_SUM: usize = 4;

/// F-engine sampling parameters, as read from the shared store
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FreqSetup {
    pub sample_freq_hz: f64,
    pub samples_per_mcnt: u32,
}

impl FreqSetup {
    /// Fine channels per F-engine spectrum
    pub fn nchans_f(&self) -> usize {
        self.samples_per_mcnt as usize / 2
    }

    pub fn bandwidth_hz(&self) -> f64 {
        self.sample_freq_hz / 2.0
    }

    /// Output channels after the 4-channel sum and the 3/4-band downselect
    pub fn nchans_out(&self) -> usize {
        self.nchans_f() / NCHAN_SUM * 3 / 4
    }

    pub fn channel_width_hz(&self) -> f64 {
        self.bandwidth_hz() / self.nchans_f() as f64 * NCHAN_SUM as f64
    }

    /// Centre frequency of every output channel, in Hz.
    ///
    /// The band starts 3/16 of the way up the fine grid and covers 3/4 of it.
    pub fn channel_freqs_hz(&self) -> Result<Vec<f64>> {
        let nchans_f = self.nchans_f();
        if nchans_f == 0 || nchans_f % 16 != 0 {
            return Err(DomainError::ValidationError(format!(
                "samples_per_mcnt {} does not yield a 16-divisible channel count",
                self.samples_per_mcnt
            )));
        }

        let step = self.bandwidth_hz() / nchans_f as f64;
        let start_chan = nchans_f / 16 * 3;
        let selected = nchans_f / 4 * 3;

        let freqs = (start_chan..start_chan + selected)
            .map(|i| i as f64 * step)
            .collect::<Vec<_>>();

        Ok(freqs
            .chunks(NCHAN_SUM)
            .map(|chunk| chunk.iter().sum::<f64>() / NCHAN_SUM as f64)
            .collect())
    }

    /// Per-channel widths; constant, but written as an array per UVH5
    pub fn channel_widths_hz(&self) -> Vec<f64> {
        vec![self.channel_width_hz(); self.nchans_out()]
    }
}
