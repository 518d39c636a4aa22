// Baseline-dependent averaging (BDA) tier table
//
// Each baseline pair carries a tier: the number of integrations averaged
// together before the catcher writes it. Tier 0 means the baseline is not
// written at all. Tiers are assigned by connectivity only; distance-based
// assignment is a catcher-side policy that never made it off the bench.

use super::error::{DomainError, Result};

/// Tier given to baselines whose both ends are connected
pub const CONNECTED_TIER: u32 = 4;

/// Integrations per BDA window at tier 1
const WINDOW_INTEGRATIONS: u32 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BdaTier {
    pub ant0: u32,
    pub ant1: u32,
    pub tier: u32,
}

pub type BdaConfig = Vec<BdaTier>;

/// Assign a tier to every baseline pair `(a0, a1)` with `a0 <= a1 < nants`.
pub fn assign_tiers(connected: &[u32], nants: u32) -> BdaConfig {
    let mut pairs = Vec::with_capacity((nants as usize * (nants as usize + 1)) / 2);
    for ant0 in 0..nants {
        for ant1 in ant0..nants {
            let tier = if connected.contains(&ant0) && connected.contains(&ant1) {
                CONNECTED_TIER
            } else {
                0
            };
            pairs.push(BdaTier { ant0, ant1, tier });
        }
    }
    pairs
}

/// Store wire format: one `ant0 ant1 tier` row per line
pub fn render(config: &[BdaTier]) -> String {
    config
        .iter()
        .map(|t| format!("{} {} {}", t.ant0, t.ant1, t.tier))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn parse(s: &str) -> Result<BdaConfig> {
    s.lines()
        .map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() != 3 {
                return Err(DomainError::InvalidBdaRow(line.to_string()));
            }
            let parse = |f: &str| {
                f.parse::<u32>()
                    .map_err(|_| DomainError::InvalidBdaRow(line.to_string()))
            };
            Ok(BdaTier {
                ant0: parse(fields[0])?,
                ant1: parse(fields[1])?,
                tier: parse(fields[2])?,
            })
        })
        .collect()
}

/// Integration-bin list for the catcher: each nonzero tier `t` contributes
/// `8 / t` repeats of `t`.
pub fn integration_bins(config: &[BdaTier]) -> Vec<f64> {
    let mut bins = Vec::new();
    for t in config {
        if t.tier != 0 {
            let repeats = WINDOW_INTEGRATIONS / t.tier;
            bins.extend(std::iter::repeat(f64::from(t.tier)).take(repeats as usize));
        }
    }
    bins
}

/// Baseline counts per averaging bucket, for the catcher's status keys
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierCounts {
    /// Index n counts baselines averaged to 2^(n+1) seconds
    pub per_bucket: [u64; 4],
    /// Autocorrelation count (the catcher's BDANANT)
    pub nants: u64,
}

pub fn tier_counts(config: &[BdaTier]) -> TierCounts {
    let mut per_bucket = [0u64; 4];
    let mut nants = 0u64;

    for t in config {
        if t.ant0 == t.ant1 {
            nants += 1;
        }
        if t.tier == 0 {
            continue;
        }
        let n = (f64::from(t.tier).log2() as usize).min(3);
        per_bucket[n] += 1;
    }

    TierCounts { per_bucket, nants }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tiers_follow_connectivity() {
        let config = assign_tiers(&[0, 2], 3);
        // pairs: (0,0) (0,1) (0,2) (1,1) (1,2) (2,2)
        assert_eq!(config.len(), 6);
        for t in &config {
            let both = [0, 2].contains(&t.ant0) && [0, 2].contains(&t.ant1);
            assert_eq!(t.tier, if both { CONNECTED_TIER } else { 0 });
        }
    }

    #[test]
    fn wire_format_roundtrip() {
        let config = assign_tiers(&[0, 1], 4);
        let parsed = parse(&render(&config)).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn parse_rejects_short_rows() {
        assert!(parse("0 1").is_err());
        assert!(parse("0 1 x").is_err());
    }

    #[test]
    fn bins_repeat_by_tier() {
        let config = vec![
            BdaTier { ant0: 0, ant1: 0, tier: 4 },
            BdaTier { ant0: 0, ant1: 1, tier: 0 },
            BdaTier { ant0: 1, ant1: 1, tier: 2 },
        ];
        let bins = integration_bins(&config);
        // tier 4 -> 2 repeats, tier 2 -> 4 repeats
        assert_eq!(bins, vec![4.0, 4.0, 2.0, 2.0, 2.0, 2.0]);
    }

    #[test]
    fn counts_fill_buckets_and_autos() {
        let config = vec![
            BdaTier { ant0: 0, ant1: 0, tier: 0 },
            BdaTier { ant0: 0, ant1: 1, tier: 1 },
            BdaTier { ant0: 1, ant1: 1, tier: 2 },
            BdaTier { ant0: 1, ant1: 2, tier: 4 },
            BdaTier { ant0: 2, ant1: 2, tier: 16 }, // clamps to the last bucket
        ];
        let counts = tier_counts(&config);
        assert_eq!(counts.per_bucket, [1, 1, 1, 1]);
        assert_eq!(counts.nants, 3);
    }
}
