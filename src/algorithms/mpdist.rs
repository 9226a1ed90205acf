use tracing::{debug, instrument};

use crate::algorithms::stump::MatrixProfileEngine;
use crate::core::error::{Error, Result};
use crate::core::matrix_profile::{JoinMode, MatrixProfileConfig};

/// Which entry of the sorted joint profile [`mpdist`] reports.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MpdistRank {
    /// `k = ceil(p * (len_a + len_b))` with `p` clamped to `[0, 1]`, capped
    /// at the last entry.
    Percentage(f64),
    /// Explicit 0-based rank into the sorted joint profile.
    Kth(usize),
}

impl Default for MpdistRank {
    fn default() -> Self {
        Self::Percentage(0.05)
    }
}

/// Compute MPdist: a scalar distance between two time series based on the
/// matrix profile.
///
/// Both AB-joins are computed (every subsequence of `ts_a` against `ts_b`
/// and the reverse), their distances are concatenated and the entry at the
/// rank chosen by `rank` is returned. When that entry is `+inf` (masked or
/// unmatched subsequences), the largest finite value below it is used
/// instead, or `+inf` if there is none.
///
/// MPdist is a measure, not a metric: it ignores the order of matching
/// subsequences and does not obey the triangle inequality.
///
/// # References
/// Gharghabi et al., "Matrix Profile XII: MPdist", 2018.
pub fn mpdist(ts_a: &[f64], ts_b: &[f64], m: usize, rank: MpdistRank) -> Result<f64> {
    mpdist_with_config(ts_a, ts_b, &MatrixProfileConfig::new(m), rank)
}

/// [`mpdist`] with the sentinel, missing-value policy and worker count taken
/// from `config`. The join mode in `config` is ignored.
///
/// Input errors of the first join name `ts_a` as `"Q"` and `ts_b` as `"T"`.
#[instrument(level = "debug", skip(ts_a, ts_b, config), fields(n_a = ts_a.len(), n_b = ts_b.len(), m = config.m))]
pub fn mpdist_with_config(
    ts_a: &[f64],
    ts_b: &[f64],
    config: &MatrixProfileConfig,
    rank: MpdistRank,
) -> Result<f64> {
    let config = config.clone().with_join_mode(JoinMode::AbJoin);
    let a_in_b = MatrixProfileEngine::new(ts_b, Some(ts_a), config.clone())?.run()?;
    let b_in_a = MatrixProfileEngine::new(ts_a, Some(ts_b), config)?.run()?;

    let mut joint = a_in_b.distance;
    joint.extend_from_slice(&b_in_a.distance);

    let k = match rank {
        MpdistRank::Kth(k) if k >= joint.len() => {
            return Err(Error::InvalidParameter(format!(
                "mpdist rank {k} out of range for {} joined distances",
                joint.len()
            )))
        }
        MpdistRank::Kth(k) => k,
        MpdistRank::Percentage(p) if p.is_nan() => {
            return Err(Error::InvalidParameter(
                "mpdist percentage must not be NaN".to_string(),
            ))
        }
        MpdistRank::Percentage(p) => {
            let total = (ts_a.len() + ts_b.len()) as f64;
            ((p.clamp(0.0, 1.0) * total).ceil() as usize).min(joint.len() - 1)
        }
    };

    let value = kth_smallest(&mut joint, k);
    debug!(k, value, "mpdist");
    Ok(value)
}

/// `k`-th smallest entry, falling back to the largest finite entry below
/// rank `k` when it is not finite.
fn kth_smallest(values: &mut [f64], k: usize) -> f64 {
    let (_, &mut kth, _) = values.select_nth_unstable_by(k, f64::total_cmp);
    if kth.is_finite() {
        return kth;
    }
    let finite_below = values[..k].iter().filter(|v| v.is_finite()).count();
    let fallback = finite_below.saturating_sub(1);
    let (_, &mut value, _) = values.select_nth_unstable_by(fallback, f64::total_cmp);
    value
}
