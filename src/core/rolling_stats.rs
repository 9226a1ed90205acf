use tracing::trace;

use crate::core::error::{Error, Result};

/// Number of windows between exact two-pass re-anchors of the rolling
/// Welford recurrence. Bounds the drift the O(1) update accumulates.
const REFRESH_INTERVAL: usize = 1024;

/// Largest ratio between the rounding budget accumulated since the last
/// anchor and the current sum of squared deviations before the window is
/// recomputed exactly. Keeps the relative variance error near `1e6 * EPSILON`.
const ERROR_GROWTH_LIMIT: f64 = 1e6;

/// Rolling mean and standard deviation for all subsequences of length `m`.
///
/// Computed in a single forward pass with a rolling Welford recurrence,
/// re-anchored with a compensated two-pass computation periodically and
/// whenever its rounding budget outgrows the window's spread. The
/// naive prefix-sum-of-squares difference is avoided since it loses all
/// precision on long series with a large offset.
///
/// Constant windows are detected exactly (every value equal) rather than by
/// thresholding a floating-point standard deviation; they get `std == 0`.
#[derive(Debug, Clone)]
pub struct RollingStats {
    pub mean: Vec<f64>,
    pub std: Vec<f64>,
    /// Precomputed `1 / (sqrt(m) * sigma)` for each subsequence.
    /// Zero for constant subsequences (sigma == 0).
    /// Enables replacing division with multiplication in the inner loop:
    /// `r = (QT - m*mu_i*mu_j) * m_sigma_inv[i] * m_sigma_inv[j]`
    pub m_sigma_inv: Vec<f64>,
    /// Whether each subsequence is constant.
    pub is_constant: Vec<bool>,
    /// False for subsequences touching a missing (masked) value.
    pub is_valid: Vec<bool>,
    /// Whether any valid subsequence is constant.
    pub has_constant: bool,
}

impl RollingStats {
    /// Compute rolling statistics for subsequences of length `m`.
    ///
    /// # Errors
    /// `EmptyInput` for an empty series, `InvalidWindow` when `m < 2` or
    /// `m > ts.len()`, `NonFiniteInput` at the first non-finite value.
    pub fn compute(ts: &[f64], m: usize) -> Result<Self> {
        if ts.is_empty() {
            return Err(Error::EmptyInput { series: "T" });
        }
        if let Some((index, &value)) = ts.iter().enumerate().find(|(_, x)| !x.is_finite()) {
            return Err(Error::NonFiniteInput {
                series: "T",
                index,
                value,
            });
        }
        Self::compute_masked(ts, m, None)
    }

    /// Compute rolling statistics where `missing[k] == true` flags position
    /// `k` as missing. Every window covering a missing position is marked
    /// invalid. `ts` must already hold finite placeholders at those positions.
    pub(crate) fn compute_masked(ts: &[f64], m: usize, missing: Option<&[bool]>) -> Result<Self> {
        let n = ts.len();
        if n == 0 {
            return Err(Error::EmptyInput { series: "T" });
        }
        if m < 2 || m > n {
            return Err(Error::invalid_window(m, n));
        }
        let n_subs = n - m + 1;
        let m_f = m as f64;
        let sqrt_m = m_f.sqrt();

        let is_valid = window_validity(missing, n, m);
        let is_constant = constant_windows(ts, m);

        let Moments { mean, m2, anchors } = rolling_moments(ts, m, &is_constant);
        trace!(n_subs, anchors, "exact window recomputations");
        let mut std = vec![0.0; n_subs];
        let mut m_sigma_inv = vec![0.0; n_subs];
        let mut has_constant = false;

        for i in 0..n_subs {
            if is_constant[i] {
                has_constant |= is_valid[i];
                continue;
            }
            let sigma = (m2[i] / m_f).max(0.0).sqrt();
            std[i] = sigma;
            if sigma > 0.0 {
                m_sigma_inv[i] = 1.0 / (sqrt_m * sigma);
            }
        }

        Ok(Self {
            mean,
            std,
            m_sigma_inv,
            is_constant,
            is_valid,
            has_constant,
        })
    }

    /// Number of subsequences covered.
    pub fn len(&self) -> usize {
        self.mean.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mean.is_empty()
    }

    /// Number of valid constant subsequences.
    pub fn constant_count(&self) -> usize {
        self.is_constant
            .iter()
            .zip(&self.is_valid)
            .filter(|(&c, &v)| c && v)
            .count()
    }
}

struct Moments {
    mean: Vec<f64>,
    /// Sum of squared deviations from the mean, per window.
    m2: Vec<f64>,
    /// Number of windows recomputed with the exact two-pass formula.
    anchors: usize,
}

/// Rolling Welford mean and sum of squared deviations.
///
/// The recurrence runs on values shifted by the mean of the last exact
/// anchor, so a large offset costs no precision. The rounding error each
/// update can add is bounded by `|x_in - x_out| * (|x_in| + |x_out| + |mu| +
/// |mu'|) * EPSILON`; once the sum of those bounds since the last anchor
/// outgrows `m2`, the window is recomputed exactly. A large value leaving the
/// window therefore always triggers a re-anchor.
fn rolling_moments(ts: &[f64], m: usize, is_constant: &[bool]) -> Moments {
    let n_subs = ts.len() - m + 1;
    let m_f = m as f64;
    let mut mean = vec![0.0; n_subs];
    let mut m2s = vec![0.0; n_subs];
    let mut anchors = 0;

    let mut shift = 0.0;
    let mut mu = 0.0;
    let mut m2 = 0.0;
    let mut budget = 0.0;
    for i in 0..n_subs {
        let mut exact = i == 0 || is_constant[i];
        if !exact {
            let x_out = ts[i - 1] - shift;
            let x_in = ts[i + m - 1] - shift;
            let delta = x_in - x_out;
            let new_mu = mu + delta / m_f;
            m2 += delta * (x_in - new_mu + x_out - mu);
            budget += delta.abs() * (x_in.abs() + x_out.abs() + mu.abs() + new_mu.abs());
            mu = new_mu;
            exact = i % REFRESH_INTERVAL == 0 || budget > ERROR_GROWTH_LIMIT * m2;
        }
        if exact {
            if is_constant[i] {
                (shift, m2) = (ts[i], 0.0);
            } else {
                (shift, m2) = two_pass(&ts[i..i + m]);
                anchors += 1;
            }
            mu = 0.0;
            budget = 0.0;
        }
        mean[i] = shift + mu;
        m2s[i] = m2;
    }

    Moments {
        mean,
        m2: m2s,
        anchors,
    }
}

/// Compensated (Neumaier) two-pass mean and sum of squared deviations.
fn two_pass(window: &[f64]) -> (f64, f64) {
    let mu = neumaier_sum(window.iter().copied()) / window.len() as f64;
    let m2 = neumaier_sum(window.iter().map(|&x| (x - mu) * (x - mu)));
    (mu, m2)
}

fn neumaier_sum(values: impl Iterator<Item = f64>) -> f64 {
    let mut sum = 0.0;
    let mut comp = 0.0;
    for x in values {
        let t = sum + x;
        if sum.abs() >= x.abs() {
            comp += (sum - t) + x;
        } else {
            comp += (x - t) + sum;
        }
        sum = t;
    }
    sum + comp
}

/// Window `i` is constant iff the run of equal values ending at `i + m - 1`
/// is at least `m` long.
fn constant_windows(ts: &[f64], m: usize) -> Vec<bool> {
    let n_subs = ts.len() - m + 1;
    let mut run = 1usize;
    let mut out = vec![false; n_subs];
    for k in 0..ts.len() {
        if k > 0 {
            run = if ts[k] == ts[k - 1] { run + 1 } else { 1 };
        }
        if k + 1 >= m {
            out[k + 1 - m] = run >= m;
        }
    }
    out
}

fn window_validity(missing: Option<&[bool]>, n: usize, m: usize) -> Vec<bool> {
    let n_subs = n - m + 1;
    let Some(missing) = missing else {
        return vec![true; n_subs];
    };
    let mut cum = vec![0usize; n + 1];
    for (k, &flag) in missing.iter().enumerate() {
        cum[k + 1] = cum[k] + usize::from(flag);
    }
    (0..n_subs).map(|i| cum[i + m] == cum[i]).collect()
}
