use crate::core::matrix_profile::ConstantSentinel;
use crate::core::rolling_stats::RollingStats;

/// Counters for the conventions applied while converting dot products.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DistanceCounters {
    /// Squared distances that came out negative and were clamped to 0.
    pub clamped_radicals: usize,
    /// Distances that were not finite and were turned into `+inf`.
    pub non_finite: usize,
}

impl DistanceCounters {
    pub fn merge(&mut self, other: &Self) {
        self.clamped_radicals += other.clamped_radicals;
        self.non_finite += other.non_finite;
    }
}

/// Z-normalized Euclidean distance computed from sliding dot products.
///
/// Distance formula: `d = sqrt(2 * m * (1 - r))` where
/// `r = (QT - m * mu_i * mu_j) / (m * sigma_i * sigma_j)`.
///
/// Edge cases:
/// - Both subsequences constant (sigma_i == 0 && sigma_j == 0) → d = 0
/// - One subsequence constant → the configured [`ConstantSentinel`]
///   (default `sqrt(2m)`)
/// - `1 - r < 0` from round-off → clamped to 0 and counted
/// - `r < -1` → clamped to -1, so `d <= 2 * sqrt(m)`
/// - Either subsequence covers a missing value → `+inf`
/// - A non-finite correlation (overflow) → `+inf`, counted
#[derive(Debug, Clone, Copy)]
pub struct ZNormalizedEuclidean {
    m: usize,
    two_m: f64,
    m_f: f64,
    sentinel: f64,
}

impl ZNormalizedEuclidean {
    pub fn new(m: usize, sentinel: ConstantSentinel) -> Self {
        let m_f = m as f64;
        Self {
            m,
            two_m: 2.0 * m_f,
            m_f,
            sentinel: sentinel.distance(m),
        }
    }

    pub fn m(&self) -> usize {
        self.m
    }

    /// Distance reported between a constant and a non-constant subsequence.
    pub fn sentinel(&self) -> f64 {
        self.sentinel
    }

    /// Convert the dot product of row subsequence `i` and column subsequence
    /// `j` to a distance.
    #[inline(always)]
    pub fn qt_to_distance(
        &self,
        qt: f64,
        rows: &RollingStats,
        i: usize,
        cols: &RollingStats,
        j: usize,
        counters: &mut DistanceCounters,
    ) -> f64 {
        if !rows.is_valid[i] || !cols.is_valid[j] {
            return f64::INFINITY;
        }
        let msi = rows.m_sigma_inv[i];
        let msj = cols.m_sigma_inv[j];

        // Both constant → identical after z-normalization → distance 0
        if msi == 0.0 && msj == 0.0 {
            return 0.0;
        }
        // One constant → documented sentinel
        if msi == 0.0 || msj == 0.0 {
            return self.sentinel;
        }

        // r = (QT - m*mu_i*mu_j) * m_sigma_inv[i] * m_sigma_inv[j]
        // where m_sigma_inv = 1/(sqrt(m)*sigma), so product = 1/(m*sigma_i*sigma_j)
        let r = (qt - self.m_f * rows.mean[i] * cols.mean[j]) * msi * msj;
        if !r.is_finite() {
            counters.non_finite += 1;
            return f64::INFINITY;
        }
        let d_sq = self.two_m * (1.0 - r.max(-1.0));
        if d_sq < 0.0 {
            counters.clamped_radicals += 1;
            return 0.0;
        }
        d_sq.sqrt()
    }

    /// Fill `out[j]` with the distance between row subsequence `i` and every
    /// column subsequence `j`, given the row's dot products `qt[j]`.
    pub fn distance_profile(
        &self,
        qt: &[f64],
        rows: &RollingStats,
        i: usize,
        cols: &RollingStats,
        out: &mut [f64],
        counters: &mut DistanceCounters,
    ) {
        debug_assert_eq!(qt.len(), out.len());
        if !rows.is_valid[i] {
            out.fill(f64::INFINITY);
            return;
        }
        for (j, (d, &q)) in out.iter_mut().zip(qt).enumerate() {
            *d = self.qt_to_distance(q, rows, i, cols, j, counters);
        }
    }
}
