use crate::algorithms::common::sliding_dot_product;
use crate::core::error::{Error, Result};
use crate::core::matrix_profile::ConstantSentinel;
use crate::core::rolling_stats::RollingStats;
use crate::metrics::euclidean::{DistanceCounters, ZNormalizedEuclidean};

/// Compute the z-normalized distance profile for a query against a time series.
///
/// Implements the MASS (Mueen's Algorithm for Similarity Search) algorithm:
/// 1. Compute rolling statistics (mean, std) for the time series
/// 2. Compute the sliding dot product between query and time series
/// 3. Convert QT values to z-normalized Euclidean distances
///
/// Constant subsequences follow the same conventions as the matrix profile
/// engine: both constant gives 0, exactly one constant gives `sqrt(2m)`.
///
/// Returns a distance profile of length `ts.len() - query.len() + 1`.
pub fn mass(query: &[f64], ts: &[f64]) -> Result<Vec<f64>> {
    mass_with_sentinel(query, ts, ConstantSentinel::default())
}

/// [`mass`] with an explicit distance for constant/non-constant pairs.
pub fn mass_with_sentinel(
    query: &[f64],
    ts: &[f64],
    sentinel: ConstantSentinel,
) -> Result<Vec<f64>> {
    sentinel.validate()?;
    if query.is_empty() {
        return Err(Error::EmptyInput { series: "Q" });
    }
    if ts.is_empty() {
        return Err(Error::EmptyInput { series: "T" });
    }
    check_finite(query, "Q")?;
    check_finite(ts, "T")?;

    let m = query.len();
    let ts_stats = RollingStats::compute_masked(ts, m, None)?;
    let query_stats = RollingStats::compute_masked(query, m, None)?;
    let qt = sliding_dot_product(query, ts)?;

    let metric = ZNormalizedEuclidean::new(m, sentinel);
    let mut profile = vec![f64::INFINITY; qt.len()];
    let mut counters = DistanceCounters::default();
    metric.distance_profile(&qt, &query_stats, 0, &ts_stats, &mut profile, &mut counters);
    Ok(profile)
}

fn check_finite(ts: &[f64], series: &'static str) -> Result<()> {
    match ts.iter().position(|x| !x.is_finite()) {
        Some(index) => Err(Error::NonFiniteInput {
            series,
            index,
            value: ts[index],
        }),
        None => Ok(()),
    }
}
