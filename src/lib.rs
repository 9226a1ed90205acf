pub mod algorithms;
pub mod core;
pub mod metrics;

pub use crate::algorithms::mass::{mass, mass_with_sentinel};
pub use crate::algorithms::mpdist::{mpdist, mpdist_with_config, MpdistRank};
pub use crate::algorithms::stump::{
    CancelHandle, CursorPhase, MatrixProfileEngine, PartialProfile, RowCursor,
};
pub use crate::core::error::{Error, Result};
pub use crate::core::matrix_profile::{
    ConstantSentinel, Diagnostics, JoinMode, MatrixProfile, MatrixProfileConfig, MissingPolicy,
};
pub use crate::core::rolling_stats::RollingStats;
pub use crate::core::tracker::NearestNeighborTracker;
pub use crate::metrics::euclidean::ZNormalizedEuclidean;

use tracing::instrument;

/// Compute the matrix profile of `t`, or the AB-join of `q` against `t`.
///
/// With `q = None` this is a self-join with an exclusion zone around the
/// diagonal. With `q = Some(..)` every subsequence of `q` gets its nearest
/// neighbor among the subsequences of `t`; the join mode in `config` is
/// overridden to match.
///
/// # Examples
///
/// ```
/// use stump_rs::{compute_matrix_profile, MatrixProfileConfig};
///
/// let ts = vec![1.0, 1.0, 1.0, 2.0, 3.0, 4.0, 1.0, 1.0, 1.0, 2.0, 3.0, 4.0];
/// let mp = compute_matrix_profile(&ts, None, &MatrixProfileConfig::new(4)).unwrap();
/// assert_eq!(mp.len(), ts.len() - 4 + 1);
/// assert_eq!(mp.index[0], Some(6));
/// assert_eq!(mp.index[6], Some(0));
/// ```
#[instrument(level = "debug", skip(t, q), fields(n = t.len(), n_q = q.map(<[f64]>::len)))]
pub fn compute_matrix_profile(
    t: &[f64],
    q: Option<&[f64]>,
    config: &MatrixProfileConfig,
) -> Result<MatrixProfile> {
    let config = join_config(q, config);
    MatrixProfileEngine::new(t, q, config)?.run()
}

/// [`compute_matrix_profile`] that stops early once `cancel` is triggered.
#[instrument(level = "debug", skip(t, q, cancel), fields(n = t.len(), n_q = q.map(<[f64]>::len)))]
pub fn compute_matrix_profile_with_cancel(
    t: &[f64],
    q: Option<&[f64]>,
    config: &MatrixProfileConfig,
    cancel: &CancelHandle,
) -> Result<MatrixProfile> {
    let config = join_config(q, config);
    MatrixProfileEngine::new(t, q, config)?.run_with_cancel(cancel)
}

fn join_config(q: Option<&[f64]>, config: &MatrixProfileConfig) -> MatrixProfileConfig {
    let join_mode = if q.is_some() {
        JoinMode::AbJoin
    } else {
        JoinMode::SelfJoin
    };
    config.clone().with_join_mode(join_mode)
}
