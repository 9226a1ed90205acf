use std::borrow::Cow;
use std::ops::Range;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, instrument, trace, warn};

use crate::algorithms::common::{
    apply_exclusion_zone, row_partitions, sliding_dot_product, sliding_dot_product_fft,
};
use crate::core::error::{Error, Result};
use crate::core::matrix_profile::{
    Diagnostics, JoinMode, MatrixProfile, MatrixProfileConfig, MissingPolicy,
};
use crate::core::rolling_stats::RollingStats;
use crate::core::tracker::NearestNeighborTracker;
use crate::metrics::euclidean::{DistanceCounters, ZNormalizedEuclidean};

/// Cooperative cancellation flag shared between the caller and all workers.
///
/// Workers poll it once per row. A cancelled run drops every partial
/// tracker and returns [`Error::Cancelled`].
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Where a [`RowCursor`] is in its partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorPhase {
    /// Next row is the first of the partition; its dot products come from
    /// the sliding dot product bootstrap.
    Bootstrapping,
    /// Next row is derived from the previous one with the O(1) recurrence.
    Recurring,
    /// All rows of the partition have been produced.
    Exhausted,
}

/// Partitioned STOMP engine.
///
/// Rows are the subsequences of the series `T` (the candidates), columns the
/// subsequences of the query series `Q` (`Q = T` for a self-join). Entry `j`
/// of the result is the nearest row to column `j`.
///
/// STOMP exploits the relationship between consecutive dot products:
/// `QT[i][j] = QT[i-1][j-1] - T[i-1]*Q[j-1] + T[i+m-1]*Q[j+m-1]`
///
/// Each partition bootstraps its first row with a sliding dot product and
/// derives every later row in O(ℓ), giving O(n^2) total instead of
/// O(n^2 * m) for the naive approach. Column 0 of every row comes from a
/// single precomputed sliding dot product of `Q[0..m]` against `T`.
pub struct MatrixProfileEngine<'a> {
    config: MatrixProfileConfig,
    t: Cow<'a, [f64]>,
    q: Option<Cow<'a, [f64]>>,
    t_stats: RollingStats,
    q_stats: Option<RollingStats>,
    /// `qt_first_col[i] = dot(T[i..i+m], Q[0..m])`
    qt_first_col: Vec<f64>,
    metric: ZNormalizedEuclidean,
    exclusion_zone: Option<usize>,
}

impl<'a> MatrixProfileEngine<'a> {
    /// Validate the input and precompute rolling statistics.
    ///
    /// `q` must be `Some` exactly when `config.join_mode` is `AbJoin`.
    /// Structural errors surface here, before any partition runs.
    pub fn new(t: &'a [f64], q: Option<&'a [f64]>, config: MatrixProfileConfig) -> Result<Self> {
        config.validate()?;
        match (config.join_mode, q.is_some()) {
            (JoinMode::SelfJoin, true) => {
                return Err(Error::InvalidParameter(
                    "a self-join takes no query series; use JoinMode::AbJoin".to_string(),
                ))
            }
            (JoinMode::AbJoin, false) => {
                return Err(Error::InvalidParameter(
                    "an AB-join requires a query series".to_string(),
                ))
            }
            _ => {}
        }

        if t.is_empty() {
            return Err(Error::EmptyInput { series: "T" });
        }
        if let Some(q) = q {
            if q.is_empty() {
                return Err(Error::EmptyInput { series: "Q" });
            }
        }
        let m = config.m;
        let shortest = q.map_or(t.len(), |q| q.len().min(t.len()));
        if m < 2 || m > shortest {
            return Err(Error::invalid_window(m, shortest));
        }

        let (t, t_missing) = prepare_series(t, "T", config.missing)?;
        let t_stats = RollingStats::compute_masked(&t, m, t_missing.as_deref())?;
        let (q, q_stats) = match q {
            Some(q) => {
                let (q, q_missing) = prepare_series(q, "Q", config.missing)?;
                let stats = RollingStats::compute_masked(&q, m, q_missing.as_deref())?;
                (Some(q), Some(stats))
            }
            None => (None, None),
        };

        let query_head = q.as_deref().unwrap_or(&t[..]);
        let qt_first_col = sliding_dot_product(&query_head[0..m], &t)?;

        let metric = ZNormalizedEuclidean::new(m, config.constant_sentinel);
        let exclusion_zone = config.exclusion_zone();

        Ok(Self {
            config,
            t,
            q,
            t_stats,
            q_stats,
            qt_first_col,
            metric,
            exclusion_zone,
        })
    }

    pub fn config(&self) -> &MatrixProfileConfig {
        &self.config
    }

    /// Number of rows (subsequences of `T`).
    pub fn n_rows(&self) -> usize {
        self.t_stats.len()
    }

    /// Number of columns (subsequences of `Q`, or of `T` for a self-join).
    pub fn n_cols(&self) -> usize {
        self.col_stats().len()
    }

    pub fn exclusion_zone(&self) -> Option<usize> {
        self.exclusion_zone
    }

    fn cols(&self) -> &[f64] {
        self.q.as_deref().unwrap_or(&self.t[..])
    }

    fn col_stats(&self) -> &RollingStats {
        self.q_stats.as_ref().unwrap_or(&self.t_stats)
    }

    /// Contiguous row ranges, one per worker.
    pub fn partitions(&self) -> Vec<Range<usize>> {
        row_partitions(self.n_rows(), self.config.resolved_workers())
    }

    /// A cursor over `rows`, starting in [`CursorPhase::Bootstrapping`].
    pub fn row_cursor(&self, rows: Range<usize>) -> Result<RowCursor<'_, 'a>> {
        if rows.start > rows.end || rows.end > self.n_rows() {
            return Err(Error::row_range(rows.start, rows.end, self.n_rows()));
        }
        let n_cols = self.n_cols();
        let phase = if rows.is_empty() {
            CursorPhase::Exhausted
        } else {
            CursorPhase::Bootstrapping
        };
        Ok(RowCursor {
            engine: self,
            next_row: rows.start,
            rows,
            phase,
            qt: vec![0.0; n_cols],
            profile: vec![f64::INFINITY; n_cols],
            counters: DistanceCounters::default(),
        })
    }

    /// Distance profile of a single row computed from an FFT sliding dot
    /// product, with the exclusion zone applied. Reference path for the
    /// recurrence, and the single-row primitive for callers that combine
    /// profiles across dimensions.
    pub fn distance_profile(&self, row: usize) -> Result<Vec<f64>> {
        if row >= self.n_rows() {
            return Err(Error::row_range(row, row + 1, self.n_rows()));
        }
        let m = self.config.m;
        let qt = sliding_dot_product_fft(&self.t[row..row + m], self.cols())?;
        let mut profile = vec![0.0; qt.len()];
        let mut counters = DistanceCounters::default();
        self.metric.distance_profile(
            &qt,
            &self.t_stats,
            row,
            self.col_stats(),
            &mut profile,
            &mut counters,
        );
        if let Some(zone) = self.exclusion_zone {
            apply_exclusion_zone(&mut profile, row, zone);
        }
        Ok(profile)
    }

    /// Run one partition to completion on the calling thread.
    pub fn compute_partition(&self, rows: Range<usize>) -> Result<PartialProfile> {
        self.compute_partition_inner(rows, None)
    }

    fn compute_partition_inner(
        &self,
        rows: Range<usize>,
        cancel: Option<&CancelHandle>,
    ) -> Result<PartialProfile> {
        let mut cursor = self.row_cursor(rows.clone())?;
        let directional = self.config.join_mode == JoinMode::SelfJoin;
        let mut tracker = NearestNeighborTracker::new(self.n_cols(), directional);

        while let Some(row) = cursor.advance()? {
            if cancel.is_some_and(CancelHandle::is_cancelled) {
                return Err(Error::Cancelled);
            }
            tracker.update_row(row, cursor.distance_profile());
        }
        trace!(start = rows.start, end = rows.end, "partition done");

        Ok(PartialProfile {
            rows_processed: rows.len(),
            tracker,
            counters: cursor.counters,
        })
    }

    /// Compute the full matrix profile.
    pub fn run(&self) -> Result<MatrixProfile> {
        self.run_inner(None)
    }

    /// Compute the full matrix profile, giving up with [`Error::Cancelled`]
    /// as soon as `cancel` is triggered.
    pub fn run_with_cancel(&self, cancel: &CancelHandle) -> Result<MatrixProfile> {
        self.run_inner(Some(cancel))
    }

    #[instrument(
        level = "debug",
        skip_all,
        fields(m = self.config.m, rows = self.n_rows(), cols = self.n_cols())
    )]
    fn run_inner(&self, cancel: Option<&CancelHandle>) -> Result<MatrixProfile> {
        let ranges = self.partitions();
        debug!(
            partitions = ranges.len(),
            join_mode = ?self.config.join_mode,
            exclusion_zone = ?self.exclusion_zone,
            "bootstrapping partitions"
        );

        let partials = self.run_partitions(ranges, cancel)?;
        if cancel.is_some_and(CancelHandle::is_cancelled) {
            return Err(Error::Cancelled);
        }

        debug!(partials = partials.len(), "merging partial profiles");
        let mut iter = partials.into_iter();
        let mut merged = match iter.next() {
            Some(first) => first,
            None => PartialProfile {
                rows_processed: 0,
                tracker: NearestNeighborTracker::new(
                    self.n_cols(),
                    self.config.join_mode == JoinMode::SelfJoin,
                ),
                counters: DistanceCounters::default(),
            },
        };
        for partial in iter {
            merged.merge(&partial)?;
        }

        let mp = self.finish(merged)?;
        debug!("done");
        Ok(mp)
    }

    #[cfg(feature = "parallel")]
    fn run_partitions(
        &self,
        ranges: Vec<Range<usize>>,
        cancel: Option<&CancelHandle>,
    ) -> Result<Vec<PartialProfile>> {
        use rayon::prelude::*;

        ranges
            .into_par_iter()
            .map(|rows| self.compute_partition_inner(rows, cancel))
            .collect()
    }

    #[cfg(not(feature = "parallel"))]
    fn run_partitions(
        &self,
        ranges: Vec<Range<usize>>,
        cancel: Option<&CancelHandle>,
    ) -> Result<Vec<PartialProfile>> {
        ranges
            .into_iter()
            .map(|rows| self.compute_partition_inner(rows, cancel))
            .collect()
    }

    /// Turn a fully merged partial profile into the final matrix profile.
    ///
    /// Fails if `partial` was built for a different column count.
    pub fn finish(&self, partial: PartialProfile) -> Result<MatrixProfile> {
        if partial.tracker.len() != self.n_cols() {
            return Err(Error::InvalidParameter(format!(
                "partial profile has {} columns, engine has {}",
                partial.tracker.len(),
                self.n_cols()
            )));
        }
        if partial.rows_processed != self.n_rows() {
            debug!(
                rows_processed = partial.rows_processed,
                rows = self.n_rows(),
                "finishing a profile that does not cover every row"
            );
        }

        let counters = partial.counters;
        if counters.non_finite > 0 {
            warn!(
                non_finite = counters.non_finite,
                "non-finite distances were treated as ineligible"
            );
        }
        if counters.clamped_radicals > 0 {
            debug!(clamped = counters.clamped_radicals, "negative radicals clamped to 0");
        }

        let mut mp = partial.tracker.into_matrix_profile(
            self.config.m,
            self.exclusion_zone,
            self.config.join_mode,
        );
        if self.config.collect_diagnostics {
            mp.diagnostics = Some(self.diagnostics(&counters));
        }
        Ok(mp)
    }

    fn diagnostics(&self, counters: &DistanceCounters) -> Diagnostics {
        let invalid = |s: &RollingStats| s.is_valid.iter().filter(|&&v| !v).count();
        let masked_subsequences =
            invalid(&self.t_stats) + self.q_stats.as_ref().map_or(0, invalid);
        Diagnostics {
            constant_rows: self.t_stats.constant_count(),
            constant_columns: self.col_stats().constant_count(),
            clamped_radicals: counters.clamped_radicals,
            non_finite_distances: counters.non_finite,
            masked_subsequences,
        }
    }
}

/// Explicit per-partition state: the row cursor and the previous row's dot
/// products, advanced one row at a time.
///
/// Each cursor owns its scratch buffers; nothing is shared with other
/// partitions apart from the engine's read-only inputs.
pub struct RowCursor<'e, 'a> {
    engine: &'e MatrixProfileEngine<'a>,
    rows: Range<usize>,
    next_row: usize,
    phase: CursorPhase,
    qt: Vec<f64>,
    profile: Vec<f64>,
    counters: DistanceCounters,
}

impl RowCursor<'_, '_> {
    pub fn phase(&self) -> CursorPhase {
        self.phase
    }

    pub fn rows(&self) -> Range<usize> {
        self.rows.clone()
    }

    /// Distance profile of the row most recently returned by [`advance`],
    /// exclusion zone already applied.
    ///
    /// [`advance`]: RowCursor::advance
    pub fn distance_profile(&self) -> &[f64] {
        &self.profile
    }

    /// Dot products of the row most recently returned by `advance`.
    pub fn dot_products(&self) -> &[f64] {
        &self.qt
    }

    pub fn counters(&self) -> DistanceCounters {
        self.counters
    }

    /// Move to the next row of the partition and compute its distance
    /// profile. Returns the row index, or `None` once the partition is done.
    pub fn advance(&mut self) -> Result<Option<usize>> {
        let engine = self.engine;
        let m = engine.config.m;
        let t: &[f64] = &engine.t;
        let q = engine.cols();

        let row = match self.phase {
            CursorPhase::Exhausted => return Ok(None),
            CursorPhase::Bootstrapping => {
                let row = self.rows.start;
                self.qt = sliding_dot_product(&t[row..row + m], q)?;
                self.phase = CursorPhase::Recurring;
                trace!(row, end = self.rows.end, "bootstrapped, recurring");
                row
            }
            CursorPhase::Recurring => {
                let row = self.next_row;
                if row >= self.rows.end {
                    self.phase = CursorPhase::Exhausted;
                    return Ok(None);
                }
                // QT recurrence, right-to-left to avoid overwriting
                let t_out = t[row - 1];
                let t_in = t[row + m - 1];
                for j in (1..self.qt.len()).rev() {
                    self.qt[j] = self.qt[j - 1] - t_out * q[j - 1] + t_in * q[j + m - 1];
                }
                self.qt[0] = engine.qt_first_col[row];
                row
            }
        };

        engine.metric.distance_profile(
            &self.qt,
            &engine.t_stats,
            row,
            engine.col_stats(),
            &mut self.profile,
            &mut self.counters,
        );
        if let Some(zone) = engine.exclusion_zone {
            apply_exclusion_zone(&mut self.profile, row, zone);
        }
        self.next_row = row + 1;
        Ok(Some(row))
    }
}

/// Nearest-neighbor state accumulated over some set of rows.
///
/// Partials from disjoint row ranges of the same engine merge into the
/// profile of their union. Merging is commutative and associative (lowest
/// row index wins exact ties), so partials may come from threads or remote
/// workers in any order.
#[derive(Debug, Clone)]
pub struct PartialProfile {
    rows_processed: usize,
    tracker: NearestNeighborTracker,
    counters: DistanceCounters,
}

impl PartialProfile {
    pub fn rows_processed(&self) -> usize {
        self.rows_processed
    }

    pub fn tracker(&self) -> &NearestNeighborTracker {
        &self.tracker
    }

    pub fn counters(&self) -> DistanceCounters {
        self.counters
    }

    /// Merge another partial (from a disjoint row range) into this one.
    pub fn merge(&mut self, other: &PartialProfile) -> Result<()> {
        if self.tracker.len() != other.tracker.len()
            || self.tracker.is_directional() != other.tracker.is_directional()
        {
            return Err(Error::InvalidParameter(format!(
                "cannot merge partial profiles of {} and {} columns",
                self.tracker.len(),
                other.tracker.len()
            )));
        }
        self.tracker.merge(&other.tracker);
        self.counters.merge(&other.counters);
        self.rows_processed += other.rows_processed;
        Ok(())
    }
}

/// Prepare a series for the engine: reject or mask non-finite values.
///
/// Masked positions are replaced with `0.0` so the dot-product recurrence
/// never sees NaN; the returned flags mark them.
fn prepare_series<'a>(
    ts: &'a [f64],
    series: &'static str,
    policy: MissingPolicy,
) -> Result<(Cow<'a, [f64]>, Option<Vec<bool>>)> {
    let first_bad = ts.iter().position(|x| !x.is_finite());
    let Some(index) = first_bad else {
        return Ok((Cow::Borrowed(ts), None));
    };
    match policy {
        MissingPolicy::Reject => Err(Error::NonFiniteInput {
            series,
            index,
            value: ts[index],
        }),
        MissingPolicy::Mask => {
            let missing: Vec<bool> = ts.iter().map(|x| !x.is_finite()).collect();
            let cleaned: Vec<f64> = ts
                .iter()
                .map(|&x| if x.is_finite() { x } else { 0.0 })
                .collect();
            debug!(
                series,
                missing = missing.iter().filter(|&&b| b).count(),
                "masking non-finite values"
            );
            Ok((Cow::Owned(cleaned), Some(missing)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn self_join(ts: &[f64], m: usize) -> MatrixProfile {
        MatrixProfileEngine::new(ts, None, MatrixProfileConfig::new(m))
            .unwrap()
            .run()
            .unwrap()
    }

    /// Distance computed directly from z-normalized windows.
    fn direct_distance(a: &[f64], b: &[f64]) -> f64 {
        let znorm = |s: &[f64]| -> Vec<f64> {
            let n = s.len() as f64;
            let mu = s.iter().sum::<f64>() / n;
            let sd = (s.iter().map(|x| (x - mu).powi(2)).sum::<f64>() / n).sqrt();
            s.iter().map(|x| (x - mu) / sd).collect()
        };
        znorm(a)
            .iter()
            .zip(znorm(b))
            .map(|(x, y)| (x - y).powi(2))
            .sum::<f64>()
            .sqrt()
    }

    #[test]
    fn test_stump_tiny_repeating() {
        // Subsequences [1,2,3,2] at index 0 and 4 are identical
        let ts = vec![1.0, 2.0, 3.0, 2.0, 1.0, 2.0, 3.0, 2.0];
        let mp = self_join(&ts, 4);

        assert!(mp.distance[0] < 1e-6, "got {}", mp.distance[0]);
        assert!(mp.distance[4] < 1e-6, "got {}", mp.distance[4]);
        assert_eq!(mp.index[0], Some(4));
        assert_eq!(mp.index[4], Some(0));
    }

    #[test]
    fn test_stump_linear() {
        // Linearly increasing: all subsequences have same shape → all distances ≈ 0
        let ts: Vec<f64> = (0..20).map(|i| i as f64).collect();
        let mp = self_join(&ts, 4);
        for (i, &d) in mp.distance.iter().enumerate() {
            assert!(d < 1e-6, "distance {d} at index {i}");
        }
    }

    #[test]
    fn test_stump_matches_direct_distance() {
        let ts = vec![1.0, 3.0, 2.0, 4.0, 1.5, 3.5, 2.5, 1.0, 3.0, 2.0, 4.0, 1.0];
        let m = 3;
        let mp = self_join(&ts, m);

        for j in 0..mp.len() {
            let i = mp.index[j].expect("every column has a neighbor");
            let d_check = direct_distance(&ts[i..i + m], &ts[j..j + m]);
            assert!(
                (mp.distance[j] - d_check).abs() < 1e-9,
                "j={j}: profile says {}, direct says {d_check}",
                mp.distance[j]
            );
        }
    }

    #[test]
    fn test_stump_known_motif() {
        // Pattern [0, 1, 0, -1] appears at positions 0 and 10
        let mut ts = vec![0.0; 20];
        ts[1] = 1.0;
        ts[3] = -1.0;
        for (i, val) in ts.iter_mut().enumerate().take(10).skip(4) {
            *val = (i as f64) * 0.5;
        }
        ts[11] = 1.0;
        ts[13] = -1.0;
        for (i, val) in ts.iter_mut().enumerate().take(20).skip(14) {
            *val = -(i as f64) * 0.3;
        }

        let mp = self_join(&ts, 4);
        assert_eq!(mp.index[0], Some(10));
        assert_eq!(mp.index[10], Some(0));
        assert!(mp.distance[0] < 1e-6);
        assert!(matches!(mp.motif_index(), Some(0) | Some(10)));
    }

    #[test]
    fn test_small_series() {
        // n=5, m=3 → 3 subsequences, exclusion_zone=1 → only pair (0,2) is valid
        let ts = vec![1.0, 2.0, 3.0, 1.0, 2.0];
        let mp = self_join(&ts, 3);

        assert_eq!(mp.len(), 3);
        assert_eq!(mp.index, vec![Some(2), None, Some(0)]);
        assert!(mp.distance[0].is_finite());
        assert!(mp.distance[1].is_infinite());
        assert_eq!(mp.right_index[0], Some(2));
        assert_eq!(mp.left_index[2], Some(0));
    }

    #[test]
    fn test_exclusion_zone_respected() {
        let ts: Vec<f64> = (0..50).map(|i| (i as f64 * 0.7).cos()).collect();
        let mp = self_join(&ts, 8);
        let zone = mp.exclusion_zone.unwrap();
        assert_eq!(zone, 2);
        for (j, idx) in mp.index.iter().enumerate() {
            let i = idx.unwrap();
            assert!(i.abs_diff(j) > zone, "match {i} for {j} inside zone {zone}");
        }
    }

    #[test]
    fn test_left_right_indices_are_directional() {
        let ts: Vec<f64> = (0..120)
            .map(|i| (i as f64 * 0.31).sin() + 0.3 * (i as f64 * 0.07).cos())
            .collect();
        let mp = self_join(&ts, 10);
        for j in 0..mp.len() {
            if let Some(l) = mp.left_index[j] {
                assert!(l < j);
                assert!(mp.left_distance[j] >= mp.distance[j]);
            }
            if let Some(r) = mp.right_index[j] {
                assert!(r > j);
                assert!(mp.right_distance[j] >= mp.distance[j]);
            }
            let best = mp.left_distance[j].min(mp.right_distance[j]);
            assert_eq!(best, mp.distance[j]);
        }
        assert_eq!(mp.left_index[0], None);
        assert_eq!(mp.right_index[mp.len() - 1], None);
    }

    #[test]
    fn test_cursor_phases() {
        let ts: Vec<f64> = (0..40).map(|i| (i as f64 * 0.5).sin()).collect();
        let engine = MatrixProfileEngine::new(&ts, None, MatrixProfileConfig::new(5)).unwrap();
        let mut cursor = engine.row_cursor(10..13).unwrap();

        assert_eq!(cursor.phase(), CursorPhase::Bootstrapping);
        assert_eq!(cursor.advance().unwrap(), Some(10));
        assert_eq!(cursor.phase(), CursorPhase::Recurring);
        assert_eq!(cursor.advance().unwrap(), Some(11));
        assert_eq!(cursor.advance().unwrap(), Some(12));
        assert_eq!(cursor.advance().unwrap(), None);
        assert_eq!(cursor.phase(), CursorPhase::Exhausted);
        assert_eq!(cursor.advance().unwrap(), None);

        let mut empty = engine.row_cursor(7..7).unwrap();
        assert_eq!(empty.phase(), CursorPhase::Exhausted);
        assert_eq!(empty.advance().unwrap(), None);

        assert!(engine.row_cursor(30..40).is_err());
    }

    #[test]
    fn test_recurrence_matches_bootstrap_each_row() {
        let ts: Vec<f64> = (0..200).map(|i| (i as f64 * 0.3).sin() * (1.0 + i as f64 / 50.0)).collect();
        let engine = MatrixProfileEngine::new(&ts, None, MatrixProfileConfig::new(12)).unwrap();
        let m = 12;
        let norm = |s: &[f64]| s.iter().map(|x| x * x).sum::<f64>().sqrt();
        let mut cursor = engine.row_cursor(0..engine.n_rows()).unwrap();
        while let Some(row) = cursor.advance().unwrap() {
            let qt_fft = sliding_dot_product_fft(&ts[row..row + m], &ts).unwrap();
            for (j, (&a, &b)) in cursor.dot_products().iter().zip(&qt_fft).enumerate() {
                let tol = 1e-9 * (norm(&ts[row..row + m]) * norm(&ts[j..j + m]) + 1.0);
                assert!((a - b).abs() <= tol, "qt ({row}, {j}): {a} vs {b}");
            }

            let reference = engine.distance_profile(row).unwrap();
            for (j, (&a, &b)) in cursor.distance_profile().iter().zip(&reference).enumerate() {
                if a.is_infinite() || b.is_infinite() {
                    assert_eq!(a, b, "mask mismatch at ({row}, {j})");
                } else {
                    let tol = if a > 0.1 && b > 0.1 { 1e-7 * b } else { 1e-6 };
                    assert!((a - b).abs() <= tol, "({row}, {j}): {a} vs {b}");
                }
            }
        }
    }

    #[test]
    fn test_cancelled_run_returns_error() {
        let ts: Vec<f64> = (0..300).map(|i| (i as f64 * 0.2).sin()).collect();
        let engine = MatrixProfileEngine::new(&ts, None, MatrixProfileConfig::new(10)).unwrap();
        let cancel = CancelHandle::new();
        cancel.cancel();
        assert_eq!(engine.run_with_cancel(&cancel).unwrap_err(), Error::Cancelled);

        // An untouched handle does not interfere
        let fresh = CancelHandle::new();
        assert!(engine.run_with_cancel(&fresh).is_ok());
    }

    #[test]
    fn test_partial_merge_rejects_mismatched_shapes() {
        let a: Vec<f64> = (0..40).map(|i| (i as f64 * 0.5).sin()).collect();
        let b: Vec<f64> = (0..60).map(|i| (i as f64 * 0.5).sin()).collect();
        let ea = MatrixProfileEngine::new(&a, None, MatrixProfileConfig::new(5)).unwrap();
        let eb = MatrixProfileEngine::new(&b, None, MatrixProfileConfig::new(5)).unwrap();
        let mut pa = ea.compute_partition(0..5).unwrap();
        let pb = eb.compute_partition(0..5).unwrap();
        assert!(pa.merge(&pb).is_err());
        assert!(ea.finish(pb).is_err());
    }

    #[test]
    fn test_join_mode_must_match_inputs() {
        let ts = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let ab = MatrixProfileConfig::new(3).with_join_mode(JoinMode::AbJoin);
        assert!(matches!(
            MatrixProfileEngine::new(&ts, None, ab),
            Err(Error::InvalidParameter(_))
        ));
        assert!(matches!(
            MatrixProfileEngine::new(&ts, Some(ts.as_slice()), MatrixProfileConfig::new(3)),
            Err(Error::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_masked_values_never_selected() {
        let mut ts: Vec<f64> = (0..60).map(|i| (i as f64 * 0.4).sin()).collect();
        ts[30] = f64::NAN;
        let m = 6;

        let rejected = MatrixProfileEngine::new(&ts, None, MatrixProfileConfig::new(m));
        assert!(matches!(
            rejected,
            Err(Error::NonFiniteInput { series: "T", index: 30, .. })
        ));

        let config = MatrixProfileConfig::new(m)
            .with_missing(MissingPolicy::Mask)
            .with_diagnostics(true);
        let mp = MatrixProfileEngine::new(&ts, None, config).unwrap().run().unwrap();
        let touches_missing = |k: usize| k <= 30 && 30 < k + m;
        for j in 0..mp.len() {
            if touches_missing(j) {
                assert!(mp.distance[j].is_infinite());
                assert_eq!(mp.index[j], None);
            } else {
                let i = mp.index[j].unwrap();
                assert!(!touches_missing(i), "column {j} picked masked row {i}");
                assert!(mp.distance[j].is_finite());
            }
        }
        assert_eq!(mp.diagnostics.unwrap().masked_subsequences, m);
    }
}
