use serde::{Deserialize, Serialize};

use crate::core::error::{Error, Result};

/// Whether the series is joined with itself or with a second series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum JoinMode {
    /// Matrix profile of a series against itself; trivial matches near the
    /// diagonal are excluded.
    #[default]
    SelfJoin,
    /// Every subsequence of the query series against every subsequence of
    /// the other series. No exclusion zone.
    AbJoin,
}

/// Distance reported between a constant and a non-constant subsequence.
///
/// Two constant subsequences are always at distance 0 (they are identical
/// after z-normalization, whatever their level).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum ConstantSentinel {
    /// `sqrt(2m)`: the distance between uncorrelated z-normalized sequences.
    #[default]
    Uncorrelated,
    /// `2 * sqrt(m)`: the largest possible z-normalized distance.
    Maximal,
    /// A caller-chosen value.
    Fixed(f64),
}

impl ConstantSentinel {
    /// The sentinel distance for window length `m`.
    pub fn distance(self, m: usize) -> f64 {
        let m_f = m as f64;
        match self {
            Self::Uncorrelated => (2.0 * m_f).sqrt(),
            Self::Maximal => 2.0 * m_f.sqrt(),
            Self::Fixed(d) => d,
        }
    }

    /// A fixed distance must be `>= 0` (`+inf` is allowed, NaN is not).
    pub fn validate(self) -> Result<()> {
        match self {
            Self::Fixed(d) if d.is_nan() || d < 0.0 => Err(Error::InvalidParameter(format!(
                "constant sentinel distance must be >= 0, got {d}"
            ))),
            _ => Ok(()),
        }
    }
}

/// How non-finite input values are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MissingPolicy {
    /// Any non-finite value fails the computation with `NonFiniteInput`.
    #[default]
    Reject,
    /// Non-finite values mark missing positions. Every subsequence that
    /// covers one is reported at infinite distance and never chosen as a
    /// neighbor.
    Mask,
}

/// Configuration for matrix profile computation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatrixProfileConfig {
    /// Subsequence length.
    pub m: usize,
    /// Exclusion zone half-width as a fraction of `m`: zone = ceil(m * factor).
    /// Default is 0.25 to match stumpy.
    pub exclusion_zone_factor: f64,
    /// Number of row partitions. `None` uses the available parallelism.
    pub num_workers: Option<usize>,
    pub join_mode: JoinMode,
    pub constant_sentinel: ConstantSentinel,
    pub missing: MissingPolicy,
    /// Attach a [`Diagnostics`] report to the result.
    pub collect_diagnostics: bool,
}

impl Default for MatrixProfileConfig {
    fn default() -> Self {
        Self {
            m: 0,
            exclusion_zone_factor: 0.25,
            num_workers: None,
            join_mode: JoinMode::SelfJoin,
            constant_sentinel: ConstantSentinel::Uncorrelated,
            missing: MissingPolicy::Reject,
            collect_diagnostics: false,
        }
    }
}

impl MatrixProfileConfig {
    pub fn new(m: usize) -> Self {
        Self {
            m,
            ..Self::default()
        }
    }

    pub fn with_exclusion_zone_factor(mut self, factor: f64) -> Self {
        self.exclusion_zone_factor = factor;
        self
    }

    pub fn with_num_workers(mut self, num_workers: usize) -> Self {
        self.num_workers = Some(num_workers);
        self
    }

    pub fn with_join_mode(mut self, join_mode: JoinMode) -> Self {
        self.join_mode = join_mode;
        self
    }

    pub fn with_constant_sentinel(mut self, sentinel: ConstantSentinel) -> Self {
        self.constant_sentinel = sentinel;
        self
    }

    pub fn with_missing(mut self, missing: MissingPolicy) -> Self {
        self.missing = missing;
        self
    }

    pub fn with_diagnostics(mut self, collect: bool) -> Self {
        self.collect_diagnostics = collect;
        self
    }

    /// Check the parameters that do not depend on the input series.
    pub fn validate(&self) -> Result<()> {
        if !self.exclusion_zone_factor.is_finite() || self.exclusion_zone_factor < 0.0 {
            return Err(Error::InvalidParameter(format!(
                "exclusion_zone_factor must be finite and >= 0, got {}",
                self.exclusion_zone_factor
            )));
        }
        if self.num_workers == Some(0) {
            return Err(Error::InvalidParameter(
                "num_workers must be at least 1".to_string(),
            ));
        }
        self.constant_sentinel.validate()
    }

    /// Compute the exclusion zone radius. `None` for AB-joins.
    pub fn exclusion_zone(&self) -> Option<usize> {
        match self.join_mode {
            JoinMode::SelfJoin => {
                Some((self.m as f64 * self.exclusion_zone_factor).ceil() as usize)
            }
            JoinMode::AbJoin => None,
        }
    }

    /// Partition count requested, before clamping to the number of rows.
    pub fn resolved_workers(&self) -> usize {
        self.num_workers.unwrap_or_else(default_parallelism).max(1)
    }
}

#[cfg(feature = "parallel")]
fn default_parallelism() -> usize {
    rayon::current_num_threads()
}

#[cfg(not(feature = "parallel"))]
fn default_parallelism() -> usize {
    std::thread::available_parallelism().map_or(1, |n| n.get())
}

/// Data-quality counters for one computation.
///
/// None of these are failures; they report where a documented convention
/// replaced the plain formula.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostics {
    /// Constant subsequences among the candidate (row) series.
    pub constant_rows: usize,
    /// Constant subsequences among the query (column) series.
    pub constant_columns: usize,
    /// Distances whose squared value came out negative and was clamped to 0.
    pub clamped_radicals: usize,
    /// Candidate distances that were NaN or infinite and were ignored.
    pub non_finite_distances: usize,
    /// Subsequences covering a masked (missing) value, rows plus columns.
    pub masked_subsequences: usize,
}

/// The matrix profile result.
///
/// Entry `j` describes query subsequence `j`: the distance to its nearest
/// eligible neighbor and that neighbor's index. With no eligible neighbor the
/// distance is `+inf` and the index `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatrixProfile {
    /// Nearest-neighbor distances for each subsequence.
    pub distance: Vec<f64>,
    /// Index of the nearest neighbor for each subsequence.
    pub index: Vec<Option<usize>>,
    /// Left nearest-neighbor distances (neighbors with smaller index).
    pub left_distance: Vec<f64>,
    /// Index of the left nearest neighbor. Always `None` for AB-joins.
    pub left_index: Vec<Option<usize>>,
    /// Right nearest-neighbor distances (neighbors with larger index).
    pub right_distance: Vec<f64>,
    /// Index of the right nearest neighbor. Always `None` for AB-joins.
    pub right_index: Vec<Option<usize>>,
    /// Subsequence length used.
    pub m: usize,
    /// Exclusion zone radius used (`None` for AB-joins).
    pub exclusion_zone: Option<usize>,
    pub join_mode: JoinMode,
    pub diagnostics: Option<Diagnostics>,
}

impl MatrixProfile {
    pub fn len(&self) -> usize {
        self.distance.len()
    }

    pub fn is_empty(&self) -> bool {
        self.distance.is_empty()
    }

    /// Subsequence with the smallest nearest-neighbor distance (top motif).
    /// Lowest index wins ties.
    pub fn motif_index(&self) -> Option<usize> {
        self.distance
            .iter()
            .enumerate()
            .filter(|(_, d)| d.is_finite())
            .fold(None, |best: Option<(usize, f64)>, (i, &d)| match best {
                Some((_, bd)) if bd <= d => best,
                _ => Some((i, d)),
            })
            .map(|(i, _)| i)
    }

    /// Subsequence with the largest finite nearest-neighbor distance (top discord).
    pub fn discord_index(&self) -> Option<usize> {
        self.distance
            .iter()
            .enumerate()
            .filter(|(_, d)| d.is_finite())
            .fold(None, |best: Option<(usize, f64)>, (i, &d)| match best {
                Some((_, bd)) if bd >= d => best,
                _ => Some((i, d)),
            })
            .map(|(i, _)| i)
    }
}
