use crate::core::matrix_profile::{JoinMode, MatrixProfile};

/// Best candidate seen so far for one column: distance plus the row that
/// produced it.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Best {
    distance: f64,
    index: Option<usize>,
}

impl Best {
    const NONE: Self = Self {
        distance: f64::INFINITY,
        index: None,
    };

    /// Strictly smaller distance wins; on an exact tie the lower row wins.
    /// Non-finite candidates never win.
    #[inline(always)]
    fn offer(&mut self, distance: f64, row: usize) {
        if !distance.is_finite() {
            return;
        }
        let wins = distance < self.distance
            || (distance == self.distance && self.index.map_or(true, |cur| row < cur));
        if wins {
            self.distance = distance;
            self.index = Some(row);
        }
    }

    #[inline(always)]
    fn absorb(&mut self, other: Best) {
        if let Some(row) = other.index {
            self.offer(other.distance, row);
        }
    }
}

/// A single entry in the AoS tracker: overall, left, and right nearest
/// neighbors for one column share a cache line.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Entry {
    overall: Best,
    left: Best,
    right: Best,
}

/// Per-column running minimum of candidate distances.
///
/// Column `j` keeps the smallest distance offered by any row together with
/// the row index, plus the same restricted to rows `< j` (left) and rows
/// `> j` (right) when tracking is directional (self-joins).
///
/// Updates and merges use the same rule: smaller distance wins, an exact
/// tie goes to the lower row index. The rule is a total order on
/// `(distance, row)`, so merging partial trackers is commutative and
/// associative and the final result does not depend on partition layout or
/// merge order.
#[derive(Debug, Clone, PartialEq)]
pub struct NearestNeighborTracker {
    entries: Vec<Entry>,
    directional: bool,
}

impl NearestNeighborTracker {
    /// Tracker for `n_cols` columns, all initialized to infinity.
    pub fn new(n_cols: usize, directional: bool) -> Self {
        Self {
            entries: vec![
                Entry {
                    overall: Best::NONE,
                    left: Best::NONE,
                    right: Best::NONE,
                };
                n_cols
            ],
            directional,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_directional(&self) -> bool {
        self.directional
    }

    /// Offer `distance` from `row` as a candidate for column `col`.
    ///
    /// Masked entries arrive as `+inf` and are ignored, as is NaN.
    #[inline]
    pub fn update(&mut self, col: usize, distance: f64, row: usize) {
        let e = &mut self.entries[col];
        e.overall.offer(distance, row);
        if self.directional {
            if row < col {
                e.left.offer(distance, row);
            } else if row > col {
                e.right.offer(distance, row);
            }
        }
    }

    /// Offer a full distance profile of `row` (one distance per column).
    pub fn update_row(&mut self, row: usize, profile: &[f64]) {
        debug_assert_eq!(profile.len(), self.entries.len());
        for (col, &d) in profile.iter().enumerate() {
            self.update(col, d, row);
        }
    }

    /// Merge another tracker into this one, column by column.
    pub fn merge(&mut self, other: &Self) {
        debug_assert_eq!(self.entries.len(), other.entries.len());
        for (a, b) in self.entries.iter_mut().zip(&other.entries) {
            a.overall.absorb(b.overall);
            a.left.absorb(b.left);
            a.right.absorb(b.right);
        }
    }

    /// Current best distance and row for `col`.
    pub fn best(&self, col: usize) -> (f64, Option<usize>) {
        let b = self.entries[col].overall;
        (b.distance, b.index)
    }

    /// Convert into the final matrix profile layout.
    pub(crate) fn into_matrix_profile(
        self,
        m: usize,
        exclusion_zone: Option<usize>,
        join_mode: JoinMode,
    ) -> MatrixProfile {
        let n = self.entries.len();
        let mut mp = MatrixProfile {
            distance: Vec::with_capacity(n),
            index: Vec::with_capacity(n),
            left_distance: Vec::with_capacity(n),
            left_index: Vec::with_capacity(n),
            right_distance: Vec::with_capacity(n),
            right_index: Vec::with_capacity(n),
            m,
            exclusion_zone,
            join_mode,
            diagnostics: None,
        };
        for e in self.entries {
            mp.distance.push(e.overall.distance);
            mp.index.push(e.overall.index);
            mp.left_distance.push(e.left.distance);
            mp.left_index.push(e.left.index);
            mp.right_distance.push(e.right.distance);
            mp.right_index.push(e.right.index);
        }
        mp
    }
}
