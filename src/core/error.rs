//! Error types for matrix profile computation.
//!
//! Only structural problems with the input are errors. Degenerate
//! (constant) subsequences and clamped radicals are handled by documented
//! conventions and surface through [`Diagnostics`](crate::Diagnostics).

use thiserror::Error;

/// Errors raised before or during a matrix profile computation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Window length below 2 or longer than the shorter input series.
    #[error("Invalid window: m = {m} must satisfy 2 <= m <= {n}")]
    InvalidWindow { m: usize, n: usize },

    /// One of the input series has no values.
    #[error("Empty input: series {series} has zero length")]
    EmptyInput { series: &'static str },

    /// A non-finite value at a position not flagged as missing.
    #[error("Non-finite input: series {series} has value {value} at index {index}")]
    NonFiniteInput {
        series: &'static str,
        index: usize,
        value: f64,
    },

    /// Configuration or call argument out of range.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// The computation was cancelled before it finished.
    #[error("Computation cancelled")]
    Cancelled,

    /// FFT planning or execution failed.
    #[error("Execution error: {0}")]
    Execution(String),
}

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create an error for a window that does not fit the series.
    pub fn invalid_window(m: usize, n: usize) -> Self {
        Self::InvalidWindow { m, n }
    }

    /// Create an error for a row range outside `[0, rows)`.
    pub fn row_range(start: usize, end: usize, rows: usize) -> Self {
        Self::InvalidParameter(format!(
            "Row range {start}..{end} is outside 0..{rows}"
        ))
    }
}
