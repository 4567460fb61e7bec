//! Error types for the skyline solver core

use thiserror::Error;

/// Main error type for solver operations
#[derive(Error, Debug)]
pub enum SolverError {
    #[error("matrix is not square or has invalid shape: {0}")]
    BadMatrixShape(String),

    #[error("inconsistent constraint set: {0}")]
    InconsistentConstraints(String),

    #[error(
        "singular matrix - {zero_pivots} zero pivot(s) exceeded the budget, first at index {first_index} (magnitude {first_magnitude:e})"
    )]
    SingularMatrix {
        zero_pivots: usize,
        first_index: usize,
        first_magnitude: f64,
    },

    #[error("failed to allocate skyline storage ({requested_bytes} bytes requested)")]
    OutOfMemory { requested_bytes: usize },

    #[error("corrupt persisted factorisation stream: {0}")]
    CorruptStream(String),

    #[error("factorisation cancelled at block-column {0}")]
    Cancelled(usize),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// Result type for solver operations
pub type SolverResult<T> = Result<T, SolverError>;
