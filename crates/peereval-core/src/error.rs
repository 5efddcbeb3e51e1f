//! User-facing validation errors.
//!
//! These are surfaced directly to the operator (CSV import) or to the
//! evaluator (token checks), so their messages are written to be read by
//! people rather than logged.

use thiserror::Error;

/// Errors raised while importing a roster or rubric CSV.
#[derive(Debug, Error)]
pub enum ImportError {
    /// The header row is missing required columns.
    #[error("CSV must include columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),

    /// A data row could not be accepted.
    #[error("line {line}: {message}")]
    InvalidRow { line: u64, message: String },

    /// The file is not valid CSV.
    #[error("malformed CSV: {0}")]
    Csv(#[from] csv::Error),
}

/// Reasons an evaluation token cannot be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum InvalidToken {
    /// No token with this value exists.
    #[error("unknown evaluation link")]
    Unknown,

    /// The token has already been consumed by a submission.
    #[error("this evaluation was already submitted")]
    AlreadySubmitted,

    /// The token's round has been closed.
    #[error("this evaluation round is closed")]
    RoundClosed,
}
