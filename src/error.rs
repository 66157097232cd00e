//! Crate-wide error type
//!
//! Construction-time validation failures surface as `EngineError`. Runtime
//! bound violations during schedule generation (over-draws, over-paydowns,
//! negative unfunded commitment) are clipped and logged instead of raised,
//! so a schedule always generates to completion.

use chrono::NaiveDate;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid loan terms: {0}")]
    InvalidTerms(String),

    #[error("tier lp_dist_ratio must be strictly between 0 and 1, got {0}")]
    InvalidTier(f64),

    #[error("ownership share must be between 0.0 and 1.0, got {0}")]
    InvalidOwnership(f64),

    #[error("dates and cash flows must have the same length ({dates} vs {amounts})")]
    LengthMismatch { dates: usize, amounts: usize },

    #[error("no rate available on or before {0}")]
    MissingRate(NaiveDate),

    #[error("no series value recorded for {0}")]
    MissingMonth(NaiveDate),

    #[error("{0} is outside the analysis window")]
    OutsideAnalysisWindow(NaiveDate),

    #[error("loan {0} not found")]
    UnknownLoan(String),

    #[error("loan {0} already exists")]
    DuplicateLoan(String),

    #[error("invalid record: {0}")]
    InvalidRecord(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),
}
