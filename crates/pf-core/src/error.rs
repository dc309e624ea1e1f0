//! Error types for panelfit.
//!
//! Missing data is never an error: ratios and logs over absent or
//! non-positive inputs propagate NaN and the affected rows drop out at the
//! regression-sample filter. The variants below cover everything else.

use thiserror::Error;

/// panelfit error type.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error (input table unobtainable, output unwritable).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A requested column is absent from the prepared panel. Fatal to the
    /// specification that requested it, never to the batch.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Design matrix singular or under-determined. Fatal to one
    /// specification; carries the implicated columns when determinable.
    #[error("rank-deficient design: {reason}")]
    RankDeficient {
        /// What made the design unsolvable.
        reason: String,
        /// Columns found to be linearly dependent on earlier columns
        /// (empty when the deficiency could not be pinned to columns).
        implicated: Vec<String>,
    },

    /// Validation error.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Computation error.
    #[error("Computation error: {0}")]
    Computation(String),
}

impl Error {
    /// Build a [`Error::RankDeficient`] naming the dependent columns.
    pub fn rank_deficient(reason: impl Into<String>, implicated: Vec<String>) -> Self {
        Error::RankDeficient { reason: reason.into(), implicated }
    }
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;
