#![forbid(unsafe_code)]

//! Crate-wide error and result types.

use thiserror::Error;

use crate::query::errors::PlanningError;

/// Errors surfaced by the query-compilation core.
#[derive(Debug, Error)]
pub enum PenumbraError {
    /// A planning invariant was violated; never retried.
    #[error("internal planning error: {0}")]
    Planning(#[from] PlanningError),
    /// Configuration rejected at construction time.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// A pre-parser option was malformed or unknown.
    #[error("invalid query option: {0}")]
    InvalidQueryOption(String),
    /// Invalid argument supplied by the caller.
    #[error("invalid argument: {0}")]
    Invalid(&'static str),
}

impl PenumbraError {
    /// Returns true when the error reports a broken planning invariant.
    pub fn is_planning_failure(&self) -> bool {
        matches!(self, PenumbraError::Planning(_))
    }

    pub(crate) fn config(msg: impl Into<String>) -> Self {
        PenumbraError::InvalidConfig(msg.into())
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, PenumbraError>;
