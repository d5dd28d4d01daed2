//! # Error
//!
//! Errors surfaced to callers of the logger, context and serializer.
//!
//! Validation errors are raised at the offending call and are never retried.
//! Transport failures are not represented here: the socket clients log and drop them.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// A dimension name or value is empty, too long, non-ASCII or starts with `:`
    #[error("invalid dimension: {0}")]
    InvalidDimension(String),

    /// A dimension set holds more entries than CloudWatch accepts
    #[error("dimension set exceeded: {0}")]
    DimensionSetExceeded(String),

    /// Bad metric name, non-finite value, unknown unit or conflicting storage resolution
    #[error("invalid metric: {0}")]
    InvalidMetric(String),

    #[error("invalid namespace: {0}")]
    InvalidNamespace(String),

    /// Timestamp outside of the window CloudWatch ingests
    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True for the contract violations raised by the validator
    pub fn is_validation(&self) -> bool {
        !matches!(self, Error::Json(_) | Error::Io(_))
    }
}
