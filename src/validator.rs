//! # Validator
//!
//! Checks dimension sets, metrics, namespaces and timestamps against the limits CloudWatch
//! enforces on embedded metric documents
//!
//! <https://docs.aws.amazon.com/AmazonCloudWatch/latest/APIReference/API_Dimension.html>

use super::context::DimensionSet;
use super::emf::AWS_KEY;
use super::unit::StorageResolution;
use super::Error;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// CloudWatch accepts no more than 30 dimensions per dimension set
pub const MAX_DIMENSION_SET_SIZE: usize = 30;
pub const MAX_DIMENSION_NAME_LENGTH: usize = 250;
pub const MAX_DIMENSION_VALUE_LENGTH: usize = 1024;
pub const MAX_METRIC_NAME_LENGTH: usize = 1024;
pub const MAX_NAMESPACE_LENGTH: usize = 256;

/// Oldest timestamp CloudWatch will ingest
pub const MAX_TIMESTAMP_PAST_AGE: Duration = Duration::from_secs(14 * 24 * 60 * 60);
/// Furthest into the future CloudWatch will ingest
pub const MAX_TIMESTAMP_FUTURE_AGE: Duration = Duration::from_secs(2 * 60 * 60);

fn is_blank(s: &str) -> bool {
    s.trim().is_empty()
}

pub fn validate_dimension_set(dimension_set: &DimensionSet) -> Result<(), Error> {
    if dimension_set.len() > MAX_DIMENSION_SET_SIZE {
        return Err(Error::DimensionSetExceeded(format!(
            "Maximum number of dimensions per dimension set allowed are {MAX_DIMENSION_SET_SIZE}"
        )));
    }

    for (name, value) in dimension_set {
        if is_blank(name) {
            return Err(Error::InvalidDimension(
                "Dimension name must include at least one non-whitespace character".into(),
            ));
        }
        if is_blank(value) {
            return Err(Error::InvalidDimension(
                "Dimension value must include at least one non-whitespace character".into(),
            ));
        }
        if name.len() > MAX_DIMENSION_NAME_LENGTH {
            return Err(Error::InvalidDimension(format!(
                "Dimension name cannot be longer than {MAX_DIMENSION_NAME_LENGTH} characters"
            )));
        }
        if value.len() > MAX_DIMENSION_VALUE_LENGTH {
            return Err(Error::InvalidDimension(format!(
                "Dimension value cannot be longer than {MAX_DIMENSION_VALUE_LENGTH} characters"
            )));
        }
        if !name.is_ascii() {
            return Err(Error::InvalidDimension(format!("Dimension name contains invalid characters: {name}")));
        }
        if !value.is_ascii() {
            return Err(Error::InvalidDimension(format!("Dimension value contains invalid characters: {value}")));
        }
        if name.starts_with(':') {
            return Err(Error::InvalidDimension("Dimension name cannot start with ':'".into()));
        }
        if name == AWS_KEY {
            return Err(Error::InvalidDimension(format!("Dimension name {AWS_KEY} is reserved")));
        }
    }

    Ok(())
}

/// Validate a single datapoint
///
/// * `prior_resolution` is the resolution already recorded for `name` in the same context, if any
/// * Units are checked when they are parsed into [Unit](super::Unit), so an unknown unit never reaches here
pub fn validate_metric(
    name: &str,
    value: f64,
    resolution: StorageResolution,
    prior_resolution: Option<StorageResolution>,
) -> Result<(), Error> {
    if is_blank(name) {
        return Err(Error::InvalidMetric(
            "Metric name must include at least one non-whitespace character".into(),
        ));
    }
    if name.len() > MAX_METRIC_NAME_LENGTH {
        return Err(Error::InvalidMetric(format!(
            "Metric name cannot be longer than {MAX_METRIC_NAME_LENGTH} characters"
        )));
    }
    if name == AWS_KEY {
        return Err(Error::InvalidMetric(format!("Metric name {AWS_KEY} is reserved")));
    }
    if !value.is_finite() {
        return Err(Error::InvalidMetric(format!("Metric value must be finite, got {value}")));
    }
    if let Some(prior) = prior_resolution {
        if prior != resolution {
            return Err(Error::InvalidMetric(format!(
                "Resolution for metric {name} is already set to {}s, cannot change it to {}s",
                prior.seconds(),
                resolution.seconds()
            )));
        }
    }

    Ok(())
}

pub fn validate_namespace(namespace: &str) -> Result<(), Error> {
    if is_blank(namespace) {
        return Err(Error::InvalidNamespace(
            "Namespace must include at least one non-whitespace character".into(),
        ));
    }
    if namespace.len() > MAX_NAMESPACE_LENGTH {
        return Err(Error::InvalidNamespace(format!(
            "Namespace cannot be longer than {MAX_NAMESPACE_LENGTH} characters"
        )));
    }
    // [a-zA-Z0-9._#:/-]+
    let valid = namespace
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '#' | ':' | '/' | '-'));
    if !valid {
        return Err(Error::InvalidNamespace(format!("Namespace contains invalid characters: {namespace}")));
    }

    Ok(())
}

/// Validate a timestamp against the ingestion window around the current time
pub fn validate_timestamp(timestamp: SystemTime) -> Result<(), Error> {
    validate_timestamp_at(timestamp, SystemTime::now())
}

pub(crate) fn validate_timestamp_at(timestamp: SystemTime, now: SystemTime) -> Result<(), Error> {
    if timestamp < UNIX_EPOCH {
        return Err(Error::InvalidTimestamp("Timestamp cannot be before the Unix epoch".into()));
    }

    match now.duration_since(timestamp) {
        Ok(age) if age > MAX_TIMESTAMP_PAST_AGE => Err(Error::InvalidTimestamp(format!(
            "Timestamp must not be older than {} days",
            MAX_TIMESTAMP_PAST_AGE.as_secs() / 86_400
        ))),
        Ok(_) => Ok(()),
        Err(ahead) if ahead.duration() > MAX_TIMESTAMP_FUTURE_AGE => Err(Error::InvalidTimestamp(format!(
            "Timestamp must not be newer than {} hours",
            MAX_TIMESTAMP_FUTURE_AGE.as_secs() / 3_600
        ))),
        Err(_) => Ok(()),
    }
}
