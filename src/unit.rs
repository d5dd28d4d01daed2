//! # Units
//!
//! The closed set of CloudWatch units and storage resolutions
//!
//! <https://docs.aws.amazon.com/AmazonCloudWatch/latest/APIReference/API_MetricDatum.html>

use super::Error;
use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Unit {
    Seconds,
    Microseconds,
    Milliseconds,
    Bytes,
    Kilobytes,
    Megabytes,
    Gigabytes,
    Terabytes,
    Bits,
    Kilobits,
    Megabits,
    Gigabits,
    Terabits,
    Percent,
    Count,
    BytesPerSecond,
    KilobytesPerSecond,
    MegabytesPerSecond,
    GigabytesPerSecond,
    TerabytesPerSecond,
    BitsPerSecond,
    KilobitsPerSecond,
    MegabitsPerSecond,
    GigabitsPerSecond,
    TerabitsPerSecond,
    CountPerSecond,
    #[default]
    None,
}

impl Unit {
    const ALL: [Unit; 27] = [
        Unit::Seconds,
        Unit::Microseconds,
        Unit::Milliseconds,
        Unit::Bytes,
        Unit::Kilobytes,
        Unit::Megabytes,
        Unit::Gigabytes,
        Unit::Terabytes,
        Unit::Bits,
        Unit::Kilobits,
        Unit::Megabits,
        Unit::Gigabits,
        Unit::Terabits,
        Unit::Percent,
        Unit::Count,
        Unit::BytesPerSecond,
        Unit::KilobytesPerSecond,
        Unit::MegabytesPerSecond,
        Unit::GigabytesPerSecond,
        Unit::TerabytesPerSecond,
        Unit::BitsPerSecond,
        Unit::KilobitsPerSecond,
        Unit::MegabitsPerSecond,
        Unit::GigabitsPerSecond,
        Unit::TerabitsPerSecond,
        Unit::CountPerSecond,
        Unit::None,
    ];

    /// The CloudWatch string for this unit
    pub fn as_str(&self) -> &'static str {
        match self {
            Unit::Seconds => "Seconds",
            Unit::Microseconds => "Microseconds",
            Unit::Milliseconds => "Milliseconds",
            Unit::Bytes => "Bytes",
            Unit::Kilobytes => "Kilobytes",
            Unit::Megabytes => "Megabytes",
            Unit::Gigabytes => "Gigabytes",
            Unit::Terabytes => "Terabytes",
            Unit::Bits => "Bits",
            Unit::Kilobits => "Kilobits",
            Unit::Megabits => "Megabits",
            Unit::Gigabits => "Gigabits",
            Unit::Terabits => "Terabits",
            Unit::Percent => "Percent",
            Unit::Count => "Count",
            Unit::BytesPerSecond => "Bytes/Second",
            Unit::KilobytesPerSecond => "Kilobytes/Second",
            Unit::MegabytesPerSecond => "Megabytes/Second",
            Unit::GigabytesPerSecond => "Gigabytes/Second",
            Unit::TerabytesPerSecond => "Terabytes/Second",
            Unit::BitsPerSecond => "Bits/Second",
            Unit::KilobitsPerSecond => "Kilobits/Second",
            Unit::MegabitsPerSecond => "Megabits/Second",
            Unit::GigabitsPerSecond => "Gigabits/Second",
            Unit::TerabitsPerSecond => "Terabits/Second",
            Unit::CountPerSecond => "Count/Second",
            Unit::None => "None",
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Unit {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Unit::ALL
            .iter()
            .find(|unit| unit.as_str() == s)
            .copied()
            .ok_or_else(|| Error::InvalidMetric(format!("Metric unit is not valid: {s}")))
    }
}

impl Serialize for Unit {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Convert a metrics::Unit into the cloudwatch unit
///
/// CloudWatch has no binary byte units, so the 1024-based units map onto their decimal names
impl From<metrics::Unit> for Unit {
    fn from(unit: metrics::Unit) -> Self {
        match unit {
            metrics::Unit::Count => Unit::Count,
            metrics::Unit::Percent => Unit::Percent,
            metrics::Unit::Seconds => Unit::Seconds,
            metrics::Unit::Milliseconds => Unit::Milliseconds,
            metrics::Unit::Microseconds => Unit::Microseconds,
            // No CloudWatch equivalent
            metrics::Unit::Nanoseconds => Unit::None,
            metrics::Unit::Tebibytes => Unit::Terabytes,
            metrics::Unit::Gibibytes => Unit::Gigabytes,
            metrics::Unit::Mebibytes => Unit::Megabytes,
            metrics::Unit::Kibibytes => Unit::Kilobytes,
            metrics::Unit::Bytes => Unit::Bytes,
            metrics::Unit::TerabitsPerSecond => Unit::TerabitsPerSecond,
            metrics::Unit::GigabitsPerSecond => Unit::GigabitsPerSecond,
            metrics::Unit::MegabitsPerSecond => Unit::MegabitsPerSecond,
            metrics::Unit::KilobitsPerSecond => Unit::KilobitsPerSecond,
            metrics::Unit::BitsPerSecond => Unit::BitsPerSecond,
            metrics::Unit::CountPerSecond => Unit::CountPerSecond,
        }
    }
}

/// Storage resolution of a metric in seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StorageResolution {
    #[default]
    Standard,
    High,
}

impl StorageResolution {
    pub fn seconds(&self) -> u64 {
        match self {
            StorageResolution::Standard => 60,
            StorageResolution::High => 1,
        }
    }
}

impl TryFrom<u64> for StorageResolution {
    type Error = Error;

    fn try_from(seconds: u64) -> Result<Self, Self::Error> {
        match seconds {
            60 => Ok(StorageResolution::Standard),
            1 => Ok(StorageResolution::High),
            other => Err(Error::InvalidMetric(format!("Metric resolution is not valid: {other}"))),
        }
    }
}
