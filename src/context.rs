//! # Context
//!
//! Metrics, dimensions and properties collected for a single unit of work

use super::unit::{StorageResolution, Unit};
use super::{validator, Error};
use indexmap::IndexMap;
use serde_json::{Map, Value};
use std::time::{SystemTime, UNIX_EPOCH};

/// Namespace used when neither the caller nor the configuration supplies one
pub const DEFAULT_NAMESPACE: &str = "aws-embedded-metrics";

/// Dimension name to value, in insertion order
pub type DimensionSet = IndexMap<String, String>;

/// Raw datapoints recorded for one metric name
#[derive(Debug, Clone, PartialEq)]
pub struct Metric {
    values: Vec<f64>,
    unit: Unit,
    storage_resolution: StorageResolution,
}

impl Metric {
    pub fn new(value: f64, unit: Unit, storage_resolution: StorageResolution) -> Self {
        Self {
            values: vec![value],
            unit,
            storage_resolution,
        }
    }

    pub fn add_value(&mut self, value: f64) {
        self.values.push(value);
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn unit(&self) -> Unit {
        self.unit
    }

    pub fn storage_resolution(&self) -> StorageResolution {
        self.storage_resolution
    }
}

pub(crate) fn now_millis() -> u64 {
    millis_since_epoch(SystemTime::now())
}

fn millis_since_epoch(time: SystemTime) -> u64 {
    // Pre-epoch times are rejected by the validator before they get here
    time.duration_since(UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or(0)
}

/// Mutable buffer of everything emitted by one flush
///
/// A context is owned by a single unit of work and is not meant to be shared between threads
#[derive(Debug, Clone)]
pub struct MetricsContext {
    namespace: String,
    properties: Map<String, Value>,
    dimensions: Vec<DimensionSet>,
    default_dimensions: DimensionSet,
    metrics: IndexMap<String, Metric>,
    should_use_default_dimensions: bool,
    timestamp: u64,
    meta: Map<String, Value>,
}

impl MetricsContext {
    /// A context in `namespace`, which is trusted to have been validated already
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            properties: Map::new(),
            dimensions: Vec::new(),
            default_dimensions: DimensionSet::new(),
            metrics: IndexMap::new(),
            should_use_default_dimensions: true,
            timestamp: now_millis(),
            meta: Map::new(),
        }
    }

    /// A context without any state in the default namespace
    pub fn empty() -> Self {
        Self::new(DEFAULT_NAMESPACE)
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn set_namespace(&mut self, namespace: impl Into<String>) -> Result<(), Error> {
        let namespace = namespace.into();
        validator::validate_namespace(&namespace)?;
        self.namespace = namespace;
        Ok(())
    }

    /// Add a datapoint, multiple calls with the same name accumulate values
    ///
    /// * The storage resolution of a name is fixed by the first datapoint recorded for it
    /// * The unit of a name is fixed by the first datapoint as well, later units are ignored
    pub fn put_metric(
        &mut self,
        name: impl Into<String>,
        value: f64,
        unit: Option<Unit>,
        resolution: StorageResolution,
    ) -> Result<(), Error> {
        let name = name.into();
        let prior_resolution = self.metrics.get(&name).map(Metric::storage_resolution);
        validator::validate_metric(&name, value, resolution, prior_resolution)?;

        match self.metrics.get_mut(&name) {
            Some(metric) => metric.add_value(value),
            None => {
                self.metrics
                    .insert(name, Metric::new(value, unit.unwrap_or_default(), resolution));
            }
        }
        Ok(())
    }

    /// Add a dimension set, replacing any existing set with exactly the same keys
    pub fn put_dimensions(&mut self, dimension_set: DimensionSet) -> Result<(), Error> {
        validator::validate_dimension_set(&dimension_set)?;

        self.dimensions.retain(|existing| !same_keys(existing, &dimension_set));
        self.dimensions.push(dimension_set);
        Ok(())
    }

    /// Replace every dimension set
    ///
    /// * `use_default` controls whether default dimensions are merged into these sets
    pub fn set_dimensions(&mut self, dimension_sets: Vec<DimensionSet>, use_default: bool) -> Result<(), Error> {
        for dimension_set in &dimension_sets {
            validator::validate_dimension_set(dimension_set)?;
        }

        self.should_use_default_dimensions = use_default;
        self.dimensions = dimension_sets;
        Ok(())
    }

    /// Dimensions merged into every dimension set when they are read, not when they are written
    pub fn set_default_dimensions(&mut self, default_dimensions: DimensionSet) {
        self.default_dimensions = default_dimensions;
    }

    pub fn default_dimensions(&self) -> &DimensionSet {
        &self.default_dimensions
    }

    pub fn reset_dimensions(&mut self, use_default: bool) {
        self.dimensions.clear();
        self.should_use_default_dimensions = use_default;
    }

    /// Dimension sets as they will be emitted
    pub fn get_dimensions(&self) -> Vec<DimensionSet> {
        if !self.should_use_default_dimensions || self.default_dimensions.is_empty() {
            return self.dimensions.clone();
        }

        if self.dimensions.is_empty() {
            return vec![self.default_dimensions.clone()];
        }

        self.dimensions
            .iter()
            .map(|custom| {
                let mut merged = self.default_dimensions.clone();
                merged.extend(custom.iter().map(|(k, v)| (k.clone(), v.clone())));
                merged
            })
            .collect()
    }

    /// Set a property to emit with the metrics, overwriting any previous value
    pub fn set_property(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.properties.insert(name.into(), value.into());
    }

    pub fn properties(&self) -> &Map<String, Value> {
        &self.properties
    }

    pub fn metrics(&self) -> &IndexMap<String, Metric> {
        &self.metrics
    }

    /// Milliseconds since the epoch
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn set_timestamp(&mut self, timestamp: SystemTime) -> Result<(), Error> {
        validator::validate_timestamp(timestamp)?;
        self.timestamp = millis_since_epoch(timestamp);
        Ok(())
    }

    /// Extra `_aws` metadata such as `LogGroupName`
    pub fn meta(&self) -> &Map<String, Value> {
        &self.meta
    }

    pub fn put_metadata(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.meta.insert(name.into(), value.into());
    }

    /// Start a fresh context for the next flush
    ///
    /// * Namespace, properties and default dimensions carry over
    /// * Metrics never carry over
    /// * Dimension sets carry over only with `preserve_dimensions`
    pub fn create_copy_with_context(&self, preserve_dimensions: bool) -> Self {
        let mut copy = Self::new(self.namespace.clone());
        copy.properties = self.properties.clone();
        copy.default_dimensions = self.default_dimensions.clone();
        if preserve_dimensions {
            copy.dimensions = self.dimensions.clone();
            copy.should_use_default_dimensions = self.should_use_default_dimensions;
        }
        copy
    }
}

impl Default for MetricsContext {
    fn default() -> Self {
        Self::empty()
    }
}

fn same_keys(a: &DimensionSet, b: &DimensionSet) -> bool {
    a.len() == b.len() && a.keys().all(|key| b.contains_key(key))
}
