//! # Logger
//!
//! Per unit of work front end over a [MetricsContext]

use super::config::Config;
use super::context::{DimensionSet, MetricsContext};
use super::environment::{self, Environment};
use super::unit::{StorageResolution, Unit};
use super::Error;
use serde_json::Value;
use std::sync::Arc;
use std::time::SystemTime;
use tracing::debug;

/// Collects metrics for one unit of work (request, invocation...) and flushes them to the
/// environment's sink
///
/// Use [Builder](super::Builder) to construct the first logger, then [MetricsLogger::new_scope] for each
/// unit of work so every scope shares the environment's sink and agent connection
///
/// # Example
/// ```no_run
/// use aws_embedded_metrics::{MetricsLogger, Unit};
///
/// async fn handler(metrics: &MetricsLogger) -> Result<(), aws_embedded_metrics::Error> {
///     let mut metrics = metrics.new_scope();
///     metrics
///         .put_dimensions([("Operation", "GetOrder")])?
///         .put_metric("Latency", 42.0, Some(Unit::Milliseconds))?
///         .set_property("RequestId", "ABC123");
///
///     metrics.flush().await
/// }
///
/// # async fn run() -> Result<(), aws_embedded_metrics::Error> {
/// let metrics = aws_embedded_metrics::Builder::new()
///     .namespace("MyApplication")
///     .init()?;
///
/// handler(&metrics).await
/// # }
/// ```
pub struct MetricsLogger {
    config: Arc<Config>,
    environment: Arc<dyn Environment>,
    context: MetricsContext,
    flush_preserve_dimensions: bool,
}

impl MetricsLogger {
    /// Create a logger, resolving the environment from `config` and the process environment
    pub fn new(config: Arc<Config>) -> Self {
        let environment = environment::resolve_environment(&config);
        Self::with_environment(config, environment)
    }

    pub fn with_environment(config: Arc<Config>, environment: Arc<dyn Environment>) -> Self {
        let context = MetricsContext::new(config.namespace());
        Self {
            config,
            environment,
            context,
            flush_preserve_dimensions: false,
        }
    }

    pub fn context(&self) -> &MetricsContext {
        &self.context
    }

    /// The resolved environment, for [Builder::shared_environment](super::Builder::shared_environment)
    pub fn environment(&self) -> Arc<dyn Environment> {
        self.environment.clone()
    }

    /// Record a standard resolution datapoint
    pub fn put_metric(&mut self, name: impl Into<String>, value: f64, unit: Option<Unit>) -> Result<&mut Self, Error> {
        self.put_metric_with_resolution(name, value, unit, StorageResolution::Standard)
    }

    pub fn put_metric_with_resolution(
        &mut self,
        name: impl Into<String>,
        value: f64,
        unit: Option<Unit>,
        resolution: StorageResolution,
    ) -> Result<&mut Self, Error> {
        self.context.put_metric(name, value, unit, resolution)?;
        Ok(self)
    }

    /// Add a dimension set, replacing a previous set with the same dimension names
    pub fn put_dimensions<K, V>(&mut self, dimensions: impl IntoIterator<Item = (K, V)>) -> Result<&mut Self, Error>
    where
        K: Into<String>,
        V: Into<String>,
    {
        let dimension_set: DimensionSet = dimensions.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        self.context.put_dimensions(dimension_set)?;
        Ok(self)
    }

    /// Replace all dimension sets
    ///
    /// * With `use_default` false the environment's default dimensions are not added
    pub fn set_dimensions(&mut self, dimension_sets: Vec<DimensionSet>, use_default: bool) -> Result<&mut Self, Error> {
        self.context.set_dimensions(dimension_sets, use_default)?;
        Ok(self)
    }

    pub fn reset_dimensions(&mut self, use_default: bool) -> &mut Self {
        self.context.reset_dimensions(use_default);
        self
    }

    /// Set a property to emit with the metrics
    /// * Properites persist accross flush calls
    /// * Setting a property with same name multiple times will overwrite the previous value
    pub fn set_property(&mut self, name: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.context.set_property(name, value);
        self
    }

    pub fn set_namespace(&mut self, namespace: impl Into<String>) -> Result<&mut Self, Error> {
        self.context.set_namespace(namespace)?;
        Ok(self)
    }

    pub fn set_timestamp(&mut self, timestamp: SystemTime) -> Result<&mut Self, Error> {
        self.context.set_timestamp(timestamp)?;
        Ok(self)
    }

    /// Keep dimension sets across flushes instead of starting each flush without any
    pub fn set_flush_preserve_dimensions(&mut self, preserve: bool) -> &mut Self {
        self.flush_preserve_dimensions = preserve;
        self
    }

    /// Write everything recorded so far to the environment's sink
    ///
    /// The next unit of work starts with the same namespace, properties and default dimensions
    /// but no metrics. Failures to reach an agent are logged, not returned.
    pub async fn flush(&mut self) -> Result<(), Error> {
        self.configure_context_for_environment();
        let sink = self.environment.sink();

        let next = self.context.create_copy_with_context(self.flush_preserve_dimensions);
        let context = std::mem::replace(&mut self.context, next);

        debug!(sink = sink.name(), metrics = context.metrics().len(), "Flushing metrics");
        sink.accept(context).await
    }

    fn configure_context_for_environment(&mut self) {
        let mut default_dimensions = DimensionSet::new();
        // The log group entirely depends on the environment, Lambda does not allow configuring it
        default_dimensions.insert("LogGroup".to_string(), self.environment.log_group_name());
        default_dimensions.insert(
            "ServiceName".to_string(),
            self.config.service_name.clone().unwrap_or_else(|| self.environment.name()),
        );
        default_dimensions.insert(
            "ServiceType".to_string(),
            self.config.service_type.clone().unwrap_or_else(|| self.environment.env_type()),
        );
        self.context.set_default_dimensions(default_dimensions);
        self.environment.configure_context(&mut self.context);
    }

    /// A logger for another unit of work sharing this one's configuration and environment
    pub fn new_scope(&self) -> Self {
        Self {
            config: self.config.clone(),
            environment: self.environment.clone(),
            context: self.context.create_copy_with_context(self.flush_preserve_dimensions),
            flush_preserve_dimensions: self.flush_preserve_dimensions,
        }
    }
}
