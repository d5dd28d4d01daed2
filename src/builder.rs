use super::config::Config;
use super::environment::Environment;
use super::logger::MetricsLogger;
use super::{validator, Error};
use std::sync::Arc;
use std::time::Duration;

/// Builder for the [MetricsLogger]
///
/// Anything left unset falls back to the `AWS_EMF_*` environment variables when starting from
/// [Builder::from_env], or to the library defaults when starting from [Builder::new]
///
/// Call init() once per process and derive a logger per unit of work with
/// [MetricsLogger::new_scope], the scopes share one agent connection.
///
/// # Example
/// ```
///  let metrics = aws_embedded_metrics::Builder::new()
///      .namespace("MyApplication")
///      .service_name("Orders")
///      .agent_endpoint("udp://127.0.0.1:25888")
///      .init()
///      .unwrap();
///
///  let mut request_metrics = metrics.new_scope();
///  request_metrics.set_property("RequestId", "ABC123");
/// ```
#[derive(Default)]
pub struct Builder {
    config: Config,
    shared_environment: Option<Arc<dyn Environment>>,
}

impl Builder {
    pub fn new() -> Self {
        Builder::default()
    }

    /// Start from the `AWS_EMF_*` environment variables
    pub fn from_env() -> Self {
        Builder {
            config: Config::from_env(),
            shared_environment: None,
        }
    }

    /// Sets the CloudWatch namespace for all metrics
    /// * Defaults to `aws-embedded-metrics`
    /// * init() will return Err(InvalidNamespace) if the namespace is not valid
    pub fn namespace(self, namespace: impl Into<String>) -> Self {
        self.with(|config| config.namespace = Some(namespace.into()))
    }

    /// Overrides the `ServiceName` default dimension
    pub fn service_name(self, service_name: impl Into<String>) -> Self {
        self.with(|config| config.service_name = Some(service_name.into()))
    }

    /// Overrides the `ServiceType` default dimension
    pub fn service_type(self, service_type: impl Into<String>) -> Self {
        self.with(|config| config.service_type = Some(service_type.into()))
    }

    /// Log group the agent writes to, ignored on Lambda
    pub fn log_group_name(self, log_group_name: impl Into<String>) -> Self {
        self.with(|config| config.log_group_name = Some(log_group_name.into()))
    }

    pub fn log_stream_name(self, log_stream_name: impl Into<String>) -> Self {
        self.with(|config| config.log_stream_name = Some(log_stream_name.into()))
    }

    /// `tcp://host:port` or `udp://host:port`, defaults to `tcp://0.0.0.0:25888`
    pub fn agent_endpoint(self, agent_endpoint: impl Into<String>) -> Self {
        self.with(|config| config.agent_endpoint = Some(agent_endpoint.into()))
    }

    /// Skip environment detection, one of `lambda`, `local` or `default`
    pub fn environment(self, environment: impl Into<String>) -> Self {
        self.with(|config| config.environment = Some(environment.into()))
    }

    /// Emit plain structured logs that CloudWatch will not extract metrics from
    pub fn disable_metric_extraction(self, disable: bool) -> Self {
        self.with(|config| config.disable_metric_extraction = disable)
    }

    /// Bounds each connect and write to the agent, defaults to 2 seconds
    pub fn agent_timeout(self, timeout: Duration) -> Self {
        self.with(|config| config.agent_timeout = timeout)
    }

    /// Reuse an environment, and its sink, from another logger instead of resolving a new one
    /// * The `environment` override is ignored
    pub fn shared_environment(self, environment: Arc<dyn Environment>) -> Self {
        Self {
            shared_environment: Some(environment),
            ..self
        }
    }

    fn with(mut self, f: impl FnOnce(&mut Config)) -> Self {
        f(&mut self.config);
        self
    }

    /// Consume the builder into the configuration
    pub fn build(self) -> Result<Config, Error> {
        if let Some(namespace) = &self.config.namespace {
            validator::validate_namespace(namespace)?;
        }
        Ok(self.config)
    }

    /// Create a logger, detecting the environment unless one was set explicitly or shared
    pub fn init(self) -> Result<MetricsLogger, Error> {
        let shared_environment = self.shared_environment.clone();
        let config = Arc::new(self.build()?);
        Ok(match shared_environment {
            Some(environment) => MetricsLogger::with_environment(config, environment),
            None => MetricsLogger::new(config),
        })
    }
}
