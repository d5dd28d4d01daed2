//! # Environment
//!
//! Where the process runs decides the default dimensions, the extra properties and the sink
//!
//! The Lambda runtime is recognised from its environment variables,
//! anything else falls back to the CloudWatch agent unless an override is configured.

use super::config::Config;
use super::context::MetricsContext;
use super::sink::{AgentSink, Sink, StdoutSink};
use std::sync::Arc;
use tracing::{debug, info, warn};

const UNKNOWN: &str = "Unknown";

pub trait Environment: Send + Sync {
    /// Used for the `ServiceName` dimension
    fn name(&self) -> String;

    /// Used for the `ServiceType` dimension
    fn env_type(&self) -> String;

    /// Used for the `LogGroup` dimension
    fn log_group_name(&self) -> String;

    /// Add environment specific properties before a flush
    fn configure_context(&self, context: &mut MetricsContext);

    fn sink(&self) -> Arc<dyn Sink>;
}

/// Running inside an AWS Lambda function, documents go to stdout which Lambda ships to CloudWatch Logs
pub struct LambdaEnvironment {
    function_name: String,
    execution_env: String,
    memory_size: String,
    function_version: String,
    log_stream_name: String,
    trace_id: Option<String>,
    sink: Arc<StdoutSink>,
}

impl LambdaEnvironment {
    pub fn from_env(config: &Config) -> Self {
        Self::from_lookup(config, |key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(config: &Config, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).unwrap_or_default();

        Self {
            function_name: lookup("AWS_LAMBDA_FUNCTION_NAME")
                .filter(|name| !name.is_empty())
                .unwrap_or_else(|| UNKNOWN.to_string()),
            execution_env: get("AWS_EXECUTION_ENV"),
            memory_size: get("AWS_LAMBDA_FUNCTION_MEMORY_SIZE"),
            function_version: get("AWS_LAMBDA_FUNCTION_VERSION"),
            log_stream_name: get("AWS_LAMBDA_LOG_STREAM_NAME"),
            // Only sampled traces can be looked up in X-Ray
            trace_id: lookup("_X_AMZN_TRACE_ID").filter(|trace_id| trace_id.contains("Sampled=1")),
            sink: Arc::new(StdoutSink::new(config)),
        }
    }

    /// Whether the Lambda runtime variables are present
    pub(crate) fn probe(lookup: impl Fn(&str) -> Option<String>) -> bool {
        lookup("AWS_LAMBDA_FUNCTION_NAME").is_some_and(|name| !name.is_empty())
    }
}

impl Environment for LambdaEnvironment {
    fn name(&self) -> String {
        self.log_group_name()
    }

    fn env_type(&self) -> String {
        "AWS::Lambda::Function".to_string()
    }

    fn log_group_name(&self) -> String {
        self.function_name.clone()
    }

    fn configure_context(&self, context: &mut MetricsContext) {
        context.set_property("executionEnvironment", self.execution_env.clone());
        context.set_property("memorySize", self.memory_size.clone());
        context.set_property("functionVersion", self.function_version.clone());
        context.set_property("logStreamId", self.log_stream_name.clone());
        if let Some(trace_id) = &self.trace_id {
            context.set_property("traceId", trace_id.clone());
        }
    }

    fn sink(&self) -> Arc<dyn Sink> {
        self.sink.clone()
    }
}

/// Local development, documents go to stdout
pub struct LocalEnvironment {
    config: Arc<Config>,
    sink: Arc<StdoutSink>,
}

impl LocalEnvironment {
    pub fn new(config: Arc<Config>) -> Self {
        let sink = Arc::new(StdoutSink::new(&config));
        Self { config, sink }
    }
}

impl Environment for LocalEnvironment {
    fn name(&self) -> String {
        self.config.service_name.clone().unwrap_or_else(|| UNKNOWN.to_string())
    }

    fn env_type(&self) -> String {
        self.config.service_type.clone().unwrap_or_else(|| UNKNOWN.to_string())
    }

    fn log_group_name(&self) -> String {
        self.config
            .log_group_name
            .clone()
            .unwrap_or_else(|| format!("{}-metrics", self.name()))
    }

    fn configure_context(&self, _context: &mut MetricsContext) {}

    fn sink(&self) -> Arc<dyn Sink> {
        self.sink.clone()
    }
}

/// Any other host, documents go to the CloudWatch agent
pub struct DefaultEnvironment {
    config: Arc<Config>,
    sink: Arc<AgentSink>,
}

impl DefaultEnvironment {
    pub fn new(config: Arc<Config>) -> Self {
        let name = config.service_name.clone().unwrap_or_else(|| UNKNOWN.to_string());
        let log_group_name = config
            .log_group_name
            .clone()
            .unwrap_or_else(|| format!("{name}-metrics"));
        let sink = Arc::new(AgentSink::new(log_group_name, config.log_stream_name.clone(), &config));
        Self { config, sink }
    }
}

impl Environment for DefaultEnvironment {
    fn name(&self) -> String {
        self.config.service_name.clone().unwrap_or_else(|| UNKNOWN.to_string())
    }

    fn env_type(&self) -> String {
        self.config.service_type.clone().unwrap_or_else(|| UNKNOWN.to_string())
    }

    fn log_group_name(&self) -> String {
        self.config
            .log_group_name
            .clone()
            .unwrap_or_else(|| format!("{}-metrics", self.name()))
    }

    fn configure_context(&self, _context: &mut MetricsContext) {}

    fn sink(&self) -> Arc<dyn Sink> {
        self.sink.clone()
    }
}

/// Pick the environment from the configured override, or detect it from the process environment
pub fn resolve_environment(config: &Arc<Config>) -> Arc<dyn Environment> {
    resolve_with(config, |key| std::env::var(key).ok())
}

pub(crate) fn resolve_with(config: &Arc<Config>, lookup: impl Fn(&str) -> Option<String>) -> Arc<dyn Environment> {
    if let Some(environment) = &config.environment {
        match environment.to_ascii_lowercase().as_str() {
            "lambda" => return Arc::new(LambdaEnvironment::from_lookup(config, lookup)),
            "local" => return Arc::new(LocalEnvironment::new(config.clone())),
            "default" => return Arc::new(DefaultEnvironment::new(config.clone())),
            _ => warn!("Failed to understand environment override: {environment}"),
        }
    }

    if LambdaEnvironment::probe(&lookup) {
        info!("Detected environment: Lambda");
        return Arc::new(LambdaEnvironment::from_lookup(config, lookup));
    }

    debug!("No environment was detected, using the CloudWatch agent");
    Arc::new(DefaultEnvironment::new(config.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| vars.get(key).cloned()
    }

    const LAMBDA_VARS: &[(&str, &str)] = &[
        ("AWS_LAMBDA_FUNCTION_NAME", "orders-fn"),
        ("AWS_EXECUTION_ENV", "AWS_Lambda_rust"),
        ("AWS_LAMBDA_FUNCTION_MEMORY_SIZE", "128"),
        ("AWS_LAMBDA_FUNCTION_VERSION", "$LATEST"),
        ("AWS_LAMBDA_LOG_STREAM_NAME", "2024/01/01/[$LATEST]abc"),
        ("_X_AMZN_TRACE_ID", "Root=1-5759e988;Sampled=1"),
    ];

    #[test]
    fn lambda_environment() {
        let environment = LambdaEnvironment::from_lookup(&Config::default(), lookup(LAMBDA_VARS));
        assert_eq!(environment.name(), "orders-fn");
        assert_eq!(environment.log_group_name(), "orders-fn");
        assert_eq!(environment.env_type(), "AWS::Lambda::Function");
        assert_eq!(environment.sink().name(), "StdoutSink");

        let mut context = MetricsContext::empty();
        environment.configure_context(&mut context);
        assert_eq!(context.properties()["executionEnvironment"], json!("AWS_Lambda_rust"));
        assert_eq!(context.properties()["memorySize"], json!("128"));
        assert_eq!(context.properties()["functionVersion"], json!("$LATEST"));
        assert_eq!(context.properties()["logStreamId"], json!("2024/01/01/[$LATEST]abc"));
        assert_eq!(context.properties()["traceId"], json!("Root=1-5759e988;Sampled=1"));
    }

    #[test]
    fn lambda_skips_unsampled_trace() {
        let environment = LambdaEnvironment::from_lookup(
            &Config::default(),
            lookup(&[
                ("AWS_LAMBDA_FUNCTION_NAME", "orders-fn"),
                ("_X_AMZN_TRACE_ID", "Root=1-5759e988;Sampled=0"),
            ]),
        );
        let mut context = MetricsContext::empty();
        environment.configure_context(&mut context);
        assert!(context.properties().get("traceId").is_none());
    }

    #[test]
    fn forced_lambda_without_runtime_variables_is_unknown() {
        let config = Arc::new(Config {
            environment: Some("lambda".to_string()),
            ..Config::default()
        });
        let environment = resolve_with(&config, lookup(&[]));
        assert_eq!(environment.env_type(), "AWS::Lambda::Function");
        assert_eq!(environment.name(), "Unknown");
        assert_eq!(environment.log_group_name(), "Unknown");
    }

    #[test]
    fn default_environment_names() {
        let environment = DefaultEnvironment::new(Arc::new(Config::default()));
        assert_eq!(environment.name(), "Unknown");
        assert_eq!(environment.env_type(), "Unknown");
        assert_eq!(environment.log_group_name(), "Unknown-metrics");
        assert_eq!(environment.sink().name(), "AgentSink");

        let config = Config {
            service_name: Some("Orders".to_string()),
            service_type: Some("Api".to_string()),
            ..Config::default()
        };
        let environment = DefaultEnvironment::new(Arc::new(config));
        assert_eq!(environment.name(), "Orders");
        assert_eq!(environment.env_type(), "Api");
        assert_eq!(environment.log_group_name(), "Orders-metrics");
    }

    #[test]
    fn local_environment_uses_stdout() {
        let config = Config {
            log_group_name: Some("explicit".to_string()),
            ..Config::default()
        };
        let environment = LocalEnvironment::new(Arc::new(config));
        assert_eq!(environment.log_group_name(), "explicit");
        assert_eq!(environment.sink().name(), "StdoutSink");
    }

    #[test]
    fn resolve_detects_lambda() {
        let config = Arc::new(Config::default());
        let environment = resolve_with(&config, lookup(LAMBDA_VARS));
        assert_eq!(environment.env_type(), "AWS::Lambda::Function");

        let environment = resolve_with(&config, lookup(&[]));
        assert_eq!(environment.sink().name(), "AgentSink");
    }

    #[test]
    fn resolve_honours_override() {
        let config = Arc::new(Config {
            environment: Some("LOCAL".to_string()),
            ..Config::default()
        });
        // The override wins over detection
        let environment = resolve_with(&config, lookup(LAMBDA_VARS));
        assert_eq!(environment.sink().name(), "StdoutSink");
        assert_eq!(environment.env_type(), "Unknown");

        let config = Arc::new(Config {
            environment: Some("mainframe".to_string()),
            ..Config::default()
        });
        let environment = resolve_with(&config, lookup(&[]));
        assert_eq!(environment.sink().name(), "AgentSink");
    }
}
