//! # Config
//!
//! Immutable configuration shared by the logger, environments and sinks
//!
//! Values can be set through [Builder](super::Builder) or read from `AWS_EMF_*` environment variables.

use super::context::DEFAULT_NAMESPACE;
use super::transport::DEFAULT_AGENT_TIMEOUT;
use std::time::Duration;

const ENV_VAR_PREFIX: &str = "AWS_EMF";

const SERVICE_NAME: &str = "SERVICE_NAME";
const SERVICE_TYPE: &str = "SERVICE_TYPE";
const LOG_GROUP_NAME: &str = "LOG_GROUP_NAME";
const LOG_STREAM_NAME: &str = "LOG_STREAM_NAME";
const AGENT_ENDPOINT: &str = "AGENT_ENDPOINT";
const NAMESPACE: &str = "NAMESPACE";
const ENVIRONMENT: &str = "ENVIRONMENT";
const DISABLE_METRIC_EXTRACTION: &str = "DISABLE_METRIC_EXTRACTION";
const AGENT_TIMEOUT_MS: &str = "AGENT_TIMEOUT_MS";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Overrides the `ServiceName` dimension detected from the environment
    pub service_name: Option<String>,
    /// Overrides the `ServiceType` dimension detected from the environment
    pub service_type: Option<String>,
    pub log_group_name: Option<String>,
    pub log_stream_name: Option<String>,
    /// `tcp://host:port` or `udp://host:port` of the CloudWatch agent
    pub agent_endpoint: Option<String>,
    pub namespace: Option<String>,
    /// Skip detection and use `lambda`, `local` or `default`
    pub environment: Option<String>,
    /// Emit plain structured logs without the `_aws` metric directive
    pub disable_metric_extraction: bool,
    /// Bound on each connect/write to the agent
    pub agent_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service_name: None,
            service_type: None,
            log_group_name: None,
            log_stream_name: None,
            agent_endpoint: None,
            namespace: None,
            environment: None,
            disable_metric_extraction: false,
            agent_timeout: DEFAULT_AGENT_TIMEOUT,
        }
    }
}

impl Config {
    /// Read configuration from the `AWS_EMF_*` environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through `lookup`, empty values are treated as unset
    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(&format!("{ENV_VAR_PREFIX}_{key}")).filter(|value| !value.is_empty());
        let get_bool = |key: &str| get(key).is_some_and(|value| value.eq_ignore_ascii_case("true"));

        Self {
            service_name: get(SERVICE_NAME),
            service_type: get(SERVICE_TYPE),
            log_group_name: get(LOG_GROUP_NAME),
            log_stream_name: get(LOG_STREAM_NAME),
            agent_endpoint: get(AGENT_ENDPOINT),
            namespace: get(NAMESPACE),
            environment: get(ENVIRONMENT),
            disable_metric_extraction: get_bool(DISABLE_METRIC_EXTRACTION),
            agent_timeout: get(AGENT_TIMEOUT_MS)
                .and_then(|ms| ms.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_AGENT_TIMEOUT),
        }
    }

    /// The configured namespace or the library default
    pub fn namespace(&self) -> &str {
        self.namespace.as_deref().unwrap_or(DEFAULT_NAMESPACE)
    }
}
