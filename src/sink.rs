//! # Sinks
//!
//! Destinations a flushed [MetricsContext] is written to

use super::config::Config;
use super::context::MetricsContext;
use super::emf::LogSerializer;
use super::transport::{self, Endpoint, SocketClient};
use super::Error;
use bytes::Bytes;
use futures::future::{self, BoxFuture, FutureExt};
use std::io::Write;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

/// Consumes a context once per flush
pub trait Sink: Send + Sync {
    fn name(&self) -> &'static str;

    /// Serialize and deliver the context
    ///
    /// Only serialization errors are returned, delivery to an agent is best effort
    fn accept(&self, context: MetricsContext) -> BoxFuture<'_, Result<(), Error>>;
}

/// Sends documents to a CloudWatch agent over TCP or UDP
pub struct AgentSink {
    log_group_name: String,
    log_stream_name: Option<String>,
    serializer: LogSerializer,
    client: Arc<dyn SocketClient>,
}

impl AgentSink {
    /// Create a sink for the agent endpoint in `config`, the transport is picked by the endpoint scheme
    pub fn new(log_group_name: impl Into<String>, log_stream_name: Option<String>, config: &Config) -> Self {
        let endpoint = Endpoint::from_config(config.agent_endpoint.as_deref());
        debug!("Using agent endpoint {}:{} over {:?}", endpoint.host, endpoint.port, endpoint.protocol);

        Self::with_client(
            log_group_name,
            log_stream_name,
            LogSerializer::new(config.disable_metric_extraction),
            transport::client_for(&endpoint, config.agent_timeout),
        )
    }

    pub fn with_client(
        log_group_name: impl Into<String>,
        log_stream_name: Option<String>,
        serializer: LogSerializer,
        client: Arc<dyn SocketClient>,
    ) -> Self {
        Self {
            log_group_name: log_group_name.into(),
            log_stream_name,
            serializer,
            client,
        }
    }
}

impl Sink for AgentSink {
    fn name(&self) -> &'static str {
        "AgentSink"
    }

    fn accept(&self, mut context: MetricsContext) -> BoxFuture<'_, Result<(), Error>> {
        async move {
            context.put_metadata("LogGroupName", self.log_group_name.clone());
            if let Some(log_stream_name) = &self.log_stream_name {
                context.put_metadata("LogStreamName", log_stream_name.clone());
            }

            let documents = self.serializer.serialize(&context)?;
            for mut document in documents {
                document.push('\n');
                self.client.send_message(Bytes::from(document)).await;
            }
            Ok(())
        }
        .boxed()
    }
}

/// Writes one document per line to stdout, for environments where a log agent collects stdout
pub struct StdoutSink {
    serializer: LogSerializer,
    writer: Mutex<Box<dyn Write + Send>>,
}

impl StdoutSink {
    pub fn new(config: &Config) -> Self {
        Self::with_writer(LogSerializer::new(config.disable_metric_extraction), std::io::stdout())
    }

    /// Write to something other than stdout
    pub fn with_writer(serializer: LogSerializer, writer: impl Write + Send + 'static) -> Self {
        Self {
            serializer,
            writer: Mutex::new(Box::new(writer)),
        }
    }

    fn write(&self, context: &MetricsContext) -> Result<(), Error> {
        let documents = self.serializer.serialize(context)?;

        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        for document in documents {
            writeln!(writer, "{document}")?;
        }
        writer.flush()?;
        Ok(())
    }
}

impl Sink for StdoutSink {
    fn name(&self) -> &'static str {
        "StdoutSink"
    }

    fn accept(&self, context: MetricsContext) -> BoxFuture<'_, Result<(), Error>> {
        future::ready(self.write(&context)).boxed()
    }
}
