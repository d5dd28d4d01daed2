//! # Transport
//!
//! Socket clients delivering serialized documents to a local CloudWatch agent
//!
//! Delivery is best effort: failures are logged and the payload is dropped, they never reach
//! the caller.

use bytes::Bytes;
use futures::future::{BoxFuture, FutureExt};
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::{lookup_host, TcpStream, UdpSocket};
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, error, warn};

/// Where the agent listens when no endpoint is configured
pub const DEFAULT_AGENT_ENDPOINT: &str = "tcp://0.0.0.0:25888";
const DEFAULT_AGENT_HOST: &str = "0.0.0.0";
const DEFAULT_AGENT_PORT: u16 = 25888;

/// Bound on every connect and write to the agent
pub const DEFAULT_AGENT_TIMEOUT: Duration = Duration::from_secs(2);

/// Retries after the first failed TCP send
pub const TCP_SEND_RETRIES: usize = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Tcp,
    Udp,
}

/// A parsed `scheme://host:port` agent endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub protocol: Protocol,
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    /// Parse an endpoint, returning None unless it has a tcp/udp scheme, a host and a port
    pub fn parse(endpoint: &str) -> Option<Self> {
        let url = url::Url::parse(endpoint).ok()?;
        let protocol = match url.scheme() {
            "tcp" => Protocol::Tcp,
            "udp" => Protocol::Udp,
            _ => return None,
        };
        let host = url.host_str().filter(|host| !host.is_empty())?;

        Some(Self {
            protocol,
            host: host.to_string(),
            port: url.port()?,
        })
    }

    /// The configured endpoint, falling back to [DEFAULT_AGENT_ENDPOINT] when unset or unparseable
    pub fn from_config(endpoint: Option<&str>) -> Self {
        match endpoint {
            None => Self::default(),
            Some(endpoint) => Self::parse(endpoint).unwrap_or_else(|| {
                warn!("Failed to parse the agent endpoint {endpoint}, using {DEFAULT_AGENT_ENDPOINT}");
                Self::default()
            }),
        }
    }

    /// `host:port` suitable for address resolution
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for Endpoint {
    fn default() -> Self {
        Self {
            protocol: Protocol::Tcp,
            host: DEFAULT_AGENT_HOST.to_string(),
            port: DEFAULT_AGENT_PORT,
        }
    }
}

/// Something that can push a message at the agent
pub trait SocketClient: Send + Sync {
    fn send_message(&self, message: Bytes) -> BoxFuture<'_, ()>;
}

/// Agent client over a persistent TCP connection
///
/// The connection is opened lazily and replaced whenever a connect or write fails. Concurrent
/// senders share the connection, each message is written as one contiguous block.
pub struct TcpClient {
    address: String,
    timeout: Duration,
    /// None until connected, or after a failure flagged the connection for replacement
    stream: Mutex<Option<TcpStream>>,
}

impl TcpClient {
    pub fn new(endpoint: &Endpoint, timeout: Duration) -> Self {
        Self {
            address: endpoint.address(),
            timeout,
            stream: Mutex::new(None),
        }
    }

    /// Open a new connection, replacing any existing one
    ///
    /// Returns whether the client is connected afterwards
    pub async fn connect(&self) -> bool {
        let mut stream = self.stream.lock().await;
        self.reconnect(&mut stream).await
    }

    async fn reconnect(&self, stream: &mut Option<TcpStream>) -> bool {
        *stream = None;

        match timeout(self.timeout, TcpStream::connect(&self.address)).await {
            Ok(Ok(connected)) => {
                debug!("Connected to the agent at {}", self.address);
                *stream = Some(connected);
                true
            }
            Ok(Err(e)) => {
                error!("Failed to connect to the agent at {}: {e}", self.address);
                false
            }
            Err(_) => {
                error!("Socket timeout during connect to {}", self.address);
                false
            }
        }
    }

    /// Send a message, reconnecting and retrying up to `retries` times before dropping it
    pub async fn send_message_with_retries(&self, message: &[u8], retries: usize) {
        let mut stream = self.stream.lock().await;

        for attempt in 0..=retries {
            let needs_connect = stream.as_ref().is_none_or(peer_closed);
            if needs_connect && !self.reconnect(&mut stream).await {
                continue;
            }
            // Out of the slot while writing, a cancelled or failed write must never be reused
            let Some(mut connected) = stream.take() else {
                continue;
            };

            match timeout(self.timeout, connected.write_all(message)).await {
                Ok(Ok(())) => {
                    debug!("Submitted {} bytes of metrics to the agent over TCP", message.len());
                    *stream = Some(connected);
                    return;
                }
                Ok(Err(e)) => warn!(attempt, "Failed to write metrics to the socket: {e}"),
                Err(_) => warn!(attempt, "Socket timeout during send to {}", self.address),
            }
        }

        error!(
            "Dropping {} bytes of metrics after {} failed attempts to reach the agent at {}",
            message.len(),
            retries + 1,
            self.address
        );
    }
}

impl SocketClient for TcpClient {
    fn send_message(&self, message: Bytes) -> BoxFuture<'_, ()> {
        async move { self.send_message_with_retries(&message, TCP_SEND_RETRIES).await }.boxed()
    }
}

/// Detect a connection the agent has closed since our last write
///
/// The agent never writes to us, so any readable state other than "would block" means EOF or an error
fn peer_closed(stream: &TcpStream) -> bool {
    let mut buf = [0u8; 1];
    match stream.try_read(&mut buf) {
        Ok(0) => true,
        Ok(_) => false,
        Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => false,
        Err(_) => true,
    }
}

/// Fire and forget agent client, one datagram per message
pub struct UdpClient {
    address: String,
}

impl UdpClient {
    pub fn new(endpoint: &Endpoint) -> Self {
        Self {
            address: endpoint.address(),
        }
    }

    async fn send(&self, message: &[u8]) -> std::io::Result<()> {
        let target = lookup_host(&self.address)
            .await?
            .next()
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, "agent address did not resolve"))?;
        let local: SocketAddr = match target {
            SocketAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
            SocketAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
        };

        let socket = UdpSocket::bind(local).await?;
        socket.send_to(message, target).await?;
        Ok(())
    }
}

impl SocketClient for UdpClient {
    fn send_message(&self, message: Bytes) -> BoxFuture<'_, ()> {
        async move {
            match self.send(&message).await {
                Ok(()) => debug!("Submitted {} bytes of metrics to the agent over UDP", message.len()),
                Err(e) => error!("Failed to send metrics to the agent at {} over UDP: {e}", self.address),
            }
        }
        .boxed()
    }
}

/// Build the client matching the endpoint's protocol
pub fn client_for(endpoint: &Endpoint, timeout: Duration) -> std::sync::Arc<dyn SocketClient> {
    match endpoint.protocol {
        Protocol::Tcp => std::sync::Arc::new(TcpClient::new(endpoint, timeout)),
        Protocol::Udp => std::sync::Arc::new(UdpClient::new(endpoint)),
    }
}
