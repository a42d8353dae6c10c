//! Server configuration.

use std::net::{SocketAddr, ToSocketAddrs};
use std::time::Duration;

use scangate_settings::{ServerSettings, StreamingSettings};

use crate::errors::ServerError;

/// Runtime configuration for [`GatewayServer`](crate::server::GatewayServer).
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind; `0` picks a free port.
    pub port: u16,
    /// Interval between heartbeat comments on each push stream.
    pub heartbeat_interval: Duration,
    /// Frames buffered per push stream before new ones are dropped.
    pub stream_channel_capacity: usize,
    /// Sessions without a live stream idle longer than this are reaped.
    pub session_idle_timeout: Option<Duration>,
    /// Upper bound on a single handler run.
    pub handler_timeout: Duration,
    /// Largest accepted request body.
    pub max_body_bytes: usize,
    /// Grace period for in-flight work at shutdown.
    pub shutdown_timeout: Duration,
    /// Methods answered over the push stream when possible.
    pub streaming: StreamingSettings,
}

impl ServerConfig {
    /// Build from the settings file sections.
    pub fn from_settings(server: &ServerSettings, streaming: &StreamingSettings) -> Self {
        Self {
            host: server.host.clone(),
            port: server.port,
            heartbeat_interval: Duration::from_millis(server.heartbeat_interval_ms),
            stream_channel_capacity: server.stream_channel_capacity,
            session_idle_timeout: server.session_idle_timeout_ms.map(Duration::from_millis),
            handler_timeout: Duration::from_millis(server.handler_timeout_ms),
            max_body_bytes: server.max_body_bytes,
            shutdown_timeout: Duration::from_millis(server.shutdown_timeout_ms),
            streaming: streaming.clone(),
        }
    }

    /// Resolve `host:port`.
    pub fn socket_addr(&self) -> Result<SocketAddr, ServerError> {
        let target = format!("{}:{}", self.host, self.port);
        target
            .to_socket_addrs()
            .ok()
            .and_then(|mut addrs| addrs.next())
            .ok_or(ServerError::InvalidAddress(target))
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        let mut config = Self::from_settings(&ServerSettings::default(), &StreamingSettings::default());
        config.port = 0;
        config
    }
}
