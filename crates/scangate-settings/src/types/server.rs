//! Server, streaming, and logging settings.

use serde::{Deserialize, Serialize};

/// HTTP listener and session settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Listen port. `0` picks an ephemeral port.
    pub port: u16,
    /// Interval between heartbeat comments on each push stream.
    pub heartbeat_interval_ms: u64,
    /// Idle sessions without a live connection are reaped after this long.
    /// Unset disables reaping.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_idle_timeout_ms: Option<u64>,
    /// Bounded channel size per push connection, in frames.
    pub stream_channel_capacity: usize,
    /// Upper bound for a single handler invocation.
    pub handler_timeout_ms: u64,
    /// Maximum accepted request body size.
    pub max_body_bytes: usize,
    /// Grace period for in-flight work on shutdown.
    pub shutdown_timeout_ms: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            heartbeat_interval_ms: 30_000,
            session_idle_timeout_ms: None,
            stream_channel_capacity: 64,
            handler_timeout_ms: 120_000,
            max_body_bytes: 1_048_576,
            shutdown_timeout_ms: 10_000,
        }
    }
}

/// Streaming election settings.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StreamingSettings {
    /// Streamable methods whose responses go over a live push stream.
    /// Empty means every response is returned in the HTTP body.
    pub elected_methods: Vec<String>,
}

impl StreamingSettings {
    /// Whether `method` was elected for streamed delivery.
    pub fn is_elected(&self, method: &str) -> bool {
        self.elected_methods.iter().any(|m| m == method)
    }
}

/// Logging settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
    /// Emit one JSON object per line instead of the compact format.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}
