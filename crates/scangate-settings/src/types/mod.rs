//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]`: field names
//! are camelCase on the wire and any missing field gets its compiled
//! default, so partial JSON files are valid.

mod server;
mod upstream;

pub use server::*;
pub use upstream::*;

use scangate_core::retry::RetryConfig;
use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings type for the gateway.
///
/// ```json
/// {
///   "server": { "port": 8080 },
///   "upstream": { "defaultProfileName": "strict" },
///   "streaming": { "electedMethods": ["tools/call"] }
/// }
/// ```
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GatewaySettings {
    /// HTTP listener and session behavior.
    pub server: ServerSettings,
    /// Remote scanning service.
    pub upstream: UpstreamSettings,
    /// Retry policy for upstream calls.
    pub retry: RetryConfig,
    /// Fingerprint cache.
    pub cache: CacheSettings,
    /// Per-category token buckets.
    pub limiter: LimiterSettings,
    /// Which methods deliver over a live push stream.
    pub streaming: StreamingSettings,
    /// Log level and format.
    pub logging: LoggingSettings,
}

impl GatewaySettings {
    /// Reject values that would make a component unusable.
    pub fn validate(&self) -> Result<()> {
        fn positive(value: u64, name: &str) -> Result<()> {
            if value == 0 {
                return Err(SettingsError::InvalidValue(format!("{name} must be > 0")));
            }
            Ok(())
        }

        positive(self.server.heartbeat_interval_ms, "server.heartbeatIntervalMs")?;
        positive(
            self.server.stream_channel_capacity as u64,
            "server.streamChannelCapacity",
        )?;
        positive(self.server.handler_timeout_ms, "server.handlerTimeoutMs")?;
        positive(self.upstream.timeout_ms, "upstream.timeoutMs")?;
        if self.cache.enabled {
            positive(self.cache.max_size as u64, "cache.maxSize")?;
        }
        for (name, bucket) in [
            ("submit", &self.limiter.submit),
            ("results", &self.limiter.results),
            ("reports", &self.limiter.reports),
        ] {
            positive(u64::from(bucket.capacity), &format!("limiter.{name}.capacity"))?;
            positive(bucket.window_ms, &format!("limiter.{name}.windowMs"))?;
        }
        if self.upstream.base_url.trim().is_empty() {
            return Err(SettingsError::InvalidValue(
                "upstream.baseUrl must not be empty".into(),
            ));
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
