//! Upstream service, cache, and limiter settings.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Remote scanning service settings.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UpstreamSettings {
    /// Service root, without a trailing path.
    pub base_url: String,
    /// API key. Only ever read from `SCANGATE_API_KEY`.
    #[serde(skip)]
    pub api_key: Option<String>,
    /// Header carrying the API key.
    pub api_key_header: String,
    /// Scan profile used when a request names none.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_profile_name: Option<String>,
    /// Scan profile id used when a request names none. Wins over the name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_profile_id: Option<String>,
    /// Per-attempt timeout.
    pub timeout_ms: u64,
}

impl Default for UpstreamSettings {
    fn default() -> Self {
        Self {
            base_url: "https://service.api.aisecurity.paloaltonetworks.com".to_string(),
            api_key: None,
            api_key_header: "x-pan-token".to_string(),
            default_profile_name: Some("default".to_string()),
            default_profile_id: None,
            timeout_ms: 30_000,
        }
    }
}

impl fmt::Debug for UpstreamSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpstreamSettings")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("api_key_header", &self.api_key_header)
            .field("default_profile_name", &self.default_profile_name)
            .field("default_profile_id", &self.default_profile_id)
            .field("timeout_ms", &self.timeout_ms)
            .finish()
    }
}

/// Fingerprint cache settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CacheSettings {
    /// When false, every lookup misses and nothing is stored.
    pub enabled: bool,
    /// Entry lifetime in seconds.
    pub ttl_secs: u64,
    /// Maximum number of live entries.
    pub max_size: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: 300,
            max_size: 1000,
        }
    }
}

/// One token bucket.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BucketSettings {
    /// Maximum tokens, and tokens restored per window.
    pub capacity: u32,
    /// Refill window in milliseconds.
    pub window_ms: u64,
}

impl Default for BucketSettings {
    fn default() -> Self {
        Self {
            capacity: 10,
            window_ms: 1000,
        }
    }
}

/// Token-bucket limiter settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LimiterSettings {
    /// When false, `acquire` never waits.
    pub enabled: bool,
    /// Scan submissions (sync and async).
    pub submit: BucketSettings,
    /// Result lookups.
    pub results: BucketSettings,
    /// Report lookups.
    pub reports: BucketSettings,
}

impl Default for LimiterSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            submit: BucketSettings::default(),
            results: BucketSettings {
                capacity: 20,
                window_ms: 1000,
            },
            reports: BucketSettings {
                capacity: 20,
                window_ms: 1000,
            },
        }
    }
}
