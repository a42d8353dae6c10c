//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`GatewaySettings::default()`]
//! 2. If the settings file exists, deep-merge its values over the defaults
//! 3. Apply `SCANGATE_*` environment overrides (highest priority)
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::GatewaySettings;

/// Resolve the default settings path (`~/.scangate/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".scangate").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<GatewaySettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults. Invalid JSON or a value that fails
/// [`GatewaySettings::validate`] is an error.
pub fn load_settings_from_path(path: &Path) -> Result<GatewaySettings> {
    load_with_env(path, |name| std::env::var(name).ok())
}

/// Load settings using `lookup` as the environment.
pub fn load_with_env<F>(path: &Path, lookup: F) -> Result<GatewaySettings>
where
    F: Fn(&str) -> Option<String>,
{
    let defaults = serde_json::to_value(GatewaySettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: GatewaySettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings, lookup);
    settings.validate()?;
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = match target_map.remove(&key) {
                    Some(target_val) => deep_merge(target_val, source_val),
                    None => source_val,
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `SCANGATE_*` overrides read through `lookup`.
///
/// Integers must parse and fall within range, booleans accept
/// `true`/`1`/`yes`/`on` and `false`/`0`/`no`/`off`. Anything else is
/// logged and ignored.
pub fn apply_env_overrides<F>(settings: &mut GatewaySettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let env = EnvReader { lookup };

    // ── Server ──────────────────────────────────────────────────────
    if let Some(v) = env.string("SCANGATE_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = env.u16("SCANGATE_PORT", 0, 65535) {
        settings.server.port = v;
    }
    if let Some(v) = env.u64("SCANGATE_HEARTBEAT_INTERVAL_MS", 100, 3_600_000) {
        settings.server.heartbeat_interval_ms = v;
    }
    if let Some(v) = env.u64("SCANGATE_SESSION_IDLE_TIMEOUT_MS", 1000, 86_400_000) {
        settings.server.session_idle_timeout_ms = Some(v);
    }
    if let Some(v) = env.u64("SCANGATE_HANDLER_TIMEOUT_MS", 100, 3_600_000) {
        settings.server.handler_timeout_ms = v;
    }

    // ── Upstream ────────────────────────────────────────────────────
    if let Some(v) = env.string("SCANGATE_UPSTREAM_URL") {
        settings.upstream.base_url = v;
    }
    if let Some(v) = env.string("SCANGATE_API_KEY") {
        settings.upstream.api_key = Some(v);
    }
    if let Some(v) = env.string("SCANGATE_API_KEY_HEADER") {
        settings.upstream.api_key_header = v;
    }
    if let Some(v) = env.string("SCANGATE_PROFILE_NAME") {
        settings.upstream.default_profile_name = Some(v);
    }
    if let Some(v) = env.string("SCANGATE_PROFILE_ID") {
        settings.upstream.default_profile_id = Some(v);
    }
    if let Some(v) = env.u64("SCANGATE_UPSTREAM_TIMEOUT_MS", 100, 600_000) {
        settings.upstream.timeout_ms = v;
    }
    if let Some(v) = env.u32("SCANGATE_MAX_ATTEMPTS", 1, 20) {
        settings.retry.max_attempts = v;
    }

    // ── Cache / limiter ─────────────────────────────────────────────
    if let Some(v) = env.bool("SCANGATE_CACHE_ENABLED") {
        settings.cache.enabled = v;
    }
    if let Some(v) = env.u64("SCANGATE_CACHE_TTL_SECS", 1, 604_800) {
        settings.cache.ttl_secs = v;
    }
    if let Some(v) = env.usize("SCANGATE_CACHE_MAX_SIZE", 1, 1_000_000) {
        settings.cache.max_size = v;
    }
    if let Some(v) = env.bool("SCANGATE_LIMITER_ENABLED") {
        settings.limiter.enabled = v;
    }

    // ── Streaming / logging ─────────────────────────────────────────
    if let Some(v) = env.string("SCANGATE_STREAMING_METHODS") {
        settings.streaming.elected_methods = parse_list(&v);
    }
    if let Some(v) = env.string("SCANGATE_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = env.bool("SCANGATE_LOG_JSON") {
        settings.logging.json = v;
    }
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u16` within a range.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `u32` within a range.
pub fn parse_u32_range(val: &str, min: u32, max: u32) -> Option<u32> {
    let n: u32 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Split a comma-separated list, dropping blanks.
pub fn parse_list(val: &str) -> Vec<String> {
    val.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}

// ── Env var readers (thin wrappers) ─────────────────────────────────────────

struct EnvReader<F> {
    lookup: F,
}

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn parsed<T>(&self, name: &str, kind: &str, parse: impl FnOnce(&str) -> Option<T>) -> Option<T> {
        let val = (self.lookup)(name)?;
        let result = parse(&val);
        if result.is_none() {
            warn!(key = name, value = %val, kind, "invalid env var, ignoring");
        }
        result
    }

    fn bool(&self, name: &str) -> Option<bool> {
        self.parsed(name, "bool", parse_bool)
    }

    fn u16(&self, name: &str, min: u16, max: u16) -> Option<u16> {
        self.parsed(name, "u16", |v| parse_u16_range(v, min, max))
    }

    fn u32(&self, name: &str, min: u32, max: u32) -> Option<u32> {
        self.parsed(name, "u32", |v| parse_u32_range(v, min, max))
    }

    fn u64(&self, name: &str, min: u64, max: u64) -> Option<u64> {
        self.parsed(name, "u64", |v| parse_u64_range(v, min, max))
    }

    fn usize(&self, name: &str, min: usize, max: usize) -> Option<usize> {
        self.parsed(name, "usize", |v| parse_usize_range(v, min, max))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
