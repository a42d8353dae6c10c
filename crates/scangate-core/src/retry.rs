//! Retry configuration and backoff math.
//!
//! Only the sync building blocks live here. The async retry loop belongs to
//! `scangate-upstream`, which owns the transport and the sleeps.
//!
//! - [`RetryConfig`]: attempt ceiling, backoff base and cap, jitter
//! - [`calculate_backoff_delay`]: exponential backoff, no randomness
//! - [`calculate_backoff_delay_with_random`]: same, with caller-supplied jitter
//! - [`parse_retry_after_header`]: `Retry-After` as seconds or HTTP date

use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Default total attempts (first try included).
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
/// Default base delay in milliseconds.
pub const DEFAULT_BASE_DELAY_MS: u64 = 500;
/// Default maximum delay in milliseconds.
pub const DEFAULT_MAX_DELAY_MS: u64 = 10_000;
/// Default jitter factor (0.0–1.0).
pub const DEFAULT_JITTER_FACTOR: f64 = 0.1;

/// Configuration for upstream retries.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetryConfig {
    /// Total attempts including the first one. Values below 1 act as 1.
    pub max_attempts: u32,
    /// Delay before the second attempt, doubled for each later one.
    pub base_delay_ms: u64,
    /// Ceiling for computed delays. Server hints are not capped.
    pub max_delay_ms: u64,
    /// Symmetric jitter range; `0.2` varies the delay by ±20%.
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
            jitter_factor: DEFAULT_JITTER_FACTOR,
        }
    }
}

impl RetryConfig {
    /// Attempt ceiling, never below one.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Delay to wait after the given failed attempt (1-based).
    ///
    /// A server-provided hint wins verbatim; otherwise exponential backoff
    /// with jitter drawn from the thread RNG.
    #[must_use]
    pub fn delay_after(&self, attempt: u32, retry_after_ms: Option<u64>) -> u64 {
        if let Some(hint) = retry_after_ms {
            return hint;
        }
        if self.jitter_factor <= 0.0 {
            return calculate_backoff_delay(attempt, self.base_delay_ms, self.max_delay_ms);
        }
        calculate_backoff_delay_with_random(
            attempt,
            self.base_delay_ms,
            self.max_delay_ms,
            self.jitter_factor,
            rand::random::<f64>(),
        )
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Backoff calculation
// ─────────────────────────────────────────────────────────────────────────────

/// Exponential backoff without jitter.
///
/// Formula: `min(max_delay, base_delay * 2^(attempt - 1))`, where `attempt`
/// is the 1-based number of the attempt that just failed.
#[must_use]
pub fn calculate_backoff_delay(attempt: u32, base_delay_ms: u64, max_delay_ms: u64) -> u64 {
    let exponent = attempt.saturating_sub(1).min(31);
    base_delay_ms
        .saturating_mul(1u64 << exponent)
        .min(max_delay_ms)
}

/// Exponential backoff with explicit randomness.
///
/// `random` should be in `[0.0, 1.0)`; it maps to a multiplier in
/// `[1 - jitter, 1 + jitter]`.
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn calculate_backoff_delay_with_random(
    attempt: u32,
    base_delay_ms: u64,
    max_delay_ms: u64,
    jitter_factor: f64,
    random: f64,
) -> u64 {
    let capped = calculate_backoff_delay(attempt, base_delay_ms, max_delay_ms);
    let jitter = 1.0 + (random * 2.0 - 1.0) * jitter_factor.clamp(0.0, 1.0);
    ((capped as f64) * jitter).round().max(0.0) as u64
}

// ─────────────────────────────────────────────────────────────────────────────
// Retry-After header parsing
// ─────────────────────────────────────────────────────────────────────────────

/// Parse a `Retry-After` header value into milliseconds.
///
/// Accepts integer seconds (`"120"`) or an HTTP date
/// (`"Wed, 21 Oct 2015 07:28:00 GMT"`). Dates in the past yield `0`.
#[must_use]
pub fn parse_retry_after_header(value: &str) -> Option<u64> {
    let value = value.trim();
    if let Ok(seconds) = value.parse::<u64>() {
        return Some(seconds.saturating_mul(1000));
    }

    let date = chrono::DateTime::parse_from_rfc2822(value).ok()?;
    let delay_ms = date
        .signed_duration_since(chrono::Utc::now())
        .num_milliseconds();
    Some(u64::try_from(delay_ms).unwrap_or(0))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
