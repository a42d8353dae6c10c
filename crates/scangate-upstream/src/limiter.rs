//! Per-category token buckets for outbound calls.
//!
//! Refill is lazy: each acquisition first credits
//! `elapsed / window * capacity` tokens (capped at capacity). A short bucket
//! makes the caller sleep until the missing fraction of a token has accrued
//! and try again.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::time::Duration;

use metrics::counter;
use parking_lot::Mutex;
use scangate_settings::{BucketSettings, LimiterSettings};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::debug;

/// Limiter bucket an upstream call is charged to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LimitCategory {
    /// Scan submissions.
    Submit,
    /// Result lookups.
    Results,
    /// Report lookups.
    Reports,
}

impl LimitCategory {
    /// All categories.
    pub const ALL: [Self; 3] = [Self::Submit, Self::Results, Self::Reports];

    /// Lowercase label.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Submit => "submit",
            Self::Results => "results",
            Self::Reports => "reports",
        }
    }
}

impl fmt::Display for LimitCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug)]
struct TokenBucket {
    capacity: f64,
    tokens: f64,
    window: Duration,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(settings: BucketSettings, now: Instant) -> Self {
        let capacity = f64::from(settings.capacity.max(1));
        Self {
            capacity,
            tokens: capacity,
            window: Duration::from_millis(settings.window_ms.max(1)),
            last_refill: now,
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill);
        if elapsed.is_zero() {
            return;
        }
        let credit = elapsed.as_nanos() as f64 / self.window.as_nanos() as f64 * self.capacity;
        self.tokens = (self.tokens + credit).min(self.capacity);
        self.last_refill = now;
    }

    /// Take a token, or report how long until a whole token is available.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    fn try_take(&mut self, now: Instant) -> Result<(), Duration> {
        self.refill(now);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            return Ok(());
        }
        let deficit = 1.0 - self.tokens;
        let nanos = (deficit / self.capacity * self.window.as_nanos() as f64).ceil();
        Err(Duration::from_nanos((nanos as u64).max(1)))
    }
}

/// Snapshot of one bucket.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketStats {
    /// Maximum tokens.
    pub capacity: u32,
    /// Tokens available now.
    pub tokens: f64,
    /// Refill window.
    pub window_ms: u64,
}

/// Snapshot of the limiter.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LimiterStats {
    /// Per-category buckets.
    pub buckets: BTreeMap<LimitCategory, BucketStats>,
    /// Whether admission control is active.
    pub enabled: bool,
}

/// Token-bucket admission control, one bucket per [`LimitCategory`].
pub struct TokenBucketLimiter {
    enabled: bool,
    buckets: HashMap<LimitCategory, Mutex<TokenBucket>>,
}

impl TokenBucketLimiter {
    /// Create a limiter with full buckets.
    pub fn new(settings: &LimiterSettings) -> Self {
        let now = Instant::now();
        let buckets = LimitCategory::ALL
            .into_iter()
            .map(|category| {
                let bucket = match category {
                    LimitCategory::Submit => settings.submit,
                    LimitCategory::Results => settings.results,
                    LimitCategory::Reports => settings.reports,
                };
                (category, Mutex::new(TokenBucket::new(bucket, now)))
            })
            .collect();
        Self {
            enabled: settings.enabled,
            buckets,
        }
    }

    /// Wait until a token for `category` is available and take it.
    pub async fn acquire(&self, category: LimitCategory) {
        if !self.enabled {
            return;
        }
        let Some(bucket) = self.buckets.get(&category) else {
            return;
        };
        loop {
            let wait = match bucket.lock().try_take(Instant::now()) {
                Ok(()) => return,
                Err(wait) => wait,
            };
            counter!("limiter_waits_total", "category" => category.as_str()).increment(1);
            debug!(%category, wait_ms = wait.as_millis(), "limiter bucket empty, waiting");
            tokio::time::sleep(wait).await;
        }
    }

    /// Current statistics, with buckets refilled to now.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn stats(&self) -> LimiterStats {
        let now = Instant::now();
        let buckets = self
            .buckets
            .iter()
            .map(|(category, bucket)| {
                let mut bucket = bucket.lock();
                bucket.refill(now);
                let stats = BucketStats {
                    capacity: bucket.capacity as u32,
                    tokens: bucket.tokens,
                    window_ms: u64::try_from(bucket.window.as_millis()).unwrap_or(u64::MAX),
                };
                (*category, stats)
            })
            .collect();
        LimiterStats {
            buckets,
            enabled: self.enabled,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(capacity: u32, window_ms: u64) -> TokenBucketLimiter {
        let bucket = BucketSettings {
            capacity,
            window_ms,
        };
        TokenBucketLimiter::new(&LimiterSettings {
            enabled: true,
            submit: bucket,
            results: bucket,
            reports: bucket,
        })
    }

    #[tokio::test(start_paused = true)]
    async fn capacity_acquisitions_are_immediate() {
        let l = limiter(3, 1000);
        let start = Instant::now();
        for _ in 0..3 {
            l.acquire(LimitCategory::Submit).await;
        }
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn next_acquisition_waits_one_token() {
        let l = limiter(4, 1000);
        for _ in 0..4 {
            l.acquire(LimitCategory::Submit).await;
        }
        let start = Instant::now();
        l.acquire(LimitCategory::Submit).await;
        assert!(start.elapsed() >= Duration::from_millis(250));
        assert!(start.elapsed() < Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn partial_refill_shortens_the_wait() {
        let l = limiter(4, 1000);
        for _ in 0..4 {
            l.acquire(LimitCategory::Submit).await;
        }
        tokio::time::advance(Duration::from_millis(200)).await;

        let start = Instant::now();
        l.acquire(LimitCategory::Submit).await;
        let waited = start.elapsed();
        assert!(waited >= Duration::from_millis(50), "waited {waited:?}");
        assert!(waited < Duration::from_millis(100), "waited {waited:?}");
    }

    #[test]
    fn wait_covers_only_the_deficit() {
        let start = Instant::now();
        let mut bucket = TokenBucket::new(
            BucketSettings {
                capacity: 4,
                window_ms: 1000,
            },
            start,
        );
        bucket.tokens = 0.0;
        let wait = bucket.try_take(start + Duration::from_millis(200)).unwrap_err();
        let expected = Duration::from_millis(50);
        assert!(wait >= expected, "wait {wait:?}");
        assert!(wait - expected < Duration::from_micros(1), "wait {wait:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn uneven_window_still_admits_after_one_wait() {
        let l = limiter(3, 1000);
        for _ in 0..3 {
            l.acquire(LimitCategory::Results).await;
        }
        let start = Instant::now();
        l.acquire(LimitCategory::Results).await;
        let waited = start.elapsed();
        assert!(waited >= Duration::from_nanos(333_333_333));
        assert!(waited < Duration::from_millis(400));
    }

    #[tokio::test(start_paused = true)]
    async fn categories_are_independent() {
        let l = limiter(1, 10_000);
        l.acquire(LimitCategory::Submit).await;
        let start = Instant::now();
        l.acquire(LimitCategory::Reports).await;
        l.acquire(LimitCategory::Results).await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn refill_is_capped_at_capacity() {
        let l = limiter(2, 100);
        tokio::time::advance(Duration::from_secs(60)).await;
        let stats = l.stats();
        let submit = &stats.buckets[&LimitCategory::Submit];
        assert!((submit.tokens - 2.0).abs() < f64::EPSILON);
    }

    #[tokio::test(start_paused = true)]
    async fn disabled_never_waits() {
        let l = TokenBucketLimiter::new(&LimiterSettings {
            enabled: false,
            ..LimiterSettings::default()
        });
        let start = Instant::now();
        for _ in 0..1000 {
            l.acquire(LimitCategory::Submit).await;
        }
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert!(!l.stats().enabled);
    }

    #[tokio::test(start_paused = true)]
    async fn stats_reflect_consumption() {
        let l = limiter(5, 1000);
        l.acquire(LimitCategory::Reports).await;
        l.acquire(LimitCategory::Reports).await;
        let stats = l.stats();
        assert!((stats.buckets[&LimitCategory::Reports].tokens - 3.0).abs() < 1e-9);
        assert_eq!(stats.buckets[&LimitCategory::Reports].capacity, 5);
        assert_eq!(stats.buckets[&LimitCategory::Reports].window_ms, 1000);
        assert_eq!(stats.buckets.len(), 3);
    }

    #[test]
    fn stats_serialize_with_lowercase_keys() {
        let json = serde_json::to_value(limiter(1, 1000).stats()).unwrap();
        assert!(json["buckets"]["submit"]["windowMs"].is_number());
        assert_eq!(json["enabled"], true);
    }
}
