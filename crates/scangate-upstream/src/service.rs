//! Scan operations composed from cache, limiter, and client.
//!
//! Every operation follows the same path: consult the cache (synchronous
//! scans only), take a limiter token for the operation's category, call the
//! service through the retrying client, then store cacheable results.

use std::sync::Arc;

use scangate_settings::{GatewaySettings, RequestOverlay, UpstreamSettings};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::cache::{CacheStats, FingerprintCache};
use crate::client::{ResilientClient, UpstreamTransport};
use crate::errors::UpstreamError;
use crate::fingerprint::fingerprint;
use crate::limiter::{LimiterStats, TokenBucketLimiter};
use crate::types::{
    AsyncScanItem, MAX_IDS_PER_LOOKUP, Operation, Payload, ScanInput, ScanProfile, ScanRequest,
};

/// Result of a synchronous scan.
#[derive(Clone, Debug, PartialEq)]
pub struct ScanOutcome {
    /// Upstream verdict.
    pub result: Value,
    /// Whether it came from the cache.
    pub cached: bool,
}

/// Combined cache and limiter statistics.
#[derive(Clone, Debug, Serialize)]
pub struct ServiceStats {
    /// Fingerprint cache.
    pub cache: CacheStats,
    /// Token buckets.
    pub limiter: LimiterStats,
}

/// Default profile selection taken from settings.
#[derive(Clone, Debug, Default)]
struct ProfileDefaults {
    name: Option<String>,
    id: Option<String>,
}

impl From<&UpstreamSettings> for ProfileDefaults {
    fn from(settings: &UpstreamSettings) -> Self {
        Self {
            name: settings.default_profile_name.clone(),
            id: settings.default_profile_id.clone(),
        }
    }
}

/// Front door for every upstream-backed operation.
pub struct ScanService {
    client: ResilientClient,
    cache: FingerprintCache,
    limiter: TokenBucketLimiter,
    defaults: ProfileDefaults,
}

impl ScanService {
    /// Assemble a service from settings over `transport`.
    pub fn new(settings: &GatewaySettings, transport: Arc<dyn UpstreamTransport>) -> Self {
        let client = ResilientClient::new(
            transport,
            settings.retry.clone(),
            std::time::Duration::from_millis(settings.upstream.timeout_ms),
        );
        Self::from_parts(
            client,
            FingerprintCache::new(&settings.cache),
            TokenBucketLimiter::new(&settings.limiter),
            &settings.upstream,
        )
    }

    /// Assemble a service from prebuilt components.
    pub fn from_parts(
        client: ResilientClient,
        cache: FingerprintCache,
        limiter: TokenBucketLimiter,
        upstream: &UpstreamSettings,
    ) -> Self {
        Self {
            client,
            cache,
            limiter,
            defaults: upstream.into(),
        }
    }

    /// Pick the scan profile: overlay id, overlay name, configured id,
    /// configured name, in that order.
    pub fn resolve_profile(&self, overlay: &RequestOverlay) -> Result<ScanProfile, UpstreamError> {
        let non_blank = |s: &Option<String>| s.clone().filter(|v| !v.trim().is_empty());
        non_blank(&overlay.profile_id)
            .map(ScanProfile::Id)
            .or_else(|| non_blank(&overlay.profile_name).map(ScanProfile::Name))
            .or_else(|| non_blank(&self.defaults.id).map(ScanProfile::Id))
            .or_else(|| non_blank(&self.defaults.name).map(ScanProfile::Name))
            .ok_or_else(|| UpstreamError::InvalidRequest("no scan profile configured".into()))
    }

    /// Synchronous scan. Identical content under the same profile is served
    /// from the cache, whatever the transaction id or metadata.
    #[instrument(skip_all, fields(contents = input.contents.len()))]
    pub async fn scan(
        &self,
        input: ScanInput,
        overlay: &RequestOverlay,
    ) -> Result<ScanOutcome, UpstreamError> {
        validate_contents(&input)?;
        let profile = self.resolve_profile(overlay)?;

        let use_cache = overlay.cache_enabled(self.cache.is_enabled());
        let key = if use_cache {
            match fingerprint(&profile, &input.contents) {
                Ok(key) => Some(key),
                Err(e) => {
                    warn!(error = %e, "fingerprint failed, scanning uncached");
                    None
                }
            }
        } else {
            None
        };

        if let Some(hit) = key.as_ref().and_then(|k| self.cache.get(k)) {
            debug!("scan served from cache");
            return Ok(ScanOutcome {
                result: hit,
                cached: true,
            });
        }

        let body = to_body(&ScanRequest::new(input, profile))?;
        let result = self.execute(Operation::SyncScan, Payload::Body(body)).await?;
        if let Some(key) = key {
            self.cache.set(key, result.clone());
        }
        Ok(ScanOutcome {
            result,
            cached: false,
        })
    }

    /// Submit a batch for asynchronous scanning. Never cached.
    #[instrument(skip_all, fields(batch = inputs.len()))]
    pub async fn submit_async(
        &self,
        inputs: Vec<ScanInput>,
        overlay: &RequestOverlay,
    ) -> Result<Value, UpstreamError> {
        if inputs.is_empty() {
            return Err(UpstreamError::InvalidRequest("at least one scan is required".into()));
        }
        for input in &inputs {
            validate_contents(input)?;
        }
        let profile = self.resolve_profile(overlay)?;
        let items: Vec<AsyncScanItem> = (1u32..)
            .zip(inputs)
            .map(|(req_id, input)| AsyncScanItem {
                req_id,
                scan_req: ScanRequest::new(input, profile.clone()),
            })
            .collect();
        let body = to_body(&items)?;
        self.execute(Operation::AsyncScan, Payload::Body(body)).await
    }

    /// Look up results for previously submitted scans.
    pub async fn fetch_results(&self, scan_ids: &[String]) -> Result<Value, UpstreamError> {
        let ids = join_ids(scan_ids, "scan_ids")?;
        self.execute(Operation::Results, Payload::Query(vec![("scan_ids", ids)]))
            .await
    }

    /// Look up threat reports.
    pub async fn fetch_reports(&self, report_ids: &[String]) -> Result<Value, UpstreamError> {
        let ids = join_ids(report_ids, "report_ids")?;
        self.execute(Operation::Reports, Payload::Query(vec![("report_ids", ids)]))
            .await
    }

    /// Drop all cached results. Returns the number dropped.
    pub fn clear_cache(&self) -> usize {
        self.cache.clear()
    }

    /// Cache and limiter statistics.
    pub fn stats(&self) -> ServiceStats {
        ServiceStats {
            cache: self.cache.stats(),
            limiter: self.limiter.stats(),
        }
    }

    async fn execute(&self, operation: Operation, payload: Payload) -> Result<Value, UpstreamError> {
        self.limiter.acquire(operation.category()).await;
        self.client.call(operation, payload).await
    }
}

fn validate_contents(input: &ScanInput) -> Result<(), UpstreamError> {
    if input.contents.is_empty() {
        return Err(UpstreamError::InvalidRequest("contents must not be empty".into()));
    }
    if input.contents.iter().any(crate::types::ScanContent::is_empty) {
        return Err(UpstreamError::InvalidRequest(
            "each content needs a prompt or a response".into(),
        ));
    }
    Ok(())
}

fn join_ids(ids: &[String], field: &str) -> Result<String, UpstreamError> {
    let ids: Vec<&str> = ids.iter().map(|s| s.trim()).filter(|s| !s.is_empty()).collect();
    if ids.is_empty() {
        return Err(UpstreamError::InvalidRequest(format!("{field} must not be empty")));
    }
    if ids.len() > MAX_IDS_PER_LOOKUP {
        return Err(UpstreamError::InvalidRequest(format!(
            "{field} accepts at most {MAX_IDS_PER_LOOKUP} ids"
        )));
    }
    Ok(ids.join(","))
}

fn to_body<T: Serialize>(value: &T) -> Result<Value, UpstreamError> {
    serde_json::to_value(value)
        .map_err(|e| UpstreamError::InvalidRequest(format!("unserializable request: {e}")))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
