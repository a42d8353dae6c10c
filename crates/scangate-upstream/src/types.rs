//! Wire types for the scanning service.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::limiter::LimitCategory;

/// Maximum ids accepted by a single results or reports lookup.
pub const MAX_IDS_PER_LOOKUP: usize = 5;

/// Scan profile selector, serialized as the `ai_profile` object.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScanProfile {
    /// `{"profile_name": "..."}`
    #[serde(rename = "profile_name")]
    Name(String),
    /// `{"profile_id": "..."}`
    #[serde(rename = "profile_id")]
    Id(String),
}

/// One unit of content to scan.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanContent {
    /// User prompt text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    /// Model response text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    /// Grounding context.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

impl ScanContent {
    /// True when there is nothing to scan.
    pub fn is_empty(&self) -> bool {
        let blank = |s: &Option<String>| s.as_deref().is_none_or(|v| v.trim().is_empty());
        blank(&self.prompt) && blank(&self.response)
    }
}

/// Caller-side scan input, before a profile is attached.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanInput {
    /// Contents to scan.
    pub contents: Vec<ScanContent>,
    /// Caller transaction id. Echoed by the service, never part of the cache key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tr_id: Option<String>,
    /// Caller metadata (app name, user, ...). Never part of the cache key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

/// Body of a scan request.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ScanRequest {
    /// Caller transaction id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tr_id: Option<String>,
    /// Selected profile.
    pub ai_profile: ScanProfile,
    /// Caller metadata.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    /// Contents to scan.
    pub contents: Vec<ScanContent>,
}

impl ScanRequest {
    /// Attach a profile to caller input.
    pub fn new(input: ScanInput, ai_profile: ScanProfile) -> Self {
        Self {
            tr_id: input.tr_id,
            ai_profile,
            metadata: input.metadata,
            contents: input.contents,
        }
    }
}

/// One entry of an asynchronous batch submission.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AsyncScanItem {
    /// 1-based position in the batch.
    pub req_id: u32,
    /// The scan itself.
    pub scan_req: ScanRequest,
}

/// Upstream operations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    /// `POST /v1/scan/sync/request`
    SyncScan,
    /// `POST /v1/scan/async/request`
    AsyncScan,
    /// `GET /v1/scan/results?scan_ids=`
    Results,
    /// `GET /v1/scan/reports?report_ids=`
    Reports,
}

/// HTTP verb used by an [`Operation`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HttpMethod {
    /// `GET`
    Get,
    /// `POST`
    Post,
}

impl Operation {
    /// Path below the service root.
    pub fn path(self) -> &'static str {
        match self {
            Self::SyncScan => "/v1/scan/sync/request",
            Self::AsyncScan => "/v1/scan/async/request",
            Self::Results => "/v1/scan/results",
            Self::Reports => "/v1/scan/reports",
        }
    }

    /// Verb for this operation.
    pub fn method(self) -> HttpMethod {
        match self {
            Self::SyncScan | Self::AsyncScan => HttpMethod::Post,
            Self::Results | Self::Reports => HttpMethod::Get,
        }
    }

    /// Limiter bucket charged for this operation.
    pub fn category(self) -> LimitCategory {
        match self {
            Self::SyncScan | Self::AsyncScan => LimitCategory::Submit,
            Self::Results => LimitCategory::Results,
            Self::Reports => LimitCategory::Reports,
        }
    }

    /// Label for logs and metrics.
    pub fn name(self) -> &'static str {
        match self {
            Self::SyncScan => "sync_scan",
            Self::AsyncScan => "async_scan",
            Self::Results => "results",
            Self::Reports => "reports",
        }
    }
}

/// What an operation carries.
#[derive(Clone, Debug, PartialEq)]
pub enum Payload {
    /// JSON request body.
    Body(Value),
    /// Query string pairs.
    Query(Vec<(&'static str, String)>),
}

/// A fully-built request handed to the transport.
#[derive(Clone, Debug, PartialEq)]
pub struct UpstreamRequest {
    /// Which endpoint.
    pub operation: Operation,
    /// Body or query.
    pub payload: Payload,
}

/// Raw response as seen by the transport.
#[derive(Clone, Debug, PartialEq)]
pub struct UpstreamResponse {
    /// HTTP status code.
    pub status: u16,
    /// Parsed JSON body, a string for non-JSON bodies, `Null` when empty.
    pub body: Value,
    /// Parsed `Retry-After` header, in milliseconds.
    pub retry_after_ms: Option<u64>,
}

impl UpstreamResponse {
    /// Response with a JSON body and no retry hint.
    pub fn json(status: u16, body: Value) -> Self {
        Self {
            status,
            body,
            retry_after_ms: None,
        }
    }

    /// Best-effort human message from the body.
    pub fn message(&self) -> String {
        let from_body = match &self.body {
            Value::Object(map) => map
                .get("error")
                .and_then(|e| e.get("message").or(Some(e)))
                .and_then(Value::as_str)
                .or_else(|| map.get("message").and_then(Value::as_str))
                .map(ToString::to_string),
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            _ => None,
        };
        from_body.unwrap_or_else(|| format!("HTTP {}", self.status))
    }
}
