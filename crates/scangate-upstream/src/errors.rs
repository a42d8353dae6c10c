//! Upstream error types.
//!
//! [`TransportError`] is what a single HTTP exchange can fail with.
//! [`UpstreamError`] is what a whole [`ResilientClient::call`] can fail with,
//! after classification and retries.
//!
//! [`ResilientClient::call`]: crate::client::ResilientClient::call

use serde_json::Value;

/// Failure of a single exchange before any status code was seen.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    /// Could not connect to the service.
    #[error("connection failed: {0}")]
    Connect(String),
    /// The attempt did not complete in time.
    #[error("request timed out after {0}ms")]
    Timeout(u64),
    /// The response body could not be read.
    #[error("failed to read response body: {0}")]
    Body(String),
    /// Any other client-side failure (bad URL, TLS setup, ...).
    #[error("request failed: {0}")]
    Other(String),
}

impl TransportError {
    /// Whether another attempt could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connect(_) | Self::Timeout(_) | Self::Body(_))
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(0)
        } else if err.is_connect() {
            Self::Connect(err.to_string())
        } else if err.is_body() || err.is_decode() {
            Self::Body(err.to_string())
        } else {
            Self::Other(err.to_string())
        }
    }
}

/// Errors surfaced by upstream calls.
#[derive(Debug, Clone, thiserror::Error)]
pub enum UpstreamError {
    /// The service refused the request (4xx other than 408/429). Not retried.
    #[error("upstream rejected request ({status}): {message}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Message extracted from the response body.
        message: String,
        /// Raw response body, when it was JSON.
        body: Option<Value>,
    },

    /// A retryable status (408, 429, 5xx).
    #[error("upstream returned {status}: {message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Message extracted from the response body.
        message: String,
        /// Server hint from `Retry-After`, in milliseconds.
        retry_after_ms: Option<u64>,
    },

    /// The exchange itself failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Every attempt failed with a retryable error.
    #[error("upstream call failed after {attempts} attempts: {last}")]
    Exhausted {
        /// Number of attempts made.
        attempts: u32,
        /// The final attempt's error.
        last: Box<UpstreamError>,
    },

    /// The request could not be built (no profile, no contents, ...).
    #[error("invalid upstream request: {0}")]
    InvalidRequest(String),
}

impl UpstreamError {
    /// Whether this single-attempt error warrants another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Status { .. } => true,
            Self::Transport(e) => e.is_retryable(),
            Self::Rejected { .. } | Self::Exhausted { .. } | Self::InvalidRequest(_) => false,
        }
    }

    /// Server-provided retry hint, if any.
    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            Self::Status { retry_after_ms, .. } => *retry_after_ms,
            _ => None,
        }
    }

    /// HTTP status behind this error, looking through exhaustion.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Rejected { status, .. } | Self::Status { status, .. } => Some(*status),
            Self::Exhausted { last, .. } => last.status(),
            Self::Transport(_) | Self::InvalidRequest(_) => None,
        }
    }

    /// Whether retries were used up.
    pub fn is_exhausted(&self) -> bool {
        matches!(self, Self::Exhausted { .. })
    }

    /// Exhausted while the service kept throttling (429).
    pub fn is_throttled(&self) -> bool {
        self.is_exhausted() && self.status() == Some(429)
    }

    /// Short category label for logs and metrics.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Rejected { .. } => "rejected",
            Self::Status { .. } => "status",
            Self::Transport(_) => "transport",
            Self::Exhausted { .. } => "exhausted",
            Self::InvalidRequest(_) => "invalid_request",
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
