//! Retrying upstream client.
//!
//! [`ResilientClient::call`] runs one operation through an
//! [`UpstreamTransport`], classifies the outcome, and retries transient
//! failures with exponential backoff:
//!
//! - 2xx: success
//! - 4xx other than 408/429: [`UpstreamError::Rejected`], one attempt only
//! - 408, 429, 5xx, connect failures, timeouts: retried
//!
//! A `Retry-After` hint replaces the computed delay. Each attempt is bounded
//! by the configured timeout; there is no overall deadline beyond the attempt
//! ceiling.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use metrics::counter;
use scangate_core::retry::RetryConfig;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::errors::{TransportError, UpstreamError};
use crate::types::{Operation, Payload, UpstreamRequest, UpstreamResponse};

/// One HTTP exchange with the scanning service.
#[async_trait]
pub trait UpstreamTransport: Send + Sync {
    /// Send a request and return whatever status came back.
    async fn send(&self, request: &UpstreamRequest) -> Result<UpstreamResponse, TransportError>;
}

/// Whether a status is worth another attempt.
pub fn is_retryable_status(status: u16) -> bool {
    status == 408 || status == 429 || (500..600).contains(&status)
}

/// Map a raw response to a value or a single-attempt error.
pub fn classify(response: UpstreamResponse) -> Result<Value, UpstreamError> {
    if (200..300).contains(&response.status) {
        return Ok(response.body);
    }
    let message = response.message();
    if is_retryable_status(response.status) {
        return Err(UpstreamError::Status {
            status: response.status,
            message,
            retry_after_ms: response.retry_after_ms,
        });
    }
    let body = match response.body {
        Value::Null | Value::String(_) => None,
        other => Some(other),
    };
    Err(UpstreamError::Rejected {
        status: response.status,
        message,
        body,
    })
}

/// Executes upstream operations with classification and retry.
#[derive(Clone)]
pub struct ResilientClient {
    transport: Arc<dyn UpstreamTransport>,
    retry: RetryConfig,
    attempt_timeout: Duration,
}

impl ResilientClient {
    /// Create a client over `transport`.
    pub fn new(
        transport: Arc<dyn UpstreamTransport>,
        retry: RetryConfig,
        attempt_timeout: Duration,
    ) -> Self {
        Self {
            transport,
            retry,
            attempt_timeout,
        }
    }

    /// Retry policy in effect.
    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    /// Run `operation` until it succeeds, is rejected, or attempts run out.
    #[instrument(skip(self, payload), fields(operation = operation.name()))]
    pub async fn call(&self, operation: Operation, payload: Payload) -> Result<Value, UpstreamError> {
        let request = UpstreamRequest { operation, payload };
        let max_attempts = self.retry.attempts();
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            counter!("upstream_requests_total", "operation" => operation.name()).increment(1);

            let err = match self.attempt(&request).await {
                Ok(value) => {
                    debug!(attempt, "upstream call succeeded");
                    return Ok(value);
                }
                Err(err) => err,
            };

            if !err.is_retryable() {
                debug!(attempt, error = %err, "upstream call not retryable");
                return Err(err);
            }
            if attempt >= max_attempts {
                warn!(attempts = attempt, error = %err, "upstream retries exhausted");
                return Err(UpstreamError::Exhausted {
                    attempts: attempt,
                    last: Box::new(err),
                });
            }

            let delay_ms = self.retry.delay_after(attempt, err.retry_after_ms());
            counter!(
                "upstream_retries_total",
                "operation" => operation.name(),
                "category" => err.category()
            )
            .increment(1);
            warn!(attempt, max_attempts, delay_ms, error = %err, "upstream call failed, retrying");
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        }
    }

    async fn attempt(&self, request: &UpstreamRequest) -> Result<Value, UpstreamError> {
        match tokio::time::timeout(self.attempt_timeout, self.transport.send(request)).await {
            Ok(Ok(response)) => classify(response),
            Ok(Err(err)) => Err(err.into()),
            Err(_) => {
                let ms = u64::try_from(self.attempt_timeout.as_millis()).unwrap_or(u64::MAX);
                Err(TransportError::Timeout(ms).into())
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
