//! Test fixtures shared with downstream crates (`test-helpers` feature).

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use scangate_core::retry::RetryConfig;
use scangate_settings::GatewaySettings;
use scangate_upstream::types::{UpstreamRequest, UpstreamResponse};
use scangate_upstream::{ScanService, TransportError, UpstreamTransport};
use serde_json::json;

use crate::context::RpcContext;

/// Replays queued responses, then answers 200 with an `allow` verdict.
#[derive(Default)]
pub struct StubTransport {
    queue: Mutex<VecDeque<UpstreamResponse>>,
    calls: Mutex<Vec<UpstreamRequest>>,
}

impl StubTransport {
    /// Queue a response for the next call.
    pub fn push(&self, response: UpstreamResponse) {
        self.queue.lock().push_back(response);
    }

    /// Calls seen so far.
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Most recent request.
    pub fn last_call(&self) -> Option<UpstreamRequest> {
        self.calls.lock().last().cloned()
    }
}

#[async_trait]
impl UpstreamTransport for StubTransport {
    async fn send(&self, request: &UpstreamRequest) -> Result<UpstreamResponse, TransportError> {
        self.calls.lock().push(request.clone());
        Ok(self.queue.lock().pop_front().unwrap_or_else(|| {
            UpstreamResponse::json(
                200,
                json!({"scan_id": "scan-1", "action": "allow", "category": "benign"}),
            )
        }))
    }
}

/// Default settings with millisecond retry delays and no jitter.
pub fn test_settings() -> GatewaySettings {
    let mut settings = GatewaySettings::default();
    settings.retry = RetryConfig {
        max_attempts: 2,
        base_delay_ms: 1,
        max_delay_ms: 2,
        jitter_factor: 0.0,
    };
    settings
}

/// Build an `RpcContext` over a [`StubTransport`].
pub fn make_test_context() -> (RpcContext, Arc<StubTransport>) {
    let transport = Arc::new(StubTransport::default());
    let service = ScanService::new(&test_settings(), transport.clone());
    (RpcContext::new(Arc::new(service)), transport)
}
