//! Method registry and async dispatch.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::FutureExt;
use metrics::{counter, histogram};
use serde_json::Value;
use tracing::{error, warn};

use crate::context::{CallContext, RpcContext};
use crate::errors::{INTERNAL_ERROR, RpcError};
use crate::types::{JsonRpcRequest, JsonRpcResponse};

/// Handler timeout when none is configured.
pub const DEFAULT_HANDLER_TIMEOUT: Duration = Duration::from_secs(120);

/// Trait implemented by every RPC method handler.
#[async_trait]
pub trait MethodHandler: Send + Sync {
    /// Execute the handler with the given params and context.
    async fn handle(
        &self,
        params: Option<Value>,
        ctx: &RpcContext,
        call: &CallContext,
    ) -> Result<Value, RpcError>;
}

/// A registered method.
#[derive(Clone)]
pub struct MethodEntry {
    /// The handler.
    pub handler: Arc<dyn MethodHandler>,
    /// Eligible for delivery over a push stream.
    pub streamable: bool,
}

/// Outcome of a method lookup.
pub enum Resolution<'a> {
    /// A handler exists.
    Found(&'a MethodEntry),
    /// Nothing is registered under this name.
    NotFound,
}

impl Resolution<'_> {
    /// True when found and flagged streamable.
    pub fn is_streamable(&self) -> bool {
        matches!(self, Self::Found(entry) if entry.streamable)
    }
}

/// Registry mapping method names to handlers.
pub struct MethodRegistry {
    entries: HashMap<String, MethodEntry>,
    handler_timeout: Duration,
}

impl MethodRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            handler_timeout: DEFAULT_HANDLER_TIMEOUT,
        }
    }

    /// Replace the handler timeout.
    #[must_use]
    pub fn with_handler_timeout(mut self, timeout: Duration) -> Self {
        self.handler_timeout = timeout;
        self
    }

    /// Register a handler answered in the HTTP body.
    pub fn register(&mut self, method: &str, handler: impl MethodHandler + 'static) {
        self.insert(method, Arc::new(handler), false);
    }

    /// Register a handler that may be delivered over a push stream.
    pub fn register_streamable(&mut self, method: &str, handler: impl MethodHandler + 'static) {
        self.insert(method, Arc::new(handler), true);
    }

    fn insert(&mut self, method: &str, handler: Arc<dyn MethodHandler>, streamable: bool) {
        let _ = self
            .entries
            .insert(method.to_owned(), MethodEntry { handler, streamable });
    }

    /// Look a method up.
    pub fn resolve(&self, method: &str) -> Resolution<'_> {
        self.entries
            .get(method)
            .map_or(Resolution::NotFound, Resolution::Found)
    }

    /// Dispatch a request to its handler. Always produces a response; the
    /// caller decides whether a notification's reply is discarded.
    pub async fn dispatch(
        &self,
        request: JsonRpcRequest,
        ctx: &RpcContext,
        call: &CallContext,
    ) -> JsonRpcResponse {
        let id = request.reply_id();
        let method = request.method;
        counter!("rpc_requests_total", "method" => method.clone()).increment(1);

        let entry = match self.resolve(&method) {
            Resolution::Found(entry) => entry,
            Resolution::NotFound => {
                counter!("rpc_errors_total", "method" => method.clone(), "error_type" => "method_not_found")
                    .increment(1);
                let err = RpcError::MethodNotFound { method };
                return JsonRpcResponse::error(id, err.to_error_object());
            }
        };

        let start = Instant::now();
        let run = AssertUnwindSafe(entry.handler.handle(request.params, ctx, call)).catch_unwind();
        let outcome = match tokio::time::timeout(self.handler_timeout, run).await {
            Ok(Ok(result)) => result.map_err(|err| {
                let kind = err.kind();
                (err, kind)
            }),
            Ok(Err(_panic)) => {
                error!(method, "RPC handler panicked");
                Err((internal_failure(&method, "panicked"), "panic"))
            }
            Err(_elapsed) => {
                error!(method, "RPC handler timed out after {:?}", self.handler_timeout);
                Err((internal_failure(&method, "timed out"), "timeout"))
            }
        };

        let response = match outcome {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err((err, error_type)) => {
                counter!("rpc_errors_total", "method" => method.clone(), "error_type" => error_type)
                    .increment(1);
                JsonRpcResponse::error(id, err.to_error_object())
            }
        };

        let duration = start.elapsed();
        histogram!("rpc_request_duration_seconds", "method" => method.clone())
            .record(duration.as_secs_f64());
        if duration.as_secs() >= 5 {
            warn!(method, duration_secs = duration.as_secs_f64(), "slow RPC request");
        }

        response
    }

    /// List all registered method names (sorted).
    pub fn methods(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.keys().cloned().collect();
        names.sort();
        names
    }

    /// Check whether a method is registered.
    pub fn has_method(&self, method: &str) -> bool {
        self.entries.contains_key(method)
    }
}

fn internal_failure(method: &str, what: &str) -> RpcError {
    RpcError::Custom {
        code: INTERNAL_ERROR,
        message: "Internal error".into(),
        data: Some(Value::String(format!("Handler for '{method}' {what}"))),
    }
}

impl Default for MethodRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
