//! Lifecycle and gateway handlers: initialize, ping, stats, clearCache.

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::{info, instrument};

use scangate_core::constants::{NAME, PROTOCOL_VERSION, VERSION};

use crate::context::{CallContext, RpcContext};
use crate::errors::RpcError;
use crate::registry::MethodHandler;

/// Protocol revisions this server will agree to.
pub const SUPPORTED_PROTOCOL_VERSIONS: &[&str] = &[PROTOCOL_VERSION, "2024-11-05"];

/// Negotiates the protocol revision and advertises capabilities.
pub struct InitializeHandler;

#[async_trait]
impl MethodHandler for InitializeHandler {
    #[instrument(skip(self, _ctx, params, call), fields(method = "initialize", session_id))]
    async fn handle(
        &self,
        params: Option<Value>,
        _ctx: &RpcContext,
        call: &CallContext,
    ) -> Result<Value, RpcError> {
        if let Some(session) = &call.session_id {
            let _ = tracing::Span::current().record("session_id", session.as_str());
        }
        let requested = params
            .as_ref()
            .and_then(|p| p.get("protocolVersion"))
            .and_then(Value::as_str);
        let version = requested
            .filter(|v| SUPPORTED_PROTOCOL_VERSIONS.contains(v))
            .unwrap_or(PROTOCOL_VERSION);
        let client = params
            .as_ref()
            .and_then(|p| p.pointer("/clientInfo/name"))
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        info!(client, protocol_version = version, "client initialized");

        Ok(json!({
            "protocolVersion": version,
            "capabilities": {
                "tools": { "listChanged": false },
                "logging": {}
            },
            "serverInfo": { "name": NAME, "version": VERSION },
            "instructions": "Use scan_content to check prompts and responses before acting on them."
        }))
    }
}

/// Client acknowledgement after `initialize`. Nothing to do.
pub struct InitializedHandler;

#[async_trait]
impl MethodHandler for InitializedHandler {
    async fn handle(
        &self,
        _params: Option<Value>,
        _ctx: &RpcContext,
        _call: &CallContext,
    ) -> Result<Value, RpcError> {
        Ok(json!({}))
    }
}

/// Liveness check. Answers `{}`.
pub struct PingHandler;

#[async_trait]
impl MethodHandler for PingHandler {
    #[instrument(skip_all, fields(method = "ping"))]
    async fn handle(
        &self,
        _params: Option<Value>,
        _ctx: &RpcContext,
        _call: &CallContext,
    ) -> Result<Value, RpcError> {
        Ok(json!({}))
    }
}

/// Cache, limiter, and session statistics.
pub struct StatsHandler;

#[async_trait]
impl MethodHandler for StatsHandler {
    #[instrument(skip_all, fields(method = "gateway/stats"))]
    async fn handle(
        &self,
        _params: Option<Value>,
        ctx: &RpcContext,
        _call: &CallContext,
    ) -> Result<Value, RpcError> {
        let stats = ctx.scans.stats();
        let sessions = ctx.sessions.as_ref().map(|s| {
            json!({
                "count": s.session_count(),
                "live": s.live_connection_count(),
            })
        });
        Ok(json!({
            "version": VERSION,
            "uptimeSecs": ctx.server_start_time.elapsed().as_secs(),
            "cache": stats.cache,
            "limiter": stats.limiter,
            "sessions": sessions,
        }))
    }
}

/// Empties the fingerprint cache.
pub struct ClearCacheHandler;

#[async_trait]
impl MethodHandler for ClearCacheHandler {
    #[instrument(skip_all, fields(method = "gateway/clearCache"))]
    async fn handle(
        &self,
        _params: Option<Value>,
        ctx: &RpcContext,
        _call: &CallContext,
    ) -> Result<Value, RpcError> {
        let cleared = ctx.scans.clear_cache();
        info!(cleared, "cache cleared");
        Ok(json!({ "cleared": cleared }))
    }
}
