//! RPC dependency-injection context.

use std::sync::Arc;
use std::time::Instant;

use scangate_core::SessionId;
use scangate_settings::RequestOverlay;
use scangate_upstream::ScanService;

/// Read-only view of the transport's session table, for `gateway/stats`.
pub trait SessionDirectory: Send + Sync {
    /// Number of known sessions.
    fn session_count(&self) -> usize;
    /// Number of sessions with a live push connection.
    fn live_connection_count(&self) -> usize;
}

/// Shared context passed to every RPC handler.
pub struct RpcContext {
    /// Cache, limiter, and retrying client for the scanning service.
    pub scans: Arc<ScanService>,
    /// Session table (None when the transport has no push streams).
    pub sessions: Option<Arc<dyn SessionDirectory>>,
    /// When the server started (for uptime calculation).
    pub server_start_time: Instant,
}

impl RpcContext {
    /// Context without a session table.
    pub fn new(scans: Arc<ScanService>) -> Self {
        Self {
            scans,
            sessions: None,
            server_start_time: Instant::now(),
        }
    }

    /// Attach the session table.
    #[must_use]
    pub fn with_sessions(mut self, sessions: Arc<dyn SessionDirectory>) -> Self {
        self.sessions = Some(sessions);
        self
    }
}

/// Per-call data: who is calling and which overrides apply.
#[derive(Clone, Debug, Default)]
pub struct CallContext {
    /// Query-string overrides for this request.
    pub overlay: RequestOverlay,
    /// Caller's session, if it sent one.
    pub session_id: Option<SessionId>,
}

impl CallContext {
    /// Call context with an overlay and no session.
    pub fn with_overlay(overlay: RequestOverlay) -> Self {
        Self {
            overlay,
            session_id: None,
        }
    }
}
