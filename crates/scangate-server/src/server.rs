//! `GatewayServer`: Axum HTTP server for JSON-RPC and push streams.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::body::{Body, Bytes};
use axum::extract::{DefaultBodyLimit, Query, State};
use axum::http::header::{ACCEPT, CACHE_CONTROL, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use scangate_core::SessionId;
use scangate_core::constants::{NAME, PROTOCOL_VERSION, VERSION};
use scangate_rpc::{MethodRegistry, RpcContext};
use scangate_settings::RequestOverlay;
use serde_json::json;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::ServerConfig;
use crate::dispatch::{CallerCapabilities, DispatchOutcome, Dispatcher};
use crate::errors::ServerError;
use crate::health::{self, HealthResponse};
use crate::session::{SessionRegistry, run_reaper};
use crate::shutdown::ShutdownCoordinator;
use crate::stream::StreamMultiplexer;

/// Session correlation header.
pub const SESSION_HEADER: &str = "mcp-session-id";
/// Reconnect hint header.
pub const LAST_EVENT_ID_HEADER: &str = "last-event-id";
/// Legacy query parameter carrying the session id.
pub const SESSION_QUERY_PARAM: &str = "sessionId";

const EVENT_STREAM: &str = "text/event-stream";

type QueryPairs = Vec<(String, String)>;

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Request dispatcher.
    pub dispatcher: Arc<Dispatcher>,
    /// Push-stream writer.
    pub multiplexer: Arc<StreamMultiplexer>,
    /// Session registry.
    pub sessions: Arc<SessionRegistry>,
    /// When the server started.
    pub start_time: Instant,
    /// Prometheus handle for `/metrics`.
    pub metrics: Option<PrometheusHandle>,
}

/// The gateway server.
pub struct GatewayServer {
    config: ServerConfig,
    registry: Arc<MethodRegistry>,
    sessions: Arc<SessionRegistry>,
    multiplexer: Arc<StreamMultiplexer>,
    dispatcher: Arc<Dispatcher>,
    shutdown: Arc<ShutdownCoordinator>,
    start_time: Instant,
    metrics: Option<PrometheusHandle>,
}

impl GatewayServer {
    /// Create a server. The registry takes the configured handler timeout
    /// and the context gains a view of the session registry.
    pub fn new(config: ServerConfig, registry: MethodRegistry, ctx: RpcContext) -> Self {
        let registry = Arc::new(registry.with_handler_timeout(config.handler_timeout));
        let sessions = Arc::new(SessionRegistry::new());
        let ctx = Arc::new(ctx.with_sessions(sessions.clone()));
        let multiplexer = Arc::new(StreamMultiplexer::new(
            sessions.clone(),
            config.heartbeat_interval,
            config.stream_channel_capacity,
        ));
        let dispatcher = Arc::new(Dispatcher::new(
            registry.clone(),
            ctx,
            multiplexer.clone(),
            config.streaming.clone(),
        ));
        Self {
            config,
            registry,
            sessions,
            multiplexer,
            dispatcher,
            shutdown: Arc::new(ShutdownCoordinator::new()),
            start_time: Instant::now(),
            metrics: None,
        }
    }

    /// Serve `/metrics` from this recorder handle.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            dispatcher: self.dispatcher.clone(),
            multiplexer: self.multiplexer.clone(),
            sessions: self.sessions.clone(),
            start_time: self.start_time,
            metrics: self.metrics.clone(),
        };

        Router::new()
            .route("/mcp", post(post_mcp).get(get_mcp).delete(delete_mcp))
            .route("/messages", post(post_messages))
            .route("/sse", get(get_sse))
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .layer(DefaultBodyLimit::max(self.config.max_body_bytes))
            .layer(CorsLayer::permissive())
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }

    /// Bind and start serving in the background.
    ///
    /// The returned task finishes once [`ShutdownCoordinator::shutdown`]
    /// has fired and open connections have drained. Push streams are
    /// closed as soon as shutdown begins.
    pub async fn listen(&self) -> Result<(SocketAddr, JoinHandle<()>), ServerError> {
        let addr = self.config.socket_addr()?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        let local_addr = listener.local_addr()?;

        let token = self.shutdown.token();
        let reaper = self.config.session_idle_timeout.map(|max_idle| {
            tokio::spawn(run_reaper(self.sessions.clone(), max_idle, token.clone()))
        });

        let router = self.router();
        let sessions = self.sessions.clone();
        let signal = async move {
            token.cancelled().await;
            let closed = sessions.close_all();
            info!(closed, "shutdown requested, push streams closed");
        };

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router)
                .with_graceful_shutdown(signal)
                .await
            {
                error!(error = %e, "server error");
            }
            if let Some(reaper) = reaper {
                let _ = reaper.await;
            }
            info!("server stopped");
        });

        info!(addr = %local_addr, "gateway listening");
        Ok((local_addr, handle))
    }

    /// Get the shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Get the session registry.
    pub fn sessions(&self) -> &Arc<SessionRegistry> {
        &self.sessions
    }

    /// Get the stream multiplexer.
    pub fn multiplexer(&self) -> &Arc<StreamMultiplexer> {
        &self.multiplexer
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Get the method registry.
    pub fn registry(&self) -> &Arc<MethodRegistry> {
        &self.registry
    }
}

// ── request helpers ──

fn accepts_event_stream(headers: &HeaderMap) -> bool {
    headers
        .get_all(ACCEPT)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .any(|v| v.to_ascii_lowercase().contains(EVENT_STREAM))
}

/// Session id from the header, else the legacy query parameter.
fn session_candidate<'a>(headers: &'a HeaderMap, query: &'a QueryPairs) -> Option<&'a str> {
    headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .or_else(|| {
            query
                .iter()
                .rev()
                .find(|(k, _)| k == SESSION_QUERY_PARAM)
                .map(|(_, v)| v.as_str())
        })
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn overlay_from(query: &QueryPairs) -> RequestOverlay {
    RequestOverlay::from_pairs(query.iter().map(|(k, v)| (k.as_str(), v.as_str())))
}

fn set_session_header(response: &mut Response, session: &SessionId) {
    if let Ok(value) = HeaderValue::from_str(session.as_str()) {
        let _ = response.headers_mut().insert(SESSION_HEADER, value);
    }
}

// ── handlers ──

/// POST /mcp
async fn post_mcp(
    State(state): State<AppState>,
    Query(query): Query<QueryPairs>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let accepts_stream = accepts_event_stream(&headers);
    handle_post(&state, &query, &headers, &body, accepts_stream).await
}

/// POST /messages (legacy; the caller always holds the stream)
async fn post_messages(
    State(state): State<AppState>,
    Query(query): Query<QueryPairs>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    handle_post(&state, &query, &headers, &body, true).await
}

async fn handle_post(
    state: &AppState,
    query: &QueryPairs,
    headers: &HeaderMap,
    body: &[u8],
    accepts_stream: bool,
) -> Response {
    // Sessions are minted by stream upgrades only; POST just resolves them.
    let session_id = state.sessions.lookup(session_candidate(headers, query));
    let caller = CallerCapabilities {
        accepts_stream,
        session_id: session_id.clone(),
    };

    let mut response = match state.dispatcher.dispatch_bytes(body, &caller, overlay_from(query)).await {
        DispatchOutcome::Reply(reply) => (StatusCode::OK, Json(reply)).into_response(),
        DispatchOutcome::Streamed { .. } | DispatchOutcome::NoReply => StatusCode::ACCEPTED.into_response(),
    };
    if let Some(session) = &session_id {
        set_session_header(&mut response, session);
    }
    response
}

/// GET /mcp: push stream when asked for, metadata otherwise.
async fn get_mcp(State(state): State<AppState>, Query(query): Query<QueryPairs>, headers: HeaderMap) -> Response {
    if accepts_event_stream(&headers) {
        return open_stream(&state, &headers, &query);
    }
    let session = session_candidate(&headers, &query)
        .and_then(|candidate| state.sessions.info(&SessionId::from(candidate)));
    Json(json!({
        "name": NAME,
        "version": VERSION,
        "protocolVersion": PROTOCOL_VERSION,
        "endpoints": {
            "rpc": "/mcp",
            "stream": "/mcp",
            "legacyStream": "/sse",
            "legacyMessages": "/messages",
        },
        "sessions": state.sessions.len(),
        "liveStreams": state.sessions.live_ids().len(),
        "session": session,
    }))
    .into_response()
}

/// GET /sse (legacy; always upgrades)
async fn get_sse(State(state): State<AppState>, Query(query): Query<QueryPairs>, headers: HeaderMap) -> Response {
    open_stream(&state, &headers, &query)
}

fn open_stream(state: &AppState, headers: &HeaderMap, query: &QueryPairs) -> Response {
    let last_event_id = headers
        .get(LAST_EVENT_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(ToOwned::to_owned);
    let opened = state.multiplexer.open(session_candidate(headers, query), last_event_id);

    let mut response = Response::new(Body::from_stream(opened.body));
    let response_headers = response.headers_mut();
    let _ = response_headers.insert(CONTENT_TYPE, HeaderValue::from_static(EVENT_STREAM));
    let _ = response_headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    let _ = response_headers.insert("x-accel-buffering", HeaderValue::from_static("no"));
    set_session_header(&mut response, &opened.session_id);
    response
}

/// DELETE /mcp
async fn delete_mcp(State(state): State<AppState>, Query(query): Query<QueryPairs>, headers: HeaderMap) -> Response {
    let Some(candidate) = session_candidate(&headers, &query) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "missing Mcp-Session-Id" })),
        )
            .into_response();
    };
    let removed = state.sessions.remove(&SessionId::from(candidate));
    Json(json!({ "sessionId": candidate, "removed": removed })).into_response()
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let live = state.sessions.live_ids().len();
    Json(health::health_check(state.start_time, state.sessions.len(), live))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => (
            [(CONTENT_TYPE, "text/plain; version=0.0.4")],
            crate::metrics::render(handle),
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response(),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
