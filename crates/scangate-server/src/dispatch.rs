//! Request dispatch: envelope validation, handler run, delivery choice.

use std::sync::Arc;

use scangate_core::SessionId;
use scangate_rpc::{
    CallContext, JsonRpcRequest, JsonRpcResponse, MethodRegistry, RpcContext, parse_envelope,
    validate_envelope,
};
use scangate_settings::{RequestOverlay, StreamingSettings};
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::stream::StreamMultiplexer;

/// What the caller can receive.
#[derive(Clone, Debug, Default)]
pub struct CallerCapabilities {
    /// The caller can take a reply over its push stream.
    pub accepts_stream: bool,
    /// The caller's session, if it named a known one.
    pub session_id: Option<SessionId>,
}

/// How a request was answered.
#[derive(Debug)]
pub enum DispatchOutcome {
    /// Answer in the HTTP body.
    Reply(JsonRpcResponse),
    /// Answer written to the session's push stream.
    Streamed {
        /// Session that received the `message` frame.
        session_id: SessionId,
    },
    /// Notification: nothing to send.
    NoReply,
}

/// Runs requests against the method registry and delivers the result.
pub struct Dispatcher {
    registry: Arc<MethodRegistry>,
    ctx: Arc<RpcContext>,
    multiplexer: Arc<StreamMultiplexer>,
    streaming: StreamingSettings,
}

impl Dispatcher {
    /// Create a dispatcher.
    pub fn new(
        registry: Arc<MethodRegistry>,
        ctx: Arc<RpcContext>,
        multiplexer: Arc<StreamMultiplexer>,
        streaming: StreamingSettings,
    ) -> Self {
        Self {
            registry,
            ctx,
            multiplexer,
            streaming,
        }
    }

    /// The method registry.
    pub fn registry(&self) -> &Arc<MethodRegistry> {
        &self.registry
    }

    /// Dispatch a raw request body.
    pub async fn dispatch_bytes(
        &self,
        body: &[u8],
        caller: &CallerCapabilities,
        overlay: RequestOverlay,
    ) -> DispatchOutcome {
        match parse_envelope(body) {
            Ok(request) => self.dispatch_request(request, caller, overlay).await,
            Err(rejected) => {
                warn!(code = rejected.error.code(), "rejected request envelope");
                DispatchOutcome::Reply(rejected.into_response())
            }
        }
    }

    /// Dispatch an already-decoded request value.
    pub async fn dispatch_value(
        &self,
        value: Value,
        caller: &CallerCapabilities,
        overlay: RequestOverlay,
    ) -> DispatchOutcome {
        match validate_envelope(value) {
            Ok(request) => self.dispatch_request(request, caller, overlay).await,
            Err(rejected) => {
                warn!(code = rejected.error.code(), "rejected request envelope");
                DispatchOutcome::Reply(rejected.into_response())
            }
        }
    }

    #[instrument(skip_all, fields(method = %request.method, session_id))]
    async fn dispatch_request(
        &self,
        request: JsonRpcRequest,
        caller: &CallerCapabilities,
        overlay: RequestOverlay,
    ) -> DispatchOutcome {
        if let Some(session) = &caller.session_id {
            let _ = tracing::Span::current().record("session_id", session.as_str());
            let _ = self.multiplexer.sessions().touch(session);
        }

        let notification = request.is_notification();
        let elected = if notification {
            None
        } else {
            self.elect(&request.method, caller)
        };

        let call = CallContext {
            overlay,
            session_id: caller.session_id.clone(),
        };
        let response = self.registry.dispatch(request, &self.ctx, &call).await;

        if notification {
            if response.is_error() {
                debug!("notification failed, no reply written");
            }
            return DispatchOutcome::NoReply;
        }

        if let Some(session) = elected {
            if self.multiplexer.send_response(&session, &response) {
                return DispatchOutcome::Streamed { session_id: session };
            }
            debug!("push delivery failed, replying in body");
        }
        DispatchOutcome::Reply(response)
    }

    /// Session to stream the reply to, if every election condition holds.
    fn elect(&self, method: &str, caller: &CallerCapabilities) -> Option<SessionId> {
        if !caller.accepts_stream
            || !self.streaming.is_elected(method)
            || !self.registry.resolve(method).is_streamable()
        {
            return None;
        }
        caller
            .session_id
            .as_ref()
            .filter(|session| self.multiplexer.sessions().has_live_connection(session))
            .cloned()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use futures::StreamExt;
    use scangate_rpc::JsonRpcId;
    use scangate_rpc::errors::{INTERNAL_ERROR, INVALID_REQUEST, PARSE_ERROR};
    use serde_json::json;

    use crate::session::SessionRegistry;
    use scangate_rpc::testing::{StubTransport, make_test_context};

    fn dispatcher(elected: &[&str]) -> (Dispatcher, Arc<StreamMultiplexer>, Arc<StubTransport>) {
        let (ctx, transport) = make_test_context();
        let mut registry = MethodRegistry::new();
        scangate_rpc::register_all(&mut registry);
        let mux = Arc::new(StreamMultiplexer::new(
            Arc::new(SessionRegistry::new()),
            Duration::from_secs(30),
            16,
        ));
        let streaming = StreamingSettings {
            elected_methods: elected.iter().map(|m| (*m).to_string()).collect(),
        };
        let d = Dispatcher::new(Arc::new(registry), Arc::new(ctx), mux.clone(), streaming);
        (d, mux, transport)
    }

    fn reply(outcome: DispatchOutcome) -> JsonRpcResponse {
        match outcome {
            DispatchOutcome::Reply(response) => response,
            other => panic!("expected reply, got {other:?}"),
        }
    }

    fn scan_call(id: i64) -> Value {
        json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": "tools/call",
            "params": {"name": "scan_content", "arguments": {"prompt": "hello"}}
        })
    }

    // ── envelope ──

    #[tokio::test]
    async fn garbage_body_is_parse_error() {
        let (d, _, _) = dispatcher(&[]);
        let resp = reply(d.dispatch_bytes(b"{nope", &CallerCapabilities::default(), RequestOverlay::default()).await);
        assert_eq!(resp.error.as_ref().unwrap().code, PARSE_ERROR);
        assert_eq!(resp.id, JsonRpcId::Null);
    }

    #[tokio::test]
    async fn missing_method_is_invalid_request() {
        let (d, _, _) = dispatcher(&[]);
        let body = json!({"jsonrpc": "2.0", "id": 4});
        let resp = reply(d.dispatch_value(body, &CallerCapabilities::default(), RequestOverlay::default()).await);
        assert_eq!(resp.error.as_ref().unwrap().code, INVALID_REQUEST);
        assert_eq!(resp.id, JsonRpcId::Number(4));
    }

    #[tokio::test]
    async fn ping_replies_in_body() {
        let (d, _, _) = dispatcher(&[]);
        let body = br#"{"jsonrpc":"2.0","id":"p","method":"ping"}"#;
        let resp = reply(d.dispatch_bytes(body, &CallerCapabilities::default(), RequestOverlay::default()).await);
        assert_eq!(resp.result, Some(json!({})));
        assert_eq!(resp.id, JsonRpcId::String("p".into()));
    }

    #[tokio::test]
    async fn unknown_method_reports_name() {
        let (d, _, _) = dispatcher(&[]);
        let body = json!({"jsonrpc": "2.0", "id": 1, "method": "nope/nothing"});
        let resp = reply(d.dispatch_value(body, &CallerCapabilities::default(), RequestOverlay::default()).await);
        let err = resp.error.unwrap();
        assert_eq!(err.code, INTERNAL_ERROR);
        assert_eq!(err.data, Some(json!("Method not found: nope/nothing")));
    }

    #[tokio::test]
    async fn notification_gets_no_reply() {
        let (d, _, _) = dispatcher(&[]);
        let ok = json!({"jsonrpc": "2.0", "method": "notifications/initialized"});
        assert!(matches!(
            d.dispatch_value(ok, &CallerCapabilities::default(), RequestOverlay::default()).await,
            DispatchOutcome::NoReply
        ));
        let failing = json!({"jsonrpc": "2.0", "method": "missing", "id": null});
        assert!(matches!(
            d.dispatch_value(failing, &CallerCapabilities::default(), RequestOverlay::default()).await,
            DispatchOutcome::NoReply
        ));
    }

    // ── streaming election ──

    #[tokio::test]
    async fn elected_call_streams_to_live_session() {
        let (d, mux, _) = dispatcher(&["tools/call"]);
        let mut opened = mux.open(None, None);
        let _ = opened.body.next().await;
        let _ = opened.body.next().await;

        let caller = CallerCapabilities {
            accepts_stream: true,
            session_id: Some(opened.session_id.clone()),
        };
        let outcome = d.dispatch_value(scan_call(9), &caller, RequestOverlay::default()).await;
        assert!(matches!(outcome, DispatchOutcome::Streamed { ref session_id } if *session_id == opened.session_id));

        let frame = opened.body.next().await.unwrap().unwrap();
        let text = String::from_utf8(frame.to_vec()).unwrap();
        assert!(text.contains("event: message"));
        assert!(text.contains(r#""id":9"#));
    }

    #[tokio::test]
    async fn not_elected_by_settings_replies_in_body() {
        let (d, mux, _) = dispatcher(&[]);
        let opened = mux.open(None, None);
        let caller = CallerCapabilities {
            accepts_stream: true,
            session_id: Some(opened.session_id.clone()),
        };
        let resp = reply(d.dispatch_value(scan_call(1), &caller, RequestOverlay::default()).await);
        assert!(resp.result.is_some());
    }

    #[tokio::test]
    async fn non_streamable_method_replies_in_body() {
        let (d, mux, _) = dispatcher(&["ping"]);
        let opened = mux.open(None, None);
        let caller = CallerCapabilities {
            accepts_stream: true,
            session_id: Some(opened.session_id.clone()),
        };
        let body = json!({"jsonrpc": "2.0", "id": 1, "method": "ping"});
        let _ = reply(d.dispatch_value(body, &caller, RequestOverlay::default()).await);
    }

    #[tokio::test]
    async fn caller_without_stream_support_replies_in_body() {
        let (d, mux, _) = dispatcher(&["tools/call"]);
        let opened = mux.open(None, None);
        let caller = CallerCapabilities {
            accepts_stream: false,
            session_id: Some(opened.session_id.clone()),
        };
        let _ = reply(d.dispatch_value(scan_call(1), &caller, RequestOverlay::default()).await);
    }

    #[tokio::test]
    async fn closed_stream_falls_back_to_body() {
        let (d, mux, _) = dispatcher(&["tools/call"]);
        let session = mux.sessions().get_or_create(None);
        let caller = CallerCapabilities {
            accepts_stream: true,
            session_id: Some(session),
        };
        let resp = reply(d.dispatch_value(scan_call(2), &caller, RequestOverlay::default()).await);
        assert_eq!(resp.id, JsonRpcId::Number(2));
    }

    #[tokio::test]
    async fn full_stream_falls_back_to_body() {
        let (d, mux, _) = dispatcher(&["tools/call"]);
        // connect + endpoint frames fill a capacity-2 channel.
        let small = StreamMultiplexer::new(mux.sessions().clone(), Duration::from_secs(30), 2);
        let opened = small.open(None, None);
        let caller = CallerCapabilities {
            accepts_stream: true,
            session_id: Some(opened.session_id.clone()),
        };
        let resp = reply(d.dispatch_value(scan_call(3), &caller, RequestOverlay::default()).await);
        assert!(resp.result.is_some());
        assert!(mux.sessions().contains(&opened.session_id));
    }

    // ── overlay ──

    #[tokio::test]
    async fn overlay_disables_cache_for_one_request() {
        let (d, _, transport) = dispatcher(&[]);
        let caller = CallerCapabilities::default();
        let _ = reply(d.dispatch_value(scan_call(1), &caller, RequestOverlay::default()).await);
        let _ = reply(d.dispatch_value(scan_call(2), &caller, RequestOverlay::default()).await);
        assert_eq!(transport.call_count(), 1);

        let no_cache = RequestOverlay {
            cache: Some(false),
            ..RequestOverlay::default()
        };
        let _ = reply(d.dispatch_value(scan_call(3), &caller, no_cache).await);
        assert_eq!(transport.call_count(), 2);
    }

    #[tokio::test]
    async fn request_touches_session() {
        let (d, mux, _) = dispatcher(&[]);
        let session = mux.sessions().get_or_create(None);
        let caller = CallerCapabilities {
            accepts_stream: false,
            session_id: Some(session.clone()),
        };
        let body = json!({"jsonrpc": "2.0", "id": 1, "method": "ping"});
        let _ = reply(d.dispatch_value(body, &caller, RequestOverlay::default()).await);
        assert!(mux.sessions().info(&session).is_some());
    }
}
