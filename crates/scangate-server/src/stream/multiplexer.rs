//! Stream multiplexer: opens push streams and writes frames to them.
//!
//! Each session gets its own bounded channel. Writes never wait: a full
//! channel drops the frame, a closed one removes the session. The body
//! handed to the HTTP layer owns a drop guard on the connection's
//! cancellation token, so a client disconnect detaches the session without
//! any callback plumbing.

use std::convert::Infallible;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use futures::Stream;
use metrics::counter;
use pin_project_lite::pin_project;
use scangate_core::SessionId;
use scangate_rpc::{JsonRpcNotification, JsonRpcResponse};
use serde_json::json;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::DropGuard;
use tracing::{debug, info, instrument, warn};

use crate::session::{Delivery, SessionRegistry};
use crate::stream::frame::{Frame, FrameKind};
use crate::stream::heartbeat::{heartbeat_frame, run_heartbeat};

/// Reconnect delay suggested to clients in the `connect` frame.
pub const RECONNECT_RETRY_MS: u64 = 3000;

/// Legacy POST path advertised in the `endpoint` frame.
pub const LEGACY_ENDPOINT_PATH: &str = "/messages";

pin_project! {
    /// Body of one push stream. Dropping it fires the connection's
    /// cancellation token.
    pub struct EventStream {
        #[pin]
        frames: ReceiverStream<Bytes>,
        _guard: DropGuard,
    }
}

impl Stream for EventStream {
    type Item = Result<Bytes, Infallible>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.project().frames.poll_next(cx).map(|frame| frame.map(Ok))
    }
}

/// A freshly opened push stream.
pub struct OpenedStream {
    /// Session the stream is attached to (minted or reused).
    pub session_id: SessionId,
    /// Frames for the response body.
    pub body: EventStream,
}

/// Writes frames to session connections.
pub struct StreamMultiplexer {
    sessions: Arc<SessionRegistry>,
    heartbeat_interval: Duration,
    channel_capacity: usize,
}

impl StreamMultiplexer {
    /// Multiplexer over `sessions`.
    pub fn new(sessions: Arc<SessionRegistry>, heartbeat_interval: Duration, channel_capacity: usize) -> Self {
        Self {
            sessions,
            heartbeat_interval,
            channel_capacity: channel_capacity.max(2),
        }
    }

    /// The underlying session registry.
    pub fn sessions(&self) -> &Arc<SessionRegistry> {
        &self.sessions
    }

    /// Upgrade a request to a push stream.
    ///
    /// Reuses `candidate` when it is a known session, writes the `connect`
    /// and `endpoint` frames, and starts the heartbeat and disconnect
    /// watcher for the new connection.
    #[instrument(skip(self, last_event_id), fields(session_id))]
    pub fn open(&self, candidate: Option<&str>, last_event_id: Option<String>) -> OpenedStream {
        let (tx, rx) = mpsc::channel(self.channel_capacity);
        let handle = self.sessions.connect(candidate, last_event_id, tx);
        let session_id = handle.session_id.clone();
        let _ = tracing::Span::current().record("session_id", session_id.as_str());
        counter!("stream_connections_total").increment(1);

        let connect = Frame::event(
            FrameKind::Connect,
            json!({ "sessionId": session_id.as_str() }).to_string(),
        )
        .with_retry(RECONNECT_RETRY_MS);
        let endpoint = Frame::event(
            FrameKind::Endpoint,
            format!("{LEGACY_ENDPOINT_PATH}?sessionId={session_id}"),
        );
        let _ = self.send(&session_id, &connect);
        let _ = self.send(&session_id, &endpoint);

        let _heartbeat = tokio::spawn(run_heartbeat(
            self.sessions.clone(),
            session_id.clone(),
            self.heartbeat_interval,
            handle.cancel.clone(),
        ));

        let sessions = self.sessions.clone();
        let watched = handle.cancel.clone();
        let watched_session = session_id.clone();
        let connection_id = handle.connection_id;
        let _watcher = tokio::spawn(async move {
            watched.cancelled().await;
            if sessions.detach(&watched_session, connection_id) {
                info!(session_id = %watched_session, "push stream disconnected");
            }
        });

        info!("push stream opened");
        OpenedStream {
            session_id,
            body: EventStream {
                frames: ReceiverStream::new(rx),
                _guard: handle.cancel.drop_guard(),
            },
        }
    }

    /// Write one frame. `false` when the session is unknown, has no
    /// connection, its channel is full, or its reader is gone.
    pub fn send(&self, session: &SessionId, frame: &Frame) -> bool {
        match self.sessions.deliver(session, frame) {
            Delivery::Sent(_) => true,
            Delivery::Full => {
                counter!("stream_frames_dropped_total", "reason" => "full").increment(1);
                warn!(session_id = %session, "push channel full, frame dropped");
                false
            }
            Delivery::Closed => {
                counter!("stream_frames_dropped_total", "reason" => "closed").increment(1);
                debug!(session_id = %session, "push stream closed, session removed");
                false
            }
            Delivery::UnknownSession | Delivery::NoConnection => false,
        }
    }

    /// Deliver a response envelope as a `message` frame.
    pub fn send_response(&self, session: &SessionId, response: &JsonRpcResponse) -> bool {
        match Frame::json(FrameKind::Message, response) {
            Ok(frame) => {
                let sent = self.send(session, &frame);
                if sent {
                    counter!("stream_responses_total").increment(1);
                }
                sent
            }
            Err(e) => {
                warn!(session_id = %session, error = %e, "failed to serialize response");
                false
            }
        }
    }

    /// Deliver a server notification.
    pub fn notify(&self, session: &SessionId, notification: &JsonRpcNotification) -> bool {
        match Frame::json(FrameKind::Notification, notification) {
            Ok(frame) => self.send(session, &frame),
            Err(e) => {
                warn!(session_id = %session, error = %e, "failed to serialize notification");
                false
            }
        }
    }

    /// Send to every live session. Sessions that cannot take the frame are
    /// removed. Returns how many received it.
    pub fn broadcast(&self, frame: &Frame) -> usize {
        let mut delivered = 0;
        for session in self.sessions.live_ids() {
            if self.send(&session, frame) {
                delivered += 1;
            } else {
                let _ = self.sessions.remove(&session);
            }
        }
        delivered
    }

    /// Write a heartbeat comment.
    pub fn heartbeat(&self, session: &SessionId) -> bool {
        self.send(session, &heartbeat_frame())
    }

    /// Close every stream.
    pub fn close_all(&self) -> usize {
        self.sessions.close_all()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
