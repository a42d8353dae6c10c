//! Server-sent event frames.
//!
//! ```text
//! : comment
//! id: 7
//! event: message
//! retry: 3000
//! data: {"jsonrpc":"2.0",...}
//!
//! ```
//!
//! Every field is optional; a payload spanning several lines becomes one
//! `data:` line per payload line. A blank line ends the frame.

use std::fmt::Write as _;

use bytes::Bytes;
use serde::Serialize;

/// Event types written on a push stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameKind {
    /// First frame: the session id.
    Connect,
    /// Legacy frame: the POST path carrying `sessionId`.
    Endpoint,
    /// A JSON-RPC response envelope.
    Message,
    /// A server notification (method + params, no id).
    Notification,
}

impl FrameKind {
    /// `event:` field value.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Endpoint => "endpoint",
            Self::Message => "message",
            Self::Notification => "notification",
        }
    }
}

/// One push-stream frame, before a sequence id is assigned.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Frame {
    comment: Option<String>,
    event: Option<FrameKind>,
    retry_ms: Option<u64>,
    data: Option<String>,
}

impl Frame {
    /// Comment-only frame (heartbeats).
    pub fn comment(text: impl Into<String>) -> Self {
        Self {
            comment: Some(text.into()),
            ..Self::default()
        }
    }

    /// Typed frame with a text payload.
    pub fn event(kind: FrameKind, data: impl Into<String>) -> Self {
        Self {
            event: Some(kind),
            data: Some(data.into()),
            ..Self::default()
        }
    }

    /// Typed frame with a JSON payload.
    pub fn json<T: Serialize>(kind: FrameKind, payload: &T) -> Result<Self, serde_json::Error> {
        Ok(Self::event(kind, serde_json::to_string(payload)?))
    }

    /// Ask the client to wait `ms` before reconnecting.
    #[must_use]
    pub fn with_retry(mut self, ms: u64) -> Self {
        self.retry_ms = Some(ms);
        self
    }

    /// Event type, if any.
    pub fn kind(&self) -> Option<FrameKind> {
        self.event
    }

    /// Whether this frame carries data and so takes a sequence id.
    pub fn is_sequenced(&self) -> bool {
        self.data.is_some()
    }

    /// Serialize the frame. `id` is written only for frames with data.
    pub fn encode(&self, id: Option<u64>) -> Bytes {
        let mut out = String::new();
        if let Some(comment) = &self.comment {
            for line in split_lines(comment) {
                let _ = writeln!(out, ": {line}");
            }
        }
        if let (Some(id), true) = (id, self.is_sequenced()) {
            let _ = writeln!(out, "id: {id}");
        }
        if let Some(kind) = self.event {
            let _ = writeln!(out, "event: {}", kind.as_str());
        }
        if let Some(ms) = self.retry_ms {
            let _ = writeln!(out, "retry: {ms}");
        }
        if let Some(data) = &self.data {
            for line in split_lines(data) {
                let _ = writeln!(out, "data: {line}");
            }
        }
        out.push('\n');
        Bytes::from(out)
    }
}

fn split_lines(text: &str) -> impl Iterator<Item = &str> {
    text.split('\n').map(|line| line.strip_suffix('\r').unwrap_or(line))
}
