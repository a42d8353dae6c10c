//! Session registry: logical client sessions and their live push connections.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use scangate_core::SessionId;
use scangate_rpc::SessionDirectory;
use serde::Serialize;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::stream::frame::Frame;

/// The write side of one push stream.
struct Connection {
    id: u64,
    tx: mpsc::Sender<Bytes>,
    cancel: CancellationToken,
}

impl Connection {
    fn is_live(&self) -> bool {
        !self.tx.is_closed() && !self.cancel.is_cancelled()
    }
}

struct SessionEntry {
    created_at: Instant,
    last_activity: Instant,
    connection: Option<Connection>,
    last_sequence: u64,
    last_event_id: Option<String>,
}

impl SessionEntry {
    fn new(now: Instant) -> Self {
        Self {
            created_at: now,
            last_activity: now,
            connection: None,
            last_sequence: 0,
            last_event_id: None,
        }
    }

    fn close(self) {
        if let Some(conn) = self.connection {
            conn.cancel.cancel();
        }
    }
}

/// Identifies the connection installed by [`SessionRegistry::connect`].
#[derive(Clone, Debug)]
pub struct ConnectionHandle {
    /// Session the connection belongs to.
    pub session_id: SessionId,
    /// Registry-unique connection number.
    pub connection_id: u64,
    /// Fired when the connection is replaced, removed, or its body dropped.
    pub cancel: CancellationToken,
}

/// Result of writing one frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Delivery {
    /// Written; carries the sequence id when the frame took one.
    Sent(Option<u64>),
    /// No such session.
    UnknownSession,
    /// The session has no push connection.
    NoConnection,
    /// The reader went away; the session was removed.
    Closed,
    /// The channel is full; the frame was dropped.
    Full,
}

impl Delivery {
    /// True for [`Delivery::Sent`].
    pub fn is_sent(self) -> bool {
        matches!(self, Self::Sent(_))
    }
}

/// Snapshot of one session.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    /// Session id.
    pub session_id: SessionId,
    /// Milliseconds since creation.
    pub age_ms: u64,
    /// Milliseconds since the last request or delivered frame.
    pub idle_ms: u64,
    /// Whether a push connection is attached.
    pub live: bool,
    /// Sequence id of the last delivered frame.
    pub last_sequence: u64,
    /// Last `Last-Event-Id` the client reported.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_event_id: Option<String>,
}

/// Tracks sessions and owns their connections.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<SessionId, SessionEntry>>,
    next_connection: AtomicU64,
}

impl SessionRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reuse `candidate` when it names a known session, otherwise mint a
    /// fresh one. Unknown candidates are replaced, never adopted.
    pub fn get_or_create(&self, candidate: Option<&str>) -> SessionId {
        let now = Instant::now();
        let mut sessions = self.sessions.lock();
        Self::resolve(&mut sessions, candidate, now)
    }

    /// Resolve `candidate` to a known session and record activity on it.
    /// Unknown or blank candidates yield `None`; nothing is inserted.
    pub fn lookup(&self, candidate: Option<&str>) -> Option<SessionId> {
        let candidate = candidate.map(str::trim).filter(|c| !c.is_empty())?;
        let id = SessionId::from(candidate);
        let mut sessions = self.sessions.lock();
        let entry = sessions.get_mut(&id)?;
        entry.last_activity = Instant::now();
        Some(id)
    }

    fn resolve(
        sessions: &mut HashMap<SessionId, SessionEntry>,
        candidate: Option<&str>,
        now: Instant,
    ) -> SessionId {
        if let Some(candidate) = candidate.map(str::trim).filter(|c| !c.is_empty()) {
            let id = SessionId::from(candidate);
            if let Some(entry) = sessions.get_mut(&id) {
                entry.last_activity = now;
                return id;
            }
            debug!(candidate, "unknown session id, minting a new one");
        }
        let id = SessionId::new();
        let _ = sessions.insert(id.clone(), SessionEntry::new(now));
        debug!(session_id = %id, "session created");
        id
    }

    /// Attach a push connection writing into `tx`. A previous connection on
    /// the same session is cancelled and replaced.
    pub fn connect(
        &self,
        candidate: Option<&str>,
        last_event_id: Option<String>,
        tx: mpsc::Sender<Bytes>,
    ) -> ConnectionHandle {
        let now = Instant::now();
        let connection_id = self.next_connection.fetch_add(1, Ordering::Relaxed) + 1;
        let cancel = CancellationToken::new();

        let mut sessions = self.sessions.lock();
        let session_id = Self::resolve(&mut sessions, candidate, now);
        let entry = sessions
            .entry(session_id.clone())
            .or_insert_with(|| SessionEntry::new(now));

        let previous = entry.connection.replace(Connection {
            id: connection_id,
            tx,
            cancel: cancel.clone(),
        });
        if let Some(previous) = previous {
            previous.cancel.cancel();
            debug!(session_id = %session_id, replaced = previous.id, "push connection replaced");
        }
        if let Some(event_id) = &last_event_id {
            info!(session_id = %session_id, last_event_id = %event_id, "client resumed with Last-Event-Id");
        }
        entry.last_event_id = last_event_id;
        entry.last_activity = now;

        ConnectionHandle {
            session_id,
            connection_id,
            cancel,
        }
    }

    /// Remove `session` if `connection_id` is still its connection.
    /// Returns whether anything was removed.
    pub fn detach(&self, session: &SessionId, connection_id: u64) -> bool {
        let mut sessions = self.sessions.lock();
        let current = sessions
            .get(session)
            .and_then(|e| e.connection.as_ref())
            .map(|c| c.id);
        if current != Some(connection_id) {
            return false;
        }
        if let Some(entry) = sessions.remove(session) {
            entry.close();
        }
        debug!(session_id = %session, connection_id, "session detached");
        true
    }

    /// Tear a session down. Returns whether it existed.
    pub fn remove(&self, session: &SessionId) -> bool {
        let removed = self.sessions.lock().remove(session);
        match removed {
            Some(entry) => {
                entry.close();
                info!(session_id = %session, "session removed");
                true
            }
            None => false,
        }
    }

    /// Close and forget every session. Returns how many there were.
    pub fn close_all(&self) -> usize {
        let drained: Vec<SessionEntry> = self.sessions.lock().drain().map(|(_, e)| e).collect();
        let count = drained.len();
        drained.into_iter().for_each(SessionEntry::close);
        count
    }

    /// Drop sessions with no live connection idle for longer than `max_idle`.
    pub fn reap_idle(&self, max_idle: Duration) -> usize {
        let now = Instant::now();
        let mut sessions = self.sessions.lock();
        let before = sessions.len();
        sessions.retain(|_, entry| {
            entry.connection.as_ref().is_some_and(Connection::is_live)
                || now.duration_since(entry.last_activity) <= max_idle
        });
        before - sessions.len()
    }

    /// Record activity on a known session.
    pub fn touch(&self, session: &SessionId) -> bool {
        self.sessions
            .lock()
            .get_mut(session)
            .map(|entry| entry.last_activity = Instant::now())
            .is_some()
    }

    /// Write a frame to the session's connection without waiting.
    pub fn deliver(&self, session: &SessionId, frame: &Frame) -> Delivery {
        let mut sessions = self.sessions.lock();
        let Some(entry) = sessions.get_mut(session) else {
            return Delivery::UnknownSession;
        };
        let Some(conn) = entry.connection.as_ref() else {
            return Delivery::NoConnection;
        };

        let sequence = frame.is_sequenced().then_some(entry.last_sequence + 1);
        match conn.tx.try_send(frame.encode(sequence)) {
            Ok(()) => {
                if let Some(sequence) = sequence {
                    entry.last_sequence = sequence;
                }
                entry.last_activity = Instant::now();
                Delivery::Sent(sequence)
            }
            Err(TrySendError::Full(_)) => Delivery::Full,
            Err(TrySendError::Closed(_)) => {
                if let Some(entry) = sessions.remove(session) {
                    entry.close();
                }
                Delivery::Closed
            }
        }
    }

    /// Whether the session exists.
    pub fn contains(&self, session: &SessionId) -> bool {
        self.sessions.lock().contains_key(session)
    }

    /// Whether the session has a connection that can still be written.
    pub fn has_live_connection(&self, session: &SessionId) -> bool {
        self.sessions
            .lock()
            .get(session)
            .and_then(|e| e.connection.as_ref())
            .is_some_and(Connection::is_live)
    }

    /// Snapshot of one session.
    pub fn info(&self, session: &SessionId) -> Option<SessionInfo> {
        let now = Instant::now();
        let sessions = self.sessions.lock();
        let entry = sessions.get(session)?;
        Some(SessionInfo {
            session_id: session.clone(),
            age_ms: millis(now.duration_since(entry.created_at)),
            idle_ms: millis(now.duration_since(entry.last_activity)),
            live: entry.connection.as_ref().is_some_and(Connection::is_live),
            last_sequence: entry.last_sequence,
            last_event_id: entry.last_event_id.clone(),
        })
    }

    /// Number of sessions.
    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    /// True when there are no sessions.
    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }

    /// Session ids, sorted.
    pub fn ids(&self) -> Vec<SessionId> {
        let mut ids: Vec<SessionId> = self.sessions.lock().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Ids of sessions with a live connection, sorted.
    pub fn live_ids(&self) -> Vec<SessionId> {
        let mut ids: Vec<SessionId> = self
            .sessions
            .lock()
            .iter()
            .filter(|(_, e)| e.connection.as_ref().is_some_and(Connection::is_live))
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }
}

impl SessionDirectory for SessionRegistry {
    fn session_count(&self) -> usize {
        self.len()
    }

    fn live_connection_count(&self) -> usize {
        self.live_ids().len()
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::frame::FrameKind;

    fn channel(capacity: usize) -> (mpsc::Sender<Bytes>, mpsc::Receiver<Bytes>) {
        mpsc::channel(capacity)
    }

    fn message(text: &str) -> Frame {
        Frame::event(FrameKind::Message, text)
    }

    // ── get_or_create ──

    #[test]
    fn get_or_create_is_idempotent_for_known_ids() {
        let reg = SessionRegistry::new();
        let id = reg.get_or_create(None);
        assert_eq!(reg.get_or_create(Some(id.as_str())), id);
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn unknown_candidate_is_replaced() {
        let reg = SessionRegistry::new();
        let id = reg.get_or_create(Some("made-up"));
        assert_ne!(id.as_str(), "made-up");
        assert_eq!(reg.len(), 1);
        assert!(!reg.contains(&SessionId::from("made-up")));
    }

    #[test]
    fn blank_candidate_mints() {
        let reg = SessionRegistry::new();
        let a = reg.get_or_create(Some("  "));
        let b = reg.get_or_create(None);
        assert_ne!(a, b);
        assert_eq!(reg.len(), 2);
    }

    #[test]
    fn lookup_never_inserts() {
        let reg = SessionRegistry::new();
        assert!(reg.lookup(Some("made-up")).is_none());
        assert!(reg.lookup(Some("  ")).is_none());
        assert!(reg.lookup(None).is_none());
        assert!(reg.is_empty());

        let id = reg.get_or_create(None);
        assert_eq!(reg.lookup(Some(id.as_str())), Some(id));
        assert_eq!(reg.len(), 1);
    }

    // ── connect / detach ──

    #[tokio::test]
    async fn connect_mints_then_reuses() {
        let reg = SessionRegistry::new();
        let (tx1, _rx1) = channel(4);
        let first = reg.connect(None, None, tx1);
        let (tx2, _rx2) = channel(4);
        let second = reg.connect(Some(first.session_id.as_str()), Some("5".into()), tx2);

        assert_eq!(first.session_id, second.session_id);
        assert!(first.cancel.is_cancelled(), "old connection must be cancelled");
        assert!(!second.cancel.is_cancelled());
        assert_eq!(reg.info(&second.session_id).unwrap().last_event_id.as_deref(), Some("5"));
    }

    #[tokio::test]
    async fn stale_detach_keeps_replacement() {
        let reg = SessionRegistry::new();
        let (tx1, _rx1) = channel(4);
        let first = reg.connect(None, None, tx1);
        let (tx2, _rx2) = channel(4);
        let second = reg.connect(Some(first.session_id.as_str()), None, tx2);

        assert!(!reg.detach(&first.session_id, first.connection_id));
        assert!(reg.has_live_connection(&second.session_id));
        assert!(reg.detach(&second.session_id, second.connection_id));
        assert!(reg.is_empty());
    }

    #[tokio::test]
    async fn remove_cancels_connection() {
        let reg = SessionRegistry::new();
        let (tx, _rx) = channel(4);
        let handle = reg.connect(None, None, tx);
        assert!(reg.remove(&handle.session_id));
        assert!(handle.cancel.is_cancelled());
        assert!(!reg.remove(&handle.session_id));
    }

    // ── deliver ──

    #[tokio::test]
    async fn deliver_assigns_increasing_sequence() {
        let reg = SessionRegistry::new();
        let (tx, mut rx) = channel(8);
        let handle = reg.connect(None, None, tx);

        assert_eq!(reg.deliver(&handle.session_id, &message("a")), Delivery::Sent(Some(1)));
        assert_eq!(reg.deliver(&handle.session_id, &Frame::comment("hb")), Delivery::Sent(None));
        assert_eq!(reg.deliver(&handle.session_id, &message("b")), Delivery::Sent(Some(2)));

        let first = rx.recv().await.unwrap();
        assert!(std::str::from_utf8(&first).unwrap().starts_with("id: 1\n"));
        assert_eq!(reg.info(&handle.session_id).unwrap().last_sequence, 2);
    }

    #[tokio::test]
    async fn deliver_after_reader_gone_removes_session() {
        let reg = SessionRegistry::new();
        let (tx, rx) = channel(4);
        let handle = reg.connect(None, None, tx);
        drop(rx);

        assert!(!reg.has_live_connection(&handle.session_id));
        assert_eq!(reg.deliver(&handle.session_id, &message("x")), Delivery::Closed);
        assert!(!reg.contains(&handle.session_id));
        assert_eq!(reg.deliver(&handle.session_id, &message("x")), Delivery::UnknownSession);
    }

    #[tokio::test]
    async fn full_channel_drops_frame_but_keeps_session() {
        let reg = SessionRegistry::new();
        let (tx, _rx) = channel(1);
        let handle = reg.connect(None, None, tx);

        assert!(reg.deliver(&handle.session_id, &message("1")).is_sent());
        assert_eq!(reg.deliver(&handle.session_id, &message("2")), Delivery::Full);
        assert!(reg.contains(&handle.session_id));
        assert_eq!(reg.info(&handle.session_id).unwrap().last_sequence, 1);
    }

    #[test]
    fn deliver_without_connection() {
        let reg = SessionRegistry::new();
        let id = reg.get_or_create(None);
        assert_eq!(reg.deliver(&id, &message("x")), Delivery::NoConnection);
    }

    // ── reaping ──

    #[tokio::test(start_paused = true)]
    async fn reap_idle_spares_live_and_recent_sessions() {
        let reg = SessionRegistry::new();
        let idle = reg.get_or_create(None);
        let (tx, _rx) = channel(4);
        let live = reg.connect(None, None, tx);

        tokio::time::advance(Duration::from_secs(120)).await;
        let fresh = reg.get_or_create(None);

        assert_eq!(reg.reap_idle(Duration::from_secs(60)), 1);
        assert!(!reg.contains(&idle));
        assert!(reg.contains(&live.session_id));
        assert!(reg.contains(&fresh));
    }

    #[tokio::test(start_paused = true)]
    async fn touch_defers_reaping() {
        let reg = SessionRegistry::new();
        let id = reg.get_or_create(None);
        tokio::time::advance(Duration::from_secs(50)).await;
        assert!(reg.touch(&id));
        tokio::time::advance(Duration::from_secs(50)).await;
        assert_eq!(reg.reap_idle(Duration::from_secs(60)), 0);
    }

    // ── observability ──

    #[tokio::test]
    async fn directory_counts() {
        let reg = SessionRegistry::new();
        let _ = reg.get_or_create(None);
        let (tx, _rx) = channel(4);
        let _live = reg.connect(None, None, tx);
        assert_eq!(reg.session_count(), 2);
        assert_eq!(reg.live_connection_count(), 1);
        assert_eq!(reg.ids().len(), 2);
    }

    #[tokio::test]
    async fn close_all_cancels_everything() {
        let reg = SessionRegistry::new();
        let (tx, _rx) = channel(4);
        let handle = reg.connect(None, None, tx);
        let _ = reg.get_or_create(None);
        assert_eq!(reg.close_all(), 2);
        assert!(handle.cancel.is_cancelled());
        assert!(reg.is_empty());
    }
}
