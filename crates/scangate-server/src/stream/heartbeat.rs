//! Periodic comment frames that keep idle push streams open.

use std::sync::Arc;
use std::time::Duration;

use scangate_core::SessionId;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::session::{Delivery, SessionRegistry};
use crate::stream::frame::Frame;

/// Outcome of the heartbeat loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatResult {
    /// The connection was cancelled (replaced, removed, or body dropped).
    Cancelled,
    /// The session or its connection is gone.
    Closed,
}

/// The heartbeat frame.
pub fn heartbeat_frame() -> Frame {
    Frame::comment("ping")
}

/// Write a heartbeat every `interval` until the connection ends.
///
/// A full channel skips one beat; anything else that prevents delivery
/// ends the loop.
pub async fn run_heartbeat(
    sessions: Arc<SessionRegistry>,
    session_id: SessionId,
    interval: Duration,
    cancel: CancellationToken,
) -> HeartbeatResult {
    let mut ticker = time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            () = cancel.cancelled() => return HeartbeatResult::Cancelled,
            _ = ticker.tick() => {
                match sessions.deliver(&session_id, &heartbeat_frame()) {
                    Delivery::Sent(_) => {}
                    Delivery::Full => debug!(session_id = %session_id, "heartbeat skipped, channel full"),
                    Delivery::Closed | Delivery::UnknownSession | Delivery::NoConnection => {
                        return HeartbeatResult::Closed;
                    }
                }
            }
        }
    }
}
