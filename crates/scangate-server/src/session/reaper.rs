//! Background removal of idle sessions.

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::session::SessionRegistry;

/// Shortest sweep period.
const MIN_SWEEP: Duration = Duration::from_millis(100);

/// Sweep the registry every `max_idle / 2` until `cancel` fires.
pub async fn run_reaper(sessions: Arc<SessionRegistry>, max_idle: Duration, cancel: CancellationToken) {
    let period = (max_idle / 2).max(MIN_SWEEP);
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    debug!(period_ms = u64::try_from(period.as_millis()).unwrap_or(u64::MAX), "session reaper started");

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let reaped = sessions.reap_idle(max_idle);
                if reaped > 0 {
                    counter!("sessions_reaped_total").increment(u64::try_from(reaped).unwrap_or(u64::MAX));
                    info!(reaped, remaining = sessions.len(), "reaped idle sessions");
                }
            }
        }
    }
    debug!("session reaper stopped");
}
