//! `/health` endpoint.

use std::time::Instant;

use serde::Serialize;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"` when the server is running.
    pub status: String,
    /// Crate version.
    pub version: String,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Known sessions.
    pub sessions: usize,
    /// Sessions with a live push stream.
    pub live_streams: usize,
}

/// Build a health response from live counters.
pub fn health_check(start_time: Instant, sessions: usize, live_streams: usize) -> HealthResponse {
    HealthResponse {
        status: "ok".into(),
        version: scangate_core::constants::VERSION.into(),
        uptime_secs: start_time.elapsed().as_secs(),
        sessions,
        live_streams,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_is_ok() {
        let resp = health_check(Instant::now(), 0, 0);
        assert_eq!(resp.status, "ok");
        assert!(resp.uptime_secs < 2);
    }

    #[test]
    fn uptime_increases() {
        let start = Instant::now()
            .checked_sub(std::time::Duration::from_secs(60))
            .unwrap();
        assert!(health_check(start, 0, 0).uptime_secs >= 59);
    }

    #[test]
    fn serialization() {
        let resp = health_check(Instant::now(), 4, 2);
        let parsed = serde_json::to_value(&resp).unwrap();
        assert_eq!(parsed["status"], "ok");
        assert_eq!(parsed["sessions"], 4);
        assert_eq!(parsed["live_streams"], 2);
        assert!(parsed["version"].is_string());
    }
}
