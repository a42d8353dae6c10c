//! Logical client sessions.

pub mod reaper;
pub mod registry;

pub use reaper::run_reaper;
pub use registry::{ConnectionHandle, Delivery, SessionInfo, SessionRegistry};
