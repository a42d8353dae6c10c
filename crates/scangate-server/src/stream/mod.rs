//! Server-sent event streams: frames, heartbeats, and the multiplexer.

pub mod frame;
pub mod heartbeat;
pub mod multiplexer;

pub use frame::{Frame, FrameKind};
pub use multiplexer::{EventStream, OpenedStream, StreamMultiplexer};
