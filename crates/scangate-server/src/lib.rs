//! # scangate-server
//!
//! Axum HTTP server, session registry, and push-stream multiplexer.
//!
//! - HTTP endpoints: `/mcp` (POST, GET, DELETE), legacy `/sse` and `/messages`,
//!   `/health`, `/metrics`
//! - Sessions: one logical session per client, at most one live push stream
//! - Push streams: server-sent event frames over bounded per-session channels
//! - Dispatch: envelope validation, handler run, body-or-stream delivery
//! - Graceful shutdown via `CancellationToken`

#![deny(unsafe_code)]

pub mod config;
pub mod dispatch;
pub mod errors;
pub mod health;
pub mod metrics;
pub mod server;
pub mod session;
pub mod shutdown;
pub mod stream;

pub use config::ServerConfig;
pub use dispatch::{CallerCapabilities, DispatchOutcome, Dispatcher};
pub use errors::ServerError;
pub use server::{AppState, GatewayServer};
pub use session::SessionRegistry;
pub use shutdown::ShutdownCoordinator;
pub use stream::StreamMultiplexer;
