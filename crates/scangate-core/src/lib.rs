//! # scangate-core
//!
//! Foundation types shared by every scangate crate:
//!
//! - **Branded IDs**: [`SessionId`] as a newtype for type safety
//! - **Retry math**: [`retry::RetryConfig`], exponential backoff, `Retry-After` parsing
//! - **Logging**: [`logging::init_subscriber`] for the global `tracing` subscriber
//! - **Constants**: package name and version

#![deny(unsafe_code)]

pub mod constants;
pub mod ids;
pub mod logging;
pub mod retry;

pub use ids::SessionId;
