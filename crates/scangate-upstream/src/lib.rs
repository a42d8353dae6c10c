//! # scangate-upstream
//!
//! Everything between a tool handler and the remote scanning service:
//!
//! - [`fingerprint`]: SHA-256 cache keys over content-bearing fields
//! - [`FingerprintCache`]: bounded TTL memoization with FIFO eviction
//! - [`TokenBucketLimiter`]: per-category admission control
//! - [`ResilientClient`]: classification, retry, backoff, `Retry-After`
//! - [`HttpTransport`]: the `reqwest` wire
//! - [`ScanService`]: the composition handlers call into

#![deny(unsafe_code)]

pub mod cache;
pub mod client;
pub mod errors;
pub mod fingerprint;
pub mod http;
pub mod limiter;
pub mod service;
pub mod types;

pub use cache::{CacheStats, FingerprintCache};
pub use client::{ResilientClient, UpstreamTransport};
pub use errors::{TransportError, UpstreamError};
pub use fingerprint::{Fingerprint, fingerprint};
pub use http::HttpTransport;
pub use limiter::{LimitCategory, LimiterStats, TokenBucketLimiter};
pub use service::{ScanOutcome, ScanService, ServiceStats};
pub use types::{ScanContent, ScanInput, ScanProfile};
