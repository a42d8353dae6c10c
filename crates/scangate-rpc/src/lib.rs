//! # scangate-rpc
//!
//! JSON-RPC 2.0 layer of the gateway:
//!
//! - [`envelope`]: parse and validate inbound requests
//! - [`registry`]: `method → {handler, streamable}` with timeout and panic capture
//! - [`handlers`]: lifecycle, gateway, and tool methods
//! - [`catalog`]: tool names and input schemas

#![deny(unsafe_code)]

pub mod catalog;
pub mod context;
pub mod envelope;
pub mod errors;
pub mod handlers;
pub mod registry;
#[cfg(any(test, feature = "test-helpers"))]
pub mod testing;
pub mod types;

pub use context::{CallContext, RpcContext, SessionDirectory};
pub use envelope::{EnvelopeError, parse_envelope, validate_envelope};
pub use errors::RpcError;
pub use handlers::register_all;
pub use registry::{MethodEntry, MethodHandler, MethodRegistry, Resolution};
pub use types::{JsonRpcErrorObject, JsonRpcId, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};
