//! RPC error codes and error type.

use serde_json::Value;

use crate::types::JsonRpcErrorObject;

// ── Error code constants ────────────────────────────────────────────

/// Body is not JSON.
pub const PARSE_ERROR: i32 = -32700;
/// Envelope failed validation.
pub const INVALID_REQUEST: i32 = -32600;
/// Reserved by JSON-RPC. Unknown methods report [`INTERNAL_ERROR`] with the
/// method name in `data` instead.
pub const METHOD_NOT_FOUND: i32 = -32601;
/// Parameters missing or malformed.
pub const INVALID_PARAMS: i32 = -32602;
/// Handler failure, timeout, panic, or unknown method.
pub const INTERNAL_ERROR: i32 = -32603;
/// Upstream resource does not exist.
pub const RESOURCE_NOT_FOUND: i32 = -32001;
/// Upstream kept throttling until retries ran out.
pub const RATE_LIMIT_EXCEEDED: i32 = -32002;

/// RPC error type returned by handlers and envelope validation.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RpcError {
    /// Body is not JSON.
    #[error("Parse error")]
    Parse {
        /// Parser diagnostic.
        detail: String,
    },

    /// Envelope is not a valid request.
    #[error("Invalid Request")]
    InvalidRequest {
        /// What is wrong.
        detail: String,
    },

    /// No handler is registered for the method.
    #[error("Internal error")]
    MethodNotFound {
        /// Requested method name.
        method: String,
    },

    /// Required parameter missing or wrong type.
    #[error("{message}")]
    InvalidParams {
        /// Description of what is wrong.
        message: String,
    },

    /// Internal failure.
    #[error("{message}")]
    Internal {
        /// Description.
        message: String,
    },

    /// Any other code.
    #[error("{message}")]
    Custom {
        /// Numeric code.
        code: i32,
        /// Human-readable message.
        message: String,
        /// Optional structured details.
        data: Option<Value>,
    },
}

impl RpcError {
    /// Numeric code for this variant.
    pub fn code(&self) -> i32 {
        match self {
            Self::Parse { .. } => PARSE_ERROR,
            Self::InvalidRequest { .. } => INVALID_REQUEST,
            Self::InvalidParams { .. } => INVALID_PARAMS,
            Self::MethodNotFound { .. } | Self::Internal { .. } => INTERNAL_ERROR,
            Self::Custom { code, .. } => *code,
        }
    }

    /// Label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Parse { .. } => "parse_error",
            Self::InvalidRequest { .. } => "invalid_request",
            Self::MethodNotFound { .. } => "method_not_found",
            Self::InvalidParams { .. } => "invalid_params",
            Self::Internal { .. } => "internal_error",
            Self::Custom { .. } => "custom",
        }
    }

    /// Shorthand for [`RpcError::InvalidParams`].
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::InvalidParams {
            message: message.into(),
        }
    }

    /// Shorthand for [`RpcError::Internal`].
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Convert to the wire-format error object.
    pub fn to_error_object(&self) -> JsonRpcErrorObject {
        let data = match self {
            Self::Parse { detail } | Self::InvalidRequest { detail } => {
                Some(Value::String(detail.clone()))
            }
            Self::MethodNotFound { method } => Some(Value::String(format!("Method not found: {method}"))),
            Self::Custom { data, .. } => data.clone(),
            Self::InvalidParams { .. } | Self::Internal { .. } => None,
        };
        JsonRpcErrorObject {
            code: self.code(),
            message: self.to_string(),
            data,
        }
    }
}
