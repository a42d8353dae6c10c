//! Inbound envelope parsing and validation.

use serde_json::{Map, Value};

use scangate_core::constants::JSONRPC_VERSION;

use crate::errors::RpcError;
use crate::types::{JsonRpcId, JsonRpcRequest, JsonRpcResponse};

/// Longest accepted method name, in characters.
pub const MAX_METHOD_LEN: usize = 256;

/// A rejected envelope and the id to answer it with.
#[derive(Debug, Clone)]
pub struct EnvelopeError {
    /// Recovered id, `Null` when none could be read.
    pub id: JsonRpcId,
    /// `Parse` or `InvalidRequest`.
    pub error: RpcError,
}

impl EnvelopeError {
    fn invalid(id: JsonRpcId, detail: impl Into<String>) -> Self {
        Self {
            id,
            error: RpcError::InvalidRequest {
                detail: detail.into(),
            },
        }
    }

    /// Error response for this rejection.
    pub fn into_response(self) -> JsonRpcResponse {
        JsonRpcResponse::error(self.id, self.error.to_error_object())
    }
}

/// Parse raw bytes into a validated request.
pub fn parse_envelope(body: &[u8]) -> Result<JsonRpcRequest, EnvelopeError> {
    let value: Value = serde_json::from_slice(body).map_err(|e| EnvelopeError {
        id: JsonRpcId::Null,
        error: RpcError::Parse { detail: e.to_string() },
    })?;
    validate_envelope(value)
}

/// Validate an already-decoded JSON value.
pub fn validate_envelope(value: Value) -> Result<JsonRpcRequest, EnvelopeError> {
    let mut obj = match value {
        Value::Object(obj) => obj,
        Value::Array(_) => {
            return Err(EnvelopeError::invalid(JsonRpcId::Null, "batch requests are not supported"));
        }
        _ => return Err(EnvelopeError::invalid(JsonRpcId::Null, "request must be an object")),
    };

    let id = match obj.remove("id") {
        None => None,
        Some(raw) => match JsonRpcId::from_value(&raw) {
            Some(id) => Some(id),
            None => {
                return Err(EnvelopeError::invalid(
                    JsonRpcId::Null,
                    "id must be a string, an integer, or null",
                ));
            }
        },
    };
    let echo = id.clone().unwrap_or(JsonRpcId::Null);

    if obj.get("jsonrpc").and_then(Value::as_str) != Some(JSONRPC_VERSION) {
        return Err(EnvelopeError::invalid(echo, "jsonrpc must be \"2.0\""));
    }

    let method = match take_method(&mut obj) {
        Ok(method) => method,
        Err(detail) => return Err(EnvelopeError::invalid(echo, detail)),
    };

    let params = match obj.remove("params") {
        None => None,
        Some(p @ (Value::Object(_) | Value::Array(_))) => Some(p),
        Some(_) => return Err(EnvelopeError::invalid(echo, "params must be an object or an array")),
    };

    Ok(JsonRpcRequest::new(method, params, id))
}

fn take_method(obj: &mut Map<String, Value>) -> Result<String, String> {
    let method = match obj.remove("method") {
        Some(Value::String(m)) => m,
        Some(_) => return Err("method must be a string".into()),
        None => return Err("method is required".into()),
    };
    if method.is_empty() {
        return Err("method must not be empty".into());
    }
    if method.chars().count() > MAX_METHOD_LEN {
        return Err(format!("method exceeds {MAX_METHOD_LEN} characters"));
    }
    if method.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err("method contains whitespace or control characters".into());
    }
    Ok(method)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{INVALID_REQUEST, PARSE_ERROR};
    use serde_json::json;

    fn reject(value: Value) -> EnvelopeError {
        validate_envelope(value).unwrap_err()
    }

    #[test]
    fn accepts_minimal_request() {
        let req = parse_envelope(br#"{"jsonrpc":"2.0","method":"ping","id":1}"#).unwrap();
        assert_eq!(req.method, "ping");
        assert_eq!(req.id, Some(JsonRpcId::Number(1)));
        assert!(req.params.is_none());
    }

    #[test]
    fn accepts_object_and_array_params() {
        let obj = validate_envelope(json!({"jsonrpc": "2.0", "method": "m", "params": {"a": 1}, "id": "x"})).unwrap();
        assert_eq!(obj.params, Some(json!({"a": 1})));
        let arr = validate_envelope(json!({"jsonrpc": "2.0", "method": "m", "params": [1], "id": "x"})).unwrap();
        assert_eq!(arr.params, Some(json!([1])));
    }

    #[test]
    fn notification_without_id() {
        let req = validate_envelope(json!({"jsonrpc": "2.0", "method": "notifications/initialized"})).unwrap();
        assert!(req.is_notification());
    }

    #[test]
    fn non_json_is_parse_error_with_null_id() {
        let err = parse_envelope(b"{not json").unwrap_err();
        assert_eq!(err.error.code(), PARSE_ERROR);
        assert_eq!(err.id, JsonRpcId::Null);
    }

    #[test]
    fn missing_method_echoes_id() {
        let err = reject(json!({"jsonrpc": "2.0", "id": 5}));
        assert_eq!(err.error.code(), INVALID_REQUEST);
        assert_eq!(err.id, JsonRpcId::Number(5));
    }

    #[test]
    fn wrong_version_rejected() {
        let err = reject(json!({"jsonrpc": "1.0", "method": "ping", "id": "a"}));
        assert_eq!(err.error.code(), INVALID_REQUEST);
        assert_eq!(err.id, JsonRpcId::from("a"));
        assert_eq!(reject(json!({"method": "ping", "id": 1})).error.code(), INVALID_REQUEST);
    }

    #[test]
    fn method_shape_rules() {
        for bad in [json!(""), json!("has space"), json!("tab\there"), json!("nl\n"), json!(7)] {
            let err = reject(json!({"jsonrpc": "2.0", "method": bad, "id": 1}));
            assert_eq!(err.error.code(), INVALID_REQUEST);
        }
        let long = "m".repeat(MAX_METHOD_LEN + 1);
        assert!(validate_envelope(json!({"jsonrpc": "2.0", "method": long, "id": 1})).is_err());
        let max = "m".repeat(MAX_METHOD_LEN);
        assert!(validate_envelope(json!({"jsonrpc": "2.0", "method": max, "id": 1})).is_ok());
    }

    #[test]
    fn scalar_params_rejected() {
        let err = reject(json!({"jsonrpc": "2.0", "method": "m", "params": "x", "id": 2}));
        assert_eq!(err.id, JsonRpcId::Number(2));
    }

    #[test]
    fn large_unsigned_id_is_echoed() {
        let raw = format!(r#"{{"jsonrpc":"2.0","method":"ping","id":{}}}"#, u64::MAX);
        let req = parse_envelope(raw.as_bytes()).unwrap();
        assert_eq!(req.id, Some(JsonRpcId::Unsigned(u64::MAX)));
        let echoed = serde_json::to_value(req.reply_id()).unwrap();
        assert_eq!(echoed, json!(u64::MAX));
    }

    #[test]
    fn bad_id_types_rejected_with_null_id() {
        for bad in [json!(1.5), json!(true), json!({"a": 1}), json!([1])] {
            let err = reject(json!({"jsonrpc": "2.0", "method": "m", "id": bad}));
            assert_eq!(err.error.code(), INVALID_REQUEST);
            assert_eq!(err.id, JsonRpcId::Null);
        }
    }

    #[test]
    fn batches_and_scalars_rejected() {
        assert_eq!(reject(json!([{"jsonrpc": "2.0", "method": "ping", "id": 1}])).error.code(), INVALID_REQUEST);
        assert_eq!(reject(json!("ping")).error.code(), INVALID_REQUEST);
    }

    #[test]
    fn into_response_carries_error() {
        let resp = reject(json!({"jsonrpc": "2.0", "id": 9})).into_response();
        assert_eq!(resp.id, JsonRpcId::Number(9));
        assert_eq!(resp.error.unwrap().code, -32600);
    }
}
