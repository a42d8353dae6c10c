//! `reqwest` implementation of [`UpstreamTransport`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue, RETRY_AFTER};
use scangate_core::retry::parse_retry_after_header;
use scangate_settings::UpstreamSettings;
use serde_json::Value;
use tracing::{debug, trace};

use crate::client::UpstreamTransport;
use crate::errors::TransportError;
use crate::types::{HttpMethod, Payload, UpstreamRequest, UpstreamResponse};

/// HTTP transport to the scanning service.
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    timeout_ms: u64,
}

impl HttpTransport {
    /// Build a transport from settings. The API key, when present, is sent
    /// on every request in `api_key_header`.
    pub fn new(settings: &UpstreamSettings) -> Result<Self, TransportError> {
        let mut headers = HeaderMap::new();
        let _ = headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        if let Some(key) = settings.api_key.as_deref() {
            let name = HeaderName::from_bytes(settings.api_key_header.as_bytes())
                .map_err(|e| TransportError::Other(format!("invalid api key header name: {e}")))?;
            let mut value = HeaderValue::from_str(key)
                .map_err(|e| TransportError::Other(format!("invalid api key value: {e}")))?;
            value.set_sensitive(true);
            let _ = headers.insert(name, value);
        }

        let client = reqwest::Client::builder()
            .user_agent(format!("{}/{}", scangate_core::constants::NAME, scangate_core::constants::VERSION))
            .default_headers(headers)
            .connect_timeout(Duration::from_millis(settings.timeout_ms))
            .build()
            .map_err(|e| TransportError::Other(e.to_string()))?;

        Ok(Self::with_client(client, settings))
    }

    /// Use a preconfigured client (tests, custom TLS).
    pub fn with_client(client: reqwest::Client, settings: &UpstreamSettings) -> Self {
        Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            timeout_ms: settings.timeout_ms,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn map_error(&self, err: reqwest::Error) -> TransportError {
        if err.is_timeout() {
            TransportError::Timeout(self.timeout_ms)
        } else {
            err.into()
        }
    }
}

/// Decode a body: JSON when it parses, the raw text otherwise, `Null` when empty.
pub fn decode_body(bytes: &[u8]) -> Value {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Value::Null;
    }
    serde_json::from_slice(bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned()))
}

#[async_trait]
impl UpstreamTransport for HttpTransport {
    async fn send(&self, request: &UpstreamRequest) -> Result<UpstreamResponse, TransportError> {
        let url = self.url(request.operation.path());
        let builder = match request.operation.method() {
            HttpMethod::Get => self.client.get(&url),
            HttpMethod::Post => self.client.post(&url),
        };
        let builder = match &request.payload {
            Payload::Body(body) => builder.header(CONTENT_TYPE, "application/json").json(body),
            Payload::Query(pairs) => builder.query(pairs),
        };

        debug!(operation = request.operation.name(), %url, "sending upstream request");
        let response = builder.send().await.map_err(|e| self.map_error(e))?;

        let status = response.status().as_u16();
        let retry_after_ms = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_retry_after_header);
        let bytes = response.bytes().await.map_err(|e| self.map_error(e))?;
        trace!(status, len = bytes.len(), "upstream response received");

        Ok(UpstreamResponse {
            status,
            body: decode_body(&bytes),
            retry_after_ms,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Operation;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn settings(base_url: &str) -> UpstreamSettings {
        UpstreamSettings {
            base_url: format!("{base_url}/"),
            api_key: Some("test-key".into()),
            ..UpstreamSettings::default()
        }
    }

    #[test]
    fn decode_body_variants() {
        assert_eq!(decode_body(b""), Value::Null);
        assert_eq!(decode_body(b"  \n"), Value::Null);
        assert_eq!(decode_body(br#"{"a":1}"#), json!({"a": 1}));
        assert_eq!(decode_body(b"Bad Gateway"), json!("Bad Gateway"));
    }

    #[test]
    fn invalid_header_name_is_an_error() {
        let mut s = settings("http://localhost");
        s.api_key_header = "bad header".into();
        assert!(matches!(HttpTransport::new(&s), Err(TransportError::Other(_))));
    }

    #[tokio::test]
    async fn posts_json_with_api_key() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/scan/sync/request"))
            .and(header("x-pan-token", "test-key"))
            .and(body_json(json!({"contents": [{"prompt": "hi"}]})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"scan_id": "s-1"})))
            .expect(1)
            .mount(&server)
            .await;

        let transport = HttpTransport::new(&settings(&server.uri())).unwrap();
        let response = transport
            .send(&UpstreamRequest {
                operation: Operation::SyncScan,
                payload: Payload::Body(json!({"contents": [{"prompt": "hi"}]})),
            })
            .await
            .unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.body["scan_id"], "s-1");
    }

    #[tokio::test]
    async fn gets_with_query_ids() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/scan/results"))
            .and(query_param("scan_ids", "a,b"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"scan_id": "a"}, {"scan_id": "b"}])))
            .mount(&server)
            .await;

        let transport = HttpTransport::new(&settings(&server.uri())).unwrap();
        let response = transport
            .send(&UpstreamRequest {
                operation: Operation::Results,
                payload: Payload::Query(vec![("scan_ids", "a,b".into())]),
            })
            .await
            .unwrap();
        assert_eq!(response.body.as_array().map(Vec::len), Some(2));
    }

    #[tokio::test]
    async fn error_status_and_retry_after_are_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/scan/async/request"))
            .respond_with(
                ResponseTemplate::new(429)
                    .insert_header("retry-after", "3")
                    .set_body_string("slow down"),
            )
            .mount(&server)
            .await;

        let transport = HttpTransport::new(&settings(&server.uri())).unwrap();
        let response = transport
            .send(&UpstreamRequest {
                operation: Operation::AsyncScan,
                payload: Payload::Body(json!([])),
            })
            .await
            .unwrap();
        assert_eq!(response.status, 429);
        assert_eq!(response.retry_after_ms, Some(3000));
        assert_eq!(response.body, json!("slow down"));
    }

    #[tokio::test]
    async fn unreachable_host_is_a_connect_error() {
        let s = UpstreamSettings {
            base_url: "http://127.0.0.1:1".into(),
            timeout_ms: 2000,
            ..UpstreamSettings::default()
        };
        let transport = HttpTransport::new(&s).unwrap();
        let err = transport
            .send(&UpstreamRequest {
                operation: Operation::Reports,
                payload: Payload::Query(vec![("report_ids", "r".into())]),
            })
            .await
            .unwrap_err();
        assert!(err.is_retryable(), "unexpected {err:?}");
    }
}
