//! Private JSON-RPC client for MIoT-style devices
//!
//! This crate provides a minimal blocking client for devices that expose their
//! state as numbered properties. Each call is exactly one HTTP exchange: no
//! retries, no caching. Callers running inside an async runtime should move
//! calls onto a blocking thread.

mod error;
mod property;

pub use error::RpcError;
pub use property::{PropertyRequest, PropertyResult};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};

/// Transport settings for [`RpcClient`]
#[derive(Debug, Clone)]
pub struct RpcConfig {
    /// Deadline for establishing the TCP connection
    /// Default: 5 seconds
    pub connect_timeout: Duration,

    /// Deadline for reading the reply
    /// Default: 10 seconds
    pub read_timeout: Duration,

    /// Endpoint path on the device
    /// Default: "/miot"
    pub path: String,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(10),
            path: "/miot".to_string(),
        }
    }
}

impl RpcConfig {
    pub fn with_timeouts(mut self, connect: Duration, read: Duration) -> Self {
        self.connect_timeout = connect;
        self.read_timeout = read;
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }
}

/// A minimal RPC client for property-based devices
///
/// Cloning is cheap; clones share the connection pool and request id counter.
#[derive(Debug, Clone)]
pub struct RpcClient {
    agent: ureq::Agent,
    config: RpcConfig,
    next_id: Arc<AtomicU64>,
}

impl RpcClient {
    /// Create a new client with default timeouts
    pub fn new() -> Self {
        Self::with_config(RpcConfig::default())
    }

    pub fn with_config(config: RpcConfig) -> Self {
        Self {
            agent: ureq::AgentBuilder::new()
                .timeout_connect(config.connect_timeout)
                .timeout_read(config.read_timeout)
                .build(),
            config,
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn config(&self) -> &RpcConfig {
        &self.config
    }

    /// Send one RPC request and return its `result` member
    ///
    /// # Arguments
    /// * `address` - Device `host` or `host:port`
    /// * `token` - Device credential, sent as a bearer token
    /// * `method` - RPC method name
    /// * `params` - Method parameters
    pub fn call(
        &self,
        address: &str,
        token: &str,
        method: &str,
        params: Value,
    ) -> Result<Value, RpcError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let url = format!("http://{}{}", address, self.config.path);

        tracing::trace!(%address, method, id, "sending device rpc");

        let response = self
            .agent
            .post(&url)
            .set("Authorization", &format!("Bearer {}", token))
            .send_json(json!({
                "id": id,
                "method": method,
                "params": params,
            }))
            .map_err(RpcError::from_ureq)?;

        let body: Value = response
            .into_json()
            .map_err(|e| RpcError::Parse(e.to_string()))?;

        extract_result(body, id)
    }

    /// Read a batch of properties in a single exchange
    ///
    /// Per-property failures are reported through [`PropertyResult::code`],
    /// not as an `Err`.
    pub fn get_properties(
        &self,
        address: &str,
        token: &str,
        requests: &[PropertyRequest],
    ) -> Result<Vec<PropertyResult>, RpcError> {
        let params = serde_json::to_value(requests)
            .map_err(|e| RpcError::Parse(format!("Failed to encode request: {}", e)))?;

        let result = self.call(address, token, "get_properties", params)?;

        serde_json::from_value(result)
            .map_err(|e| RpcError::Parse(format!("Invalid get_properties result: {}", e)))
    }
}

impl Default for RpcClient {
    fn default() -> Self {
        Self::new()
    }
}

fn extract_result(mut body: Value, id: u64) -> Result<Value, RpcError> {
    if let Some(error) = body.get("error") {
        let code = error.get("code").and_then(Value::as_i64).unwrap_or(-1);
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown error")
            .to_string();
        return Err(RpcError::Device { code, message });
    }

    match body.get("id").and_then(Value::as_u64) {
        Some(reply_id) if reply_id != id => {
            return Err(RpcError::Parse(format!(
                "Reply id {} does not match request id {}",
                reply_id, id
            )));
        }
        _ => {}
    }

    body.get_mut("result")
        .map(Value::take)
        .ok_or_else(|| RpcError::Parse("Missing result member".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_client_creation() {
        let client = RpcClient::new();
        assert_eq!(client.config().path, "/miot");
        assert_eq!(client.config().connect_timeout, Duration::from_secs(5));

        let custom = RpcClient::with_config(
            RpcConfig::default()
                .with_timeouts(Duration::from_secs(1), Duration::from_secs(2))
                .with_path("/rpc"),
        );
        assert_eq!(custom.config().path, "/rpc");
        assert_eq!(custom.config().read_timeout, Duration::from_secs(2));
    }

    #[test]
    fn test_extract_result_success() {
        let body = json!({"id": 7, "result": ["ok"]});
        assert_eq!(extract_result(body, 7).unwrap(), json!(["ok"]));
    }

    #[test]
    fn test_extract_result_device_error() {
        let body = json!({"id": 3, "error": {"code": -5001, "message": "command error"}});
        match extract_result(body, 3).unwrap_err() {
            RpcError::Device { code, message } => {
                assert_eq!(code, -5001);
                assert_eq!(message, "command error");
            }
            other => panic!("Expected RpcError::Device, got {:?}", other),
        }
    }

    #[rstest]
    #[case(json!({"id": 1}), "Missing result")]
    #[case(json!({"id": 2, "result": []}), "does not match")]
    fn test_extract_result_malformed(#[case] body: Value, #[case] expected: &str) {
        match extract_result(body, 1).unwrap_err() {
            RpcError::Parse(msg) => assert!(msg.contains(expected), "{}", msg),
            other => panic!("Expected RpcError::Parse, got {:?}", other),
        }
    }

    #[test]
    fn test_get_properties_round_trip() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("POST", "/miot")
            .match_header("authorization", "Bearer secret-token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"result":[
                    {"did":"power","siid":2,"piid":2,"code":0,"value":true},
                    {"did":"aqi","siid":3,"piid":6,"code":-4004}
                ]}"#,
            )
            .create();

        let client = RpcClient::new();
        let results = client
            .get_properties(
                &server.host_with_port(),
                "secret-token",
                &[
                    PropertyRequest::new("power", 2, 2),
                    PropertyRequest::new("aqi", 3, 6),
                ],
            )
            .unwrap();

        mock.assert();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].legible_value(), Some(&Value::Bool(true)));
        assert!(results[1].legible_value().is_none());
    }

    #[test]
    fn test_http_status_error() {
        let mut server = mockito::Server::new();
        let _mock = server.mock("POST", "/miot").with_status(503).create();

        let client = RpcClient::new();
        let err = client
            .call(&server.host_with_port(), "t", "get_properties", json!([]))
            .unwrap_err();

        assert!(matches!(err, RpcError::Status(503)));
        assert!(err.is_transport());
    }

    #[test]
    fn test_non_json_body_is_parse_error() {
        let mut server = mockito::Server::new();
        let _mock = server
            .mock("POST", "/miot")
            .with_status(200)
            .with_body("<html>not json</html>")
            .create();

        let client = RpcClient::new();
        let err = client
            .call(&server.host_with_port(), "t", "get_properties", json!([]))
            .unwrap_err();

        assert!(matches!(err, RpcError::Parse(_)));
    }

    #[test]
    fn test_unreachable_device_is_transport_error() {
        let client = RpcClient::with_config(
            RpcConfig::default().with_timeouts(Duration::from_millis(200), Duration::from_millis(200)),
        );
        // Port 1 on loopback is not listening in any sane test environment
        let err = client
            .call("127.0.0.1:1", "t", "get_properties", json!([]))
            .unwrap_err();

        assert!(err.is_transport(), "unexpected error: {:?}", err);
    }
}
