//! JSON-RPC 2.0 message types and session state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Protocol revisions this server speaks, oldest first.
pub const SUPPORTED_PROTOCOL_VERSIONS: &[&str] =
    &["2024-11-05", "2025-03-26", "2025-06-18"];

/// Revision assumed before a handshake completes.
pub const LATEST_PROTOCOL_VERSION: &str = "2025-06-18";

pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
pub const INTERNAL_ERROR: i64 = -32603;
pub const INVALID_PROTOCOL_VERSION: i64 = -32000;
pub const TOOL_EXECUTION_ERROR: i64 = -32002;
pub const RESOURCE_NOT_FOUND: i64 = -32003;

/// Incoming JSON-RPC request or notification.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcRequest {
    #[serde(default)]
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

impl JsonRpcRequest {
    /// Notifications carry no id and expect no response.
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Outgoing JSON-RPC response.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: &'static str,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl JsonRpcResponse {
    pub fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id: id.unwrap_or(Value::Null),
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Option<Value>, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0",
            id: id.unwrap_or(Value::Null),
            result: None,
            error: Some(RpcError {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }
}

/// Per-server protocol session.
///
/// Tracks initialization and the negotiated revision. Methods other than the
/// handshake and ping are rejected until the client has sent
/// `notifications/initialized`.
pub struct McpSession {
    initialized: AtomicBool,
    protocol_version: RwLock<String>,
}

impl Default for McpSession {
    fn default() -> Self {
        Self::new()
    }
}

impl McpSession {
    pub fn new() -> Self {
        Self {
            initialized: AtomicBool::new(false),
            protocol_version: RwLock::new(LATEST_PROTOCOL_VERSION.to_string()),
        }
    }

    /// Negotiate the protocol revision: echo a supported request, reject
    /// anything else so the client can retry with a revision we speak.
    pub fn negotiate(&self, requested: &str) -> Result<String, String> {
        if !SUPPORTED_PROTOCOL_VERSIONS.contains(&requested) {
            return Err(format!(
                "Unsupported protocol version: {}. Supported: {}",
                requested,
                SUPPORTED_PROTOCOL_VERSIONS.join(", ")
            ));
        }
        if let Ok(mut slot) = self.protocol_version.write() {
            *slot = requested.to_string();
        }
        Ok(requested.to_string())
    }

    pub fn protocol_version(&self) -> String {
        self.protocol_version
            .read()
            .map(|v| v.clone())
            .unwrap_or_else(|_| LATEST_PROTOCOL_VERSION.to_string())
    }

    pub fn mark_initialized(&self) {
        self.initialized.store(true, Ordering::SeqCst);
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    /// Whether `method` may be called before initialization completes.
    pub fn exempt_from_init(method: &str) -> bool {
        matches!(method, "initialize" | "notifications/initialized" | "ping")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn supported_version_is_echoed() {
        let session = McpSession::new();
        assert_eq!(
            session.negotiate("2024-11-05").as_deref(),
            Ok("2024-11-05")
        );
        assert_eq!(session.protocol_version(), "2024-11-05");
    }

    #[test]
    fn unknown_version_is_rejected() {
        let session = McpSession::new();
        let err = session.negotiate("1999-01-01").unwrap_err();
        assert!(err.contains("1999-01-01"));
        for supported in SUPPORTED_PROTOCOL_VERSIONS {
            assert!(err.contains(supported));
        }
        // A failed handshake leaves the session untouched.
        assert_eq!(session.protocol_version(), LATEST_PROTOCOL_VERSION);
    }

    #[test]
    fn init_gate_exemptions() {
        assert!(McpSession::exempt_from_init("initialize"));
        assert!(McpSession::exempt_from_init("notifications/initialized"));
        assert!(McpSession::exempt_from_init("ping"));
        assert!(!McpSession::exempt_from_init("tools/call"));
    }

    #[test]
    fn notification_detection() {
        let req: JsonRpcRequest = serde_json::from_value(json!({
            "jsonrpc": "2.0",
            "method": "notifications/initialized"
        }))
        .unwrap();
        assert!(req.is_notification());

        let req: JsonRpcRequest = serde_json::from_value(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "ping"
        }))
        .unwrap();
        assert!(!req.is_notification());
    }

    #[test]
    fn error_response_shape() {
        let resp = JsonRpcResponse::error(Some(json!(7)), METHOD_NOT_FOUND, "no such method");
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["jsonrpc"], "2.0");
        assert_eq!(json["id"], 7);
        assert_eq!(json["error"]["code"], -32601);
        assert!(json.get("result").is_none());
    }
}
