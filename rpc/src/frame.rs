//! Wire message types for the CLI's JSON-RPC protocol.
//!
//! One frame is a request, a response, or a notification. Responses are
//! correlated to requests purely by `id`; the id space is per channel
//! instance and never reused while that channel is alive.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Outgoing request frame.
#[derive(Debug, Serialize)]
pub(crate) struct Request {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl Request {
    pub fn new(id: u64, method: impl Into<String>, params: Option<serde_json::Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            method: method.into(),
            params,
        }
    }
}

/// An incoming frame, classified by shape.
#[derive(Debug)]
pub(crate) enum Incoming {
    /// Reply to one of our requests: exactly one of `result` / `error` is set.
    Response {
        id: u64,
        result: Result<serde_json::Value, RemoteError>,
    },
    /// A request initiated by the server. We answer method-not-found.
    ServerRequest { id: serde_json::Value, method: String },
    /// Fire-and-forget message from the server.
    Notification {
        method: String,
        #[allow(dead_code)]
        params: Option<serde_json::Value>,
    },
}

/// Classify a parsed frame. Returns `None` for shapes that are neither a
/// response, a server request, nor a notification; such frames are dropped.
pub(crate) fn classify(frame: &serde_json::Value) -> Option<Incoming> {
    let id = frame.get("id");
    let method = frame
        .get("method")
        .and_then(|m| m.as_str())
        .map(String::from);
    let has_outcome = frame.get("result").is_some() || frame.get("error").is_some();

    match (id, method, has_outcome) {
        (Some(id_val), None, true) => {
            let id = id_val.as_u64()?;
            let result = match frame.get("error") {
                Some(err) => Err(RemoteError::from_value(err)),
                None => Ok(frame.get("result").cloned().unwrap_or(serde_json::Value::Null)),
            };
            Some(Incoming::Response { id, result })
        }
        (Some(id_val), Some(method), _) => Some(Incoming::ServerRequest {
            id: id_val.clone(),
            method,
        }),
        (None, Some(method), _) => Some(Incoming::Notification {
            method,
            params: frame.get("params").cloned(),
        }),
        _ => None,
    }
}

/// Build the method-not-found reply for a server-initiated request.
pub(crate) fn method_not_found(id: &serde_json::Value, method: &str) -> serde_json::Value {
    serde_json::json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": {
            "code": RemoteErrorCode::MethodNotFound.code(),
            "message": format!("Method not found: {method}")
        }
    })
}

/// Structured error returned by the server over a healthy channel.
///
/// Passed through to callers unmodified; the transport never retries these.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RemoteError {
    #[serde(with = "code_serde")]
    pub code: RemoteErrorCode,
    pub message: String,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

impl RemoteError {
    /// Lenient decode: a malformed `error` member still yields a usable
    /// error value rather than losing the response.
    fn from_value(err: &serde_json::Value) -> Self {
        serde_json::from_value(err.clone()).unwrap_or_else(|_| Self {
            code: RemoteErrorCode::Other(0),
            message: err.to_string(),
            data: None,
        })
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code {})", self.message, self.code.code())
    }
}

mod code_serde {
    use serde::{Deserialize, Deserializer};

    use super::RemoteErrorCode;

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<RemoteErrorCode, D::Error> {
        Ok(RemoteErrorCode::from_code(i64::deserialize(d)?))
    }
}

/// The fixed enumeration of error codes the platform server returns.
///
/// Negative values are the JSON-RPC reserved range; positive values are
/// platform-defined. Unknown codes survive as [`RemoteErrorCode::Other`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteErrorCode {
    ParseError,
    InvalidRequest,
    MethodNotFound,
    InvalidParams,
    InternalError,
    Unauthorized,
    TokenNotFound,
    Forbidden,
    ProjectNotFound,
    ComponentNotFound,
    MaxProjectCountExceeded,
    MaxComponentCountExceeded,
    Other(i64),
}

impl RemoteErrorCode {
    #[must_use]
    pub fn from_code(code: i64) -> Self {
        match code {
            -32700 => Self::ParseError,
            -32600 => Self::InvalidRequest,
            -32601 => Self::MethodNotFound,
            -32602 => Self::InvalidParams,
            -32603 => Self::InternalError,
            1001 => Self::Unauthorized,
            1002 => Self::TokenNotFound,
            1003 => Self::Forbidden,
            1004 => Self::ProjectNotFound,
            1005 => Self::ComponentNotFound,
            1006 => Self::MaxProjectCountExceeded,
            1007 => Self::MaxComponentCountExceeded,
            other => Self::Other(other),
        }
    }

    #[must_use]
    pub fn code(self) -> i64 {
        match self {
            Self::ParseError => -32700,
            Self::InvalidRequest => -32600,
            Self::MethodNotFound => -32601,
            Self::InvalidParams => -32602,
            Self::InternalError => -32603,
            Self::Unauthorized => 1001,
            Self::TokenNotFound => 1002,
            Self::Forbidden => 1003,
            Self::ProjectNotFound => 1004,
            Self::ComponentNotFound => 1005,
            Self::MaxProjectCountExceeded => 1006,
            Self::MaxComponentCountExceeded => 1007,
            Self::Other(code) => code,
        }
    }

    /// Whether this code indicates the user should re-authenticate.
    #[must_use]
    pub fn is_auth_error(self) -> bool {
        matches!(self, Self::Unauthorized | Self::TokenNotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_serialization_with_params() {
        let req = Request::new(7, "project/create", Some(serde_json::json!({"name": "demo"})));
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["jsonrpc"], "2.0");
        assert_eq!(json["id"], 7);
        assert_eq!(json["method"], "project/create");
        assert_eq!(json["params"]["name"], "demo");
    }

    #[test]
    fn request_serialization_without_params() {
        let req = Request::new(1, "auth/getUserInfo", None);
        let json = serde_json::to_value(&req).unwrap();
        assert!(
            json.get("params").is_none(),
            "params must be omitted, not null"
        );
    }

    #[test]
    fn classify_success_response() {
        let frame = serde_json::json!({"jsonrpc": "2.0", "id": 3, "result": {"ok": true}});
        match classify(&frame) {
            Some(Incoming::Response { id: 3, result: Ok(v) }) => assert_eq!(v["ok"], true),
            other => panic!("expected success response, got {other:?}"),
        }
    }

    #[test]
    fn classify_error_response() {
        let frame = serde_json::json!({
            "jsonrpc": "2.0",
            "id": 4,
            "error": {"code": 1001, "message": "session expired"}
        });
        match classify(&frame) {
            Some(Incoming::Response { id: 4, result: Err(e) }) => {
                assert_eq!(e.code, RemoteErrorCode::Unauthorized);
                assert!(e.code.is_auth_error());
                assert_eq!(e.message, "session expired");
            }
            other => panic!("expected error response, got {other:?}"),
        }
    }

    #[test]
    fn classify_null_result_response() {
        let frame = serde_json::json!({"jsonrpc": "2.0", "id": 9, "result": null});
        match classify(&frame) {
            Some(Incoming::Response { id: 9, result: Ok(v) }) => assert!(v.is_null()),
            other => panic!("expected response, got {other:?}"),
        }
    }

    #[test]
    fn classify_server_request_and_notification() {
        let req = serde_json::json!({"jsonrpc": "2.0", "id": 1, "method": "client/ping"});
        assert!(matches!(
            classify(&req),
            Some(Incoming::ServerRequest { .. })
        ));

        let notif = serde_json::json!({"jsonrpc": "2.0", "method": "log", "params": {}});
        assert!(matches!(
            classify(&notif),
            Some(Incoming::Notification { .. })
        ));
    }

    #[test]
    fn classify_rejects_shapeless_frames() {
        assert!(classify(&serde_json::json!({"jsonrpc": "2.0"})).is_none());
        assert!(classify(&serde_json::json!({"id": 1})).is_none());
        // Non-integer response ids cannot match any pending request.
        assert!(classify(&serde_json::json!({"id": "abc", "result": 1})).is_none());
    }

    #[test]
    fn method_not_found_reply_shape() {
        let reply = method_not_found(&serde_json::json!(5), "client/registerCapability");
        assert_eq!(reply["id"], 5);
        assert_eq!(reply["error"]["code"], -32601);
        let msg = reply["error"]["message"].as_str().unwrap();
        assert!(msg.contains("client/registerCapability"));
    }

    #[test]
    fn remote_error_decodes_malformed_error_member() {
        let err = RemoteError::from_value(&serde_json::json!("just a string"));
        assert_eq!(err.code, RemoteErrorCode::Other(0));
        assert!(err.message.contains("just a string"));
    }

    #[test]
    fn error_codes_round_trip() {
        for code in [-32700, -32600, -32601, -32602, -32603, 1001, 1002, 1003, 1004, 1005, 1006, 1007, 4242] {
            assert_eq!(RemoteErrorCode::from_code(code).code(), code);
        }
    }
}
