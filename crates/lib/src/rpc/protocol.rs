//! signal-cli JSON-RPC wire types and the line frame decoder.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub const JSONRPC_VERSION: &str = "2.0";

/// Method name of the notification signal-cli pushes for every received envelope.
pub const METHOD_RECEIVE: &str = "receive";

/// Method name of the attachment download request.
pub const METHOD_GET_ATTACHMENT: &str = "getAttachment";

/// Outbound request: `{ "jsonrpc": "2.0", "method", "params", "id" }`.
#[derive(Debug, Clone, Serialize)]
pub struct RpcRequest {
    pub jsonrpc: String,
    pub method: String,
    pub params: Value,
    pub id: String,
}

impl RpcRequest {
    pub fn new(method: impl Into<String>, params: Value, id: impl Into<String>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.into(),
            params,
            id: id.into(),
        }
    }

    /// Build a `getAttachment` request addressed by attachment id and group id.
    pub fn get_attachment(
        request_id: impl Into<String>,
        attachment_id: &str,
        group_id: Option<&str>,
    ) -> Self {
        let params = json!({ "id": attachment_id, "groupId": group_id });
        Self::new(METHOD_GET_ATTACHMENT, params, request_id)
    }

    /// Serialize as one line of JSON (no trailing newline).
    pub fn to_line(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// JSON-RPC error object carried by a failed response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RpcError {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
}

/// A classified inbound line.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Pushed event; carries `method`.
    Notification { method: String, params: Value },
    /// Answer to one of our requests; carries `id` and no `method`.
    Response {
        id: String,
        result: Option<Value>,
        error: Option<RpcError>,
    },
    /// Valid JSON with neither `method` nor `id`.
    Unrecognized { raw: Value },
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
}

/// Classify one line. `method` wins over `id`; `null` values count as absent.
pub fn decode_frame(line: &str) -> Result<Frame, FrameError> {
    let mut value: Value = serde_json::from_str(line)?;
    let Some(obj) = value.as_object_mut() else {
        return Ok(Frame::Unrecognized { raw: value });
    };

    if let Some(method) = obj.get("method").and_then(Value::as_str).map(str::to_string) {
        let params = obj.remove("params").unwrap_or(Value::Null);
        return Ok(Frame::Notification { method, params });
    }

    let id = match obj.get("id") {
        Some(Value::String(s)) => Some(s.clone()),
        // signal-cli echoes whatever id we sent; we only ever send strings, but
        // keep numeric ids correlatable rather than dropping them.
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    };
    match id {
        Some(id) => {
            let result = obj.remove("result").filter(|v| !v.is_null());
            let error = obj
                .remove("error")
                .filter(|v| !v.is_null())
                .and_then(|v| serde_json::from_value(v).ok());
            Ok(Frame::Response { id, result, error })
        }
        None => Ok(Frame::Unrecognized { raw: value }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_makes_notification() {
        let f = decode_frame(r#"{"jsonrpc":"2.0","method":"receive","params":{"envelope":{}}}"#)
            .unwrap();
        assert_eq!(
            f,
            Frame::Notification {
                method: "receive".to_string(),
                params: json!({"envelope": {}}),
            }
        );
    }

    #[test]
    fn method_wins_over_id() {
        let f = decode_frame(r#"{"method":"receive","id":"x"}"#).unwrap();
        assert!(matches!(f, Frame::Notification { ref method, .. } if method == "receive"));
    }

    #[test]
    fn id_without_method_is_response() {
        let f = decode_frame(r#"{"jsonrpc":"2.0","id":"17a1","result":{"data":"WA=="}}"#).unwrap();
        match f {
            Frame::Response { id, result, error } => {
                assert_eq!(id, "17a1");
                assert_eq!(result, Some(json!({"data": "WA=="})));
                assert!(error.is_none());
            }
            other => panic!("expected response, got {:?}", other),
        }
    }

    #[test]
    fn response_with_error_object() {
        let f = decode_frame(r#"{"id":"r1","error":{"code":-1,"message":"gone"}}"#).unwrap();
        match f {
            Frame::Response { result, error, .. } => {
                assert!(result.is_none());
                assert_eq!(error.map(|e| e.message), Some("gone".to_string()));
            }
            other => panic!("expected response, got {:?}", other),
        }
    }

    #[test]
    fn null_result_is_absent() {
        let f = decode_frame(r#"{"id":"r1","result":null}"#).unwrap();
        assert!(matches!(f, Frame::Response { result: None, .. }));
    }

    #[test]
    fn neither_method_nor_id_is_unrecognized() {
        let f = decode_frame(r#"{"jsonrpc":"2.0","foo":1}"#).unwrap();
        assert!(matches!(f, Frame::Unrecognized { .. }));
        let f = decode_frame("[1,2]").unwrap();
        assert!(matches!(f, Frame::Unrecognized { .. }));
    }

    #[test]
    fn malformed_json_is_error() {
        assert!(decode_frame("{not json").is_err());
    }

    #[test]
    fn get_attachment_request_shape() {
        let req = RpcRequest::get_attachment("1700000000000a1", "a1", Some("G1"));
        let v: Value = serde_json::from_str(&req.to_line().unwrap()).unwrap();
        assert_eq!(
            v,
            json!({
                "jsonrpc": "2.0",
                "method": "getAttachment",
                "params": {"id": "a1", "groupId": "G1"},
                "id": "1700000000000a1"
            })
        );
    }
}
