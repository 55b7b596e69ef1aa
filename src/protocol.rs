//! JSON-RPC 2.0 envelopes.
//! <https://www.jsonrpc.org/specification>

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::{McpError, Result};
use crate::sse;

pub const JSONRPC_VERSION: &str = "2.0";

/// Correlation id of an outgoing request. Fresh UUIDv4 per call.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    pub fn new_v4() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Key for a reply id as found on the wire. Numeric ids keep their textual form.
    pub fn from_wire(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(Self(s.clone())),
            Value::Number(n) => Some(Self(n.to_string())),
            _ => None,
        }
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RequestId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Outgoing request envelope.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RpcRequest {
    pub jsonrpc: &'static str,
    pub method: String,
    pub id: RequestId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl RpcRequest {
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            method: method.into(),
            id: RequestId::new_v4(),
            params,
        }
    }
}

/// Error object carried by a failed reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcErrorObject {
    pub code: i64,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Incoming reply envelope.
///
/// `result` is `Some(Value::Null)` when the server sent `"result": null`
/// and `None` when the member is absent.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RpcReply {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default, deserialize_with = "present")]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<RpcErrorObject>,
}

fn present<'de, D>(deserializer: D) -> std::result::Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

impl RpcReply {
    /// Decode a reply from a JSON object. Objects without an `id` are not replies.
    pub fn from_value(value: Value) -> Result<Self> {
        if value.get("id").is_none() {
            return Err(McpError::ProtocolDecode(
                "message carries no id and is not a reply".into(),
            ));
        }
        serde_json::from_value(value)
            .map_err(|e| McpError::ProtocolDecode(format!("malformed JSON-RPC reply: {e}")))
    }

    pub fn request_id(&self) -> Option<RequestId> {
        self.id.as_ref().and_then(RequestId::from_wire)
    }

    /// Turn the reply into the call outcome.
    pub fn into_result(self) -> Result<Value> {
        if let Some(error) = self.error {
            return Err(McpError::Rpc {
                code: error.code,
                message: error.message,
                data: error.data,
            });
        }
        self.result.ok_or_else(|| {
            McpError::ProtocolDecode("reply carries neither result nor error".into())
        })
    }
}

/// Extract the reply to `id` from a synchronous POST body.
///
/// The body may be SSE-framed or a bare JSON object. Among several frames
/// the one whose id matches wins, then the first carrying a result or error.
pub fn reply_from_body(body: &str, id: &RequestId) -> Result<RpcReply> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return Err(McpError::ProtocolDecode("empty response body".into()));
    }

    let mut candidates: Vec<Value> = if trimmed.starts_with('{') {
        vec![serde_json::from_str(trimmed)
            .map_err(|e| McpError::ProtocolDecode(format!("malformed JSON body: {e}")))?]
    } else {
        let frames = sse::parse_frames(trimmed);
        let mut values = Vec::with_capacity(frames.len());
        for frame in frames {
            match serde_json::from_str::<Value>(&frame.data) {
                Ok(value) if value.is_object() => values.push(value),
                Ok(_) => {}
                Err(e) => tracing::debug!(error = %e, "skipping undecodable frame in reply body"),
            }
        }
        values
    };

    let is_reply = |v: &Value| v.get("result").is_some() || v.get("error").is_some();
    let chosen = candidates
        .iter()
        .position(|v| v.get("id").and_then(RequestId::from_wire).as_ref() == Some(id))
        .or_else(|| candidates.iter().position(is_reply))
        .ok_or_else(|| {
            McpError::ProtocolDecode("response body contains no JSON-RPC reply".into())
        })?;

    serde_json::from_value(candidates.swap_remove(chosen))
        .map_err(|e| McpError::ProtocolDecode(format!("malformed JSON-RPC reply: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn request_serializes_without_absent_params() {
        let request = RpcRequest::new("tools/list", None);
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["jsonrpc"], "2.0");
        assert_eq!(value["method"], "tools/list");
        assert_eq!(value["id"], json!(request.id.as_str()));
        assert!(value.get("params").is_none());
    }

    #[test]
    fn request_ids_are_unique() {
        let a = RpcRequest::new("tools/list", None);
        let b = RpcRequest::new("tools/list", None);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn null_result_is_a_result() {
        let reply = RpcReply::from_value(json!({"jsonrpc": "2.0", "id": "a", "result": null})).unwrap();
        assert_eq!(reply.into_result().unwrap(), Value::Null);
    }

    #[test]
    fn missing_result_and_error_is_decode_error() {
        let reply = RpcReply::from_value(json!({"id": "a"})).unwrap();
        assert!(matches!(reply.into_result(), Err(McpError::ProtocolDecode(_))));
    }

    #[test]
    fn error_reply_maps_to_rpc_error() {
        let reply = RpcReply::from_value(json!({
            "id": "a",
            "error": {"code": -32601, "message": "method not found"}
        }))
        .unwrap();
        match reply.into_result() {
            Err(McpError::Rpc { code, message, .. }) => {
                assert_eq!(code, -32601);
                assert_eq!(message, "method not found");
            }
            other => panic!("expected rpc error, got {other:?}"),
        }
    }

    #[test]
    fn object_without_id_is_not_a_reply() {
        let err = RpcReply::from_value(json!({"method": "notifications/progress"})).unwrap_err();
        assert!(matches!(err, McpError::ProtocolDecode(_)));
    }

    #[test]
    fn numeric_reply_id_keeps_text_form() {
        let reply = RpcReply::from_value(json!({"id": 7, "result": {}})).unwrap();
        assert_eq!(reply.request_id(), Some(RequestId::from("7")));
    }

    #[test]
    fn body_prefers_matching_frame() {
        let id = RequestId::from("want");
        let body = "event: message\ndata: {\"id\":\"other\",\"result\":1}\n\n\
                    event: message\ndata: {\"id\":\"want\",\"result\":2}\n\n";
        let reply = reply_from_body(body, &id).unwrap();
        assert_eq!(reply.into_result().unwrap(), json!(2));
    }

    #[test]
    fn body_accepts_bare_json() {
        let id = RequestId::from("x");
        let reply = reply_from_body(r#"{"jsonrpc":"2.0","id":"x","result":{"ok":true}}"#, &id).unwrap();
        assert_eq!(reply.into_result().unwrap(), json!({"ok": true}));
    }

    #[test]
    fn empty_or_garbage_body_is_decode_error() {
        let id = RequestId::from("x");
        assert!(matches!(reply_from_body("   ", &id), Err(McpError::ProtocolDecode(_))));
        assert!(matches!(
            reply_from_body("data: not json\n\n", &id),
            Err(McpError::ProtocolDecode(_))
        ));
        assert!(matches!(reply_from_body("{oops", &id), Err(McpError::ProtocolDecode(_))));
    }
}
