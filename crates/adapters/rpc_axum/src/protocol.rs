//! Wire message shapes for the streaming RPC protocol.
//!
//! One request may be answered by one `reply`, or by a sequence of `item`
//! messages closed by exactly one `end`. A failure at any point replaces
//! the remaining messages with a single `error`; `error` and `end` are
//! mutually exclusive terminal states.

use serde::{Deserialize, Serialize};

/// A method invocation sent by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcRequest {
    /// Caller-chosen id echoed on every response to this call.
    pub request_id: String,
    /// Dot-joined method name, e.g. `automations.list`.
    pub method: String,
    /// Ordered argument list.
    #[serde(default)]
    pub args: Option<Vec<serde_json::Value>>,
}

/// Discriminator of a response message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseKind {
    /// The single result of a non-streaming call. Terminal.
    Reply,
    /// One element of a streaming call's result sequence.
    Item,
    /// Successful completion of a streaming call. Terminal.
    End,
    /// The call failed; carries a human-readable reason. Terminal.
    Error,
}

impl ResponseKind {
    /// Whether this message ends the call.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Item)
    }
}

/// A server-to-client message correlated to one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcResponse {
    pub request_id: String,
    #[serde(rename = "type")]
    pub kind: ResponseKind,
    pub object: serde_json::Value,
}

impl RpcResponse {
    #[must_use]
    pub fn reply(request_id: impl Into<String>, object: serde_json::Value) -> Self {
        Self {
            request_id: request_id.into(),
            kind: ResponseKind::Reply,
            object,
        }
    }

    #[must_use]
    pub fn item(request_id: impl Into<String>, object: serde_json::Value) -> Self {
        Self {
            request_id: request_id.into(),
            kind: ResponseKind::Item,
            object,
        }
    }

    #[must_use]
    pub fn end(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            kind: ResponseKind::End,
            object: serde_json::Value::Null,
        }
    }

    #[must_use]
    pub fn error(request_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            kind: ResponseKind::Error,
            object: serde_json::Value::String(message.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_deserialize_request_with_wire_field_names() {
        let request: RpcRequest = serde_json::from_str(
            r#"{"requestId": "7", "method": "logs.recent", "args": [50]}"#,
        )
        .unwrap();
        assert_eq!(request.request_id, "7");
        assert_eq!(request.method, "logs.recent");
        assert_eq!(request.args, Some(vec![serde_json::json!(50)]));
    }

    #[test]
    fn should_accept_request_without_args() {
        let request: RpcRequest =
            serde_json::from_str(r#"{"requestId": "7", "method": "automations.list"}"#).unwrap();
        assert_eq!(request.args, None);
    }

    #[test]
    fn should_serialize_response_with_type_tag() {
        let json = serde_json::to_value(RpcResponse::item("7", serde_json::json!(3))).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"requestId": "7", "type": "item", "object": 3})
        );
    }

    #[test]
    fn should_mark_only_item_as_non_terminal() {
        assert!(!ResponseKind::Item.is_terminal());
        assert!(ResponseKind::Reply.is_terminal());
        assert!(ResponseKind::End.is_terminal());
        assert!(ResponseKind::Error.is_terminal());
    }
}
