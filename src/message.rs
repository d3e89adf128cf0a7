//! Inbound message classification.
//!
//! The agent interleaves unsolicited notifications (objects with a
//! `method` key) with responses to our requests (objects with a `result`
//! key). Each parsed message is resolved once into an [`RpcMessage`].
//!
//! Presence is checked by key membership, not value: `"result": null` is
//! still a response. When an object carries both keys, the result wins,
//! since a response is what ends a pending request.

use serde_json::Value;

/// Params flag marking a streaming chat update.
pub const IN_PROGRESS_FLAG: &str = "isMessageInProgress";

/// Returns true if the message is a notification.
///
/// True when `method` is a string and no `result` key is present, which is
/// exactly when [`RpcMessage::classify`] yields a notification.
pub fn has_notification(msg: &Value) -> bool {
    extract_method(msg).is_some() && !has_result(msg)
}

/// Returns true if the message carries a `result` key.
pub fn has_result(msg: &Value) -> bool {
    msg.get("result").is_some()
}

/// Extract the method name, if present and a string.
pub fn extract_method(msg: &Value) -> Option<&str> {
    msg.get("method").and_then(Value::as_str)
}

/// Extract the result value, if the key is present.
pub fn extract_result(msg: &Value) -> Option<&Value> {
    msg.get("result")
}

/// A server-initiated notification.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    /// Notification method, e.g. `chat/updateMessageInProgress`.
    pub method: String,
    /// Optional params payload.
    pub params: Option<Value>,
}

impl Notification {
    /// Whether this notification is an in-flight streaming update.
    pub fn is_in_progress(&self) -> bool {
        self.params
            .as_ref()
            .and_then(|p| p.get(IN_PROGRESS_FLAG))
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

/// An inbound message, classified once at parse time.
#[derive(Debug, Clone, PartialEq)]
pub enum RpcMessage {
    /// Carries a `method` (and no `result`).
    Notification(Notification),
    /// Carries a `result`.
    Response {
        /// The result payload, possibly `null`.
        result: Value,
    },
    /// Neither a notification nor a response.
    Unrecognized {
        /// The message as received.
        raw: Value,
    },
}

impl RpcMessage {
    /// Classify a parsed JSON message.
    ///
    /// A `method` that is not a string makes the message `Unrecognized`.
    pub fn classify(msg: Value) -> Self {
        let mut obj = match msg {
            Value::Object(obj) => obj,
            other => return RpcMessage::Unrecognized { raw: other },
        };

        if let Some(result) = obj.remove("result") {
            return RpcMessage::Response { result };
        }

        match obj.remove("method") {
            Some(Value::String(method)) => {
                let params = obj.remove("params");
                RpcMessage::Notification(Notification { method, params })
            }
            Some(other) => {
                obj.insert("method".to_string(), other);
                RpcMessage::Unrecognized {
                    raw: Value::Object(obj),
                }
            }
            None => RpcMessage::Unrecognized {
                raw: Value::Object(obj),
            },
        }
    }

    /// Get the method name for notifications.
    pub fn method(&self) -> Option<&str> {
        match self {
            RpcMessage::Notification(n) => Some(&n.method),
            _ => None,
        }
    }

    /// Get the result for responses.
    pub fn result(&self) -> Option<&Value> {
        match self {
            RpcMessage::Response { result } => Some(result),
            _ => None,
        }
    }

    /// Check if this is a response.
    #[inline]
    pub fn is_response(&self) -> bool {
        matches!(self, RpcMessage::Response { .. })
    }
}

impl From<Value> for RpcMessage {
    fn from(msg: Value) -> Self {
        RpcMessage::classify(msg)
    }
}
