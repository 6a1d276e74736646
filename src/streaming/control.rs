//! Structured messages the transport interleaves with content

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

/// Stream lifecycle messages, discriminated by their `type` field
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ControlMessage {
    /// Heartbeat without content
    Keepalive,
    /// The transport is live
    Connected {
        #[serde(default, rename = "sessionId")]
        session_id: Option<String>,
    },
    /// End of the current turn
    Completion {
        #[serde(default)]
        reason: Option<String>,
    },
    /// The backend failed while producing the turn
    Error {
        #[serde(default)]
        message: Option<Value>,
        #[serde(default)]
        error: Option<Value>,
    },
}

impl ControlMessage {
    /// Human readable text of an `error` message
    pub fn error_text(&self) -> Option<String> {
        match self {
            ControlMessage::Error { message, error } => Some(
                message
                    .as_ref()
                    .or(error.as_ref())
                    .and_then(value_text)
                    .unwrap_or_else(|| "Server error".to_string()),
            ),
            _ => None,
        }
    }

    pub fn is_stop(&self) -> bool {
        matches!(self, ControlMessage::Completion { reason } if reason.as_deref() == Some("stop"))
    }
}

fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) if text.is_empty() => None,
        Value::String(text) => Some(text.clone()),
        other => Some(other.to_string()),
    }
}

/// A complete unit pulled out of the chunk buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractedUnit {
    Control(ControlMessage),
    /// Text carried by a content object
    Content(String),
    /// Literal text found between objects, passed through verbatim
    Text(String),
}

/// Result of classifying one parsed object
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Classified {
    Control(ControlMessage),
    Content(String),
    /// A content-shaped object that carried no text (e.g. a role-only delta)
    Empty,
}

const CONTROL_TYPES: [&str; 4] = ["keepalive", "connected", "completion", "error"];

/// Classify a parsed object. `raw` is the original source text of the object
/// and is used verbatim when the object has no recognizable shape.
pub(crate) fn classify(value: Value, raw: &str) -> Classified {
    let is_control_type = value
        .get("type")
        .and_then(Value::as_str)
        .is_some_and(|kind| CONTROL_TYPES.contains(&kind));

    if is_control_type {
        match serde_json::from_value::<ControlMessage>(value.clone()) {
            Ok(ControlMessage::Completion { reason }) if reason.as_deref() != Some("stop") => {
                debug!("Completion with reason {:?} is not a stop signal", reason);
            }
            Ok(message) => return Classified::Control(message),
            Err(err) => debug!("Malformed control message '{}': {}", raw, err),
        }
    }

    if let Some(content) = value.get("content").and_then(Value::as_str) {
        return text_or_empty(content);
    }

    if let Some(choice) = value
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|choices| choices.first())
    {
        if let Some(delta) = choice.get("delta") {
            return match delta.get("content").and_then(Value::as_str) {
                Some(content) => text_or_empty(content),
                None => Classified::Empty,
            };
        }
        if let Some(content) = choice.get("content").and_then(Value::as_str) {
            return text_or_empty(content);
        }
    }

    Classified::Content(raw.to_string())
}

fn text_or_empty(text: &str) -> Classified {
    if text.is_empty() {
        Classified::Empty
    } else {
        Classified::Content(text.to_string())
    }
}
