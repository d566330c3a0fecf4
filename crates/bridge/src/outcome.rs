//! Tool outcome payloads.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Result of one tool invocation as seen by the model.
///
/// The payload is opaque: whatever JSON the tool service answered with, or
/// `{"error": "..."}` when the invocation could not complete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ToolOutcome(pub Value);

impl ToolOutcome {
    /// Wrap a payload returned by the tool service.
    pub fn new(payload: Value) -> Self {
        Self(payload)
    }

    /// Create an error outcome.
    pub fn error(message: impl Into<String>) -> Self {
        Self(json!({ "error": message.into() }))
    }

    /// Whether the payload carries an `error` field.
    ///
    /// Application-level failures reported by the service
    /// (`{"success": false, "error": ...}`) count as errors too.
    pub fn is_error(&self) -> bool {
        self.0.get("error").is_some()
    }

    /// The payload itself.
    pub fn payload(&self) -> &Value {
        &self.0
    }

    /// JSON-encode the payload for a tool message.
    pub fn to_content(&self) -> String {
        self.0.to_string()
    }
}
