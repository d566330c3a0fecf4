//! Chat completion types (OpenAI-compatible wire shape).

use bridge::ToolOutcome;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use super::InvalidArguments;

/// Role of a message participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A message in the conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    #[serde(default, deserialize_with = "nullable")]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(
        default,
        deserialize_with = "nullable",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub tool_calls: Vec<ToolCall>,
}

impl Message {
    /// Create a message with a role and text content.
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_call_id: None,
            name: None,
            tool_calls: Vec::new(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// Create a tool message answering the call `tool_call_id`.
    pub fn tool(
        tool_call_id: impl Into<String>,
        name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            tool_call_id: Some(tool_call_id.into()),
            name: Some(name.into()),
            ..Self::new(Role::Tool, content)
        }
    }

    /// Attach tool calls (assistant messages only).
    pub fn with_tool_calls(mut self, tool_calls: Vec<ToolCall>) -> Self {
        self.tool_calls = tool_calls;
        self
    }

    /// Whether the model asked for tools in this message.
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// A tool call requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type", default)]
    pub kind: CallKind,
    pub function: FunctionCall,
}

impl ToolCall {
    pub fn function(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            kind: CallKind::Function,
            function: FunctionCall {
                name: name.into(),
                arguments: arguments.into(),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallKind {
    #[default]
    Function,
}

/// Function name plus JSON-encoded arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    #[serde(default)]
    pub arguments: String,
}

impl FunctionCall {
    /// Decode the arguments into a JSON object.
    ///
    /// Blank arguments mean "no arguments" and decode to `{}`.
    pub fn parse_arguments(&self) -> Result<Value, InvalidArguments> {
        if self.arguments.trim().is_empty() {
            return Ok(Value::Object(Map::new()));
        }

        match serde_json::from_str(&self.arguments) {
            Ok(value @ Value::Object(_)) => Ok(value),
            Ok(other) => Err(InvalidArguments(format!(
                "expected a JSON object, got `{other}`"
            ))),
            Err(e) => Err(InvalidArguments(e.to_string())),
        }
    }
}

/// Result of executing one [`ToolCall`].
#[derive(Debug, Clone, PartialEq)]
pub struct ToolResult {
    pub tool_call_id: String,
    pub name: String,
    pub outcome: ToolOutcome,
}

impl ToolResult {
    pub fn new(call: &ToolCall, outcome: ToolOutcome) -> Self {
        Self {
            tool_call_id: call.id.clone(),
            name: call.function.name.clone(),
            outcome,
        }
    }

    /// The tool message fed back to the model.
    pub fn to_message(&self) -> Message {
        Message::tool(&self.tool_call_id, &self.name, self.outcome.to_content())
    }
}

/// Tool specification exposed to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    /// JSON Schema for the arguments object.
    pub parameters: Value,
}

/// How the model should choose tools.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ToolChoice {
    /// Model decides whether to use tools.
    #[default]
    Auto,
}

impl ToolChoice {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "auto",
        }
    }
}

/// Where a conversation stands in the two-call protocol.
#[derive(Debug, Clone, Copy)]
pub enum Phase<'a> {
    /// First call: the model sees the catalog and may request tools.
    AwaitingToolDecision {
        tools: &'a [ToolSpec],
        choice: ToolChoice,
    },
    /// Follow-up call: tool results are in, only a text answer is expected.
    AwaitingFinalAnswer,
}

/// Request sent to a [`ModelBackend`](super::ModelBackend).
#[derive(Debug, Clone, Copy)]
pub struct ModelRequest<'a> {
    pub messages: &'a [Message],
    pub phase: Phase<'a>,
}

impl<'a> ModelRequest<'a> {
    /// First-round request offering `tools` with automatic choice.
    pub fn tool_decision(messages: &'a [Message], tools: &'a [ToolSpec]) -> Self {
        Self {
            messages,
            phase: Phase::AwaitingToolDecision {
                tools,
                choice: ToolChoice::Auto,
            },
        }
    }

    /// Follow-up request without tools.
    pub fn final_answer(messages: &'a [Message]) -> Self {
        Self {
            messages,
            phase: Phase::AwaitingFinalAnswer,
        }
    }

    /// Tools offered in this request.
    pub fn tools(&self) -> &'a [ToolSpec] {
        match self.phase {
            Phase::AwaitingToolDecision { tools, .. } => tools,
            Phase::AwaitingFinalAnswer => &[],
        }
    }

    pub fn tool_choice(&self) -> Option<ToolChoice> {
        match self.phase {
            Phase::AwaitingToolDecision { choice, .. } => Some(choice),
            Phase::AwaitingFinalAnswer => None,
        }
    }
}

// Providers send `null` for absent content and tool calls.
fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
