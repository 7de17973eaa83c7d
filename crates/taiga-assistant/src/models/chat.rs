use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::role::Role;

/// Lifecycle of a tool invocation as seen by the client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ToolCallState {
    InputStreaming,
    InputAvailable,
    OutputAvailable,
    OutputError,
}

impl ToolCallState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ToolCallState::OutputAvailable | ToolCallState::OutputError
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallPart {
    pub tool_call_id: String,
    pub tool_name: String,
    pub input: Value,
    pub state: ToolCallState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_text: Option<String>,
}

impl ToolCallPart {
    pub fn new<I: Into<String>, N: Into<String>>(tool_call_id: I, tool_name: N, input: Value) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            tool_name: tool_name.into(),
            input,
            state: ToolCallState::InputAvailable,
            output: None,
            error_text: None,
        }
    }

    /// Record the outcome of the invocation.
    ///
    /// Returns false and leaves the part untouched when it already holds a result,
    /// so a part never moves backwards or gets resolved twice.
    pub fn resolve(&mut self, output: Value, is_error: bool, error: Option<String>) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        if is_error {
            self.state = ToolCallState::OutputError;
            self.error_text = Some(error.unwrap_or_else(|| error_text_from(&output)));
        } else {
            self.state = ToolCallState::OutputAvailable;
        }
        self.output = Some(output);
        true
    }
}

fn error_text_from(output: &Value) -> String {
    match output.get("error") {
        Some(Value::String(message)) => message.clone(),
        Some(other) => other.to_string(),
        None => "Tool execution failed".to_string(),
    }
}

/// One contiguous segment of a message, in render order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Part {
    Text { text: String },
    Reasoning { text: String },
    ToolCall(ToolCallPart),
}

impl Part {
    pub fn as_tool_call(&self) -> Option<&ToolCallPart> {
        match self {
            Part::ToolCall(part) => Some(part),
            _ => None,
        }
    }
}

/// A conversational turn as rebuilt by the client and kept in the transcript
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub role: Role,
    pub content: String,
    #[serde(default)]
    pub parts: Vec<Part>,
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    /// A complete user turn
    pub fn user<S: Into<String>>(content: S) -> Self {
        let content = content.into();
        Self {
            id: Uuid::new_v4().to_string(),
            role: Role::User,
            parts: vec![Part::Text {
                text: content.clone(),
            }],
            content,
            created_at: Utc::now(),
        }
    }

    /// An empty assistant turn, filled in while streaming
    pub fn assistant() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role: Role::Assistant,
            content: String::new(),
            parts: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Append a text delta, merging into the trailing text part when there is one
    pub fn append_text(&mut self, delta: &str) {
        self.content.push_str(delta);
        match self.parts.last_mut() {
            Some(Part::Text { text }) => text.push_str(delta),
            _ => self.parts.push(Part::Text {
                text: delta.to_string(),
            }),
        }
    }

    /// Append a reasoning delta. Reasoning never merges into text and vice versa.
    pub fn append_reasoning(&mut self, delta: &str) {
        match self.parts.last_mut() {
            Some(Part::Reasoning { text }) => text.push_str(delta),
            _ => self.parts.push(Part::Reasoning {
                text: delta.to_string(),
            }),
        }
    }

    /// Append a tool-call part and return its position
    pub fn push_tool_call(&mut self, part: ToolCallPart) -> usize {
        self.parts.push(Part::ToolCall(part));
        self.parts.len() - 1
    }

    pub fn tool_call_mut(&mut self, index: usize) -> Option<&mut ToolCallPart> {
        match self.parts.get_mut(index) {
            Some(Part::ToolCall(part)) => Some(part),
            _ => None,
        }
    }

    pub fn tool_calls(&self) -> impl Iterator<Item = &ToolCallPart> {
        self.parts.iter().filter_map(Part::as_tool_call)
    }
}
