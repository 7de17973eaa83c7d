use serde_json::{json, Map, Value};

/// One payload of the chat stream
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Incremental assistant text
    Text { content: String },
    /// Incremental reasoning text
    Reasoning { content: String },
    /// A tool invocation has begun. The id may be absent when decoded from a lenient producer.
    ToolCallStart {
        tool_call_id: Option<String>,
        tool_name: String,
        input: Value,
    },
    /// A tool invocation has concluded
    ToolCallResult {
        tool_call_id: String,
        result: Value,
        is_error: bool,
        error: Option<String>,
    },
    /// Terminal failure of the turn
    Error { message: String },
    /// Always the last payload of a well-formed stream
    Done,
}

impl StreamEvent {
    pub fn text<S: Into<String>>(content: S) -> Self {
        StreamEvent::Text {
            content: content.into(),
        }
    }

    pub fn reasoning<S: Into<String>>(content: S) -> Self {
        StreamEvent::Reasoning {
            content: content.into(),
        }
    }

    pub fn error<S: Into<String>>(message: S) -> Self {
        StreamEvent::Error {
            message: message.into(),
        }
    }

    pub fn tool_call_start<I: Into<String>, N: Into<String>>(id: I, name: N, input: Value) -> Self {
        StreamEvent::ToolCallStart {
            tool_call_id: Some(id.into()),
            tool_name: name.into(),
            input,
        }
    }

    /// Build a result event from a tool output, flagging it as an error when the
    /// output carries an `error` field.
    pub fn tool_call_result<I: Into<String>>(id: I, result: Value) -> Self {
        let error = match result.get("error") {
            Some(Value::String(message)) => Some(message.clone()),
            Some(Value::Null) | None => None,
            Some(other) => Some(other.to_string()),
        };
        StreamEvent::ToolCallResult {
            tool_call_id: id.into(),
            result,
            is_error: error.is_some(),
            error,
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, StreamEvent::Done)
    }

    pub fn to_json(&self) -> Value {
        match self {
            StreamEvent::Text { content } => json!({"type": "text", "content": content}),
            StreamEvent::Reasoning { content } => json!({"type": "reasoning", "content": content}),
            StreamEvent::ToolCallStart {
                tool_call_id,
                tool_name,
                input,
            } => {
                let mut payload = json!({
                    "type": "tool_call_start",
                    "toolName": tool_name,
                    "input": input,
                });
                if let Some(id) = tool_call_id {
                    payload["toolCallId"] = json!(id);
                }
                payload
            }
            StreamEvent::ToolCallResult {
                tool_call_id,
                result,
                is_error,
                error,
            } => {
                let mut payload = json!({
                    "type": "tool_call_result",
                    "toolCallId": tool_call_id,
                    "result": result,
                    "isError": is_error,
                });
                if let Some(error) = error {
                    payload["error"] = json!(error);
                }
                payload
            }
            StreamEvent::Error { message } => json!({"error": message}),
            StreamEvent::Done => json!({"done": true}),
        }
    }

    /// Interpret a decoded payload.
    ///
    /// Accepts the aliases older producers emit (`tool-call-start`, `tool_result`,
    /// `id`/`name`/`output`/`text`). Returns None for payloads that carry no event.
    pub fn from_json(value: &Value) -> Option<Self> {
        let object = value.as_object()?;

        if let Some(kind) = object.get("type").and_then(Value::as_str) {
            return match kind {
                "text" => Some(StreamEvent::Text {
                    content: first_str(object, &["content", "text"])?,
                }),
                "reasoning" => Some(StreamEvent::Reasoning {
                    content: first_str(object, &["text", "content"])?,
                }),
                "tool_call_start" | "tool-call-start" => Some(StreamEvent::ToolCallStart {
                    tool_call_id: first_str(object, &["toolCallId", "id"]),
                    tool_name: first_str(object, &["toolName", "name"])
                        .unwrap_or_else(|| "unknown".to_string()),
                    input: object
                        .get("input")
                        .filter(|input| !input.is_null())
                        .cloned()
                        .unwrap_or_else(|| json!({})),
                }),
                "tool_call_result" | "tool-call-result" | "tool_result" => {
                    let tool_call_id = first_str(object, &["toolCallId", "id"])?;
                    let result = ["result", "output"]
                        .iter()
                        .find_map(|key| object.get(*key).filter(|v| !v.is_null()))
                        .cloned()
                        .unwrap_or(Value::Null);
                    let error = first_str(object, &["error", "errorText"]);
                    let is_error = object
                        .get("isError")
                        .and_then(Value::as_bool)
                        .unwrap_or(false)
                        || error.is_some();
                    Some(StreamEvent::ToolCallResult {
                        tool_call_id,
                        result,
                        is_error,
                        error,
                    })
                }
                _ => None,
            };
        }

        if let Some(error) = object.get("error").filter(|e| !e.is_null()) {
            let message = match error {
                Value::String(message) => message.clone(),
                other => other.to_string(),
            };
            return Some(StreamEvent::Error { message });
        }

        if object.get("done").and_then(Value::as_bool) == Some(true) {
            return Some(StreamEvent::Done);
        }

        None
    }

    /// Frame the payload as one server-sent event
    pub fn encode(&self) -> String {
        format!("data: {}\n\n", self.to_json())
    }
}

fn first_str(object: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|key| object.get(*key).and_then(Value::as_str))
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
