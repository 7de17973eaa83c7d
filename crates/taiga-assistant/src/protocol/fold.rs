use std::collections::HashMap;

use tracing::debug;
use uuid::Uuid;

use super::{ProtocolError, StreamEvent};
use crate::models::chat::{ChatMessage, ToolCallPart};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FoldOutcome {
    /// More events are expected
    Continue,
    /// The stream delivered its closing marker
    Done,
}

/// Folds decoded stream events into the in-flight assistant message.
///
/// Tool results are matched to their start event strictly by invocation id, so two
/// concurrent calls to the same tool each receive their own result.
#[derive(Debug)]
pub struct MessageAssembler {
    message: ChatMessage,
    tool_calls: HashMap<String, usize>,
}

impl MessageAssembler {
    pub fn new(message: ChatMessage) -> Self {
        Self {
            message,
            tool_calls: HashMap::new(),
        }
    }

    pub fn message(&self) -> &ChatMessage {
        &self.message
    }

    pub fn into_message(self) -> ChatMessage {
        self.message
    }

    /// Apply one event. An error payload is returned as `ProtocolError::Remote`
    /// and leaves the message untouched.
    pub fn apply(&mut self, event: StreamEvent) -> Result<FoldOutcome, ProtocolError> {
        match event {
            StreamEvent::Text { content } => {
                if !content.is_empty() {
                    self.message.append_text(&content);
                }
            }
            StreamEvent::Reasoning { content } => {
                if !content.is_empty() {
                    self.message.append_reasoning(&content);
                }
            }
            StreamEvent::ToolCallStart {
                tool_call_id,
                tool_name,
                input,
            } => {
                let id = tool_call_id.unwrap_or_else(|| Uuid::new_v4().to_string());
                let index = self
                    .message
                    .push_tool_call(ToolCallPart::new(id.clone(), tool_name, input));
                self.tool_calls.insert(id, index);
            }
            StreamEvent::ToolCallResult {
                tool_call_id,
                result,
                is_error,
                error,
            } => {
                let part = self
                    .tool_calls
                    .get(&tool_call_id)
                    .copied()
                    .and_then(|index| self.message.tool_call_mut(index));
                match part {
                    Some(part) => {
                        part.resolve(result, is_error, error);
                    }
                    None => debug!(%tool_call_id, "result for unknown tool call"),
                }
            }
            StreamEvent::Error { message } => return Err(ProtocolError::Remote(message)),
            StreamEvent::Done => return Ok(FoldOutcome::Done),
        }
        Ok(FoldOutcome::Continue)
    }
}

/// Fold one event into a message, returning the updated message
pub fn fold(message: ChatMessage, event: StreamEvent) -> Result<ChatMessage, ProtocolError> {
    let mut assembler = MessageAssembler::new(message);
    // rebuild the correlation map from the parts already present
    for (index, part) in assembler.message.parts.iter().enumerate() {
        if let Some(call) = part.as_tool_call() {
            assembler.tool_calls.insert(call.tool_call_id.clone(), index);
        }
    }
    assembler.apply(event)?;
    Ok(assembler.into_message())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::chat::{Part, ToolCallState};
    use serde_json::json;

    fn assembler() -> MessageAssembler {
        MessageAssembler::new(ChatMessage::assistant())
    }

    #[test]
    fn test_text_deltas_concatenate_into_one_part() {
        let mut assembler = assembler();
        let deltas = ["The ", "project ", "list", ":"];
        for delta in deltas {
            assert_eq!(
                assembler.apply(StreamEvent::text(delta)).unwrap(),
                FoldOutcome::Continue
            );
        }
        let message = assembler.message();
        assert_eq!(message.parts.len(), 1);
        assert_eq!(message.content, deltas.concat());
    }

    #[test]
    fn test_text_reasoning_text_gives_three_parts() {
        let mut assembler = assembler();
        assembler.apply(StreamEvent::text("a")).unwrap();
        assembler.apply(StreamEvent::reasoning("r")).unwrap();
        assembler.apply(StreamEvent::text("b")).unwrap();

        let parts = &assembler.message().parts;
        assert_eq!(parts.len(), 3);
        assert!(matches!(parts[0], Part::Text { .. }));
        assert!(matches!(parts[1], Part::Reasoning { .. }));
        assert!(matches!(parts[2], Part::Text { .. }));
    }

    #[test]
    fn test_results_correlate_by_id_for_same_tool() {
        let mut assembler = assembler();
        assembler
            .apply(StreamEvent::tool_call_start("a", "get_task", json!({"taskId": 1})))
            .unwrap();
        assembler
            .apply(StreamEvent::tool_call_start("b", "get_task", json!({"taskId": 2})))
            .unwrap();
        assembler
            .apply(StreamEvent::tool_call_result("b", json!({"id": 2})))
            .unwrap();

        let calls: Vec<_> = assembler.message().tool_calls().cloned().collect();
        assert_eq!(calls[0].state, ToolCallState::InputAvailable);
        assert_eq!(calls[0].output, None);
        assert_eq!(calls[1].state, ToolCallState::OutputAvailable);
        assert_eq!(calls[1].output, Some(json!({"id": 2})));

        assembler
            .apply(StreamEvent::tool_call_result("a", json!({"error": "Not found"})))
            .unwrap();
        let first = assembler.message().tool_calls().next().unwrap().clone();
        assert_eq!(first.state, ToolCallState::OutputError);
        assert_eq!(first.error_text.as_deref(), Some("Not found"));
    }

    #[test]
    fn test_unknown_result_is_ignored() {
        let mut assembler = assembler();
        assembler.apply(StreamEvent::text("x")).unwrap();
        let before = assembler.message().clone();
        assembler
            .apply(StreamEvent::tool_call_result("missing", json!({})))
            .unwrap();
        assert_eq!(assembler.message(), &before);
    }

    #[test]
    fn test_start_without_id_gets_one() {
        let mut assembler = assembler();
        assembler
            .apply(StreamEvent::ToolCallStart {
                tool_call_id: None,
                tool_name: "get_projects".to_string(),
                input: json!({}),
            })
            .unwrap();
        let call = assembler.message().tool_calls().next().unwrap();
        assert!(!call.tool_call_id.is_empty());
        assert_eq!(assembler.tool_calls.len(), 1);
    }

    #[test]
    fn test_error_and_done() {
        let mut assembler = assembler();
        let err = assembler.apply(StreamEvent::error("boom")).unwrap_err();
        assert_eq!(err.to_string(), "boom");
        assert!(assembler.message().parts.is_empty());
        assert_eq!(assembler.apply(StreamEvent::Done).unwrap(), FoldOutcome::Done);
    }

    #[test]
    fn test_fold_function_keeps_correlation() {
        let message = fold(
            ChatMessage::assistant(),
            StreamEvent::tool_call_start("c1", "get_project", json!({"projectId": 1})),
        )
        .unwrap();
        let message = fold(message, StreamEvent::tool_call_result("c1", json!({"id": 1}))).unwrap();
        assert_eq!(
            message.tool_calls().next().map(|c| c.state),
            Some(ToolCallState::OutputAvailable)
        );
    }
}
