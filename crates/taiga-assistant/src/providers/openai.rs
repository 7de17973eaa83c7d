use anyhow::{anyhow, Result};
use async_stream::try_stream;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use reqwest::StatusCode;
use serde_json::{json, Value};
use std::time::Duration;

use super::base::{Provider, ProviderEvent, ProviderStream, Usage};
use super::configs::OpenAiProviderConfig;
use super::utils::{
    check_openai_context_length_error, messages_to_openai_spec, tools_to_openai_spec,
    ToolCallAccumulator,
};
use crate::models::message::Message;
use crate::models::tool::Tool;
use crate::protocol::decoder::{data_payload, LineDecoder};

pub struct OpenAiProvider {
    client: Client,
    config: OpenAiProviderConfig,
}

impl OpenAiProvider {
    pub fn new(config: OpenAiProviderConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(600)) // 10 minutes timeout
            .build()?;

        Ok(Self { client, config })
    }

    fn get_usage(data: &Value) -> Option<Usage> {
        let usage = data.get("usage").filter(|u| u.is_object())?;

        let input_tokens = usage
            .get("prompt_tokens")
            .and_then(|v| v.as_i64())
            .map(|v| v as i32);

        let output_tokens = usage
            .get("completion_tokens")
            .and_then(|v| v.as_i64())
            .map(|v| v as i32);

        let total_tokens = usage
            .get("total_tokens")
            .and_then(|v| v.as_i64())
            .map(|v| v as i32)
            .or_else(|| match (input_tokens, output_tokens) {
                (Some(input), Some(output)) => Some(input + output),
                _ => None,
            });

        Some(Usage::new(input_tokens, output_tokens, total_tokens))
    }

    fn payload(&self, system: &str, messages: &[Message], tools: &[Tool]) -> Result<Value> {
        let system_message = json!({
            "role": "system",
            "content": system
        });

        let mut messages_array = vec![system_message];
        messages_array.extend(messages_to_openai_spec(messages));

        let mut payload = json!({
            "model": self.config.model,
            "messages": messages_array,
            "stream": true,
        });

        if !tools.is_empty() {
            payload["tools"] = json!(tools_to_openai_spec(tools)?);
        }
        if let Some(temp) = self.config.temperature {
            payload["temperature"] = json!(temp);
        }
        if let Some(tokens) = self.config.max_tokens {
            payload["max_tokens"] = json!(tokens);
        }
        Ok(payload)
    }

    async fn post(&self, payload: Value) -> Result<reqwest::Response> {
        let url = format!(
            "{}/v1/chat/completions",
            self.config.host.trim_end_matches('/')
        );

        let mut request = self.client.post(&url).json(&payload);
        if let Some(api_key) = &self.config.api_key {
            request = request.header("Authorization", format!("Bearer {}", api_key));
        }
        let response = request.send().await?;

        match response.status() {
            StatusCode::OK => Ok(response),
            status if status == StatusCode::TOO_MANY_REQUESTS || status.as_u16() >= 500 => {
                Err(anyhow!("Server error: {}", status))
            }
            status => {
                let body: Value = response.json().await.unwrap_or(Value::Null);
                if let Some(err) = body
                    .get("error")
                    .and_then(check_openai_context_length_error)
                {
                    return Err(err.into());
                }
                Err(anyhow!("Request failed: {}\nResponse: {}", status, body))
            }
        }
    }
}

/// Errors can arrive mid-stream as a chunk carrying an `error` object
fn check_chunk_error(chunk: &Value) -> Result<()> {
    match chunk.get("error").filter(|e| !e.is_null()) {
        Some(error) => match check_openai_context_length_error(error) {
            Some(err) => Err(err.into()),
            None => Err(anyhow!("OpenAI API error: {}", error)),
        },
        None => Ok(()),
    }
}

/// Translate one streamed chunk into provider events, buffering tool-call fragments
fn chunk_events(chunk: &Value, tool_calls: &mut ToolCallAccumulator) -> Vec<ProviderEvent> {
    let mut events = Vec::new();
    let delta = &chunk["choices"][0]["delta"];

    for key in ["reasoning_content", "reasoning"] {
        if let Some(reasoning) = delta.get(key).and_then(Value::as_str) {
            if !reasoning.is_empty() {
                events.push(ProviderEvent::ReasoningDelta(reasoning.to_string()));
                break;
            }
        }
    }
    if let Some(text) = delta.get("content").and_then(Value::as_str) {
        if !text.is_empty() {
            events.push(ProviderEvent::TextDelta(text.to_string()));
        }
    }
    if let Some(calls) = delta.get("tool_calls").and_then(Value::as_array) {
        for call in calls {
            tool_calls.push(call);
        }
    }
    if let Some(usage) = OpenAiProvider::get_usage(chunk) {
        events.push(ProviderEvent::Usage(usage));
    }
    events
}

#[async_trait]
impl Provider for OpenAiProvider {
    async fn stream(
        &self,
        system: &str,
        messages: &[Message],
        tools: &[Tool],
    ) -> Result<ProviderStream> {
        let payload = self.payload(system, messages, tools)?;
        let response = self.post(payload).await?;
        let mut body = Box::pin(response.bytes_stream());

        let stream = try_stream! {
            let mut lines = LineDecoder::new();
            let mut tool_calls = ToolCallAccumulator::default();
            let mut finished = false;

            while let Some(chunk) = body.next().await {
                let chunk = chunk?;
                for line in lines.push(&chunk) {
                    let data = match data_payload(&line) {
                        Some(data) => data,
                        None => continue,
                    };
                    if data.trim() == "[DONE]" {
                        finished = true;
                        break;
                    }
                    let value: Value = serde_json::from_str(data)?;
                    check_chunk_error(&value)?;
                    for event in chunk_events(&value, &mut tool_calls) {
                        yield event;
                    }
                }
                if finished {
                    break;
                }
            }

            for request in tool_calls.finish() {
                yield ProviderEvent::ToolRequest(request);
            }
        };

        Ok(Box::pin(stream))
    }
}
