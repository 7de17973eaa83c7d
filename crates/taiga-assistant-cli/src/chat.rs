use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::future::Future;
use thiserror::Error;
use tracing::{debug, warn};

use taiga_assistant::models::chat::ChatMessage;
use taiga_assistant::models::role::Role;
use taiga_assistant::protocol::{
    EventDecoder, FoldOutcome, MessageAssembler, ProtocolError, StreamEvent,
};

/// Where the client is in the lifecycle of a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatStatus {
    Ready,
    Submitted,
    Streaming,
    Error,
}

#[derive(Error, Debug)]
pub enum ChatError {
    #[error("Message is empty")]
    EmptyMessage,

    #[error("There is no message to retry")]
    NothingToRetry,

    /// The server refused the request before streaming anything
    #[error("{message}")]
    Rejected { status: u16, message: String },

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("The connection closed before the reply finished")]
    Disconnected,

    #[error("Request failed: {0}")]
    Http(#[from] reqwest::Error),
}

#[derive(Debug)]
pub enum TurnOutcome {
    /// The stream closed normally with the finalized assistant message
    Finished(ChatMessage),
    /// The user stopped the turn; nothing was kept
    Aborted,
}

/// Credentials forwarded with every turn
#[derive(Debug, Clone)]
pub struct ChatContext {
    pub credential: String,
    pub backend_url: String,
    pub session_id: Option<String>,
}

#[derive(Serialize)]
struct OutgoingMessage<'a> {
    role: Role,
    content: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ReplyRequest<'a> {
    messages: Vec<OutgoingMessage<'a>>,
    credential: &'a str,
    backend_url: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    session_id: Option<&'a str>,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

/// Client side of the chat stream.
///
/// Holds the finalized transcript, posts each turn to the reply endpoint and folds
/// the streamed events into one assistant message. A turn only joins the transcript
/// once the server sends its closing marker.
pub struct ChatClient {
    http: reqwest::Client,
    endpoint: String,
    context: ChatContext,
    messages: Vec<ChatMessage>,
    status: ChatStatus,
    failed_prompt: Option<String>,
}

impl ChatClient {
    pub fn new(server_url: &str, context: ChatContext) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: format!("{}/reply", server_url.trim_end_matches('/')),
            context,
            messages: Vec::new(),
            status: ChatStatus::Ready,
            failed_prompt: None,
        }
    }

    pub fn with_messages(mut self, messages: Vec<ChatMessage>) -> Self {
        self.messages = messages;
        self
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn status(&self) -> ChatStatus {
        self.status
    }

    /// The prompt of the last turn that failed, which a retry resends as is
    pub fn failed_prompt(&self) -> Option<&str> {
        self.failed_prompt.as_deref()
    }

    /// Switch to another conversation
    pub fn reset(&mut self, messages: Vec<ChatMessage>, session_id: Option<String>) {
        self.messages = messages;
        self.context.session_id = session_id;
        self.status = ChatStatus::Ready;
        self.failed_prompt = None;
    }

    /// Submit one user turn and stream the reply.
    ///
    /// `on_event` sees every event after it is folded, together with the message
    /// built so far. Resolving `abort` stops the transfer and discards the turn.
    pub async fn send<A, F>(
        &mut self,
        text: &str,
        abort: A,
        on_event: F,
    ) -> Result<TurnOutcome, ChatError>
    where
        A: Future<Output = ()>,
        F: FnMut(&StreamEvent, &ChatMessage),
    {
        if text.trim().is_empty() {
            return Err(ChatError::EmptyMessage);
        }

        self.status = ChatStatus::Submitted;
        self.failed_prompt = None;
        let user = ChatMessage::user(text);

        match self.stream_turn(&user, abort, on_event).await {
            Ok(Some(reply)) => {
                self.status = ChatStatus::Ready;
                self.messages.push(user);
                self.messages.push(reply.clone());
                Ok(TurnOutcome::Finished(reply))
            }
            Ok(None) => {
                debug!("turn aborted");
                self.status = ChatStatus::Ready;
                Ok(TurnOutcome::Aborted)
            }
            Err(e) => {
                warn!(error = %e, "turn failed");
                self.status = ChatStatus::Error;
                self.failed_prompt = Some(user.content);
                Err(e)
            }
        }
    }

    /// Regenerate the latest reply.
    ///
    /// After a failed turn the same prompt is sent again. Otherwise the most recent
    /// user message is resubmitted in place of the turn it opened. That turn stays in
    /// the transcript unless the new one finishes.
    pub async fn reload<A, F>(&mut self, abort: A, on_event: F) -> Result<TurnOutcome, ChatError>
    where
        A: Future<Output = ()>,
        F: FnMut(&StreamEvent, &ChatMessage),
    {
        if let Some(prompt) = self.failed_prompt.take() {
            return self.send(&prompt, abort, on_event).await;
        }

        let index = self
            .messages
            .iter()
            .rposition(|m| m.role == Role::User)
            .ok_or(ChatError::NothingToRetry)?;
        let replaced = self.messages.split_off(index);
        let prompt = replaced[0].content.clone();

        let result = self.send(&prompt, abort, on_event).await;
        if !matches!(result, Ok(TurnOutcome::Finished(_))) {
            self.messages.extend(replaced);
            // the prompt is back in the transcript, so a retry regenerates again
            self.failed_prompt = None;
        }
        result
    }

    /// Returns `None` when aborted
    async fn stream_turn<A, F>(
        &mut self,
        user: &ChatMessage,
        abort: A,
        mut on_event: F,
    ) -> Result<Option<ChatMessage>, ChatError>
    where
        A: Future<Output = ()>,
        F: FnMut(&StreamEvent, &ChatMessage),
    {
        tokio::pin!(abort);

        let messages = self
            .messages
            .iter()
            .chain(std::iter::once(user))
            .map(|m| OutgoingMessage {
                role: m.role,
                content: &m.content,
            })
            .collect();
        let request = self.http.post(&self.endpoint).json(&ReplyRequest {
            messages,
            credential: &self.context.credential,
            backend_url: &self.context.backend_url,
            session_id: self.context.session_id.as_deref(),
        });

        let response = tokio::select! {
            response = request.send() => response?,
            _ = &mut abort => return Ok(None),
        };

        let status = response.status();
        if !status.is_success() {
            let message = match response.json::<ErrorBody>().await {
                Ok(body) => body.error,
                Err(_) => "Failed to process the message".to_string(),
            };
            return Err(ChatError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        self.status = ChatStatus::Streaming;
        debug!("reply streaming");

        let mut stream = Box::pin(response.bytes_stream());
        let mut decoder = EventDecoder::new();
        let mut assembler = MessageAssembler::new(ChatMessage::assistant());

        loop {
            let chunk = tokio::select! {
                chunk = stream.next() => chunk,
                _ = &mut abort => return Ok(None),
            };

            let events = match chunk {
                Some(chunk) => decoder.push(&chunk?)?,
                // a stream that ends without its closing marker did not finish
                None => match decoder.finish() {
                    Ok(Some(event)) if event.is_done() => vec![event],
                    Ok(_) => return Err(ChatError::Disconnected),
                    Err(e) => {
                        debug!(error = %e, "stream cut mid-event");
                        return Err(ChatError::Disconnected);
                    }
                },
            };

            for event in events {
                if assembler.apply(event.clone())? == FoldOutcome::Done {
                    return Ok(Some(assembler.into_message()));
                }
                on_event(&event, assembler.message());
            }
        }
    }
}
