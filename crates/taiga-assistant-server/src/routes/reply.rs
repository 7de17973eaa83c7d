use crate::routes::{reject, Rejection};
use crate::sse::{EventSink, SseResponse};
use crate::state::AppState;
use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use chrono::Utc;
use serde::Deserialize;
use std::time::Duration;
use taiga_assistant::{
    agent::{Agent, AgentEvent},
    prompt_template::system_prompt,
    protocol::StreamEvent,
    taiga::TaigaClient,
    tools::taiga::taiga_tools,
};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChatRequest {
    #[serde(default)]
    messages: Vec<IncomingMessage>,
    #[serde(default, alias = "taigaToken")]
    credential: Option<String>,
    #[serde(default, alias = "taigaUrl")]
    backend_url: Option<String>,
    #[serde(default)]
    session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IncomingMessage {
    role: String,
    #[serde(default)]
    content: String,
}

fn required(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Provider, tools and system instruction for one request
fn start_session(state: &AppState, client: &TaigaClient) -> anyhow::Result<Agent> {
    let registry = taiga_tools(client)?;
    let system = system_prompt(
        state.assistant.system_prompt_file.as_ref(),
        &state.assistant.language,
        &registry.tools(),
    )?;
    let provider = (state.provider_factory)()?;
    Ok(Agent::new(provider, registry, system))
}

fn to_stream_event(event: AgentEvent) -> Option<StreamEvent> {
    match event {
        AgentEvent::MessageDelta(delta) => {
            (!delta.is_empty()).then(|| StreamEvent::text(delta))
        }
        AgentEvent::ReasoningDelta(delta) => {
            (!delta.is_empty()).then(|| StreamEvent::reasoning(delta))
        }
        AgentEvent::ToolExecutionStart {
            id,
            name,
            arguments,
        } => Some(StreamEvent::tool_call_start(id, name, arguments)),
        AgentEvent::ToolExecutionComplete { id, result } => {
            Some(StreamEvent::tool_call_result(id, result))
        }
        AgentEvent::SessionError(_) | AgentEvent::Idle => None,
    }
}

/// How long the `done` marker may wait for a client that stopped reading
const CLOSE_GRACE: Duration = Duration::from_secs(2);

/// Forward one turn onto the stream, then close it and tear the session down.
///
/// The stream ends on the first of: the idle signal, a session error, the turn
/// timeout, or the client going away. A client that stops reading still hits the
/// turn timeout.
async fn drive_turn(
    agent: Agent,
    mut events: mpsc::UnboundedReceiver<AgentEvent>,
    sink: EventSink,
    prompt: String,
    turn_timeout: Duration,
    session_id: String,
) {
    if let Err(e) = agent.send(prompt) {
        error!(session_id = %session_id, error = %e, "failed to submit turn");
        sink.send(&StreamEvent::error(e.to_string())).await;
        sink.close().await;
        agent.destroy();
        return;
    }

    let deadline = tokio::time::sleep(turn_timeout);
    tokio::pin!(deadline);

    loop {
        let event = tokio::select! {
            event = events.recv() => event,
            _ = &mut deadline => {
                warn!(session_id = %session_id, timeout_secs = turn_timeout.as_secs(), "turn timed out, closing stream");
                break;
            }
            _ = sink.disconnected() => {
                info!(session_id = %session_id, "client disconnected");
                break;
            }
        };

        let (payload, last) = match event {
            Some(AgentEvent::Idle) | None => break,
            Some(AgentEvent::SessionError(message)) => {
                error!(session_id = %session_id, error = %message, "turn failed");
                (StreamEvent::error(message), true)
            }
            Some(event) => match to_stream_event(event) {
                Some(payload) => (payload, false),
                None => continue,
            },
        };

        let sent = tokio::select! {
            sent = sink.send(&payload) => sent,
            _ = &mut deadline => {
                warn!(session_id = %session_id, timeout_secs = turn_timeout.as_secs(), "turn timed out with the client not reading");
                false
            }
        };
        if !sent || last {
            break;
        }
    }

    agent.destroy();
    if tokio::time::timeout(CLOSE_GRACE, sink.close()).await.is_err() {
        warn!(session_id = %session_id, "client not reading, dropping stream without done");
    }
    info!(session_id = %session_id, "stream closed");
}

async fn handler(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<SseResponse, Rejection> {
    let credential = required(request.credential)
        .ok_or_else(|| reject(StatusCode::UNAUTHORIZED, "Taiga token not provided"))?;
    let backend_url = required(request.backend_url)
        .ok_or_else(|| reject(StatusCode::BAD_REQUEST, "Taiga URL not provided"))?;
    let (latest, previous) = request
        .messages
        .split_last()
        .ok_or_else(|| reject(StatusCode::BAD_REQUEST, "Messages not provided"))?;

    let session_id = request
        .session_id
        .clone()
        .unwrap_or_else(|| format!("taiga-{}", Utc::now().timestamp_millis()));

    let client = TaigaClient::new(&backend_url)
        .map_err(|e| reject(StatusCode::BAD_REQUEST, e.to_string()))?
        .with_token(credential);

    let agent = start_session(&state, &client).map_err(|e| {
        error!(session_id = %session_id, error = %e, "failed to start session");
        reject(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    })?;

    // Rebuild context from earlier user turns before streaming the latest one
    for message in previous.iter().filter(|m| m.role == "user") {
        agent
            .send_and_wait(message.content.clone(), state.replay_timeout())
            .await
            .map_err(|e| {
                error!(session_id = %session_id, error = %e, "history replay failed");
                reject(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            })?;
    }

    info!(
        session_id = %session_id,
        replayed = previous.len(),
        "starting streamed turn"
    );
    let events = agent.subscribe();
    let (sink, response) = EventSink::channel(100);
    tokio::spawn(drive_turn(
        agent,
        events,
        sink,
        latest.content.clone(),
        state.turn_timeout(),
        session_id,
    ));

    Ok(response)
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/reply", post(handler))
        .route("/api/chat", post(handler))
        .with_state(state)
}
