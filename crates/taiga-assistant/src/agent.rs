use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::stream::{FuturesUnordered, StreamExt};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::errors::{AgentError, AgentResult};
use crate::models::message::{Message, ToolRequest};
use crate::providers::base::{Provider, ProviderEvent};
use crate::tools::registry::error_value;
use crate::tools::ToolRegistry;

/// Upper bound on model/tool round trips within a single turn
pub const MAX_TOOL_ROUNDS: usize = 16;

/// Everything a subscriber can observe about a session
#[derive(Debug, Clone, PartialEq)]
pub enum AgentEvent {
    MessageDelta(String),
    ReasoningDelta(String),
    ToolExecutionStart {
        id: String,
        name: String,
        arguments: Value,
    },
    ToolExecutionComplete {
        id: String,
        result: Value,
    },
    SessionError(String),
    /// The turn has fully resolved. Sent exactly once per turn.
    Idle,
}

/// Agent integrates a model provider with the tools it may call, for one conversation
pub struct Agent {
    inner: Arc<Inner>,
    turn: Mutex<Option<JoinHandle<()>>>,
}

struct Inner {
    provider: Arc<dyn Provider>,
    registry: ToolRegistry,
    system_prompt: String,
    history: tokio::sync::Mutex<Vec<Message>>,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<AgentEvent>>>,
    running: AtomicBool,
    destroyed: AtomicBool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Marks the session busy for as long as it lives, including when a turn is aborted
struct TurnGuard {
    inner: Arc<Inner>,
}

impl Drop for TurnGuard {
    fn drop(&mut self) {
        self.inner.running.store(false, Ordering::SeqCst);
    }
}

impl Agent {
    pub fn new<S: Into<String>>(
        provider: Arc<dyn Provider>,
        registry: ToolRegistry,
        system_prompt: S,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                provider,
                registry,
                system_prompt: system_prompt.into(),
                history: tokio::sync::Mutex::new(Vec::new()),
                subscribers: Mutex::new(Vec::new()),
                running: AtomicBool::new(false),
                destroyed: AtomicBool::new(false),
            }),
            turn: Mutex::new(None),
        }
    }

    /// Receive every event emitted from now on
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<AgentEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        if !self.inner.destroyed.load(Ordering::SeqCst) {
            lock(&self.inner.subscribers).push(tx);
        }
        rx
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    pub async fn history(&self) -> Vec<Message> {
        self.inner.history.lock().await.clone()
    }

    fn begin_turn(&self) -> AgentResult<TurnGuard> {
        if self.inner.destroyed.load(Ordering::SeqCst) {
            return Err(AgentError::SessionClosed);
        }
        self.inner
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| AgentError::TurnInProgress)?;
        Ok(TurnGuard {
            inner: Arc::clone(&self.inner),
        })
    }

    /// Run one full turn and return the final assistant text
    pub async fn send_and_wait<S: Into<String>>(
        &self,
        prompt: S,
        timeout: Duration,
    ) -> AgentResult<String> {
        let _guard = self.begin_turn()?;
        match tokio::time::timeout(timeout, self.inner.run_turn(prompt.into())).await {
            Ok(result) => result,
            Err(_) => {
                warn!(timeout_secs = timeout.as_secs(), "turn timed out");
                Err(AgentError::Timeout(timeout.as_secs()))
            }
        }
    }

    /// Start a turn in the background. Progress is reported to subscribers.
    pub fn send<S: Into<String>>(&self, prompt: S) -> AgentResult<()> {
        let guard = self.begin_turn()?;
        let inner = Arc::clone(&self.inner);
        let prompt = prompt.into();
        let handle = tokio::spawn(async move {
            let _guard = guard;
            if let Err(e) = inner.run_turn(prompt).await {
                warn!(error = %e, "turn failed");
            }
        });
        *lock(&self.turn) = Some(handle);
        Ok(())
    }

    /// Abort any running turn and drop all subscribers
    pub fn destroy(&self) {
        if self.inner.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(handle) = lock(&self.turn).take() {
            handle.abort();
        }
        lock(&self.inner.subscribers).clear();
        debug!("agent session destroyed");
    }
}

impl Drop for Agent {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl Inner {
    fn emit(&self, event: AgentEvent) {
        lock(&self.subscribers).retain(|tx| tx.send(event.clone()).is_ok());
    }

    async fn run_turn(&self, prompt: String) -> AgentResult<String> {
        let result = self.drive(prompt).await;
        if let Err(e) = &result {
            self.emit(AgentEvent::SessionError(e.to_string()));
        }
        self.emit(AgentEvent::Idle);
        result
    }

    async fn drive(&self, prompt: String) -> AgentResult<String> {
        let tools = self.registry.tools();
        let mut history = self.history.lock().await;
        history.push(Message::user().with_text(prompt));
        info!(messages = history.len(), "starting turn");

        for round in 0..MAX_TOOL_ROUNDS {
            let mut stream = self
                .provider
                .stream(&self.system_prompt, &history, &tools)
                .await
                .map_err(|e| AgentError::Internal(e.to_string()))?;

            let mut text = String::new();
            let mut requests = Vec::new();
            while let Some(event) = stream.next().await {
                match event.map_err(|e| AgentError::Internal(e.to_string()))? {
                    ProviderEvent::TextDelta(delta) => {
                        text.push_str(&delta);
                        self.emit(AgentEvent::MessageDelta(delta));
                    }
                    ProviderEvent::ReasoningDelta(delta) => {
                        self.emit(AgentEvent::ReasoningDelta(delta));
                    }
                    ProviderEvent::ToolRequest(request) => requests.push(request),
                    ProviderEvent::Usage(usage) => {
                        debug!(
                            input_tokens = usage.input_tokens,
                            output_tokens = usage.output_tokens,
                            "completion usage"
                        );
                    }
                }
            }

            let mut response = Message::assistant();
            if !text.is_empty() {
                response = response.with_text(text.clone());
            }
            for request in &requests {
                response = response.with_tool_request(request.id.clone(), request.tool_call.clone());
            }
            history.push(response);

            if requests.is_empty() {
                info!(rounds = round + 1, "turn finished");
                return Ok(text);
            }
            let results = self.execute(&requests).await;
            history.push(results);
        }

        Err(AgentError::Internal(format!(
            "Stopped after {} tool rounds without a final answer",
            MAX_TOOL_ROUNDS
        )))
    }

    /// Run the requested tools concurrently, reporting each one as it completes.
    /// The returned message lists the responses in request order.
    async fn execute(&self, requests: &[ToolRequest]) -> Message {
        let mut results: HashMap<String, AgentResult<Value>> = HashMap::new();
        let mut pending = FuturesUnordered::new();

        for request in requests {
            match &request.tool_call {
                Ok(call) => {
                    self.emit(AgentEvent::ToolExecutionStart {
                        id: request.id.clone(),
                        name: call.name.clone(),
                        arguments: call.arguments.clone(),
                    });
                    let registry = &self.registry;
                    let id = request.id.clone();
                    pending.push(async move { (id, registry.dispatch(call).await) });
                }
                Err(e) => {
                    warn!(id = %request.id, error = %e, "model produced an invalid tool call");
                    results.insert(request.id.clone(), Err(e.clone()));
                }
            }
        }

        while let Some((id, result)) = pending.next().await {
            let output = match &result {
                Ok(value) => value.clone(),
                Err(e) => error_value(e.to_string()),
            };
            self.emit(AgentEvent::ToolExecutionComplete {
                id: id.clone(),
                result: output,
            });
            results.insert(id, result);
        }

        let mut message = Message::user();
        for request in requests {
            if let Some(result) = results.remove(&request.id) {
                message = message.with_tool_response(request.id.clone(), result);
            }
        }
        message
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::message::MessageContent;
    use crate::models::tool::{Tool, ToolCall};
    use crate::providers::base::ProviderStream;
    use crate::providers::mock::MockProvider;
    use crate::tools::registry::typed;
    use crate::tools::{ParamSpec, ToolDefinition};
    use anyhow::anyhow;
    use async_trait::async_trait;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Deserialize)]
    struct WaitInput {
        millis: u64,
    }

    fn registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry
            .register(ToolDefinition::new(
                "wait",
                "Sleep, then echo the delay",
                vec![ParamSpec::number("millis", "How long to sleep")],
                typed(|input: WaitInput| async move {
                    tokio::time::sleep(Duration::from_millis(input.millis)).await;
                    Ok::<_, String>(json!({"slept": input.millis}))
                }),
            ))
            .unwrap();
        registry
    }

    fn request(id: &str, name: &str, arguments: Value) -> ProviderEvent {
        ProviderEvent::ToolRequest(ToolRequest {
            id: id.to_string(),
            tool_call: Ok(ToolCall::new(name, arguments)),
        })
    }

    fn agent(rounds: Vec<Vec<ProviderEvent>>) -> (Agent, Arc<MockProvider>) {
        let provider = Arc::new(MockProvider::new(rounds));
        let agent = Agent::new(provider.clone(), registry(), "You are a test assistant.");
        (agent, provider)
    }

    async fn drain_until_idle(rx: &mut mpsc::UnboundedReceiver<AgentEvent>) -> Vec<AgentEvent> {
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            let idle = event == AgentEvent::Idle;
            events.push(event);
            if idle {
                break;
            }
        }
        events
    }

    struct FailingProvider;

    #[async_trait]
    impl Provider for FailingProvider {
        async fn stream(
            &self,
            _system: &str,
            _messages: &[Message],
            _tools: &[Tool],
        ) -> anyhow::Result<ProviderStream> {
            Err(anyhow!("model unavailable"))
        }
    }

    #[tokio::test]
    async fn test_text_turn() {
        let (agent, _) = agent(vec![vec![
            ProviderEvent::ReasoningDelta("hmm".to_string()),
            ProviderEvent::TextDelta("Hello".to_string()),
            ProviderEvent::TextDelta(" there".to_string()),
        ]]);
        let mut rx = agent.subscribe();

        let text = agent
            .send_and_wait("hi", Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(text, "Hello there");

        let events = drain_until_idle(&mut rx).await;
        assert_eq!(
            events,
            vec![
                AgentEvent::ReasoningDelta("hmm".to_string()),
                AgentEvent::MessageDelta("Hello".to_string()),
                AgentEvent::MessageDelta(" there".to_string()),
                AgentEvent::Idle,
            ]
        );

        let history = agent.history().await;
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].text(), "Hello there");
    }

    #[tokio::test]
    async fn test_tool_round_feeds_results_back() {
        let (agent, provider) = agent(vec![
            vec![request("call_1", "wait", json!({"millis": 1}))],
            vec![ProviderEvent::TextDelta("Done".to_string())],
        ]);
        let mut rx = agent.subscribe();

        agent.send("go").unwrap();
        let events = drain_until_idle(&mut rx).await;

        assert_eq!(
            events,
            vec![
                AgentEvent::ToolExecutionStart {
                    id: "call_1".to_string(),
                    name: "wait".to_string(),
                    arguments: json!({"millis": 1}),
                },
                AgentEvent::ToolExecutionComplete {
                    id: "call_1".to_string(),
                    result: json!({"slept": 1}),
                },
                AgentEvent::MessageDelta("Done".to_string()),
                AgentEvent::Idle,
            ]
        );

        let seen = provider.seen();
        assert_eq!(seen.len(), 2);
        let last = seen[1].last().unwrap();
        assert_eq!(
            last.content[0],
            MessageContent::tool_response("call_1", Ok(json!({"slept": 1})))
        );
    }

    #[tokio::test]
    async fn test_concurrent_tools_complete_in_finish_order() {
        let (agent, provider) = agent(vec![
            vec![
                request("slow", "wait", json!({"millis": 200})),
                request("fast", "wait", json!({"millis": 1})),
            ],
            vec![ProviderEvent::TextDelta("ok".to_string())],
        ]);
        let mut rx = agent.subscribe();

        agent
            .send_and_wait("go", Duration::from_secs(5))
            .await
            .unwrap();
        let events = drain_until_idle(&mut rx).await;

        let completed: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                AgentEvent::ToolExecutionComplete { id, .. } => Some(id.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(completed, vec!["fast", "slow"]);

        // History keeps the order the model asked in
        let responses: Vec<_> = provider.seen()[1]
            .last()
            .unwrap()
            .content
            .iter()
            .filter_map(|c| c.as_tool_response().map(|r| r.id.clone()))
            .collect();
        assert_eq!(responses, vec!["slow", "fast"]);
    }

    #[tokio::test]
    async fn test_unknown_tool_becomes_error_value() {
        let (agent, _) = agent(vec![
            vec![request("call_1", "delete_everything", json!({}))],
            vec![ProviderEvent::TextDelta("Sorry".to_string())],
        ]);
        let mut rx = agent.subscribe();

        agent
            .send_and_wait("go", Duration::from_secs(5))
            .await
            .unwrap();
        let events = drain_until_idle(&mut rx).await;

        assert!(events.contains(&AgentEvent::ToolExecutionComplete {
            id: "call_1".to_string(),
            result: json!({"error": "Tool not found: delete_everything"}),
        }));
    }

    #[tokio::test]
    async fn test_second_send_rejected_while_running() {
        let (agent, _) = agent(vec![
            vec![request("call_1", "wait", json!({"millis": 100}))],
            vec![ProviderEvent::TextDelta("ok".to_string())],
        ]);
        let mut rx = agent.subscribe();

        agent.send("first").unwrap();
        assert_eq!(agent.send("second"), Err(AgentError::TurnInProgress));

        drain_until_idle(&mut rx).await;
        // Give the spawned task a moment to release the turn
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!agent.is_running());
    }

    #[tokio::test]
    async fn test_timeout_releases_turn() {
        let (agent, _) = agent(vec![vec![request(
            "call_1",
            "wait",
            json!({"millis": 5_000}),
        )]]);

        let err = agent
            .send_and_wait("go", Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Timeout(_)));
        assert!(!agent.is_running());
    }

    #[tokio::test]
    async fn test_provider_failure_reports_error_then_idle() {
        let agent = Agent::new(Arc::new(FailingProvider), registry(), "system");
        let mut rx = agent.subscribe();

        agent.send("hi").unwrap();
        let events = drain_until_idle(&mut rx).await;

        assert_eq!(events.len(), 2);
        assert!(
            matches!(&events[0], AgentEvent::SessionError(message) if message.contains("model unavailable"))
        );
        assert_eq!(events[1], AgentEvent::Idle);
    }

    #[tokio::test]
    async fn test_destroy_is_idempotent() {
        let (agent, _) = agent(vec![vec![request(
            "call_1",
            "wait",
            json!({"millis": 5_000}),
        )]]);
        let mut rx = agent.subscribe();

        agent.send("go").unwrap();
        agent.destroy();
        agent.destroy();

        assert_eq!(agent.send("again"), Err(AgentError::SessionClosed));
        // Subscribers are dropped, so the channel ends without an Idle
        let mut saw_idle = false;
        while let Some(event) = rx.recv().await {
            saw_idle |= event == AgentEvent::Idle;
        }
        assert!(!saw_idle);
    }
}
