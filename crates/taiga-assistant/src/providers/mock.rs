use anyhow::Result;
use async_trait::async_trait;
use futures::stream;
use std::sync::Arc;
use std::sync::Mutex;

use crate::models::message::Message;
use crate::models::tool::Tool;
use crate::providers::base::{Provider, ProviderEvent, ProviderStream};

/// A mock provider that replays pre-configured completions for testing.
///
/// Each call to `stream` consumes the next round of events. Once the script
/// runs out, completions are empty.
pub struct MockProvider {
    rounds: Arc<Mutex<Vec<Vec<ProviderEvent>>>>,
    seen: Arc<Mutex<Vec<Vec<Message>>>>,
}

impl MockProvider {
    pub fn new(rounds: Vec<Vec<ProviderEvent>>) -> Self {
        Self {
            rounds: Arc::new(Mutex::new(rounds)),
            seen: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// The conversation passed to each completion, in call order
    pub fn seen(&self) -> Vec<Vec<Message>> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for MockProvider {
    async fn stream(
        &self,
        _system: &str,
        messages: &[Message],
        _tools: &[Tool],
    ) -> Result<ProviderStream> {
        self.seen.lock().unwrap().push(messages.to_vec());
        let mut rounds = self.rounds.lock().unwrap();
        let events = if rounds.is_empty() {
            Vec::new()
        } else {
            rounds.remove(0)
        };
        Ok(Box::pin(stream::iter(
            events.into_iter().map(Ok::<_, anyhow::Error>),
        )))
    }
}
