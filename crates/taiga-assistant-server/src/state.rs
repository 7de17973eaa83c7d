use std::sync::Arc;
use std::time::Duration;

use taiga_assistant::providers::factory::ProviderFactory;

use crate::configuration::AssistantSettings;

/// Shared application state.
///
/// Only configuration lives here; every chat request builds its own provider,
/// backend client and tool registry.
#[derive(Clone)]
pub struct AppState {
    pub provider_factory: ProviderFactory,
    pub assistant: Arc<AssistantSettings>,
}

impl AppState {
    pub fn new(provider_factory: ProviderFactory, assistant: AssistantSettings) -> Self {
        Self {
            provider_factory,
            assistant: Arc::new(assistant),
        }
    }

    pub fn turn_timeout(&self) -> Duration {
        Duration::from_secs(self.assistant.turn_timeout_secs)
    }

    pub fn replay_timeout(&self) -> Duration {
        Duration::from_secs(self.assistant.replay_timeout_secs)
    }
}
