use std::sync::Arc;

use anyhow::Result;

use super::{base::Provider, configs::ProviderConfig, openai::OpenAiProvider};

/// Builds a fresh provider for each chat request
pub type ProviderFactory = Arc<dyn Fn() -> Result<Arc<dyn Provider>> + Send + Sync>;

pub fn get_provider(config: ProviderConfig) -> Result<Arc<dyn Provider>> {
    match config {
        ProviderConfig::OpenAi(openai_config) => Ok(Arc::new(OpenAiProvider::new(openai_config)?)),
        ProviderConfig::Ollama(ollama_config) => {
            Ok(Arc::new(OpenAiProvider::new(ollama_config.into())?))
        }
    }
}

pub fn provider_factory(config: ProviderConfig) -> ProviderFactory {
    Arc::new(move || get_provider(config.clone()))
}
