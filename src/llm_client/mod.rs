//! Provider registry for language model calls.

pub mod providers;

use std::collections::HashMap;

use providers::gemini_provider::GeminiProvider;
use providers::LLMProvider;
pub use providers::{LLMRequest, LLMResponse};

#[derive(Debug)]
pub struct LlmClient {
    providers: HashMap<String, Box<dyn LLMProvider>>,
    default_provider: String,
}

impl LlmClient {
    pub fn new() -> Result<Self, anyhow::Error> {
        let mut providers: HashMap<String, Box<dyn LLMProvider>> = HashMap::new();

        let gemini = GeminiProvider::new()?;
        let default_provider = gemini.name();
        providers.insert(gemini.name(), Box::new(gemini));

        Ok(LlmClient {
            providers,
            default_provider,
        })
    }

    /// Registry with a single caller-supplied provider. Used by tests to
    /// substitute a scripted provider for the real API.
    pub fn with_provider(provider: Box<dyn LLMProvider>) -> Self {
        let default_provider = provider.name();
        let mut providers: HashMap<String, Box<dyn LLMProvider>> = HashMap::new();
        providers.insert(provider.name(), provider);
        LlmClient {
            providers,
            default_provider,
        }
    }

    pub fn get_provider(&self, name: &str) -> Option<&Box<dyn LLMProvider>> {
        self.providers.get(name)
    }

    pub async fn generate(&self, request: LLMRequest) -> Result<LLMResponse, anyhow::Error> {
        self.generate_with(&self.default_provider, request).await
    }

    pub async fn generate_with(
        &self,
        provider_name: &str,
        request: LLMRequest,
    ) -> Result<LLMResponse, anyhow::Error> {
        match self.get_provider(provider_name) {
            Some(provider) => {
                log::debug!("Calling LLM provider: {}", provider.name());
                provider.generate(request).await
            }
            None => Err(anyhow::anyhow!("Provider '{}' not found", provider_name)),
        }
    }
}
