use async_trait::async_trait;

pub mod gemini_provider;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct LLMRequest {
    pub model: String,
    pub prompt: String,
    pub system_prompt: Option<String>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct LLMResponse {
    pub content: String,
}

#[async_trait]
pub trait LLMProvider: Send + Sync + std::fmt::Debug {
    fn name(&self) -> String;
    async fn generate(&self, request: LLMRequest) -> Result<LLMResponse, anyhow::Error>;
}
