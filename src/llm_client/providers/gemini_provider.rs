use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest;
use serde::{Deserialize, Serialize};
use std::env;

use super::{LLMProvider, LLMRequest, LLMResponse};

/// Generation parameters sent with every request. Tuned for structured
/// output: low temperature keeps the fenced JSON blocks stable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiConfig {
    pub model_name: String,
    pub temperature: f64,
    pub max_output_tokens: u32,
    pub top_p: f64,
    pub top_k: u32,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        GeminiConfig {
            model_name: "gemini-2.0-flash".to_string(),
            temperature: 0.3,
            max_output_tokens: 2048,
            top_p: 0.95,
            top_k: 40,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
    generation_config: GeminiGenerationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GeminiContent {
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GeminiPart {
    text: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    temperature: f64,
    max_output_tokens: u32,
    top_p: f64,
    top_k: u32,
}

#[derive(Debug, Clone, Deserialize)]
struct GeminiResponse {
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Clone, Deserialize)]
struct GeminiCandidate {
    content: GeminiContent,
}

#[derive(Debug)]
pub struct GeminiProvider {
    api_key: String,
    config: GeminiConfig,
    client: reqwest::Client,
}

impl GeminiProvider {
    pub fn new() -> Result<Self, anyhow::Error> {
        Self::with_config(GeminiConfig::default())
    }

    pub fn with_config(config: GeminiConfig) -> Result<Self, anyhow::Error> {
        dotenv::dotenv().ok(); // Load environment variables from .env file
        let api_key = env::var("GEMINI_API_KEY")
            .or_else(|_| env::var("GOOGLE_API_KEY"))
            .map_err(|_| {
                anyhow!("GEMINI_API_KEY or GOOGLE_API_KEY not found in environment variables")
            })?;
        let client = reqwest::Client::new();
        Ok(GeminiProvider {
            api_key,
            config,
            client,
        })
    }

    pub fn config(&self) -> &GeminiConfig {
        &self.config
    }
}

#[async_trait]
impl LLMProvider for GeminiProvider {
    fn name(&self) -> String {
        "Gemini".to_string()
    }

    async fn generate(&self, request: LLMRequest) -> Result<LLMResponse, anyhow::Error> {
        let model = if request.model.is_empty() {
            self.config.model_name.clone()
        } else {
            request.model
        };

        let gemini_request = GeminiRequest {
            contents: vec![GeminiContent {
                parts: vec![GeminiPart {
                    text: request.prompt,
                }],
            }],
            system_instruction: request.system_prompt.map(|text| GeminiContent {
                parts: vec![GeminiPart { text }],
            }),
            generation_config: GeminiGenerationConfig {
                temperature: self.config.temperature,
                max_output_tokens: self.config.max_output_tokens,
                top_p: self.config.top_p,
                top_k: self.config.top_k,
            },
        };

        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent?key={}",
            model, self.api_key
        );

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&gemini_request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await?;
            return Err(anyhow!(
                "Gemini API error: Status {}, Body: {}",
                status,
                text
            ));
        }

        let gemini_response: GeminiResponse = response.json().await?;

        let content = gemini_response
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content.parts.into_iter().next())
            .map(|part| part.text)
            .ok_or_else(|| anyhow!("Gemini API returned no candidates"))?;

        Ok(LLMResponse { content })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_production_tuning() {
        let config = GeminiConfig::default();
        assert_eq!(config.model_name, "gemini-2.0-flash");
        assert_eq!(config.temperature, 0.3);
        assert_eq!(config.max_output_tokens, 2048);
        assert_eq!(config.top_p, 0.95);
        assert_eq!(config.top_k, 40);
    }
}
