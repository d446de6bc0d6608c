use std::sync::Arc;

use async_trait::async_trait;
use handlebars::Handlebars;
use serde_json::{json, Value};

use crate::common_types::{preview, AgentName, AgentState, WorkflowError};
use crate::llm_client::{LLMRequest, LlmClient};

use super::base_agent::{WorkerAgent, WorkerStatus};
use super::prompts::RESPONSE_PROMPT_TEMPLATE;

const MAX_CONTEXT_RECORDS: usize = 5;
const REVIEW_PREVIEW_CHARS: usize = 200;

/// Response worker. Assembles the collected findings into a prompt context
/// and asks the model for the final user-facing answer. Uses no tools.
pub struct ResponseAgent {
    llm: Arc<LlmClient>,
    model: String,
    handlebars: Handlebars<'static>,
}

impl ResponseAgent {
    pub fn new(llm: Arc<LlmClient>, model: impl Into<String>) -> Self {
        let mut handlebars = Handlebars::new();
        handlebars.set_strict_mode(true);
        ResponseAgent {
            llm,
            model: model.into(),
            handlebars,
        }
    }

    async fn generate_response(&self, state: &AgentState) -> Result<String, WorkflowError> {
        let context = build_context(state);
        let prompt = self
            .handlebars
            .render_template(
                RESPONSE_PROMPT_TEMPLATE,
                &json!({"user_query": state.user_query, "context": context}),
            )
            .map_err(|e| WorkflowError::Fatal(format!("prompt template render failed: {}", e)))?;

        let response = self
            .llm
            .generate(LLMRequest {
                model: self.model.clone(),
                prompt,
                system_prompt: None,
            })
            .await
            .map_err(|e| {
                WorkflowError::ToolInvocation(format!("language model call failed: {}", e))
            })?;
        Ok(response.content.trim().to_string())
    }
}

#[async_trait]
impl WorkerAgent for ResponseAgent {
    fn name(&self) -> AgentName {
        AgentName::ResponseAgent
    }

    fn description(&self) -> &str {
        "Writes the final answer from the collected findings."
    }

    async fn execute(&self, state: &mut AgentState) -> Result<WorkerStatus, WorkflowError> {
        state.last_agent = self.name().to_string();
        tracing::info!("ResponseAgent generating the final answer");

        match self.generate_response(state).await {
            Ok(response) => {
                state.response_agent_note =
                    "ResponseAgent generated the final response".to_string();
                state.response_agent_result =
                    json!({"response_characters": response.chars().count()});
                state.final_response = response;
                state.completed = true;
                Ok(WorkerStatus::Completed)
            }
            Err(e) => {
                log::warn!("ResponseAgent recovered from an error: {}", e);
                state.response_agent_note =
                    format!("ResponseAgent encountered an error: {}", e);
                state.response_agent_result = json!({"error": e.to_string()});
                // A degraded answer still completes the workflow; the caller
                // sees the error text instead of silence.
                state.final_response = format!("Error generating response: {}", e);
                state.completed = true;
                Ok(WorkerStatus::Recovered {
                    error: e.to_string(),
                })
            }
        }
    }
}

/// Findings block for the response prompt: a bounded sample of reviews and
/// businesses plus the analysis figures, as plain bullet lists.
fn build_context(state: &AgentState) -> String {
    let mut parts: Vec<String> = Vec::new();

    let reviews = AgentState::aggregate_records(&state.search_results, "reviews");
    if !reviews.is_empty() {
        let mut section = format!("Reviews found ({}):\n", reviews.len());
        for review in reviews.iter().take(MAX_CONTEXT_RECORDS) {
            let stars = review.get("stars").and_then(Value::as_f64).unwrap_or(0.0);
            let text = review.get("text").and_then(Value::as_str).unwrap_or("");
            section.push_str(&format!(
                "- {} stars: {}\n",
                stars,
                preview(text, REVIEW_PREVIEW_CHARS)
            ));
        }
        parts.push(section);
    }

    let businesses = AgentState::aggregate_records(&state.search_results, "businesses");
    if !businesses.is_empty() {
        let mut section = format!("Businesses found ({}):\n", businesses.len());
        for business in businesses.iter().take(MAX_CONTEXT_RECORDS) {
            let name = business
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or("Unknown");
            let stars = business.get("stars").and_then(Value::as_f64).unwrap_or(0.0);
            let categories = business
                .get("categories")
                .and_then(Value::as_str)
                .unwrap_or("");
            section.push_str(&format!("- {} ({} stars) - {}\n", name, stars, categories));
        }
        parts.push(section);
    }

    if let Some(sentiment) = state.analysis_results.get("sentiment_analysis") {
        let mut section = String::from("Sentiment analysis:\n");
        for (label, key) in [
            ("Reviews analyzed", "total_reviews"),
            ("Positive", "positive_percentage"),
            ("Negative", "negative_percentage"),
        ] {
            if let Some(value) = sentiment.get(key) {
                section.push_str(&format!("- {}: {}\n", label, value));
            }
        }
        if let Some(overall) = sentiment.get("overall_sentiment").and_then(Value::as_str) {
            section.push_str(&format!("- Overall sentiment: {}\n", overall));
        }
        parts.push(section);
    }

    if let Some(stats) = state.analysis_results.get("business_analysis") {
        let mut section = String::from("Business statistics:\n");
        for (label, key) in [
            ("Businesses", "total_businesses"),
            ("Average rating", "average_stars"),
            ("Total reviews", "total_reviews"),
            ("Avg reviews per business", "avg_reviews_per_business"),
        ] {
            if let Some(value) = stats.get(key) {
                section.push_str(&format!("- {}: {}\n", label, value));
            }
        }
        parts.push(section);
    }

    if parts.is_empty() {
        "No findings were collected for this question.".to_string()
    } else {
        parts.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm_client::providers::scripted::ScriptedProvider;

    #[tokio::test]
    async fn writes_the_final_response_and_completes_the_workflow() {
        let llm = Arc::new(LlmClient::with_provider(Box::new(ScriptedProvider::new([
            "The sentiment around downtown pizza places is largely positive.",
        ]))));
        let agent = ResponseAgent::new(llm, "m");

        let mut state = AgentState::new("How do people feel about pizza downtown?");
        state.search_results = json!({
            "reviews": [{"stars": 5.0, "text": "Best slice in town"}],
            "businesses": [{"name": "Franco's", "stars": 4.0, "categories": "Pizza"}],
        });
        state.analysis_results = json!({
            "sentiment_analysis": {"overall_sentiment": "POSITIVE", "total_reviews": 1},
        });

        let status = agent.execute(&mut state).await.unwrap();
        assert_eq!(status, WorkerStatus::Completed);
        assert!(state.completed);
        assert!(state.final_response.contains("largely positive"));
        assert_eq!(
            state.response_agent_result["response_characters"],
            state.final_response.chars().count()
        );
    }

    #[tokio::test]
    async fn model_failure_degrades_to_an_error_response() {
        // exhausted provider fails on the first call
        let llm = Arc::new(LlmClient::with_provider(Box::new(
            ScriptedProvider::new(Vec::<String>::new()),
        )));
        let agent = ResponseAgent::new(llm, "m");

        let mut state = AgentState::new("anything");
        let status = agent.execute(&mut state).await.unwrap();

        assert!(matches!(status, WorkerStatus::Recovered { .. }));
        assert!(state.completed);
        assert!(state.final_response.starts_with("Error generating response:"));
        assert!(state.response_agent_result["error"].is_string());
    }

    #[test]
    fn context_mentions_every_findings_section() {
        let mut state = AgentState::new("q");
        state.search_results = json!({
            "reviews": [{"stars": 4.0, "text": "Good"}],
            "businesses": [{"name": "A", "stars": 3.0, "categories": "Food"}],
        });
        state.analysis_results = json!({
            "sentiment_analysis": {"overall_sentiment": "POSITIVE"},
            "business_analysis": {"total_businesses": 1, "average_stars": 3.0},
        });
        let context = build_context(&state);
        assert!(context.contains("Reviews found (1):"));
        assert!(context.contains("Businesses found (1):"));
        assert!(context.contains("Overall sentiment: POSITIVE"));
        assert!(context.contains("Average rating: 3"));
    }
}
