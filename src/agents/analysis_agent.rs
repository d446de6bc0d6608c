use std::sync::Arc;

use async_trait::async_trait;
use handlebars::Handlebars;
use serde_json::{json, Value};

use crate::common_types::{AgentName, AgentState, WorkflowError};
use crate::llm_client::LlmClient;
use crate::output_parser::parse_structured_output;
use crate::tool_loop::ToolLoop;
use crate::tools::{SentimentAnalyzer, SentimentTool};

use super::base_agent::{WorkerAgent, WorkerStatus};
use super::prompts::ANALYSIS_TASK_TEMPLATE;

/// Analysis worker. Computes sentiment metrics through the reasoning loop
/// and deterministic business statistics directly from the collected data.
pub struct AnalysisAgent {
    llm: Arc<LlmClient>,
    analyzer: Arc<dyn SentimentAnalyzer>,
    model: String,
    handlebars: Handlebars<'static>,
}

impl AnalysisAgent {
    pub fn new(
        llm: Arc<LlmClient>,
        analyzer: Arc<dyn SentimentAnalyzer>,
        model: impl Into<String>,
    ) -> Self {
        let mut handlebars = Handlebars::new();
        handlebars.set_strict_mode(true);
        AnalysisAgent {
            llm,
            analyzer,
            model: model.into(),
            handlebars,
        }
    }

    async fn run_analysis(
        &self,
        state: &AgentState,
        review_texts: Vec<String>,
    ) -> Result<(String, Value), WorkflowError> {
        let businesses = AgentState::aggregate_records(&state.search_results, "businesses");
        let reviews = AgentState::aggregate_records(&state.search_results, "reviews");

        let business_ids: Vec<&str> = businesses
            .iter()
            .filter_map(|b| b.get("business_id").and_then(Value::as_str))
            .collect();
        // Field names only; the review texts go to the tool, not the prompt.
        let review_fields: Vec<&String> = reviews
            .first()
            .and_then(Value::as_object)
            .map(|map| map.keys().collect())
            .unwrap_or_default();

        let task = self
            .handlebars
            .render_template(
                ANALYSIS_TASK_TEMPLATE,
                &json!({
                    "user_query": state.user_query,
                    "business_ids": business_ids.join(", "),
                    "review_count": reviews.len(),
                    "review_fields": review_fields
                        .iter()
                        .map(|s| s.as_str())
                        .collect::<Vec<_>>()
                        .join(", "),
                }),
            )
            .map_err(|e| WorkflowError::Fatal(format!("prompt template render failed: {}", e)))?;

        let tools: Vec<Arc<dyn crate::tools::Tool>> = vec![Arc::new(SentimentTool::new(
            self.analyzer.clone(),
            review_texts,
        ))];

        let outcome = ToolLoop::new(self.llm.clone(), tools, self.model.clone())
            .run(&task)
            .await?;
        Ok((outcome.final_text, Value::Object(outcome.tool_outputs)))
    }
}

#[async_trait]
impl WorkerAgent for AnalysisAgent {
    fn name(&self) -> AgentName {
        AgentName::AnalysisAgent
    }

    fn description(&self) -> &str {
        "Computes sentiment and statistics over the collected search results."
    }

    async fn execute(&self, state: &mut AgentState) -> Result<WorkerStatus, WorkflowError> {
        state.last_agent = self.name().to_string();

        let reviews = AgentState::aggregate_records(&state.search_results, "reviews");
        let businesses = AgentState::aggregate_records(&state.search_results, "businesses");
        tracing::info!(
            "AnalysisAgent analyzing {} reviews and {} businesses",
            reviews.len(),
            businesses.len()
        );
        if reviews.is_empty() && businesses.is_empty() {
            state.analysis_agent_note =
                "AnalysisAgent found no search results to analyze".to_string();
            state.analysis_agent_result = json!({});
            return Ok(WorkerStatus::Completed);
        }

        let review_texts: Vec<String> = reviews
            .iter()
            .filter_map(|r| r.get("text").and_then(Value::as_str))
            .map(str::to_string)
            .collect();
        let business_stats = business_statistics(businesses, reviews.len());

        let (final_text, observed_outputs) = match self.run_analysis(state, review_texts).await {
            Ok(pair) => pair,
            Err(e) => {
                log::warn!("AnalysisAgent recovered from an error: {}", e);
                state.analysis_agent_note = format!("AnalysisAgent encountered an error: {}", e);
                state.analysis_agent_result = json!({"error": e.to_string()});
                return Ok(WorkerStatus::Recovered {
                    error: e.to_string(),
                });
            }
        };

        let parsed = parse_structured_output(&final_text);
        state.analysis_agent_note = parsed
            .note
            .clone()
            .unwrap_or_else(|| "AnalysisAgent completed analysis task".to_string());
        state.analysis_agent_result = parsed.result.to_value();

        let sentiment = parsed
            .result
            .as_parsed()
            .and_then(|result| result.get("tool_outputs"))
            .and_then(sentiment_from_outputs)
            .or_else(|| sentiment_from_outputs(&observed_outputs));

        if let Some(aggregate) = state.analysis_results.as_object_mut() {
            if let Some(sentiment) = sentiment {
                aggregate.insert("sentiment_analysis".to_string(), sentiment);
            }
            if let Some(stats) = business_stats {
                aggregate.insert("business_analysis".to_string(), stats);
            }
        }

        Ok(WorkerStatus::Completed)
    }
}

/// The first usable sentiment payload recorded for the sentiment tool.
fn sentiment_from_outputs(outputs: &Value) -> Option<Value> {
    let entries = outputs.get("analyze_sentiment")?.as_array()?;
    entries
        .iter()
        .find_map(|entry| entry.get("analysis").cloned())
        .or_else(|| {
            entries
                .iter()
                .find(|entry| entry.get("error").is_none())
                .cloned()
        })
}

/// Deterministic statistics over the business aggregate. Computed in code,
/// not by the model, so the numbers always match the collected data.
fn business_statistics(businesses: &[Value], review_count: usize) -> Option<Value> {
    if businesses.is_empty() {
        return None;
    }
    let stars: Vec<f64> = businesses
        .iter()
        .filter_map(|b| b.get("stars").and_then(Value::as_f64))
        .collect();
    let average_stars = if stars.is_empty() {
        0.0
    } else {
        stars.iter().sum::<f64>() / stars.len() as f64
    };
    let avg_reviews = review_count as f64 / businesses.len() as f64;

    Some(json!({
        "total_businesses": businesses.len(),
        "average_stars": round_to(average_stars, 2),
        "total_reviews": review_count,
        "avg_reviews_per_business": round_to(avg_reviews, 1),
    }))
}

fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm_client::providers::scripted::ScriptedProvider;
    use anyhow::Result;

    #[derive(Debug)]
    struct FixedAnalyzer;

    #[async_trait]
    impl SentimentAnalyzer for FixedAnalyzer {
        async fn analyze(&self, texts: &[String]) -> Result<Value> {
            Ok(json!({
                "total_reviews": texts.len(),
                "positive_percentage": 80.0,
                "negative_percentage": 20.0,
                "overall_sentiment": "POSITIVE",
                "confidence": 0.9,
            }))
        }
    }

    #[tokio::test]
    async fn empty_search_results_short_circuit_the_analysis() {
        // no replies scripted: the model must not be called at all
        let llm = Arc::new(LlmClient::with_provider(Box::new(
            ScriptedProvider::new(Vec::<String>::new()),
        )));
        let agent = AnalysisAgent::new(llm, Arc::new(FixedAnalyzer), "m");

        let mut state = AgentState::new("anything");
        let status = agent.execute(&mut state).await.unwrap();

        assert_eq!(status, WorkerStatus::Completed);
        assert_eq!(
            state.analysis_agent_note,
            "AnalysisAgent found no search results to analyze"
        );
        assert_eq!(state.analysis_results, json!({}));
    }

    #[test]
    fn business_statistics_round_the_way_reports_expect() {
        let businesses = vec![
            json!({"business_id": "b1", "stars": 4.0}),
            json!({"business_id": "b2", "stars": 2.5}),
            json!({"business_id": "b3", "stars": 3.7}),
        ];
        let stats = business_statistics(&businesses, 7).unwrap();
        assert_eq!(stats["total_businesses"], 3);
        assert_eq!(stats["average_stars"], 3.4);
        assert_eq!(stats["total_reviews"], 7);
        assert_eq!(stats["avg_reviews_per_business"], 2.3);
    }

    #[test]
    fn sentiment_extraction_skips_error_observations() {
        let outputs = json!({
            "analyze_sentiment": [
                {"error": "first call failed"},
                {"tool": "sentiment_analysis", "analysis": {"overall_sentiment": "NEGATIVE"}},
            ]
        });
        let sentiment = sentiment_from_outputs(&outputs).unwrap();
        assert_eq!(sentiment["overall_sentiment"], "NEGATIVE");
    }
}
