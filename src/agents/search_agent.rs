use std::sync::Arc;

use async_trait::async_trait;
use handlebars::Handlebars;
use serde_json::{json, Value};

use crate::common_types::{AgentName, AgentState, WorkflowError};
use crate::llm_client::LlmClient;
use crate::output_parser::parse_structured_output;
use crate::tool_loop::ToolLoop;
use crate::tools::{BusinessInfoTool, BusinessSearchTool, RecordSearch, ReviewSearchTool};

use super::base_agent::{WorkerAgent, WorkerStatus};
use super::prompts::SEARCH_TASK_TEMPLATE;

/// Retrieval worker. Runs the reasoning loop over the search tools, then
/// writes its structured result plus the flat review/business aggregates
/// into the shared state.
pub struct SearchAgent {
    llm: Arc<LlmClient>,
    reviews: Arc<dyn RecordSearch>,
    businesses: Arc<dyn RecordSearch>,
    model: String,
    handlebars: Handlebars<'static>,
}

impl SearchAgent {
    pub fn new(
        llm: Arc<LlmClient>,
        reviews: Arc<dyn RecordSearch>,
        businesses: Arc<dyn RecordSearch>,
        model: impl Into<String>,
    ) -> Self {
        let mut handlebars = Handlebars::new();
        handlebars.set_strict_mode(true);
        SearchAgent {
            llm,
            reviews,
            businesses,
            model: model.into(),
            handlebars,
        }
    }

    async fn run_search(&self, state: &AgentState) -> Result<(String, Value), WorkflowError> {
        let task = self
            .handlebars
            .render_template(
                SEARCH_TASK_TEMPLATE,
                &json!({"user_query": state.user_query}),
            )
            .map_err(|e| WorkflowError::Fatal(format!("prompt template render failed: {}", e)))?;

        let tools: Vec<Arc<dyn crate::tools::Tool>> = vec![
            Arc::new(ReviewSearchTool::new(self.reviews.clone())),
            Arc::new(BusinessSearchTool::new(self.businesses.clone())),
            Arc::new(BusinessInfoTool::new(self.businesses.clone())),
        ];

        let outcome = ToolLoop::new(self.llm.clone(), tools, self.model.clone())
            .run(&task)
            .await?;
        Ok((outcome.final_text, Value::Object(outcome.tool_outputs)))
    }
}

#[async_trait]
impl WorkerAgent for SearchAgent {
    fn name(&self) -> AgentName {
        AgentName::SearchAgent
    }

    fn description(&self) -> &str {
        "Retrieves reviews and businesses relevant to the user question."
    }

    async fn execute(&self, state: &mut AgentState) -> Result<WorkerStatus, WorkflowError> {
        state.last_agent = self.name().to_string();
        tracing::info!("SearchAgent searching for: {}", state.user_query);

        let (final_text, observed_outputs) = match self.run_search(state).await {
            Ok(pair) => pair,
            Err(e) => {
                log::warn!("SearchAgent recovered from an error: {}", e);
                state.search_agent_note = format!("SearchAgent encountered an error: {}", e);
                state.search_agent_result = json!({"error": e.to_string()});
                return Ok(WorkerStatus::Recovered {
                    error: e.to_string(),
                });
            }
        };

        let parsed = parse_structured_output(&final_text);
        state.search_agent_note = parsed
            .note
            .clone()
            .unwrap_or_else(|| "SearchAgent completed search task".to_string());
        state.search_agent_result = parsed.result.to_value();

        // Prefer the tool outputs the model echoed back; fall back to the
        // outputs observed during the loop when the echo is absent or empty.
        let echoed = parsed
            .result
            .as_parsed()
            .and_then(|result| result.get("tool_outputs"))
            .filter(|outputs| outputs.as_object().map_or(true, |map| !map.is_empty()))
            .cloned();
        let outputs = echoed.unwrap_or(observed_outputs);

        let mut businesses = Vec::new();
        let mut reviews = Vec::new();
        if let Some(map) = outputs.as_object() {
            for (tool_name, output) in map {
                let lower = tool_name.to_lowercase();
                if lower.contains("business") {
                    collect_records(output, "businesses", "business", &mut businesses);
                } else if lower.contains("review") {
                    collect_records(output, "reviews", "review", &mut reviews);
                }
            }
        }

        if let Some(aggregate) = state.search_results.as_object_mut() {
            if !reviews.is_empty() {
                aggregate.insert("reviews".to_string(), Value::Array(reviews));
            }
            if !businesses.is_empty() {
                aggregate.insert("businesses".to_string(), Value::Array(businesses));
            }
        }

        Ok(WorkerStatus::Completed)
    }
}

/// Flatten records out of a tool output. Outputs may arrive as a wrapped
/// object, a bare record, or a list of either; error observations are
/// dropped.
fn collect_records(value: &Value, plural: &str, singular: &str, out: &mut Vec<Value>) {
    match value {
        Value::Array(items) => {
            for item in items {
                collect_records(item, plural, singular, out);
            }
        }
        Value::Object(map) => {
            if let Some(Value::Array(items)) = map.get(plural) {
                out.extend(items.iter().cloned());
            } else if let Some(record) = map.get(singular) {
                out.push(record.clone());
            } else if !map.contains_key("error") {
                out.push(value.clone());
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm_client::providers::scripted::ScriptedProvider;
    use anyhow::Result;

    #[derive(Debug)]
    struct EmptySearch;

    #[async_trait]
    impl RecordSearch for EmptySearch {
        async fn search(&self, _query: &str, _k: usize) -> Result<Vec<Value>> {
            Ok(vec![])
        }

        async fn get_by_id(&self, _id: &str) -> Result<Option<Value>> {
            Ok(None)
        }
    }

    #[tokio::test]
    async fn unstructured_answer_degrades_without_touching_aggregates() {
        let llm = Arc::new(LlmClient::with_provider(Box::new(ScriptedProvider::new([
            "I could not find anything useful for this question.",
        ]))));
        let agent = SearchAgent::new(llm, Arc::new(EmptySearch), Arc::new(EmptySearch), "m");

        let mut state = AgentState::new("anything about pizza");
        let status = agent.execute(&mut state).await.unwrap();

        assert_eq!(status, WorkerStatus::Completed);
        assert_eq!(
            state.search_agent_note,
            "No structured output found in agent answer"
        );
        assert!(state.search_agent_result["full_output"].is_string());
        assert_eq!(state.search_results, json!({}));
        assert_eq!(state.last_agent, "SearchAgent");
    }

    #[test]
    fn collect_records_unwraps_every_supported_shape() {
        let mut out = Vec::new();
        collect_records(
            &json!([
                {"businesses": [{"name": "A"}, {"name": "B"}]},
                {"business": {"name": "C"}},
                {"name": "D"},
                {"error": "dropped"},
            ]),
            "businesses",
            "business",
            &mut out,
        );
        let names: Vec<&str> = out.iter().filter_map(|v| v["name"].as_str()).collect();
        assert_eq!(names, ["A", "B", "C", "D"]);
    }
}
