//! Supervisor-routed workflow over the worker agents.
//!
//! One query runs as a cycle: the supervisor picks the next worker, the
//! worker mutates the shared state, control returns to the supervisor. The
//! cycle ends on a FINISH decision or at the iteration cap.

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;

use crate::agents::{
    AnalysisAgent, ResponseAgent, SearchAgent, SupervisorAgent, WorkerAgent, WorkerStatus,
};
use crate::common_types::{
    generate_id, AgentName, AgentState, QueryOutcome, RouteDecision, WorkflowError,
};
use crate::llm_client::LlmClient;
use crate::tools::{RecordSearch, SentimentAnalyzer};

pub const DEFAULT_MAX_ITERATIONS: usize = 10;

pub struct MultiAgentWorkflow {
    supervisor: SupervisorAgent,
    workers: Vec<Arc<dyn WorkerAgent>>,
    max_iterations: usize,
}

impl MultiAgentWorkflow {
    pub fn new(
        llm: Arc<LlmClient>,
        reviews: Arc<dyn RecordSearch>,
        businesses: Arc<dyn RecordSearch>,
        analyzer: Arc<dyn SentimentAnalyzer>,
        model: impl Into<String>,
    ) -> Self {
        let model = model.into();
        let workers: Vec<Arc<dyn WorkerAgent>> = vec![
            Arc::new(SearchAgent::new(
                llm.clone(),
                reviews,
                businesses,
                model.clone(),
            )),
            Arc::new(AnalysisAgent::new(llm.clone(), analyzer, model.clone())),
            Arc::new(ResponseAgent::new(llm.clone(), model.clone())),
        ];
        MultiAgentWorkflow {
            supervisor: SupervisorAgent::new(llm, model),
            workers,
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }

    /// Assemble a workflow from pre-built parts. Deployments that swap in
    /// their own workers go through here.
    pub fn from_parts(supervisor: SupervisorAgent, workers: Vec<Arc<dyn WorkerAgent>>) -> Self {
        MultiAgentWorkflow {
            supervisor,
            workers,
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Run one query to completion and package the outcome. Never panics;
    /// unrecoverable failures come back as an error outcome carrying
    /// whatever partial state the workflow produced.
    pub async fn process_query(&self, user_query: impl Into<String>) -> QueryOutcome {
        let started_at = Utc::now();
        let user_query = user_query.into();
        let query_id = generate_id();
        log::info!("Processing query {}: {}", query_id, user_query);

        let mut state = AgentState::new(user_query.clone());
        match self.run_to_completion(&mut state).await {
            Ok(()) => QueryOutcome {
                success: !state.final_response.is_empty(),
                query: user_query,
                final_response: state.final_response,
                search_results: state.search_results,
                analysis_results: state.analysis_results,
                execution_log: state.messages,
                completed: state.completed,
                error: None,
                started_at,
            },
            Err(e) => {
                log::error!("Workflow aborted: {}", e);
                QueryOutcome {
                    success: false,
                    query: user_query,
                    final_response: format!("I apologize, but I encountered an error: {}", e),
                    search_results: state.search_results,
                    analysis_results: state.analysis_results,
                    execution_log: state.messages,
                    completed: state.completed,
                    error: Some(e.to_string()),
                    started_at,
                }
            }
        }
    }

    async fn run_to_completion(&self, state: &mut AgentState) -> Result<(), WorkflowError> {
        let mut decisions = 0;
        loop {
            if decisions >= self.max_iterations {
                state.push_message(format!(
                    "Maximum iterations ({}) reached, finalizing",
                    self.max_iterations
                ));
                break;
            }
            decisions += 1;

            let decision = self.supervisor.decide(state).await;
            state.next_agent = Some(decision);
            state.last_agent = "SupervisorAgent".to_string();
            state.push_message(format!("Supervisor routing to: {}", decision));
            log::debug!("Supervisor routing to: {}", decision);

            let name = match decision {
                RouteDecision::Finish => break,
                RouteDecision::Worker(name) => name,
            };

            let worker = self
                .workers
                .iter()
                .find(|w| w.name() == name)
                .ok_or_else(|| {
                    WorkflowError::Routing(format!("no worker registered for {}", name))
                })?;

            if let WorkerStatus::Recovered { error } = worker.execute(state).await? {
                log::warn!("{} recovered from: {}", name, error);
            }
            let trace = trace_for(name, state);
            state.push_message(trace);
        }
        Ok(())
    }
}

/// One-line execution trace for a finished worker turn.
fn trace_for(name: AgentName, state: &AgentState) -> String {
    let summary = match name {
        AgentName::SearchAgent => {
            let reviews = AgentState::aggregate_records(&state.search_results, "reviews");
            let businesses = AgentState::aggregate_records(&state.search_results, "businesses");
            let mut parts = Vec::new();
            if !reviews.is_empty() {
                parts.push(format!("Found {} reviews", reviews.len()));
            }
            if !businesses.is_empty() {
                parts.push(format!("Found {} businesses", businesses.len()));
            }
            if parts.is_empty() {
                "No results".to_string()
            } else {
                parts.join(", ")
            }
        }
        AgentName::AnalysisAgent => {
            let mut parts = Vec::new();
            if let Some(overall) = state
                .analysis_results
                .get("sentiment_analysis")
                .and_then(|s| s.get("overall_sentiment"))
                .and_then(Value::as_str)
            {
                parts.push(format!("Sentiment: {}", overall));
            }
            if let Some(avg) = state
                .analysis_results
                .get("business_analysis")
                .and_then(|s| s.get("average_stars"))
            {
                parts.push(format!("Avg rating: {} stars", avg));
            }
            if parts.is_empty() {
                "No analysis".to_string()
            } else {
                parts.join(", ")
            }
        }
        AgentName::ResponseAgent => {
            if state.final_response.is_empty() {
                "No response generated".to_string()
            } else {
                "Generated final response".to_string()
            }
        }
    };
    format!("{} completed: {}", name, summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm_client::providers::scripted::ScriptedProvider;
    use crate::llm_client::providers::{LLMProvider, LLMRequest, LLMResponse};
    use anyhow::Result;
    use async_trait::async_trait;
    use serde_json::json;

    #[derive(Debug)]
    struct FixedSearch {
        records: Vec<Value>,
    }

    #[async_trait]
    impl RecordSearch for FixedSearch {
        async fn search(&self, _query: &str, k: usize) -> Result<Vec<Value>> {
            Ok(self.records.iter().take(k).cloned().collect())
        }

        async fn get_by_id(&self, id: &str) -> Result<Option<Value>> {
            Ok(self
                .records
                .iter()
                .find(|r| r.get("business_id").and_then(Value::as_str) == Some(id))
                .cloned())
        }
    }

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
                "confidence": 0.85,
            }))
        }
    }

    fn sample_reviews() -> Vec<Value> {
        (1..=5)
            .map(|i| {
                json!({
                    "review_id": format!("r{}", i),
                    "business_id": if i <= 3 { "b1" } else { "b2" },
                    "stars": 4.0,
                    "text": format!("Review number {}", i),
                })
            })
            .collect()
    }

    fn sample_businesses() -> Vec<Value> {
        vec![
            json!({"business_id": "b1", "name": "Franco's Pizza", "stars": 4.0, "categories": "Pizza"}),
            json!({"business_id": "b2", "name": "Luigi's", "stars": 2.5, "categories": "Italian"}),
        ]
    }

    fn workflow_with(replies: Vec<String>) -> MultiAgentWorkflow {
        let llm = Arc::new(LlmClient::with_provider(Box::new(ScriptedProvider::new(
            replies,
        ))));
        MultiAgentWorkflow::new(
            llm,
            Arc::new(FixedSearch {
                records: sample_reviews(),
            }),
            Arc::new(FixedSearch {
                records: sample_businesses(),
            }),
            Arc::new(FixedAnalyzer),
            "test-model",
        )
    }

    fn fenced(body: &str) -> String {
        format!("```json\n{}\n```", body)
    }

    #[tokio::test]
    async fn full_query_runs_search_analysis_response_then_finishes() {
        let search_final = json!({
            "note": "Found 5 reviews and 2 businesses about pizza.",
            "result": {
                "tool_outputs": {
                    "search_reviews": [{"tool": "review_search", "reviews": sample_reviews()}],
                    "search_businesses": [{"tool": "business_search", "businesses": sample_businesses()}],
                },
                "query_processed": "pizza places downtown",
                "reasoning_summary": "Searched reviews then businesses.",
            }
        });
        let analysis_final = json!({
            "note": "Sentiment is strongly positive.",
            "result": {
                "tool_outputs": {
                    "analyze_sentiment": [{
                        "tool": "sentiment_analysis",
                        "analysis": {
                            "total_reviews": 5,
                            "positive_percentage": 80.0,
                            "negative_percentage": 20.0,
                            "overall_sentiment": "POSITIVE",
                            "confidence": 0.85,
                        },
                    }],
                },
                "query_processed": "sentiment over collected reviews",
                "reasoning_summary": "Ran the sentiment tool once.",
            }
        });

        let replies = vec![
            "SearchAgent".to_string(),
            fenced(r#"{"action": "search_reviews", "action_input": {"query": "pizza"}}"#),
            fenced(r#"{"action": "search_businesses", "action_input": {"query": "pizza"}}"#),
            fenced(&search_final.to_string()),
            "AnalysisAgent".to_string(),
            fenced(r#"{"action": "analyze_sentiment", "action_input": {}}"#),
            fenced(&analysis_final.to_string()),
            "ResponseAgent".to_string(),
            "Pizza places downtown are well liked, led by Franco's Pizza.".to_string(),
            "FINISH".to_string(),
        ];

        let outcome = workflow_with(replies)
            .process_query("What do people think of pizza places downtown?")
            .await;

        assert!(outcome.success);
        assert!(outcome.completed);
        assert!(outcome.error.is_none());
        assert_eq!(
            outcome.final_response,
            "Pizza places downtown are well liked, led by Franco's Pizza."
        );

        assert_eq!(
            outcome.search_results["reviews"],
            Value::Array(sample_reviews())
        );
        assert_eq!(
            outcome.search_results["businesses"],
            Value::Array(sample_businesses())
        );
        assert_eq!(
            outcome.analysis_results["sentiment_analysis"]["overall_sentiment"],
            "POSITIVE"
        );
        assert_eq!(
            outcome.analysis_results["business_analysis"]["average_stars"],
            3.25
        );

        assert_eq!(
            outcome.execution_log,
            vec![
                "Supervisor routing to: SearchAgent",
                "SearchAgent completed: Found 5 reviews, Found 2 businesses",
                "Supervisor routing to: AnalysisAgent",
                "AnalysisAgent completed: Sentiment: POSITIVE, Avg rating: 3.25 stars",
                "Supervisor routing to: ResponseAgent",
                "ResponseAgent completed: Generated final response",
                "Supervisor routing to: FINISH",
            ]
        );
    }

    /// Provider that always routes to ResponseAgent and never says FINISH.
    #[derive(Debug)]
    struct NeverFinishes;

    #[async_trait]
    impl LLMProvider for NeverFinishes {
        fn name(&self) -> String {
            "NeverFinishes".to_string()
        }

        async fn generate(&self, request: LLMRequest) -> Result<LLMResponse, anyhow::Error> {
            let content = if request.prompt.contains("Respond with ONLY") {
                "ResponseAgent".to_string()
            } else {
                "Here is yet another final response.".to_string()
            };
            Ok(LLMResponse { content })
        }
    }

    #[tokio::test]
    async fn iteration_cap_halts_a_supervisor_that_never_finishes() {
        let llm = Arc::new(LlmClient::with_provider(Box::new(NeverFinishes)));
        let workflow = MultiAgentWorkflow::new(
            llm,
            Arc::new(FixedSearch { records: vec![] }),
            Arc::new(FixedSearch { records: vec![] }),
            Arc::new(FixedAnalyzer),
            "test-model",
        );

        let outcome = workflow.process_query("loop forever").await;

        let routing_count = outcome
            .execution_log
            .iter()
            .filter(|m| m.starts_with("Supervisor routing to:"))
            .count();
        assert_eq!(routing_count, DEFAULT_MAX_ITERATIONS);
        assert_eq!(
            outcome.execution_log.last().unwrap(),
            "Maximum iterations (10) reached, finalizing"
        );
        // the response worker did run, so the outcome still carries an answer
        assert!(outcome.success);
        assert!(outcome.completed);
    }

    #[derive(Debug)]
    struct ExplodingWorker;

    #[async_trait]
    impl WorkerAgent for ExplodingWorker {
        fn name(&self) -> AgentName {
            AgentName::SearchAgent
        }

        fn description(&self) -> &str {
            "Always fails fatally."
        }

        async fn execute(&self, _state: &mut AgentState) -> Result<WorkerStatus, WorkflowError> {
            Err(WorkflowError::Fatal("index unavailable".to_string()))
        }
    }

    #[tokio::test]
    async fn fatal_worker_error_becomes_an_error_outcome() {
        let llm = Arc::new(LlmClient::with_provider(Box::new(ScriptedProvider::new([
            "SearchAgent",
        ]))));
        let workflow = MultiAgentWorkflow::from_parts(
            SupervisorAgent::new(llm, "test-model"),
            vec![Arc::new(ExplodingWorker)],
        );

        let outcome = workflow.process_query("anything").await;

        assert!(!outcome.success);
        assert!(!outcome.completed);
        assert!(outcome
            .final_response
            .starts_with("I apologize, but I encountered an error:"));
        assert!(outcome.error.unwrap().contains("index unavailable"));
        assert_eq!(outcome.execution_log, vec!["Supervisor routing to: SearchAgent"]);
    }

    #[tokio::test]
    async fn unroutable_decision_aborts_with_a_routing_error() {
        let llm = Arc::new(LlmClient::with_provider(Box::new(ScriptedProvider::new([
            "AnalysisAgent",
        ]))));
        let workflow = MultiAgentWorkflow::from_parts(
            SupervisorAgent::new(llm, "test-model"),
            vec![],
        );

        let outcome = workflow.process_query("anything").await;
        assert!(!outcome.success);
        assert!(outcome
            .error
            .unwrap()
            .contains("no worker registered for AnalysisAgent"));
    }
}
