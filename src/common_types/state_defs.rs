use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::agent_defs::RouteDecision;

/// State shared between all agents for one query. Created once per query,
/// threaded mutably through every node, discarded after the workflow returns.
///
/// The state is an additive log: each worker writes its own namespaced
/// note/result pair and appends trace messages, and never removes fields
/// written by another worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentState {
    pub user_query: String,
    /// Legacy flat aggregate derived from the search worker's result
    /// (`{"businesses": [...], "reviews": [...]}`), kept for consumers that
    /// only understand the flat shape.
    pub search_results: Value,
    /// Legacy aggregate derived from the analysis worker's result.
    pub analysis_results: Value,
    pub final_response: String,
    pub search_agent_note: String,
    pub search_agent_result: Value,
    pub analysis_agent_note: String,
    pub analysis_agent_result: Value,
    pub response_agent_note: String,
    pub response_agent_result: Value,
    pub last_agent: String,
    pub next_agent: Option<RouteDecision>,
    pub completed: bool,
    /// Append-only execution trace, chronological.
    pub messages: Vec<String>,
}

impl AgentState {
    pub fn new(user_query: impl Into<String>) -> Self {
        AgentState {
            user_query: user_query.into(),
            search_results: empty_object(),
            analysis_results: empty_object(),
            final_response: String::new(),
            search_agent_note: String::new(),
            search_agent_result: empty_object(),
            analysis_agent_note: String::new(),
            analysis_agent_result: empty_object(),
            response_agent_note: String::new(),
            response_agent_result: empty_object(),
            last_agent: String::new(),
            next_agent: None,
            completed: false,
            messages: Vec::new(),
        }
    }

    pub fn push_message(&mut self, message: impl Into<String>) {
        self.messages.push(message.into());
    }

    /// Records from a legacy aggregate (`search_results["reviews"]` etc.),
    /// empty when the key is absent or not an array.
    pub fn aggregate_records<'a>(aggregate: &'a Value, key: &str) -> &'a [Value] {
        aggregate
            .get(key)
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

fn empty_object() -> Value {
    Value::Object(serde_json::Map::new())
}

/// Result record handed back to the caller of `process_query`.
#[derive(Debug, Clone, Serialize)]
pub struct QueryOutcome {
    pub success: bool,
    pub query: String,
    pub final_response: String,
    pub search_results: Value,
    pub analysis_results: Value,
    pub execution_log: Vec<String>,
    pub completed: bool,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
}
