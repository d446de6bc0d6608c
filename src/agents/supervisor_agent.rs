use std::sync::Arc;

use handlebars::Handlebars;
use serde_json::json;

use crate::common_types::{preview, AgentName, AgentState, RouteDecision};
use crate::llm_client::{LLMRequest, LlmClient};

use super::prompts::SUPERVISOR_DECISION_TEMPLATE;

const RESPONSE_STATUS_PREVIEW_CHARS: usize = 300;

/// Routing node. Reads the worker notes out of the shared state, asks the
/// model for the next hop and validates the reply against the closed agent
/// set. Never fails: an invalid or unavailable model answer falls back to a
/// deterministic stage-based decision.
pub struct SupervisorAgent {
    llm: Arc<LlmClient>,
    model: String,
    handlebars: Handlebars<'static>,
}

impl SupervisorAgent {
    pub fn new(llm: Arc<LlmClient>, model: impl Into<String>) -> Self {
        let mut handlebars = Handlebars::new();
        handlebars.set_strict_mode(true);
        SupervisorAgent {
            llm,
            model: model.into(),
            handlebars,
        }
    }

    pub async fn decide(&self, state: &AgentState) -> RouteDecision {
        let reply = match self.ask_model(state).await {
            Ok(reply) => reply,
            Err(e) => {
                log::warn!("Supervisor model call failed, using fallback: {}", e);
                return Self::fallback_decision(state);
            }
        };

        match reply.trim().parse::<RouteDecision>() {
            Ok(decision) => decision,
            Err(e) => {
                log::warn!("Supervisor produced an invalid route, using fallback: {}", e);
                Self::fallback_decision(state)
            }
        }
    }

    /// Stage-based routing used whenever the model's answer is unusable:
    /// search, then analysis, then response, then finish.
    pub fn fallback_decision(state: &AgentState) -> RouteDecision {
        if state.search_agent_note.is_empty() {
            RouteDecision::Worker(AgentName::SearchAgent)
        } else if state.analysis_agent_note.is_empty() {
            RouteDecision::Worker(AgentName::AnalysisAgent)
        } else if state.final_response.is_empty() {
            RouteDecision::Worker(AgentName::ResponseAgent)
        } else {
            RouteDecision::Finish
        }
    }

    async fn ask_model(&self, state: &AgentState) -> Result<String, anyhow::Error> {
        let search_status = if state.search_agent_note.is_empty() {
            "Search: Not completed".to_string()
        } else {
            format!("Search: {}", state.search_agent_note)
        };
        let analysis_status = if state.analysis_agent_note.is_empty() {
            "Analysis: Not completed".to_string()
        } else {
            format!("Analysis: {}", state.analysis_agent_note)
        };
        let response_status = if state.final_response.is_empty() {
            "Final Response: Not completed".to_string()
        } else {
            format!(
                "Final Response: {}",
                preview(&state.final_response, RESPONSE_STATUS_PREVIEW_CHARS)
            )
        };

        let last_agent = if state.last_agent.is_empty() {
            "none"
        } else {
            state.last_agent.as_str()
        };

        let prompt = self.handlebars.render_template(
            SUPERVISOR_DECISION_TEMPLATE,
            &json!({
                "user_query": state.user_query,
                "last_agent": last_agent,
                "search_status": search_status,
                "analysis_status": analysis_status,
                "response_status": response_status,
            }),
        )?;

        let response = self
            .llm
            .generate(LLMRequest {
                model: self.model.clone(),
                prompt,
                system_prompt: None,
            })
            .await?;
        Ok(response.content)
    }
}
