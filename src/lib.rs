pub mod agents;
pub mod common_types;
pub mod llm_client;
pub mod output_parser;
pub mod tool_loop;
pub mod tools;
pub mod workflow;

pub use common_types::{
    AgentName, AgentState, QueryOutcome, RouteDecision, WorkflowError,
};
pub use llm_client::LlmClient;
pub use output_parser::{parse_structured_output, ParsedOutput, ResultPayload};
pub use workflow::{MultiAgentWorkflow, DEFAULT_MAX_ITERATIONS};

/// Initialize env_logger once for binaries and integration harnesses.
/// Defaults to info-level output; RUST_LOG overrides as usual.
pub fn setup_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init();
}
