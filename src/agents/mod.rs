// Agents module
pub mod base_agent;
mod prompts;

pub use base_agent::{WorkerAgent, WorkerStatus};

pub mod search_agent;
pub use search_agent::SearchAgent;

pub mod analysis_agent;
pub use analysis_agent::AnalysisAgent;

pub mod response_agent;
pub use response_agent::ResponseAgent;

pub mod supervisor_agent;
pub use supervisor_agent::SupervisorAgent;
