use async_trait::async_trait;

use crate::common_types::{AgentName, AgentState, WorkflowError};

/// How a worker's turn ended. A worker that hits an internal failure records
/// it into the shared state and reports `Recovered`; the workflow keeps
/// routing either way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerStatus {
    Completed,
    Recovered { error: String },
}

/// One node of the supervised workflow. Workers mutate the shared state in
/// place and never talk to each other directly.
#[async_trait]
pub trait WorkerAgent: Send + Sync {
    fn name(&self) -> AgentName;
    fn description(&self) -> &str;

    /// Run this worker's turn. `Err` is reserved for unrecoverable failures;
    /// everything else is written into the state and reported as a status.
    async fn execute(&self, state: &mut AgentState) -> Result<WorkerStatus, WorkflowError>;
}
