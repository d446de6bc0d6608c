use thiserror::Error;

/// Failure taxonomy for the workflow. The first three variants are recovered
/// close to where they occur and end up as data in the shared state; only
/// `Fatal` aborts a query.
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// A collaborator call (language model, search index, analyzer) failed.
    #[error("tool invocation failed: {0}")]
    ToolInvocation(String),

    /// Structured-output extraction produced no usable payload.
    #[error("structured output parse failed: {0}")]
    Parse(String),

    /// The supervisor produced a routing target outside the known agent set.
    #[error("invalid routing decision: {0}")]
    Routing(String),

    /// Unrecoverable error surfacing from node execution.
    #[error("workflow aborted: {0}")]
    Fatal(String),
}
