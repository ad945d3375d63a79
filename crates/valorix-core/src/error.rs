//! Error types for valorix-core

use thiserror::Error;

/// Result type alias for valorix operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced synchronously to callers of the registry, the workflow
/// builder and the orchestrator.
///
/// Node-level agent failures are not represented here: they are contained in
/// the run and reported through node states (see [`crate::AgentError`]).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// An agent with this id is already registered
    #[error("Agent already registered: {0}")]
    DuplicateAgent(String),

    /// No agent is registered under this id
    #[error("Unknown agent: {0}")]
    UnknownAgent(String),

    /// The workflow graph failed validation
    #[error("Invalid workflow: {0}")]
    InvalidWorkflow(String),

    /// No evaluation run is known under this id
    #[error("Unknown run: {0}")]
    UnknownRun(String),

    /// Engine configuration is inconsistent
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The run exists but is in a state that forbids the operation
    #[error("Run {run_id} is still active")]
    RunActive { run_id: String },
}
