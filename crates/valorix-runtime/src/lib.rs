//! Runtime for valorix evaluations
//!
//! This crate turns a validated [`WorkflowGraph`](valorix_workflow::WorkflowGraph)
//! into a finished [`EvaluationRun`]:
//! - [`ExecutionEngine`] walks the graph, dispatching ready nodes under a global
//!   admission limit and applying the retry/fallback [`policy`]
//! - [`Orchestrator`] is the facade callers use to start, inspect, wait for and
//!   cancel runs
//! - [`OutcomeSink`] receives one consolidated [`EvaluationOutcome`] per
//!   completed or failed run

pub mod config;
pub mod engine;
pub mod orchestrator;
pub mod outcome;
pub mod policy;
pub mod run;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{EngineConfig, EngineConfigBuilder};
pub use engine::ExecutionEngine;
pub use orchestrator::Orchestrator;
pub use outcome::{EvaluationOutcome, LogSink, NodeFailure, OutcomeSink, SkippedNode};
pub use policy::{Resolution, RetryPolicy};
pub use run::{EvaluationRun, HaltReason, NodeStatus, RunState, StatusView};
