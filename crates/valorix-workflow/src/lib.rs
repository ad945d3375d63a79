//! Workflow definition for valorix evaluations
//!
//! A [`WorkflowTemplate`] is the static declaration of which agent actions run
//! and in which dependency order. Instantiating it for one
//! [`EvaluationRequest`] yields a validated, acyclic [`WorkflowGraph`] of
//! [`WorkflowNode`]s that the execution engine then walks.

pub mod graph;
pub mod node;
pub mod template;

pub use graph::WorkflowGraph;
pub use node::{AttemptRecord, NodeState, SkipReason, WorkflowNode};
pub use template::{EvaluationRequest, NodeSpec, WorkflowTemplate};
