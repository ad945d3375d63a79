//! Evaluation runs and their caller-facing views

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use valorix_core::AgentError;
use valorix_workflow::{EvaluationRequest, NodeState, SkipReason, WorkflowGraph};

use crate::outcome::EvaluationOutcome;

/// Overall lifecycle state of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl RunState {
    /// The run has not reached a final overall state yet
    pub fn is_active(self) -> bool {
        matches!(self, Self::Pending | Self::Running)
    }
}

/// Why the engine stopped dispatching before the graph was exhausted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HaltReason {
    Cancelled,
    DeadlineExceeded,
}

/// One end-to-end execution of a workflow against a request
///
/// The run owns its [`WorkflowGraph`]. Only the engine executing the run
/// mutates it; everyone else works on cloned snapshots.
#[derive(Debug, Clone, Serialize)]
pub struct EvaluationRun {
    pub run_id: String,
    pub request: EvaluationRequest,
    pub workflow: WorkflowGraph,
    pub overall_state: RunState,
    pub halt_reason: Option<HaltReason>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl EvaluationRun {
    /// Create a pending run
    pub fn new(run_id: impl Into<String>, request: EvaluationRequest, workflow: WorkflowGraph) -> Self {
        Self {
            run_id: run_id.into(),
            request,
            workflow,
            overall_state: RunState::Pending,
            halt_reason: None,
            started_at: None,
            finished_at: None,
        }
    }

    /// The engine has stopped working on this run
    ///
    /// A cancelled run reports `Cancelled` as soon as cancellation is
    /// requested, but only finishes once its in-flight nodes have returned.
    pub fn is_finished(&self) -> bool {
        self.finished_at.is_some()
    }

    /// Results of every succeeded node so far, keyed by node id
    pub fn partial_results(&self) -> BTreeMap<String, Value> {
        self.workflow
            .results()
            .into_iter()
            .map(|(node_id, output)| (node_id.to_string(), output.clone()))
            .collect()
    }

    /// Point-in-time view for status queries
    pub fn status_view(&self) -> StatusView {
        StatusView {
            run_id: self.run_id.clone(),
            overall_state: self.overall_state,
            halt_reason: self.halt_reason,
            per_node_states: self.workflow.nodes().iter().map(NodeStatus::from).collect(),
            partial_results: self.partial_results(),
        }
    }

    /// Consolidated result for the persistence layer
    pub fn outcome(&self) -> EvaluationOutcome {
        EvaluationOutcome::from_run(self)
    }
}

/// State of one node as reported to callers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeStatus {
    pub node_id: String,
    pub agent_id: String,
    pub state: NodeState,
    pub attempt: u32,
    pub total_attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<AgentError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<SkipReason>,
}

impl From<&valorix_workflow::WorkflowNode> for NodeStatus {
    fn from(node: &valorix_workflow::WorkflowNode) -> Self {
        Self {
            node_id: node.node_id.clone(),
            agent_id: node.agent_id.clone(),
            state: node.state,
            attempt: node.attempt,
            total_attempts: node.total_attempts,
            error: node.error.clone().filter(|_| node.state != NodeState::Succeeded),
            skip_reason: node.skip_reason.clone(),
        }
    }
}

/// `{overall_state, per_node_states, partial_results}` status shape
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusView {
    pub run_id: String,
    pub overall_state: RunState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub halt_reason: Option<HaltReason>,
    pub per_node_states: Vec<NodeStatus>,
    pub partial_results: BTreeMap<String, Value>,
}
