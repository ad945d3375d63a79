//! Consolidated evaluation results and their outbound sink

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::info;
use valorix_core::AgentError;
use valorix_workflow::{NodeState, SkipReason};

use crate::run::{EvaluationRun, RunState};

/// A node that failed terminally
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeFailure {
    pub node_id: String,
    /// Agent holding the node when it failed
    pub agent_id: String,
    pub tried_agents: Vec<String>,
    pub total_attempts: u32,
    pub error: Option<AgentError>,
}

/// A node that was never attempted (or never finished its retries)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedNode {
    pub node_id: String,
    pub reason: Option<SkipReason>,
}

/// Single consolidated result emitted once a run completes or fails
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationOutcome {
    pub run_id: String,
    pub company_id: String,
    pub evaluation_type: String,
    pub state: RunState,
    /// Outputs of succeeded, report-relevant nodes
    pub outputs: BTreeMap<String, Value>,
    pub failures: Vec<NodeFailure>,
    pub skipped: Vec<SkippedNode>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl EvaluationOutcome {
    /// Aggregate a run snapshot
    pub fn from_run(run: &EvaluationRun) -> Self {
        let mut outputs = BTreeMap::new();
        let mut failures = Vec::new();
        let mut skipped = Vec::new();

        for node in run.workflow.nodes() {
            match node.state {
                NodeState::Succeeded if node.report_relevant => {
                    if let Some(output) = &node.result {
                        outputs.insert(node.node_id.clone(), output.clone());
                    }
                }
                NodeState::FailedTerminal => failures.push(NodeFailure {
                    node_id: node.node_id.clone(),
                    agent_id: node.agent_id.clone(),
                    tried_agents: node.tried_agents.clone(),
                    total_attempts: node.total_attempts,
                    error: node.error.clone(),
                }),
                NodeState::Skipped => skipped.push(SkippedNode {
                    node_id: node.node_id.clone(),
                    reason: node.skip_reason.clone(),
                }),
                _ => {}
            }
        }

        Self {
            run_id: run.run_id.clone(),
            company_id: run.request.company_id.clone(),
            evaluation_type: run.request.evaluation_type.clone(),
            state: run.overall_state,
            outputs,
            failures,
            skipped,
            started_at: run.started_at,
            finished_at: run.finished_at,
        }
    }

    /// Whether every non-skipped node succeeded
    pub fn is_complete(&self) -> bool {
        self.state == RunState::Completed
    }
}

/// Receives the consolidated outcome of each finished run
///
/// Called exactly once per run that ends `Completed` or `Failed`. Cancelled
/// runs emit nothing. Errors are logged by the engine and do not change the
/// run state.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OutcomeSink: Send + Sync {
    /// Store or forward an outcome
    async fn store(&self, outcome: &EvaluationOutcome) -> anyhow::Result<()>;
}

/// Sink that writes a summary line to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

#[async_trait]
impl OutcomeSink for LogSink {
    async fn store(&self, outcome: &EvaluationOutcome) -> anyhow::Result<()> {
        info!(
            "Evaluation {} for '{}' finished {:?}: {} output(s), {} failure(s), {} skipped",
            outcome.run_id,
            outcome.company_id,
            outcome.state,
            outcome.outputs.len(),
            outcome.failures.len(),
            outcome.skipped.len()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{pipeline_registry, ScriptedAgent};
    use serde_json::json;
    use std::time::Duration;
    use valorix_workflow::{EvaluationRequest, NodeSpec, WorkflowTemplate};

    fn finished_run() -> EvaluationRun {
        let registry = pipeline_registry(|_| ScriptedAgent::new());
        let request = EvaluationRequest::new("ACME", "full");
        let template = WorkflowTemplate::new("partial")
            .node(NodeSpec::new("extract", "financial-extractor", "extract").internal())
            .node(NodeSpec::new("strategy", "strategic-analyst", "analyze").after(["extract"]))
            .node(NodeSpec::new("risk", "risk-assessor", "assess").after(["extract"]))
            .node(
                NodeSpec::new("report", "report-generator", "generate")
                    .after(["strategy", "risk"]),
            );
        let workflow = template.instantiate(&request, &registry).unwrap();
        let mut run = EvaluationRun::new("run-7", request, workflow);

        for (position, output) in [(0, json!({"revenue": 1})), (1, json!({"score": 0.8}))] {
            let node = run.workflow.node_at_mut(position).unwrap();
            node.mark_ready();
            node.begin_attempt();
            node.succeed(output, Duration::ZERO);
        }
        let risk = run.workflow.node_at_mut(2).unwrap();
        risk.mark_ready();
        risk.begin_attempt();
        risk.fail(AgentError::permanent("model offline"));
        run.workflow.node_at_mut(3).unwrap().skip(SkipReason::UpstreamFailed {
            node_id: "risk".to_string(),
        });
        run.overall_state = RunState::Failed;
        run
    }

    #[test]
    fn test_outcome_aggregation() {
        let outcome = EvaluationOutcome::from_run(&finished_run());

        assert_eq!(outcome.company_id, "ACME");
        assert_eq!(outcome.state, RunState::Failed);
        assert!(!outcome.is_complete());
        // internal nodes are not reported
        assert_eq!(outcome.outputs.keys().collect::<Vec<_>>(), vec!["strategy"]);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].node_id, "risk");
        assert_eq!(outcome.skipped.len(), 1);
        assert_eq!(
            outcome.skipped[0].reason,
            Some(SkipReason::UpstreamFailed {
                node_id: "risk".to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_log_sink_accepts_outcome() {
        let outcome = finished_run().outcome();
        assert!(LogSink.store(&outcome).await.is_ok());
    }
}
