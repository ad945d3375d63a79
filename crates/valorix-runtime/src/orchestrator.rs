//! Orchestrator facade
//!
//! The single entry point for starting, inspecting, waiting for and
//! cancelling evaluations. Each run executes on its own tokio task; the
//! orchestrator keeps a watch receiver with the latest snapshot and the
//! run's cancellation token.

use std::collections::HashMap;
use tokio::sync::{RwLock, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;
use valorix_core::{Error, Result};
use valorix_workflow::{EvaluationRequest, WorkflowTemplate};

use crate::engine::ExecutionEngine;
use crate::run::EvaluationRun;

struct RunHandle {
    snapshot: watch::Receiver<EvaluationRun>,
    cancel: CancellationToken,
}

/// Entry point external callers use to drive evaluations
///
/// # Example
///
/// ```ignore
/// let orchestrator = Orchestrator::new(engine, WorkflowTemplate::company_evaluation());
/// let run_id = orchestrator
///     .start(EvaluationRequest::new("ACME-42", "full"))
///     .await?;
/// let run = orchestrator.wait(&run_id).await?;
/// println!("{:?}", run.status_view());
/// ```
pub struct Orchestrator {
    engine: ExecutionEngine,
    default_template: WorkflowTemplate,
    templates: HashMap<String, WorkflowTemplate>,
    runs: RwLock<HashMap<String, RunHandle>>,
}

impl Orchestrator {
    /// Create an orchestrator running `default_template` for every request
    pub fn new(engine: ExecutionEngine, default_template: WorkflowTemplate) -> Self {
        Self {
            engine,
            default_template,
            templates: HashMap::new(),
            runs: RwLock::new(HashMap::new()),
        }
    }

    /// Use `template` for requests with the given evaluation type
    pub fn with_template(
        mut self,
        evaluation_type: impl Into<String>,
        template: WorkflowTemplate,
    ) -> Self {
        self.templates.insert(evaluation_type.into(), template);
        self
    }

    /// Template applied to an evaluation type
    pub fn template_for(&self, evaluation_type: &str) -> &WorkflowTemplate {
        self.templates
            .get(evaluation_type)
            .unwrap_or(&self.default_template)
    }

    pub fn engine(&self) -> &ExecutionEngine {
        &self.engine
    }

    /// Validate the request's workflow and begin executing it
    ///
    /// Returns the new run id immediately. Fails with
    /// [`Error::InvalidWorkflow`] without running anything if the graph does
    /// not validate. Must be called within a tokio runtime.
    pub async fn start(&self, request: EvaluationRequest) -> Result<String> {
        let template = self.template_for(&request.evaluation_type);
        let workflow = template.instantiate(&request, self.engine.registry())?;

        let run_id = Uuid::new_v4().to_string();
        info!(
            "Accepted evaluation {} for company '{}' using template '{}'",
            run_id, request.company_id, template.name
        );

        let run = EvaluationRun::new(run_id.clone(), request, workflow);
        let (updates, snapshot) = watch::channel(run.clone());
        let cancel = CancellationToken::new();

        self.runs.write().await.insert(
            run_id.clone(),
            RunHandle {
                snapshot,
                cancel: cancel.clone(),
            },
        );

        let engine = self.engine.clone();
        tokio::spawn(async move {
            engine.execute_with_updates(run, cancel, updates).await;
        });

        Ok(run_id)
    }

    /// Point-in-time snapshot of a run
    pub async fn status(&self, run_id: &str) -> Result<EvaluationRun> {
        let runs = self.runs.read().await;
        let handle = runs
            .get(run_id)
            .ok_or_else(|| Error::UnknownRun(run_id.to_string()))?;
        Ok(handle.snapshot.borrow().clone())
    }

    /// Cancel a run and return its snapshot once cancellation took effect
    ///
    /// New dispatch stops immediately; in-flight nodes are left to finish and
    /// already succeeded results are kept. Cancelling a run that has already
    /// reached a final state changes nothing.
    pub async fn cancel(&self, run_id: &str) -> Result<EvaluationRun> {
        let (mut snapshot, cancel) = self.handle(run_id).await?;

        if !snapshot.borrow().overall_state.is_active() {
            debug!("Run {} already finished; cancel ignored", run_id);
            return Ok(snapshot.borrow().clone());
        }

        info!("Cancellation requested for run {}", run_id);
        cancel.cancel();

        if snapshot
            .wait_for(|run| !run.overall_state.is_active())
            .await
            .is_err()
        {
            debug!("Run {} stopped publishing before cancellation was observed", run_id);
        }
        Ok(snapshot.borrow().clone())
    }

    /// Wait until the engine has finished with a run
    pub async fn wait(&self, run_id: &str) -> Result<EvaluationRun> {
        let (mut snapshot, _) = self.handle(run_id).await?;
        if snapshot.wait_for(EvaluationRun::is_finished).await.is_err() {
            debug!("Run {} stopped publishing before it finished", run_id);
        }
        Ok(snapshot.borrow().clone())
    }

    /// Forget a finished run, returning its final snapshot
    pub async fn remove(&self, run_id: &str) -> Result<EvaluationRun> {
        let mut runs = self.runs.write().await;
        let handle = runs
            .get(run_id)
            .ok_or_else(|| Error::UnknownRun(run_id.to_string()))?;

        let run = handle.snapshot.borrow().clone();
        if !run.is_finished() {
            return Err(Error::RunActive {
                run_id: run_id.to_string(),
            });
        }

        runs.remove(run_id);
        debug!("Removed run {}", run_id);
        Ok(run)
    }

    /// Ids of every tracked run
    pub async fn run_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.runs.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    async fn handle(
        &self,
        run_id: &str,
    ) -> Result<(watch::Receiver<EvaluationRun>, CancellationToken)> {
        let runs = self.runs.read().await;
        runs.get(run_id)
            .map(|handle| (handle.snapshot.clone(), handle.cancel.clone()))
            .ok_or_else(|| Error::UnknownRun(run_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::policy::RetryPolicy;
    use crate::run::{HaltReason, RunState};
    use crate::testing::{ScriptedAgent, pipeline_registry};
    use std::sync::Arc;
    use std::time::Duration;
    use valorix_core::AgentError;
    use valorix_registry::AgentRegistry;
    use valorix_workflow::{NodeSpec, NodeState, SkipReason};

    fn orchestrator(registry: AgentRegistry) -> Orchestrator {
        let config = EngineConfig::builder()
            .retry(RetryPolicy::fast())
            .build()
            .unwrap();
        let engine = ExecutionEngine::new(Arc::new(registry), config).unwrap();
        Orchestrator::new(engine, WorkflowTemplate::company_evaluation())
    }

    fn slow_registry(latency_ms: u64) -> AgentRegistry {
        pipeline_registry(|id| ScriptedAgent::named(id).with_latency(Duration::from_millis(latency_ms)))
    }

    #[tokio::test]
    async fn test_start_and_wait() {
        let orchestrator = orchestrator(pipeline_registry(ScriptedAgent::named));
        let run_id = orchestrator
            .start(EvaluationRequest::new("ACME", "full"))
            .await
            .unwrap();

        let run = orchestrator.wait(&run_id).await.unwrap();
        assert_eq!(run.run_id, run_id);
        assert_eq!(run.overall_state, RunState::Completed);
        assert_eq!(run.status_view().partial_results.len(), 6);
        assert_eq!(orchestrator.run_ids().await, vec![run_id]);
    }

    #[tokio::test]
    async fn test_start_returns_before_completion() {
        let orchestrator = orchestrator(slow_registry(20));
        let run_id = orchestrator
            .start(EvaluationRequest::new("ACME", "full"))
            .await
            .unwrap();

        let snapshot = orchestrator.status(&run_id).await.unwrap();
        assert!(snapshot.overall_state.is_active());
        assert!(!snapshot.is_finished());

        let run = orchestrator.wait(&run_id).await.unwrap();
        assert_eq!(run.overall_state, RunState::Completed);
    }

    #[tokio::test]
    async fn test_start_rejects_invalid_workflow() {
        let orchestrator = orchestrator(AgentRegistry::new());
        let result = orchestrator.start(EvaluationRequest::new("ACME", "full")).await;
        assert!(matches!(result, Err(Error::InvalidWorkflow(_))));
        assert!(orchestrator.run_ids().await.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_run() {
        let orchestrator = orchestrator(pipeline_registry(ScriptedAgent::named));
        let unknown = Error::UnknownRun("nope".to_string());
        assert_eq!(orchestrator.status("nope").await.err(), Some(unknown.clone()));
        assert_eq!(orchestrator.cancel("nope").await.err(), Some(unknown.clone()));
        assert_eq!(orchestrator.wait("nope").await.err(), Some(unknown.clone()));
        assert_eq!(orchestrator.remove("nope").await.err(), Some(unknown));
    }

    #[tokio::test]
    async fn test_template_per_evaluation_type() {
        let quick = WorkflowTemplate::new("quick")
            .node(NodeSpec::new("extract", "financial-extractor", "extract"))
            .node(NodeSpec::new("risk", "risk-assessor", "assess").after(["extract"]));
        let orchestrator =
            orchestrator(pipeline_registry(ScriptedAgent::named)).with_template("quick", quick);

        assert_eq!(orchestrator.template_for("quick").name, "quick");
        assert_eq!(orchestrator.template_for("full").name, "company-evaluation");

        let run_id = orchestrator
            .start(EvaluationRequest::new("ACME", "quick"))
            .await
            .unwrap();
        let run = orchestrator.wait(&run_id).await.unwrap();
        assert_eq!(run.workflow.len(), 2);
        assert_eq!(run.overall_state, RunState::Completed);
    }

    #[tokio::test]
    async fn test_cancel_running_evaluation() {
        let orchestrator = orchestrator(slow_registry(30));
        let run_id = orchestrator
            .start(EvaluationRequest::new("ACME", "full"))
            .await
            .unwrap();

        // let extract finish and the analysts start
        tokio::time::sleep(Duration::from_millis(45)).await;
        let cancelled = orchestrator.cancel(&run_id).await.unwrap();
        assert_eq!(cancelled.overall_state, RunState::Cancelled);
        assert_eq!(cancelled.halt_reason, Some(HaltReason::Cancelled));

        let run = orchestrator.wait(&run_id).await.unwrap();
        assert_eq!(run.overall_state, RunState::Cancelled);
        assert_eq!(
            run.workflow.node("extract").unwrap().state,
            NodeState::Succeeded
        );
        assert_eq!(
            run.workflow.node("extract").unwrap().result,
            cancelled.workflow.node("extract").unwrap().result
        );
        let certify = run.workflow.node("certify").unwrap();
        assert_eq!(certify.skip_reason, Some(SkipReason::Cancelled));
    }

    #[tokio::test]
    async fn test_cancel_finished_run_is_noop() {
        let orchestrator = orchestrator(pipeline_registry(ScriptedAgent::named));
        let run_id = orchestrator
            .start(EvaluationRequest::new("ACME", "full"))
            .await
            .unwrap();
        orchestrator.wait(&run_id).await.unwrap();

        let run = orchestrator.cancel(&run_id).await.unwrap();
        assert_eq!(run.overall_state, RunState::Completed);
        assert!(run.halt_reason.is_none());
    }

    #[tokio::test]
    async fn test_failed_run_keeps_partial_results() {
        let registry = pipeline_registry(|id| {
            let agent = ScriptedAgent::named(id);
            if id == "predictor" {
                agent.then_fail(AgentError::permanent("no history"))
            } else {
                agent
            }
        });
        let orchestrator = orchestrator(registry);
        let run_id = orchestrator
            .start(EvaluationRequest::new("ACME", "full"))
            .await
            .unwrap();

        let run = orchestrator.wait(&run_id).await.unwrap();
        assert_eq!(run.overall_state, RunState::Failed);

        let view = orchestrator.status(&run_id).await.unwrap().status_view();
        let results: Vec<&str> = view.partial_results.keys().map(String::as_str).collect();
        assert_eq!(results, vec!["extract", "risk", "strategy"]);
    }

    #[tokio::test]
    async fn test_remove_refuses_active_run() {
        let orchestrator = orchestrator(slow_registry(20));
        let run_id = orchestrator
            .start(EvaluationRequest::new("ACME", "full"))
            .await
            .unwrap();

        assert_eq!(
            orchestrator.remove(&run_id).await.err(),
            Some(Error::RunActive {
                run_id: run_id.clone()
            })
        );

        orchestrator.wait(&run_id).await.unwrap();
        let removed = orchestrator.remove(&run_id).await.unwrap();
        assert_eq!(removed.overall_state, RunState::Completed);
        assert!(orchestrator.status(&run_id).await.is_err());
    }

    #[tokio::test]
    async fn test_concurrent_runs_are_independent() {
        let orchestrator = orchestrator(slow_registry(5));
        let first = orchestrator
            .start(EvaluationRequest::new("ACME", "full"))
            .await
            .unwrap();
        let second = orchestrator
            .start(EvaluationRequest::new("GLOBEX", "full"))
            .await
            .unwrap();
        assert_ne!(first, second);

        let a = orchestrator.wait(&first).await.unwrap();
        let b = orchestrator.wait(&second).await.unwrap();
        assert_eq!(a.request.company_id, "ACME");
        assert_eq!(b.request.company_id, "GLOBEX");
        assert_eq!(a.overall_state, RunState::Completed);
        assert_eq!(b.overall_state, RunState::Completed);
    }
}
