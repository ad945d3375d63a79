//! Execution engine
//!
//! The engine drives one [`EvaluationRun`] to a final state. Its scheduling
//! loop never waits on agent work directly: each dispatched node runs as its
//! own task and the loop reacts to completions, retry timers, admission
//! capacity, cancellation and the run deadline.
//!
//! A node moves to `Running` only while it holds an admission permit from the
//! engine's semaphore, so the number of running nodes never exceeds
//! `max_concurrent_executions` (across every run sharing the engine).

use chrono::Utc;
use futures::FutureExt;
use serde_json::Value;
use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, watch};
use tokio::task::{Id, JoinError, JoinSet};
use tokio::time::{Instant, sleep_until, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use valorix_core::{Agent, AgentError, AgentResult, Params, Result};
use valorix_registry::AgentRegistry;
use valorix_workflow::{EvaluationRequest, NodeState, SkipReason, WorkflowTemplate};

use crate::config::EngineConfig;
use crate::outcome::OutcomeSink;
use crate::policy::{Resolution, resolve_failure};
use crate::run::{EvaluationRun, HaltReason, RunState};

/// Scheduler that walks workflow graphs and dispatches agents
///
/// Cloning is cheap and clones share the registry, the admission semaphore
/// and the outcome sink.
#[derive(Clone)]
pub struct ExecutionEngine {
    registry: Arc<AgentRegistry>,
    config: EngineConfig,
    admission: Arc<Semaphore>,
    sink: Option<Arc<dyn OutcomeSink>>,
}

impl ExecutionEngine {
    /// Create an engine with its own admission semaphore
    pub fn new(registry: Arc<AgentRegistry>, config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let admission = Arc::new(Semaphore::new(config.max_concurrent_executions));
        Ok(Self {
            registry,
            config,
            admission,
            sink: None,
        })
    }

    /// Share an admission semaphore with other engines
    pub fn with_admission(mut self, admission: Arc<Semaphore>) -> Self {
        self.admission = admission;
        self
    }

    /// Emit consolidated outcomes to `sink`
    pub fn with_sink(mut self, sink: Arc<dyn OutcomeSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn registry(&self) -> &Arc<AgentRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Admission permits currently free
    pub fn available_capacity(&self) -> usize {
        self.admission.available_permits()
    }

    /// Build a run for `request` from `template` and execute it to the end
    pub async fn evaluate(
        &self,
        template: &WorkflowTemplate,
        request: EvaluationRequest,
    ) -> Result<EvaluationRun> {
        let workflow = template.instantiate(&request, &self.registry)?;
        let run = EvaluationRun::new(Uuid::new_v4().to_string(), request, workflow);
        Ok(self.execute(run, CancellationToken::new()).await)
    }

    /// Execute `run` until it completes, fails or is cancelled
    pub async fn execute(&self, run: EvaluationRun, cancel: CancellationToken) -> EvaluationRun {
        RunDriver::new(self, run, cancel, None).drive().await
    }

    /// Like [`execute`](Self::execute), publishing a snapshot after every
    /// scheduling step
    pub async fn execute_with_updates(
        &self,
        run: EvaluationRun,
        cancel: CancellationToken,
        updates: watch::Sender<EvaluationRun>,
    ) -> EvaluationRun {
        RunDriver::new(self, run, cancel, Some(updates)).drive().await
    }
}

/// Completion of one agent invocation
struct NodeReport {
    position: usize,
    outcome: AgentResult<Value>,
    elapsed: Duration,
    permit: OwnedSemaphorePermit,
}

/// Per-run scheduling state; owns the run while it executes
struct RunDriver<'a> {
    engine: &'a ExecutionEngine,
    run: EvaluationRun,
    cancel: CancellationToken,
    updates: Option<watch::Sender<EvaluationRun>>,
    in_flight: JoinSet<NodeReport>,
    tasks: HashMap<Id, usize>,
    retries: Vec<(Instant, usize)>,
    spare_permit: Option<OwnedSemaphorePermit>,
}

impl<'a> RunDriver<'a> {
    fn new(
        engine: &'a ExecutionEngine,
        run: EvaluationRun,
        cancel: CancellationToken,
        updates: Option<watch::Sender<EvaluationRun>>,
    ) -> Self {
        Self {
            engine,
            run,
            cancel,
            updates,
            in_flight: JoinSet::new(),
            tasks: HashMap::new(),
            retries: Vec::new(),
            spare_permit: None,
        }
    }

    async fn drive(mut self) -> EvaluationRun {
        self.run.overall_state = RunState::Running;
        self.run.started_at = Some(Utc::now());
        info!(
            "Starting run {} for company '{}' ({} nodes)",
            self.run.run_id,
            self.run.request.company_id,
            self.run.workflow.len()
        );

        let deadline = self
            .run
            .request
            .deadline
            .or(self.engine.config.run_deadline)
            .map(|budget| Instant::now() + budget);

        loop {
            if !self.halted() && self.cancel.is_cancelled() {
                self.on_cancel();
            }
            if !self.halted() {
                self.promote();
                self.dispatch();
            }
            self.publish();

            let halted = self.halted();
            let has_ready = self.run.workflow.count_in(NodeState::Ready) > 0;
            if self.in_flight.is_empty() && self.retries.is_empty() && !has_ready {
                break;
            }

            let next_retry = self.retries.iter().map(|(at, _)| *at).min();
            let admission = Arc::clone(&self.engine.admission);

            tokio::select! {
                biased;
                () = self.cancel.cancelled(), if !halted => self.on_cancel(),
                Some(joined) = self.in_flight.join_next_with_id() => self.on_joined(joined),
                () = sleep_until_opt(deadline), if !halted => self.on_deadline().await,
                () = sleep_until_opt(next_retry), if next_retry.is_some() => {
                    self.release_due_retries();
                }
                permit = admission.acquire_owned(), if has_ready && !halted => {
                    if let Ok(permit) = permit {
                        self.spare_permit = Some(permit);
                    }
                }
                else => break,
            }
        }

        self.finish().await
    }

    fn halted(&self) -> bool {
        self.run.halt_reason.is_some()
    }

    /// Pending -> Ready for every node whose dependencies are satisfied
    fn promote(&mut self) {
        for position in self.run.workflow.promotable() {
            if let Some(node) = self.run.workflow.node_at_mut(position) {
                node.mark_ready();
                debug!("Node '{}' is ready", node.node_id);
            }
        }
    }

    /// Launch ready nodes in template order while capacity lasts
    fn dispatch(&mut self) {
        let ready = self.run.workflow.positions_in(NodeState::Ready);
        let total = ready.len();
        for (launched, position) in ready.into_iter().enumerate() {
            let Some(permit) = self.take_permit() else {
                debug!(
                    "Admission limit reached; {} ready node(s) wait for capacity",
                    total - launched
                );
                break;
            };
            self.launch(position, permit);
        }
    }

    fn take_permit(&mut self) -> Option<OwnedSemaphorePermit> {
        self.spare_permit
            .take()
            .or_else(|| Arc::clone(&self.engine.admission).try_acquire_owned().ok())
    }

    fn launch(&mut self, position: usize, permit: OwnedSemaphorePermit) {
        let engine = self.engine;
        let params = self.run.workflow.dispatch_params(position);
        let Some(node) = self.run.workflow.node_at_mut(position) else {
            return;
        };

        let agent = match engine.registry.resolve(&node.agent_id) {
            Ok(agent) => agent,
            Err(err) => {
                error!("Cannot dispatch node '{}': {}", node.node_id, err);
                node.fail(AgentError::permanent(err.to_string()));
                self.propagate_failure(position);
                return;
            }
        };

        if !node.begin_attempt() {
            return;
        }

        let limit = node.timeout.unwrap_or(engine.config.node_timeout);
        let action = node.action.clone();
        debug!(
            "Dispatching node '{}' to agent '{}' (attempt {}, timeout {:?})",
            node.node_id, node.agent_id, node.attempt, limit
        );

        let handle = self.in_flight.spawn(async move {
            let started = Instant::now();
            let outcome = invoke(agent.as_ref(), &action, params, limit).await;
            NodeReport {
                position,
                outcome,
                elapsed: started.elapsed(),
                permit,
            }
        });
        self.tasks.insert(handle.id(), position);
    }

    fn on_joined(&mut self, joined: std::result::Result<(Id, NodeReport), JoinError>) {
        match joined {
            Ok((id, report)) => {
                self.tasks.remove(&id);
                let NodeReport {
                    position,
                    outcome,
                    elapsed,
                    permit,
                } = report;
                match outcome {
                    Ok(output) => self.on_success(position, output, elapsed),
                    Err(error) => self.on_failure(position, error, elapsed),
                }
                drop(permit);
            }
            Err(err) => {
                if let Some(position) = self.tasks.remove(&err.id()) {
                    let error = AgentError::permanent(format!("agent task aborted: {err}"));
                    self.on_failure(position, error, Duration::ZERO);
                }
            }
        }
    }

    fn on_success(&mut self, position: usize, output: Value, elapsed: Duration) {
        if let Some(node) = self.run.workflow.node_at_mut(position) {
            node.succeed(output, elapsed);
            info!(
                "Node '{}' succeeded via '{}' in {:?} ({} attempt(s))",
                node.node_id, node.agent_id, elapsed, node.total_attempts
            );
        }
    }

    fn on_failure(&mut self, position: usize, error: AgentError, elapsed: Duration) {
        let engine = self.engine;
        let halted = self.halted();
        let Some(node) = self.run.workflow.node_at_mut(position) else {
            return;
        };

        node.record_failure(error.clone(), elapsed);
        let resolution = if halted {
            Resolution::Fail
        } else {
            resolve_failure(&engine.config.retry, &engine.registry, node, &error)
        };

        match resolution {
            Resolution::Retry { delay } => {
                warn!(
                    "Node '{}' failed on '{}' (attempt {}/{}): {}. Retrying in {:?}",
                    node.node_id,
                    node.agent_id,
                    node.attempt,
                    engine.config.retry.max_attempts,
                    error,
                    delay
                );
                node.await_retry();
                self.retries.push((Instant::now() + delay, position));
            }
            Resolution::Substitute { agent_id } => {
                warn!(
                    "Node '{}' failed on '{}': {}. Falling back to '{}'",
                    node.node_id, node.agent_id, error, agent_id
                );
                node.substitute(agent_id);
            }
            Resolution::Fail => {
                error!(
                    "Node '{}' failed terminally on '{}' after {} attempt(s): {}",
                    node.node_id, node.agent_id, node.total_attempts, error
                );
                node.fail(error);
                self.propagate_failure(position);
            }
        }
    }

    /// Skip every transitive dependent of a terminally failed node
    fn propagate_failure(&mut self, position: usize) {
        let Some(failed_id) = self
            .run
            .workflow
            .node_at(position)
            .map(|node| node.node_id.clone())
        else {
            return;
        };

        for dependent in self.run.workflow.transitive_dependents(position) {
            self.retries.retain(|(_, waiting)| *waiting != dependent);
            if let Some(node) = self.run.workflow.node_at_mut(dependent) {
                let reason = SkipReason::UpstreamFailed {
                    node_id: failed_id.clone(),
                };
                if node.skip(reason) {
                    info!("Skipping node '{}': upstream '{}' failed", node.node_id, failed_id);
                }
            }
        }
    }

    fn release_due_retries(&mut self) {
        let now = Instant::now();
        let (due, waiting): (Vec<_>, Vec<_>) =
            self.retries.drain(..).partition(|(at, _)| *at <= now);
        self.retries = waiting;

        for (_, position) in due {
            if let Some(node) = self.run.workflow.node_at_mut(position) {
                if node.release_retry() {
                    debug!("Node '{}' ready for retry on '{}'", node.node_id, node.agent_id);
                }
            }
        }
    }

    fn on_cancel(&mut self) {
        info!(
            "Cancelling run {}; {} in-flight node(s) will finish",
            self.run.run_id,
            self.in_flight.len()
        );
        self.run.overall_state = RunState::Cancelled;
        self.run.halt_reason = Some(HaltReason::Cancelled);
        self.retries.clear();
        self.skip_unstarted(&SkipReason::Cancelled);
    }

    async fn on_deadline(&mut self) {
        warn!(
            "Run {} exceeded its deadline; aborting {} in-flight node(s)",
            self.run.run_id,
            self.in_flight.len()
        );
        self.run.halt_reason = Some(HaltReason::DeadlineExceeded);

        // Agents that returned at the deadline instant keep their results
        tokio::task::yield_now().await;
        while let Some(joined) = self.in_flight.try_join_next_with_id() {
            self.on_joined(joined);
        }

        self.in_flight.shutdown().await;
        self.tasks.clear();
        self.retries.clear();

        for position in self.run.workflow.positions_in(NodeState::Running) {
            if let Some(node) = self.run.workflow.node_at_mut(position) {
                node.fail(AgentError::transient(
                    "run deadline exceeded before the agent returned",
                ));
            }
        }
        self.skip_unstarted(&SkipReason::DeadlineExceeded);
    }

    fn skip_unstarted(&mut self, reason: &SkipReason) {
        for position in 0..self.run.workflow.len() {
            if let Some(node) = self.run.workflow.node_at_mut(position) {
                node.skip(reason.clone());
            }
        }
    }

    fn publish(&self) {
        if let Some(updates) = &self.updates {
            updates.send_replace(self.run.clone());
        }
    }

    async fn finish(mut self) -> EvaluationRun {
        if self.run.overall_state != RunState::Cancelled {
            let failed = self.run.workflow.count_in(NodeState::FailedTerminal);
            self.run.overall_state = if failed == 0 && !self.halted() {
                RunState::Completed
            } else {
                RunState::Failed
            };
        }
        self.run.finished_at = Some(Utc::now());

        let succeeded = self.run.workflow.count_in(NodeState::Succeeded);
        let skipped = self.run.workflow.count_in(NodeState::Skipped);
        match self.run.overall_state {
            RunState::Failed => warn!(
                "Run {} failed ({} succeeded, {} skipped)",
                self.run.run_id, succeeded, skipped
            ),
            state => info!(
                "Run {} finished {:?} ({} succeeded, {} skipped)",
                self.run.run_id, state, succeeded, skipped
            ),
        }

        if matches!(
            self.run.overall_state,
            RunState::Completed | RunState::Failed
        ) {
            if let Some(sink) = &self.engine.sink {
                if let Err(err) = sink.store(&self.run.outcome()).await {
                    error!("Failed to store outcome of run {}: {:#}", self.run.run_id, err);
                }
            }
        }

        self.publish();
        self.run
    }
}

/// Call the agent under a timeout, converting panics to permanent failures
async fn invoke(
    agent: &dyn Agent,
    action: &str,
    params: Params,
    limit: Duration,
) -> AgentResult<Value> {
    let call = AssertUnwindSafe(agent.perform(action, params)).catch_unwind();
    match timeout(limit, call).await {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(panic)) => Err(AgentError::permanent(format!(
            "agent panicked: {}",
            panic_message(panic.as_ref())
        ))),
        Err(_) => Err(AgentError::transient(format!(
            "no response within {limit:?}"
        ))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

async fn sleep_until_opt(at: Option<Instant>) {
    match at {
        Some(at) => sleep_until(at).await,
        None => std::future::pending().await,
    }
}
