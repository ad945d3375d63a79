//! Workflow nodes and their state machine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use valorix_core::{AgentError, Params};

/// Lifecycle state of one scheduled agent invocation
///
/// ```text
/// Pending -> Ready -> Running -> Succeeded
///                        |-----> FailedRetryable -> Ready
///                        |-----> Ready              (fallback substitution)
///                        '-----> FailedTerminal
/// Pending | Ready | FailedRetryable -> Skipped
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeState {
    Pending,
    Ready,
    Running,
    Succeeded,
    FailedRetryable,
    FailedTerminal,
    Skipped,
}

impl NodeState {
    /// No further transition will happen
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::FailedTerminal | Self::Skipped)
    }

    /// A dependent may start once every dependency is in one of these states
    pub fn satisfies_dependents(self) -> bool {
        matches!(self, Self::Succeeded | Self::Skipped)
    }
}

/// Why a node was never (or never again) attempted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    /// A direct or indirect dependency failed terminally
    UpstreamFailed { node_id: String },
    /// The run was cancelled before this node started
    Cancelled,
    /// The run deadline elapsed before this node started
    DeadlineExceeded,
}

/// One finished execution attempt of a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub agent_id: String,
    /// Attempt number for this agent, starting at 1
    pub attempt: u32,
    /// `None` when the attempt succeeded
    pub error: Option<AgentError>,
    pub elapsed_ms: u64,
}

/// One scheduled invocation of an agent action within an evaluation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowNode {
    /// Unique within the workflow
    pub node_id: String,
    /// Agent currently responsible for the action (changes on fallback)
    pub agent_id: String,
    pub action: String,
    /// Caller-derived input; never rewritten across retries or substitutions
    pub input_params: Params,
    pub depends_on: Vec<String>,
    pub state: NodeState,
    /// Attempts made by the current agent
    pub attempt: u32,
    /// Attempts made across all agents, fallbacks included
    pub total_attempts: u32,
    pub result: Option<Value>,
    pub error: Option<AgentError>,
    pub skip_reason: Option<SkipReason>,
    /// Agent named by the template
    pub primary_agent_id: String,
    /// Every agent that has been given this node, in order
    pub tried_agents: Vec<String>,
    /// Overrides the engine-wide node timeout
    pub timeout: Option<Duration>,
    /// Whether a successful output belongs in the consolidated report
    pub report_relevant: bool,
    pub history: Vec<AttemptRecord>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl WorkflowNode {
    /// Create a pending node
    pub fn new(
        node_id: impl Into<String>,
        agent_id: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        let agent_id = agent_id.into();
        Self {
            node_id: node_id.into(),
            agent_id: agent_id.clone(),
            action: action.into(),
            input_params: Params::new(),
            depends_on: Vec::new(),
            state: NodeState::Pending,
            attempt: 0,
            total_attempts: 0,
            result: None,
            error: None,
            skip_reason: None,
            primary_agent_id: agent_id.clone(),
            tried_agents: vec![agent_id],
            timeout: None,
            report_relevant: true,
            history: Vec::new(),
            started_at: None,
            finished_at: None,
        }
    }

    /// Pending -> Ready
    pub fn mark_ready(&mut self) -> bool {
        if self.state != NodeState::Pending {
            return false;
        }
        self.state = NodeState::Ready;
        true
    }

    /// Ready -> Running, counting a new attempt
    ///
    /// Refuses any other source state so a node can never be running twice.
    pub fn begin_attempt(&mut self) -> bool {
        if self.state != NodeState::Ready {
            return false;
        }
        self.state = NodeState::Running;
        self.attempt += 1;
        self.total_attempts += 1;
        if self.started_at.is_none() {
            self.started_at = Some(Utc::now());
        }
        true
    }

    /// Running -> Succeeded
    pub fn succeed(&mut self, output: Value, elapsed: Duration) {
        self.push_history(None, elapsed);
        self.state = NodeState::Succeeded;
        self.result = Some(output);
        self.error = None;
        self.finished_at = Some(Utc::now());
    }

    /// Record a failed attempt without deciding what happens next
    pub fn record_failure(&mut self, error: AgentError, elapsed: Duration) {
        self.push_history(Some(error.clone()), elapsed);
        self.error = Some(error);
    }

    /// Running -> FailedRetryable, waiting for a backoff delay
    pub fn await_retry(&mut self) {
        self.state = NodeState::FailedRetryable;
    }

    /// FailedRetryable -> Ready once the backoff has elapsed
    pub fn release_retry(&mut self) -> bool {
        if self.state != NodeState::FailedRetryable {
            return false;
        }
        self.state = NodeState::Ready;
        true
    }

    /// Hand the node to a fallback agent, keeping its input untouched
    pub fn substitute(&mut self, agent_id: impl Into<String>) {
        let agent_id = agent_id.into();
        self.tried_agents.push(agent_id.clone());
        self.agent_id = agent_id;
        self.attempt = 0;
        self.state = NodeState::Ready;
    }

    /// Whether `agent_id` has already been given this node
    pub fn has_tried(&self, agent_id: &str) -> bool {
        self.tried_agents.iter().any(|tried| tried == agent_id)
    }

    /// Any non-terminal state -> FailedTerminal
    pub fn fail(&mut self, error: AgentError) {
        self.state = NodeState::FailedTerminal;
        self.error = Some(error);
        self.finished_at = Some(Utc::now());
    }

    /// Mark a node that has not started (or is waiting to retry) as skipped
    pub fn skip(&mut self, reason: SkipReason) -> bool {
        if !matches!(
            self.state,
            NodeState::Pending | NodeState::Ready | NodeState::FailedRetryable
        ) {
            return false;
        }
        self.state = NodeState::Skipped;
        self.skip_reason = Some(reason);
        self.finished_at = Some(Utc::now());
        true
    }

    fn push_history(&mut self, error: Option<AgentError>, elapsed: Duration) {
        self.history.push(AttemptRecord {
            agent_id: self.agent_id.clone(),
            attempt: self.attempt,
            error,
            elapsed_ms: elapsed.as_millis() as u64,
        });
    }
}
