//! Retry and fallback policy
//!
//! Every agent shares the same failure semantics. After a failed attempt the
//! engine asks [`resolve_failure`] what to do with the node:
//! - `InvalidInput` never retries and never substitutes
//! - `Transient` retries on the same agent with exponential backoff until
//!   `max_attempts` is reached, then escalates like `Permanent`
//! - `Permanent` substitutes the next untried fallback agent, or fails

use serde::{Deserialize, Serialize};
use std::time::Duration;
use valorix_core::{AgentError, AgentErrorKind};
use valorix_registry::AgentRegistry;
use valorix_workflow::WorkflowNode;

/// Retry policy configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Maximum number of attempts per agent, first attempt included
    pub max_attempts: u32,

    /// Backoff before the second attempt
    pub initial_backoff: Duration,

    /// Maximum backoff duration
    pub max_backoff: Duration,

    /// Backoff multiplier (typically 2.0 for exponential backoff)
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(10),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Create a new retry policy
    pub fn new(
        max_attempts: u32,
        initial_backoff: Duration,
        max_backoff: Duration,
        backoff_multiplier: f64,
    ) -> Self {
        Self {
            max_attempts,
            initial_backoff,
            max_backoff,
            backoff_multiplier,
        }
    }

    /// Create a policy with no retries
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            backoff_multiplier: 1.0,
        }
    }

    /// Create a policy with fast retries (for testing)
    pub fn fast() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(100),
            backoff_multiplier: 2.0,
        }
    }

    /// Backoff to wait after failed attempt number `attempt` (1-based)
    pub fn backoff_duration(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let exponent = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
        let backoff_nanos =
            self.initial_backoff.as_nanos() as f64 * self.backoff_multiplier.powi(exponent);

        // Cap at max backoff; also covers overflow to infinity
        if !backoff_nanos.is_finite() || backoff_nanos >= self.max_backoff.as_nanos() as f64 {
            self.max_backoff
        } else {
            Duration::from_nanos(backoff_nanos.max(0.0) as u64)
        }
    }

    /// Whether the current agent may be tried again after `attempt` attempts
    pub fn allows_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

/// What the engine does with a node after a failed attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Wait, then run the same agent again
    Retry { delay: Duration },
    /// Hand the node to a fallback agent
    Substitute { agent_id: String },
    /// No path remains; the node becomes `FailedTerminal`
    Fail,
}

/// Decide how to continue after `node` failed with `error`
///
/// `node.attempt` must already count the failed attempt. Fallback candidates
/// come from the chain of the node's primary agent, in order, skipping any
/// agent that has already been given this node.
pub fn resolve_failure(
    policy: &RetryPolicy,
    registry: &AgentRegistry,
    node: &WorkflowNode,
    error: &AgentError,
) -> Resolution {
    match error.kind {
        AgentErrorKind::InvalidInput => Resolution::Fail,
        AgentErrorKind::Transient if policy.allows_retry(node.attempt) => Resolution::Retry {
            delay: policy.backoff_duration(node.attempt),
        },
        AgentErrorKind::Transient | AgentErrorKind::Permanent => registry
            .fallbacks_for(&node.primary_agent_id, &node.action)
            .into_iter()
            .find(|candidate| !node.has_tried(candidate))
            .map_or(Resolution::Fail, |agent_id| Resolution::Substitute { agent_id }),
    }
}
