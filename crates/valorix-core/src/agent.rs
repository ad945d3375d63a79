//! Core Agent trait definition

use crate::Params;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Result type returned by agent actions
pub type AgentResult<T> = std::result::Result<T, AgentError>;

/// Classification of an agent failure
///
/// The kind decides how the execution engine reacts:
/// - `InvalidInput`: the node itself is malformed; never retried or substituted
/// - `Transient`: the attempt may be retried, then routed to a fallback
/// - `Permanent`: retrying the same agent is pointless; a fallback may be tried
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentErrorKind {
    InvalidInput,
    Transient,
    Permanent,
}

impl fmt::Display for AgentErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::InvalidInput => "invalid input",
            Self::Transient => "transient",
            Self::Permanent => "permanent",
        };
        f.write_str(label)
    }
}

/// Typed failure returned by an agent action
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{kind} failure: {message}")]
pub struct AgentError {
    /// How the engine should treat this failure
    pub kind: AgentErrorKind,
    /// Human-readable description
    pub message: String,
}

impl AgentError {
    /// Create an error of the given kind
    pub fn new(kind: AgentErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// The node's input is malformed
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(AgentErrorKind::InvalidInput, message)
    }

    /// The attempt failed but may succeed if repeated
    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(AgentErrorKind::Transient, message)
    }

    /// The agent cannot perform this action
    pub fn permanent(message: impl Into<String>) -> Self {
        Self::new(AgentErrorKind::Permanent, message)
    }

    pub fn is_transient(&self) -> bool {
        self.kind == AgentErrorKind::Transient
    }

    pub fn is_invalid_input(&self) -> bool {
        self.kind == AgentErrorKind::InvalidInput
    }
}

/// Core trait that all analysis agents must implement
///
/// The engine may invoke the same action more than once for one node (retries,
/// fallback substitution), so implementations must tolerate at-least-once
/// delivery. Any partial output produced before a failure is discarded.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Agent: Send + Sync {
    /// Perform `action` with the given input parameters
    async fn perform(&self, action: &str, params: Params) -> AgentResult<Value>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn test_error_constructors() {
        let err = AgentError::transient("upstream timeout");
        assert!(err.is_transient());
        assert!(!err.is_invalid_input());
        assert_eq!(err.to_string(), "transient failure: upstream timeout");

        let err = AgentError::invalid_input("missing financials");
        assert!(err.is_invalid_input());
        assert_eq!(err.kind, AgentErrorKind::InvalidInput);

        let err = AgentError::permanent("unsupported sector");
        assert_eq!(err.to_string(), "permanent failure: unsupported sector");
    }

    #[test]
    fn test_error_kind_serialization() {
        let err = AgentError::invalid_input("bad");
        let value = serde_json::to_value(&err).unwrap();
        assert_eq!(value, json!({"kind": "invalid_input", "message": "bad"}));
    }

    #[tokio::test]
    async fn test_agent_as_trait_object() {
        let mut mock = MockAgent::new();
        mock.expect_perform()
            .withf(|action, params| action == "extract" && params.company_id() == Some("ACME"))
            .times(1)
            .returning(|_, _| Ok(json!({"revenue": 100})));

        let agent: Arc<dyn Agent> = Arc::new(mock);
        let output = agent
            .perform("extract", Params::new().with_company_id("ACME"))
            .await
            .unwrap();
        assert_eq!(output, json!({"revenue": 100}));
    }

    #[test]
    fn test_mock_agent_failure() {
        let mut mock = MockAgent::new();
        mock.expect_perform()
            .returning(|_, _| Err(AgentError::permanent("down")));

        let result = tokio_test::block_on(mock.perform("assess", Params::new()));
        assert_eq!(result.unwrap_err().kind, AgentErrorKind::Permanent);
    }
}
