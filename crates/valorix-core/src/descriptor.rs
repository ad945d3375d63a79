//! Agent capability metadata

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Describes one analysis capability: which actions it can perform and
/// which agents to try, in order, when it fails.
///
/// Descriptors are registered once at startup and never change afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentDescriptor {
    /// Unique agent identifier
    pub id: String,
    /// Action names this agent can perform
    #[serde(default)]
    pub supported_actions: BTreeSet<String>,
    /// Alternate agent ids to substitute, in order, on failure
    #[serde(default)]
    pub fallback_chain: Vec<String>,
}

impl AgentDescriptor {
    /// Create a descriptor with no actions and no fallbacks
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            supported_actions: BTreeSet::new(),
            fallback_chain: Vec::new(),
        }
    }

    /// Declare a supported action
    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.supported_actions.insert(action.into());
        self
    }

    /// Declare several supported actions
    pub fn with_actions<I, S>(mut self, actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.supported_actions
            .extend(actions.into_iter().map(Into::into));
        self
    }

    /// Append an agent to the fallback chain
    pub fn with_fallback(mut self, agent_id: impl Into<String>) -> Self {
        self.fallback_chain.push(agent_id.into());
        self
    }

    /// Whether this agent declares support for `action`
    pub fn supports(&self, action: &str) -> bool {
        self.supported_actions.contains(action)
    }
}
