//! Registry for managing analysis agents

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;
use valorix_core::{Agent, AgentDescriptor, Error, Result};

/// An agent implementation together with its descriptor
#[derive(Clone)]
pub struct RegisteredAgent {
    pub descriptor: AgentDescriptor,
    pub implementation: Arc<dyn Agent>,
}

impl fmt::Debug for RegisteredAgent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredAgent")
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}

/// Registry for managing agents
///
/// Registration takes `&mut self`, so once the registry is wrapped in an
/// `Arc` and handed to the engine it can no longer change. Reads need no
/// synchronization.
///
/// # Example
///
/// ```ignore
/// use valorix_core::AgentDescriptor;
/// use valorix_registry::AgentRegistry;
/// use std::sync::Arc;
///
/// let mut registry = AgentRegistry::new();
/// registry.register(
///     AgentDescriptor::new("risk-assessor")
///         .with_action("assess")
///         .with_fallback("risk-lite"),
///     Arc::new(RiskAssessor::default()),
/// )?;
/// let registry = Arc::new(registry);
/// ```
#[derive(Debug, Default)]
pub struct AgentRegistry {
    agents: HashMap<String, RegisteredAgent>,
    // Ids in registration order, for stable listings
    order: Vec<String>,
}

impl AgentRegistry {
    /// Create a new, empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an agent under its descriptor's id
    ///
    /// Fails with [`Error::DuplicateAgent`] if the id is already taken.
    pub fn register(
        &mut self,
        descriptor: AgentDescriptor,
        implementation: Arc<dyn Agent>,
    ) -> Result<()> {
        if self.agents.contains_key(&descriptor.id) {
            return Err(Error::DuplicateAgent(descriptor.id));
        }

        debug!(
            "Registering agent '{}' (actions: {:?}, fallbacks: {:?})",
            descriptor.id, descriptor.supported_actions, descriptor.fallback_chain
        );

        let id = descriptor.id.clone();
        self.agents.insert(
            id.clone(),
            RegisteredAgent {
                descriptor,
                implementation,
            },
        );
        self.order.push(id);
        Ok(())
    }

    /// Resolve an agent id to its implementation
    pub fn resolve(&self, agent_id: &str) -> Result<Arc<dyn Agent>> {
        self.agents
            .get(agent_id)
            .map(|entry| Arc::clone(&entry.implementation))
            .ok_or_else(|| Error::UnknownAgent(agent_id.to_string()))
    }

    /// Get an agent's descriptor
    pub fn descriptor(&self, agent_id: &str) -> Option<&AgentDescriptor> {
        self.agents.get(agent_id).map(|entry| &entry.descriptor)
    }

    /// Whether `agent_id` is registered and declares support for `action`
    pub fn supports(&self, agent_id: &str, action: &str) -> bool {
        self.descriptor(agent_id)
            .is_some_and(|descriptor| descriptor.supports(action))
    }

    /// Ordered fallback agents for `agent_id` that can perform `action`
    ///
    /// Entries of the descriptor's fallback chain that are unregistered, do not
    /// support the action, or name the agent itself are dropped. Unknown
    /// `agent_id` yields an empty list.
    pub fn fallbacks_for(&self, agent_id: &str, action: &str) -> Vec<String> {
        let Some(descriptor) = self.descriptor(agent_id) else {
            return Vec::new();
        };

        descriptor
            .fallback_chain
            .iter()
            .filter(|candidate| candidate.as_str() != agent_id)
            .filter(|candidate| self.supports(candidate, action))
            .cloned()
            .collect()
    }

    /// Registered ids in registration order
    pub fn agent_ids(&self) -> Vec<&str> {
        self.order.iter().map(String::as_str).collect()
    }

    /// Number of registered agents
    pub fn len(&self) -> usize {
        self.agents.len()
    }

    /// Check if the registry is empty
    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::{Value, json};
    use valorix_core::{AgentResult, Params};

    struct EchoAgent(&'static str);

    #[async_trait]
    impl Agent for EchoAgent {
        async fn perform(&self, action: &str, _params: Params) -> AgentResult<Value> {
            Ok(json!({"agent": self.0, "action": action}))
        }
    }

    fn registry() -> AgentRegistry {
        let mut registry = AgentRegistry::new();
        registry
            .register(
                AgentDescriptor::new("primary")
                    .with_action("assess")
                    .with_fallback("no-assess")
                    .with_fallback("missing")
                    .with_fallback("primary")
                    .with_fallback("backup-b")
                    .with_fallback("backup-a"),
                Arc::new(EchoAgent("primary")),
            )
            .unwrap();
        registry
            .register(
                AgentDescriptor::new("no-assess").with_action("extract"),
                Arc::new(EchoAgent("no-assess")),
            )
            .unwrap();
        registry
            .register(
                AgentDescriptor::new("backup-a").with_action("assess"),
                Arc::new(EchoAgent("backup-a")),
            )
            .unwrap();
        registry
            .register(
                AgentDescriptor::new("backup-b").with_actions(["assess", "extract"]),
                Arc::new(EchoAgent("backup-b")),
            )
            .unwrap();
        registry
    }

    #[test]
    fn test_register_and_resolve() {
        let registry = registry();
        assert_eq!(registry.len(), 4);
        assert!(!registry.is_empty());

        let agent = registry.resolve("backup-a").unwrap();
        let output = tokio_test::block_on(agent.perform("assess", Params::new())).unwrap();
        assert_eq!(output, json!({"agent": "backup-a", "action": "assess"}));
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut registry = registry();
        let err = registry
            .register(
                AgentDescriptor::new("primary").with_action("other"),
                Arc::new(EchoAgent("dup")),
            )
            .unwrap_err();
        assert_eq!(err, Error::DuplicateAgent("primary".to_string()));
        // the original registration is untouched
        assert!(registry.supports("primary", "assess"));
        assert!(!registry.supports("primary", "other"));
    }

    #[test]
    fn test_resolve_unknown() {
        let registry = registry();
        let err = registry.resolve("ghost").err().unwrap();
        assert_eq!(err, Error::UnknownAgent("ghost".to_string()));
    }

    #[test]
    fn test_fallbacks_filtered_by_action_in_chain_order() {
        let registry = registry();
        assert_eq!(
            registry.fallbacks_for("primary", "assess"),
            vec!["backup-b".to_string(), "backup-a".to_string()]
        );
        assert_eq!(
            registry.fallbacks_for("primary", "extract"),
            vec!["no-assess".to_string(), "backup-b".to_string()]
        );
    }

    #[test]
    fn test_fallbacks_empty_cases() {
        let registry = registry();
        assert!(registry.fallbacks_for("backup-a", "assess").is_empty());
        assert!(registry.fallbacks_for("ghost", "assess").is_empty());
        assert!(registry.fallbacks_for("primary", "report").is_empty());
    }

    #[test]
    fn test_agent_ids_in_registration_order() {
        let registry = registry();
        assert_eq!(
            registry.agent_ids(),
            vec!["primary", "no-assess", "backup-a", "backup-b"]
        );
    }
}
