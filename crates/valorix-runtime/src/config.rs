//! Configuration for the execution engine

use crate::policy::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use valorix_core::{Error, Result};

/// Configuration consumed by the [`ExecutionEngine`](crate::ExecutionEngine)
///
/// The engine never reads files or the environment; callers build this value
/// directly or deserialize it from their own configuration source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Global admission limit on concurrently running nodes
    pub max_concurrent_executions: usize,

    /// Retry and backoff settings applied to every agent
    pub retry: RetryPolicy,

    /// Timeout for a single agent invocation unless the node overrides it
    pub node_timeout: Duration,

    /// Wall-clock budget for a whole run (requests may override it)
    pub run_deadline: Option<Duration>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_executions: 4,
            retry: RetryPolicy::default(),
            node_timeout: Duration::from_secs(30),
            run_deadline: None,
        }
    }
}

impl EngineConfig {
    /// Create a new configuration builder
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent_executions == 0 {
            return Err(Error::InvalidConfig(
                "max_concurrent_executions must be greater than 0".to_string(),
            ));
        }

        if self.retry.max_attempts == 0 {
            return Err(Error::InvalidConfig(
                "retry.max_attempts must be greater than 0".to_string(),
            ));
        }

        let multiplier = self.retry.backoff_multiplier;
        if multiplier.is_nan() || multiplier < 1.0 {
            return Err(Error::InvalidConfig(
                "retry.backoff_multiplier must be at least 1.0".to_string(),
            ));
        }

        if self.retry.initial_backoff > self.retry.max_backoff {
            return Err(Error::InvalidConfig(
                "retry.initial_backoff must not exceed retry.max_backoff".to_string(),
            ));
        }

        if self.node_timeout.is_zero() {
            return Err(Error::InvalidConfig(
                "node_timeout must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// Builder for EngineConfig
#[derive(Debug, Default)]
pub struct EngineConfigBuilder {
    max_concurrent_executions: Option<usize>,
    retry: Option<RetryPolicy>,
    node_timeout: Option<Duration>,
    run_deadline: Option<Duration>,
}

impl EngineConfigBuilder {
    /// Set the global admission limit
    pub fn max_concurrent_executions(mut self, limit: usize) -> Self {
        self.max_concurrent_executions = Some(limit);
        self
    }

    /// Set the retry policy
    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = Some(policy);
        self
    }

    /// Set the default per-node timeout
    pub fn node_timeout(mut self, duration: Duration) -> Self {
        self.node_timeout = Some(duration);
        self
    }

    /// Set the default run deadline
    pub fn run_deadline(mut self, duration: Duration) -> Self {
        self.run_deadline = Some(duration);
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<EngineConfig> {
        let defaults = EngineConfig::default();

        let config = EngineConfig {
            max_concurrent_executions: self
                .max_concurrent_executions
                .unwrap_or(defaults.max_concurrent_executions),
            retry: self.retry.unwrap_or(defaults.retry),
            node_timeout: self.node_timeout.unwrap_or(defaults.node_timeout),
            run_deadline: self.run_deadline.or(defaults.run_deadline),
        };

        config.validate()?;
        Ok(config)
    }
}
