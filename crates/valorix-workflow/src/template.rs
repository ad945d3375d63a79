//! Static workflow templates and per-request instantiation

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use valorix_core::{Params, Result};
use valorix_registry::AgentRegistry;

use crate::graph::WorkflowGraph;

fn default_report_relevant() -> bool {
    true
}

/// Declaration of one node in a template
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
    pub node_id: String,
    pub agent_id: String,
    pub action: String,
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Template defaults; request parameters override them
    #[serde(default)]
    pub params: Params,
    #[serde(default)]
    pub timeout: Option<Duration>,
    #[serde(default = "default_report_relevant")]
    pub report_relevant: bool,
}

impl NodeSpec {
    /// Create a node spec with no dependencies
    pub fn new(
        node_id: impl Into<String>,
        agent_id: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self {
            node_id: node_id.into(),
            agent_id: agent_id.into(),
            action: action.into(),
            depends_on: Vec::new(),
            params: Params::new(),
            timeout: None,
            report_relevant: true,
        }
    }

    /// Declare dependencies on other nodes
    pub fn after<I, S>(mut self, node_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on.extend(node_ids.into_iter().map(Into::into));
        self
    }

    /// Set a default parameter for this node
    pub fn with_param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.params.insert(key, value);
        self
    }

    /// Override the engine-wide timeout for this node
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Exclude this node's output from the consolidated report
    pub fn internal(mut self) -> Self {
        self.report_relevant = false;
        self
    }
}

/// An evaluation request from the API layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRequest {
    pub company_id: String,
    pub evaluation_type: String,
    #[serde(default)]
    pub parameters: Params,
    /// Overrides the engine-wide run deadline
    #[serde(default)]
    pub deadline: Option<Duration>,
}

impl EvaluationRequest {
    pub fn new(company_id: impl Into<String>, evaluation_type: impl Into<String>) -> Self {
        Self {
            company_id: company_id.into(),
            evaluation_type: evaluation_type.into(),
            parameters: Params::new(),
            deadline: None,
        }
    }

    pub fn with_parameters(mut self, parameters: Params) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

/// Ordered list of node specifications forming a pipeline
///
/// Declaration order is significant: it is the dispatch order among nodes
/// that become ready at the same time.
///
/// # Example
///
/// ```
/// use valorix_workflow::{NodeSpec, WorkflowTemplate};
///
/// let template = WorkflowTemplate::new("mini")
///     .node(NodeSpec::new("extract", "financial-extractor", "extract"))
///     .node(NodeSpec::new("risk", "risk-assessor", "assess").after(["extract"]));
///
/// assert_eq!(template.nodes().len(), 2);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowTemplate {
    pub name: String,
    pub nodes: Vec<NodeSpec>,
}

impl WorkflowTemplate {
    /// Create an empty template
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nodes: Vec::new(),
        }
    }

    /// Append a node
    pub fn node(mut self, spec: NodeSpec) -> Self {
        self.nodes.push(spec);
        self
    }

    pub fn nodes(&self) -> &[NodeSpec] {
        &self.nodes
    }

    /// The fixed company evaluation pipeline
    ///
    /// `extract -> {strategy, risk, prediction} -> report -> certify`
    pub fn company_evaluation() -> Self {
        Self::new("company-evaluation")
            .node(NodeSpec::new("extract", "financial-extractor", "extract"))
            .node(NodeSpec::new("strategy", "strategic-analyst", "analyze").after(["extract"]))
            .node(NodeSpec::new("risk", "risk-assessor", "assess").after(["extract"]))
            .node(NodeSpec::new("prediction", "predictor", "forecast").after(["extract"]))
            .node(
                NodeSpec::new("report", "report-generator", "generate")
                    .after(["strategy", "risk", "prediction"]),
            )
            .node(NodeSpec::new("certify", "certifier", "certify").after(["report"]))
    }

    /// Build and validate the graph for one request
    pub fn instantiate(
        &self,
        request: &EvaluationRequest,
        registry: &AgentRegistry,
    ) -> Result<WorkflowGraph> {
        WorkflowGraph::build(&self.nodes, request, registry)
    }
}
