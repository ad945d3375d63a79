//! Dependency graph for one evaluation

use serde::Serialize;
use serde_json::Value;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet, VecDeque};
use tracing::debug;
use valorix_core::params::keys;
use valorix_core::{Error, Params, Result};
use valorix_registry::AgentRegistry;

use crate::node::{NodeState, WorkflowNode};
use crate::template::{EvaluationRequest, NodeSpec};

/// Validated, acyclic set of workflow nodes for one evaluation request
///
/// Nodes are stored in template declaration order and addressed by index.
/// The graph is exclusively owned by the run executing it.
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowGraph {
    nodes: Vec<WorkflowNode>,
    #[serde(skip)]
    index: HashMap<String, usize>,
    #[serde(skip)]
    dependencies: Vec<Vec<usize>>,
    #[serde(skip)]
    dependents: Vec<Vec<usize>>,
    #[serde(skip)]
    topological_order: Vec<usize>,
}

impl WorkflowGraph {
    /// Build a graph from template specs, validating it against the registry
    ///
    /// Checks, in order: the template is not empty, node ids are unique,
    /// every node's agent is registered and supports its action, every
    /// dependency exists, and the graph is acyclic. The first violation is
    /// reported as [`Error::InvalidWorkflow`].
    pub fn build(
        specs: &[NodeSpec],
        request: &EvaluationRequest,
        registry: &AgentRegistry,
    ) -> Result<Self> {
        if specs.is_empty() {
            return Err(invalid("workflow has no nodes"));
        }

        let mut index = HashMap::with_capacity(specs.len());
        for (position, spec) in specs.iter().enumerate() {
            if index.insert(spec.node_id.clone(), position).is_some() {
                return Err(invalid(format!("duplicate node id '{}'", spec.node_id)));
            }
        }

        let mut dependencies = Vec::with_capacity(specs.len());
        for spec in specs {
            if registry.descriptor(&spec.agent_id).is_none() {
                return Err(invalid(format!(
                    "node '{}' references unknown agent '{}'",
                    spec.node_id, spec.agent_id
                )));
            }
            if !registry.supports(&spec.agent_id, &spec.action) {
                return Err(invalid(format!(
                    "agent '{}' does not support action '{}' (node '{}')",
                    spec.agent_id, spec.action, spec.node_id
                )));
            }

            let mut deps = Vec::with_capacity(spec.depends_on.len());
            for dep in &spec.depends_on {
                let Some(&position) = index.get(dep) else {
                    return Err(invalid(format!(
                        "node '{}' depends on unknown node '{dep}'",
                        spec.node_id
                    )));
                };
                if !deps.contains(&position) {
                    deps.push(position);
                }
            }
            dependencies.push(deps);
        }

        let mut dependents = vec![Vec::new(); specs.len()];
        for (position, deps) in dependencies.iter().enumerate() {
            for &dep in deps {
                dependents[dep].push(position);
            }
        }

        let topological_order = topological_sort(&dependencies, &dependents);
        if topological_order.len() != specs.len() {
            let sorted: HashSet<usize> = topological_order.iter().copied().collect();
            let cyclic: Vec<&str> = specs
                .iter()
                .enumerate()
                .filter(|(position, _)| !sorted.contains(position))
                .map(|(_, spec)| spec.node_id.as_str())
                .collect();
            return Err(invalid(format!(
                "dependency cycle among nodes [{}]",
                cyclic.join(", ")
            )));
        }

        let nodes = specs
            .iter()
            .zip(&dependencies)
            .map(|(spec, deps)| instantiate_node(spec, deps, specs, request))
            .collect();

        debug!(
            "Built workflow graph with {} nodes for company '{}'",
            specs.len(),
            request.company_id
        );

        Ok(Self {
            nodes,
            index,
            dependencies,
            dependents,
            topological_order,
        })
    }

    /// All nodes in template order
    pub fn nodes(&self) -> &[WorkflowNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Look up a node by id
    pub fn node(&self, node_id: &str) -> Option<&WorkflowNode> {
        self.index_of(node_id).map(|position| &self.nodes[position])
    }

    /// Position of a node in template order
    pub fn index_of(&self, node_id: &str) -> Option<usize> {
        self.index.get(node_id).copied()
    }

    /// Node at `position`
    pub fn node_at(&self, position: usize) -> Option<&WorkflowNode> {
        self.nodes.get(position)
    }

    /// Mutable node access for the execution engine
    pub fn node_at_mut(&mut self, position: usize) -> Option<&mut WorkflowNode> {
        self.nodes.get_mut(position)
    }

    /// Direct dependencies of the node at `position`
    pub fn dependencies_of(&self, position: usize) -> &[usize] {
        self.dependencies.get(position).map_or(&[], Vec::as_slice)
    }

    /// Direct dependents of the node at `position`
    pub fn dependents_of(&self, position: usize) -> &[usize] {
        self.dependents.get(position).map_or(&[], Vec::as_slice)
    }

    /// Every node reachable through dependents of `position`, in template order
    pub fn transitive_dependents(&self, position: usize) -> Vec<usize> {
        let mut seen = HashSet::new();
        let mut queue: VecDeque<usize> = self.dependents_of(position).iter().copied().collect();
        while let Some(next) = queue.pop_front() {
            if seen.insert(next) {
                queue.extend(self.dependents_of(next).iter().copied());
            }
        }
        let mut reached: Vec<usize> = seen.into_iter().collect();
        reached.sort_unstable();
        reached
    }

    /// Node positions in a stable topological order
    pub fn topological_order(&self) -> &[usize] {
        &self.topological_order
    }

    /// Dependency edges as `(from, to)` node id pairs, in template order
    pub fn edges(&self) -> Vec<(String, String)> {
        self.dependencies
            .iter()
            .enumerate()
            .flat_map(|(position, deps)| {
                deps.iter().map(move |&dep| {
                    (
                        self.nodes[dep].node_id.clone(),
                        self.nodes[position].node_id.clone(),
                    )
                })
            })
            .collect()
    }

    /// Whether every dependency of `position` has succeeded or been skipped
    pub fn dependencies_satisfied(&self, position: usize) -> bool {
        self.dependencies_of(position)
            .iter()
            .all(|&dep| self.nodes[dep].state.satisfies_dependents())
    }

    /// Pending nodes whose dependencies are satisfied, in template order
    pub fn promotable(&self) -> Vec<usize> {
        (0..self.nodes.len())
            .filter(|&position| {
                self.nodes[position].state == NodeState::Pending
                    && self.dependencies_satisfied(position)
            })
            .collect()
    }

    /// Positions of nodes in `state`, in template order
    pub fn positions_in(&self, state: NodeState) -> Vec<usize> {
        (0..self.nodes.len())
            .filter(|&position| self.nodes[position].state == state)
            .collect()
    }

    /// Count nodes in `state`
    pub fn count_in(&self, state: NodeState) -> usize {
        self.nodes.iter().filter(|node| node.state == state).count()
    }

    /// Input for dispatching the node at `position`
    ///
    /// The stored `input_params` plus the results of every succeeded
    /// dependency under the `upstream` key.
    pub fn dispatch_params(&self, position: usize) -> Params {
        let node = &self.nodes[position];
        let mut params = node.input_params.clone();
        for &dep in self.dependencies_of(position) {
            let upstream = &self.nodes[dep];
            if let Some(output) = &upstream.result {
                params.insert_upstream(upstream.node_id.clone(), output.clone());
            }
        }
        params
    }

    /// Results of succeeded nodes keyed by node id
    pub fn results(&self) -> Vec<(&str, &Value)> {
        self.nodes
            .iter()
            .filter_map(|node| node.result.as_ref().map(|r| (node.node_id.as_str(), r)))
            .collect()
    }
}

fn invalid(message: impl Into<String>) -> Error {
    Error::InvalidWorkflow(message.into())
}

/// Kahn's algorithm, always taking the lowest template position first
fn topological_sort(dependencies: &[Vec<usize>], dependents: &[Vec<usize>]) -> Vec<usize> {
    let mut in_degree: Vec<usize> = dependencies.iter().map(Vec::len).collect();
    let mut frontier: BinaryHeap<Reverse<usize>> = in_degree
        .iter()
        .enumerate()
        .filter(|(_, degree)| **degree == 0)
        .map(|(position, _)| Reverse(position))
        .collect();

    let mut order = Vec::with_capacity(dependencies.len());
    while let Some(Reverse(position)) = frontier.pop() {
        order.push(position);
        for &dependent in &dependents[position] {
            in_degree[dependent] -= 1;
            if in_degree[dependent] == 0 {
                frontier.push(Reverse(dependent));
            }
        }
    }
    order
}

fn instantiate_node(
    spec: &NodeSpec,
    deps: &[usize],
    specs: &[NodeSpec],
    request: &EvaluationRequest,
) -> WorkflowNode {
    let mut params = spec.params.clone();
    params.merge(&request.parameters);
    params.remove(keys::UPSTREAM);
    params.insert(keys::COMPANY_ID, Value::String(request.company_id.clone()));
    params.insert(
        keys::EVALUATION_TYPE,
        Value::String(request.evaluation_type.clone()),
    );

    let mut node = WorkflowNode::new(&spec.node_id, &spec.agent_id, &spec.action);
    node.input_params = params;
    node.depends_on = deps.iter().map(|&dep| specs[dep].node_id.clone()).collect();
    node.timeout = spec.timeout;
    node.report_relevant = spec.report_relevant;
    node
}
