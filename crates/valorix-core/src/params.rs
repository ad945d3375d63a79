//! Input payload for agent invocations
//!
//! `Params` is a flexible key-value store holding the caller-supplied request
//! parameters for one workflow node, plus the outputs of upstream nodes that
//! the engine hands over at dispatch time.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Well-known parameter keys
pub mod keys {
    /// Identifier of the company under evaluation
    pub const COMPANY_ID: &str = "company_id";
    /// Kind of evaluation requested (e.g., "full", "quick")
    pub const EVALUATION_TYPE: &str = "evaluation_type";
    /// Reserved key holding upstream node outputs, keyed by node id
    pub const UPSTREAM: &str = "upstream";
}

/// Parameters passed to an agent action
///
/// Keys are kept ordered so that two payloads built from the same inputs
/// serialize identically.
///
/// # Example
///
/// ```
/// use valorix_core::Params;
/// use serde_json::json;
///
/// let params = Params::new()
///     .with_company_id("ACME-42")
///     .with("sector", json!("industrials"));
///
/// assert_eq!(params.company_id(), Some("ACME-42"));
/// assert_eq!(params.get_str("sector"), Some("industrials"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Params {
    data: BTreeMap<String, Value>,
}

impl Params {
    /// Create an empty parameter set
    pub fn new() -> Self {
        Self::default()
    }

    // =========== Builder Methods ===========

    /// Set an arbitrary key
    pub fn with(mut self, key: impl Into<String>, value: Value) -> Self {
        self.insert(key, value);
        self
    }

    /// Set the company id
    pub fn with_company_id(mut self, company_id: impl Into<String>) -> Self {
        self.insert(keys::COMPANY_ID, Value::String(company_id.into()));
        self
    }

    /// Set the evaluation type
    pub fn with_evaluation_type(mut self, evaluation_type: impl Into<String>) -> Self {
        self.insert(keys::EVALUATION_TYPE, Value::String(evaluation_type.into()));
        self
    }

    // =========== Common Accessors ===========

    /// Get the company id
    pub fn company_id(&self) -> Option<&str> {
        self.get_str(keys::COMPANY_ID)
    }

    /// Get the evaluation type
    pub fn evaluation_type(&self) -> Option<&str> {
        self.get_str(keys::EVALUATION_TYPE)
    }

    /// Get the output an upstream node produced
    pub fn upstream(&self, node_id: &str) -> Option<&Value> {
        self.data
            .get(keys::UPSTREAM)
            .and_then(Value::as_object)
            .and_then(|outputs| outputs.get(node_id))
    }

    /// Record an upstream node output under the reserved `upstream` key
    pub fn insert_upstream(&mut self, node_id: impl Into<String>, output: Value) {
        let slot = self
            .data
            .entry(keys::UPSTREAM.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !slot.is_object() {
            *slot = Value::Object(Map::new());
        }
        if let Value::Object(outputs) = slot {
            outputs.insert(node_id.into(), output);
        }
    }

    // =========== Generic Key-Value Operations ===========

    /// Insert a value
    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.data.insert(key.into(), value);
    }

    /// Get a value
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Get a string value
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    /// Get a numeric value
    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(Value::as_f64)
    }

    /// Check if a key exists
    pub fn contains_key(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    /// Remove a value
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.data.remove(key)
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Iterate over entries in key order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.data.iter()
    }

    /// Merge another parameter set into this one (other values override)
    pub fn merge(&mut self, other: &Params) {
        for (key, value) in &other.data {
            self.data.insert(key.clone(), value.clone());
        }
    }
}

impl From<Map<String, Value>> for Params {
    fn from(map: Map<String, Value>) -> Self {
        Self {
            data: map.into_iter().collect(),
        }
    }
}
