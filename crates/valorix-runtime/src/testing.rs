//! Scripted agents for driving the engine deterministically in tests

use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use valorix_core::{Agent, AgentDescriptor, AgentError, AgentResult, Params};
use valorix_registry::AgentRegistry;

/// Agents and actions of the company evaluation pipeline
pub(crate) const PIPELINE: [(&str, &str); 6] = [
    ("financial-extractor", "extract"),
    ("strategic-analyst", "analyze"),
    ("risk-assessor", "assess"),
    ("predictor", "forecast"),
    ("report-generator", "generate"),
    ("certifier", "certify"),
];

enum Step {
    Reply(AgentResult<Value>),
    Panic,
    Hang,
}

/// Tracks how many agents run at once
#[derive(Debug, Default)]
pub(crate) struct ConcurrencyProbe {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl ConcurrencyProbe {
    fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }

    pub(crate) fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

/// Ordered `start:<name>` / `end:<name>` events across agents
#[derive(Debug, Default)]
pub(crate) struct Journal {
    events: Mutex<Vec<String>>,
}

impl Journal {
    fn record(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }

    pub(crate) fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub(crate) fn position(&self, event: &str) -> usize {
        self.events()
            .iter()
            .position(|recorded| recorded == event)
            .unwrap_or_else(|| panic!("event '{event}' not recorded"))
    }
}

/// Agent replaying a queue of canned outcomes, then succeeding
pub(crate) struct ScriptedAgent {
    name: String,
    script: Mutex<VecDeque<Step>>,
    latency: Duration,
    calls: AtomicU32,
    inputs: Mutex<Vec<Params>>,
    probe: Option<Arc<ConcurrencyProbe>>,
    journal: Option<Arc<Journal>>,
}

impl ScriptedAgent {
    pub(crate) fn new() -> Self {
        Self {
            name: "scripted".to_string(),
            script: Mutex::new(VecDeque::new()),
            latency: Duration::ZERO,
            calls: AtomicU32::new(0),
            inputs: Mutex::new(Vec::new()),
            probe: None,
            journal: None,
        }
    }

    pub(crate) fn named(name: &str) -> Self {
        let mut agent = Self::new();
        agent.name = name.to_string();
        agent
    }

    pub(crate) fn then_fail(self, error: AgentError) -> Self {
        self.script.lock().unwrap().push_back(Step::Reply(Err(error)));
        self
    }

    pub(crate) fn then_succeed(self, output: Value) -> Self {
        self.script.lock().unwrap().push_back(Step::Reply(Ok(output)));
        self
    }

    pub(crate) fn then_panic(self) -> Self {
        self.script.lock().unwrap().push_back(Step::Panic);
        self
    }

    pub(crate) fn then_hang(self) -> Self {
        self.script.lock().unwrap().push_back(Step::Hang);
        self
    }

    pub(crate) fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub(crate) fn with_probe(mut self, probe: Arc<ConcurrencyProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    pub(crate) fn with_journal(mut self, journal: Arc<Journal>) -> Self {
        self.journal = Some(journal);
        self
    }

    pub(crate) fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn inputs(&self) -> Vec<Params> {
        self.inputs.lock().unwrap().clone()
    }
}

#[async_trait]
impl Agent for ScriptedAgent {
    async fn perform(&self, action: &str, params: Params) -> AgentResult<Value> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.inputs.lock().unwrap().push(params);
        let step = self.script.lock().unwrap().pop_front();

        if let Some(journal) = &self.journal {
            journal.record(format!("start:{}", self.name));
        }
        if let Some(probe) = &self.probe {
            probe.enter();
        }

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        if let Some(probe) = &self.probe {
            probe.exit();
        }
        if let Some(journal) = &self.journal {
            journal.record(format!("end:{}", self.name));
        }

        match step {
            Some(Step::Reply(outcome)) => outcome,
            Some(Step::Panic) => panic!("scripted panic in {}", self.name),
            Some(Step::Hang) => std::future::pending().await,
            None => Ok(json!({"agent": self.name, "action": action, "call": call})),
        }
    }
}

/// Register `agent` as `id`, supporting `action`
pub(crate) fn register(
    registry: &mut AgentRegistry,
    id: &str,
    action: &str,
    fallbacks: &[&str],
    agent: Arc<ScriptedAgent>,
) {
    let mut descriptor = AgentDescriptor::new(id).with_action(action);
    for fallback in fallbacks {
        descriptor = descriptor.with_fallback(*fallback);
    }
    registry.register(descriptor, agent).unwrap();
}

/// Registry with one scripted agent per pipeline step
pub(crate) fn pipeline_registry(mut factory: impl FnMut(&str) -> ScriptedAgent) -> AgentRegistry {
    let mut registry = AgentRegistry::new();
    for (id, action) in PIPELINE {
        register(&mut registry, id, action, &[], Arc::new(factory(id)));
    }
    registry
}
