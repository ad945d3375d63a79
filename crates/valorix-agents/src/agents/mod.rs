//! Company evaluation agents

pub mod certifier;
pub mod financial_extractor;
pub mod predictor;
pub mod report_generator;
pub mod risk_assessor;
pub mod strategic_analyst;

pub use certifier::CertifierAgent;
pub use financial_extractor::FinancialExtractorAgent;
pub use predictor::PredictorAgent;
pub use report_generator::ReportGeneratorAgent;
pub use risk_assessor::RiskAssessorAgent;
pub use strategic_analyst::StrategicAnalystAgent;

use serde_json::Value;
use std::sync::Arc;
use tracing::info;
use valorix_core::{AgentDescriptor, AgentError, AgentResult, Params, Result};
use valorix_registry::AgentRegistry;

use crate::financials::Financials;

/// Register every built-in agent under the ids the company evaluation
/// template uses
///
/// `risk-assessor` falls back to a stricter `risk-assessor-conservative`
/// variant.
pub fn register_builtin(registry: &mut AgentRegistry) -> Result<()> {
    registry.register(
        AgentDescriptor::new(FinancialExtractorAgent::ID).with_action(FinancialExtractorAgent::ACTION),
        Arc::new(FinancialExtractorAgent),
    )?;
    registry.register(
        AgentDescriptor::new(StrategicAnalystAgent::ID).with_action(StrategicAnalystAgent::ACTION),
        Arc::new(StrategicAnalystAgent::default()),
    )?;
    registry.register(
        AgentDescriptor::new(RiskAssessorAgent::ID)
            .with_action(RiskAssessorAgent::ACTION)
            .with_fallback(RiskAssessorAgent::CONSERVATIVE_ID),
        Arc::new(RiskAssessorAgent::default()),
    )?;
    registry.register(
        AgentDescriptor::new(RiskAssessorAgent::CONSERVATIVE_ID)
            .with_action(RiskAssessorAgent::ACTION),
        Arc::new(RiskAssessorAgent::conservative()),
    )?;
    registry.register(
        AgentDescriptor::new(PredictorAgent::ID).with_action(PredictorAgent::ACTION),
        Arc::new(PredictorAgent::default()),
    )?;
    registry.register(
        AgentDescriptor::new(ReportGeneratorAgent::ID).with_action(ReportGeneratorAgent::ACTION),
        Arc::new(ReportGeneratorAgent::default()),
    )?;
    registry.register(
        AgentDescriptor::new(CertifierAgent::ID).with_action(CertifierAgent::ACTION),
        Arc::new(CertifierAgent::default()),
    )?;

    info!("Registered {} built-in agents", registry.len());
    Ok(())
}

/// Refuse actions an agent was not built for
fn expect_action(agent_id: &str, expected: &str, action: &str) -> AgentResult<()> {
    if action == expected {
        Ok(())
    } else {
        Err(AgentError::invalid_input(format!(
            "{agent_id} does not support action '{action}'"
        )))
    }
}

/// Output of an upstream node, which must be present
fn upstream<'a>(params: &'a Params, node_id: &str) -> AgentResult<&'a Value> {
    params
        .upstream(node_id)
        .ok_or_else(|| AgentError::invalid_input(format!("missing upstream output '{node_id}'")))
}

/// Statements re-published by the extraction node
fn upstream_financials(params: &Params, node_id: &str) -> AgentResult<Financials> {
    let output = upstream(params, node_id)?;
    let raw = output.get(Financials::PARAM).ok_or_else(|| {
        AgentError::invalid_input(format!("upstream '{node_id}' carries no financials"))
    })?;
    Financials::from_value(raw)
}

/// Numeric field of an upstream output
fn upstream_number(params: &Params, node_id: &str, field: &str) -> AgentResult<f64> {
    upstream(params, node_id)?
        .get(field)
        .and_then(Value::as_f64)
        .ok_or_else(|| {
            AgentError::invalid_input(format!("upstream '{node_id}' has no numeric '{field}'"))
        })
}
