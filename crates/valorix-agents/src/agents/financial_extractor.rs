//! Financial extraction agent

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::debug;
use valorix_core::{Agent, AgentResult, Params};

use super::expect_action;
use crate::financials::{Financials, round2};

/// Validates the submitted statements and derives headline ratios
///
/// Every downstream analysis reads the statements from this agent's output,
/// so malformed input stops the pipeline at its first step.
#[derive(Debug, Default, Clone, Copy)]
pub struct FinancialExtractorAgent;

impl FinancialExtractorAgent {
    pub const ID: &'static str = "financial-extractor";
    pub const ACTION: &'static str = "extract";
}

#[async_trait]
impl Agent for FinancialExtractorAgent {
    async fn perform(&self, action: &str, params: Params) -> AgentResult<Value> {
        expect_action(Self::ID, Self::ACTION, action)?;
        let financials = Financials::from_params(&params)?;
        debug!(
            "Extracted financials for '{}'",
            params.company_id().unwrap_or("unknown")
        );

        Ok(json!({
            "company_id": params.company_id(),
            "financials": financials,
            "ratios": {
                "net_margin": round2(financials.net_margin()),
                "debt_ratio": round2(financials.debt_ratio()),
                "return_on_equity": financials.return_on_equity().map(round2),
                "cash_coverage": financials.cash_coverage().map(round2),
            }
        }))
    }
}
