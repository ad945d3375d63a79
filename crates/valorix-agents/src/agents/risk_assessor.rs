//! Risk assessment agent

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::debug;
use valorix_core::{Agent, AgentResult, Params};

use super::{expect_action, upstream_financials};
use crate::financials::round2;

/// Scores balance-sheet risk from leverage, profitability and liquidity
///
/// The conservative variant weighs every factor more heavily; it is
/// registered as the fallback for the standard assessor.
#[derive(Debug, Clone)]
pub struct RiskAssessorAgent {
    source: String,
    weight: f64,
}

impl Default for RiskAssessorAgent {
    fn default() -> Self {
        Self {
            source: "extract".to_string(),
            weight: 1.0,
        }
    }
}

impl RiskAssessorAgent {
    pub const ID: &'static str = "risk-assessor";
    pub const CONSERVATIVE_ID: &'static str = "risk-assessor-conservative";
    pub const ACTION: &'static str = "assess";

    /// Stricter variant used as fallback
    pub fn conservative() -> Self {
        Self {
            weight: 1.25,
            ..Self::default()
        }
    }

    /// Read statements from a differently named extraction node
    pub fn with_source(mut self, node_id: impl Into<String>) -> Self {
        self.source = node_id.into();
        self
    }
}

#[async_trait]
impl Agent for RiskAssessorAgent {
    async fn perform(&self, action: &str, params: Params) -> AgentResult<Value> {
        expect_action(Self::ID, Self::ACTION, action)?;
        let financials = upstream_financials(&params, &self.source)?;

        let mut factors = Vec::new();
        let mut raw = financials.debt_ratio() * 60.0;
        if financials.debt_ratio() > 0.6 {
            factors.push("high leverage");
        }
        if financials.net_income < 0.0 {
            raw += 25.0;
            factors.push("net loss");
        }
        if financials.cash_coverage().is_some_and(|coverage| coverage < 0.1) {
            raw += 15.0;
            factors.push("thin cash buffer");
        }

        let score = (raw * self.weight).clamp(0.0, 100.0);
        let level = match score {
            s if s < 35.0 => "low",
            s if s < 65.0 => "medium",
            _ => "high",
        };

        debug!("Risk score {:.1} ({})", score, level);
        Ok(json!({
            "score": round2(score),
            "level": level,
            "factors": factors,
        }))
    }
}
