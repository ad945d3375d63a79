//! Revenue and earnings forecasting agent

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::debug;
use valorix_core::{Agent, AgentError, AgentResult, Params};

use super::{expect_action, upstream_financials};
use crate::financials::round2;

/// Projects revenue with a decaying growth rate and a constant net margin
#[derive(Debug, Clone)]
pub struct PredictorAgent {
    source: String,
    default_horizon: u64,
    growth_decay: f64,
}

impl Default for PredictorAgent {
    fn default() -> Self {
        Self {
            source: "extract".to_string(),
            default_horizon: 3,
            growth_decay: 0.8,
        }
    }
}

impl PredictorAgent {
    pub const ID: &'static str = "predictor";
    pub const ACTION: &'static str = "forecast";
    /// Optional request parameter overriding the forecast horizon
    pub const HORIZON_PARAM: &'static str = "horizon_years";
    const MAX_HORIZON: u64 = 10;

    /// Read statements from a differently named extraction node
    pub fn with_source(mut self, node_id: impl Into<String>) -> Self {
        self.source = node_id.into();
        self
    }

    fn horizon(&self, params: &Params) -> AgentResult<u64> {
        let Some(raw) = params.get(Self::HORIZON_PARAM) else {
            return Ok(self.default_horizon);
        };
        match raw.as_u64() {
            Some(years) if (1..=Self::MAX_HORIZON).contains(&years) => Ok(years),
            _ => Err(AgentError::invalid_input(format!(
                "{} must be an integer between 1 and {}",
                Self::HORIZON_PARAM,
                Self::MAX_HORIZON
            ))),
        }
    }
}

#[async_trait]
impl Agent for PredictorAgent {
    async fn perform(&self, action: &str, params: Params) -> AgentResult<Value> {
        expect_action(Self::ID, Self::ACTION, action)?;
        let financials = upstream_financials(&params, &self.source)?;
        let horizon = self.horizon(&params)?;

        let margin = financials.net_margin();
        let mut growth = financials.revenue_growth;
        let mut revenue = financials.revenue;
        let mut projections = Vec::new();
        for year in 1..=horizon {
            revenue *= 1.0 + growth;
            projections.push(json!({
                "year": year,
                "revenue": round2(revenue),
                "net_income": round2(revenue * margin),
                "growth": round2(growth),
            }));
            growth *= self.growth_decay;
        }

        let cagr = (revenue / financials.revenue).powf(1.0 / horizon as f64) - 1.0;
        debug!("Forecast {} year(s), CAGR {:.3}", horizon, cagr);
        Ok(json!({
            "horizon_years": horizon,
            "projections": projections,
            "final_revenue": round2(revenue),
            "cagr": round2(cagr),
        }))
    }
}
