//! Consolidated report agent

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::debug;
use valorix_core::{Agent, AgentResult, Params};

use super::{expect_action, upstream, upstream_number};
use crate::financials::round2;

/// Combines the strategic, risk and forecast analyses into a graded report
#[derive(Debug, Clone)]
pub struct ReportGeneratorAgent {
    strategy_source: String,
    risk_source: String,
    prediction_source: String,
}

impl Default for ReportGeneratorAgent {
    fn default() -> Self {
        Self {
            strategy_source: "strategy".to_string(),
            risk_source: "risk".to_string(),
            prediction_source: "prediction".to_string(),
        }
    }
}

impl ReportGeneratorAgent {
    pub const ID: &'static str = "report-generator";
    pub const ACTION: &'static str = "generate";

    /// Letter grade for an overall score
    pub fn grade(score: f64) -> &'static str {
        match score {
            s if s >= 75.0 => "A",
            s if s >= 60.0 => "B",
            s if s >= 45.0 => "C",
            _ => "D",
        }
    }
}

#[async_trait]
impl Agent for ReportGeneratorAgent {
    async fn perform(&self, action: &str, params: Params) -> AgentResult<Value> {
        expect_action(Self::ID, Self::ACTION, action)?;

        let strategy = upstream_number(&params, &self.strategy_source, "score")?;
        let risk = upstream_number(&params, &self.risk_source, "score")?;
        let forecast = upstream(&params, &self.prediction_source)?;

        let overall = (strategy + (100.0 - risk)) / 2.0;
        let grade = Self::grade(overall);
        let recommendation = match grade {
            "A" | "B" => "invest",
            "C" => "monitor",
            _ => "avoid",
        };

        debug!("Report score {:.1}, grade {}", overall, grade);
        Ok(json!({
            "company_id": params.company_id(),
            "evaluation_type": params.evaluation_type(),
            "overall_score": round2(overall),
            "grade": grade,
            "recommendation": recommendation,
            "sections": {
                "strategy": upstream(&params, &self.strategy_source)?,
                "risk": upstream(&params, &self.risk_source)?,
                "forecast": forecast,
            }
        }))
    }
}
