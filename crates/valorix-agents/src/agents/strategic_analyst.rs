//! Strategic analysis agent

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::debug;
use valorix_core::{Agent, AgentResult, Params};

use super::{expect_action, upstream_financials};
use crate::financials::round2;

/// Scores competitive position from growth and profitability
#[derive(Debug, Clone)]
pub struct StrategicAnalystAgent {
    source: String,
}

impl Default for StrategicAnalystAgent {
    fn default() -> Self {
        Self {
            source: "extract".to_string(),
        }
    }
}

impl StrategicAnalystAgent {
    pub const ID: &'static str = "strategic-analyst";
    pub const ACTION: &'static str = "analyze";

    /// Read statements from a differently named extraction node
    pub fn with_source(mut self, node_id: impl Into<String>) -> Self {
        self.source = node_id.into();
        self
    }
}

#[async_trait]
impl Agent for StrategicAnalystAgent {
    async fn perform(&self, action: &str, params: Params) -> AgentResult<Value> {
        expect_action(Self::ID, Self::ACTION, action)?;
        let financials = upstream_financials(&params, &self.source)?;

        let growth = financials.revenue_growth;
        let margin = financials.net_margin();
        let score = (50.0 + growth * 200.0 + margin * 100.0).clamp(0.0, 100.0);
        let positioning = match score {
            s if s >= 70.0 => "leader",
            s if s >= 45.0 => "challenger",
            _ => "laggard",
        };

        let mut strengths = Vec::new();
        let mut weaknesses = Vec::new();
        if growth >= 0.05 {
            strengths.push("revenue growing faster than inflation");
        } else if growth < 0.0 {
            weaknesses.push("shrinking revenue");
        }
        if margin >= 0.1 {
            strengths.push("healthy net margin");
        } else if margin < 0.0 {
            weaknesses.push("loss-making");
        }

        debug!("Strategic score {:.1} ({})", score, positioning);
        Ok(json!({
            "score": round2(score),
            "positioning": positioning,
            "strengths": strengths,
            "weaknesses": weaknesses,
        }))
    }
}
