//! Report certification agent

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::debug;
use valorix_core::{Agent, AgentError, AgentResult, Params};

use super::{expect_action, upstream};

const REQUIRED_SECTIONS: [&str; 3] = ["strategy", "risk", "forecast"];

/// Checks a generated report for completeness and issues a certificate
#[derive(Debug, Clone)]
pub struct CertifierAgent {
    source: String,
    /// Grades that may be certified
    accepted_grades: Vec<String>,
}

impl Default for CertifierAgent {
    fn default() -> Self {
        Self {
            source: "report".to_string(),
            accepted_grades: ["A", "B", "C"].map(String::from).to_vec(),
        }
    }
}

impl CertifierAgent {
    pub const ID: &'static str = "certifier";
    pub const ACTION: &'static str = "certify";

    /// Restrict which grades are certified
    pub fn with_accepted_grades<I, S>(mut self, grades: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.accepted_grades = grades.into_iter().map(Into::into).collect();
        self
    }
}

#[async_trait]
impl Agent for CertifierAgent {
    async fn perform(&self, action: &str, params: Params) -> AgentResult<Value> {
        expect_action(Self::ID, Self::ACTION, action)?;
        let report = upstream(&params, &self.source)?;

        let grade = report
            .get("grade")
            .and_then(Value::as_str)
            .ok_or_else(|| AgentError::invalid_input("report has no grade"))?;
        let missing: Vec<&str> = REQUIRED_SECTIONS
            .into_iter()
            .filter(|section| report.pointer(&format!("/sections/{section}")).is_none())
            .collect();

        let certified = missing.is_empty() && self.accepted_grades.iter().any(|g| g == grade);
        let company = params.company_id().unwrap_or("unknown");
        debug!("Certification for '{}': {}", company, certified);

        Ok(json!({
            "certified": certified,
            "grade": grade,
            "missing_sections": missing,
            "certificate_id": certified.then(|| format!("VX-{company}-{grade}")),
        }))
    }
}
