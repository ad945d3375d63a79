//! Built-in agents for the company evaluation pipeline
//!
//! Each agent is a small deterministic calculation over the request's
//! financial statements and the outputs of its upstream nodes. They exist so
//! the pipeline can run end to end; production deployments register their
//! own implementations under the same ids.

pub mod agents;
pub mod financials;

pub use agents::{
    CertifierAgent, FinancialExtractorAgent, PredictorAgent, ReportGeneratorAgent,
    RiskAssessorAgent, StrategicAnalystAgent, register_builtin,
};
pub use financials::Financials;
