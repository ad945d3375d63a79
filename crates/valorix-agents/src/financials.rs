//! Financial statement figures shared by the built-in agents

use serde::{Deserialize, Serialize};
use serde_json::Value;
use valorix_core::{AgentError, AgentResult, Params};

/// Headline figures from a company's latest statements
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Financials {
    pub revenue: f64,
    pub net_income: f64,
    pub total_assets: f64,
    pub total_liabilities: f64,
    #[serde(default)]
    pub cash: f64,
    /// Year-over-year revenue growth as a fraction (0.08 = 8%)
    #[serde(default)]
    pub revenue_growth: f64,
}

impl Financials {
    /// Request parameter holding the statements
    pub const PARAM: &'static str = "financials";

    /// Read and validate the statements from request parameters
    pub fn from_params(params: &Params) -> AgentResult<Self> {
        let raw = params.get(Self::PARAM).ok_or_else(|| {
            AgentError::invalid_input(format!("missing '{}' parameter", Self::PARAM))
        })?;
        Self::from_value(raw)
    }

    /// Parse and validate statements from a JSON value
    pub fn from_value(raw: &Value) -> AgentResult<Self> {
        let financials: Self = serde_json::from_value(raw.clone())
            .map_err(|e| AgentError::invalid_input(format!("malformed financials: {e}")))?;
        financials.validate()?;
        Ok(financials)
    }

    /// Reject figures no analysis can work with
    pub fn validate(&self) -> AgentResult<()> {
        let figures = [
            self.revenue,
            self.net_income,
            self.total_assets,
            self.total_liabilities,
            self.cash,
            self.revenue_growth,
        ];
        if figures.iter().any(|figure| !figure.is_finite()) {
            return Err(AgentError::invalid_input("financial figures must be finite"));
        }
        if self.revenue <= 0.0 {
            return Err(AgentError::invalid_input("revenue must be positive"));
        }
        if self.total_assets <= 0.0 {
            return Err(AgentError::invalid_input("total_assets must be positive"));
        }
        if self.total_liabilities < 0.0 || self.cash < 0.0 {
            return Err(AgentError::invalid_input(
                "total_liabilities and cash must not be negative",
            ));
        }
        Ok(())
    }

    pub fn net_margin(&self) -> f64 {
        self.net_income / self.revenue
    }

    /// Liabilities as a share of assets
    pub fn debt_ratio(&self) -> f64 {
        self.total_liabilities / self.total_assets
    }

    pub fn equity(&self) -> f64 {
        self.total_assets - self.total_liabilities
    }

    /// `None` when equity is not positive
    pub fn return_on_equity(&self) -> Option<f64> {
        let equity = self.equity();
        (equity > 0.0).then(|| self.net_income / equity)
    }

    /// Cash against liabilities; `None` without liabilities
    pub fn cash_coverage(&self) -> Option<f64> {
        (self.total_liabilities > 0.0).then(|| self.cash / self.total_liabilities)
    }
}

/// Round to two decimals for stable, readable output
pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Value {
        json!({
            "revenue": 1000.0,
            "net_income": 120.0,
            "total_assets": 2000.0,
            "total_liabilities": 800.0,
            "cash": 200.0,
            "revenue_growth": 0.1
        })
    }

    #[test]
    fn test_ratios() {
        let financials = Financials::from_value(&sample()).unwrap();
        assert!((financials.net_margin() - 0.12).abs() < 1e-9);
        assert!((financials.debt_ratio() - 0.4).abs() < 1e-9);
        assert!((financials.equity() - 1200.0).abs() < 1e-9);
        assert!((financials.return_on_equity().unwrap() - 0.1).abs() < 1e-9);
        assert!((financials.cash_coverage().unwrap() - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_missing_parameter_is_invalid_input() {
        let err = Financials::from_params(&Params::new()).unwrap_err();
        assert!(err.is_invalid_input());
        assert!(err.message.contains("financials"));
    }

    #[test]
    fn test_malformed_and_implausible_figures_rejected() {
        let err = Financials::from_value(&json!({"revenue": "lots"})).unwrap_err();
        assert!(err.is_invalid_input());

        let mut raw = sample();
        raw["revenue"] = json!(0.0);
        assert!(Financials::from_value(&raw).is_err());

        let mut raw = sample();
        raw["total_liabilities"] = json!(-1.0);
        assert!(Financials::from_value(&raw).is_err());
    }

    #[test]
    fn test_negative_equity_has_no_roe() {
        let mut raw = sample();
        raw["total_liabilities"] = json!(2500.0);
        let financials = Financials::from_value(&raw).unwrap();
        assert!(financials.return_on_equity().is_none());
    }

    #[test]
    fn test_round2() {
        assert!((round2(1.23456) - 1.23).abs() < f64::EPSILON);
        assert!((round2(0.125_1) - 0.13).abs() < f64::EPSILON);
    }
}
