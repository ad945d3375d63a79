//! CLI configuration file and request assembly

use anyhow::{Context, bail};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use std::time::Duration;
use valorix_agents::Financials;
use valorix_core::Params;
use valorix_runtime::EngineConfig;
use valorix_utils::{Config, load_json};
use valorix_workflow::EvaluationRequest;

/// Contents of the `--config` file
///
/// Application settings sit at the top level; engine tuning lives under
/// `engine`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    #[serde(flatten)]
    pub app: Config,
    pub engine: EngineConfig,
}

impl CliConfig {
    /// Load the file, or fall back to defaults when no path is given
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let config: Self = load_json(path)?;
        config
            .engine
            .validate()
            .with_context(|| format!("invalid engine section in {}", path.display()))?;
        Ok(config)
    }
}

/// Parse repeated `key=value` arguments
///
/// Values that parse as JSON keep their type; anything else is a string.
pub fn parse_params(pairs: &[String]) -> anyhow::Result<Params> {
    let mut params = Params::new();
    for pair in pairs {
        let Some((key, raw)) = pair.split_once('=') else {
            bail!("parameter '{pair}' is not of the form key=value");
        };
        let key = key.trim();
        if key.is_empty() {
            bail!("parameter '{pair}' has an empty key");
        }
        let value =
            serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        params.insert(key, value);
    }
    Ok(params)
}

/// Build the evaluation request from command-line inputs
pub fn build_request(
    company_id: &str,
    evaluation_type: &str,
    financials: Option<&Path>,
    params: &[String],
    deadline_secs: Option<u64>,
) -> anyhow::Result<EvaluationRequest> {
    let mut parameters = parse_params(params)?;
    if let Some(path) = financials {
        let statements: Value = load_json(path)?;
        parameters.insert(Financials::PARAM, statements);
    }

    let mut request =
        EvaluationRequest::new(company_id, evaluation_type).with_parameters(parameters);
    if let Some(secs) = deadline_secs {
        request = request.with_deadline(Duration::from_secs(secs));
    }
    Ok(request)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::path::PathBuf;

    fn temp_file(contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("valorix-cli-{}.json", uuid::Uuid::new_v4()));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_parse_params() {
        let params = parse_params(&[
            "horizon_years=5".to_string(),
            "region=emea".to_string(),
            "flags={\"strict\":true}".to_string(),
        ])
        .unwrap();

        assert_eq!(params.get("horizon_years"), Some(&json!(5)));
        assert_eq!(params.get_str("region"), Some("emea"));
        assert_eq!(params.get("flags"), Some(&json!({"strict": true})));
    }

    #[test]
    fn test_parse_params_rejects_malformed_pairs() {
        assert!(parse_params(&["novalue".to_string()]).is_err());
        assert!(parse_params(&["=1".to_string()]).is_err());
    }

    #[test]
    fn test_config_defaults_without_file() {
        let config = CliConfig::load(None).unwrap();
        assert_eq!(config.app.app_name, "valorix");
        assert_eq!(config.engine, EngineConfig::default());
    }

    #[test]
    fn test_config_file_with_engine_section() {
        let path = temp_file(
            r#"{"environment": "production", "engine": {"max_concurrent_executions": 2}}"#,
        );
        let config = CliConfig::load(Some(&path)).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert!(config.app.is_production());
        assert_eq!(config.engine.max_concurrent_executions, 2);
        assert_eq!(config.engine.retry, EngineConfig::default().retry);
    }

    #[test]
    fn test_config_file_with_invalid_engine_rejected() {
        let path = temp_file(r#"{"engine": {"max_concurrent_executions": 0}}"#);
        let result = CliConfig::load(Some(&path));
        std::fs::remove_file(&path).unwrap();
        assert!(result.is_err());
    }

    #[test]
    fn test_build_request() {
        let path = temp_file(r#"{"revenue": 10.0, "net_income": 1.0, "total_assets": 20.0, "total_liabilities": 5.0}"#);
        let request = build_request(
            "ACME",
            "full",
            Some(&path),
            &["horizon_years=2".to_string()],
            Some(30),
        )
        .unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(request.company_id, "ACME");
        assert_eq!(request.deadline, Some(Duration::from_secs(30)));
        assert!(request.parameters.contains_key(Financials::PARAM));
        assert_eq!(request.parameters.get("horizon_years"), Some(&json!(2)));
    }
}
