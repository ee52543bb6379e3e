//! Configuration parsing
//!
//! TOML (primary) and JSON formats.

use contracts::{PipelineConfig, SimError};

/// Configuration file format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Toml,
    Json,
}

impl ConfigFormat {
    /// Infer format from a file extension
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "toml" => Some(Self::Toml),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

pub fn parse_toml(content: &str) -> Result<PipelineConfig, SimError> {
    toml::from_str(content).map_err(|e| SimError::ConfigParse {
        message: format!("TOML parse error: {e}"),
        source: Some(Box::new(e)),
    })
}

pub fn parse_json(content: &str) -> Result<PipelineConfig, SimError> {
    serde_json::from_str(content).map_err(|e| SimError::ConfigParse {
        message: format!("JSON parse error: {e}"),
        source: Some(Box::new(e)),
    })
}

pub fn parse(content: &str, format: ConfigFormat) -> Result<PipelineConfig, SimError> {
    match format {
        ConfigFormat::Toml => parse_toml(content),
        ConfigFormat::Json => parse_json(content),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::FailurePolicy;

    #[test]
    fn test_parse_toml_components() {
        let content = r#"
[simulation]
run_id = "drive-01"
base_tick_us = 50000

[[components]]
id = "filter"
module = "moving_average"
frequency_hz = 10.0
inputs = ["speed"]
failure_policy = "continue"
params = { window = "4" }

[[components]]
id = "planner"
module = "passthrough"
depends_on = ["filter"]
failure_policy = "fail_fast"
"#;
        let config = parse_toml(content).unwrap();
        assert_eq!(config.simulation.run_id, "drive-01");
        assert_eq!(config.simulation.base_tick_us, 50_000);
        assert_eq!(config.components.len(), 2);
        assert_eq!(config.components[0].params.get("window").map(String::as_str), Some("4"));
        assert_eq!(config.components[1].failure_policy, FailurePolicy::FailFast);
        assert_eq!(config.components[1].depends_on[0], "filter");
    }

    #[test]
    fn test_parse_json_minimal() {
        let content = r#"{
            "components": [
                { "id": "a", "module": "counter", "failure_policy": "continue" }
            ],
            "sinks": [{ "name": "log", "sink_type": "log" }]
        }"#;
        let config = parse_json(content).unwrap();
        assert_eq!(config.components.len(), 1);
        assert_eq!(config.sinks[0].queue_capacity, 100);
    }

    #[test]
    fn test_parse_missing_failure_policy_is_parse_error() {
        let content = r#"
[[components]]
id = "a"
module = "counter"
"#;
        let err = parse_toml(content).unwrap_err();
        assert!(matches!(err, SimError::ConfigParse { .. }));
        assert!(err.to_string().contains("failure_policy"));
    }

    #[test]
    fn test_parse_toml_syntax_error() {
        let result = parse_toml("invalid toml [[[");
        assert!(matches!(result, Err(SimError::ConfigParse { .. })));
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(ConfigFormat::from_extension("TOML"), Some(ConfigFormat::Toml));
        assert_eq!(ConfigFormat::from_extension("json"), Some(ConfigFormat::Json));
        assert_eq!(ConfigFormat::from_extension("yaml"), None);
    }
}
