//! # Config Loader
//!
//! Pipeline configuration loading.
//!
//! Responsibilities:
//! - Parse TOML/JSON configuration files
//! - Validate configuration legality
//! - Produce a `PipelineConfig`
//!
//! # Example
//!
//! ```no_run
//! use config_loader::ConfigLoader;
//! use std::path::Path;
//!
//! let config = ConfigLoader::load_from_path(Path::new("pipeline.toml")).unwrap();
//! println!("components: {}", config.components.len());
//! ```

mod parser;
mod validator;

pub use contracts::PipelineConfig;
pub use parser::ConfigFormat;
pub use validator::validate;

use contracts::SimError;
use std::path::Path;

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from file path
    ///
    /// Detects format from the file extension (.toml / .json).
    ///
    /// # Errors
    /// - File read failure
    /// - Unsupported format
    /// - Parse failure
    /// - Validation failure
    pub fn load_from_path(path: &Path) -> Result<PipelineConfig, SimError> {
        let format = Self::detect_format(path)?;
        let content = std::fs::read_to_string(path)?;
        Self::load_from_str(&content, format)
    }

    /// Load configuration from string
    pub fn load_from_str(content: &str, format: ConfigFormat) -> Result<PipelineConfig, SimError> {
        let config = parser::parse(content, format)?;
        validator::validate(&config)?;
        Ok(config)
    }

    pub fn to_toml(config: &PipelineConfig) -> Result<String, SimError> {
        toml::to_string_pretty(config)
            .map_err(|e| SimError::config_parse(format!("TOML serialize error: {e}")))
    }

    pub fn to_json(config: &PipelineConfig) -> Result<String, SimError> {
        serde_json::to_string_pretty(config)
            .map_err(|e| SimError::config_parse(format!("JSON serialize error: {e}")))
    }

    fn detect_format(path: &Path) -> Result<ConfigFormat, SimError> {
        let ext = path.extension().and_then(|e| e.to_str()).ok_or_else(|| {
            SimError::config_parse("cannot determine file format from extension")
        })?;

        ConfigFormat::from_extension(ext)
            .ok_or_else(|| SimError::config_parse(format!("unsupported config format: .{ext}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PIPELINE_TOML: &str = r#"
[simulation]
run_id = "demo"

[interpolation]
tolerance_us = 10000

[checkpoint]
interval_us = 500000

[[channels]]
id = "speed"
kind = "scalar"

[[components]]
id = "smooth"
module = "moving_average"
frequency_hz = 10.0
inputs = ["speed"]
parallel_group = "front"
failure_policy = "continue"

[[components]]
id = "count"
module = "counter"
depends_on = ["smooth"]
failure_policy = "fail_fast"
retry = { max_attempts = 3, backoff_ms = 5 }

[[sinks]]
name = "log"
sink_type = "log"
"#;

    #[test]
    fn test_load_from_str_toml() {
        let config = ConfigLoader::load_from_str(PIPELINE_TOML, ConfigFormat::Toml).unwrap();
        assert_eq!(config.simulation.run_id, "demo");
        assert_eq!(config.interpolation.tolerance_us, 10_000);
        assert_eq!(config.components[1].retry.max_attempts, 3);
        assert_eq!(config.components[0].parallel_group.as_deref(), Some("front"));
    }

    #[test]
    fn test_round_trip_toml_and_json() {
        let config = ConfigLoader::load_from_str(PIPELINE_TOML, ConfigFormat::Toml).unwrap();
        let toml = ConfigLoader::to_toml(&config).unwrap();
        let again = ConfigLoader::load_from_str(&toml, ConfigFormat::Toml).unwrap();
        assert_eq!(again.components.len(), 2);

        let json = ConfigLoader::to_json(&config).unwrap();
        let again = ConfigLoader::load_from_str(&json, ConfigFormat::Json).unwrap();
        assert_eq!(again.checkpoint.interval_us, 500_000);
    }

    #[test]
    fn test_validation_runs_after_parse() {
        let content = PIPELINE_TOML.replace("id = \"count\"", "id = \"smooth\"");
        let err = ConfigLoader::load_from_str(&content, ConfigFormat::Toml).unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn test_load_from_path_detects_format() {
        let err = ConfigLoader::load_from_path(Path::new("pipeline.yaml")).unwrap_err();
        assert!(err.to_string().contains("unsupported"));
    }
}
