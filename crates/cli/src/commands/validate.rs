//! `validate` command implementation.

use std::path::Path;

use anyhow::{Context, Result};
use component_graph::ComponentGraph;
use contracts::{PipelineConfig, SimError};
use serde::Serialize;
use tracing::info;

use crate::cli::ValidateArgs;
use crate::error::CliError;

#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ConfigSummary>,
}

#[derive(Serialize)]
struct ConfigSummary {
    run_id: String,
    base_tick_us: i64,
    components: usize,
    channels: usize,
    sinks: usize,
    /// Component ids per execution stage
    stages: Vec<Vec<String>>,
}

pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "validating configuration");

    let result = validate_config(&args.config);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("failed to serialize validation result")?;
        println!("{json}");
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        Err(CliError::InvalidConfig.into())
    }
}

fn validate_config(path: &Path) -> ValidationResult {
    let config_path = path.display().to_string();
    let invalid = |error: String| ValidationResult {
        valid: false,
        config_path: config_path.clone(),
        error: Some(error),
        warnings: Vec::new(),
        summary: None,
    };

    if !path.exists() {
        return invalid(CliError::config_not_found(config_path.clone()).to_string());
    }

    let checked = config_loader::ConfigLoader::load_from_path(path).and_then(|config| {
        let graph = ComponentGraph::build(&config.components)?;
        Ok::<_, SimError>((config, graph))
    });

    match checked {
        Ok((config, graph)) => ValidationResult {
            valid: true,
            config_path: config_path.clone(),
            error: None,
            warnings: collect_warnings(&config),
            summary: Some(ConfigSummary {
                run_id: config.simulation.run_id.clone(),
                base_tick_us: config.simulation.base_tick_us,
                components: config.components.len(),
                channels: config.channels.len(),
                sinks: config.sinks.len(),
                stages: graph.describe_stages(),
            }),
        },
        Err(e) => invalid(e.to_string()),
    }
}

/// Non-fatal issues
fn collect_warnings(config: &PipelineConfig) -> Vec<String> {
    let mut warnings = Vec::new();

    if config.sinks.is_empty() {
        warnings.push("no sinks configured - frames are only summarized".to_string());
    }
    if config.components.is_empty() {
        warnings.push("no components configured - frames will be empty".to_string());
    }
    for component in &config.components {
        if component.inputs.is_empty() && component.depends_on.is_empty() {
            warnings.push(format!(
                "component '{}' has no inputs and no dependencies",
                component.id
            ));
        }
    }
    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if !result.valid {
        println!("✗ Configuration is invalid: {}", result.config_path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {error}");
        }
        return;
    }

    println!("✓ Configuration is valid: {}", result.config_path);
    if let Some(ref summary) = result.summary {
        println!("\n  Run id: {}", summary.run_id);
        println!("  Base tick: {} us", summary.base_tick_us);
        println!("  Components: {}", summary.components);
        println!("  Channels: {}", summary.channels);
        println!("  Sinks: {}", summary.sinks);
        println!("  Stages:");
        for (i, stage) in summary.stages.iter().enumerate() {
            println!("    {i}: {}", stage.join(", "));
        }
    }
    if !result.warnings.is_empty() {
        println!("\n⚠ Warnings:");
        for warning in &result.warnings {
            println!("  - {warning}");
        }
    }
}
