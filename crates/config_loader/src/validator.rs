//! Configuration validation
//!
//! Rules:
//! - component ids unique and non-empty
//! - dependencies reference declared components, never themselves
//! - frequency_hz finite and >= 0, timeout_ms > 0, retry attempts >= 1
//! - inputs reference declared channels (when channels are declared)
//! - clock, interpolation and checkpoint values in range
//! - sink names unique
//!
//! Cycles are detected when the component graph is built.

use std::collections::HashSet;

use contracts::{PipelineConfig, SimError};

/// Validate a PipelineConfig
///
/// Returns the first error encountered, or Ok(()).
pub fn validate(config: &PipelineConfig) -> Result<(), SimError> {
    validate_component_ids(config)?;
    validate_dependencies(config)?;
    validate_component_budgets(config)?;
    validate_channels(config)?;
    validate_simulation(config)?;
    validate_interpolation(config)?;
    validate_checkpoint(config)?;
    validate_sinks(config)?;
    Ok(())
}

fn validate_component_ids(config: &PipelineConfig) -> Result<(), SimError> {
    if config.components.is_empty() {
        return Err(SimError::config_validation(
            "components",
            "at least one component is required",
        ));
    }

    let mut seen = HashSet::new();
    for (i, component) in config.components.iter().enumerate() {
        if component.id.trim().is_empty() {
            return Err(SimError::config_validation(
                format!("components[{i}].id"),
                "component id must not be empty",
            ));
        }
        if !seen.insert(component.id.as_str()) {
            return Err(SimError::config_validation(
                format!("components[id={}]", component.id),
                "duplicate component id",
            ));
        }
        if component.module.trim().is_empty() {
            return Err(SimError::config_validation(
                format!("components[{}].module", component.id),
                "module must not be empty",
            ));
        }
    }
    Ok(())
}

fn validate_dependencies(config: &PipelineConfig) -> Result<(), SimError> {
    let ids: HashSet<&str> = config.components.iter().map(|c| c.id.as_str()).collect();
    for component in &config.components {
        for dep in &component.depends_on {
            if dep == &component.id {
                return Err(SimError::config_validation(
                    format!("components[{}].depends_on", component.id),
                    "component cannot depend on itself",
                ));
            }
            if !ids.contains(dep.as_str()) {
                return Err(SimError::config_validation(
                    format!("components[{}].depends_on", component.id),
                    format!("unknown component '{dep}'"),
                ));
            }
        }
    }
    Ok(())
}

fn validate_component_budgets(config: &PipelineConfig) -> Result<(), SimError> {
    for component in &config.components {
        let f = component.frequency_hz;
        if !f.is_finite() || f < 0.0 {
            return Err(SimError::config_validation(
                format!("components[{}].frequency_hz", component.id),
                format!("frequency_hz must be finite and >= 0, got {f}"),
            ));
        }
        if component.timeout_ms == 0 {
            return Err(SimError::config_validation(
                format!("components[{}].timeout_ms", component.id),
                "timeout_ms must be > 0",
            ));
        }
        if component.retry.max_attempts == 0 {
            return Err(SimError::config_validation(
                format!("components[{}].retry.max_attempts", component.id),
                "max_attempts must be >= 1",
            ));
        }
    }
    Ok(())
}

fn validate_channels(config: &PipelineConfig) -> Result<(), SimError> {
    let mut declared = HashSet::new();
    for channel in &config.channels {
        if !declared.insert(channel.id.as_str()) {
            return Err(SimError::config_validation(
                format!("channels[id={}]", channel.id),
                "duplicate channel id",
            ));
        }
        if let Some(gap) = channel.max_gap_us {
            if gap <= 0 {
                return Err(SimError::config_validation(
                    format!("channels[{}].max_gap_us", channel.id),
                    "max_gap_us must be > 0",
                ));
            }
        }
    }

    if declared.is_empty() {
        return Ok(());
    }

    for component in &config.components {
        for input in &component.inputs {
            if !declared.contains(input.as_str()) {
                return Err(SimError::config_validation(
                    format!("components[{}].inputs", component.id),
                    format!("undeclared channel '{input}'"),
                ));
            }
        }
    }
    Ok(())
}

fn validate_simulation(config: &PipelineConfig) -> Result<(), SimError> {
    let sim = &config.simulation;

    if sim.run_id.trim().is_empty() {
        return Err(SimError::config_validation(
            "simulation.run_id",
            "run_id must not be empty",
        ));
    }
    if sim.base_tick_us <= 0 {
        return Err(SimError::config_validation(
            "simulation.base_tick_us",
            format!("base_tick_us must be > 0, got {}", sim.base_tick_us),
        ));
    }
    if !sim.speed_ceiling.is_finite() || sim.speed_ceiling <= 0.0 {
        return Err(SimError::config_validation(
            "simulation.speed_ceiling",
            format!("speed_ceiling must be > 0, got {}", sim.speed_ceiling),
        ));
    }
    if !(0.0..=sim.speed_ceiling).contains(&sim.initial_speed) {
        return Err(SimError::config_validation(
            "simulation.initial_speed",
            format!(
                "initial_speed must be within [0, {}], got {}",
                sim.speed_ceiling, sim.initial_speed
            ),
        ));
    }
    if sim.failure_escalation_threshold == 0 {
        return Err(SimError::config_validation(
            "simulation.failure_escalation_threshold",
            "threshold must be >= 1",
        ));
    }
    if let (Some(start), Some(end)) = (sim.range_start_us, sim.range_end_us) {
        if start > end {
            return Err(SimError::config_validation(
                "simulation.range_start_us",
                format!("range_start_us ({start}) > range_end_us ({end})"),
            ));
        }
    }
    Ok(())
}

fn validate_interpolation(config: &PipelineConfig) -> Result<(), SimError> {
    let interp = &config.interpolation;

    if interp.tolerance_us < 0 {
        return Err(SimError::config_validation(
            "interpolation.tolerance_us",
            "tolerance_us must be >= 0",
        ));
    }
    if interp.max_gap_us <= 0 {
        return Err(SimError::config_validation(
            "interpolation.max_gap_us",
            "max_gap_us must be > 0",
        ));
    }
    if interp.stale_horizon_us < 0 || interp.lookahead_us < 0 {
        return Err(SimError::config_validation(
            "interpolation",
            "stale_horizon_us and lookahead_us must be >= 0",
        ));
    }
    if let Some(q) = interp.min_quality {
        if !(0.0..=1.0).contains(&q) {
            return Err(SimError::config_validation(
                "interpolation.min_quality",
                format!("min_quality must be within [0, 1], got {q}"),
            ));
        }
    }
    Ok(())
}

fn validate_checkpoint(config: &PipelineConfig) -> Result<(), SimError> {
    let ckpt = &config.checkpoint;

    if ckpt.interval_us <= 0 {
        return Err(SimError::config_validation(
            "checkpoint.interval_us",
            format!("interval_us must be > 0, got {}", ckpt.interval_us),
        ));
    }
    if ckpt.retention_us < ckpt.interval_us {
        return Err(SimError::config_validation(
            "checkpoint.retention_us",
            format!(
                "retention_us ({}) must be >= interval_us ({})",
                ckpt.retention_us, ckpt.interval_us
            ),
        ));
    }
    if ckpt.max_checkpoints < 2 {
        return Err(SimError::config_validation(
            "checkpoint.max_checkpoints",
            "max_checkpoints must be >= 2",
        ));
    }
    Ok(())
}

fn validate_sinks(config: &PipelineConfig) -> Result<(), SimError> {
    let mut seen = HashSet::new();
    for sink in &config.sinks {
        if sink.name.trim().is_empty() {
            return Err(SimError::config_validation(
                "sinks[].name",
                "sink name must not be empty",
            ));
        }
        if !seen.insert(&sink.name) {
            return Err(SimError::config_validation(
                format!("sinks[name={}]", sink.name),
                "duplicate sink name",
            ));
        }
        if sink.queue_capacity == 0 {
            return Err(SimError::config_validation(
                format!("sinks[{}].queue_capacity", sink.name),
                "queue_capacity must be > 0",
            ));
        }
    }
    Ok(())
}
