//! `info` command implementation.

use anyhow::{Context, Result};
use contracts::PayloadKind;
use sandbox::ModuleRegistry;
use serde::Serialize;

use crate::cli::InfoArgs;

#[derive(Serialize)]
struct EngineInfo {
    version: &'static str,
    payload_kinds: Vec<PayloadKindInfo>,
    modules: Vec<String>,
    sink_types: Vec<&'static str>,
}

#[derive(Serialize)]
struct PayloadKindInfo {
    kind: String,
    /// Linear interpolation between samples; otherwise nearest sample
    interpolable: bool,
}

fn engine_info() -> EngineInfo {
    EngineInfo {
        version: env!("CARGO_PKG_VERSION"),
        payload_kinds: PayloadKind::ALL
            .iter()
            .map(|kind| PayloadKindInfo {
                kind: kind.to_string(),
                interpolable: kind.is_interpolable(),
            })
            .collect(),
        modules: ModuleRegistry::with_builtins()
            .modules()
            .into_iter()
            .map(str::to_string)
            .collect(),
        sink_types: vec!["log", "file"],
    }
}

pub fn run_info(args: &InfoArgs) -> Result<()> {
    let info = engine_info();

    if args.json {
        let json =
            serde_json::to_string_pretty(&info).context("failed to serialize engine info")?;
        println!("{json}");
        return Ok(());
    }

    println!("replay-sim {}", info.version);
    println!("\nPayload kinds:");
    for kind in &info.payload_kinds {
        let mode = if kind.interpolable { "linear" } else { "nearest" };
        println!("  - {:<12} {mode}", kind.kind);
    }
    println!("\nBuiltin modules:");
    for module in &info.modules {
        println!("  - {module}");
    }
    println!("\nSink types: {}", info.sink_types.join(", "));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_info_lists_builtins() {
        let info = engine_info();
        assert_eq!(info.payload_kinds.len(), PayloadKind::ALL.len());
        assert!(info.modules.iter().any(|m| m == "moving_average"));
        let scalar = info.payload_kinds.iter().find(|k| k.kind == "scalar").unwrap();
        assert!(scalar.interpolable);
    }
}
