//! `validate` command implementation.

use anyhow::{Context, Result};
use contracts::{CaptureTriggerMode, ScenarioBlueprint};
use serde::Serialize;
use tracing::info;

use crate::cli::ValidateArgs;

/// Validation result for JSON output
#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warnings: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ConfigSummary>,
}

#[derive(Serialize)]
struct ConfigSummary {
    version: String,
    ego_count: usize,
    sensor_count: usize,
    annotation_count: usize,
    metric_count: usize,
    endpoint_count: usize,
    total_ticks: u64,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "Validating configuration");

    let result = validate_config(args);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{}", json);
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("Configuration validation failed")
    }
}

fn validate_config(args: &ValidateArgs) -> ValidationResult {
    let config_path = args.config.display().to_string();

    if !args.config.exists() {
        return ValidationResult {
            valid: false,
            config_path,
            error: Some(format!("File not found: {}", args.config.display())),
            warnings: None,
            summary: None,
        };
    }

    match config_loader::ConfigLoader::load_from_path(&args.config) {
        Ok(blueprint) => {
            let warnings = collect_warnings(&blueprint);
            ValidationResult {
                valid: true,
                config_path,
                error: None,
                warnings: if warnings.is_empty() {
                    None
                } else {
                    Some(warnings)
                },
                summary: Some(ConfigSummary {
                    version: format!("{:?}", blueprint.version),
                    ego_count: blueprint.egos.len(),
                    sensor_count: blueprint.all_sensors().count(),
                    annotation_count: blueprint.annotations.len(),
                    metric_count: blueprint.metrics.len(),
                    endpoint_count: blueprint.endpoints.len(),
                    total_ticks: blueprint.total_ticks(),
                }),
            }
        }
        Err(e) => ValidationResult {
            valid: false,
            config_path,
            error: Some(e.to_string()),
            warnings: None,
            summary: None,
        },
    }
}

/// Collect configuration warnings (non-fatal issues)
fn collect_warnings(blueprint: &ScenarioBlueprint) -> Vec<String> {
    let mut warnings = Vec::new();

    if blueprint.endpoints.is_empty() {
        warnings.push("No endpoints configured - captures will be dropped".to_string());
    }

    for ego in &blueprint.egos {
        if ego.sensors.is_empty() {
            warnings.push(format!("Ego '{}' has no sensors configured", ego.description));
        }
    }

    for sensor in blueprint.all_sensors() {
        if !sensor.enabled {
            warnings.push(format!("Sensor '{}' starts disabled", sensor.id));
        }
        if sensor.trigger_mode == CaptureTriggerMode::Manual {
            warnings.push(format!(
                "Sensor '{}' is manually triggered - no producer requests captures for it",
                sensor.id
            ));
        }
        if sensor.output.is_none() && sensor.labelers.is_empty() {
            warnings.push(format!(
                "Sensor '{}' has no output or labelers - its captures stay empty",
                sensor.id
            ));
        }
    }

    let used: Vec<&str> = blueprint
        .all_sensors()
        .flat_map(|s| s.labelers.iter().map(|l| l.definition.as_str()))
        .collect();
    for definition in blueprint.annotations.iter().chain(&blueprint.metrics) {
        if !used.contains(&definition.id.as_str()) {
            warnings.push(format!(
                "Definition '{}' is not used by any labeler",
                definition.id
            ));
        }
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Version: {}", summary.version);
            println!("  Egos: {}", summary.ego_count);
            println!("  Sensors: {}", summary.sensor_count);
            println!(
                "  Definitions: {} annotations, {} metrics",
                summary.annotation_count, summary.metric_count
            );
            println!("  Endpoints: {}", summary.endpoint_count);
            println!("  Total ticks: {}", summary.total_ticks);
        }

        if let Some(ref warnings) = result.warnings {
            println!("\n⚠ Warnings:");
            for warning in warnings {
                println!("  - {}", warning);
            }
        }
    } else {
        println!("✗ Configuration is invalid: {}", result.config_path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {}", error);
        }
    }
}
