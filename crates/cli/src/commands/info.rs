//! `info` command implementation.

use std::collections::HashMap;

use anyhow::{Context, Result};
use contracts::{ReportMode, ScenarioBlueprint, SensorConfig};
use serde::Serialize;
use tracing::info;

use crate::cli::InfoArgs;

/// Configuration info for JSON output
#[derive(Serialize)]
struct ConfigInfo {
    version: String,
    simulation: SimulationInfo,
    egos: Vec<EgoInfo>,
    annotations: Vec<String>,
    metrics: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    endpoints: Vec<EndpointInfo>,
}

#[derive(Serialize)]
struct SimulationInfo {
    time_scale: f64,
    idle_delta_time: f64,
    ticks_per_sequence: u64,
    sequences: u32,
}

#[derive(Serialize)]
struct EgoInfo {
    description: String,
    sensor_count: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    sensors: Vec<SensorInfo>,
}

#[derive(Serialize)]
struct SensorInfo {
    id: String,
    modality: String,
    trigger_mode: String,
    period: f64,
    first_capture_time: f64,
    frames_between_captures: u32,
    enabled: bool,
    output: String,
    labelers: Vec<String>,
}

#[derive(Serialize)]
struct EndpointInfo {
    name: String,
    endpoint_type: String,
    queue_capacity: usize,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    params: HashMap<String, String>,
}

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration info");

    if !args.config.exists() {
        anyhow::bail!("Configuration file not found: {}", args.config.display());
    }

    let blueprint = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    if args.json {
        let info = build_config_info(&blueprint, args);
        let json =
            serde_json::to_string_pretty(&info).context("Failed to serialize config info")?;
        println!("{}", json);
    } else {
        print_config_info(&blueprint, args);
    }

    Ok(())
}

fn describe_output(output: Option<ReportMode>) -> String {
    match output {
        None => "none".to_string(),
        Some(ReportMode::Immediate) => "immediate".to_string(),
        Some(ReportMode::Readback { latency_ms }) => format!("readback ({latency_ms} ms)"),
    }
}

fn describe_cadence(sensor: &SensorConfig) -> String {
    if sensor.frames_between_captures > 0 {
        format!(
            "{:?}, every {} frames at {}s",
            sensor.trigger_mode,
            sensor.frames_between_captures + 1,
            sensor.period
        )
    } else {
        format!("{:?}, {}s", sensor.trigger_mode, sensor.period)
    }
}

fn sensor_info(sensor: &SensorConfig) -> SensorInfo {
    SensorInfo {
        id: sensor.id.clone(),
        modality: sensor.modality.clone(),
        trigger_mode: format!("{:?}", sensor.trigger_mode),
        period: sensor.period,
        first_capture_time: sensor.first_capture_time,
        frames_between_captures: sensor.frames_between_captures,
        enabled: sensor.enabled,
        output: describe_output(sensor.output),
        labelers: sensor
            .labelers
            .iter()
            .map(|l| format!("{:?}:{}", l.kind, l.definition))
            .collect(),
    }
}

fn build_config_info(blueprint: &ScenarioBlueprint, args: &InfoArgs) -> ConfigInfo {
    let egos = blueprint
        .egos
        .iter()
        .map(|ego| EgoInfo {
            description: ego.description.clone(),
            sensor_count: ego.sensors.len(),
            sensors: if args.sensors {
                ego.sensors.iter().map(sensor_info).collect()
            } else {
                Vec::new()
            },
        })
        .collect();

    let endpoints = if args.endpoints {
        blueprint
            .endpoints
            .iter()
            .map(|e| EndpointInfo {
                name: e.name.clone(),
                endpoint_type: format!("{:?}", e.endpoint_type),
                queue_capacity: e.queue_capacity,
                params: e.params.clone(),
            })
            .collect()
    } else {
        Vec::new()
    };

    let simulation = &blueprint.simulation;
    ConfigInfo {
        version: format!("{:?}", blueprint.version),
        simulation: SimulationInfo {
            time_scale: simulation.time_scale,
            idle_delta_time: simulation.idle_delta_time,
            ticks_per_sequence: simulation.ticks_per_sequence,
            sequences: simulation.sequences,
        },
        egos,
        annotations: blueprint.annotations.iter().map(|d| d.id.clone()).collect(),
        metrics: blueprint.metrics.iter().map(|d| d.id.clone()).collect(),
        endpoints,
    }
}

fn print_config_info(blueprint: &ScenarioBlueprint, args: &InfoArgs) {
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║               Perception Sim Scenario                        ║");
    println!("╚══════════════════════════════════════════════════════════════╝\n");

    let simulation = &blueprint.simulation;
    println!("⏱  Simulation");
    println!("   ├─ Version: {:?}", blueprint.version);
    println!("   ├─ Time scale: {}", simulation.time_scale);
    println!("   ├─ Idle delta time: {}s", simulation.idle_delta_time);
    println!(
        "   └─ Ticks: {} x {} sequences",
        simulation.ticks_per_sequence, simulation.sequences
    );

    println!("\n🚗 Egos ({})", blueprint.egos.len());
    for (i, ego) in blueprint.egos.iter().enumerate() {
        let is_last = i == blueprint.egos.len() - 1;
        let prefix = if is_last { "└─" } else { "├─" };
        let child_prefix = if is_last { "   " } else { "│  " };

        println!("   {} {}", prefix, ego.description);

        if args.sensors && !ego.sensors.is_empty() {
            println!("   {}  📷 Sensors ({}):", child_prefix, ego.sensors.len());
            for (j, sensor) in ego.sensors.iter().enumerate() {
                let sensor_prefix = if j == ego.sensors.len() - 1 {
                    "└─"
                } else {
                    "├─"
                };
                let state = if sensor.enabled { "" } else { " [disabled]" };
                println!(
                    "   {}     {} {} ({}, {}, output: {}){}",
                    child_prefix,
                    sensor_prefix,
                    sensor.id,
                    sensor.modality,
                    describe_cadence(sensor),
                    describe_output(sensor.output),
                    state
                );
            }
        } else {
            println!("   {}  └─ {} sensors", child_prefix, ego.sensors.len());
        }
    }

    println!("\n🏷  Definitions");
    println!("   ├─ Annotations: {}", join_ids(blueprint.annotations.iter().map(|d| d.id.as_str())));
    println!("   └─ Metrics: {}", join_ids(blueprint.metrics.iter().map(|d| d.id.as_str())));

    if !blueprint.endpoints.is_empty() {
        println!("\n📤 Endpoints ({})", blueprint.endpoints.len());
        for (i, endpoint) in blueprint.endpoints.iter().enumerate() {
            let prefix = if i == blueprint.endpoints.len() - 1 {
                "└─"
            } else {
                "├─"
            };
            if args.endpoints {
                println!(
                    "   {} {} ({:?}, queue {}) {:?}",
                    prefix,
                    endpoint.name,
                    endpoint.endpoint_type,
                    endpoint.queue_capacity,
                    endpoint.params
                );
            } else {
                println!("   {} {} ({:?})", prefix, endpoint.name, endpoint.endpoint_type);
            }
        }
    }

    println!();
}

fn join_ids<'a>(ids: impl Iterator<Item = &'a str>) -> String {
    let ids: Vec<_> = ids.collect();
    if ids.is_empty() {
        "(none)".to_string()
    } else {
        ids.join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(sensors: bool, endpoints: bool) -> InfoArgs {
        InfoArgs {
            config: "scenario.toml".into(),
            json: true,
            sensors,
            endpoints,
        }
    }

    fn blueprint() -> ScenarioBlueprint {
        config_loader::ConfigLoader::load_from_str(
            r#"
            [[annotations]]
            id = "boxes"

            [[egos]]
            description = "rig"

            [[egos.sensors]]
            id = "camera"
            modality = "camera"
            period = 0.1
            output = { mode = "readback", latency_ms = 20 }

            [[egos.sensors.labelers]]
            definition = "boxes"
            kind = "annotation"

            [[endpoints]]
            name = "log"
            endpoint_type = "log"
            "#,
            config_loader::ConfigFormat::Toml,
        )
        .unwrap()
    }

    #[test]
    fn test_info_hides_details_by_default() {
        let info = build_config_info(&blueprint(), &args(false, false));
        assert_eq!(info.egos[0].sensor_count, 1);
        assert!(info.egos[0].sensors.is_empty());
        assert!(info.endpoints.is_empty());
        assert_eq!(info.annotations, vec!["boxes"]);
    }

    #[test]
    fn test_info_sensor_details() {
        let info = build_config_info(&blueprint(), &args(true, true));
        let sensor = &info.egos[0].sensors[0];
        assert_eq!(sensor.output, "readback (20 ms)");
        assert_eq!(sensor.labelers, vec!["Annotation:boxes"]);
        assert_eq!(info.endpoints[0].name, "log");
        assert_eq!(info.endpoints[0].queue_capacity, 100);
    }
}
