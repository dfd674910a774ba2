//! ScenarioBlueprint - Config Loader output
//!
//! Describes a complete capture rig: simulation timing, egos with their
//! sensors and labelers, annotation/metric definitions, and output routing.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use validator::Validate;

use crate::{CaptureTriggerMode, SchedulerConfig, SensorSpec, DEFAULT_COINCIDENCE_TOLERANCE};

/// Config version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConfigVersion {
    #[default]
    V1,
}

/// Complete scenario configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ScenarioBlueprint {
    /// Config version
    #[serde(default)]
    pub version: ConfigVersion,

    /// Timing and run length
    #[serde(default)]
    #[validate(nested)]
    pub simulation: SimulationConfig,

    /// Egos and the sensors mounted on them
    #[validate(length(min = 1, message = "at least one ego is required"), nested)]
    pub egos: Vec<EgoConfig>,

    /// Annotation definitions
    #[serde(default)]
    #[validate(nested)]
    pub annotations: Vec<DefinitionConfig>,

    /// Metric definitions
    #[serde(default)]
    #[validate(nested)]
    pub metrics: Vec<DefinitionConfig>,

    /// Output routing
    #[serde(default)]
    #[validate(nested)]
    pub endpoints: Vec<EndpointConfig>,
}

/// Simulation timing and run length
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SimulationConfig {
    /// Engine time scale
    #[serde(default = "default_time_scale")]
    #[validate(range(exclusive_min = 0.0))]
    pub time_scale: f64,

    /// Tick duration when no sensor constrains timing
    #[serde(default)]
    #[validate(range(min = 0.0))]
    pub idle_delta_time: f64,

    /// Relative tolerance for coinciding render slots
    #[serde(default = "default_coincidence_tolerance")]
    #[validate(range(min = 0.0))]
    pub coincidence_tolerance: f64,

    /// Ticks per sequence
    #[serde(default = "default_ticks_per_sequence")]
    #[validate(range(min = 1))]
    pub ticks_per_sequence: u64,

    /// Number of sequences per run
    #[serde(default = "default_sequences")]
    #[validate(range(min = 1))]
    pub sequences: u32,
}

fn default_time_scale() -> f64 {
    1.0
}

fn default_coincidence_tolerance() -> f64 {
    DEFAULT_COINCIDENCE_TOLERANCE
}

fn default_ticks_per_sequence() -> u64 {
    100
}

fn default_sequences() -> u32 {
    1
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            time_scale: default_time_scale(),
            idle_delta_time: 0.0,
            coincidence_tolerance: default_coincidence_tolerance(),
            ticks_per_sequence: default_ticks_per_sequence(),
            sequences: default_sequences(),
        }
    }
}

/// Ego configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct EgoConfig {
    #[serde(default)]
    pub description: String,

    /// Mounted sensors
    #[serde(default)]
    #[validate(nested)]
    pub sensors: Vec<SensorConfig>,
}

/// Sensor configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SensorConfig {
    /// Requested id (may receive a `_N` suffix on collision)
    #[validate(length(min = 1))]
    pub id: String,

    /// Modality label, e.g. "camera"
    #[validate(length(min = 1))]
    pub modality: String,

    #[serde(default)]
    pub description: String,

    /// Simulated seconds between captures (renders when frames_between_captures > 0)
    #[serde(default)]
    #[validate(range(min = 0.0))]
    pub period: f64,

    /// Simulated seconds of the first capture
    #[serde(default)]
    #[validate(range(min = 0.0))]
    pub first_capture_time: f64,

    /// Renders skipped between two captures
    #[serde(default)]
    pub frames_between_captures: u32,

    #[serde(default)]
    pub trigger_mode: CaptureTriggerMode,

    /// Manual sensors only: let `period` drive tick durations
    #[serde(default)]
    pub manual_affects_timing: bool,

    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// How the sensor output is reported (absent = no output)
    #[serde(default)]
    pub output: Option<ReportMode>,

    /// Annotation/metric producers attached to this sensor
    #[serde(default)]
    #[validate(nested)]
    pub labelers: Vec<LabelerConfig>,
}

fn default_enabled() -> bool {
    true
}

impl SensorConfig {
    /// Registration request for this sensor
    pub fn to_spec(&self) -> SensorSpec {
        SensorSpec {
            id: Some(self.id.clone()),
            modality: self.modality.clone(),
            description: self.description.clone(),
            period: self.period,
            first_capture_time: self.first_capture_time,
            frames_between_captures: self.frames_between_captures,
            trigger_mode: self.trigger_mode,
            manual_affects_timing: self.manual_affects_timing,
        }
    }
}

/// When a report lands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ReportMode {
    /// Reported synchronously in the capture's tick
    #[default]
    Immediate,
    /// Reported later from the readback worker
    Readback {
        #[serde(default)]
        latency_ms: u64,
    },
}

/// Producer attached to a sensor
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct LabelerConfig {
    /// Annotation or metric definition id this labeler reports against
    #[validate(length(min = 1))]
    pub definition: String,

    pub kind: LabelerKind,

    #[serde(default)]
    pub report: ReportMode,
}

/// What a labeler reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelerKind {
    Annotation,
    /// Metric scoped to the sensor's capture
    Metric,
    /// Metric scoped to the tick, not to a sensor
    GlobalMetric,
}

/// Annotation or metric definition
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct DefinitionConfig {
    #[validate(length(min = 1))]
    pub id: String,

    #[serde(default)]
    pub description: String,

    /// Free-form type tag
    #[serde(default, rename = "type")]
    pub kind: String,
}

/// Endpoint output configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct EndpointConfig {
    /// Endpoint name
    #[validate(length(min = 1, message = "endpoint name cannot be empty"))]
    pub name: String,

    /// Endpoint type
    pub endpoint_type: EndpointType,

    /// Queue capacity
    #[serde(default = "default_queue_capacity")]
    #[validate(range(min = 1))]
    pub queue_capacity: usize,

    /// Type-specific parameters
    #[serde(default)]
    pub params: HashMap<String, String>,
}

fn default_queue_capacity() -> usize {
    100
}

/// Endpoint type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointType {
    /// Log output
    Log,
    /// JSON files on disk
    File,
}

impl ScenarioBlueprint {
    /// Build a SchedulerConfig from the simulation section
    pub fn to_scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            time_scale: self.simulation.time_scale,
            idle_delta_time: self.simulation.idle_delta_time,
            coincidence_tolerance: self.simulation.coincidence_tolerance,
        }
    }

    /// Every sensor of every ego, in declaration order
    pub fn all_sensors(&self) -> impl Iterator<Item = &SensorConfig> {
        self.egos.iter().flat_map(|ego| ego.sensors.iter())
    }

    /// Total ticks over all sequences
    pub fn total_ticks(&self) -> u64 {
        self.simulation.ticks_per_sequence * u64::from(self.simulation.sequences)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_sensor(id: &str, period: f64) -> SensorConfig {
        SensorConfig {
            id: id.into(),
            modality: "camera".into(),
            description: String::new(),
            period,
            first_capture_time: 0.0,
            frames_between_captures: 0,
            trigger_mode: CaptureTriggerMode::Scheduled,
            manual_affects_timing: false,
            enabled: true,
            output: Some(ReportMode::Immediate),
            labelers: Vec::new(),
        }
    }

    fn sample_blueprint() -> ScenarioBlueprint {
        ScenarioBlueprint {
            version: ConfigVersion::V1,
            simulation: SimulationConfig {
                time_scale: 2.0,
                ticks_per_sequence: 10,
                sequences: 3,
                ..Default::default()
            },
            egos: vec![EgoConfig {
                description: "rig".into(),
                sensors: vec![sample_sensor("rgb", 0.5), sample_sensor("depth", 1.0)],
            }],
            annotations: Vec::new(),
            metrics: Vec::new(),
            endpoints: Vec::new(),
        }
    }

    #[test]
    fn test_to_scheduler_config() {
        let config = sample_blueprint().to_scheduler_config();
        assert_eq!(config.time_scale, 2.0);
        assert_eq!(config.coincidence_tolerance, DEFAULT_COINCIDENCE_TOLERANCE);
    }

    #[test]
    fn test_all_sensors_and_total_ticks() {
        let bp = sample_blueprint();
        let ids: Vec<_> = bp.all_sensors().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["rgb", "depth"]);
        assert_eq!(bp.total_ticks(), 30);
    }

    #[test]
    fn test_field_validation() {
        let mut bp = sample_blueprint();
        assert!(bp.validate().is_ok());

        bp.simulation.time_scale = 0.0;
        assert!(bp.validate().is_err());
    }

    #[test]
    fn test_report_mode_serde() {
        let mode: ReportMode =
            serde_json::from_str(r#"{ "mode": "readback", "latency_ms": 15 }"#).unwrap();
        assert_eq!(mode, ReportMode::Readback { latency_ms: 15 });

        let mode: ReportMode = serde_json::from_str(r#"{ "mode": "immediate" }"#).unwrap();
        assert_eq!(mode, ReportMode::Immediate);
    }

    #[test]
    fn test_sensor_spec_conversion() {
        let spec = sample_sensor("rgb", 0.5).to_spec();
        assert_eq!(spec.requested_id(), "rgb");
        assert_eq!(spec.period, 0.5);
    }
}
