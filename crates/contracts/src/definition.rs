//! Sensor / annotation / metric definitions
//!
//! Definitions are the schemas forwarded to the endpoint once per run;
//! captures only reference them by id.

use serde::{Deserialize, Serialize};

use crate::{DefinitionId, EgoId, SensorId};

/// How a sensor decides to capture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureTriggerMode {
    /// Captures on the `first_capture_time + k * period` grid
    #[default]
    Scheduled,
    /// Captures only when explicitly requested
    Manual,
}

/// Registration request for a sensor
///
/// The final id is assigned at registration: `id` (or `modality` when
/// unset) is reserved in the run's shared id namespace and may come back
/// with a `_N` suffix.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorSpec {
    pub id: Option<String>,
    pub modality: String,
    pub description: String,
    pub period: f64,
    pub first_capture_time: f64,
    pub frames_between_captures: u32,
    pub trigger_mode: CaptureTriggerMode,
    pub manual_affects_timing: bool,
}

impl SensorSpec {
    /// Sensor capturing every `period` simulated seconds starting at t = 0
    pub fn scheduled(modality: impl Into<String>, period: f64) -> Self {
        Self {
            id: None,
            modality: modality.into(),
            description: String::new(),
            period,
            first_capture_time: 0.0,
            frames_between_captures: 0,
            trigger_mode: CaptureTriggerMode::Scheduled,
            manual_affects_timing: false,
        }
    }

    /// Sensor that only captures on request
    pub fn manual(modality: impl Into<String>) -> Self {
        Self {
            trigger_mode: CaptureTriggerMode::Manual,
            ..Self::scheduled(modality, 0.0)
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_first_capture_time(mut self, first_capture_time: f64) -> Self {
        self.first_capture_time = first_capture_time;
        self
    }

    pub fn with_frames_between_captures(mut self, frames: u32) -> Self {
        self.frames_between_captures = frames;
        self
    }

    /// Let a manual sensor's render period drive tick durations
    pub fn affecting_timing(mut self, period: f64) -> Self {
        self.period = period;
        self.manual_affects_timing = true;
        self
    }

    /// Id requested before collision handling
    pub fn requested_id(&self) -> &str {
        self.id.as_deref().unwrap_or(&self.modality)
    }
}

/// A registered sensor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorDefinition {
    pub id: SensorId,
    pub ego_id: EgoId,
    pub modality: String,
    pub description: String,
    pub period: f64,
    pub first_capture_time: f64,
    pub frames_between_captures: u32,
    pub trigger_mode: CaptureTriggerMode,
    pub manual_affects_timing: bool,
}

impl SensorDefinition {
    /// Build the definition for `spec` under its resolved id
    pub fn from_spec(id: SensorId, ego_id: EgoId, spec: SensorSpec) -> Self {
        Self {
            id,
            ego_id,
            modality: spec.modality,
            description: spec.description,
            period: spec.period,
            first_capture_time: spec.first_capture_time,
            frames_between_captures: spec.frames_between_captures,
            trigger_mode: spec.trigger_mode,
            manual_affects_timing: spec.manual_affects_timing,
        }
    }

    /// Whether render slots of this sensor constrain tick durations
    pub fn drives_timing(&self) -> bool {
        match self.trigger_mode {
            CaptureTriggerMode::Scheduled => true,
            CaptureTriggerMode::Manual => self.manual_affects_timing && self.period > 0.0,
        }
    }
}

/// Schema of an annotation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationDefinition {
    pub id: DefinitionId,
    pub description: String,
    /// Free-form type tag, e.g. "bounding box", "semantic segmentation"
    pub annotation_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec: Option<serde_json::Value>,
}

impl AnnotationDefinition {
    pub fn new(id: impl Into<DefinitionId>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            annotation_type: String::new(),
            spec: None,
        }
    }

    pub fn with_type(mut self, annotation_type: impl Into<String>) -> Self {
        self.annotation_type = annotation_type.into();
        self
    }

    pub fn with_spec(mut self, spec: serde_json::Value) -> Self {
        self.spec = Some(spec);
        self
    }
}

/// Schema of a metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricDefinition {
    pub id: DefinitionId,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec: Option<serde_json::Value>,
}

impl MetricDefinition {
    pub fn new(id: impl Into<DefinitionId>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            spec: None,
        }
    }

    pub fn with_spec(mut self, spec: serde_json::Value) -> Self {
        self.spec = Some(spec);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requested_id_falls_back_to_modality() {
        let spec = SensorSpec::scheduled("camera", 0.5);
        assert_eq!(spec.requested_id(), "camera");
        assert_eq!(spec.with_id("front").requested_id(), "front");
    }

    #[test]
    fn test_manual_sensor_timing() {
        let manual = SensorDefinition::from_spec(
            "m".into(),
            "ego".into(),
            SensorSpec::manual("camera"),
        );
        assert!(!manual.drives_timing());

        let timed = SensorDefinition::from_spec(
            "m".into(),
            "ego".into(),
            SensorSpec::manual("camera").affecting_timing(5.0),
        );
        assert!(timed.drives_timing());
    }
}
