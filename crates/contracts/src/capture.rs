//! Capture - one sensor's logical frame
//!
//! Built up by producers while open, handed to the endpoint once every
//! pending slot has been reported.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{DefinitionId, EgoId, Payload, RunId, SensorId};

/// Stable identity of a capture within a run
///
/// Monotonically increasing and never reused, unlike `(sequence, step)`
/// which repeats across sequence restarts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CaptureId(u64);

impl CaptureId {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for CaptureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identity of an annotation within a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AnnotationId(u64);

impl AnnotationId {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(self) -> u64 {
        self.0
    }
}

/// A finalized (or in-progress) capture
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Capture {
    pub id: CaptureId,
    /// Increments on each sequence restart
    pub sequence: u64,
    /// Shared by every capture opened in the same tick
    pub step: u64,
    /// Scaled simulated seconds since the sequence began
    pub timestamp: f64,
    /// `None` for the per-tick capture holding global metrics
    pub sensor_id: Option<SensorId>,
    pub ego_id: Option<EgoId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sensor_output: Option<Payload>,
    #[serde(default)]
    pub annotations: Vec<Annotation>,
    #[serde(default)]
    pub metrics: Vec<Metric>,
}

impl Capture {
    /// Empty capture with the given header
    pub fn new(
        id: CaptureId,
        sequence: u64,
        step: u64,
        timestamp: f64,
        sensor_id: Option<SensorId>,
        ego_id: Option<EgoId>,
    ) -> Self {
        Self {
            id,
            sequence,
            step,
            timestamp,
            sensor_id,
            ego_id,
            sensor_output: None,
            annotations: Vec::new(),
            metrics: Vec::new(),
        }
    }

    /// `sensor_id` as a display string (`-` for sensor-less captures)
    pub fn sensor_label(&self) -> &str {
        self.sensor_id.as_deref().unwrap_or("-")
    }
}

/// Annotation attached to a capture
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub id: AnnotationId,
    pub definition_id: DefinitionId,
    pub sensor_id: SensorId,
    pub value: Payload,
}

/// Metric attached to a capture
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub definition_id: DefinitionId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sensor_id: Option<SensorId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotation_id: Option<AnnotationId>,
    pub value: Payload,
}

/// Reference to a reported annotation, used to scope metrics to it
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AnnotationRef {
    pub run: RunId,
    pub capture_id: CaptureId,
    pub annotation_id: AnnotationId,
    pub definition_id: DefinitionId,
    pub sensor_id: SensorId,
}
