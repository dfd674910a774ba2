//! Endpoint trait - consumer of finalized captures and registered schemas
//!
//! The controller calls an `Endpoint` synchronously from its own thread.
//! Implementations that need async IO forward [`EndpointEvent`]s elsewhere.

use dyn_clone::DynClone;
use serde::{Deserialize, Serialize};

use crate::{
    AnnotationDefinition, Capture, ContractError, MetricDefinition, SensorDefinition,
    SimulationMetadata,
};

/// Consumer of simulation output
///
/// Call order within one run:
/// `simulation_started`, registrations and `frame_generated` interleaved in
/// the order they happen, then `simulation_completed`.
///
/// Cloning (via `dyn_clone::clone_box`) yields the fresh instance used by
/// the next run.
pub trait Endpoint: DynClone + Send {
    /// Human readable name (used for logging/metrics)
    fn name(&self) -> &str;

    /// Sanity check before a run is accepted (e.g. output path writable)
    fn validate(&self) -> Result<(), ContractError> {
        Ok(())
    }

    fn simulation_started(&mut self, metadata: &SimulationMetadata) -> Result<(), ContractError>;

    fn sensor_registered(&mut self, sensor: &SensorDefinition) -> Result<(), ContractError>;

    fn annotation_registered(
        &mut self,
        definition: &AnnotationDefinition,
    ) -> Result<(), ContractError>;

    fn metric_registered(&mut self, definition: &MetricDefinition) -> Result<(), ContractError>;

    /// Receives ownership of a capture whose obligations are all resolved
    fn frame_generated(&mut self, capture: Capture) -> Result<(), ContractError>;

    fn simulation_completed(&mut self, metadata: &SimulationMetadata)
        -> Result<(), ContractError>;
}

dyn_clone::clone_trait_object!(Endpoint);

/// Endpoint callbacks reified as values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EndpointEvent {
    SimulationStarted { metadata: SimulationMetadata },
    SensorRegistered { sensor: SensorDefinition },
    AnnotationRegistered { definition: AnnotationDefinition },
    MetricRegistered { definition: MetricDefinition },
    FrameGenerated { capture: Capture },
    SimulationCompleted { metadata: SimulationMetadata },
}

impl EndpointEvent {
    /// Short name of the callback, for logs and metric labels
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SimulationStarted { .. } => "simulation_started",
            Self::SensorRegistered { .. } => "sensor_registered",
            Self::AnnotationRegistered { .. } => "annotation_registered",
            Self::MetricRegistered { .. } => "metric_registered",
            Self::FrameGenerated { .. } => "frame_generated",
            Self::SimulationCompleted { .. } => "simulation_completed",
        }
    }

    pub fn capture(&self) -> Option<&Capture> {
        match self {
            Self::FrameGenerated { capture } => Some(capture),
            _ => None,
        }
    }
}
