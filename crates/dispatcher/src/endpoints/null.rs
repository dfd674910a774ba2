//! NullEndpoint - discards everything

use contracts::{
    AnnotationDefinition, Capture, ContractError, Endpoint, MetricDefinition, SensorDefinition,
    SimulationMetadata,
};

/// Endpoint that accepts and drops every event (dry runs, benchmarks)
#[derive(Debug, Clone, Default)]
pub struct NullEndpoint;

impl Endpoint for NullEndpoint {
    fn name(&self) -> &str {
        "null"
    }

    fn simulation_started(&mut self, _metadata: &SimulationMetadata) -> Result<(), ContractError> {
        Ok(())
    }

    fn sensor_registered(&mut self, _sensor: &SensorDefinition) -> Result<(), ContractError> {
        Ok(())
    }

    fn annotation_registered(
        &mut self,
        _definition: &AnnotationDefinition,
    ) -> Result<(), ContractError> {
        Ok(())
    }

    fn metric_registered(&mut self, _definition: &MetricDefinition) -> Result<(), ContractError> {
        Ok(())
    }

    fn frame_generated(&mut self, _capture: Capture) -> Result<(), ContractError> {
        Ok(())
    }

    fn simulation_completed(
        &mut self,
        _metadata: &SimulationMetadata,
    ) -> Result<(), ContractError> {
        Ok(())
    }
}
