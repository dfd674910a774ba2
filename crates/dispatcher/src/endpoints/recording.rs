//! RecordingEndpoint - keeps every event in memory

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use contracts::{
    AnnotationDefinition, Capture, ContractError, Endpoint, EndpointEvent, MetricDefinition,
    SensorDefinition, SimulationMetadata,
};

/// Endpoint that records events for later inspection
///
/// Clones share storage, so the copy kept by a test observes every run the
/// controller drives through its own clones.
#[derive(Debug, Clone)]
pub struct RecordingEndpoint {
    name: String,
    events: Arc<Mutex<Vec<EndpointEvent>>>,
    validation_error: Option<String>,
}

impl RecordingEndpoint {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            events: Arc::new(Mutex::new(Vec::new())),
            validation_error: None,
        }
    }

    /// Make `validate` reject every run with `message`
    pub fn failing_validation(mut self, message: impl Into<String>) -> Self {
        self.validation_error = Some(message.into());
        self
    }

    pub fn events(&self) -> Vec<EndpointEvent> {
        self.lock().clone()
    }

    /// Callback names in arrival order
    pub fn kinds(&self) -> Vec<&'static str> {
        self.lock().iter().map(EndpointEvent::kind).collect()
    }

    /// Finalized captures in arrival order
    pub fn captures(&self) -> Vec<Capture> {
        self.lock()
            .iter()
            .filter_map(EndpointEvent::capture)
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> MutexGuard<'_, Vec<EndpointEvent>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn push(&self, event: EndpointEvent) -> Result<(), ContractError> {
        self.lock().push(event);
        Ok(())
    }
}

impl Endpoint for RecordingEndpoint {
    fn name(&self) -> &str {
        &self.name
    }

    fn validate(&self) -> Result<(), ContractError> {
        match &self.validation_error {
            Some(message) => Err(ContractError::EndpointInvalid {
                endpoint: self.name.clone(),
                message: message.clone(),
            }),
            None => Ok(()),
        }
    }

    fn simulation_started(&mut self, metadata: &SimulationMetadata) -> Result<(), ContractError> {
        self.push(EndpointEvent::SimulationStarted {
            metadata: metadata.clone(),
        })
    }

    fn sensor_registered(&mut self, sensor: &SensorDefinition) -> Result<(), ContractError> {
        self.push(EndpointEvent::SensorRegistered {
            sensor: sensor.clone(),
        })
    }

    fn annotation_registered(
        &mut self,
        definition: &AnnotationDefinition,
    ) -> Result<(), ContractError> {
        self.push(EndpointEvent::AnnotationRegistered {
            definition: definition.clone(),
        })
    }

    fn metric_registered(&mut self, definition: &MetricDefinition) -> Result<(), ContractError> {
        self.push(EndpointEvent::MetricRegistered {
            definition: definition.clone(),
        })
    }

    fn frame_generated(&mut self, capture: Capture) -> Result<(), ContractError> {
        self.push(EndpointEvent::FrameGenerated { capture })
    }

    fn simulation_completed(
        &mut self,
        metadata: &SimulationMetadata,
    ) -> Result<(), ContractError> {
        self.push(EndpointEvent::SimulationCompleted {
            metadata: metadata.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_storage() {
        let endpoint = RecordingEndpoint::new("recording");
        let mut boxed: Box<dyn Endpoint> = Box::new(endpoint.clone());
        let mut next = boxed.clone();

        boxed.simulation_started(&SimulationMetadata::new()).unwrap();
        next.simulation_completed(&SimulationMetadata::new()).unwrap();

        assert_eq!(
            endpoint.kinds(),
            vec!["simulation_started", "simulation_completed"]
        );
        endpoint.clear();
        assert!(endpoint.events().is_empty());
    }

    #[test]
    fn test_failing_validation() {
        let endpoint = RecordingEndpoint::new("broken").failing_validation("no disk");
        let err = endpoint.validate().unwrap_err();
        assert!(err.to_string().contains("no disk"));
    }
}
