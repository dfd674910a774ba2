//! ChannelEndpoint - forwards callbacks to a Dispatcher

use contracts::{
    AnnotationDefinition, Capture, ContractError, Endpoint, EndpointEvent, MetricDefinition,
    SensorDefinition, SimulationMetadata,
};
use tokio::sync::mpsc;
use tracing::trace;

use crate::error::DispatcherError;

/// Endpoint that turns every callback into an [`EndpointEvent`]
///
/// The channel is unbounded so the simulation thread never waits on a
/// sink; back-pressure is applied per sink by [`SinkHandle`](crate::SinkHandle).
/// Clones share the channel, so the per-run copies made by the controller
/// all feed the same dispatcher.
#[derive(Debug, Clone)]
pub struct ChannelEndpoint {
    name: String,
    tx: mpsc::UnboundedSender<EndpointEvent>,
}

impl ChannelEndpoint {
    /// Endpoint plus the receiver to hand to a [`Dispatcher`](crate::Dispatcher)
    pub fn new(name: impl Into<String>) -> (Self, mpsc::UnboundedReceiver<EndpointEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                name: name.into(),
                tx,
            },
            rx,
        )
    }

    pub fn from_sender(name: impl Into<String>, tx: mpsc::UnboundedSender<EndpointEvent>) -> Self {
        Self {
            name: name.into(),
            tx,
        }
    }

    fn forward(&self, event: EndpointEvent) -> Result<(), ContractError> {
        let kind = event.kind();
        trace!(endpoint = %self.name, event = kind, "Forwarding event");
        self.tx.send(event).map_err(|_| {
            DispatcherError::ChannelClosed {
                endpoint: self.name.clone(),
                kind,
            }
            .into()
        })
    }
}

impl Endpoint for ChannelEndpoint {
    fn name(&self) -> &str {
        &self.name
    }

    fn validate(&self) -> Result<(), ContractError> {
        if self.tx.is_closed() {
            return Err(ContractError::EndpointInvalid {
                endpoint: self.name.clone(),
                message: "dispatcher is not running".into(),
            });
        }
        Ok(())
    }

    fn simulation_started(&mut self, metadata: &SimulationMetadata) -> Result<(), ContractError> {
        self.forward(EndpointEvent::SimulationStarted {
            metadata: metadata.clone(),
        })
    }

    fn sensor_registered(&mut self, sensor: &SensorDefinition) -> Result<(), ContractError> {
        self.forward(EndpointEvent::SensorRegistered {
            sensor: sensor.clone(),
        })
    }

    fn annotation_registered(
        &mut self,
        definition: &AnnotationDefinition,
    ) -> Result<(), ContractError> {
        self.forward(EndpointEvent::AnnotationRegistered {
            definition: definition.clone(),
        })
    }

    fn metric_registered(&mut self, definition: &MetricDefinition) -> Result<(), ContractError> {
        self.forward(EndpointEvent::MetricRegistered {
            definition: definition.clone(),
        })
    }

    fn frame_generated(&mut self, capture: Capture) -> Result<(), ContractError> {
        self.forward(EndpointEvent::FrameGenerated { capture })
    }

    fn simulation_completed(
        &mut self,
        metadata: &SimulationMetadata,
    ) -> Result<(), ContractError> {
        self.forward(EndpointEvent::SimulationCompleted {
            metadata: metadata.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::ErrorCategory;

    #[test]
    fn test_events_arrive_in_order() {
        let (mut endpoint, mut rx) = ChannelEndpoint::new("dispatch");
        endpoint
            .simulation_started(&SimulationMetadata::new())
            .unwrap();
        endpoint
            .metric_registered(&MetricDefinition::new("object_count", ""))
            .unwrap();

        assert_eq!(rx.try_recv().unwrap().kind(), "simulation_started");
        assert_eq!(rx.try_recv().unwrap().kind(), "metric_registered");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_closed_dispatcher() {
        let (mut endpoint, rx) = ChannelEndpoint::new("dispatch");
        let clone = endpoint.clone();
        drop(rx);

        let err = clone.validate().unwrap_err();
        assert!(matches!(err, ContractError::EndpointInvalid { .. }));

        let err = endpoint
            .simulation_completed(&SimulationMetadata::new())
            .unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Endpoint);
    }
}
