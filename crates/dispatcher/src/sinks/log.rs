//! LogSink - logs event summaries via tracing

use contracts::{ContractError, EndpointEvent, EventSink};
use tracing::{debug, info, instrument};

/// Sink that logs event summaries for debugging
pub struct LogSink {
    name: String,
    frames: u64,
}

impl LogSink {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            frames: 0,
        }
    }

    pub fn frames_logged(&self) -> u64 {
        self.frames
    }

    fn log_event(&mut self, event: &EndpointEvent) {
        match event {
            EndpointEvent::SimulationStarted { metadata } => {
                info!(sink = %self.name, keys = metadata.len(), "Simulation started");
            }
            EndpointEvent::SensorRegistered { sensor } => {
                info!(
                    sink = %self.name,
                    sensor = %sensor.id,
                    ego = %sensor.ego_id,
                    modality = %sensor.modality,
                    period = sensor.period,
                    "Sensor registered"
                );
            }
            EndpointEvent::AnnotationRegistered { definition } => {
                info!(sink = %self.name, definition = %definition.id, "Annotation definition registered");
            }
            EndpointEvent::MetricRegistered { definition } => {
                info!(sink = %self.name, definition = %definition.id, "Metric definition registered");
            }
            EndpointEvent::FrameGenerated { capture } => {
                self.frames += 1;
                debug!(
                    sink = %self.name,
                    capture_id = %capture.id,
                    sensor = capture.sensor_label(),
                    sequence = capture.sequence,
                    step = capture.step,
                    timestamp = capture.timestamp,
                    annotations = capture.annotations.len(),
                    metrics = capture.metrics.len(),
                    "Capture received"
                );
            }
            EndpointEvent::SimulationCompleted { metadata } => {
                info!(
                    sink = %self.name,
                    frames = self.frames,
                    total_frames = ?metadata.get("total_frames"),
                    "Simulation completed"
                );
            }
        }
    }
}

impl EventSink for LogSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "log_sink_write",
        skip(self, event),
        fields(sink = %self.name, event = event.kind())
    )]
    async fn write(&mut self, event: &EndpointEvent) -> Result<(), ContractError> {
        self.log_event(event);
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), ContractError> {
        Ok(())
    }

    #[instrument(name = "log_sink_close", skip(self))]
    async fn close(&mut self) -> Result<(), ContractError> {
        info!(sink = %self.name, frames = self.frames, "LogSink closed");
        Ok(())
    }
}
