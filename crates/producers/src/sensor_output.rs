//! Sensor output producer

use std::sync::Arc;

use contracts::{ContractError, ReportMode, SensorHandle};
use controller::{Producer, SimulationController, TickReport};
use tracing::trace;

use crate::readback::{latency, ReadbackJob, ReadbackWorker};
use crate::synthetic::PayloadFn;

/// Reports one sensor's output on every tick it captures
pub struct SensorOutputProducer {
    name: String,
    sensor: SensorHandle,
    mode: ReportMode,
    payload: PayloadFn,
    readback: Option<Arc<ReadbackWorker>>,
    reported: u64,
}

impl SensorOutputProducer {
    pub fn new(sensor: SensorHandle, payload: PayloadFn) -> Self {
        Self {
            name: format!("{}.output", sensor.id()),
            sensor,
            mode: ReportMode::Immediate,
            payload,
            readback: None,
            reported: 0,
        }
    }

    /// Report through `worker` after the configured latency
    pub fn with_readback(mut self, worker: Arc<ReadbackWorker>, latency_ms: u64) -> Self {
        self.mode = ReportMode::Readback { latency_ms };
        self.readback = Some(worker);
        self
    }

    pub fn sensor(&self) -> &SensorHandle {
        &self.sensor
    }

    /// Captures this producer served so far
    pub fn reported(&self) -> u64 {
        self.reported
    }
}

impl Producer for SensorOutputProducer {
    fn name(&self) -> &str {
        &self.name
    }

    fn on_tick(
        &mut self,
        controller: &mut SimulationController,
        tick: &TickReport,
    ) -> Result<(), ContractError> {
        if !controller.should_capture_this_frame(&self.sensor)? {
            return Ok(());
        }

        let payload = (self.payload)(&self.sensor, tick);
        match (&self.readback, latency(self.mode)) {
            (Some(worker), Some(latency)) => {
                let future = controller.report_sensor_async(&self.sensor)?;
                worker.submit(ReadbackJob::new(future, payload, latency))?;
            }
            _ => controller.report_sensor(&self.sensor, payload)?,
        }

        self.reported += 1;
        trace!(sensor = %self.sensor.id(), step = ?tick.step, "Sensor output reported");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic;
    use contracts::{Payload, SchedulerConfig, SensorSpec};
    use dispatcher::RecordingEndpoint;
    use std::time::Duration;

    #[test]
    fn test_reports_on_due_ticks_only() {
        let endpoint = RecordingEndpoint::new("recording");
        let mut controller =
            SimulationController::new(SchedulerConfig::default(), Box::new(endpoint.clone()));
        let ego = controller.register_ego("rig").unwrap();
        let cam = controller
            .register_sensor(&ego, SensorSpec::scheduled("camera", 1.0))
            .unwrap();
        let lidar = controller
            .register_sensor(&ego, SensorSpec::scheduled("lidar", 0.5))
            .unwrap();

        let mut producer = SensorOutputProducer::new(cam, synthetic::sensor_frame("camera"));
        for _ in 0..3 {
            let tick = controller.tick().unwrap();
            producer.on_tick(&mut controller, &tick).unwrap();
            if tick.is_due(lidar.id()) {
                controller.report_sensor(&lidar, vec![0.0]).unwrap();
            }
        }
        controller.reset_simulation().unwrap();

        // camera at 0.0 and 1.0, lidar at 0.0, 0.5, 1.0
        assert_eq!(producer.reported(), 2);
        let camera_outputs: Vec<_> = endpoint
            .captures()
            .into_iter()
            .filter(|c| c.sensor_label() == "camera")
            .filter_map(|c| c.sensor_output)
            .collect();
        assert_eq!(
            camera_outputs,
            vec![
                Payload::File {
                    path: "camera/sequence_0/step_0.png".into()
                },
                Payload::File {
                    path: "camera/sequence_0/step_2.png".into()
                },
            ]
        );
    }

    #[test]
    fn test_readback_resolves_before_flush() {
        let endpoint = RecordingEndpoint::new("recording");
        let mut controller =
            SimulationController::new(SchedulerConfig::default(), Box::new(endpoint.clone()));
        let ego = controller.register_ego("rig").unwrap();
        let cam = controller
            .register_sensor(&ego, SensorSpec::scheduled("camera", 1.0))
            .unwrap();

        let worker = Arc::new(ReadbackWorker::spawn(1, 4));
        let mut producer = SensorOutputProducer::new(cam, synthetic::sensor_frame("camera"))
            .with_readback(Arc::clone(&worker), 2);

        let tick = controller.tick().unwrap();
        producer.on_tick(&mut controller, &tick).unwrap();
        assert_eq!(controller.pending_capture_count(), 1);

        assert!(worker.wait_idle(Duration::from_secs(5)));
        let summary = controller.reset_simulation().unwrap();
        assert!(summary.is_clean());
        assert_eq!(endpoint.captures().len(), 1);
        worker.shutdown();
    }
}
