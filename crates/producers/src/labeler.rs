//! Annotation and metric producers attached to a sensor

use std::sync::Arc;

use contracts::{ContractError, DefinitionId, LabelerKind, ReportMode, SensorHandle};
use controller::{MetricScope, Producer, SimulationController, TickReport};
use tracing::trace;

use crate::readback::{latency, ReadbackJob, ReadbackWorker};
use crate::synthetic::PayloadFn;

/// Reports an annotation or a metric whenever its sensor captures
///
/// `GlobalMetric` labelers land in the tick's sensor-less capture instead of
/// the sensor's.
pub struct Labeler {
    name: String,
    sensor: SensorHandle,
    kind: LabelerKind,
    definition: DefinitionId,
    mode: ReportMode,
    payload: PayloadFn,
    readback: Option<Arc<ReadbackWorker>>,
    reported: u64,
}

impl Labeler {
    pub fn new(
        sensor: SensorHandle,
        kind: LabelerKind,
        definition: DefinitionId,
        payload: PayloadFn,
    ) -> Self {
        Self {
            name: format!("{}.{}", sensor.id(), definition),
            sensor,
            kind,
            definition,
            mode: ReportMode::Immediate,
            payload,
            readback: None,
            reported: 0,
        }
    }

    pub fn annotation(sensor: SensorHandle, definition: DefinitionId, payload: PayloadFn) -> Self {
        Self::new(sensor, LabelerKind::Annotation, definition, payload)
    }

    pub fn metric(sensor: SensorHandle, definition: DefinitionId, payload: PayloadFn) -> Self {
        Self::new(sensor, LabelerKind::Metric, definition, payload)
    }

    pub fn with_readback(mut self, worker: Arc<ReadbackWorker>, latency_ms: u64) -> Self {
        self.mode = ReportMode::Readback { latency_ms };
        self.readback = Some(worker);
        self
    }

    pub fn kind(&self) -> LabelerKind {
        self.kind
    }

    pub fn reported(&self) -> u64 {
        self.reported
    }

    fn report_now(
        &self,
        controller: &mut SimulationController,
        payload: contracts::Payload,
    ) -> Result<(), ContractError> {
        match self.kind {
            LabelerKind::Annotation => controller
                .report_annotation(&self.sensor, &self.definition, payload)
                .map(|_| ()),
            LabelerKind::Metric => controller.report_metric(
                MetricScope::Sensor(&self.sensor),
                &self.definition,
                payload,
            ),
            LabelerKind::GlobalMetric => {
                controller.report_metric(MetricScope::Global, &self.definition, payload)
            }
        }
    }

    fn report_later(
        &self,
        controller: &mut SimulationController,
    ) -> Result<controller::AsyncFuture, ContractError> {
        match self.kind {
            LabelerKind::Annotation => controller
                .report_annotation_async(&self.sensor, &self.definition)
                .map(|annotation| annotation.future),
            LabelerKind::Metric => {
                controller.report_metric_async(MetricScope::Sensor(&self.sensor), &self.definition)
            }
            LabelerKind::GlobalMetric => {
                controller.report_metric_async(MetricScope::Global, &self.definition)
            }
        }
    }
}

impl Producer for Labeler {
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
                let future = self.report_later(controller)?;
                worker.submit(ReadbackJob::new(future, payload, latency))?;
            }
            _ => self.report_now(controller, payload)?,
        }

        self.reported += 1;
        trace!(labeler = %self.name, step = ?tick.step, "Label reported");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic;
    use contracts::{AnnotationDefinition, MetricDefinition, SchedulerConfig, SensorSpec};
    use dispatcher::RecordingEndpoint;
    use std::time::Duration;

    struct Rig {
        controller: SimulationController,
        endpoint: RecordingEndpoint,
        camera: SensorHandle,
    }

    fn rig() -> Rig {
        let endpoint = RecordingEndpoint::new("recording");
        let mut controller =
            SimulationController::new(SchedulerConfig::default(), Box::new(endpoint.clone()));
        let ego = controller.register_ego("rig").unwrap();
        let camera = controller
            .register_sensor(&ego, SensorSpec::scheduled("camera", 1.0))
            .unwrap();
        controller
            .register_annotation_definition(AnnotationDefinition::new("boxes", "2d boxes"))
            .unwrap();
        controller
            .register_metric_definition(MetricDefinition::new("timing", "tick timing"))
            .unwrap();
        Rig {
            controller,
            endpoint,
            camera,
        }
    }

    #[test]
    fn test_annotation_and_metrics_land_in_the_right_captures() {
        let Rig {
            mut controller,
            endpoint,
            camera,
        } = rig();

        let mut producers = vec![
            Labeler::annotation(
                camera.clone(),
                "boxes".into(),
                synthetic::annotation_record("boxes"),
            ),
            Labeler::metric(camera.clone(), "timing".into(), synthetic::tick_values()),
            Labeler::new(
                camera.clone(),
                LabelerKind::GlobalMetric,
                "timing".into(),
                synthetic::tick_values(),
            ),
        ];

        let tick = controller.tick().unwrap();
        controller.report_sensor(&camera, vec![0.0]).unwrap();
        for producer in &mut producers {
            producer.on_tick(&mut controller, &tick).unwrap();
        }
        controller.reset_simulation().unwrap();

        let captures = endpoint.captures();
        assert_eq!(captures.len(), 2);
        let sensor_capture = captures.iter().find(|c| c.sensor_id.is_some()).unwrap();
        let global_capture = captures.iter().find(|c| c.sensor_id.is_none()).unwrap();
        assert_eq!(sensor_capture.annotations.len(), 1);
        assert_eq!(sensor_capture.metrics.len(), 1);
        assert_eq!(global_capture.metrics.len(), 1);
        assert_eq!(sensor_capture.step, global_capture.step);
    }

    #[test]
    fn test_async_annotation_through_readback() {
        let Rig {
            mut controller,
            endpoint,
            camera,
        } = rig();
        let worker = Arc::new(ReadbackWorker::spawn(1, 4));
        let mut labeler = Labeler::annotation(
            camera.clone(),
            "boxes".into(),
            synthetic::annotation_record("boxes"),
        )
        .with_readback(Arc::clone(&worker), 1);

        let tick = controller.tick().unwrap();
        controller.report_sensor(&camera, vec![0.0]).unwrap();
        labeler.on_tick(&mut controller, &tick).unwrap();
        assert!(worker.wait_idle(Duration::from_secs(5)));

        controller.tick().unwrap();
        let captures = endpoint.captures();
        assert_eq!(captures.len(), 1);
        assert!(!captures[0].annotations[0].value.is_empty());
        worker.shutdown();
    }

    #[test]
    fn test_unknown_definition_is_reported() {
        let Rig {
            mut controller,
            camera,
            ..
        } = rig();
        let mut labeler =
            Labeler::annotation(camera, "missing".into(), synthetic::annotation_record("x"));
        let tick = controller.tick().unwrap();
        let err = labeler.on_tick(&mut controller, &tick).unwrap_err();
        assert!(matches!(err, ContractError::UnknownDefinition { .. }));
    }
}
