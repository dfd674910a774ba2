//! Build a capture rig from a [`ScenarioBlueprint`]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use contracts::{
    AnnotationDefinition, ContractError, DefinitionConfig, DefinitionId, EgoHandle, LabelerKind,
    MetricDefinition, ReportMode, ScenarioBlueprint, SensorHandle,
};
use controller::{Producer, SimulationController, TickReport};
use tracing::{debug, info, instrument, warn};

use crate::labeler::Labeler;
use crate::readback::ReadbackWorker;
use crate::sensor_output::SensorOutputProducer;
use crate::synthetic;

/// Readback settings used by [`RigBuilder`]
#[derive(Debug, Clone, Copy)]
pub struct ReadbackSettings {
    pub threads: usize,
    pub queue_capacity: usize,
    /// How long the end of a run waits for outstanding readbacks
    pub drain_timeout: Duration,
}

impl Default for ReadbackSettings {
    fn default() -> Self {
        Self {
            threads: 2,
            queue_capacity: 64,
            drain_timeout: Duration::from_secs(5),
        }
    }
}

/// Registered sensor together with the id it was requested under
#[derive(Debug, Clone)]
pub struct RigSensor {
    pub requested_id: String,
    pub handle: SensorHandle,
    pub enabled: bool,
}

/// Everything registered for one run
pub struct Rig {
    pub egos: Vec<EgoHandle>,
    pub sensors: Vec<RigSensor>,
    /// Requested definition id to the id the controller assigned
    pub definitions: HashMap<String, DefinitionId>,
    producers: Vec<Box<dyn Producer>>,
    readback: Option<Arc<ReadbackWorker>>,
}

impl Rig {
    pub fn producer_count(&self) -> usize {
        self.producers.len()
    }

    pub fn readback(&self) -> Option<&Arc<ReadbackWorker>> {
        self.readback.as_ref()
    }

    /// Producers in reporting order; the readback barrier, if any, comes last
    pub fn into_producers(self) -> Vec<Box<dyn Producer>> {
        self.producers
    }
}

/// Registers a blueprint's definitions, egos and sensors with a controller
/// and creates a producer for every output and labeler
pub struct RigBuilder<'a> {
    blueprint: &'a ScenarioBlueprint,
    readback: ReadbackSettings,
}

impl<'a> RigBuilder<'a> {
    pub fn new(blueprint: &'a ScenarioBlueprint) -> Self {
        Self {
            blueprint,
            readback: ReadbackSettings::default(),
        }
    }

    pub fn with_readback(mut self, settings: ReadbackSettings) -> Self {
        self.readback = settings;
        self
    }

    #[instrument(
        name = "rig_builder_build",
        skip(self, controller),
        fields(egos = self.blueprint.egos.len())
    )]
    pub fn build(self, controller: &mut SimulationController) -> Result<Rig, ContractError> {
        let mut definitions = HashMap::new();
        for config in &self.blueprint.annotations {
            let definition = controller.register_annotation_definition(
                AnnotationDefinition::new(config.id.as_str(), config.description.as_str())
                    .with_type(config.kind.as_str()),
            )?;
            note_definition(&mut definitions, config, definition.id);
        }
        for config in &self.blueprint.metrics {
            let definition = controller.register_metric_definition(MetricDefinition::new(
                config.id.as_str(),
                config.description.as_str(),
            ))?;
            note_definition(&mut definitions, config, definition.id);
        }

        let readback = self
            .needs_readback()
            .then(|| Arc::new(ReadbackWorker::spawn(self.readback.threads, self.readback.queue_capacity)));

        let mut egos = Vec::with_capacity(self.blueprint.egos.len());
        let mut sensors = Vec::new();
        let mut producers: Vec<Box<dyn Producer>> = Vec::new();

        for ego_config in &self.blueprint.egos {
            let ego = controller.register_ego(&ego_config.description)?;

            for config in &ego_config.sensors {
                let handle = controller.register_sensor(&ego, config.to_spec())?;
                if !config.enabled {
                    controller.set_sensor_enabled(&handle, false)?;
                }

                if let Some(mode) = config.output {
                    let producer = SensorOutputProducer::new(
                        handle.clone(),
                        synthetic::sensor_frame(&config.modality),
                    );
                    producers.push(Box::new(with_mode(producer, mode, &readback)));
                }

                for labeler in &config.labelers {
                    let definition = definitions
                        .get(&labeler.definition)
                        .cloned()
                        .ok_or_else(|| ContractError::unknown_definition(&labeler.definition))?;
                    let payload = match labeler.kind {
                        LabelerKind::Annotation => synthetic::annotation_record(&definition),
                        LabelerKind::Metric | LabelerKind::GlobalMetric => synthetic::tick_values(),
                    };
                    let producer =
                        Labeler::new(handle.clone(), labeler.kind, definition, payload);
                    producers.push(Box::new(with_labeler_mode(producer, labeler.report, &readback)));
                }

                debug!(
                    requested = %config.id,
                    sensor = %handle.id(),
                    enabled = config.enabled,
                    "Rig sensor registered"
                );
                sensors.push(RigSensor {
                    requested_id: config.id.clone(),
                    handle,
                    enabled: config.enabled,
                });
            }
            egos.push(ego);
        }

        if let Some(worker) = &readback {
            producers.push(Box::new(ReadbackBarrier {
                worker: Arc::clone(worker),
                timeout: self.readback.drain_timeout,
            }));
        }

        info!(
            sensors = sensors.len(),
            producers = producers.len(),
            readback = readback.is_some(),
            "Rig built"
        );

        Ok(Rig {
            egos,
            sensors,
            definitions,
            producers,
            readback,
        })
    }

    fn needs_readback(&self) -> bool {
        self.blueprint.all_sensors().any(|sensor| {
            matches!(sensor.output, Some(ReportMode::Readback { .. }))
                || sensor
                    .labelers
                    .iter()
                    .any(|l| matches!(l.report, ReportMode::Readback { .. }))
        })
    }
}

fn note_definition(
    definitions: &mut HashMap<String, DefinitionId>,
    config: &DefinitionConfig,
    assigned: DefinitionId,
) {
    if assigned.as_str() != config.id {
        warn!(requested = %config.id, assigned = %assigned, "Definition id was taken, renamed");
    }
    definitions.insert(config.id.clone(), assigned);
}

fn with_mode(
    producer: SensorOutputProducer,
    mode: ReportMode,
    readback: &Option<Arc<ReadbackWorker>>,
) -> SensorOutputProducer {
    match (mode, readback) {
        (ReportMode::Readback { latency_ms }, Some(worker)) => {
            producer.with_readback(Arc::clone(worker), latency_ms)
        }
        _ => producer,
    }
}

fn with_labeler_mode(
    producer: Labeler,
    mode: ReportMode,
    readback: &Option<Arc<ReadbackWorker>>,
) -> Labeler {
    match (mode, readback) {
        (ReportMode::Readback { latency_ms }, Some(worker)) => {
            producer.with_readback(Arc::clone(worker), latency_ms)
        }
        _ => producer,
    }
}

/// Waits for outstanding readbacks before the run is reset
struct ReadbackBarrier {
    worker: Arc<ReadbackWorker>,
    timeout: Duration,
}

impl Producer for ReadbackBarrier {
    fn name(&self) -> &str {
        "readback_barrier"
    }

    fn on_tick(
        &mut self,
        _controller: &mut SimulationController,
        _tick: &TickReport,
    ) -> Result<(), ContractError> {
        Ok(())
    }

    fn on_run_end(&mut self, _controller: &mut SimulationController) -> Result<(), ContractError> {
        if !self.worker.wait_idle(self.timeout) {
            warn!(
                in_flight = self.worker.in_flight(),
                timeout_ms = self.timeout.as_millis() as u64,
                "Readbacks still in flight at end of run"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{
        CaptureTriggerMode, ConfigVersion, EgoConfig, LabelerConfig, SchedulerConfig,
        SensorConfig, SimulationConfig,
    };
    use controller::{RunPlan, SimulationRunner};
    use dispatcher::RecordingEndpoint;

    fn sensor(id: &str, period: f64, output: Option<ReportMode>) -> SensorConfig {
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
            output,
            labelers: Vec::new(),
        }
    }

    fn definition(id: &str) -> DefinitionConfig {
        DefinitionConfig {
            id: id.into(),
            description: String::new(),
            kind: "bounding box".into(),
        }
    }

    fn blueprint() -> ScenarioBlueprint {
        let mut rgb = sensor("rgb", 0.5, Some(ReportMode::Readback { latency_ms: 1 }));
        rgb.labelers = vec![
            LabelerConfig {
                definition: "boxes".into(),
                kind: LabelerKind::Annotation,
                report: ReportMode::Immediate,
            },
            LabelerConfig {
                definition: "object_count".into(),
                kind: LabelerKind::GlobalMetric,
                report: ReportMode::Readback { latency_ms: 1 },
            },
        ];
        let mut disabled = sensor("depth", 1.0, Some(ReportMode::Immediate));
        disabled.enabled = false;

        ScenarioBlueprint {
            version: ConfigVersion::V1,
            simulation: SimulationConfig::default(),
            egos: vec![EgoConfig {
                description: "test rig".into(),
                sensors: vec![rgb, disabled],
            }],
            annotations: vec![definition("boxes")],
            metrics: vec![definition("object_count")],
            endpoints: Vec::new(),
        }
    }

    #[test]
    fn test_build_registers_everything() {
        let endpoint = RecordingEndpoint::new("recording");
        let mut controller =
            SimulationController::new(SchedulerConfig::default(), Box::new(endpoint.clone()));

        let rig = RigBuilder::new(&blueprint()).build(&mut controller).unwrap();
        assert_eq!(rig.egos.len(), 1);
        assert_eq!(rig.sensors.len(), 2);
        // two outputs, two labelers, one barrier
        assert_eq!(rig.producer_count(), 5);
        assert!(rig.readback().is_some());
        assert!(!controller
            .is_sensor_enabled(&rig.sensors[1].handle)
            .unwrap());
        assert_eq!(
            endpoint.kinds(),
            vec![
                "simulation_started",
                "annotation_registered",
                "metric_registered",
                "sensor_registered",
                "sensor_registered",
            ]
        );
    }

    #[test]
    fn test_rig_runs_clean() {
        let endpoint = RecordingEndpoint::new("recording");
        let mut controller =
            SimulationController::new(SchedulerConfig::default(), Box::new(endpoint.clone()));
        let rig = RigBuilder::new(&blueprint()).build(&mut controller).unwrap();
        let worker = rig.readback().cloned();

        let mut runner = SimulationRunner::new(controller);
        for producer in rig.into_producers() {
            runner.add_producer(producer);
        }
        let outcome = runner
            .run(RunPlan {
                ticks_per_sequence: 4,
                sequences: 1,
            })
            .unwrap();

        assert!(outcome.reset.is_clean());
        // rgb captures on all 4 ticks, each with a global metric capture
        assert_eq!(outcome.reset.total_frames, 8);
        let captures = endpoint.captures();
        assert!(captures.iter().all(|c| c.sensor_label() != "depth"));
        assert!(captures
            .iter()
            .filter(|c| c.sensor_id.is_some())
            .all(|c| c.sensor_output.is_some() && c.annotations.len() == 1));
        if let Some(worker) = worker {
            worker.shutdown();
        }
    }

    #[test]
    fn test_unknown_labeler_definition() {
        let mut bp = blueprint();
        bp.metrics.clear();
        let mut controller = SimulationController::new(
            SchedulerConfig::default(),
            Box::new(RecordingEndpoint::new("recording")),
        );
        let err = RigBuilder::new(&bp)
            .build(&mut controller)
            .err()
            .unwrap();
        assert!(matches!(err, ContractError::UnknownDefinition { .. }));
    }
}
