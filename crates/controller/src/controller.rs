//! SimulationController - top-level orchestrator

use std::collections::HashMap;

use capture::{AsyncFuture, DefinitionRegistry, PendingWriteTable};
use chrono::{DateTime, Utc};
use contracts::{
    AnnotationDefinition, AnnotationRef, CaptureId, ContractError, EgoHandle, Endpoint, Metric,
    MetricDefinition, Payload, RunId, SchedulerConfig, SensorDefinition, SensorHandle, SensorId,
    SensorSpec, SimulationMetadata,
};
use observability::{CaptureMetricsAggregator, MetricsSummary};
use scheduler::{validate_cadence, Scheduler, SensorRegistry};
use serde_json::{json, Value};
use tracing::{debug, error, info, instrument, warn};

use crate::report::{AsyncAnnotation, MetricScope, ResetSummary, TickReport};
use crate::state::ExecutionState;

/// Captures opened in the current tick
#[derive(Debug, Default)]
struct TickFrame {
    /// Allocated on the first capture opened in the tick
    step: Option<u64>,
    sensor_captures: HashMap<SensorId, CaptureId>,
    global_capture: Option<CaptureId>,
}

/// Drives sensors, captures and the endpoint through runs and sequences
///
/// One instance owns one logical timeline. `tick` is called once per engine
/// step from a single thread; futures handed out by the report API may be
/// resolved from any thread.
pub struct SimulationController {
    config: SchedulerConfig,
    state: ExecutionState,
    run: RunId,
    endpoint: Box<dyn Endpoint>,
    /// Replacement endpoint applied when the next run starts
    pending_endpoint: Option<Box<dyn Endpoint>>,
    sensors: SensorRegistry,
    scheduler: Scheduler,
    definitions: DefinitionRegistry,
    table: PendingWriteTable,
    frame: TickFrame,
    sequence: u64,
    next_step: u64,
    captured_in_sequence: bool,
    total_frames: u64,
    /// Requested engine time scale; the scheduler latches it per sequence
    time_scale: f64,
    user_metadata: SimulationMetadata,
    started_at: Option<DateTime<Utc>>,
    aggregator: CaptureMetricsAggregator,
}

impl std::fmt::Debug for SimulationController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulationController")
            .field("state", &self.state)
            .field("run", &self.run)
            .field("endpoint", &self.endpoint.name())
            .field("sequence", &self.sequence)
            .field("sensors", &self.sensors.sensor_count())
            .field("open_captures", &self.table.open_count())
            .finish()
    }
}

impl SimulationController {
    pub fn new(config: SchedulerConfig, endpoint: Box<dyn Endpoint>) -> Self {
        let run = RunId::default();
        Self {
            time_scale: config.time_scale,
            scheduler: Scheduler::new(config),
            config,
            state: ExecutionState::Uninitialized,
            run,
            endpoint,
            pending_endpoint: None,
            sensors: SensorRegistry::new(run),
            definitions: DefinitionRegistry::new(),
            table: PendingWriteTable::new(),
            frame: TickFrame::default(),
            sequence: 0,
            next_step: 0,
            captured_in_sequence: false,
            total_frames: 0,
            user_metadata: SimulationMetadata::new(),
            started_at: None,
            aggregator: CaptureMetricsAggregator::new(),
        }
    }

    // ===== Lifecycle =====

    pub fn state(&self) -> ExecutionState {
        self.state
    }

    pub fn run(&self) -> RunId {
        self.run
    }

    /// Report calls never start a run; a stale handle fails its own lookup
    fn ensure_reportable(&self) -> Result<(), ContractError> {
        match self.state {
            ExecutionState::Running | ExecutionState::Uninitialized => Ok(()),
            ExecutionState::Disposed => Err(ContractError::Disposed),
            ExecutionState::Resetting => Err(ContractError::Other(
                "simulation reset in progress".to_string(),
            )),
        }
    }

    fn ensure_running(&mut self) -> Result<(), ContractError> {
        match self.state {
            ExecutionState::Running => Ok(()),
            ExecutionState::Uninitialized => self.start_run(),
            ExecutionState::Disposed => Err(ContractError::Disposed),
            ExecutionState::Resetting => Err(ContractError::Other(
                "simulation reset in progress".to_string(),
            )),
        }
    }

    #[instrument(name = "controller_start_run", skip(self), fields(run = %self.run))]
    fn start_run(&mut self) -> Result<(), ContractError> {
        if let Some(endpoint) = self.pending_endpoint.take() {
            debug!(endpoint = endpoint.name(), "Applying endpoint override");
            self.endpoint = endpoint;
        }
        self.endpoint.validate()?;

        let started_at = Utc::now();
        self.started_at = Some(started_at);
        self.state = ExecutionState::Running;

        let mut metadata = SimulationMetadata::new();
        metadata.insert("run", self.run.value());
        metadata.insert("simulation_start_time", started_at.to_rfc3339());
        metadata.merge(&self.user_metadata);
        self.notify("simulation_started", |endpoint| {
            endpoint.simulation_started(&metadata)
        });

        info!(endpoint = self.endpoint.name(), "Simulation run started");
        Ok(())
    }

    /// Swap the endpoint for the next run
    ///
    /// Takes effect when the next run starts; the current run keeps its
    /// endpoint until `reset_simulation`.
    pub fn override_endpoint(&mut self, endpoint: Box<dyn Endpoint>) {
        debug!(
            current = self.endpoint.name(),
            next = endpoint.name(),
            state = %self.state,
            "Endpoint override queued"
        );
        self.pending_endpoint = Some(endpoint);
    }

    pub fn endpoint_name(&self) -> &str {
        self.endpoint.name()
    }

    /// Finish the run and start over with empty registries
    ///
    /// Complete captures are flushed. Captures still waiting on futures are
    /// logged at error level and discarded; their futures become invalid.
    /// The endpoint receives `simulation_completed`, then the controller
    /// returns to `Uninitialized` with a fresh endpoint instance (the queued
    /// override, or a clone of the current one). Calling this on a fresh
    /// controller starts and completes an empty run.
    #[instrument(name = "controller_reset_simulation", skip(self), fields(run = %self.run))]
    pub fn reset_simulation(&mut self) -> Result<ResetSummary, ContractError> {
        self.ensure_running()?;
        self.state = ExecutionState::Resetting;

        let flushed = self.flush(None);
        let discarded = self.table.invalidate_all();
        for capture in &discarded {
            let slots: Vec<String> = capture.unresolved.iter().map(ToString::to_string).collect();
            error!(
                capture_id = %capture.capture_id,
                sensor_id = capture.sensor_label(),
                sequence = capture.sequence,
                step = capture.step,
                unresolved = ?slots,
                "Simulation ended with pending capture; discarding it"
            );
            observability::record_capture_discarded(capture.sensor_label(), slots.len());
        }
        self.aggregator.update_discarded(discarded.len() as u64);

        let metadata = self.completion_metadata();
        self.notify("simulation_completed", |endpoint| {
            endpoint.simulation_completed(&metadata)
        });

        let summary = ResetSummary {
            run: self.run,
            total_frames: self.total_frames,
            total_sequences: self.total_sequences(),
            flushed,
            discarded,
            metrics: self.aggregator.summary(),
        };
        info!(
            total_frames = summary.total_frames,
            total_sequences = summary.total_sequences,
            discarded = summary.discarded.len(),
            "Simulation run completed"
        );

        self.endpoint = self
            .pending_endpoint
            .take()
            .unwrap_or_else(|| dyn_clone::clone_box(&*self.endpoint));
        self.run = self.run.next();
        self.sensors.clear(self.run);
        self.scheduler = Scheduler::new(SchedulerConfig {
            time_scale: self.time_scale,
            ..self.config
        });
        self.definitions.clear();
        self.table = PendingWriteTable::new();
        self.frame = TickFrame::default();
        self.sequence = 0;
        self.next_step = 0;
        self.captured_in_sequence = false;
        self.total_frames = 0;
        self.user_metadata = SimulationMetadata::new();
        self.started_at = None;
        self.aggregator.reset();
        self.state = ExecutionState::Uninitialized;

        Ok(summary)
    }

    /// Final reset; the controller rejects everything afterwards
    ///
    /// Returns `None` when no run was in progress.
    pub fn shutdown(&mut self) -> Result<Option<ResetSummary>, ContractError> {
        let summary = match self.state {
            ExecutionState::Disposed => return Ok(None),
            ExecutionState::Running => Some(self.reset_simulation()?),
            ExecutionState::Uninitialized | ExecutionState::Resetting => None,
        };
        self.state = ExecutionState::Disposed;
        info!(run = %self.run, "Simulation controller disposed");
        Ok(summary)
    }

    // ===== Registration =====

    /// Register an ego; ids are `ego_N`, separate from definition ids
    #[instrument(name = "controller_register_ego", skip(self, description))]
    pub fn register_ego(&mut self, description: &str) -> Result<EgoHandle, ContractError> {
        self.ensure_running()?;
        self.sensors.allocate_ego(description)
    }

    /// Register a sensor under `ego`
    ///
    /// The returned handle carries the final id, which may differ from the
    /// requested one by a `_N` suffix.
    #[instrument(
        name = "controller_register_sensor",
        skip(self, ego, spec),
        fields(requested = spec.requested_id())
    )]
    pub fn register_sensor(
        &mut self,
        ego: &EgoHandle,
        spec: SensorSpec,
    ) -> Result<SensorHandle, ContractError> {
        self.ensure_running()?;
        self.sensors.ego(ego)?;

        let requested = spec.requested_id().to_string();
        validate_cadence(&SensorDefinition::from_spec(
            requested.as_str().into(),
            ego.id().clone(),
            spec.clone(),
        ))?;

        let id = self.definitions.reserve_id(&requested)?;
        let definition = SensorDefinition::from_spec(id.into(), ego.id().clone(), spec);
        let handle = self.sensors.register_sensor(ego, definition.clone())?;
        self.notify("sensor_registered", |endpoint| {
            endpoint.sensor_registered(&definition)
        });
        Ok(handle)
    }

    /// Register an annotation definition; use the returned id from now on
    pub fn register_annotation_definition(
        &mut self,
        definition: AnnotationDefinition,
    ) -> Result<AnnotationDefinition, ContractError> {
        self.ensure_running()?;
        let definition = self.definitions.register_annotation(definition)?;
        self.notify("annotation_registered", |endpoint| {
            endpoint.annotation_registered(&definition)
        });
        Ok(definition)
    }

    /// Register a metric definition; use the returned id from now on
    pub fn register_metric_definition(
        &mut self,
        definition: MetricDefinition,
    ) -> Result<MetricDefinition, ContractError> {
        self.ensure_running()?;
        let definition = self.definitions.register_metric(definition)?;
        self.notify("metric_registered", |endpoint| {
            endpoint.metric_registered(&definition)
        });
        Ok(definition)
    }

    /// Remove one sensor; its handle stops validating
    ///
    /// Captures it already opened stay open until their futures resolve.
    pub fn unregister_sensor(&mut self, sensor: &SensorHandle) -> Result<(), ContractError> {
        self.sensors.unregister_sensor(sensor)?;
        self.scheduler.forget(sensor.id());
        self.frame.sensor_captures.remove(sensor.id());
        Ok(())
    }

    /// Remove an ego and every sensor mounted on it
    pub fn unregister_ego(&mut self, ego: &EgoHandle) -> Result<(), ContractError> {
        for definition in self.sensors.unregister_ego(ego)? {
            self.scheduler.forget(&definition.id);
            self.frame.sensor_captures.remove(&definition.id);
        }
        Ok(())
    }

    pub fn is_valid_sensor(&self, sensor: &SensorHandle) -> bool {
        self.sensors.is_valid_sensor(sensor)
    }

    pub fn is_valid_ego(&self, ego: &EgoHandle) -> bool {
        self.sensors.is_valid_ego(ego)
    }

    pub fn set_sensor_enabled(
        &mut self,
        sensor: &SensorHandle,
        enabled: bool,
    ) -> Result<(), ContractError> {
        self.sensors.set_enabled(sensor, enabled)
    }

    pub fn is_sensor_enabled(&self, sensor: &SensorHandle) -> Result<bool, ContractError> {
        self.sensors.is_enabled(sensor)
    }

    pub fn sensor_definition(
        &self,
        sensor: &SensorHandle,
    ) -> Result<&SensorDefinition, ContractError> {
        Ok(self.sensors.sensor(sensor)?.definition())
    }

    pub fn annotation_definitions(&self) -> &[AnnotationDefinition] {
        self.definitions.annotations()
    }

    pub fn metric_definitions(&self) -> &[MetricDefinition] {
        self.definitions.metrics()
    }

    // ===== Time =====

    /// Advance one engine step
    ///
    /// Captures that became complete since the previous tick are handed to
    /// the endpoint first. Then the scheduler picks the tick's duration and
    /// a capture is opened for every due sensor.
    #[instrument(name = "controller_tick", skip(self), fields(run = %self.run, sequence = self.sequence))]
    pub fn tick(&mut self) -> Result<TickReport, ContractError> {
        self.ensure_running()?;

        self.flush(Some(self.scheduler.total_ticks()));

        let violations = self.scheduler.time_scale_violations();
        let plan = self.scheduler.tick(&mut self.sensors, self.time_scale);
        if self.scheduler.time_scale_violations() > violations {
            self.aggregator.update_time_scale_violation();
        }
        self.aggregator.update_tick(plan.delta_time, plan.constrained);

        self.frame = TickFrame::default();
        for sensor_id in &plan.due {
            self.open_sensor_capture(sensor_id, plan.tick);
        }

        Ok(TickReport {
            run: self.run,
            sequence: self.sequence,
            step: self.frame.step,
            timestamp: self.scheduler.scaled_sequence_time(),
            plan,
        })
    }

    /// Restart the sequence timeline
    ///
    /// Complete captures, including this tick's, are flushed first. The
    /// sequence number only advances if something was captured since the
    /// last restart. Handles and registrations survive.
    #[instrument(name = "controller_start_new_sequence", skip(self), fields(run = %self.run))]
    pub fn start_new_sequence(&mut self) -> Result<(), ContractError> {
        self.ensure_running()?;
        self.flush(None);

        if self.captured_in_sequence {
            self.sequence += 1;
            observability::record_sequence_started(self.sequence);
        }
        self.captured_in_sequence = false;
        self.next_step = 0;
        self.frame = TickFrame::default();
        self.scheduler
            .start_new_sequence(&mut self.sensors, self.time_scale);

        debug!(sequence = self.sequence, time_scale = self.time_scale, "Sequence started");
        Ok(())
    }

    /// Set the engine time scale
    ///
    /// Applies from the next sequence; changing it after the current sequence
    /// has ticked is logged as an error and ignored until then.
    pub fn set_time_scale(&mut self, time_scale: f64) -> Result<(), ContractError> {
        if !(time_scale.is_finite() && time_scale > 0.0) {
            return Err(ContractError::config_validation(
                "time_scale",
                format!("time scale must be > 0, got {time_scale}"),
            ));
        }
        self.time_scale = time_scale;
        Ok(())
    }

    pub fn time_scale(&self) -> f64 {
        self.scheduler.latched_time_scale()
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Scaled simulated seconds since the sequence began
    pub fn sequence_time(&self) -> f64 {
        self.scheduler.scaled_sequence_time()
    }

    pub fn total_ticks(&self) -> u64 {
        self.scheduler.total_ticks()
    }

    // ===== Scheduling queries =====

    /// Whether `sensor` captures in the current tick
    pub fn should_capture_this_frame(&self, sensor: &SensorHandle) -> Result<bool, ContractError> {
        self.scheduler.should_capture(&self.sensors, sensor)
    }

    /// Unscaled sequence time of the sensor's next capture
    pub fn sequence_time_of_next_capture(
        &self,
        sensor: &SensorHandle,
    ) -> Result<Option<f64>, ContractError> {
        self.scheduler
            .sequence_time_of_next_capture(&self.sensors, sensor)
    }

    /// Ask a manual sensor to capture
    ///
    /// Once the sequence has ticked the capture opens immediately and the
    /// sensor can report in the current tick; otherwise it opens on the
    /// next tick.
    pub fn request_capture(&mut self, sensor: &SensorHandle) -> Result<(), ContractError> {
        self.ensure_reportable()?;
        let due_now = self.scheduler.request_capture(&mut self.sensors, sensor)?;
        if due_now && !self.frame.sensor_captures.contains_key(sensor.id()) {
            let tick = self.scheduler.total_ticks().saturating_sub(1);
            self.open_sensor_capture(sensor.id(), tick);
        }
        Ok(())
    }

    // ===== Reporting =====

    /// Attach the sensor output of the current tick
    pub fn report_sensor(
        &mut self,
        sensor: &SensorHandle,
        value: impl Into<Payload>,
    ) -> Result<(), ContractError> {
        let capture_id = self.capture_for(sensor)?;
        self.table.set_sensor_output(capture_id, value.into())
    }

    /// Promise the sensor output of the current tick
    pub fn report_sensor_async(
        &mut self,
        sensor: &SensorHandle,
    ) -> Result<AsyncFuture, ContractError> {
        let capture_id = self.capture_for(sensor)?;
        self.table.issue_sensor_output(capture_id)
    }

    /// Add an annotation to the sensor's current capture
    pub fn report_annotation(
        &mut self,
        sensor: &SensorHandle,
        definition_id: &str,
        value: impl Into<Payload>,
    ) -> Result<AnnotationRef, ContractError> {
        let capture_id = self.capture_for(sensor)?;
        let definition_id = self.definitions.annotation(definition_id)?.id.clone();
        let annotation_id = self.table.add_annotation(
            capture_id,
            definition_id.clone(),
            sensor.id().clone(),
            value.into(),
        )?;
        Ok(AnnotationRef {
            run: self.run,
            capture_id,
            annotation_id,
            definition_id,
            sensor_id: sensor.id().clone(),
        })
    }

    /// Add an annotation to the sensor's current capture, value to follow
    pub fn report_annotation_async(
        &mut self,
        sensor: &SensorHandle,
        definition_id: &str,
    ) -> Result<AsyncAnnotation, ContractError> {
        let capture_id = self.capture_for(sensor)?;
        let definition_id = self.definitions.annotation(definition_id)?.id.clone();
        let (annotation_id, future) =
            self.table
                .issue_annotation(capture_id, definition_id.clone(), sensor.id().clone())?;
        Ok(AsyncAnnotation {
            annotation: AnnotationRef {
                run: self.run,
                capture_id,
                annotation_id,
                definition_id,
                sensor_id: sensor.id().clone(),
            },
            future,
        })
    }

    /// Add a metric with its value
    pub fn report_metric(
        &mut self,
        scope: MetricScope<'_>,
        definition_id: &str,
        value: impl Into<Payload>,
    ) -> Result<(), ContractError> {
        let (capture_id, mut metric) = self.metric_target(scope, definition_id)?;
        metric.value = value.into();
        self.table.add_metric(capture_id, metric)
    }

    /// Add a metric whose value is reported later
    pub fn report_metric_async(
        &mut self,
        scope: MetricScope<'_>,
        definition_id: &str,
    ) -> Result<AsyncFuture, ContractError> {
        let (capture_id, metric) = self.metric_target(scope, definition_id)?;
        self.table.issue_metric(capture_id, metric)
    }

    /// Add an entry to the run metadata sent with `simulation_completed`
    pub fn report_metadata(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.user_metadata.insert(key, value);
    }

    // ===== Introspection =====

    /// Captures opened but not yet handed to the endpoint
    pub fn pending_capture_count(&self) -> usize {
        self.table.open_count()
    }

    /// Totals of the current run
    pub fn metrics_summary(&self) -> MetricsSummary {
        self.aggregator.summary()
    }

    // ===== Internals =====

    fn capture_for(&self, sensor: &SensorHandle) -> Result<CaptureId, ContractError> {
        self.ensure_reportable()?;
        self.sensors.sensor(sensor)?;
        self.frame
            .sensor_captures
            .get(sensor.id())
            .copied()
            .ok_or_else(|| {
                ContractError::capture_not_expected(
                    sensor.id().as_str(),
                    "sensor is not scheduled to capture this tick",
                )
            })
    }

    fn metric_target(
        &mut self,
        scope: MetricScope<'_>,
        definition_id: &str,
    ) -> Result<(CaptureId, Metric), ContractError> {
        self.ensure_reportable()?;
        let definition_id = self.definitions.metric(definition_id)?.id.clone();

        let (capture_id, sensor_id, annotation_id) = match scope {
            MetricScope::Global => (self.global_capture()?, None, None),
            MetricScope::Sensor(sensor) => {
                (self.capture_for(sensor)?, Some(sensor.id().clone()), None)
            }
            MetricScope::Annotation(annotation) => {
                if annotation.run != self.run {
                    return Err(ContractError::invalid_handle(
                        format!("annotation {}", annotation.annotation_id.value()),
                        format!("issued by {}, current run is {}", annotation.run, self.run),
                    ));
                }
                (
                    annotation.capture_id,
                    Some(annotation.sensor_id.clone()),
                    Some(annotation.annotation_id),
                )
            }
        };

        Ok((
            capture_id,
            Metric {
                definition_id,
                sensor_id,
                annotation_id,
                value: Payload::Empty,
            },
        ))
    }

    /// Sensor-less capture of the current tick, opened on first use
    fn global_capture(&mut self) -> Result<CaptureId, ContractError> {
        if let Some(id) = self.frame.global_capture {
            return Ok(id);
        }
        if !self.scheduler.has_ticked() {
            return Err(ContractError::capture_not_expected(
                "-",
                "global metrics need a tick in the current sequence",
            ));
        }

        let step = self.allocate_step();
        let tick = self.scheduler.total_ticks().saturating_sub(1);
        let id = self.table.open(
            self.sequence,
            step,
            self.scheduler.scaled_sequence_time(),
            None,
            None,
            tick,
        );
        self.captured_in_sequence = true;
        self.frame.global_capture = Some(id);
        Ok(id)
    }

    fn open_sensor_capture(&mut self, sensor_id: &SensorId, tick: u64) {
        let Some(state) = self.sensors.sensor_by_id(sensor_id) else {
            warn!(sensor_id = %sensor_id, "Due sensor is no longer registered");
            return;
        };
        let ego_id = state.definition().ego_id.clone();

        let step = self.allocate_step();
        let id = self.table.open(
            self.sequence,
            step,
            self.scheduler.scaled_sequence_time(),
            Some(sensor_id.clone()),
            Some(ego_id),
            tick,
        );
        self.captured_in_sequence = true;
        self.frame.sensor_captures.insert(sensor_id.clone(), id);
    }

    fn allocate_step(&mut self) -> u64 {
        *self.frame.step.get_or_insert_with(|| {
            let step = self.next_step;
            self.next_step += 1;
            step
        })
    }

    /// Hand complete captures to the endpoint; returns how many
    fn flush(&mut self, opened_before_tick: Option<u64>) -> usize {
        let ready = self.table.take_ready(opened_before_tick);
        let count = ready.len();
        let now = self.scheduler.total_ticks();

        for done in ready {
            let latency = now.saturating_sub(done.opened_tick + 1);
            observability::record_capture_finalized(done.capture.sensor_label(), latency);
            self.aggregator.update_capture(&done.capture, latency);
            self.total_frames += 1;

            let capture = done.capture;
            self.notify("frame_generated", move |endpoint| {
                endpoint.frame_generated(capture)
            });
        }
        count
    }

    fn total_sequences(&self) -> u64 {
        self.sequence + u64::from(self.captured_in_sequence)
    }

    fn completion_metadata(&self) -> SimulationMetadata {
        let sensors: Vec<Value> = self
            .sensors
            .sensors()
            .map(|state| {
                let definition = state.definition();
                json!({
                    "id": definition.id.as_str(),
                    "ego_id": definition.ego_id.as_str(),
                    "modality": definition.modality,
                    "period": definition.period,
                    "trigger_mode": definition.trigger_mode,
                })
            })
            .collect();
        let annotators: Vec<Value> = self
            .definitions
            .annotations()
            .iter()
            .map(|d| json!({ "id": d.id.as_str(), "type": d.annotation_type }))
            .collect();
        let metric_collectors: Vec<Value> = self
            .definitions
            .metrics()
            .iter()
            .map(|d| json!({ "id": d.id.as_str(), "description": d.description }))
            .collect();

        let mut metadata = SimulationMetadata::new();
        metadata.insert("run", self.run.value());
        metadata.insert("total_frames", self.total_frames);
        metadata.insert("total_sequences", self.total_sequences());
        metadata.insert("sensors", sensors);
        metadata.insert("annotators", annotators);
        metadata.insert("metric_collectors", metric_collectors);
        if let Some(started_at) = self.started_at {
            metadata.insert("simulation_start_time", started_at.to_rfc3339());
        }
        metadata.insert("simulation_end_time", Utc::now().to_rfc3339());
        metadata.merge(&self.user_metadata);
        metadata
    }

    /// Deliver one callback; failures are logged and counted, never raised
    fn notify<F>(&mut self, event: &'static str, deliver: F)
    where
        F: FnOnce(&mut dyn Endpoint) -> Result<(), ContractError>,
    {
        let result = deliver(self.endpoint.as_mut());
        observability::record_endpoint_event(self.endpoint.name(), event, result.is_ok());
        if let Err(e) = result {
            error!(
                endpoint = self.endpoint.name(),
                event,
                error = %e,
                "Endpoint callback failed"
            );
        }
    }
}
