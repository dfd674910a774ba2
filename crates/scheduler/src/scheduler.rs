//! Tick scheduler.

use contracts::{CaptureTriggerMode, ContractError, SchedulerConfig, SensorHandle, SensorId};
use tracing::{debug, error, instrument, trace};

use crate::cadence::Cadence;
use crate::registry::SensorRegistry;

/// Outcome of one tick
#[derive(Debug, Clone, PartialEq)]
pub struct TickPlan {
    /// Tick index since the scheduler was created (0-based)
    pub tick: u64,
    /// Tick index within the current sequence (0-based)
    pub sequence_tick: u64,
    /// Schedule delta in simulated seconds
    pub unscaled_delta_time: f64,
    /// Engine delta: `unscaled_delta_time * time_scale`
    pub delta_time: f64,
    /// Time scale applied to this tick
    pub time_scale: f64,
    /// Unscaled time since the sequence began, after this tick
    pub sequence_time: f64,
    /// Whether an enabled sensor chose the delta (otherwise idle delta)
    pub constrained: bool,
    /// Sensors capturing this tick, in registration order
    pub due: Vec<SensorId>,
}

impl TickPlan {
    /// Scaled time since the sequence began, after this tick
    pub fn scaled_sequence_time(&self) -> f64 {
        self.sequence_time * self.time_scale
    }

    pub fn is_due(&self, id: &str) -> bool {
        self.due.iter().any(|due| due == id)
    }
}

/// Decides each tick's duration and which sensors capture in it
///
/// The tick lands exactly on the earliest upcoming render slot of any enabled
/// timing-driving sensor. Every sensor whose own slot coincides with that
/// instant renders too, so sensors with unrelated periods never drift.
#[derive(Debug)]
pub struct Scheduler {
    config: SchedulerConfig,
    /// Unscaled simulated seconds since the sequence began
    sequence_time: f64,
    total_ticks: u64,
    ticks_in_sequence: u64,
    latched_time_scale: f64,
    time_scale_violations: u64,
    due: Vec<SensorId>,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            latched_time_scale: config.time_scale,
            config,
            sequence_time: 0.0,
            total_ticks: 0,
            ticks_in_sequence: 0,
            time_scale_violations: 0,
            due: Vec::new(),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Advance the timeline by one tick
    ///
    /// `requested_time_scale` is the engine's current scale. It is adopted
    /// only before the first tick of a sequence; a different value later in
    /// the sequence is logged and ignored.
    #[instrument(
        name = "scheduler_tick",
        skip(self, registry),
        fields(tick = self.total_ticks, sequence_time = self.sequence_time)
    )]
    pub fn tick(&mut self, registry: &mut SensorRegistry, requested_time_scale: f64) -> TickPlan {
        self.latch_time_scale(requested_time_scale);

        let now = self.sequence_time;
        let inclusive = self.ticks_in_sequence == 0;
        let config = self.config;

        let mut target: Option<f64> = None;
        for state in registry.states_mut() {
            if !state.is_enabled() || !state.definition().drives_timing() {
                continue;
            }
            let definition = state.definition().clone();
            let skipped = state.cadence.catch_up(&definition, now, inclusive, &config);
            if skipped > 0 {
                trace!(sensor_id = %definition.id, skipped, "Skipped render slots in the past");
            }
            let next = state.cadence.next_render_time(&definition);
            target = Some(target.map_or(next, |t: f64| t.min(next)));
        }

        let (sequence_time, constrained) = match target {
            Some(t) => (t, true),
            None => (now + config.idle_delta_time, false),
        };
        let unscaled_delta_time = sequence_time - now;

        let mut due = Vec::new();
        for state in registry.states_mut() {
            if !state.is_enabled() {
                continue;
            }
            let definition = state.definition().clone();

            let renders = constrained
                && definition.drives_timing()
                && config.coincides(state.cadence.next_render_time(&definition), sequence_time);
            let slot = renders.then(|| state.cadence.consume_render());

            let captures = match definition.trigger_mode {
                CaptureTriggerMode::Scheduled => {
                    slot.is_some_and(|k| Cadence::captures_on(&definition, k))
                }
                CaptureTriggerMode::Manual => state.cadence.take_request(),
            };
            if captures {
                due.push(definition.id.clone());
            }
        }

        let plan = TickPlan {
            tick: self.total_ticks,
            sequence_tick: self.ticks_in_sequence,
            unscaled_delta_time,
            delta_time: unscaled_delta_time * self.latched_time_scale,
            time_scale: self.latched_time_scale,
            sequence_time,
            constrained,
            due: due.clone(),
        };

        self.sequence_time = sequence_time;
        self.total_ticks += 1;
        self.ticks_in_sequence += 1;
        self.due = due;

        observability::record_tick(plan.delta_time, plan.unscaled_delta_time, plan.due.len());
        debug!(
            delta_time = plan.delta_time,
            sequence_time = plan.sequence_time,
            due = plan.due.len(),
            constrained,
            "Tick planned"
        );
        plan
    }

    fn latch_time_scale(&mut self, requested: f64) {
        if requested == self.latched_time_scale {
            return;
        }
        if self.ticks_in_sequence == 0 {
            debug!(
                from = self.latched_time_scale,
                to = requested,
                "Time scale adopted for sequence"
            );
            self.latched_time_scale = requested;
            return;
        }

        self.time_scale_violations += 1;
        observability::record_time_scale_violation();
        let err = ContractError::TimeScaleChanged {
            latched: self.latched_time_scale,
            requested,
        };
        error!(
            error = %err,
            latched = self.latched_time_scale,
            requested,
            "Time scale may not change mid-sequence; keeping the latched value"
        );
    }

    /// Whether `sensor` captures in the current tick
    pub fn should_capture(
        &self,
        registry: &SensorRegistry,
        sensor: &SensorHandle,
    ) -> Result<bool, ContractError> {
        registry.sensor(sensor)?;
        Ok(self.is_due(sensor.id()))
    }

    pub fn is_due(&self, id: &str) -> bool {
        self.due.iter().any(|due| due == id)
    }

    /// Sensors capturing in the current tick
    pub fn due(&self) -> &[SensorId] {
        &self.due
    }

    /// Ask a manual sensor to capture
    ///
    /// Returns `true` when the sensor became due in the current tick (the
    /// sequence has already ticked), `false` when it will be due on the next.
    #[instrument(name = "scheduler_request_capture", skip(self, registry), fields(sensor_id = %sensor.id()))]
    pub fn request_capture(
        &mut self,
        registry: &mut SensorRegistry,
        sensor: &SensorHandle,
    ) -> Result<bool, ContractError> {
        let state = registry.sensor_mut(sensor)?;
        if state.definition().trigger_mode != CaptureTriggerMode::Manual {
            return Err(ContractError::config_validation(
                format!("sensors[{}].trigger_mode", sensor.id()),
                "capture requests are only accepted by manual sensors",
            ));
        }
        if !state.is_enabled() {
            return Err(ContractError::capture_not_expected(
                sensor.id().as_str(),
                "sensor is disabled",
            ));
        }

        if self.ticks_in_sequence > 0 {
            if !self.is_due(sensor.id()) {
                self.due.push(sensor.id().clone());
            }
            debug!("Manual capture due in current tick");
            Ok(true)
        } else {
            state.cadence.request_capture();
            debug!("Manual capture queued for next tick");
            Ok(false)
        }
    }

    /// Unscaled simulated seconds since the sequence began
    pub fn sequence_time(&self) -> f64 {
        self.sequence_time
    }

    /// Scaled simulated seconds since the sequence began
    pub fn scaled_sequence_time(&self) -> f64 {
        self.sequence_time * self.latched_time_scale
    }

    /// Unscaled sequence time at which `sensor` next captures
    ///
    /// `None` for a manual sensor with no pending request.
    pub fn sequence_time_of_next_capture(
        &self,
        registry: &SensorRegistry,
        sensor: &SensorHandle,
    ) -> Result<Option<f64>, ContractError> {
        let state = registry.sensor(sensor)?;
        let definition = state.definition();

        match definition.trigger_mode {
            CaptureTriggerMode::Scheduled => {
                let open = Cadence::first_open_slot(
                    definition,
                    state.renders_issued(),
                    self.sequence_time,
                    self.ticks_in_sequence == 0,
                    &self.config,
                );
                let stride = u64::from(definition.frames_between_captures) + 1;
                let slot = open.div_ceil(stride) * stride;
                Ok(Some(Cadence::slot_time(definition, slot)))
            }
            CaptureTriggerMode::Manual => {
                let pending = state.cadence.is_capture_requested() || self.is_due(sensor.id());
                Ok(pending.then_some(self.sequence_time))
            }
        }
    }

    /// Rewind the timeline to 0 and put every sensor back on slot 0
    ///
    /// Registrations and handles are untouched. `time_scale` is latched for
    /// the new sequence.
    #[instrument(name = "scheduler_start_new_sequence", skip(self, registry))]
    pub fn start_new_sequence(&mut self, registry: &mut SensorRegistry, time_scale: f64) {
        self.sequence_time = 0.0;
        self.ticks_in_sequence = 0;
        self.latched_time_scale = time_scale;
        self.due.clear();
        for state in registry.states_mut() {
            state.cadence.restart();
        }
    }

    /// Drop scheduling state held for an unregistered sensor
    pub fn forget(&mut self, id: &str) {
        self.due.retain(|due| due != id);
    }

    pub fn latched_time_scale(&self) -> f64 {
        self.latched_time_scale
    }

    /// Mid-sequence time scale changes rejected so far
    pub fn time_scale_violations(&self) -> u64 {
        self.time_scale_violations
    }

    /// Whether the current sequence has ticked at least once
    pub fn has_ticked(&self) -> bool {
        self.ticks_in_sequence > 0
    }

    pub fn ticks_in_sequence(&self) -> u64 {
        self.ticks_in_sequence
    }

    pub fn total_ticks(&self) -> u64 {
        self.total_ticks
    }
}
