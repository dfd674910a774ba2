//! Producer loop driving a controller

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use contracts::ContractError;
use observability::MetricsSummary;
use tracing::{debug, info, instrument, warn};

use crate::controller::SimulationController;
use crate::report::{ResetSummary, TickReport};

/// Reports data into the controller when its sensors are due
pub trait Producer: Send {
    /// Producer name (used for logging)
    fn name(&self) -> &str;

    /// Called after every tick
    fn on_tick(
        &mut self,
        controller: &mut SimulationController,
        tick: &TickReport,
    ) -> Result<(), ContractError>;

    /// Called before the run is reset; deferred work should complete here
    fn on_run_end(&mut self, _controller: &mut SimulationController) -> Result<(), ContractError> {
        Ok(())
    }
}

/// Run length
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunPlan {
    pub ticks_per_sequence: u64,
    pub sequences: u32,
}

/// Result of [`SimulationRunner::run`]
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub ticks: u64,
    pub sequences: u32,
    /// Stopped early through the stop flag
    pub interrupted: bool,
    pub metrics: MetricsSummary,
    pub reset: ResetSummary,
}

/// Ticks a controller and hands every tick to its producers in order
pub struct SimulationRunner {
    controller: SimulationController,
    producers: Vec<Box<dyn Producer>>,
    stop: Arc<AtomicBool>,
}

impl SimulationRunner {
    pub fn new(controller: SimulationController) -> Self {
        Self {
            controller,
            producers: Vec::new(),
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_producer(mut self, producer: Box<dyn Producer>) -> Self {
        self.producers.push(producer);
        self
    }

    pub fn add_producer(&mut self, producer: Box<dyn Producer>) {
        self.producers.push(producer);
    }

    /// Share an externally owned stop flag, e.g. one set by a signal handler
    pub fn with_stop_flag(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop = stop;
        self
    }

    /// Flag that ends the run after the current tick when set
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    pub fn controller(&self) -> &SimulationController {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut SimulationController {
        &mut self.controller
    }

    pub fn into_controller(self) -> SimulationController {
        self.controller
    }

    /// One tick followed by every producer
    pub fn step(&mut self) -> Result<TickReport, ContractError> {
        let report = self.controller.tick()?;
        for producer in &mut self.producers {
            producer.on_tick(&mut self.controller, &report)?;
        }
        Ok(report)
    }

    /// Run `plan`, then finish the run with a reset
    ///
    /// Producer errors abort the loop and are returned; the controller is
    /// still reset so pending futures are reported.
    #[instrument(
        name = "simulation_runner_run",
        skip(self),
        fields(producers = self.producers.len())
    )]
    pub fn run(&mut self, plan: RunPlan) -> Result<RunOutcome, ContractError> {
        info!(
            ticks_per_sequence = plan.ticks_per_sequence,
            sequences = plan.sequences,
            "Simulation loop starting"
        );

        let mut ticks = 0u64;
        let mut sequences = 0u32;
        let looped = self.run_loop(plan, &mut ticks, &mut sequences);

        let ended = self.end_run();
        let reset = self.controller.reset_simulation()?;
        looped?;
        ended?;

        let interrupted = self.stop.load(Ordering::Relaxed);
        if interrupted {
            warn!(ticks, "Simulation loop interrupted");
        }
        info!(
            ticks,
            sequences,
            frames = reset.total_frames,
            discarded = reset.discarded.len(),
            "Simulation loop finished"
        );

        Ok(RunOutcome {
            ticks,
            sequences,
            interrupted,
            metrics: reset.metrics.clone(),
            reset,
        })
    }

    fn run_loop(
        &mut self,
        plan: RunPlan,
        ticks: &mut u64,
        sequences: &mut u32,
    ) -> Result<(), ContractError> {
        for sequence in 0..plan.sequences {
            if sequence > 0 {
                self.controller.start_new_sequence()?;
            }
            *sequences += 1;
            debug!(sequence, "Sequence loop starting");

            for _ in 0..plan.ticks_per_sequence {
                if self.stop.load(Ordering::Relaxed) {
                    return Ok(());
                }
                self.step()?;
                *ticks += 1;
            }
        }
        Ok(())
    }

    fn end_run(&mut self) -> Result<(), ContractError> {
        let mut first_error = None;
        for producer in &mut self.producers {
            if let Err(e) = producer.on_run_end(&mut self.controller) {
                warn!(producer = producer.name(), error = %e, "Producer failed to finish");
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{SchedulerConfig, SensorHandle, SensorSpec};
    use dispatcher::RecordingEndpoint;

    struct Echo {
        sensor: SensorHandle,
    }

    impl Producer for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        fn on_tick(
            &mut self,
            controller: &mut SimulationController,
            tick: &TickReport,
        ) -> Result<(), ContractError> {
            if tick.is_due(self.sensor.id()) {
                controller.report_sensor(&self.sensor, vec![tick.timestamp])?;
            }
            Ok(())
        }
    }

    fn runner(endpoint: &RecordingEndpoint) -> SimulationRunner {
        let mut controller =
            SimulationController::new(SchedulerConfig::default(), Box::new(endpoint.clone()));
        let ego = controller.register_ego("rig").unwrap();
        let sensor = controller
            .register_sensor(&ego, SensorSpec::scheduled("camera", 0.5))
            .unwrap();
        SimulationRunner::new(controller).with_producer(Box::new(Echo { sensor }))
    }

    #[test]
    fn test_run_plan_over_sequences() {
        let endpoint = RecordingEndpoint::new("recording");
        let mut runner = runner(&endpoint);

        let outcome = runner
            .run(RunPlan {
                ticks_per_sequence: 3,
                sequences: 2,
            })
            .unwrap();

        assert_eq!(outcome.ticks, 6);
        assert_eq!(outcome.sequences, 2);
        assert!(!outcome.interrupted);
        assert_eq!(outcome.reset.total_frames, 6);
        assert_eq!(outcome.reset.total_sequences, 2);
        assert_eq!(outcome.metrics.total_ticks, 6);

        let timestamps: Vec<_> = endpoint.captures().iter().map(|c| c.timestamp).collect();
        assert_eq!(timestamps, vec![0.0, 0.5, 1.0, 0.0, 0.5, 1.0]);
    }

    #[test]
    fn test_stop_flag_interrupts() {
        let endpoint = RecordingEndpoint::new("recording");
        let mut runner = runner(&endpoint);
        runner.stop_flag().store(true, Ordering::Relaxed);

        let outcome = runner
            .run(RunPlan {
                ticks_per_sequence: 10,
                sequences: 1,
            })
            .unwrap();
        assert!(outcome.interrupted);
        assert_eq!(outcome.ticks, 0);
        assert_eq!(endpoint.kinds().last(), Some(&"simulation_completed"));
    }

    #[test]
    fn test_producer_error_still_resets() {
        struct Failing;
        impl Producer for Failing {
            fn name(&self) -> &str {
                "failing"
            }
            fn on_tick(
                &mut self,
                _controller: &mut SimulationController,
                _tick: &TickReport,
            ) -> Result<(), ContractError> {
                Err(ContractError::Other("boom".into()))
            }
        }

        let endpoint = RecordingEndpoint::new("recording");
        let mut runner = runner(&endpoint).with_producer(Box::new(Failing));
        let err = runner
            .run(RunPlan {
                ticks_per_sequence: 5,
                sequences: 1,
            })
            .unwrap_err();
        assert!(err.to_string().contains("boom"));
        assert_eq!(endpoint.kinds().last(), Some(&"simulation_completed"));
    }
}
