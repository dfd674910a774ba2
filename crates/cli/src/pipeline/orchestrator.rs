//! Pipeline orchestrator - wires controller, rig and dispatcher together.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use contracts::{Endpoint, ScenarioBlueprint};
use controller::{RunPlan, SimulationController, SimulationRunner};
use dispatcher::{ChannelEndpoint, MetricsSnapshot, NullEndpoint};
use producers::{ReadbackSettings, RigBuilder};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::PipelineStats;

/// How long shutdown waits for sinks to drain
const DISPATCHER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Scenario to run, with CLI overrides applied
    pub blueprint: ScenarioBlueprint,

    /// Readback worker settings
    pub readback: ReadbackSettings,
}

/// Main pipeline orchestrator
pub struct Pipeline {
    config: PipelineConfig,
    stop: Arc<AtomicBool>,
}

type DispatcherTask = JoinHandle<Vec<(String, MetricsSnapshot)>>;

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Setting this flag ends the run after the current tick
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    /// Run the scenario to completion
    pub async fn run(self) -> Result<PipelineStats> {
        let start_time = Instant::now();
        let PipelineConfig {
            blueprint,
            readback,
        } = self.config;

        let (endpoint, dispatcher_task) = Self::start_dispatcher(&blueprint).await?;

        let mut controller = SimulationController::new(blueprint.to_scheduler_config(), endpoint);
        controller.report_metadata("config_version", format!("{:?}", blueprint.version));
        controller.report_metadata("ticks_per_sequence", blueprint.simulation.ticks_per_sequence);
        controller.report_metadata("sequences", blueprint.simulation.sequences);

        info!("Building capture rig...");
        let rig = match RigBuilder::new(&blueprint)
            .with_readback(readback)
            .build(&mut controller)
        {
            Ok(rig) => rig,
            Err(e) => {
                // 已注册的部分仍需收尾，dispatcher 排空后再返回
                Self::close_controller(controller);
                Self::drain_dispatcher(dispatcher_task).await;
                return Err(anyhow::Error::new(e).context("Failed to build capture rig"));
            }
        };

        let active_sensors = rig.sensors.iter().filter(|s| s.enabled).count();
        let readback_worker = rig.readback().cloned();
        info!(
            egos = rig.egos.len(),
            sensors = rig.sensors.len(),
            active_sensors,
            producers = rig.producer_count(),
            readback = readback_worker.is_some(),
            "Capture rig ready"
        );

        let mut runner = SimulationRunner::new(controller).with_stop_flag(Arc::clone(&self.stop));
        for producer in rig.into_producers() {
            runner.add_producer(producer);
        }

        let plan = RunPlan {
            ticks_per_sequence: blueprint.simulation.ticks_per_sequence,
            sequences: blueprint.simulation.sequences,
        };

        // 仿真循环是同步的，放到阻塞线程池
        let (runner, outcome) = tokio::task::spawn_blocking(move || {
            let outcome = runner.run(plan);
            (runner, outcome)
        })
        .await
        .context("Simulation task panicked")?;

        info!("Shutting down pipeline...");
        Self::close_controller(runner.into_controller());

        let readback_snapshot = match readback_worker {
            Some(worker) => Some(
                tokio::task::spawn_blocking(move || {
                    worker.shutdown();
                    worker.metrics()
                })
                .await
                .context("Readback shutdown panicked")?,
            ),
            None => None,
        };

        let sink_metrics = Self::drain_dispatcher(dispatcher_task).await;

        let outcome = outcome.context("Simulation run failed")?;

        let stats = PipelineStats {
            ticks: outcome.ticks,
            sequences: outcome.sequences,
            frames: outcome.reset.total_frames,
            discarded: outcome.reset.discarded.len(),
            interrupted: outcome.interrupted,
            duration: start_time.elapsed(),
            active_sensors,
            sink_metrics,
            readback: readback_snapshot,
            metrics: outcome.metrics,
        };

        info!(
            duration_secs = stats.duration.as_secs_f64(),
            tps = format!("{:.2}", stats.ticks_per_second()),
            "Pipeline shutdown complete"
        );

        Ok(stats)
    }

    async fn start_dispatcher(
        blueprint: &ScenarioBlueprint,
    ) -> Result<(Box<dyn Endpoint>, Option<DispatcherTask>)> {
        if blueprint.endpoints.is_empty() {
            warn!("No endpoints configured - captures will be dropped");
            return Ok((Box::new(NullEndpoint), None));
        }

        info!("Setting up dispatcher...");
        let (endpoint, rx) = ChannelEndpoint::new("dispatcher");
        let dispatcher = dispatcher::create_dispatcher(blueprint.endpoints.clone(), rx)
            .await
            .context("Failed to create dispatcher")?;

        info!(
            active_sinks = blueprint.endpoints.len(),
            "Dispatcher started"
        );
        Ok((Box::new(endpoint), Some(dispatcher.spawn())))
    }

    /// Final reset, then drop the controller to close the dispatcher channel
    fn close_controller(mut controller: SimulationController) {
        if let Err(e) = controller.shutdown() {
            warn!(error = %e, "Controller shutdown failed");
        }
    }

    async fn drain_dispatcher(task: Option<DispatcherTask>) -> Vec<(String, MetricsSnapshot)> {
        let Some(task) = task else {
            return Vec::new();
        };

        match tokio::time::timeout(DISPATCHER_DRAIN_TIMEOUT, task).await {
            Ok(Ok(metrics)) => metrics,
            Ok(Err(e)) => {
                warn!(error = %e, "Dispatcher task failed");
                Vec::new()
            }
            Err(_) => {
                warn!(
                    timeout_secs = DISPATCHER_DRAIN_TIMEOUT.as_secs(),
                    "Dispatcher did not drain in time"
                );
                Vec::new()
            }
        }
    }
}
