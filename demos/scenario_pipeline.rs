//! Scenario Pipeline Example
//!
//! Loads a scenario file, builds the capture rig from it and runs every
//! sequence, fanning captures out to the configured endpoints.
//!
//! Run with: cargo run -p demos --bin scenario_pipeline -- demos/scenario.toml

use std::path::Path;

use config_loader::ConfigLoader;
use controller::{RunPlan, SimulationController, SimulationRunner};
use dispatcher::{create_dispatcher, ChannelEndpoint};
use producers::{ReadbackSettings, RigBuilder};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    tracing::info!("Starting Scenario Pipeline Demo");

    // ==== Stage 1: Load scenario ====
    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "demos/scenario.toml".to_string());
    tracing::info!(path = %path, "Loading scenario");
    let blueprint = ConfigLoader::load_from_path(Path::new(&path))?;

    // ==== Stage 2: Dispatcher ====
    let (endpoint, rx) = ChannelEndpoint::new("dispatcher");
    let dispatcher = create_dispatcher(blueprint.endpoints.clone(), rx).await?;
    let dispatcher_handle = dispatcher.spawn();

    // ==== Stage 3: Controller and rig ====
    let mut controller =
        SimulationController::new(blueprint.to_scheduler_config(), Box::new(endpoint));
    controller.report_metadata("demo", "scenario_pipeline");

    let rig = RigBuilder::new(&blueprint)
        .with_readback(ReadbackSettings::default())
        .build(&mut controller)?;
    for sensor in &rig.sensors {
        tracing::info!(
            requested = %sensor.requested_id,
            id = %sensor.handle.id(),
            enabled = sensor.enabled,
            "Sensor registered"
        );
    }
    let readback = rig.readback().cloned();

    let mut runner = SimulationRunner::new(controller);
    for producer in rig.into_producers() {
        runner.add_producer(producer);
    }

    // ==== Stage 4: Run ====
    let plan = RunPlan {
        ticks_per_sequence: blueprint.simulation.ticks_per_sequence,
        sequences: blueprint.simulation.sequences,
    };
    let outcome = tokio::task::spawn_blocking(move || {
        let outcome = runner.run(plan);
        // 关闭 dispatcher 输入
        drop(runner);
        outcome
    })
    .await??;

    // ==== Stage 5: Cleanup ====
    if let Some(worker) = readback {
        worker.shutdown();
        tracing::info!(stats = ?worker.metrics(), "Readback worker stopped");
    }
    for (sink, metrics) in dispatcher_handle.await? {
        tracing::info!(sink = %sink, written = metrics.write_count, failed = metrics.failure_count, "Sink finished");
    }

    tracing::info!(
        ticks = outcome.ticks,
        frames = outcome.reset.total_frames,
        discarded = outcome.reset.discarded.len(),
        "Scenario completed"
    );
    println!("{}", outcome.metrics);

    Ok(())
}
