//! `run` command implementation.

use std::sync::atomic::Ordering;

use anyhow::{Context, Result};
use contracts::ScenarioBlueprint;
use producers::ReadbackSettings;
use tracing::{info, warn};

use crate::cli::RunArgs;
use crate::pipeline::{Pipeline, PipelineConfig};

/// Execute the `run` command
pub async fn run_pipeline(args: &RunArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration");

    if !args.config.exists() {
        anyhow::bail!("Configuration file not found: {}", args.config.display());
    }

    let mut blueprint = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    apply_overrides(&mut blueprint, args)?;

    info!(
        egos = blueprint.egos.len(),
        sensors = blueprint.all_sensors().count(),
        endpoints = blueprint.endpoints.len(),
        total_ticks = blueprint.total_ticks(),
        "Configuration loaded"
    );

    if args.dry_run {
        info!("Dry run mode - configuration is valid, exiting");
        print_config_summary(&blueprint);
        return Ok(());
    }

    if args.metrics_port != 0 {
        observability::init_metrics_only(args.metrics_port)?;
        info!(port = args.metrics_port, "Metrics endpoint available");
    }

    let pipeline = Pipeline::new(PipelineConfig {
        blueprint,
        readback: ReadbackSettings {
            threads: args.readback_threads.max(1),
            ..Default::default()
        },
    });
    let stop = pipeline.stop_flag();

    info!("Starting simulation...");
    let run = pipeline.run();
    tokio::pin!(run);

    // 收到信号后只置位停止标志，仍等待本轮 reset 完成
    let stats = tokio::select! {
        result = &mut run => result,
        _ = shutdown_signal() => {
            warn!("Received shutdown signal, stopping after the current tick...");
            stop.store(true, Ordering::Relaxed);
            run.await
        }
    }
    .context("Pipeline execution failed")?;

    info!(
        ticks = stats.ticks,
        frames = stats.frames,
        discarded = stats.discarded,
        interrupted = stats.interrupted,
        duration_secs = stats.duration.as_secs_f64(),
        "Simulation finished"
    );
    stats.print_summary();

    Ok(())
}

/// Apply CLI overrides and re-check the affected fields
fn apply_overrides(blueprint: &mut ScenarioBlueprint, args: &RunArgs) -> Result<()> {
    if let Some(ticks) = args.ticks {
        info!(ticks, "Overriding ticks per sequence from CLI");
        blueprint.simulation.ticks_per_sequence = ticks;
    }
    if let Some(sequences) = args.sequences {
        info!(sequences, "Overriding sequence count from CLI");
        blueprint.simulation.sequences = sequences;
    }
    if let Some(time_scale) = args.time_scale {
        if !(time_scale.is_finite() && time_scale > 0.0) {
            anyhow::bail!("--time-scale must be > 0, got {}", time_scale);
        }
        info!(time_scale, "Overriding time scale from CLI");
        blueprint.simulation.time_scale = time_scale;
    }
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Print configuration summary for dry-run mode
fn print_config_summary(blueprint: &ScenarioBlueprint) {
    let simulation = &blueprint.simulation;
    println!("\n=== Configuration Summary ===\n");
    println!("Simulation:");
    println!("  Time scale: {}", simulation.time_scale);
    println!("  Idle delta time: {}s", simulation.idle_delta_time);
    println!(
        "  Ticks: {} x {} sequences",
        simulation.ticks_per_sequence, simulation.sequences
    );

    println!("\nEgos ({}):", blueprint.egos.len());
    for ego in &blueprint.egos {
        println!("  - {} - {} sensors", ego.description, ego.sensors.len());
    }

    println!(
        "\nDefinitions: {} annotations, {} metrics",
        blueprint.annotations.len(),
        blueprint.metrics.len()
    );

    if !blueprint.endpoints.is_empty() {
        println!("\nEndpoints ({}):", blueprint.endpoints.len());
        for endpoint in &blueprint.endpoints {
            println!("  - {} ({:?})", endpoint.name, endpoint.endpoint_type);
        }
    }

    println!();
}
