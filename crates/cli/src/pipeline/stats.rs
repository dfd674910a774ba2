//! Pipeline statistics and metrics.

use std::time::Duration;

use dispatcher::MetricsSnapshot;
use observability::MetricsSummary;
use producers::ReadbackSnapshot;

/// Statistics from a pipeline run
#[derive(Debug, Clone, Default)]
pub struct PipelineStats {
    /// Ticks executed over all sequences
    pub ticks: u64,

    /// Sequences started
    pub sequences: u32,

    /// Captures handed to the endpoint
    pub frames: u64,

    /// Captures dropped at reset with unresolved futures
    pub discarded: usize,

    /// Stopped early by a shutdown signal
    pub interrupted: bool,

    /// Wall-clock duration of the run
    pub duration: Duration,

    /// Sensors registered enabled
    pub active_sensors: usize,

    /// Final per-sink counters
    pub sink_metrics: Vec<(String, MetricsSnapshot)>,

    /// Readback worker counters, when the rig used one
    pub readback: Option<ReadbackSnapshot>,

    /// Tick and capture statistics
    pub metrics: MetricsSummary,
}

impl PipelineStats {
    /// Simulated ticks per wall-clock second
    pub fn ticks_per_second(&self) -> f64 {
        if self.duration.as_secs_f64() > 0.0 {
            self.ticks as f64 / self.duration.as_secs_f64()
        } else {
            0.0
        }
    }

    /// Print detailed summary
    pub fn print_summary(&self) {
        println!("\n╔══════════════════════════════════════════════════════════════╗");
        println!("║                    Simulation Statistics                     ║");
        println!("╚══════════════════════════════════════════════════════════════╝\n");

        println!("📊 Overview");
        println!("   ├─ Duration: {:.2}s", self.duration.as_secs_f64());
        println!("   ├─ Ticks: {} ({:.2}/s)", self.ticks, self.ticks_per_second());
        println!("   ├─ Sequences: {}", self.sequences);
        println!("   ├─ Captures: {}", self.frames);
        println!("   ├─ Discarded: {}", self.discarded);
        println!("   ├─ Active sensors: {}", self.active_sensors);
        println!("   └─ Interrupted: {}", self.interrupted);

        println!("\n📈 Capture Metrics");
        for line in self.metrics.to_string().lines().skip(1) {
            println!("   {}", line);
        }

        if let Some(readback) = &self.readback {
            println!("\n⏳ Readback");
            println!("   ├─ Submitted: {}", readback.submitted);
            println!("   ├─ Completed: {}", readback.completed);
            println!("   └─ Failed: {}", readback.failed);
        }

        if !self.sink_metrics.is_empty() {
            println!("\n📤 Sinks");
            for (i, (name, snapshot)) in self.sink_metrics.iter().enumerate() {
                let prefix = if i + 1 == self.sink_metrics.len() {
                    "└─"
                } else {
                    "├─"
                };
                println!(
                    "   {} {}: {} written, {} failed, {} dropped",
                    prefix,
                    name,
                    snapshot.write_count,
                    snapshot.failure_count,
                    snapshot.dropped_count
                );
            }
        }

        println!();
    }
}
