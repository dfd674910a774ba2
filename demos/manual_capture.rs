//! Manual Capture Example
//!
//! Drives a controller by hand without a runner: a scheduled camera with an
//! asynchronous annotation, plus a manually triggered sensor that only
//! captures when asked to. Events are collected by a `RecordingEndpoint`
//! and printed at the end.
//!
//! Run with: cargo run -p demos --bin manual_capture

use contracts::{AnnotationDefinition, MetricDefinition, SchedulerConfig, SensorSpec};
use controller::{MetricScope, SimulationController};
use dispatcher::RecordingEndpoint;
use serde_json::json;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let endpoint = RecordingEndpoint::new("recording");
    let mut controller =
        SimulationController::new(SchedulerConfig::default(), Box::new(endpoint.clone()));

    let boxes = controller.register_annotation_definition(
        AnnotationDefinition::new("bounding_box_2d", "2D boxes").with_type("bounding box"),
    )?;
    let coverage = controller
        .register_metric_definition(MetricDefinition::new("coverage", "Pixel coverage per box"))?;

    let ego = controller.register_ego("ego vehicle")?;
    let camera = controller.register_sensor(
        &ego,
        SensorSpec::scheduled("camera", 0.1).with_description("front camera"),
    )?;
    let snapshot = controller.register_sensor(&ego, SensorSpec::manual("camera"))?;
    tracing::info!(camera = %camera.id(), snapshot = %snapshot.id(), "Sensors registered");

    let mut pending = Vec::new();
    for _ in 0..10 {
        let tick = controller.tick()?;

        if tick.is_due(camera.id()) {
            controller.report_sensor(&camera, json!({ "frame": tick.step }))?;

            // 标注值稍后给出，metric 可以先挂到标注上
            let annotation = controller.report_annotation_async(&camera, &boxes.id)?;
            controller.report_metric(
                MetricScope::Annotation(&annotation.annotation),
                &coverage.id,
                vec![0.42],
            )?;
            pending.push(annotation.future);
        }

        // 每三个 step 手动触发一次
        if tick.step.is_some_and(|step| step % 3 == 0) {
            controller.request_capture(&snapshot)?;
            controller.report_sensor(&snapshot, vec![tick.timestamp])?;
        }

        // 上一帧的标注在下一帧完成
        if pending.len() > 1 {
            let future = pending.remove(0);
            future.report(json!({ "boxes": [[10, 10, 40, 30]] }))?;
        }

        tracing::info!(
            step = ?tick.step,
            timestamp = tick.timestamp,
            open = controller.pending_capture_count(),
            "Tick"
        );
    }

    for future in pending.drain(..) {
        future.report(json!({ "boxes": [] }))?;
    }
    let summary = controller.reset_simulation()?;

    for capture in endpoint.captures() {
        println!(
            "capture {:>3}  seq {}  step {:>2}  t={:.2}  sensor={:<10} annotations={} metrics={}",
            capture.id.value(),
            capture.sequence,
            capture.step,
            capture.timestamp,
            capture.sensor_label(),
            capture.annotations.len(),
            capture.metrics.len()
        );
    }
    println!("\n{}", summary.metrics);
    controller.shutdown()?;

    Ok(())
}
