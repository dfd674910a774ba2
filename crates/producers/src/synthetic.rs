//! Placeholder payloads for producers without a real data source

use contracts::{Payload, SensorHandle};
use controller::TickReport;
use serde_json::json;

/// Builds the value a producer reports for one capture
pub type PayloadFn = Box<dyn FnMut(&SensorHandle, &TickReport) -> Payload + Send>;

/// Sensor output pointing at where a renderer would have written the frame
pub fn sensor_frame(modality: &str) -> PayloadFn {
    let extension = match modality {
        "camera" | "rgb" | "depth" | "segmentation" => "png",
        "lidar" => "ply",
        _ => "json",
    };
    Box::new(move |sensor, tick| Payload::File {
        path: format!(
            "{}/sequence_{}/step_{}.{extension}",
            sensor.id(),
            tick.sequence,
            tick.step.unwrap_or_default()
        ),
    })
}

/// Annotation describing the capture it is attached to
pub fn annotation_record(definition: &str) -> PayloadFn {
    let definition = definition.to_string();
    Box::new(move |sensor, tick| {
        Payload::Json(json!({
            "definition": definition,
            "sensor": sensor.id().as_str(),
            "timestamp": tick.timestamp,
            "tick": tick.plan.tick,
        }))
    })
}

/// Metric values derived from the tick timing
pub fn tick_values() -> PayloadFn {
    Box::new(|_sensor, tick| {
        Payload::Values(vec![
            tick.plan.delta_time,
            tick.timestamp,
            tick.plan.due.len() as f64,
        ])
    })
}
