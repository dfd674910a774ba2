//! FileSink - writes endpoint events to disk as JSON
//!
//! Layout under `base_path`, one directory per simulation run:
//!
//! ```text
//! run_0/metadata_started.json
//! run_0/sensors/<sensor_id>.json
//! run_0/annotations/<definition_id>.json
//! run_0/metrics/<definition_id>.json
//! run_0/sequence_<n>/step_<m>_<sensor_id>.json
//! run_0/metadata_completed.json
//! ```

use contracts::{ContractError, EndpointEvent, EventSink};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::{debug, error, instrument};

/// Directory name used for sensor-less captures
const GLOBAL_CAPTURE_LABEL: &str = "global";

/// Configuration for FileSink
#[derive(Debug, Clone)]
pub struct FileSinkConfig {
    pub base_path: PathBuf,
    /// Pretty-print JSON files
    pub pretty: bool,
}

impl FileSinkConfig {
    /// Create config from params map
    pub fn from_params(params: &HashMap<String, String>) -> Self {
        let base_path = params
            .get("base_path")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./output"));
        let pretty = params.get("pretty").is_some_and(|v| v == "true");

        Self { base_path, pretty }
    }
}

/// Sink that writes events to JSON files
pub struct FileSink {
    name: String,
    config: FileSinkConfig,
    /// Number of `simulation_started` events seen
    runs: u64,
    created_dirs: HashSet<PathBuf>,
}

impl FileSink {
    pub fn new(name: impl Into<String>, config: FileSinkConfig) -> std::io::Result<Self> {
        fs::create_dir_all(&config.base_path)?;

        Ok(Self {
            name: name.into(),
            config,
            runs: 0,
            created_dirs: HashSet::new(),
        })
    }

    /// Create from params map (for factory)
    pub fn from_params(
        name: impl Into<String>,
        params: &HashMap<String, String>,
    ) -> std::io::Result<Self> {
        Self::new(name, FileSinkConfig::from_params(params))
    }

    /// Directory of the run currently being written
    pub fn run_dir(&self) -> PathBuf {
        let index = self.runs.saturating_sub(1);
        self.config.base_path.join(format!("run_{index}"))
    }

    fn write_event(&mut self, event: &EndpointEvent) -> std::io::Result<()> {
        if matches!(event, EndpointEvent::SimulationStarted { .. }) {
            self.runs += 1;
        }
        let run_dir = self.run_dir();

        match event {
            EndpointEvent::SimulationStarted { metadata } => {
                self.write_json(&run_dir, "metadata_started.json", metadata)
            }
            EndpointEvent::SensorRegistered { sensor } => {
                self.write_json(&run_dir.join("sensors"), &format!("{}.json", sensor.id), sensor)
            }
            EndpointEvent::AnnotationRegistered { definition } => self.write_json(
                &run_dir.join("annotations"),
                &format!("{}.json", definition.id),
                definition,
            ),
            EndpointEvent::MetricRegistered { definition } => self.write_json(
                &run_dir.join("metrics"),
                &format!("{}.json", definition.id),
                definition,
            ),
            EndpointEvent::FrameGenerated { capture } => {
                let label = capture
                    .sensor_id
                    .as_deref()
                    .unwrap_or(GLOBAL_CAPTURE_LABEL);
                self.write_json(
                    &run_dir.join(format!("sequence_{}", capture.sequence)),
                    &format!("step_{}_{}.json", capture.step, label),
                    capture,
                )
            }
            EndpointEvent::SimulationCompleted { metadata } => {
                self.write_json(&run_dir, "metadata_completed.json", metadata)
            }
        }
    }

    fn write_json<T: Serialize>(
        &mut self,
        dir: &Path,
        file_name: &str,
        value: &T,
    ) -> std::io::Result<()> {
        if !self.created_dirs.contains(dir) {
            fs::create_dir_all(dir)?;
            self.created_dirs.insert(dir.to_path_buf());
        }
        let writer = BufWriter::new(File::create(dir.join(file_name))?);
        let result = if self.config.pretty {
            serde_json::to_writer_pretty(writer, value)
        } else {
            serde_json::to_writer(writer, value)
        };
        result.map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    fn persist_event(&mut self, event: &EndpointEvent) -> Result<(), ContractError> {
        self.write_event(event).map_err(|e| {
            error!(sink = %self.name, event = event.kind(), error = %e, "Write failed");
            ContractError::sink_write(&self.name, e.to_string())
        })
    }
}

impl EventSink for FileSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "file_sink_write",
        skip(self, event),
        fields(sink = %self.name, event = event.kind())
    )]
    async fn write(&mut self, event: &EndpointEvent) -> Result<(), ContractError> {
        self.persist_event(event)
    }

    #[instrument(name = "file_sink_flush", skip(self))]
    async fn flush(&mut self) -> Result<(), ContractError> {
        Ok(())
    }

    #[instrument(name = "file_sink_close", skip(self))]
    async fn close(&mut self) -> Result<(), ContractError> {
        debug!(sink = %self.name, runs = self.runs, "FileSink closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::tests::frame;
    use contracts::{Capture, CaptureId, SimulationMetadata};
    use tempfile::tempdir;

    fn sink(dir: &Path) -> FileSink {
        let config = FileSinkConfig {
            base_path: dir.to_path_buf(),
            pretty: false,
        };
        FileSink::new("test_file", config).unwrap()
    }

    fn started() -> EndpointEvent {
        EndpointEvent::SimulationStarted {
            metadata: SimulationMetadata::new(),
        }
    }

    #[tokio::test]
    async fn test_file_sink_write_capture() {
        let dir = tempdir().unwrap();
        let mut sink = sink(dir.path());

        sink.write(&started()).await.unwrap();
        sink.write(&frame(3)).await.unwrap();
        sink.flush().await.unwrap();

        let path = dir.path().join("run_0/sequence_0/step_3_camera.json");
        let text = fs::read_to_string(path).unwrap();
        let capture: Capture = serde_json::from_str(&text).unwrap();
        assert_eq!(capture.step, 3);
        assert_eq!(capture.timestamp, 1.5);
    }

    #[tokio::test]
    async fn test_file_sink_global_capture_and_runs() {
        let dir = tempdir().unwrap();
        let mut sink = sink(dir.path());

        sink.write(&started()).await.unwrap();
        sink.write(&started()).await.unwrap();
        let global = EndpointEvent::FrameGenerated {
            capture: Capture::new(CaptureId::new(0), 2, 0, 0.0, None, None),
        };
        sink.write(&global).await.unwrap();

        assert!(dir.path().join("run_0/metadata_started.json").exists());
        assert!(dir.path().join("run_1/sequence_2/step_0_global.json").exists());
        assert_eq!(sink.run_dir(), dir.path().join("run_1"));
    }

    #[test]
    fn test_config_from_params() {
        let params = HashMap::from([
            ("base_path".to_string(), "/tmp/out".to_string()),
            ("pretty".to_string(), "true".to_string()),
        ]);
        let config = FileSinkConfig::from_params(&params);
        assert_eq!(config.base_path, PathBuf::from("/tmp/out"));
        assert!(config.pretty);

        let config = FileSinkConfig::from_params(&HashMap::new());
        assert_eq!(config.base_path, PathBuf::from("./output"));
        assert!(!config.pretty);
    }
}
