//! Types of the producer-facing reporting API.

use capture::{AsyncFuture, UnresolvedCapture};
use contracts::{AnnotationRef, RunId, SensorHandle};
use observability::MetricsSummary;
use scheduler::TickPlan;

/// What a metric is attached to
#[derive(Debug, Clone, Copy)]
pub enum MetricScope<'a> {
    /// The tick as a whole; lands in a sensor-less capture
    Global,
    /// The sensor's capture in the current tick
    Sensor(&'a SensorHandle),
    /// A reported annotation; lands in that annotation's capture
    Annotation(&'a AnnotationRef),
}

/// An annotation whose value is reported later
#[derive(Debug, Clone)]
pub struct AsyncAnnotation {
    /// Usable right away, e.g. to scope metrics to the annotation
    pub annotation: AnnotationRef,
    pub future: AsyncFuture,
}

/// Result of one controller tick
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    pub run: RunId,
    pub sequence: u64,
    /// Step shared by captures opened in this tick, if any were opened
    pub step: Option<u64>,
    /// Scaled sequence time after this tick
    pub timestamp: f64,
    pub plan: TickPlan,
}

impl TickReport {
    pub fn is_due(&self, sensor_id: &str) -> bool {
        self.plan.is_due(sensor_id)
    }

    pub fn delta_time(&self) -> f64 {
        self.plan.delta_time
    }
}

/// What a reset flushed and discarded
#[derive(Debug, Clone, Default)]
pub struct ResetSummary {
    /// Run that was completed
    pub run: RunId,
    /// Captures handed to the endpoint during the run
    pub total_frames: u64,
    /// Sequences that produced at least one capture
    pub total_sequences: u64,
    /// Captures flushed by the reset itself
    pub flushed: usize,
    /// Captures dropped with unresolved futures
    pub discarded: Vec<UnresolvedCapture>,
    /// Tick and capture statistics of the run
    pub metrics: MetricsSummary,
}

impl ResetSummary {
    pub fn is_clean(&self) -> bool {
        self.discarded.is_empty()
    }
}
