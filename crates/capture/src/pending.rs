//! PendingWriteTable - open captures and their outstanding obligations

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use contracts::{
    Annotation, AnnotationId, Capture, CaptureId, ContractError, DefinitionId, EgoId, Metric,
    Payload, SensorId,
};
use tracing::{debug, trace};

use crate::future::{AsyncFuture, FutureCell, Slot, SlotKind};

/// A capture whose obligations are all resolved
#[derive(Debug, Clone, PartialEq)]
pub struct FinalizedCapture {
    pub capture: Capture,
    /// Tick in which the capture was opened
    pub opened_tick: u64,
}

/// A capture discarded with obligations still outstanding
#[derive(Debug, Clone, PartialEq)]
pub struct UnresolvedCapture {
    pub capture_id: CaptureId,
    pub sensor_id: Option<SensorId>,
    pub sequence: u64,
    pub step: u64,
    pub opened_tick: u64,
    pub unresolved: Vec<Slot>,
}

impl UnresolvedCapture {
    /// `sensor_id` as a display string (`-` for sensor-less captures)
    pub fn sensor_label(&self) -> &str {
        self.sensor_id.as_deref().unwrap_or("-")
    }
}

#[derive(Debug)]
struct OpenCapture {
    capture: Capture,
    opened_tick: u64,
    sensor_output_claimed: bool,
    /// Outstanding futures of this capture
    waiting: Vec<(Slot, Arc<FutureCell>)>,
}

impl OpenCapture {
    fn pending_count(&self) -> usize {
        self.waiting.len()
    }
}

#[derive(Debug, Default)]
pub(crate) struct TableInner {
    next_capture: u64,
    next_annotation: u64,
    open: BTreeMap<CaptureId, OpenCapture>,
}

impl TableInner {
    fn get_mut(&mut self, id: CaptureId) -> Result<&mut OpenCapture, ContractError> {
        self.open.get_mut(&id).ok_or(ContractError::CaptureClosed {
            capture_id: id.value(),
        })
    }

    /// Store a reported value and retire the matching obligation
    pub(crate) fn fill(
        &mut self,
        id: CaptureId,
        slot: Slot,
        value: Payload,
    ) -> Result<(), ContractError> {
        let open = self.get_mut(id)?;
        match slot.kind {
            SlotKind::SensorOutput => open.capture.sensor_output = Some(value),
            SlotKind::Annotation => {
                if let Some(annotation) = open.capture.annotations.get_mut(slot.index) {
                    annotation.value = value;
                }
            }
            SlotKind::Metric => {
                if let Some(metric) = open.capture.metrics.get_mut(slot.index) {
                    metric.value = value;
                }
            }
        }
        open.waiting.retain(|(waiting, _)| *waiting != slot);
        trace!(capture_id = %id, %slot, remaining = open.pending_count(), "Slot reported");
        Ok(())
    }
}

/// Captures opened but not yet handed to the endpoint
///
/// Shared between the scheduling thread and whatever threads resolve
/// futures; every mutation goes through one mutex. Capture ids increase
/// monotonically for the lifetime of the table. Dropping the table (a new
/// run builds a new one) invalidates every future it issued.
#[derive(Debug, Default)]
pub struct PendingWriteTable {
    inner: Arc<Mutex<TableInner>>,
}

impl PendingWriteTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, TableInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn future(&self, capture_id: CaptureId, slot: Slot, cell: Arc<FutureCell>) -> AsyncFuture {
        observability::record_future_issued(slot.kind.as_str());
        AsyncFuture::new(capture_id, slot, cell, Arc::downgrade(&self.inner))
    }

    /// Open a new capture
    pub fn open(
        &self,
        sequence: u64,
        step: u64,
        timestamp: f64,
        sensor_id: Option<SensorId>,
        ego_id: Option<EgoId>,
        opened_tick: u64,
    ) -> CaptureId {
        let mut inner = self.lock();
        let id = CaptureId::new(inner.next_capture);
        inner.next_capture += 1;

        let capture = Capture::new(id, sequence, step, timestamp, sensor_id, ego_id);
        observability::record_capture_opened(capture.sensor_label());
        debug!(capture_id = %id, sensor_id = capture.sensor_label(), sequence, step, timestamp, "Capture opened");
        inner.open.insert(
            id,
            OpenCapture {
                capture,
                opened_tick,
                sensor_output_claimed: false,
                waiting: Vec::new(),
            },
        );
        observability::record_pending_captures(inner.open.len());
        id
    }

    /// Attach the sensor output now
    pub fn set_sensor_output(&self, id: CaptureId, value: Payload) -> Result<(), ContractError> {
        let mut inner = self.lock();
        let open = inner.get_mut(id)?;
        claim_sensor_output(open, id)?;
        open.capture.sensor_output = Some(value);
        Ok(())
    }

    /// Promise the sensor output for later
    pub fn issue_sensor_output(&self, id: CaptureId) -> Result<AsyncFuture, ContractError> {
        let cell = FutureCell::new();
        {
            let mut inner = self.lock();
            let open = inner.get_mut(id)?;
            claim_sensor_output(open, id)?;
            open.waiting.push((Slot::sensor_output(), cell.clone()));
        }
        Ok(self.future(id, Slot::sensor_output(), cell))
    }

    /// Append an annotation with its value
    pub fn add_annotation(
        &self,
        id: CaptureId,
        definition_id: DefinitionId,
        sensor_id: SensorId,
        value: Payload,
    ) -> Result<AnnotationId, ContractError> {
        let mut inner = self.lock();
        let annotation_id = AnnotationId::new(inner.next_annotation);
        let open = inner.get_mut(id)?;
        open.capture.annotations.push(Annotation {
            id: annotation_id,
            definition_id,
            sensor_id,
            value,
        });
        inner.next_annotation += 1;
        Ok(annotation_id)
    }

    /// Append an annotation whose value arrives later
    pub fn issue_annotation(
        &self,
        id: CaptureId,
        definition_id: DefinitionId,
        sensor_id: SensorId,
    ) -> Result<(AnnotationId, AsyncFuture), ContractError> {
        let cell = FutureCell::new();
        let (annotation_id, slot) = {
            let mut inner = self.lock();
            let annotation_id = AnnotationId::new(inner.next_annotation);
            let open = inner.get_mut(id)?;
            let slot = Slot::annotation(open.capture.annotations.len());
            open.capture.annotations.push(Annotation {
                id: annotation_id,
                definition_id,
                sensor_id,
                value: Payload::Empty,
            });
            open.waiting.push((slot, cell.clone()));
            inner.next_annotation += 1;
            (annotation_id, slot)
        };
        Ok((annotation_id, self.future(id, slot, cell)))
    }

    /// Append a metric with its value
    pub fn add_metric(&self, id: CaptureId, metric: Metric) -> Result<(), ContractError> {
        let mut inner = self.lock();
        inner.get_mut(id)?.capture.metrics.push(metric);
        Ok(())
    }

    /// Append a metric whose value arrives later; `metric.value` is ignored
    pub fn issue_metric(&self, id: CaptureId, mut metric: Metric) -> Result<AsyncFuture, ContractError> {
        let cell = FutureCell::new();
        let slot = {
            let mut inner = self.lock();
            let open = inner.get_mut(id)?;
            let slot = Slot::metric(open.capture.metrics.len());
            metric.value = Payload::Empty;
            open.capture.metrics.push(metric);
            open.waiting.push((slot, cell.clone()));
            slot
        };
        Ok(self.future(id, slot, cell))
    }

    pub fn is_open(&self, id: CaptureId) -> bool {
        self.lock().open.contains_key(&id)
    }

    /// Outstanding futures of an open capture
    pub fn pending_count(&self, id: CaptureId) -> Option<usize> {
        self.lock().open.get(&id).map(OpenCapture::pending_count)
    }

    pub fn open_count(&self) -> usize {
        self.lock().open.len()
    }

    /// Remove every capture with no outstanding futures, in capture id order
    ///
    /// With `opened_before_tick`, captures opened in that tick or later stay
    /// open so producers can still add to them.
    pub fn take_ready(&self, opened_before_tick: Option<u64>) -> Vec<FinalizedCapture> {
        let mut inner = self.lock();
        let ready: Vec<CaptureId> = inner
            .open
            .iter()
            .filter(|(_, open)| open.pending_count() == 0)
            .filter(|(_, open)| opened_before_tick.is_none_or(|tick| open.opened_tick < tick))
            .map(|(id, _)| *id)
            .collect();

        let finalized: Vec<FinalizedCapture> = ready
            .into_iter()
            .filter_map(|id| inner.open.remove(&id))
            .map(|open| FinalizedCapture {
                capture: open.capture,
                opened_tick: open.opened_tick,
            })
            .collect();
        if !finalized.is_empty() {
            observability::record_pending_captures(inner.open.len());
        }
        finalized
    }

    /// Drop every open capture, invalidating its outstanding futures
    ///
    /// Returns the captures that still had obligations, in capture id order.
    /// Captures without obligations are dropped silently; flush them first.
    pub fn invalidate_all(&self) -> Vec<UnresolvedCapture> {
        let mut inner = self.lock();
        let open = std::mem::take(&mut inner.open);
        observability::record_pending_captures(0);

        open.into_values()
            .filter(|open| open.pending_count() > 0)
            .map(|open| {
                let unresolved = open
                    .waiting
                    .iter()
                    .filter(|(_, cell)| cell.invalidate())
                    .map(|(slot, _)| *slot)
                    .collect();
                UnresolvedCapture {
                    capture_id: open.capture.id,
                    sensor_id: open.capture.sensor_id,
                    sequence: open.capture.sequence,
                    step: open.capture.step,
                    opened_tick: open.opened_tick,
                    unresolved,
                }
            })
            .collect()
    }
}

fn claim_sensor_output(open: &mut OpenCapture, id: CaptureId) -> Result<(), ContractError> {
    if open.sensor_output_claimed {
        return Err(ContractError::SlotAlreadyFilled {
            capture_id: id.value(),
            slot: Slot::sensor_output().to_string(),
        });
    }
    open.sensor_output_claimed = true;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FutureState;
    use serde_json::json;
    use std::thread;

    fn open_camera(table: &PendingWriteTable, step: u64, tick: u64) -> CaptureId {
        table.open(0, step, step as f64, Some("cam".into()), Some("ego".into()), tick)
    }

    #[test]
    fn test_capture_ids_are_monotonic() {
        let table = PendingWriteTable::new();
        let a = open_camera(&table, 0, 0);
        let b = open_camera(&table, 0, 0);
        assert!(b > a);
        assert_eq!(table.open_count(), 2);
    }

    #[test]
    fn test_sync_sensor_output_twice_fails() {
        let table = PendingWriteTable::new();
        let id = open_camera(&table, 0, 0);
        table.set_sensor_output(id, Payload::from(vec![1.0])).unwrap();

        let err = table.set_sensor_output(id, Payload::from(vec![2.0])).unwrap_err();
        assert!(matches!(err, ContractError::SlotAlreadyFilled { .. }));
        assert!(table.issue_sensor_output(id).is_err());

        let ready = table.take_ready(None);
        assert_eq!(ready[0].capture.sensor_output, Some(Payload::from(vec![1.0])));
    }

    #[test]
    fn test_double_report_keeps_first_value() {
        let table = PendingWriteTable::new();
        let id = open_camera(&table, 0, 0);
        let future = table.issue_sensor_output(id).unwrap();
        assert!(future.is_pending());

        future.report(json!({ "frame": 1 })).unwrap();
        let err = future.clone().report(json!({ "frame": 2 })).unwrap_err();
        assert!(matches!(err, ContractError::AlreadyReported { .. }));
        assert_eq!(future.state(), FutureState::Reported);

        let ready = table.take_ready(None);
        assert_eq!(
            ready[0].capture.sensor_output,
            Some(Payload::Json(json!({ "frame": 1 })))
        );
    }

    #[test]
    fn test_pending_capture_is_held_back() {
        let table = PendingWriteTable::new();
        let id = open_camera(&table, 0, 0);
        let (_, future) = table
            .issue_annotation(id, "boxes".into(), "cam".into())
            .unwrap();

        assert_eq!(table.pending_count(id), Some(1));
        assert!(table.take_ready(None).is_empty());

        future.report(json!([[0, 0, 10, 10]])).unwrap();
        assert_eq!(table.pending_count(id), Some(0));
        let ready = table.take_ready(None);
        assert_eq!(ready.len(), 1);
        assert_eq!(
            ready[0].capture.annotations[0].value,
            Payload::Json(json!([[0, 0, 10, 10]]))
        );
    }

    #[test]
    fn test_take_ready_respects_tick_and_order() {
        let table = PendingWriteTable::new();
        let slow = open_camera(&table, 0, 0);
        let future = table.issue_sensor_output(slow).unwrap();
        let fast = open_camera(&table, 1, 1);
        let current = open_camera(&table, 2, 2);

        let ready = table.take_ready(Some(2));
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].capture.id, fast);
        assert!(table.is_open(current));

        future.report(Payload::Empty).unwrap();
        let ids: Vec<_> = table.take_ready(None).into_iter().map(|f| f.capture.id).collect();
        assert_eq!(ids, vec![slow, current]);
    }

    #[test]
    fn test_invalidate_all_reports_unresolved() {
        let table = PendingWriteTable::new();
        let done = open_camera(&table, 0, 0);
        let waiting = open_camera(&table, 1, 1);
        let future = table.issue_sensor_output(waiting).unwrap();
        let metric = table
            .issue_metric(
                waiting,
                Metric {
                    definition_id: "latency".into(),
                    sensor_id: None,
                    annotation_id: None,
                    value: Payload::Empty,
                },
            )
            .unwrap();
        metric.report(vec![3.0]).unwrap();

        let unresolved = table.invalidate_all();
        assert_eq!(unresolved.len(), 1);
        assert_eq!(unresolved[0].capture_id, waiting);
        assert_eq!(unresolved[0].unresolved, vec![Slot::sensor_output()]);
        assert!(!table.is_open(done));

        assert!(!future.is_valid());
        assert!(matches!(
            future.report(Payload::Empty),
            Err(ContractError::FutureInvalidated { .. })
        ));
        // Already resolved futures keep their state
        assert_eq!(metric.state(), FutureState::Reported);
    }

    #[test]
    fn test_dropped_table_invalidates_futures() {
        let table = PendingWriteTable::new();
        let id = open_camera(&table, 0, 0);
        let future = table.issue_sensor_output(id).unwrap();

        drop(table);
        assert!(!future.is_valid());
        assert!(matches!(
            future.report(Payload::Empty),
            Err(ContractError::FutureInvalidated { .. })
        ));
    }

    #[test]
    fn test_report_from_other_threads() {
        let table = PendingWriteTable::new();
        let id = open_camera(&table, 0, 0);
        let futures: Vec<_> = (0..8)
            .map(|_| table.issue_metric(id, metric("m")).unwrap())
            .collect();

        let handles: Vec<_> = futures
            .into_iter()
            .enumerate()
            .map(|(i, future)| thread::spawn(move || future.report(vec![i as f64])))
            .collect();
        for handle in handles {
            handle.join().unwrap().unwrap();
        }

        let ready = table.take_ready(None);
        let values: Vec<_> = ready[0].capture.metrics.iter().map(|m| m.value.clone()).collect();
        for (i, value) in values.into_iter().enumerate() {
            assert_eq!(value, Payload::from(vec![i as f64]));
        }
    }

    #[test]
    fn test_closed_capture_rejects_reports() {
        let table = PendingWriteTable::new();
        let id = open_camera(&table, 0, 0);
        table.take_ready(None);

        let err = table.add_metric(id, metric("m")).unwrap_err();
        assert!(matches!(err, ContractError::CaptureClosed { .. }));
    }

    fn metric(definition: &str) -> Metric {
        Metric {
            definition_id: definition.into(),
            sensor_id: None,
            annotation_id: None,
            value: Payload::Empty,
        }
    }
}
