//! Write-once futures for late reports.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use contracts::{CaptureId, ContractError, Payload};

use crate::pending::TableInner;

/// Which part of a capture a future fills
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotKind {
    SensorOutput,
    Annotation,
    Metric,
}

impl SlotKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SensorOutput => "sensor_output",
            Self::Annotation => "annotation",
            Self::Metric => "metric",
        }
    }
}

/// A slot inside one capture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Slot {
    pub kind: SlotKind,
    /// Position in `annotations`/`metrics`; 0 for the sensor output
    pub index: usize,
}

impl Slot {
    pub(crate) fn sensor_output() -> Self {
        Self {
            kind: SlotKind::SensorOutput,
            index: 0,
        }
    }

    pub(crate) fn annotation(index: usize) -> Self {
        Self {
            kind: SlotKind::Annotation,
            index,
        }
    }

    pub(crate) fn metric(index: usize) -> Self {
        Self {
            kind: SlotKind::Metric,
            index,
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            SlotKind::SensorOutput => f.write_str("sensor_output"),
            kind => write!(f, "{}[{}]", kind.as_str(), self.index),
        }
    }
}

/// Lifecycle of an [`AsyncFuture`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FutureState {
    Pending,
    Reported,
    Invalidated,
}

const PENDING: u8 = 0;
const REPORTED: u8 = 1;
const INVALIDATED: u8 = 2;

#[derive(Debug)]
pub(crate) struct FutureCell(AtomicU8);

impl FutureCell {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self(AtomicU8::new(PENDING)))
    }

    pub(crate) fn state(&self) -> FutureState {
        match self.0.load(Ordering::Acquire) {
            PENDING => FutureState::Pending,
            REPORTED => FutureState::Reported,
            _ => FutureState::Invalidated,
        }
    }

    /// Pending -> Reported; returns the state found otherwise
    pub(crate) fn resolve(&self) -> Result<(), FutureState> {
        self.0
            .compare_exchange(PENDING, REPORTED, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|found| match found {
                REPORTED => FutureState::Reported,
                _ => FutureState::Invalidated,
            })
    }

    /// Pending -> Invalidated; returns whether the cell was still pending
    pub(crate) fn invalidate(&self) -> bool {
        self.0
            .compare_exchange(PENDING, INVALIDATED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// Promise to report a value into one slot of one capture later
///
/// Bound to the capture's [`CaptureId`], never to `(sequence, step)`, so it
/// resolves into the right capture however many ticks or sequence restarts
/// happen in between. `report` may be called from any thread. Clones share
/// the same state, so only one of them can report.
#[derive(Debug, Clone)]
pub struct AsyncFuture {
    capture_id: CaptureId,
    slot: Slot,
    cell: Arc<FutureCell>,
    table: Weak<Mutex<TableInner>>,
}

impl AsyncFuture {
    pub(crate) fn new(
        capture_id: CaptureId,
        slot: Slot,
        cell: Arc<FutureCell>,
        table: Weak<Mutex<TableInner>>,
    ) -> Self {
        Self {
            capture_id,
            slot,
            cell,
            table,
        }
    }

    pub fn capture_id(&self) -> CaptureId {
        self.capture_id
    }

    pub fn slot(&self) -> Slot {
        self.slot
    }

    pub fn state(&self) -> FutureState {
        if self.table.strong_count() == 0 && self.cell.state() == FutureState::Pending {
            return FutureState::Invalidated;
        }
        self.cell.state()
    }

    /// False once the run that issued the future has been reset
    pub fn is_valid(&self) -> bool {
        self.state() != FutureState::Invalidated
    }

    pub fn is_pending(&self) -> bool {
        self.state() == FutureState::Pending
    }

    /// Deliver the value
    ///
    /// # Errors
    /// - `AlreadyReported` on a second call (the first value is kept)
    /// - `FutureInvalidated` after the issuing run was reset
    pub fn report(&self, value: impl Into<Payload>) -> Result<(), ContractError> {
        let Some(table) = self.table.upgrade() else {
            return Err(self.invalidated());
        };
        let mut inner = table.lock().unwrap_or_else(PoisonError::into_inner);

        let result = match self.cell.resolve() {
            Ok(()) => inner.fill(self.capture_id, self.slot, value.into()),
            Err(FutureState::Reported) => Err(ContractError::AlreadyReported {
                capture_id: self.capture_id.value(),
                slot: self.slot.to_string(),
            }),
            Err(_) => Err(self.invalidated()),
        };
        drop(inner);

        observability::record_future_resolved(self.slot.kind.as_str(), result.is_ok());
        result
    }

    fn invalidated(&self) -> ContractError {
        ContractError::FutureInvalidated {
            capture_id: self.capture_id.value(),
            slot: self.slot.to_string(),
        }
    }
}
