//! # Capture
//!
//! Bookkeeping for captures between the tick that opens them and the moment
//! they are handed to an endpoint.
//!
//! - [`PendingWriteTable`]: open captures keyed by a stable [`CaptureId`],
//!   with outstanding report obligations
//! - [`AsyncFuture`]: write-once promise for one slot of one capture,
//!   reportable from any thread
//! - [`DefinitionRegistry`]: run-scoped id namespace with `_N` suffixing
//!
//! ## Usage
//!
//! ```ignore
//! let table = PendingWriteTable::new();
//! let id = table.open(sequence, step, timestamp, Some(sensor_id), Some(ego_id), tick);
//! let future = table.issue_sensor_output(id)?;
//!
//! // later, possibly on another thread
//! future.report(payload)?;
//!
//! for done in table.take_ready(None) {
//!     endpoint.frame_generated(done.capture)?;
//! }
//! ```

mod definitions;
mod future;
mod pending;

pub use definitions::DefinitionRegistry;
pub use future::{AsyncFuture, FutureState, Slot, SlotKind};
pub use pending::{FinalizedCapture, PendingWriteTable, UnresolvedCapture};

// Re-export contracts types
pub use contracts::{CaptureId, Payload};
