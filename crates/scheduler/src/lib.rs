//! # Scheduler
//!
//! Tick scheduling for a stepped simulation.
//!
//! Responsible for:
//! - Sensor and ego registration (run-scoped handles)
//! - Choosing each tick's duration so it lands on the next render slot
//! - Deciding which sensors capture in the current tick
//! - Sequence restarts and time-scale latching
//!
//! ## Usage
//!
//! ```ignore
//! use scheduler::{Scheduler, SensorRegistry};
//!
//! let mut registry = SensorRegistry::new(RunId::default());
//! let ego = registry.register_ego("ego".into(), "test rig")?;
//! let cam = registry.register_sensor(&ego, definition)?;
//!
//! let mut scheduler = Scheduler::new(SchedulerConfig::default());
//! let plan = scheduler.tick(&mut registry, 1.0);
//! if plan.is_due(cam.id()) {
//!     // open a capture
//! }
//! ```

mod cadence;
mod registry;
mod scheduler;

pub use registry::{validate_cadence, EgoRecord, SensorRegistry, SensorState};
pub use scheduler::{Scheduler, TickPlan};

// Re-export contracts types
pub use contracts::{CaptureTriggerMode, SchedulerConfig, SensorDefinition, SensorSpec};
