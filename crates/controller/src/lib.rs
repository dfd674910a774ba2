//! # Controller
//!
//! Top-level orchestration of a capture simulation.
//!
//! Responsible for:
//! - Run lifecycle (`Uninitialized -> Running -> Resetting -> Uninitialized`)
//! - Opening one capture per due sensor each tick and sharing steps per tick
//! - The producer-facing reporting API (sync and async)
//! - Handing complete captures to the [`Endpoint`](contracts::Endpoint)
//! - Sequence restarts and full resets
//!
//! ## Usage
//!
//! ```ignore
//! use controller::{SimulationController, MetricScope};
//!
//! let mut controller = SimulationController::new(SchedulerConfig::default(), endpoint);
//! let ego = controller.register_ego("test rig")?;
//! let cam = controller.register_sensor(&ego, SensorSpec::scheduled("camera", 0.1))?;
//!
//! let tick = controller.tick()?;
//! if tick.is_due(cam.id()) {
//!     let readback = controller.report_sensor_async(&cam)?;
//!     // resolved later, e.g. from a GPU readback thread
//!     readback.report(pixels)?;
//! }
//! controller.reset_simulation()?;
//! ```

mod controller;
mod report;
mod runner;
mod state;

pub use controller::SimulationController;
pub use report::{AsyncAnnotation, MetricScope, ResetSummary, TickReport};
pub use runner::{Producer, RunOutcome, RunPlan, SimulationRunner};
pub use state::ExecutionState;

// Re-export types producers need alongside the controller
pub use capture::{AsyncFuture, FutureState};
pub use scheduler::TickPlan;
