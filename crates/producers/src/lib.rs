//! # Producers
//!
//! Ready-made [`Producer`](controller::Producer)s for a simulation runner.
//!
//! Responsibilities:
//! - Report sensor output for every capture of a sensor
//! - Report annotations and metrics alongside those captures
//! - Resolve deferred reports on background threads (simulated GPU readback)
//! - Build all of the above from a `ScenarioBlueprint`
//!
//! ## Usage Example
//!
//! ```ignore
//! use controller::{RunPlan, SimulationRunner};
//! use producers::RigBuilder;
//!
//! let rig = RigBuilder::new(&blueprint).build(&mut controller)?;
//! let mut runner = SimulationRunner::new(controller);
//! for producer in rig.into_producers() {
//!     runner.add_producer(producer);
//! }
//! runner.run(RunPlan { ticks_per_sequence: 100, sequences: 2 })?;
//! ```

mod labeler;
mod readback;
mod rig;
mod sensor_output;
pub mod synthetic;

pub use labeler::Labeler;
pub use readback::{latency, ReadbackJob, ReadbackMetrics, ReadbackSnapshot, ReadbackWorker};
pub use rig::{ReadbackSettings, Rig, RigBuilder, RigSensor};
pub use sensor_output::SensorOutputProducer;
