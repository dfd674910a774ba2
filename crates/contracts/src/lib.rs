//! # Contracts
//!
//! Frozen interface contracts, defining inter-module data structures and traits.
//! All business crates can only depend on this crate, reverse dependencies are prohibited.
//!
//! ## Time Model
//! - Simulated seconds (f64) on a single logical timeline advanced by ticks
//! - `(sequence, step)` label captures for output; `CaptureId` identifies them internally

mod blueprint;
mod capture;
mod definition;
mod endpoint;
mod error;
mod handle;
mod id;
mod metadata;
mod payload;
mod scheduler_config;
mod sink;

pub use blueprint::*;
pub use capture::*;
pub use definition::*;
pub use endpoint::*;
pub use error::*;
pub use handle::*;
pub use id::{DefinitionId, EgoId, SensorId};
pub use metadata::SimulationMetadata;
pub use payload::Payload;
pub use scheduler_config::*;
pub use sink::*;
