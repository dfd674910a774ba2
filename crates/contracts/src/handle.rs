//! Handles returned by registration
//!
//! A handle is only meaningful inside the run that issued it. Each reset
//! starts a new [`RunId`], so handles from earlier runs stop validating.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{EgoId, SensorId};

/// Generation counter of a simulation run
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct RunId(u64);

impl RunId {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(self) -> u64 {
        self.0
    }

    /// The run that follows this one
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "run-{}", self.0)
    }
}

/// Handle to a registered ego
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EgoHandle {
    id: EgoId,
    run: RunId,
}

impl EgoHandle {
    pub fn new(id: EgoId, run: RunId) -> Self {
        Self { id, run }
    }

    pub fn id(&self) -> &EgoId {
        &self.id
    }

    pub fn run(&self) -> RunId {
        self.run
    }
}

/// Handle to a registered sensor
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SensorHandle {
    id: SensorId,
    ego: EgoId,
    run: RunId,
}

impl SensorHandle {
    pub fn new(id: SensorId, ego: EgoId, run: RunId) -> Self {
        Self { id, ego, run }
    }

    pub fn id(&self) -> &SensorId {
        &self.id
    }

    pub fn ego(&self) -> &EgoId {
        &self.ego
    }

    pub fn run(&self) -> RunId {
        self.run
    }
}
