//! Controller lifecycle

use std::fmt;

/// Lifecycle of a [`SimulationController`](crate::SimulationController)
///
/// `Uninitialized -> Running -> Resetting -> Uninitialized`, with `Disposed`
/// terminal. A run starts implicitly on the first registration or tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionState {
    #[default]
    Uninitialized,
    Running,
    Resetting,
    Disposed,
}

impl ExecutionState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Running => "running",
            Self::Resetting => "resetting",
            Self::Disposed => "disposed",
        }
    }
}

impl fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
