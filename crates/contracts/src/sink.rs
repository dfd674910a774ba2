//! EventSink trait - Dispatcher output interface
//!
//! Async counterpart of [`Endpoint`](crate::Endpoint) for sinks that run on
//! their own worker task.

use crate::{ContractError, EndpointEvent};

/// Async event output
///
/// All sink implementations must implement this trait.
#[trait_variant::make(EventSink: Send)]
pub trait LocalEventSink {
    /// Sink name (used for logging/metrics)
    fn name(&self) -> &str;

    /// Write one endpoint event
    ///
    /// # Errors
    /// Returns write error (should include context)
    async fn write(&mut self, event: &EndpointEvent) -> Result<(), ContractError>;

    /// Flush buffer (if any)
    async fn flush(&mut self) -> Result<(), ContractError>;

    /// Close sink
    async fn close(&mut self) -> Result<(), ContractError>;
}
