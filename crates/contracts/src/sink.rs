//! EventSink trait - Dispatcher output interface
//!
//! Defines the abstract interface for remote sinks.

use crate::{ContractError, Event};

/// Remote event store
///
/// All sink implementations must implement this trait.
#[trait_variant::make(EventSink: Send)]
pub trait LocalEventSink {
    /// Sink name (used for logging/metrics)
    fn name(&self) -> &str;

    /// Deliver one event
    ///
    /// `Ok(())` means the remote side acknowledged durable storage.
    ///
    /// # Errors
    /// Returns delivery or connection error (should include context)
    async fn deliver(&mut self, event: &Event) -> Result<(), ContractError>;

    /// Close sink
    async fn close(&mut self) -> Result<(), ContractError>;
}
