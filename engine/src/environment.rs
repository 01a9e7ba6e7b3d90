//! Injected dependencies shared by every engine component.

use crate::payment::PaymentProcessor;
use raffle_core::environment::{Clock, RandomSource};
use raffle_core::event_bus::EventBus;
use raffle_core::event_store::EventStore;
use std::sync::Arc;

/// Environment dependencies for the engine
#[derive(Clone)]
pub struct EngineEnvironment {
    /// Clock for timestamps and expiry
    pub clock: Arc<dyn Clock>,
    /// Randomness for the draw
    pub random: Arc<dyn RandomSource>,
    /// Event store for persistence
    pub event_store: Arc<dyn EventStore>,
    /// Event bus for notifications
    pub event_bus: Arc<dyn EventBus>,
    /// Payment collaborator
    pub payments: Arc<dyn PaymentProcessor>,
}

impl EngineEnvironment {
    /// Creates a new `EngineEnvironment`
    #[must_use]
    pub fn new(
        clock: Arc<dyn Clock>,
        random: Arc<dyn RandomSource>,
        event_store: Arc<dyn EventStore>,
        event_bus: Arc<dyn EventBus>,
        payments: Arc<dyn PaymentProcessor>,
    ) -> Self {
        Self {
            clock,
            random,
            event_store,
            event_bus,
            payments,
        }
    }
}
