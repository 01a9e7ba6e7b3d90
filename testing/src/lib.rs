//! # Raffle Testing
//!
//! Deterministic test doubles for the raffle engine's environment seams.
//!
//! This crate provides:
//! - [`FixedClock`] and [`ManualClock`] for controlled time
//! - [`SeededRandom`] and [`ScriptedRandom`] for reproducible draws
//! - [`InMemoryEventStore`] with version checks and fault injection
//! - [`InMemoryEventBus`] that records publications and supports subscribers
//!
//! ## Example
//!
//! ```
//! use raffle_testing::{ManualClock, test_clock};
//! use raffle_core::environment::Clock;
//! use chrono::Duration;
//!
//! let clock = ManualClock::new(test_clock().now());
//! let start = clock.now();
//! clock.advance(Duration::minutes(16));
//! assert_eq!(clock.now() - start, Duration::minutes(16));
//! ```

mod clock;
mod event_bus;
mod event_store;
mod random;

/// Mock implementations of the environment traits.
pub mod mocks {
    pub use crate::clock::{FixedClock, ManualClock, test_clock};
    pub use crate::event_bus::InMemoryEventBus;
    pub use crate::event_store::InMemoryEventStore;
    pub use crate::random::{ScriptedRandom, SeededRandom};
}

// Re-export commonly used items
pub use mocks::*;
