//! # Raffle Core
//!
//! Core traits and types shared by every component of the raffle engine.
//!
//! The engine keeps all I/O and nondeterminism behind traits that are injected
//! through an environment struct, so the business logic stays deterministic
//! under test:
//!
//! - **Clock**: wall-clock time ([`environment::Clock`])
//! - **Randomness**: the draw's entropy source ([`environment::RandomSource`])
//! - **Event store**: append-only, versioned event streams ([`event_store::EventStore`])
//! - **Event bus**: fan-out of committed events to subscribers such as the
//!   notification dispatcher ([`event_bus::EventBus`])
//!
//! ## Example
//!
//! ```
//! use raffle_core::environment::{Clock, SystemClock};
//!
//! let clock = SystemClock;
//! let now = clock.now();
//! assert!(now.timestamp() > 0);
//! ```

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use serde::{Deserialize, Serialize};

pub mod environment;
pub mod event;
pub mod event_bus;
pub mod event_store;
pub mod stream;
