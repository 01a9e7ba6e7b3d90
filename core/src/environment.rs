//! Dependency injection seams for time and randomness.
//!
//! Production code wires [`SystemClock`] and [`OsRandom`]; tests substitute the
//! deterministic doubles from `raffle-testing`.

use chrono::{DateTime, Utc};
use rand::Rng;
use rand::rngs::OsRng;

/// Clock trait - abstracts time operations for testability
///
/// # Examples
///
/// ```
/// use raffle_core::environment::{Clock, SystemClock};
///
/// let clock = SystemClock;
/// let before = clock.now();
/// assert!(clock.now() >= before);
/// ```
pub trait Clock: Send + Sync {
    /// Get the current time
    fn now(&self) -> DateTime<Utc>;
}

/// System clock backed by [`Utc::now`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Source of uniform randomness for winner selection.
///
/// Implementations must be unbiased over `0..upper`. The production
/// implementation draws from the operating system CSPRNG; a fixed-seed
/// implementation is substituted in tests so draws are reproducible.
pub trait RandomSource: Send + Sync {
    /// Pick an index uniformly from `0..upper`.
    ///
    /// Returns `0` when `upper <= 1`; callers are expected to check for an
    /// empty candidate set before drawing.
    fn pick_index(&self, upper: usize) -> usize;

    /// Stable identifier of the selection method, stored on every draw so it
    /// can be checked later against the published draw procedure.
    fn method(&self) -> &'static str;
}

/// Operating-system CSPRNG (`getrandom`) with rejection-sampled uniform ranges.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsRandom;

impl OsRandom {
    /// Method identifier recorded on draws made with this source.
    pub const METHOD: &'static str = "os-csprng-uniform-v1";
}

impl RandomSource for OsRandom {
    fn pick_index(&self, upper: usize) -> usize {
        if upper <= 1 {
            return 0;
        }
        OsRng.gen_range(0..upper)
    }

    fn method(&self) -> &'static str {
        Self::METHOD
    }
}
