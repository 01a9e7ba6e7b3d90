//! Deterministic randomness for draw tests.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use raffle_core::environment::RandomSource;
use std::collections::VecDeque;
use std::sync::Mutex;

/// Fixed-seed pseudo-random source.
///
/// Two instances built from the same seed produce the same sequence of
/// picks, which makes draw outcomes reproducible in tests.
#[derive(Debug)]
pub struct SeededRandom {
    rng: Mutex<StdRng>,
}

impl SeededRandom {
    /// Method identifier recorded on draws made with this source.
    pub const METHOD: &'static str = "seeded-test-v1";

    /// Create a source from a seed.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl RandomSource for SeededRandom {
    fn pick_index(&self, upper: usize) -> usize {
        if upper <= 1 {
            return 0;
        }
        self.rng.lock().unwrap().gen_range(0..upper)
    }

    fn method(&self) -> &'static str {
        Self::METHOD
    }
}

/// Source that replays a scripted list of indices (each taken modulo the
/// requested range), then repeats the last one.
#[derive(Debug)]
pub struct ScriptedRandom {
    picks: Mutex<VecDeque<usize>>,
    last: Mutex<usize>,
}

impl ScriptedRandom {
    /// Method identifier recorded on draws made with this source.
    pub const METHOD: &'static str = "scripted-test-v1";

    /// Replay `picks` in order.
    #[must_use]
    pub fn new(picks: impl IntoIterator<Item = usize>) -> Self {
        Self {
            picks: Mutex::new(picks.into_iter().collect()),
            last: Mutex::new(0),
        }
    }

    /// Always pick `index`.
    #[must_use]
    pub fn always(index: usize) -> Self {
        Self::new([index])
    }
}

impl RandomSource for ScriptedRandom {
    fn pick_index(&self, upper: usize) -> usize {
        if upper <= 1 {
            return 0;
        }
        let mut last = self.last.lock().unwrap();
        if let Some(next) = self.picks.lock().unwrap().pop_front() {
            *last = next;
        }
        *last % upper
    }

    fn method(&self) -> &'static str {
        Self::METHOD
    }
}
