//! Capabilities injected into the MAC: the event scheduler that drives the
//! passage of time and the randomness source behind every protocol draw.
//! Both are contracts only; the deterministic implementations used by tests
//! and the CLI live in [`crate::sim`] and here.

use rand::{rngs::SmallRng, Rng, SeedableRng};
use std::time::Duration;

/// A scheduled callback. Events re-enter the MAC through a weak reference,
/// so a handle never keeps a station alive.
pub type EventFn = Box<dyn FnOnce()>;

/// Identifies a scheduled event so it can be cancelled and replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventHandle(pub u64);

/// The discrete-event scheduler consumed by the MAC. Timestamps are absolute
/// (measured from the scheduler's epoch); events with equal timestamps run
/// in insertion order.
pub trait Scheduler {
    fn now(&self) -> Duration;
    fn schedule(&self, at: Duration, event: EventFn) -> EventHandle;
    fn cancel(&self, handle: EventHandle);
}

/// Uniform randomness consumed by slot selection, network entry and the
/// reservation timeout draw.
pub trait RandomSource {
    /// A uniform draw from `[0, 1)`.
    fn uniform(&mut self) -> f64;
    /// A uniform integer draw from `[low, high]`.
    fn uniform_int(&mut self, low: u32, high: u32) -> u32;
}

/// Default [`RandomSource`] backed by a seedable [`SmallRng`].
pub struct SmallRngSource(SmallRng);

impl SmallRngSource {
    pub fn seeded(seed: u64) -> Self {
        Self(SmallRng::seed_from_u64(seed))
    }
}

impl RandomSource for SmallRngSource {
    fn uniform(&mut self) -> f64 {
        self.0.gen::<f64>()
    }

    fn uniform_int(&mut self, low: u32, high: u32) -> u32 {
        self.0.gen_range(low..=high)
    }
}

/// Plays back pre-arranged draws and falls back to the lowest admissible
/// value once the script runs out. Deterministic scenarios are written
/// against this source; production stations use [`SmallRngSource`].
#[derive(Default)]
pub struct ScriptedRandom {
    floats: std::collections::VecDeque<f64>,
    ints: std::collections::VecDeque<u32>,
}

impl ScriptedRandom {
    pub fn with_floats(floats: Vec<f64>) -> Self {
        Self {
            floats: floats.into(),
            ints: Default::default(),
        }
    }

    pub fn with_ints(ints: Vec<u32>) -> Self {
        Self {
            floats: Default::default(),
            ints: ints.into(),
        }
    }

    pub fn with_draws(floats: Vec<f64>, ints: Vec<u32>) -> Self {
        Self {
            floats: floats.into(),
            ints: ints.into(),
        }
    }
}

impl RandomSource for ScriptedRandom {
    fn uniform(&mut self) -> f64 {
        self.floats.pop_front().unwrap_or(0.0)
    }

    fn uniform_int(&mut self, low: u32, high: u32) -> u32 {
        self.ints
            .pop_front()
            .map(|value| value.clamp(low, high))
            .unwrap_or(low)
    }
}
