//! Deterministic `DeterministicRng` implementations for tests.

use initiative_core::rng::DeterministicRng;

/// A no-op RNG that always returns `min` for `next_u32_range` and `0.0` for
/// `next_f64`.
#[derive(Debug, Default)]
pub struct MockRng;

impl DeterministicRng for MockRng {
    fn next_u32_range(&mut self, min: u32, _max: u32) -> u32 {
        min
    }

    fn next_f64(&mut self) -> f64 {
        0.0
    }
}

/// An RNG that returns values from a predetermined sequence, ignoring the
/// requested range. Panics once the sequence is exhausted unless it was built
/// with [`SequenceRng::cycle`].
#[derive(Debug)]
pub struct SequenceRng {
    values: Vec<u32>,
    index: usize,
    wrap: bool,
}

impl SequenceRng {
    /// Create a new `SequenceRng` with the given values.
    #[must_use]
    pub fn new(values: Vec<u32>) -> Self {
        Self {
            values,
            index: 0,
            wrap: false,
        }
    }

    /// Create a `SequenceRng` that starts over after the last value.
    #[must_use]
    pub fn cycle(values: Vec<u32>) -> Self {
        Self {
            values,
            index: 0,
            wrap: true,
        }
    }

    /// Number of values handed out so far.
    #[must_use]
    pub fn consumed(&self) -> usize {
        self.index
    }
}

impl DeterministicRng for SequenceRng {
    fn next_u32_range(&mut self, _min: u32, _max: u32) -> u32 {
        let slot = if self.wrap {
            self.index % self.values.len()
        } else {
            self.index
        };
        let val = self.values[slot];
        self.index += 1;
        val
    }

    fn next_f64(&mut self) -> f64 {
        0.0
    }
}
