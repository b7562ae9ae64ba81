//! Total-energy history and the stabilization score derived from it.

use std::collections::VecDeque;

/// Mean energies below this count as a system at rest.
const REST_ENERGY: f64 = 1e-12;

/// Rolling history of the total energy of the system, one sample per step.
#[derive(Debug, Clone)]
pub struct Energies {
    capacity: usize,
    samples: VecDeque<f32>,
    accumulator: f32,
}

impl Energies {
    /// Create an empty history holding at most `capacity` samples.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            samples: VecDeque::with_capacity(capacity),
            accumulator: 0.0,
        }
    }

    /// Add to the energy of the step in progress.
    pub fn accumulate(&mut self, energy: f32) {
        self.accumulator += energy;
    }

    /// Close the step in progress: push its energy, evicting the oldest
    /// sample when full.
    pub fn store(&mut self) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(self.accumulator);
        self.accumulator = 0.0;
    }

    /// Energy of the last stored step.
    pub fn energy(&self) -> f32 {
        self.samples.back().copied().unwrap_or(0.0)
    }

    /// Energy stored `steps_back` steps before the last one, if still held.
    pub fn previous(&self, steps_back: usize) -> Option<f32> {
        let index = self.samples.len().checked_sub(steps_back + 1)?;
        self.samples.get(index).copied()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_full(&self) -> bool {
        self.samples.len() == self.capacity
    }

    /// Forget every sample, e.g. after an explicit reposition.
    pub fn clear(&mut self) {
        self.samples.clear();
        self.accumulator = 0.0;
    }

    /// Convergence score in `[0, 1]`.
    ///
    /// `1.0` until the history is full. Afterwards the coefficient of
    /// variation of the held samples, clamped: it shrinks toward `0.0` as the
    /// energy stops changing.
    pub fn stabilization(&self) -> f64 {
        if !self.is_full() {
            return 1.0;
        }

        let n = self.samples.len() as f64;
        let mean = self.samples.iter().map(|&e| e as f64).sum::<f64>() / n;
        if mean.abs() < REST_ENERGY {
            return 0.0;
        }

        let variance = self
            .samples
            .iter()
            .map(|&e| (e as f64 - mean).powi(2))
            .sum::<f64>()
            / n;

        (variance.sqrt() / mean.abs()).clamp(0.0, 1.0)
    }
}

impl Default for Energies {
    fn default() -> Self {
        Self::new(256)
    }
}
