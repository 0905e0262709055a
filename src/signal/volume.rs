use std::collections::VecDeque;

use super::bands::LevelsVector;

pub const DEFAULT_VOLUME_SMOOTHING: f32 = 0.2;
pub const DEFAULT_HISTORY_LEN: usize = 256;

/// Fixed-capacity FIFO, newest value at the front.
#[derive(Debug, Clone, PartialEq)]
pub struct History {
    values: VecDeque<f32>,
}

impl History {
    /// Starts full of zeros so readers always see `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            values: std::iter::repeat(0.0).take(capacity).collect(),
        }
    }

    pub fn push(&mut self, value: f32) {
        self.values.pop_back();
        self.values.push_front(value);
    }

    pub fn newest(&self) -> f32 {
        self.values.front().copied().unwrap_or(0.0)
    }

    pub fn capacity(&self) -> usize {
        self.values.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = f32> + '_ {
        self.values.iter().copied()
    }

    fn reset(&mut self) {
        self.values.iter_mut().for_each(|v| *v = 0.0);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VolumeState {
    pub instant: f32,
    pub smoothed: f32,
    pub instant_history: History,
    pub smoothed_history: History,
}

impl VolumeState {
    pub fn new(history_len: usize) -> Self {
        Self {
            instant: 0.0,
            smoothed: 0.0,
            instant_history: History::new(history_len),
            smoothed_history: History::new(history_len),
        }
    }
}

/// Mean band level plus a one-pole low-pass of it.
#[derive(Debug, Clone)]
pub struct VolumeTracker {
    coefficient: f32,
    state: VolumeState,
}

impl VolumeTracker {
    pub fn new(coefficient: f32, history_len: usize) -> Self {
        Self {
            coefficient: coefficient.clamp(0.0, 1.0),
            state: VolumeState::new(history_len),
        }
    }

    pub fn coefficient(&self) -> f32 {
        self.coefficient
    }

    pub fn set_coefficient(&mut self, coefficient: f32) {
        self.coefficient = coefficient.clamp(0.0, 1.0);
    }

    pub fn update(&mut self, levels: &LevelsVector) -> &VolumeState {
        let state = &mut self.state;
        state.instant = levels.mean();
        state.smoothed += (state.instant - state.smoothed) * self.coefficient;
        state.instant_history.push(state.instant);
        state.smoothed_history.push(state.smoothed);
        &self.state
    }

    pub fn state(&self) -> &VolumeState {
        &self.state
    }

    /// Zero both volumes and both histories.
    pub fn reset(&mut self) {
        self.state.instant = 0.0;
        self.state.smoothed = 0.0;
        self.state.instant_history.reset();
        self.state.smoothed_history.reset();
    }
}

impl Default for VolumeTracker {
    fn default() -> Self {
        Self::new(DEFAULT_VOLUME_SMOOTHING, DEFAULT_HISTORY_LEN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::bands::split;

    #[test]
    fn smoothed_approaches_instant_without_overshoot() {
        let mut tracker = VolumeTracker::default();
        let levels = split(&[255; 64], 4, 0.5);
        let target = levels.mean();
        let mut previous = 0.0;
        for _ in 0..40 {
            let state = tracker.update(&levels);
            assert!(state.smoothed > previous);
            assert!(state.smoothed <= target);
            previous = state.smoothed;
        }
        assert!((previous - target).abs() < 1e-3);
    }

    #[test]
    fn first_step_moves_by_coefficient() {
        let mut tracker = VolumeTracker::new(0.2, 8);
        let levels = split(&[255; 16], 1, 1.0);
        let state = tracker.update(&levels);
        assert_eq!(state.instant, 1.0);
        assert!((state.smoothed - 0.2).abs() < 1e-6);
    }

    #[test]
    fn history_evicts_oldest() {
        let mut history = History::new(3);
        for v in [1.0, 2.0, 3.0, 4.0] {
            history.push(v);
        }
        assert_eq!(history.iter().collect::<Vec<_>>(), vec![4.0, 3.0, 2.0]);
        assert_eq!(history.capacity(), 3);
        assert_eq!(history.newest(), 4.0);
    }

    #[test]
    fn reset_zeroes_everything() {
        let mut tracker = VolumeTracker::new(0.5, 4);
        tracker.update(&split(&[255; 8], 2, 1.0));
        tracker.reset();
        let state = tracker.state();
        assert_eq!(state.instant, 0.0);
        assert_eq!(state.smoothed, 0.0);
        assert!(state.instant_history.iter().all(|v| v == 0.0));
        assert_eq!(state.smoothed_history.capacity(), 4);
    }
}
