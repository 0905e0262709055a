use serde::{Deserialize, Serialize};
use tracing::debug;

/// Multiplier applied to the cutoff after a beat so the same transient
/// cannot fire again on the next frame.
pub const CUTOFF_SPIKE: f32 = 1.1;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BeatParams {
    /// Floor of the adaptive cutoff.
    pub threshold: f32,
    /// Frames after a beat during which the cutoff is frozen.
    pub hold_frames: u32,
    /// Per-frame cutoff multiplier once the hold has elapsed, in (0, 1).
    pub decay_rate: f32,
}

impl Default for BeatParams {
    fn default() -> Self {
        Self {
            threshold: 0.15,
            hold_frames: 30,
            decay_rate: 0.97,
        }
    }
}

/// What the detector did on the most recent frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeatPhase {
    Firing,
    Holding,
    Decaying,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BeatEvent {
    /// Number of beats fired before this one since the last reset.
    pub index: u64,
    /// Pipeline frame the beat fired on.
    pub frame: u64,
    pub volume: f32,
    /// Cutoff after the spike.
    pub cutoff: f32,
}

/// Adaptive-gate onset detector over the instant volume.
#[derive(Debug, Clone)]
pub struct BeatDetector {
    params: BeatParams,
    cutoff: f32,
    hold_counter: u32,
    phase: BeatPhase,
    beats: u64,
}

impl BeatDetector {
    pub fn new(params: BeatParams) -> Self {
        Self {
            params,
            cutoff: params.threshold,
            hold_counter: 0,
            phase: BeatPhase::Decaying,
            beats: 0,
        }
    }

    pub fn params(&self) -> BeatParams {
        self.params
    }

    pub fn cutoff(&self) -> f32 {
        self.cutoff
    }

    pub fn hold_counter(&self) -> u32 {
        self.hold_counter
    }

    pub fn phase(&self) -> BeatPhase {
        self.phase
    }

    /// Beats fired since the last reset.
    pub fn beat_count(&self) -> u64 {
        self.beats
    }

    /// Swap parameters live. The cutoff is lifted to a raised threshold
    /// immediately; a lowered one is reached through normal decay.
    pub fn set_params(&mut self, params: BeatParams) {
        self.params = params;
        self.cutoff = self.cutoff.max(params.threshold);
    }

    /// Back to the initial state: cutoff on the floor, no hold, no beats.
    pub fn reset(&mut self) {
        self.cutoff = self.params.threshold;
        self.hold_counter = 0;
        self.phase = BeatPhase::Decaying;
        self.beats = 0;
    }

    /// Evaluate one frame. Fires at most once per call.
    pub fn update(&mut self, volume: f32, frame: u64) -> Option<BeatEvent> {
        if volume > self.cutoff && volume > self.params.threshold {
            self.cutoff = (volume * CUTOFF_SPIKE).max(self.params.threshold);
            self.hold_counter = 0;
            self.phase = BeatPhase::Firing;

            let event = BeatEvent {
                index: self.beats,
                frame,
                volume,
                cutoff: self.cutoff,
            };
            self.beats += 1;
            debug!(
                "Beat #{} at frame {} (volume {:.3}, cutoff {:.3})",
                event.index, frame, volume, self.cutoff
            );
            return Some(event);
        }

        if self.hold_counter <= self.params.hold_frames {
            self.hold_counter += 1;
            self.phase = BeatPhase::Holding;
        } else {
            self.cutoff = (self.cutoff * self.params.decay_rate).max(self.params.threshold);
            self.phase = BeatPhase::Decaying;
        }
        None
    }
}

impl Default for BeatDetector {
    fn default() -> Self {
        Self::new(BeatParams::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn params(threshold: f32, hold_frames: u32, decay_rate: f32) -> BeatParams {
        BeatParams {
            threshold,
            hold_frames,
            decay_rate,
        }
    }

    #[test]
    fn sustained_spike_fires_once() {
        let mut detector = BeatDetector::new(params(0.1, 10, 0.97));
        let fired: Vec<u64> = (0..15)
            .filter_map(|frame| detector.update(1.0, frame))
            .map(|event| event.frame)
            .collect();
        assert_eq!(fired, vec![0]);
    }

    #[test]
    fn cutoff_spikes_then_holds_then_decays() {
        let mut detector = BeatDetector::new(params(0.1, 2, 0.5));
        detector.update(0.5, 0);
        assert!((detector.cutoff() - 0.55).abs() < 1e-6);
        assert_eq!(detector.phase(), BeatPhase::Firing);

        // hold counter 0, 1, 2 are all <= hold_frames
        for frame in 1..=3 {
            detector.update(0.0, frame);
            assert_eq!(detector.phase(), BeatPhase::Holding);
            assert!((detector.cutoff() - 0.55).abs() < 1e-6);
        }

        detector.update(0.0, 4);
        assert_eq!(detector.phase(), BeatPhase::Decaying);
        assert!((detector.cutoff() - 0.275).abs() < 1e-6);

        detector.update(0.0, 5);
        detector.update(0.0, 6);
        assert!((detector.cutoff() - 0.1).abs() < 1e-6);
    }

    #[test]
    fn below_threshold_never_fires() {
        let mut detector = BeatDetector::new(params(0.3, 0, 0.9));
        assert!((0..100).all(|frame| detector.update(0.29, frame).is_none()));
    }

    #[test]
    fn quieter_beat_fires_after_decay() {
        let mut detector = BeatDetector::new(params(0.1, 5, 0.8));
        assert!(detector.update(0.8, 0).is_some());
        let second = (1..100).find_map(|frame| detector.update(0.5, frame));
        let second = second.expect("decayed cutoff lets 0.5 through");
        assert_eq!(second.index, 1);
        assert!(second.frame > 6);
    }

    #[test]
    fn raising_threshold_lifts_cutoff() {
        let mut detector = BeatDetector::new(params(0.1, 5, 0.8));
        detector.set_params(params(0.4, 5, 0.8));
        assert_eq!(detector.cutoff(), 0.4);
        assert!(detector.update(0.35, 0).is_none());
    }

    #[test]
    fn reset_restores_floor() {
        let mut detector = BeatDetector::new(params(0.2, 5, 0.9));
        detector.update(0.9, 0);
        detector.reset();
        assert_eq!(detector.cutoff(), 0.2);
        assert_eq!(detector.hold_counter(), 0);
        assert_eq!(detector.beat_count(), 0);
    }

    proptest! {
        #[test]
        fn cutoff_never_below_threshold(
            threshold in 0.0f32..1.0,
            hold in 0u32..20,
            decay in 0.01f32..0.999,
            volumes in prop::collection::vec(0.0f32..2.0, 1..400),
        ) {
            let mut detector = BeatDetector::new(params(threshold, hold, decay));
            for (frame, v) in volumes.into_iter().enumerate() {
                detector.update(v, frame as u64);
                prop_assert!(detector.cutoff() >= threshold);
            }
        }
    }
}
