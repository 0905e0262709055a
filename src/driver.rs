//! Mapping pipeline signals onto bounded effect parameters.
//!
//! Every parameter declares its range and nothing outside it ever reaches a
//! consumer: out-of-range signals are clamped, auto-mode noise is remapped.

use noise::{NoiseFn, OpenSimplex};
use std::fmt;

use crate::bus::SignalFrame;

/// Time scale applied to the noise clock by the stock drivers.
pub const AUTO_TIME_SCALE: f64 = 1.0 / 20.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamRange {
    pub min: f32,
    pub max: f32,
}

impl ParamRange {
    pub fn new(min: f32, max: f32) -> Self {
        if min <= max {
            Self { min, max }
        } else {
            Self { min: max, max: min }
        }
    }

    pub const UNIT: ParamRange = ParamRange { min: 0.0, max: 1.0 };

    /// NaN maps to `min`.
    pub fn clamp(&self, value: f32) -> f32 {
        if value.is_nan() {
            return self.min;
        }
        value.clamp(self.min, self.max)
    }

    /// Map `t` in [0, 1] onto the range.
    pub fn from_unit(&self, t: f32) -> f32 {
        self.clamp(self.min + t * (self.max - self.min))
    }

    /// Map `n` in [-1, 1] onto the range.
    pub fn from_signed(&self, n: f32) -> f32 {
        self.from_unit((n + 1.0) / 2.0)
    }
}

/// A scalar read from the frame snapshot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Signal {
    Instant,
    Smoothed,
    Band(usize),
    TempoProgress,
}

impl Signal {
    pub fn read(&self, frame: &SignalFrame<'_>) -> f32 {
        match self {
            Signal::Instant => frame.volume.instant,
            Signal::Smoothed => frame.volume.smoothed,
            Signal::Band(i) => frame.levels.get(*i).unwrap_or(0.0),
            Signal::TempoProgress => frame.tempo_progress,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Mapping {
    /// Holds whatever was last set by hand.
    Manual,
    /// `offset + signal * scale`
    Direct {
        signal: Signal,
        scale: f32,
        offset: f32,
    },
    /// `levels[(index + beat_count * stride) % len] * scale`, walking through
    /// the bands as beats arrive.
    Banded {
        index: usize,
        stride: usize,
        scale: f32,
    },
}

impl Mapping {
    pub fn direct(signal: Signal, scale: f32) -> Self {
        Mapping::Direct {
            signal,
            scale,
            offset: 0.0,
        }
    }

    fn evaluate(&self, frame: &SignalFrame<'_>, manual: f32) -> f32 {
        match *self {
            Mapping::Manual => manual,
            Mapping::Direct {
                signal,
                scale,
                offset,
            } => offset + signal.read(frame) * scale,
            Mapping::Banded {
                index,
                stride,
                scale,
            } => {
                let len = frame.levels.len();
                if len == 0 {
                    return 0.0;
                }
                let shift = (frame.beat_count % len as u64) as usize * (stride % len);
                let band = (index + shift) % len;
                frame.levels.get(band).unwrap_or(0.0) * scale
            }
        }
    }
}

/// One lane of slow 2D simplex noise, sampled along time.
pub struct NoiseLane {
    simplex: OpenSimplex,
    seed: u32,
    lane: f64,
    time_scale: f64,
}

impl NoiseLane {
    pub fn new(seed: u32, lane: f64, time_scale: f64) -> Self {
        Self {
            simplex: OpenSimplex::new(seed),
            seed,
            lane,
            time_scale,
        }
    }

    /// Value in [-1, 1] at `time`.
    pub fn sample(&self, time: f64) -> f32 {
        (self.simplex.get([time * self.time_scale, self.lane]) as f32).clamp(-1.0, 1.0)
    }
}

impl fmt::Debug for NoiseLane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NoiseLane")
            .field("seed", &self.seed)
            .field("lane", &self.lane)
            .field("time_scale", &self.time_scale)
            .finish()
    }
}

/// A bounded effect parameter and the rule that moves it every frame.
#[derive(Debug)]
pub struct ReactiveParam {
    name: String,
    range: ParamRange,
    mapping: Mapping,
    auto: Option<NoiseLane>,
    manual: f32,
    value: f32,
}

impl ReactiveParam {
    pub fn new(name: impl Into<String>, range: ParamRange, mapping: Mapping) -> Self {
        Self {
            name: name.into(),
            range,
            mapping,
            auto: None,
            manual: range.min,
            value: range.min,
        }
    }

    /// Follow `lane` instead of the mapping while auto mode is on.
    pub fn with_auto(mut self, lane: NoiseLane) -> Self {
        self.auto = Some(lane);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn range(&self) -> ParamRange {
        self.range
    }

    pub fn mapping(&self) -> Mapping {
        self.mapping
    }

    pub fn set_mapping(&mut self, mapping: Mapping) {
        self.mapping = mapping;
    }

    pub fn value(&self) -> f32 {
        self.value
    }

    /// Manual value, clamped into range. Visible immediately and used by
    /// [`Mapping::Manual`] on later frames.
    pub fn set_manual(&mut self, value: f32) {
        self.manual = self.range.clamp(value);
        if self.mapping == Mapping::Manual {
            self.value = self.manual;
        }
    }

    pub fn update(&mut self, frame: &SignalFrame<'_>) -> f32 {
        self.value = match (&self.auto, frame.auto_mode) {
            (Some(lane), true) => self.range.from_signed(lane.sample(frame.noise_time)),
            _ => self.range.clamp(self.mapping.evaluate(frame, self.manual)),
        };
        self.value
    }
}

/// Global tilt amount, auto-driven.
pub fn tilt_amount(seed: u32) -> ReactiveParam {
    ReactiveParam::new("tilt_amount", ParamRange::new(0.0, 0.25), Mapping::Manual)
        .with_auto(NoiseLane::new(seed, 99.0, AUTO_TIME_SCALE))
}

/// Global tilt speed, auto-driven.
pub fn tilt_speed(seed: u32) -> ReactiveParam {
    ReactiveParam::new("tilt_speed", ParamRange::new(0.0, 0.25), Mapping::Manual)
        .with_auto(NoiseLane::new(seed, 9999.0, AUTO_TIME_SCALE))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::{split, VolumeState};

    #[test]
    fn range_clamps_and_remaps() {
        let range = ParamRange::new(2.0, -2.0);
        assert_eq!(range.min, -2.0);
        assert_eq!(range.clamp(5.0), 2.0);
        assert_eq!(range.clamp(f32::NAN), -2.0);
        assert_eq!(range.from_unit(0.5), 0.0);
        assert_eq!(range.from_signed(-1.0), -2.0);
        assert_eq!(range.from_signed(1.0), 2.0);
    }

    #[test]
    fn banded_mapping_rotates_with_beats() {
        let mut spectrum = vec![0u8; 4];
        spectrum[2] = 255;
        let levels = split(&spectrum, 4, 1.0);
        let volume = VolumeState::new(4);
        let mut frame = SignalFrame {
            frame: 0,
            dt: 0.0,
            levels: &levels,
            volume: &volume,
            beat: None,
            beat_count: 0,
            tempo_progress: 0.0,
            noise_time: 0.0,
            auto_mode: false,
        };
        let mapping = Mapping::Banded {
            index: 0,
            stride: 1,
            scale: 1.0,
        };
        assert_eq!(mapping.evaluate(&frame, 0.0), 0.0);
        frame.beat_count = 2;
        assert!(mapping.evaluate(&frame, 0.0) > 0.9);
        frame.beat_count = 6;
        assert!(mapping.evaluate(&frame, 0.0) > 0.9);
    }

    #[test]
    fn noise_lane_is_deterministic_per_seed() {
        let a = NoiseLane::new(7, 99.0, AUTO_TIME_SCALE);
        let b = NoiseLane::new(7, 99.0, AUTO_TIME_SCALE);
        for t in [0.0, 0.37, 12.5] {
            assert_eq!(a.sample(t), b.sample(t));
            assert!((-1.0..=1.0).contains(&a.sample(t)));
        }
    }

    #[test]
    fn manual_value_is_clamped() {
        let mut param = ReactiveParam::new("size", ParamRange::new(0.0, 1.0), Mapping::Manual);
        param.set_manual(3.0);
        assert_eq!(param.value(), 1.0);
    }
}
