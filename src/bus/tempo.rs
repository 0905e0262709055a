use std::time::{Duration, Instant};
use tracing::info;

use super::TempoBeat;
use crate::error::ConfigError;

pub const DEFAULT_BPM: f32 = 120.0;
pub const DEFAULT_TAP_TIMEOUT: Duration = Duration::from_millis(2000);
pub const MAX_BPM: f32 = 999.0;

/// BPM estimate from user taps.
///
/// The estimate is taken from the first tap of the current sequence, so
/// every extra tap averages over a longer span. A pause longer than the
/// timeout starts a new sequence.
#[derive(Debug, Clone)]
pub struct TapTempo {
    timeout: Duration,
    count: u32,
    first_tap: Option<Instant>,
    last_tap: Option<Instant>,
}

impl TapTempo {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            count: 0,
            first_tap: None,
            last_tap: None,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    /// Taps in the current sequence.
    pub fn count(&self) -> u32 {
        self.count
    }

    /// Register a tap. Returns the new BPM once the sequence has at least two
    /// taps.
    pub fn tap(&mut self, now: Instant) -> Option<f32> {
        let expired = match self.last_tap {
            Some(last) => now.saturating_duration_since(last) > self.timeout,
            None => true,
        };
        if expired {
            self.count = 0;
        }
        self.last_tap = Some(now);

        let first = match self.first_tap {
            Some(first) if self.count > 0 => first,
            _ => {
                self.first_tap = Some(now);
                self.count = 1;
                return None;
            }
        };

        let elapsed_ms = now.saturating_duration_since(first).as_secs_f64() * 1000.0;
        if elapsed_ms <= 0.0 {
            return None;
        }
        let bpm = (60000.0 * self.count as f64 / elapsed_ms).round() as f32;
        self.count += 1;
        Some(bpm.clamp(1.0, MAX_BPM))
    }
}

impl Default for TapTempo {
    fn default() -> Self {
        Self::new(DEFAULT_TAP_TIMEOUT)
    }
}

/// Wall-clock metronome independent of the audio.
///
/// Driven by [`poll`](TempoClock::poll) from the frame loop; emits at most one
/// beat per poll and re-phases instead of bursting when polled late.
#[derive(Debug, Clone)]
pub struct TempoClock {
    bpm: f32,
    interval: Duration,
    last_beat: Instant,
    next_beat: Instant,
    count: u64,
    tapper: TapTempo,
}

fn validate_bpm(bpm: f32) -> Result<f32, ConfigError> {
    if bpm.is_finite() && bpm > 0.0 && bpm <= MAX_BPM {
        Ok(bpm)
    } else {
        Err(ConfigError::out_of_range("bpm", "in (0, 999]", bpm))
    }
}

fn beat_interval(bpm: f32) -> Duration {
    Duration::from_secs_f64(60.0 / bpm as f64)
}

impl TempoClock {
    pub fn new(bpm: f32, tap_timeout: Duration, now: Instant) -> Result<Self, ConfigError> {
        let bpm = validate_bpm(bpm)?;
        let interval = beat_interval(bpm);
        Ok(Self {
            bpm,
            interval,
            last_beat: now,
            next_beat: now + interval,
            count: 0,
            tapper: TapTempo::new(tap_timeout),
        })
    }

    pub fn bpm(&self) -> f32 {
        self.bpm
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Tempo beats emitted so far.
    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn tapper(&self) -> &TapTempo {
        &self.tapper
    }

    pub fn set_tap_timeout(&mut self, timeout: Duration) {
        self.tapper.set_timeout(timeout);
    }

    /// Change the tempo and restart the beat interval from `now`.
    pub fn set_bpm(&mut self, bpm: f32, now: Instant) -> Result<(), ConfigError> {
        self.bpm = validate_bpm(bpm)?;
        self.interval = beat_interval(self.bpm);
        self.restart(now);
        info!("BPM set to {}", self.bpm);
        Ok(())
    }

    fn restart(&mut self, now: Instant) {
        self.last_beat = now;
        self.next_beat = now + self.interval;
    }

    /// Emit a beat right now and restart the interval from here.
    pub fn trigger(&mut self, now: Instant) -> TempoBeat {
        self.restart(now);
        self.count += 1;
        TempoBeat {
            count: self.count,
            bpm: self.bpm,
        }
    }

    /// Emit a beat if its time has come.
    pub fn poll(&mut self, now: Instant) -> Option<TempoBeat> {
        if now < self.next_beat {
            return None;
        }
        self.last_beat = self.next_beat;
        self.next_beat += self.interval;
        if self.next_beat <= now {
            self.restart(now);
        }
        self.count += 1;
        Some(TempoBeat {
            count: self.count,
            bpm: self.bpm,
        })
    }

    /// Phase within the current beat, 0 right after a beat and approaching 1
    /// just before the next one.
    pub fn beat_progress(&self, now: Instant) -> f32 {
        let since = now.saturating_duration_since(self.last_beat);
        (since.as_secs_f64() / self.interval.as_secs_f64()).clamp(0.0, 1.0) as f32
    }

    /// Feed a tap. When it yields a new BPM the tempo is updated and an
    /// immediate beat is returned.
    pub fn tap(&mut self, now: Instant) -> Option<TempoBeat> {
        let bpm = self.tapper.tap(now)?;
        self.set_bpm(bpm, now).ok()?;
        Some(self.trigger(now))
    }
}
