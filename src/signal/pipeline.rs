use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

use super::bands::{LevelsVector, SignalBandSplitter};
use super::beat::{BeatDetector, BeatEvent};
use super::volume::{VolumeState, VolumeTracker};
use crate::audio::{
    AudioPlatform, AudioSourceAdapter, DecodedAudio, MediaElement, MicrophoneStream, SourceHandle,
};
use crate::bus::{PublishReport, SignalBus, SignalFrame, TempoBeat, TempoClock};
use crate::config::{Config, Tunables};
use crate::driver::{self, ReactiveParam};
use crate::error::{AudioError, ConfigError};

/// Advance of the auto-mode noise clock per frame.
pub const NOISE_STEP: f64 = 0.01;

/// What happened during one [`SignalPipeline::tick`].
#[derive(Debug)]
pub struct FrameReport {
    pub frame: u64,
    pub beat: Option<BeatEvent>,
    pub tempo_beat: Option<TempoBeat>,
    pub publish: PublishReport,
}

/// Point-in-time readout for overlays and the control socket.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineStatus {
    pub frame: u64,
    pub source: Option<SourceHandle>,
    pub playing: bool,
    pub instant: f32,
    pub smoothed: f32,
    pub cutoff: f32,
    pub beat_count: u64,
    pub bpm: f32,
    pub tempo_beats: u64,
    pub tunables: Tunables,
}

impl fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let source = match &self.source {
            Some(handle) => format!("{}#{}", handle.kind, handle.id),
            None => "none".to_string(),
        };
        let beat = self.tunables.beat();
        write!(
            f,
            "frame={} source={} playing={} volume={:.3} smoothed={:.3} cutoff={:.3} beats={} \
             bpm={} threshold={} hold={} decay={} gain={} bands={} auto={}",
            self.frame,
            source,
            self.playing,
            self.instant,
            self.smoothed,
            self.cutoff,
            self.beat_count,
            self.bpm,
            beat.threshold,
            beat.hold_frames,
            beat.decay_rate,
            self.tunables.gain(),
            self.tunables.band_count(),
            if self.tunables.auto_mode() { "on" } else { "off" },
        )
    }
}

/// One instance of the whole per-frame signal chain.
///
/// `tick` runs split, volume, beat, publish and drivers strictly in that
/// order and never awaits. Source changes made through the adapter are
/// picked up at the start of the next tick, or immediately when made through
/// the pipeline's own connect methods.
pub struct SignalPipeline {
    adapter: AudioSourceAdapter,
    splitter: SignalBandSplitter,
    volume: VolumeTracker,
    detector: BeatDetector,
    bus: SignalBus,
    tempo: TempoClock,
    tunables: Tunables,
    tilt_amount: ReactiveParam,
    tilt_speed: ReactiveParam,
    frame: u64,
    noise_time: f64,
    source_generation: u64,
}

impl SignalPipeline {
    pub fn new(
        config: &Config,
        platform: Arc<dyn AudioPlatform>,
        now: Instant,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let tunables = Tunables::from_config(config)?;
        let adapter = AudioSourceAdapter::new(
            platform,
            config.audio.fft_size,
            tunables.analyser_smoothing(),
        );
        let tempo = TempoClock::new(
            config.tempo.bpm,
            Duration::from_millis(config.tempo.tap_timeout_ms),
            now,
        )?;

        Ok(Self {
            source_generation: adapter.generation(),
            adapter,
            splitter: SignalBandSplitter::new(tunables.band_count(), tunables.gain()),
            volume: VolumeTracker::new(tunables.volume_smoothing(), config.audio.history_len),
            detector: BeatDetector::new(tunables.beat()),
            bus: SignalBus::new(),
            tempo,
            tilt_amount: driver::tilt_amount(config.drivers.noise_seed),
            tilt_speed: driver::tilt_speed(config.drivers.noise_seed),
            tunables,
            frame: 0,
            noise_time: 0.0,
        })
    }

    /// Drop per-source state if the adapter switched or lost its source.
    fn sync_source(&mut self) {
        let generation = self.adapter.generation();
        if generation != self.source_generation {
            debug!("Source changed, resetting volume and beat state");
            self.volume.reset();
            self.detector.reset();
            self.splitter.split(None);
            self.source_generation = generation;
        }
    }

    /// Run one frame. `dt` is the time since the previous frame in seconds.
    pub fn tick(&mut self, dt: f64, now: Instant) -> FrameReport {
        self.sync_source();

        let spectrum = self.adapter.pull_frame(dt);
        let levels = self
            .splitter
            .split(spectrum.map(|f| f.frequency_bins.as_slice()));
        let volume = self.volume.update(levels);
        let beat = self.detector.update(volume.instant, self.frame);

        let mut publish = PublishReport::default();
        if let Some(event) = beat.as_ref() {
            publish.merge(self.bus.publish_beat(event));
        }

        let tempo_beat = self.tempo.poll(now);
        if let Some(pulse) = tempo_beat.as_ref() {
            publish.merge(self.bus.publish_tempo_beat(pulse));
        }

        self.noise_time += NOISE_STEP;
        let signal = SignalFrame {
            frame: self.frame,
            dt,
            levels: self.splitter.levels(),
            volume: self.volume.state(),
            beat,
            beat_count: self.detector.beat_count(),
            tempo_progress: self.tempo.beat_progress(now),
            noise_time: self.noise_time,
            auto_mode: self.tunables.auto_mode(),
        };
        self.tilt_amount.update(&signal);
        self.tilt_speed.update(&signal);
        publish.merge(self.bus.publish_per_frame(&signal));

        let report = FrameReport {
            frame: self.frame,
            beat,
            tempo_beat,
            publish,
        };
        self.frame += 1;
        report
    }

    pub fn connect_decoded(
        &mut self,
        audio: DecodedAudio,
        looping: bool,
    ) -> Result<SourceHandle, AudioError> {
        let result = self.adapter.connect_decoded(audio, looping);
        self.sync_source();
        result
    }

    pub async fn connect_file(
        &mut self,
        bytes: Vec<u8>,
        looping: bool,
    ) -> Result<SourceHandle, AudioError> {
        let result = self.adapter.connect_file(bytes, looping).await;
        self.sync_source();
        result
    }

    pub fn connect_microphone(
        &mut self,
        stream: MicrophoneStream,
    ) -> Result<SourceHandle, AudioError> {
        let result = self.adapter.connect_microphone(stream);
        self.sync_source();
        result
    }

    pub fn connect_element(&mut self, element: MediaElement) -> Result<SourceHandle, AudioError> {
        let result = self.adapter.connect_element(element);
        self.sync_source();
        result
    }

    /// Detach the source and zero volume and beat state right away.
    pub fn disconnect(&mut self) {
        self.adapter.disconnect();
        self.sync_source();
    }

    /// Apply a batch of tunable changes. Nothing is applied if any setter
    /// rejects its value.
    pub fn tune<F>(&mut self, change: F) -> Result<(), ConfigError>
    where
        F: FnOnce(&mut Tunables) -> Result<(), ConfigError>,
    {
        let mut next = self.tunables.clone();
        change(&mut next)?;

        self.splitter.set_gain(next.gain());
        self.splitter.set_band_count(next.band_count());
        self.volume.set_coefficient(next.volume_smoothing());
        self.adapter.set_analyser_smoothing(next.analyser_smoothing());
        if next.beat() != self.detector.params() {
            self.detector.set_params(next.beat());
        }
        self.tunables = next;
        Ok(())
    }

    /// Register a tap. A tap that sets a new tempo publishes a tempo beat
    /// immediately.
    pub fn tap(&mut self, now: Instant) -> Option<TempoBeat> {
        let pulse = self.tempo.tap(now)?;
        self.bus.publish_tempo_beat(&pulse);
        Some(pulse)
    }

    pub fn set_bpm(&mut self, bpm: f32, now: Instant) -> Result<(), ConfigError> {
        self.tempo.set_bpm(bpm, now)
    }

    pub fn status(&self) -> PipelineStatus {
        let volume = self.volume.state();
        PipelineStatus {
            frame: self.frame,
            source: self.adapter.current().copied(),
            playing: self.adapter.is_playing(),
            instant: volume.instant,
            smoothed: volume.smoothed,
            cutoff: self.detector.cutoff(),
            beat_count: self.detector.beat_count(),
            bpm: self.tempo.bpm(),
            tempo_beats: self.tempo.count(),
            tunables: self.tunables.clone(),
        }
    }

    pub fn adapter(&self) -> &AudioSourceAdapter {
        &self.adapter
    }

    pub fn adapter_mut(&mut self) -> &mut AudioSourceAdapter {
        &mut self.adapter
    }

    pub fn bus(&self) -> &SignalBus {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut SignalBus {
        &mut self.bus
    }

    pub fn levels(&self) -> &LevelsVector {
        self.splitter.levels()
    }

    pub fn volume(&self) -> &VolumeState {
        self.volume.state()
    }

    pub fn detector(&self) -> &BeatDetector {
        &self.detector
    }

    pub fn tempo(&self) -> &TempoClock {
        &self.tempo
    }

    pub fn tunables(&self) -> &Tunables {
        &self.tunables
    }

    pub fn tilt_amount(&self) -> &ReactiveParam {
        &self.tilt_amount
    }

    pub fn tilt_speed(&self) -> &ReactiveParam {
        &self.tilt_speed
    }

    /// Frames run so far.
    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn noise_time(&self) -> f64 {
        self.noise_time
    }
}
