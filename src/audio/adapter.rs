use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::analyser::{AnalyserTap, SpectrumFrame};
use super::decode::decode_async;
use super::platform::{acquire_microphone, AudioPlatform, AudioSink};
use super::source::{
    DecodedAudio, ElementSource, FileSource, MediaElement, MicrophoneSource, MicrophoneStream,
    SampleSource, SourceKind,
};
use crate::error::AudioError;

/// Longest stretch of audio a single frame reads. Anything beyond it is
/// skipped.
pub const MAX_TICK_SECS: f64 = 0.25;

/// Identifies the source a `connect*` call attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceHandle {
    pub id: u64,
    pub kind: SourceKind,
    pub sample_rate: u32,
}

struct Connected {
    handle: SourceHandle,
    source: Box<dyn SampleSource>,
    sink: Option<Box<dyn AudioSink>>,
}

/// Presents one analyser output regardless of where the audio comes from.
///
/// At most one source feeds the analyser. Every `connect*` detaches the
/// previous source first, and every change of source bumps [`generation`]
/// so the signal stages downstream know to drop their state.
///
/// [`generation`]: AudioSourceAdapter::generation
pub struct AudioSourceAdapter {
    platform: Arc<dyn AudioPlatform>,
    unavailable: Option<String>,
    analyser: AnalyserTap,
    current: Option<Connected>,
    generation: u64,
    next_id: u64,
    scratch: Vec<f32>,
    frame_remainder: f64,
}

impl AudioSourceAdapter {
    /// Probe the platform once. A failed probe disables audio for the lifetime
    /// of the adapter; it is logged here and never again.
    pub fn new(platform: Arc<dyn AudioPlatform>, fft_size: usize, smoothing: f32) -> Self {
        let unavailable = match platform.probe() {
            Ok(()) => {
                info!("Audio platform: {}", platform.name());
                None
            }
            Err(e) => {
                error!("Audio disabled, running without sound: {}", e);
                Some(e.to_string())
            }
        };

        Self {
            platform,
            unavailable,
            analyser: AnalyserTap::new(fft_size, smoothing),
            current: None,
            generation: 0,
            next_id: 1,
            scratch: Vec::new(),
            frame_remainder: 0.0,
        }
    }

    pub fn is_available(&self) -> bool {
        self.unavailable.is_none()
    }

    pub fn platform(&self) -> Arc<dyn AudioPlatform> {
        Arc::clone(&self.platform)
    }

    pub fn current(&self) -> Option<&SourceHandle> {
        self.current.as_ref().map(|c| &c.handle)
    }

    pub fn is_connected(&self) -> bool {
        self.current.is_some()
    }

    pub fn is_playing(&self) -> bool {
        self.current.as_ref().is_some_and(|c| c.source.is_playing())
    }

    /// Bumped on every connect and every effective disconnect.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn analyser(&self) -> &AnalyserTap {
        &self.analyser
    }

    pub fn set_analyser_smoothing(&mut self, smoothing: f32) {
        self.analyser.set_smoothing(smoothing);
    }

    fn ensure_available(&self) -> Result<(), AudioError> {
        match &self.unavailable {
            Some(reason) => Err(AudioError::PlatformUnsupported(reason.clone())),
            None => Ok(()),
        }
    }

    fn attach(
        &mut self,
        source: Box<dyn SampleSource>,
        sink: Option<Box<dyn AudioSink>>,
    ) -> SourceHandle {
        self.disconnect();

        let handle = SourceHandle {
            id: self.next_id,
            kind: source.kind(),
            sample_rate: source.sample_rate(),
        };
        self.next_id += 1;
        self.generation += 1;

        info!(
            "Connected {} source #{} @ {}Hz",
            handle.kind, handle.id, handle.sample_rate
        );
        self.current = Some(Connected {
            handle,
            source,
            sink,
        });
        handle
    }

    fn open_sink(&self, sample_rate: u32) -> Option<Box<dyn AudioSink>> {
        match self.platform.open_sink(sample_rate) {
            Ok(sink) => Some(sink),
            Err(e) => {
                warn!("Playback unavailable, analysing silently: {}", e);
                None
            }
        }
    }

    /// Attach already decoded audio as a file source. Playback starts at once.
    pub fn connect_decoded(
        &mut self,
        audio: DecodedAudio,
        looping: bool,
    ) -> Result<SourceHandle, AudioError> {
        self.ensure_available()?;
        let sink = self.open_sink(audio.sample_rate());
        Ok(self.attach(Box::new(FileSource::new(audio, looping)), sink))
    }

    /// Decode `bytes` and attach the result.
    ///
    /// The previous source is detached before decoding starts, so a decode
    /// failure leaves the adapter disconnected.
    pub async fn connect_file(
        &mut self,
        bytes: Vec<u8>,
        looping: bool,
    ) -> Result<SourceHandle, AudioError> {
        self.ensure_available()?;
        self.disconnect();
        let audio = decode_async(bytes).await?;
        self.connect_decoded(audio, looping)
    }

    /// Attach a live capture stream. Never loops; runs until disconnected.
    pub fn connect_microphone(
        &mut self,
        stream: MicrophoneStream,
    ) -> Result<SourceHandle, AudioError> {
        self.ensure_available()?;
        Ok(self.attach(Box::new(MicrophoneSource::new(stream)), None))
    }

    /// Acquire a capture stream from the platform and attach it.
    pub async fn open_microphone(
        &mut self,
        device: Option<String>,
    ) -> Result<SourceHandle, AudioError> {
        self.ensure_available()?;
        self.disconnect();
        let stream = acquire_microphone(self.platform(), device).await?;
        self.connect_microphone(stream)
    }

    /// Attach an externally controlled element. Its transport stays with the
    /// caller's handle.
    pub fn connect_element(&mut self, element: MediaElement) -> Result<SourceHandle, AudioError> {
        self.ensure_available()?;
        let sink = self.open_sink(element.sample_rate());
        Ok(self.attach(Box::new(ElementSource::new(element)), sink))
    }

    /// Detach the current source, if any. Never fails.
    pub fn disconnect(&mut self) {
        if let Some(previous) = self.current.take() {
            info!(
                "Disconnected {} source #{}",
                previous.handle.kind, previous.handle.id
            );
            self.generation += 1;
        }
        self.analyser.clear();
        self.scratch.clear();
        self.frame_remainder = 0.0;
    }

    /// Advance the connected source by `dt` seconds and analyse the newest
    /// window.
    ///
    /// Returns `None` when audio is unavailable or nothing is connected; the
    /// analyser is not touched in that case.
    pub fn pull_frame(&mut self, dt: f64) -> Option<&SpectrumFrame> {
        if self.unavailable.is_some() {
            return None;
        }
        let connected = self.current.as_mut()?;

        let rate = connected.handle.sample_rate as f64;
        let exact = dt.max(0.0) * rate + self.frame_remainder;
        let mut frames = exact.floor() as usize;
        self.frame_remainder = exact - frames as f64;

        // After a stall only the newest audio is analysed and played.
        let cap = (MAX_TICK_SECS * rate).ceil() as usize;
        if frames > cap {
            let skipped = frames - cap;
            debug!(
                "Frame loop stalled for {:.2}s, skipping {} samples",
                dt, skipped
            );
            connected.source.skip(skipped);
            frames = cap;
        }

        self.scratch.clear();
        connected.source.read(frames, &mut self.scratch);
        if let Some(sink) = connected.sink.as_mut() {
            if !self.scratch.is_empty() {
                sink.write(&self.scratch);
            }
        }

        self.analyser.push_samples(&self.scratch);
        Some(self.analyser.analyse())
    }
}
