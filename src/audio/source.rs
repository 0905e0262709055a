use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Which kind of input is feeding the analyser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    File,
    Microphone,
    Element,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::File => write!(f, "file"),
            SourceKind::Microphone => write!(f, "microphone"),
            SourceKind::Element => write!(f, "element"),
        }
    }
}

/// Mono PCM decoded from an audio payload.
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    samples: Arc<[f32]>,
    sample_rate: u32,
    channels: u16,
}

impl DecodedAudio {
    pub fn new(samples: Vec<f32>, sample_rate: u32, channels: u16) -> Self {
        Self {
            samples: samples.into(),
            sample_rate,
            channels,
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Channel count of the payload before downmixing.
    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples.len() as f64 / self.sample_rate as f64)
    }
}

/// A producer of mono samples the adapter drains once per frame.
pub trait SampleSource {
    fn kind(&self) -> SourceKind;

    fn sample_rate(&self) -> u32;

    fn is_playing(&self) -> bool;

    /// Append the samples produced over a tick worth `frames` sample frames.
    ///
    /// Clocked sources (file, element) append exactly `frames` samples,
    /// silence included. Live sources append whatever was captured.
    fn read(&mut self, frames: usize, out: &mut Vec<f32>);

    /// Drop `frames` sample frames without producing them. Live sources have
    /// nothing to skip.
    fn skip(&mut self, _frames: usize) {}
}

/// Copy `frames` samples from `samples` starting at `cursor`, wrapping when
/// `looping`. Returns the new cursor and whether playback reached the end.
fn copy_clocked(
    samples: &[f32],
    mut cursor: usize,
    frames: usize,
    looping: bool,
    out: &mut Vec<f32>,
) -> (usize, bool) {
    let mut ended = false;
    for _ in 0..frames {
        if cursor >= samples.len() {
            if looping && !samples.is_empty() {
                cursor = 0;
            } else {
                ended = true;
                out.push(0.0);
                continue;
            }
        }
        out.push(samples[cursor]);
        cursor += 1;
    }
    if !looping && cursor >= samples.len() {
        ended = true;
    }
    (cursor, ended)
}

/// Advance `cursor` by `frames` without copying. Returns the new cursor and
/// whether playback reached the end.
fn skip_clocked(len: usize, cursor: usize, frames: usize, looping: bool) -> (usize, bool) {
    if looping && len > 0 {
        ((cursor % len + frames % len) % len, false)
    } else {
        let cursor = cursor.saturating_add(frames).min(len);
        (cursor, cursor >= len)
    }
}

/// Buffer playback started the moment it is connected.
pub struct FileSource {
    audio: DecodedAudio,
    cursor: usize,
    looping: bool,
    playing: bool,
}

impl FileSource {
    pub fn new(audio: DecodedAudio, looping: bool) -> Self {
        Self {
            audio,
            cursor: 0,
            looping,
            playing: true,
        }
    }

    pub fn position(&self) -> Duration {
        if self.audio.sample_rate() == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.cursor as f64 / self.audio.sample_rate() as f64)
    }
}

impl SampleSource for FileSource {
    fn kind(&self) -> SourceKind {
        SourceKind::File
    }

    fn sample_rate(&self) -> u32 {
        self.audio.sample_rate()
    }

    fn is_playing(&self) -> bool {
        self.playing
    }

    fn read(&mut self, frames: usize, out: &mut Vec<f32>) {
        if !self.playing {
            out.extend(std::iter::repeat(0.0).take(frames));
            return;
        }
        let (cursor, ended) = copy_clocked(
            self.audio.samples(),
            self.cursor,
            frames,
            self.looping,
            out,
        );
        self.cursor = cursor;
        if ended {
            self.playing = false;
        }
    }

    fn skip(&mut self, frames: usize) {
        if !self.playing {
            return;
        }
        let (cursor, ended) = skip_clocked(self.audio.len(), self.cursor, frames, self.looping);
        self.cursor = cursor;
        if ended {
            self.playing = false;
        }
    }
}

/// Default capacity of a microphone queue, in samples.
pub const MICROPHONE_QUEUE_CAPACITY: usize = 16384;

/// Live capture queue shared between a capture thread and the frame loop.
///
/// The producer pushes samples as they arrive; the oldest samples are dropped
/// when the frame loop falls behind. Closing the stream tells the producer to
/// stop.
#[derive(Clone)]
pub struct MicrophoneStream {
    queue: Arc<Mutex<VecDeque<f32>>>,
    closed: Arc<AtomicBool>,
    sample_rate: u32,
    capacity: usize,
}

impl MicrophoneStream {
    pub fn new(sample_rate: u32) -> Self {
        Self::with_capacity(sample_rate, MICROPHONE_QUEUE_CAPACITY)
    }

    pub fn with_capacity(sample_rate: u32, capacity: usize) -> Self {
        Self {
            queue: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            closed: Arc::new(AtomicBool::new(false)),
            sample_rate,
            capacity: capacity.max(1),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Producer side: enqueue captured samples.
    pub fn push(&self, samples: &[f32]) {
        if self.is_closed() {
            return;
        }
        if let Ok(mut queue) = self.queue.lock() {
            for &sample in samples {
                if queue.len() == self.capacity {
                    queue.pop_front();
                }
                queue.push_back(sample);
            }
        }
    }

    /// Consumer side: move every queued sample into `out`.
    pub fn drain_into(&self, out: &mut Vec<f32>) {
        if let Ok(mut queue) = self.queue.lock() {
            out.extend(queue.drain(..));
        }
    }

    pub fn queued(&self) -> usize {
        self.queue.lock().map(|q| q.len()).unwrap_or(0)
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::Relaxed);
        if let Ok(mut queue) = self.queue.lock() {
            queue.clear();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Relaxed)
    }
}

/// Microphone input. Never loops; runs until disconnected.
pub struct MicrophoneSource {
    stream: MicrophoneStream,
}

impl MicrophoneSource {
    pub fn new(stream: MicrophoneStream) -> Self {
        Self { stream }
    }
}

impl SampleSource for MicrophoneSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Microphone
    }

    fn sample_rate(&self) -> u32 {
        self.stream.sample_rate()
    }

    fn is_playing(&self) -> bool {
        !self.stream.is_closed()
    }

    fn read(&mut self, _frames: usize, out: &mut Vec<f32>) {
        self.stream.drain_into(out);
    }
}

impl Drop for MicrophoneSource {
    fn drop(&mut self) {
        self.stream.close();
    }
}

struct ElementState {
    audio: DecodedAudio,
    cursor: usize,
    playing: bool,
    looping: bool,
}

/// Externally controlled playable element.
///
/// Clones share transport state, so the owner keeps a handle to play, pause
/// and seek while the adapter reads from another clone.
#[derive(Clone)]
pub struct MediaElement {
    state: Arc<Mutex<ElementState>>,
}

impl MediaElement {
    /// Starts paused, like a freshly loaded element.
    pub fn new(audio: DecodedAudio, looping: bool) -> Self {
        Self {
            state: Arc::new(Mutex::new(ElementState {
                audio,
                cursor: 0,
                playing: false,
                looping,
            })),
        }
    }

    pub fn play(&self) {
        if let Ok(mut state) = self.state.lock() {
            if state.cursor >= state.audio.len() {
                state.cursor = 0;
            }
            state.playing = true;
        }
    }

    pub fn pause(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.playing = false;
        }
    }

    pub fn is_playing(&self) -> bool {
        self.state.lock().map(|s| s.playing).unwrap_or(false)
    }

    pub fn sample_rate(&self) -> u32 {
        self.state.lock().map(|s| s.audio.sample_rate()).unwrap_or(0)
    }

    pub fn current_time(&self) -> Duration {
        self.state
            .lock()
            .map(|s| {
                let rate = s.audio.sample_rate();
                if rate == 0 {
                    Duration::ZERO
                } else {
                    Duration::from_secs_f64(s.cursor as f64 / rate as f64)
                }
            })
            .unwrap_or(Duration::ZERO)
    }

    pub fn seek(&self, position: Duration) {
        if let Ok(mut state) = self.state.lock() {
            let target = (position.as_secs_f64() * state.audio.sample_rate() as f64) as usize;
            state.cursor = target.min(state.audio.len());
        }
    }
}

/// Adapter-side reader of a [`MediaElement`].
pub struct ElementSource {
    element: MediaElement,
}

impl ElementSource {
    pub fn new(element: MediaElement) -> Self {
        Self { element }
    }
}

impl SampleSource for ElementSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Element
    }

    fn sample_rate(&self) -> u32 {
        self.element.sample_rate()
    }

    fn is_playing(&self) -> bool {
        self.element.is_playing()
    }

    fn read(&mut self, frames: usize, out: &mut Vec<f32>) {
        let Ok(mut state) = self.element.state.lock() else {
            out.extend(std::iter::repeat(0.0).take(frames));
            return;
        };
        if !state.playing {
            out.extend(std::iter::repeat(0.0).take(frames));
            return;
        }
        let looping = state.looping;
        let (cursor, ended) =
            copy_clocked(state.audio.samples(), state.cursor, frames, looping, out);
        state.cursor = cursor;
        if ended {
            state.playing = false;
        }
    }

    fn skip(&mut self, frames: usize) {
        let Ok(mut state) = self.element.state.lock() else {
            return;
        };
        if !state.playing {
            return;
        }
        let (cursor, ended) = skip_clocked(state.audio.len(), state.cursor, frames, state.looping);
        state.cursor = cursor;
        if ended {
            state.playing = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(len: usize) -> DecodedAudio {
        DecodedAudio::new((0..len).map(|i| i as f32).collect(), 100, 1)
    }

    #[test]
    fn file_source_loops() {
        let mut source = FileSource::new(ramp(4), true);
        let mut out = Vec::new();
        source.read(6, &mut out);
        assert_eq!(out, vec![0.0, 1.0, 2.0, 3.0, 0.0, 1.0]);
        assert!(source.is_playing());
    }

    #[test]
    fn skipping_advances_without_output() {
        let mut looping = FileSource::new(ramp(4), true);
        looping.skip(10);
        let mut out = Vec::new();
        looping.read(2, &mut out);
        assert_eq!(out, vec![2.0, 3.0]);

        let mut once = FileSource::new(ramp(4), false);
        once.skip(100);
        assert!(!once.is_playing());
        assert!((once.position().as_secs_f64() - 0.04).abs() < 1e-9);
    }

    #[test]
    fn non_looping_file_stops_and_pads_with_silence() {
        let mut source = FileSource::new(ramp(3), false);
        let mut out = Vec::new();
        source.read(5, &mut out);
        assert_eq!(out, vec![0.0, 1.0, 2.0, 0.0, 0.0]);
        assert!(!source.is_playing());

        out.clear();
        source.read(2, &mut out);
        assert_eq!(out, vec![0.0, 0.0]);
    }

    #[test]
    fn microphone_queue_drops_oldest_when_full() {
        let stream = MicrophoneStream::with_capacity(48000, 3);
        stream.push(&[1.0, 2.0, 3.0, 4.0]);
        let mut out = Vec::new();
        stream.drain_into(&mut out);
        assert_eq!(out, vec![2.0, 3.0, 4.0]);
        assert_eq!(stream.queued(), 0);
    }

    #[test]
    fn dropping_microphone_source_closes_stream() {
        let stream = MicrophoneStream::new(48000);
        let source = MicrophoneSource::new(stream.clone());
        assert!(source.is_playing());
        drop(source);
        assert!(stream.is_closed());
        stream.push(&[1.0]);
        assert_eq!(stream.queued(), 0);
    }

    #[test]
    fn paused_element_feeds_silence() {
        let element = MediaElement::new(ramp(10), false);
        let mut source = ElementSource::new(element.clone());
        let mut out = Vec::new();
        source.read(3, &mut out);
        assert_eq!(out, vec![0.0; 3]);

        element.play();
        out.clear();
        source.read(3, &mut out);
        assert_eq!(out, vec![0.0, 1.0, 2.0]);
        assert!((element.current_time().as_secs_f64() - 0.03).abs() < 1e-6);

        element.pause();
        out.clear();
        source.read(2, &mut out);
        assert_eq!(out, vec![0.0, 0.0]);
    }

    #[test]
    fn element_seek_is_clamped() {
        let element = MediaElement::new(ramp(10), false);
        element.seek(Duration::from_secs(5));
        assert!((element.current_time().as_secs_f64() - 0.1).abs() < 1e-6);
        element.play();
        assert!(element.is_playing());
        assert_eq!(element.current_time(), Duration::ZERO);
    }
}
