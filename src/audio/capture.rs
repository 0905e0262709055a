use libpulse_binding as pulse;
use libpulse_simple_binding as psimple;
use pulse::sample::{Format, Spec};
use pulse::stream::Direction;
use std::sync::mpsc;
use std::thread;
use tracing::{debug, info, warn};

use super::platform::{AudioPlatform, AudioSink};
use super::source::MicrophoneStream;
use crate::error::AudioError;

const SAMPLE_RATE: u32 = 44100;
/// Stereo frames read per capture iteration (~23ms at 44.1kHz).
const READ_FRAMES: usize = 1024;

/// PulseAudio/PipeWire backed platform.
#[derive(Debug, Default)]
pub struct PulsePlatform;

fn stereo_spec() -> Spec {
    Spec {
        format: Format::F32le,
        channels: 2,
        rate: SAMPLE_RATE,
    }
}

fn map_connect_error(err: pulse::error::PAErr) -> AudioError {
    let message = err.to_string();
    if message.to_lowercase().contains("access denied") {
        AudioError::PermissionDenied(message)
    } else {
        AudioError::SourceUnavailable(message)
    }
}

impl AudioPlatform for PulsePlatform {
    fn name(&self) -> &str {
        "pulseaudio"
    }

    fn probe(&self) -> Result<(), AudioError> {
        let output = std::process::Command::new("pactl")
            .arg("info")
            .output()
            .map_err(|e| AudioError::PlatformUnsupported(format!("failed to run pactl: {}", e)))?;
        if !output.status.success() {
            return Err(AudioError::PlatformUnsupported(
                "no PulseAudio/PipeWire server reachable".into(),
            ));
        }
        Ok(())
    }

    fn open_microphone(&self, device: Option<&str>) -> Result<MicrophoneStream, AudioError> {
        let spec = stereo_spec();
        if !spec.is_valid() {
            return Err(AudioError::SourceUnavailable("invalid PulseAudio sample spec".into()));
        }

        info!("Opening capture device: {}", device.unwrap_or("default"));

        let pulse = psimple::Simple::new(
            None,                  // Use default server
            "vizpulse",            // Application name
            Direction::Record,     // Recording stream
            device,                // Device name (None = default)
            "audio-analysis",      // Stream description
            &spec,                 // Sample format
            None,                  // Default channel map
            None,                  // Default buffering attributes
        )
        .map_err(map_connect_error)?;

        let stream = MicrophoneStream::new(SAMPLE_RATE);
        let producer = stream.clone();
        thread::spawn(move || capture_loop(pulse, producer));

        Ok(stream)
    }

    fn open_sink(&self, sample_rate: u32) -> Result<Box<dyn AudioSink>, AudioError> {
        let spec = Spec {
            format: Format::F32le,
            channels: 1,
            rate: sample_rate,
        };
        if !spec.is_valid() {
            return Err(AudioError::SourceUnavailable(format!(
                "invalid playback rate: {}",
                sample_rate
            )));
        }

        let pulse = psimple::Simple::new(
            None,
            "vizpulse",
            Direction::Playback,
            None,
            "audio-playback",
            &spec,
            None,
            None,
        )
        .map_err(map_connect_error)?;

        let (tx, rx) = mpsc::channel::<Vec<f32>>();
        thread::spawn(move || playback_loop(pulse, rx));
        Ok(Box::new(PulseSink { tx }))
    }
}

fn capture_loop(pulse: psimple::Simple, stream: MicrophoneStream) {
    let mut bytes = vec![0u8; READ_FRAMES * 2 * std::mem::size_of::<f32>()];

    loop {
        if stream.is_closed() {
            debug!("Capture stream closed, ending capture loop");
            break;
        }

        if let Err(e) = pulse.read(&mut bytes) {
            warn!("PulseAudio read error: {}", e);
            continue;
        }

        // Convert interleaved stereo f32le to mono
        let mono: Vec<f32> = bytes
            .chunks_exact(8)
            .map(|frame| {
                let left = f32::from_le_bytes([frame[0], frame[1], frame[2], frame[3]]);
                let right = f32::from_le_bytes([frame[4], frame[5], frame[6], frame[7]]);
                (left + right) / 2.0
            })
            .collect();

        stream.push(&mono);
    }
}

struct PulseSink {
    tx: mpsc::Sender<Vec<f32>>,
}

impl AudioSink for PulseSink {
    fn write(&mut self, samples: &[f32]) {
        // Playback thread gone means the sink was torn down; nothing to do.
        let _ = self.tx.send(samples.to_vec());
    }
}

fn playback_loop(pulse: psimple::Simple, rx: mpsc::Receiver<Vec<f32>>) {
    while let Ok(samples) = rx.recv() {
        let bytes: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        if let Err(e) = pulse.write(&bytes) {
            warn!("PulseAudio write error: {}", e);
            break;
        }
    }
    debug!("Playback sink dropped, ending playback loop");
}
