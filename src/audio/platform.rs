use std::sync::Arc;

use super::source::MicrophoneStream;
use crate::error::AudioError;

/// Destination for audible playback of file sources.
pub trait AudioSink: Send {
    fn write(&mut self, samples: &[f32]);
}

/// Discards everything written to it.
#[derive(Debug, Default)]
pub struct NullSink;

impl AudioSink for NullSink {
    fn write(&mut self, _samples: &[f32]) {}
}

/// The host audio subsystem.
///
/// `probe` runs once when the adapter is created; a failure there disables
/// the audio pipeline for the lifetime of the process.
pub trait AudioPlatform: Send + Sync {
    fn name(&self) -> &str;

    fn probe(&self) -> Result<(), AudioError>;

    /// Start capturing from an input device. May block on the platform.
    fn open_microphone(&self, device: Option<&str>) -> Result<MicrophoneStream, AudioError>;

    fn open_sink(&self, sample_rate: u32) -> Result<Box<dyn AudioSink>, AudioError>;
}

/// Pure in-process platform: files and elements work, nothing is audible and
/// there is no capture device.
#[derive(Debug, Default)]
pub struct SoftwarePlatform;

impl AudioPlatform for SoftwarePlatform {
    fn name(&self) -> &str {
        "software"
    }

    fn probe(&self) -> Result<(), AudioError> {
        Ok(())
    }

    fn open_microphone(&self, _device: Option<&str>) -> Result<MicrophoneStream, AudioError> {
        Err(AudioError::SourceUnavailable(
            "no capture backend compiled in (enable the `pulse` feature)".into(),
        ))
    }

    fn open_sink(&self, _sample_rate: u32) -> Result<Box<dyn AudioSink>, AudioError> {
        Ok(Box::new(NullSink))
    }
}

/// Platform whose probe always fails, for hosts without any audio support.
#[derive(Debug)]
pub struct UnavailablePlatform {
    reason: String,
}

impl UnavailablePlatform {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl AudioPlatform for UnavailablePlatform {
    fn name(&self) -> &str {
        "unavailable"
    }

    fn probe(&self) -> Result<(), AudioError> {
        Err(AudioError::PlatformUnsupported(self.reason.clone()))
    }

    fn open_microphone(&self, _device: Option<&str>) -> Result<MicrophoneStream, AudioError> {
        Err(AudioError::PlatformUnsupported(self.reason.clone()))
    }

    fn open_sink(&self, _sample_rate: u32) -> Result<Box<dyn AudioSink>, AudioError> {
        Err(AudioError::PlatformUnsupported(self.reason.clone()))
    }
}

/// Best platform compiled into this build.
pub fn default_platform() -> Arc<dyn AudioPlatform> {
    #[cfg(feature = "pulse")]
    {
        Arc::new(super::capture::PulsePlatform::default())
    }
    #[cfg(not(feature = "pulse"))]
    {
        Arc::new(SoftwarePlatform)
    }
}

/// Acquire a capture stream without blocking the caller's task.
pub async fn acquire_microphone(
    platform: Arc<dyn AudioPlatform>,
    device: Option<String>,
) -> Result<MicrophoneStream, AudioError> {
    tokio::task::spawn_blocking(move || platform.open_microphone(device.as_deref()))
        .await
        .map_err(|e| AudioError::SourceUnavailable(format!("capture task failed: {}", e)))?
}
