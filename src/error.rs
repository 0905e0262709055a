use thiserror::Error;

use crate::bus::{SignalCategory, SubscriptionId};

/// Failures at the audio I/O boundary.
///
/// None of these are fatal to the frame loop: the pipeline keeps running with
/// zero signals whenever no source is connected.
#[derive(Debug, Error)]
pub enum AudioError {
    /// Malformed or unsupported audio payload.
    #[error("failed to decode audio: {0}")]
    Decode(String),

    /// The platform refused audio capture.
    #[error("microphone access denied: {0}")]
    PermissionDenied(String),

    /// No audio subsystem is available for this process.
    #[error("audio platform unavailable: {0}")]
    PlatformUnsupported(String),

    /// A source could not be opened for a reason other than permission.
    #[error("audio source unavailable: {0}")]
    SourceUnavailable(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Rejected tunable or configuration value.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{name} must be {expected}, got {value}")]
    OutOfRange {
        name: &'static str,
        expected: &'static str,
        value: f64,
    },

    #[error("unknown preset: {0}")]
    UnknownPreset(String),
}

impl ConfigError {
    pub(crate) fn out_of_range(
        name: &'static str,
        expected: &'static str,
        value: impl Into<f64>,
    ) -> Self {
        ConfigError::OutOfRange {
            name,
            expected,
            value: value.into(),
        }
    }
}

/// A bus subscriber returned an error or panicked.
#[derive(Debug, Clone, Error)]
#[error("{category} subscriber {id} failed: {message}")]
pub struct SubscriberFault {
    pub category: SignalCategory,
    pub id: SubscriptionId,
    pub message: String,
}
