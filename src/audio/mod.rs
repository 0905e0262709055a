pub mod adapter;
pub mod analyser;
#[cfg(feature = "pulse")]
pub mod capture;
pub mod decode;
pub mod platform;
pub mod source;

pub use adapter::{AudioSourceAdapter, SourceHandle};
pub use analyser::{AnalyserTap, SpectrumFrame};
pub use decode::{decode, decode_async};
pub use platform::{
    acquire_microphone, default_platform, AudioPlatform, AudioSink, NullSink, SoftwarePlatform,
    UnavailablePlatform,
};
pub use source::{DecodedAudio, MediaElement, MicrophoneStream, SourceKind};
