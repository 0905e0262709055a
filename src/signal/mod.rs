pub mod bands;
pub mod beat;
pub mod pipeline;
pub mod volume;

pub use bands::{split, LevelsVector, SignalBandSplitter};
pub use beat::{BeatDetector, BeatEvent, BeatParams, BeatPhase};
pub use pipeline::{FrameReport, PipelineStatus, SignalPipeline};
pub use volume::{History, VolumeState, VolumeTracker};
