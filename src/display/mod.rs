pub mod headless;
pub mod terminal;

use anyhow::Result;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::audio::{acquire_microphone, decode_async, default_platform, SourceHandle};
use crate::config::Config;
use crate::ipc::{self, IpcCommand};
use crate::signal::SignalPipeline;
use crate::visualizer::VisualizerState;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DisplayMode {
    #[default]
    Terminal,
    Headless,
}

/// Which source to connect before the first frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceRequest {
    None,
    File { path: PathBuf, looping: bool },
    Microphone { device: Option<String> },
}

/// Everything the frame loop owns.
pub struct Session {
    pub pipeline: SignalPipeline,
    pub visualizer: VisualizerState,
    pub fps: u32,
    pub max_frames: Option<u64>,
    commands: Option<mpsc::Receiver<IpcCommand>>,
    last_frame: Instant,
}

impl Session {
    /// Build the pipeline, attach the stock effects, connect the requested
    /// source and optionally start the control socket.
    ///
    /// Audio failures are logged and the session runs without sound.
    pub async fn start(
        config: &Config,
        source: SourceRequest,
        enable_ipc: bool,
        max_frames: Option<u64>,
    ) -> Result<Self> {
        let now = Instant::now();
        let mut pipeline = SignalPipeline::new(config, default_platform(), now)?;
        let visualizer = VisualizerState::new(
            pipeline.bus_mut(),
            config.audio.band_count,
            config.drivers.noise_seed,
        );

        connect_source(&mut pipeline, source).await;

        let commands = if enable_ipc {
            let (tx, rx) = mpsc::channel(32);
            tokio::spawn(async move {
                if let Err(e) = ipc::start_server(tx).await {
                    error!("IPC server stopped: {:#}", e);
                }
            });
            Some(rx)
        } else {
            None
        };

        Ok(Self {
            pipeline,
            visualizer,
            fps: config.display.fps,
            max_frames,
            commands,
            last_frame: now,
        })
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.fps.max(1) as f64)
    }

    /// Apply pending control commands. Runs between frames only.
    pub fn drain_commands(&mut self) {
        let Some(rx) = self.commands.as_mut() else {
            return;
        };
        while let Ok(cmd) = rx.try_recv() {
            ipc::process_ipc_command(cmd, &mut self.pipeline, Instant::now());
        }
    }

    /// Run one pipeline frame timed against the previous one.
    pub fn step(&mut self) -> crate::signal::FrameReport {
        let now = Instant::now();
        let dt = now.duration_since(self.last_frame).as_secs_f64();
        self.last_frame = now;
        self.pipeline.tick(dt, now)
    }

    pub fn finished(&self) -> bool {
        self.max_frames.is_some_and(|max| self.pipeline.frame() >= max)
    }
}

/// Connect the requested source. Failures are logged and leave the pipeline
/// without a source.
async fn connect_source(
    pipeline: &mut SignalPipeline,
    source: SourceRequest,
) -> Option<SourceHandle> {
    if source == SourceRequest::None {
        info!("No audio source requested, running with zero signals");
        return None;
    }
    // The adapter already reported why audio is off.
    if !pipeline.adapter().is_available() {
        debug!("Audio disabled, ignoring {:?}", source);
        return None;
    }

    let connected = match source {
        SourceRequest::None => return None,
        SourceRequest::File { path, looping } => {
            let bytes = match tokio::fs::read(&path).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    error!("Failed to read {}: {}", path.display(), e);
                    return None;
                }
            };
            let audio = match decode_async(bytes).await {
                Ok(audio) => audio,
                Err(e) => {
                    error!("{}: {}", path.display(), e);
                    return None;
                }
            };
            info!(
                "Loaded {} ({:.1}s @ {}Hz)",
                path.display(),
                audio.duration().as_secs_f64(),
                audio.sample_rate()
            );
            pipeline.connect_decoded(audio, looping)
        }
        SourceRequest::Microphone { device } => {
            match acquire_microphone(pipeline.adapter().platform(), device).await {
                Ok(stream) => pipeline.connect_microphone(stream),
                Err(e) => Err(e),
            }
        }
    };

    match connected {
        Ok(handle) => Some(handle),
        Err(e) => {
            error!("{}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::UnavailablePlatform;
    use std::io;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct LogBuffer(Arc<Mutex<Vec<u8>>>);

    impl io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn unavailable_audio_is_reported_once() {
        let logs = LogBuffer::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_max_level(tracing::Level::DEBUG)
            .with_writer(move || writer.clone())
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let mut pipeline = SignalPipeline::new(
            &Config::default(),
            Arc::new(UnavailablePlatform::new("no sound card")),
            Instant::now(),
        )
        .unwrap();
        let file = SourceRequest::File {
            path: PathBuf::from("/nonexistent/vizpulse-test.wav"),
            looping: true,
        };
        assert!(connect_source(&mut pipeline, file).await.is_none());
        let mic = SourceRequest::Microphone { device: None };
        assert!(connect_source(&mut pipeline, mic).await.is_none());

        let text = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
        assert_eq!(text.matches("no sound card").count(), 1);
        assert_eq!(text.matches("ERROR").count(), 1);
        assert!(!text.contains("Failed to read"));
    }

    #[tokio::test]
    async fn missing_file_still_runs_silently() {
        let source = SourceRequest::File {
            path: PathBuf::from("/nonexistent/vizpulse-test.wav"),
            looping: true,
        };
        let mut session = Session::start(&Config::default(), source, false, Some(3))
            .await
            .unwrap();
        assert!(!session.pipeline.adapter().is_connected());

        while !session.finished() {
            session.drain_commands();
            assert!(session.step().beat.is_none());
        }
        assert_eq!(session.pipeline.frame(), 3);
        assert_eq!(session.frame_interval(), Duration::from_secs_f64(1.0 / 60.0));
    }
}
