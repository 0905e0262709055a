use anyhow::{Context, Result};
use std::path::PathBuf;
use std::time::Instant;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use crate::config::{Preset, Tunables};
use crate::error::ConfigError;
use crate::signal::SignalPipeline;

/// Commands sent from the IPC server to the frame loop
#[derive(Debug)]
pub enum IpcCommand {
    Status { reply: oneshot::Sender<String> },
    Threshold { value: f32, reply: oneshot::Sender<String> },
    Hold { frames: u32, reply: oneshot::Sender<String> },
    Decay { value: f32, reply: oneshot::Sender<String> },
    Gain { value: f32, reply: oneshot::Sender<String> },
    Bands { count: usize, reply: oneshot::Sender<String> },
    Bpm { value: f32, reply: oneshot::Sender<String> },
    Tap { reply: oneshot::Sender<String> },
    Auto { on: bool, reply: oneshot::Sender<String> },
    Preset { preset: Preset, reply: oneshot::Sender<String> },
    Ping { reply: oneshot::Sender<String> },
}

/// Get the socket path for IPC
pub fn socket_path() -> PathBuf {
    if let Ok(dir) = std::env::var("XDG_RUNTIME_DIR") {
        PathBuf::from(dir).join("vizpulse.sock")
    } else {
        PathBuf::from("/tmp/vizpulse.sock")
    }
}

/// Parse a protocol line into an IpcCommand
pub fn parse_command(line: &str, reply: oneshot::Sender<String>) -> Result<IpcCommand> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    match parts.as_slice() {
        ["status"] => Ok(IpcCommand::Status { reply }),
        ["threshold", val] => Ok(IpcCommand::Threshold {
            value: val.parse().context("Invalid threshold value")?,
            reply,
        }),
        ["hold", val] => Ok(IpcCommand::Hold {
            frames: val.parse().context("Invalid hold frame count")?,
            reply,
        }),
        ["decay", val] => Ok(IpcCommand::Decay {
            value: val.parse().context("Invalid decay rate")?,
            reply,
        }),
        ["gain", val] => Ok(IpcCommand::Gain {
            value: val.parse().context("Invalid gain value")?,
            reply,
        }),
        ["bands", val] => Ok(IpcCommand::Bands {
            count: val.parse().context("Invalid band count")?,
            reply,
        }),
        ["bpm", val] => Ok(IpcCommand::Bpm {
            value: val.parse().context("Invalid bpm value")?,
            reply,
        }),
        ["tap"] => Ok(IpcCommand::Tap { reply }),
        ["auto", "on"] => Ok(IpcCommand::Auto { on: true, reply }),
        ["auto", "off"] => Ok(IpcCommand::Auto { on: false, reply }),
        ["preset", name] => Ok(IpcCommand::Preset {
            preset: Preset::from_name(name)?,
            reply,
        }),
        ["ping"] => Ok(IpcCommand::Ping { reply }),
        _ => Err(anyhow::anyhow!("Unknown command: {}", line)),
    }
}

fn tuned(
    pipeline: &mut SignalPipeline,
    change: impl FnOnce(&mut Tunables) -> Result<(), ConfigError>,
    describe: impl FnOnce(&Tunables) -> String,
) -> String {
    match pipeline.tune(change) {
        Ok(()) => format!("ok: {}", describe(pipeline.tunables())),
        Err(e) => format!("err: {}", e),
    }
}

/// Apply a command to the pipeline between frames and send the reply.
pub fn process_ipc_command(cmd: IpcCommand, pipeline: &mut SignalPipeline, now: Instant) {
    match cmd {
        IpcCommand::Status { reply } => {
            let _ = reply.send(format!("ok: {}", pipeline.status()));
        }
        IpcCommand::Threshold { value, reply } => {
            let response = tuned(
                pipeline,
                |t| t.set_threshold(value),
                |t| format!("threshold={}", t.beat().threshold),
            );
            let _ = reply.send(response);
        }
        IpcCommand::Hold { frames, reply } => {
            let response = tuned(
                pipeline,
                |t| t.set_hold_frames(frames),
                |t| format!("hold={}", t.beat().hold_frames),
            );
            let _ = reply.send(response);
        }
        IpcCommand::Decay { value, reply } => {
            let response = tuned(
                pipeline,
                |t| t.set_decay_rate(value),
                |t| format!("decay={}", t.beat().decay_rate),
            );
            let _ = reply.send(response);
        }
        IpcCommand::Gain { value, reply } => {
            let response = tuned(
                pipeline,
                |t| t.set_gain(value),
                |t| format!("gain={}", t.gain()),
            );
            let _ = reply.send(response);
        }
        IpcCommand::Bands { count, reply } => {
            let response = tuned(
                pipeline,
                |t| t.set_band_count(count),
                |t| format!("bands={}", t.band_count()),
            );
            let _ = reply.send(response);
        }
        IpcCommand::Bpm { value, reply } => {
            let response = match pipeline.set_bpm(value, now) {
                Ok(()) => format!("ok: bpm={}", pipeline.tempo().bpm()),
                Err(e) => format!("err: {}", e),
            };
            let _ = reply.send(response);
        }
        IpcCommand::Tap { reply } => {
            let response = match pipeline.tap(now) {
                Some(beat) => format!("ok: bpm={}", beat.bpm),
                None => format!("ok: taps={}", pipeline.tempo().tapper().count()),
            };
            let _ = reply.send(response);
        }
        IpcCommand::Auto { on, reply } => {
            let response = tuned(
                pipeline,
                |t| {
                    t.set_auto_mode(on);
                    Ok(())
                },
                |t| format!("auto={}", if t.auto_mode() { "on" } else { "off" }),
            );
            let _ = reply.send(response);
        }
        IpcCommand::Preset { preset, reply } => {
            let config = preset.config();
            let response = tuned(
                pipeline,
                |t| {
                    let auto_mode = t.auto_mode();
                    *t = Tunables::from_config(&config)?;
                    t.set_auto_mode(auto_mode);
                    Ok(())
                },
                |_| format!("preset={}", preset),
            );
            let _ = reply.send(response);
        }
        IpcCommand::Ping { reply } => {
            let _ = reply.send("ok: pong".to_string());
        }
    }
}

/// Handle a single client connection
async fn handle_client(stream: UnixStream, cmd_tx: mpsc::Sender<IpcCommand>) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut buf_reader = BufReader::new(reader);
    let mut line = String::new();
    buf_reader.read_line(&mut line).await?;
    let line = line.trim();

    if line.is_empty() {
        return Ok(());
    }

    let (reply_tx, reply_rx) = oneshot::channel();

    let command = match parse_command(line, reply_tx) {
        Ok(cmd) => cmd,
        Err(e) => {
            writer
                .write_all(format!("err: {:#}\n", e).as_bytes())
                .await?;
            return Ok(());
        }
    };

    cmd_tx
        .send(command)
        .await
        .map_err(|_| anyhow::anyhow!("Frame loop has shut down"))?;

    let response = reply_rx
        .await
        .unwrap_or_else(|_| "err: internal error".to_string());

    writer
        .write_all(format!("{}\n", response).as_bytes())
        .await?;
    Ok(())
}

/// Start the IPC server, listening for commands on a Unix socket
pub async fn start_server(cmd_tx: mpsc::Sender<IpcCommand>) -> Result<()> {
    let path = socket_path();

    // Remove stale socket from previous run
    let _ = std::fs::remove_file(&path);

    let listener = UnixListener::bind(&path).context("Failed to bind IPC socket")?;

    info!("IPC server listening on {}", path.display());

    loop {
        let (stream, _) = listener.accept().await?;
        let cmd_tx = cmd_tx.clone();

        tokio::spawn(async move {
            if let Err(e) = handle_client(stream, cmd_tx).await {
                debug!("IPC client error: {}", e);
            }
        });
    }
}

/// Send a command to a running vizpulse instance (client mode)
pub async fn send_command(line: &str) -> Result<String> {
    let path = socket_path();

    let stream = tokio::time::timeout(
        std::time::Duration::from_secs(2),
        UnixStream::connect(&path),
    )
    .await
    .context("Connection timed out")?
    .context("Could not connect to vizpulse. Is it running with --ipc?")?;

    let (reader, mut writer) = stream.into_split();

    writer.write_all(format!("{}\n", line).as_bytes()).await?;
    writer.shutdown().await?;

    let mut buf_reader = BufReader::new(reader);
    let mut response = String::new();

    tokio::time::timeout(
        std::time::Duration::from_secs(2),
        buf_reader.read_line(&mut response),
    )
    .await
    .context("Response timed out")?
    .context("Failed to read response")?;

    Ok(response.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::SoftwarePlatform;
    use crate::config::Config;
    use std::sync::Arc;

    fn run(line: &str, pipeline: &mut SignalPipeline) -> String {
        let (tx, mut rx) = oneshot::channel();
        match parse_command(line, tx) {
            Ok(cmd) => {
                process_ipc_command(cmd, pipeline, Instant::now());
                rx.try_recv().unwrap()
            }
            Err(e) => format!("err: {:#}", e),
        }
    }

    fn pipeline() -> SignalPipeline {
        SignalPipeline::new(&Config::default(), Arc::new(SoftwarePlatform), Instant::now())
            .unwrap()
    }

    #[test]
    fn setters_round_trip_through_protocol() {
        let mut pipeline = pipeline();
        assert_eq!(run("threshold 0.25", &mut pipeline), "ok: threshold=0.25");
        assert_eq!(run("hold 12", &mut pipeline), "ok: hold=12");
        assert_eq!(run("bands 64", &mut pipeline), "ok: bands=64");
        assert_eq!(run("auto off", &mut pipeline), "ok: auto=off");
        assert_eq!(pipeline.detector().params().threshold, 0.25);
        assert!(!pipeline.tunables().auto_mode());
    }

    #[test]
    fn invalid_values_are_reported() {
        let mut pipeline = pipeline();
        assert!(run("decay 2", &mut pipeline).starts_with("err: decay_rate"));
        assert!(run("gain loud", &mut pipeline).starts_with("err: Invalid gain"));
        assert!(run("preset disco", &mut pipeline).starts_with("err: unknown preset"));
        assert!(run("jump", &mut pipeline).starts_with("err: Unknown command"));
        assert_eq!(pipeline.tunables().beat().decay_rate, 0.97);
    }

    #[test]
    fn preset_keeps_auto_mode() {
        let mut pipeline = pipeline();
        run("auto off", &mut pipeline);
        assert_eq!(run("preset lantern", &mut pipeline), "ok: preset=lantern");
        assert_eq!(pipeline.tunables().band_count(), 64);
        assert!(!pipeline.tunables().auto_mode());
    }

    #[test]
    fn status_and_ping() {
        let mut pipeline = pipeline();
        assert_eq!(run("ping", &mut pipeline), "ok: pong");
        assert!(run("status", &mut pipeline).starts_with("ok: frame=0"));
    }
}
