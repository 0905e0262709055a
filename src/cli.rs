use clap::Parser;
use std::path::PathBuf;

use crate::config::Preset;
use crate::display::DisplayMode;

#[derive(Parser, Debug, Default)]
#[command(name = "vizpulse")]
#[command(author, version, about = "Audio-reactive levels, beats and tempo pulses for visual effects")]
pub struct Args {
    /// Display mode: terminal or headless
    #[arg(short, long)]
    pub mode: Option<DisplayMode>,

    /// Config file path (defaults to ~/.config/vizpulse/config.toml)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Start from a module tuning
    #[arg(short, long)]
    pub preset: Option<Preset>,

    /// Play and analyse a WAV file
    #[arg(short, long, conflicts_with = "mic")]
    pub file: Option<PathBuf>,

    /// Analyse live input instead of a file
    #[arg(long)]
    pub mic: bool,

    /// Capture device name (see `pactl list short sources`)
    #[arg(long)]
    pub device: Option<String>,

    /// Stop at the end of the file instead of looping
    #[arg(long)]
    pub no_loop: bool,

    /// Number of level bands
    #[arg(short, long)]
    pub bands: Option<usize>,

    /// Level gain multiplier
    #[arg(long)]
    pub gain: Option<f32>,

    /// Beat cutoff floor (0.0-1.0)
    #[arg(long)]
    pub threshold: Option<f32>,

    /// Frames the beat cutoff is frozen after a beat
    #[arg(long)]
    pub hold_frames: Option<u32>,

    /// Per-frame beat cutoff decay (0.0-1.0)
    #[arg(long)]
    pub decay_rate: Option<f32>,

    /// Metronome tempo
    #[arg(long)]
    pub bpm: Option<f32>,

    /// Frames per second
    #[arg(long)]
    pub fps: Option<u32>,

    /// Stop after this many frames (headless mode)
    #[arg(long)]
    pub frames: Option<u64>,

    /// Disable auto mode for the stock drivers
    #[arg(long)]
    pub no_auto: bool,

    /// Listen for live-tuning commands on the control socket
    #[arg(long)]
    pub ipc: bool,

    /// Write a commented default config file and exit
    #[arg(long)]
    pub init_config: bool,

    /// Send a command to a running instance and print the reply
    #[arg(long, num_args = 1.., value_name = "CMD")]
    pub send: Option<Vec<String>>,
}
