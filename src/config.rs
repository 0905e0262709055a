use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::cli::Args;
use crate::display::DisplayMode;
use crate::error::ConfigError;
use crate::signal::BeatParams;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub audio: AudioConfig,
    pub beat: BeatParams,
    pub tempo: TempoConfig,
    pub drivers: DriverConfig,
    pub display: DisplayConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Analyser window, a power of two in 32..=32768.
    pub fft_size: usize,
    /// Analyser spectral smoothing, 0..1.
    pub smoothing_time_constant: f32,
    pub band_count: usize,
    pub gain: f32,
    /// One-pole coefficient for the smoothed volume.
    pub volume_smoothing: f32,
    pub history_len: usize,
    /// Loop file playback at end of buffer.
    pub looping: bool,
    /// Capture device (None = default)
    pub device: Option<String>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            fft_size: 1024,
            smoothing_time_constant: 0.3,
            band_count: 16,
            gain: 1.0,
            volume_smoothing: 0.2,
            history_len: 256,
            looping: true,
            device: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TempoConfig {
    pub bpm: f32,
    pub tap_timeout_ms: u64,
}

impl Default for TempoConfig {
    fn default() -> Self {
        Self {
            bpm: 120.0,
            tap_timeout_ms: 2000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    pub auto_mode: bool,
    pub noise_seed: u32,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            auto_mode: true,
            noise_seed: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub mode: DisplayMode,
    pub fps: u32,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            mode: DisplayMode::Terminal,
            fps: 60,
        }
    }
}

/// Tunings of the stock visual modules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Preset {
    Lantern,
    Nero,
    Bbng,
    Loop,
    Splice,
    Pareidolia,
    WordProblems,
}

impl Preset {
    pub fn all() -> &'static [Preset] {
        &[
            Preset::Lantern,
            Preset::Nero,
            Preset::Bbng,
            Preset::Loop,
            Preset::Splice,
            Preset::Pareidolia,
            Preset::WordProblems,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            Preset::Lantern => "lantern",
            Preset::Nero => "nero",
            Preset::Bbng => "bbng",
            Preset::Loop => "loop",
            Preset::Splice => "splice",
            Preset::Pareidolia => "pareidolia",
            Preset::WordProblems => "word-problems",
        }
    }

    pub fn from_name(name: &str) -> Result<Self, ConfigError> {
        Preset::all()
            .iter()
            .copied()
            .find(|p| p.name().eq_ignore_ascii_case(name.trim()))
            .ok_or_else(|| ConfigError::UnknownPreset(name.to_string()))
    }

    /// Full configuration with this preset's constants over the defaults.
    pub fn config(&self) -> Config {
        // (fft, analyser smoothing, bands, gain, volume smoothing, threshold, hold, decay)
        let (fft_size, smoothing, bands, gain, volume, threshold, hold, decay) = match self {
            Preset::Lantern => (1024, 0.3, 64, 0.9, 0.2, 0.05, 50, 0.97),
            Preset::Nero => (1024, 0.3, 16, 1.0, 0.1, 0.3, 15, 0.98),
            Preset::Bbng | Preset::Loop => (1024, 0.1, 16, 1.0, 0.1, 0.4, 30, 0.97),
            Preset::Splice => (256, 0.8, 16, 1.0, 0.2, 0.15, 20, 0.97),
            Preset::Pareidolia => (512, 0.8, 16, 1.0, 0.2, 0.15, 20, 0.97),
            Preset::WordProblems => (1024, 0.3, 16, 1.0, 0.2, 0.3, 30, 0.97),
        };

        let mut config = Config::default();
        config.audio.fft_size = fft_size;
        config.audio.smoothing_time_constant = smoothing;
        config.audio.band_count = bands;
        config.audio.gain = gain;
        config.audio.volume_smoothing = volume;
        config.audio.looping = *self != Preset::Splice;
        config.beat = BeatParams {
            threshold,
            hold_frames: hold,
            decay_rate: decay,
        };
        config
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

pub const MAX_BAND_COUNT: usize = 1024;
pub const MAX_HOLD_FRAMES: u32 = 10_000;
pub const MAX_GAIN: f32 = 100.0;

/// Live-tunable values, changed only through validated setters.
///
/// A rejected value leaves the previous one in place.
#[derive(Debug, Clone, PartialEq)]
pub struct Tunables {
    band_count: usize,
    gain: f32,
    volume_smoothing: f32,
    analyser_smoothing: f32,
    beat: BeatParams,
    auto_mode: bool,
}

impl Tunables {
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let mut tunables = Tunables::default();
        tunables.set_band_count(config.audio.band_count)?;
        tunables.set_gain(config.audio.gain)?;
        tunables.set_volume_smoothing(config.audio.volume_smoothing)?;
        tunables.set_analyser_smoothing(config.audio.smoothing_time_constant)?;
        tunables.set_threshold(config.beat.threshold)?;
        tunables.set_hold_frames(config.beat.hold_frames)?;
        tunables.set_decay_rate(config.beat.decay_rate)?;
        tunables.set_auto_mode(config.drivers.auto_mode);
        Ok(tunables)
    }

    pub fn band_count(&self) -> usize {
        self.band_count
    }

    pub fn gain(&self) -> f32 {
        self.gain
    }

    pub fn volume_smoothing(&self) -> f32 {
        self.volume_smoothing
    }

    pub fn analyser_smoothing(&self) -> f32 {
        self.analyser_smoothing
    }

    pub fn beat(&self) -> BeatParams {
        self.beat
    }

    pub fn auto_mode(&self) -> bool {
        self.auto_mode
    }

    pub fn set_band_count(&mut self, band_count: usize) -> Result<(), ConfigError> {
        if band_count == 0 || band_count > MAX_BAND_COUNT {
            return Err(ConfigError::out_of_range(
                "band_count",
                "in 1..=1024",
                band_count as f64,
            ));
        }
        self.band_count = band_count;
        Ok(())
    }

    pub fn set_gain(&mut self, gain: f32) -> Result<(), ConfigError> {
        if !(gain.is_finite() && (0.0..=MAX_GAIN).contains(&gain)) {
            return Err(ConfigError::out_of_range("gain", "in [0, 100]", gain));
        }
        self.gain = gain;
        Ok(())
    }

    pub fn set_volume_smoothing(&mut self, coefficient: f32) -> Result<(), ConfigError> {
        if !(coefficient > 0.0 && coefficient < 1.0) {
            return Err(ConfigError::out_of_range(
                "volume_smoothing",
                "in (0, 1)",
                coefficient,
            ));
        }
        self.volume_smoothing = coefficient;
        Ok(())
    }

    pub fn set_analyser_smoothing(&mut self, smoothing: f32) -> Result<(), ConfigError> {
        if !(0.0..1.0).contains(&smoothing) {
            return Err(ConfigError::out_of_range(
                "smoothing_time_constant",
                "in [0, 1)",
                smoothing,
            ));
        }
        self.analyser_smoothing = smoothing;
        Ok(())
    }

    pub fn set_threshold(&mut self, threshold: f32) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&threshold) {
            return Err(ConfigError::out_of_range("threshold", "in [0, 1]", threshold));
        }
        self.beat.threshold = threshold;
        Ok(())
    }

    pub fn set_hold_frames(&mut self, hold_frames: u32) -> Result<(), ConfigError> {
        if hold_frames > MAX_HOLD_FRAMES {
            return Err(ConfigError::out_of_range(
                "hold_frames",
                "at most 10000",
                hold_frames,
            ));
        }
        self.beat.hold_frames = hold_frames;
        Ok(())
    }

    pub fn set_decay_rate(&mut self, decay_rate: f32) -> Result<(), ConfigError> {
        if !(decay_rate > 0.0 && decay_rate < 1.0) {
            return Err(ConfigError::out_of_range("decay_rate", "in (0, 1)", decay_rate));
        }
        self.beat.decay_rate = decay_rate;
        Ok(())
    }

    pub fn set_auto_mode(&mut self, auto_mode: bool) {
        self.auto_mode = auto_mode;
    }
}

impl Default for Tunables {
    fn default() -> Self {
        let audio = AudioConfig::default();
        Self {
            band_count: audio.band_count,
            gain: audio.gain,
            volume_smoothing: audio.volume_smoothing,
            analyser_smoothing: audio.smoothing_time_constant,
            beat: BeatParams::default(),
            auto_mode: DriverConfig::default().auto_mode,
        }
    }
}

fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        if let toml::Value::Table(overlay_table) = value {
            if let Some(toml::Value::Table(base_table)) = base.get_mut(&key) {
                merge_tables(base_table, overlay_table);
                continue;
            }
            base.insert(key, toml::Value::Table(overlay_table));
        } else {
            base.insert(key, value);
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        Self::load_over(Config::default(), path)
    }

    /// Load `path` on top of `base`: keys present in the file win, everything
    /// else keeps the base value.
    pub fn load_over(base: Config, path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::parse_over(base, &content)
            .with_context(|| format!("Failed to parse config {}", path.display()))
    }

    pub fn parse_over(base: Config, content: &str) -> Result<Self> {
        let overlay: toml::Table = toml::from_str(content)?;
        let mut merged = match toml::Value::try_from(&base)? {
            toml::Value::Table(table) => table,
            _ => anyhow::bail!("configuration did not serialize to a table"),
        };
        merge_tables(&mut merged, overlay);
        let config: Config = toml::Value::Table(merged).try_into()?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default XDG config path (~/.config/vizpulse/config.toml)
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("vizpulse").join("config.toml"))
    }

    /// Load the default XDG config over `base` if the file exists.
    /// Parse errors are logged and the base is kept.
    pub fn load_from_default_path(base: Config) -> Config {
        let Some(path) = Self::default_path() else {
            return base;
        };
        if !path.exists() {
            return base;
        }
        match Self::load_over(base.clone(), &path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("{:#}. Using defaults.", e);
                base
            }
        }
    }

    /// Initialize default config file at XDG path, returns the path
    pub fn init_default_config() -> Result<PathBuf> {
        let path = Self::default_path()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(&path, Self::generate_config_template())?;

        Ok(path)
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        Tunables::from_config(self)?;
        let fft = self.audio.fft_size;
        if !(32..=32768).contains(&fft) || !fft.is_power_of_two() {
            return Err(ConfigError::out_of_range(
                "fft_size",
                "a power of two in 32..=32768",
                fft as f64,
            ));
        }
        if self.audio.history_len == 0 {
            return Err(ConfigError::out_of_range("history_len", "at least 1", 0.0));
        }
        if !(self.tempo.bpm.is_finite() && self.tempo.bpm > 0.0 && self.tempo.bpm <= 999.0) {
            return Err(ConfigError::out_of_range("bpm", "in (0, 999]", self.tempo.bpm));
        }
        if self.display.fps == 0 || self.display.fps > 240 {
            return Err(ConfigError::out_of_range(
                "fps",
                "in 1..=240",
                self.display.fps,
            ));
        }
        Ok(())
    }

    /// Generate a commented TOML config template
    pub fn generate_config_template() -> String {
        r#"# vizpulse configuration
# This file is auto-generated. Edit as needed.
# Values here override a --preset; command line flags override both.

[audio]
# Analyser FFT size (power of two, 32-32768)
fft_size = 1024
# Analyser spectral smoothing (0.0-1.0, higher = smoother)
smoothing_time_constant = 0.3
# Number of level bands
band_count = 16
# Level gain multiplier
gain = 1.0
# Smoothed volume coefficient (0.0-1.0, exclusive, lower = slower)
volume_smoothing = 0.2
# Volume history length in frames
history_len = 256
# Loop file playback
looping = true
# Capture device (omit for default)
# device = "alsa_output.pci-0000_00_1f.3.analog-stereo.monitor"

[beat]
# Cutoff floor (0.0-1.0)
threshold = 0.15
# Frames the cutoff is frozen after a beat
hold_frames = 30
# Per-frame cutoff decay once the hold is over (0.0-1.0, exclusive)
decay_rate = 0.97

[tempo]
# Metronome tempo
bpm = 120.0
# Taps further apart than this start a new tap sequence
tap_timeout_ms = 2000

[drivers]
# Auto mode: stock drivers follow noise instead of manual values
auto_mode = true
noise_seed = 0

[display]
# Display mode: "terminal" or "headless"
mode = "terminal"
# Frames per second
fps = 60
"#
        .to_string()
    }

    /// Merge CLI arguments into config (CLI takes priority)
    pub fn merge_args(&mut self, args: &Args) {
        if let Some(mode) = args.mode {
            self.display.mode = mode;
        }
        if let Some(fps) = args.fps {
            self.display.fps = fps;
        }

        if let Some(ref device) = args.device {
            self.audio.device = Some(device.clone());
        }
        if let Some(bands) = args.bands {
            self.audio.band_count = bands;
        }
        if let Some(gain) = args.gain {
            self.audio.gain = gain;
        }
        if args.no_loop {
            self.audio.looping = false;
        }

        if let Some(threshold) = args.threshold {
            self.beat.threshold = threshold;
        }
        if let Some(hold) = args.hold_frames {
            self.beat.hold_frames = hold;
        }
        if let Some(decay) = args.decay_rate {
            self.beat.decay_rate = decay;
        }

        if let Some(bpm) = args.bpm {
            self.tempo.bpm = bpm;
        }
        if args.no_auto {
            self.drivers.auto_mode = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn volume_smoothing_must_stay_a_low_pass() {
        let mut tunables = Tunables::default();
        assert!(tunables.set_volume_smoothing(1.0).is_err());
        assert!(tunables.set_volume_smoothing(0.0).is_err());
        assert_eq!(tunables.volume_smoothing(), 0.2);
        tunables.set_volume_smoothing(0.99).unwrap();
        assert_eq!(tunables.volume_smoothing(), 0.99);

        let err = Config::parse_over(Config::default(), "[audio]\nvolume_smoothing = 1.0\n");
        assert!(err.is_err());
    }

    #[test]
    fn template_parses_to_defaults() {
        let config = Config::parse_over(Config::default(), &Config::generate_config_template())
            .unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn file_overrides_preset_only_where_set() {
        let base = Preset::Lantern.config();
        let config = Config::parse_over(base, "[beat]\nthreshold = 0.25\n").unwrap();
        assert_eq!(config.beat.threshold, 0.25);
        assert_eq!(config.beat.hold_frames, 50);
        assert_eq!(config.audio.band_count, 64);
        assert_eq!(config.audio.gain, 0.9);
    }

    #[test]
    fn invalid_file_values_are_rejected() {
        assert!(Config::parse_over(Config::default(), "[beat]\ndecay_rate = 1.5\n").is_err());
        assert!(Config::parse_over(Config::default(), "[audio]\nfft_size = 1000\n").is_err());
        assert!(Config::parse_over(Config::default(), "not toml at all [").is_err());
    }

    #[test]
    fn presets_carry_module_constants() {
        let nero = Preset::Nero.config();
        assert_eq!(nero.audio.band_count, 16);
        assert_eq!(nero.beat.decay_rate, 0.98);
        assert!(!Preset::Splice.config().audio.looping);
        assert_eq!(Preset::Pareidolia.config().audio.fft_size, 512);
        for preset in Preset::all() {
            assert!(preset.config().validate().is_ok(), "{preset}");
        }
    }

    #[test]
    fn preset_names_round_trip() {
        assert_eq!(Preset::from_name("Word-Problems"), Ok(Preset::WordProblems));
        assert_eq!(
            Preset::from_name("nope"),
            Err(ConfigError::UnknownPreset("nope".into()))
        );
    }

    #[test]
    fn rejected_setter_keeps_previous_value() {
        let mut tunables = Tunables::default();
        tunables.set_decay_rate(0.9).unwrap();
        assert!(tunables.set_decay_rate(1.0).is_err());
        assert!(tunables.set_decay_rate(f32::NAN).is_err());
        assert_eq!(tunables.beat().decay_rate, 0.9);

        assert!(tunables.set_band_count(0).is_err());
        assert_eq!(tunables.band_count(), 16);
        assert!(tunables.set_threshold(-0.1).is_err());
        assert!(tunables.set_gain(f32::INFINITY).is_err());
    }

    #[test]
    fn cli_flags_win() {
        let args = Args {
            bands: Some(32),
            threshold: Some(0.2),
            no_auto: true,
            no_loop: true,
            ..Default::default()
        };
        let mut config = Preset::Nero.config();
        config.merge_args(&args);
        assert_eq!(config.audio.band_count, 32);
        assert_eq!(config.beat.threshold, 0.2);
        assert_eq!(config.beat.hold_frames, 15);
        assert!(!config.drivers.auto_mode);
        assert!(!config.audio.looping);
    }
}
