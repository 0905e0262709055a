use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Gauge};

use super::Effect;
use crate::bus::{SignalFrame, TempoBeat};

/// Seconds for a tempo flash to fade out.
const FADE_SECS: f32 = 0.25;

/// Metronome readout: flashes on each tempo beat and shows the phase.
#[derive(Debug, Default)]
pub struct TempoFlash {
    intensity: f32,
    progress: f32,
    bpm: f32,
    beats: u64,
}

impl TempoFlash {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intensity(&self) -> f32 {
        self.intensity
    }

    pub fn progress(&self) -> f32 {
        self.progress
    }
}

impl Effect for TempoFlash {
    fn name(&self) -> &'static str {
        "tempo"
    }

    fn on_frame(&mut self, frame: &SignalFrame<'_>) -> anyhow::Result<()> {
        self.intensity = (self.intensity - frame.dt as f32 / FADE_SECS).max(0.0);
        self.progress = frame.tempo_progress;
        Ok(())
    }

    fn on_tempo_beat(&mut self, beat: &TempoBeat) -> anyhow::Result<()> {
        self.intensity = 1.0;
        self.bpm = beat.bpm;
        self.beats = beat.count;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("bpm={} beats={} phase={:.2}", self.bpm, self.beats, self.progress)
    }

    fn render(&self, frame: &mut Frame, area: Rect) {
        let level = (self.intensity * 255.0) as u8;
        let title = if self.bpm > 0.0 {
            format!(" tempo {} bpm ", self.bpm)
        } else {
            " tempo ".to_string()
        };
        let gauge = Gauge::default()
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title(title)
                    .style(Style::default().bg(Color::Rgb(level / 2, level / 2, level))),
            )
            .gauge_style(Style::default().fg(Color::Magenta))
            .ratio(self.progress.clamp(0.0, 1.0) as f64);
        frame.render_widget(gauge, area);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::{LevelsVector, VolumeState};

    #[test]
    fn flash_fades_over_time() {
        let mut flash = TempoFlash::new();
        flash
            .on_tempo_beat(&TempoBeat {
                count: 1,
                bpm: 120.0,
            })
            .unwrap();
        assert_eq!(flash.intensity(), 1.0);

        let levels = LevelsVector::zeros(1);
        let volume = VolumeState::new(1);
        let frame = SignalFrame {
            frame: 1,
            dt: 0.125,
            levels: &levels,
            volume: &volume,
            beat: None,
            beat_count: 0,
            tempo_progress: 0.3,
            noise_time: 0.0,
            auto_mode: false,
        };
        flash.on_frame(&frame).unwrap();
        assert!((flash.intensity() - 0.5).abs() < 1e-6);
        assert_eq!(flash.progress(), 0.3);
        flash.on_frame(&frame).unwrap();
        flash.on_frame(&frame).unwrap();
        assert_eq!(flash.intensity(), 0.0);
    }
}
