use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders};

use super::Effect;
use crate::bus::SignalFrame;
use crate::driver::{Mapping, ParamRange, ReactiveParam};

/// One bar per band, each reading a band that shifts by one on every beat.
pub struct LevelBars {
    bars: Vec<ReactiveParam>,
}

impl LevelBars {
    pub fn new(band_count: usize) -> Self {
        let mut bars = Self { bars: Vec::new() };
        bars.resize(band_count);
        bars
    }

    fn resize(&mut self, band_count: usize) {
        self.bars = (0..band_count)
            .map(|index| {
                ReactiveParam::new(
                    format!("bar{}", index),
                    ParamRange::UNIT,
                    Mapping::Banded {
                        index,
                        stride: 1,
                        scale: 1.0,
                    },
                )
            })
            .collect();
    }

    pub fn heights(&self) -> Vec<f32> {
        self.bars.iter().map(|b| b.value()).collect()
    }
}

impl Effect for LevelBars {
    fn name(&self) -> &'static str {
        "bars"
    }

    fn on_frame(&mut self, frame: &SignalFrame<'_>) -> anyhow::Result<()> {
        if frame.levels.len() != self.bars.len() {
            self.resize(frame.levels.len());
        }
        // Bars follow the audio even in auto mode.
        let audio_only = SignalFrame {
            auto_mode: false,
            ..*frame
        };
        for bar in &mut self.bars {
            bar.update(&audio_only);
        }
        Ok(())
    }

    fn describe(&self) -> String {
        let peak = self.bars.iter().map(|b| b.value()).fold(0.0f32, f32::max);
        format!("bands={} peak={:.2}", self.bars.len(), peak)
    }

    fn render(&self, frame: &mut Frame, area: Rect) {
        let block = Block::default().borders(Borders::ALL).title(" levels ");
        let inner = block.inner(area);
        frame.render_widget(block, area);

        if inner.width == 0 || inner.height == 0 || self.bars.is_empty() {
            return;
        }

        let bar_count = self.bars.len().min(inner.width as usize);
        let bar_width = (inner.width / bar_count as u16).max(1);

        for (i, bar) in self.bars.iter().take(bar_count).enumerate() {
            let bar_height = ((bar.value() * inner.height as f32) as u16).min(inner.height);
            let x = inner.x + i as u16 * bar_width;
            let color = super::hsv(240.0 - 240.0 * i as f32 / bar_count as f32, 0.8, 1.0);

            // Draw bar from bottom up
            for y_offset in 0..bar_height {
                let y = inner.y + inner.height - 1 - y_offset;
                for bx in 0..bar_width.saturating_sub(1).max(1) {
                    let cell_x = x + bx;
                    if cell_x >= inner.x + inner.width {
                        break;
                    }
                    if let Some(cell) = frame.buffer_mut().cell_mut((cell_x, y)) {
                        cell.set_char('█');
                        cell.set_fg(color);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::{split, VolumeState};

    #[test]
    fn bars_rotate_one_band_per_beat() {
        let mut spectrum = vec![0u8; 8];
        spectrum[0] = 255;
        let levels = split(&spectrum, 4, 1.0);
        let volume = VolumeState::new(1);
        let mut bars = LevelBars::new(4);

        let mut frame = SignalFrame {
            frame: 0,
            dt: 0.016,
            levels: &levels,
            volume: &volume,
            beat: None,
            beat_count: 0,
            tempo_progress: 0.0,
            noise_time: 0.0,
            auto_mode: true,
        };
        bars.on_frame(&frame).unwrap();
        assert!(bars.heights()[0] > 0.4);
        assert_eq!(bars.heights()[3], 0.0);

        // After one beat bar 3 reads band 0.
        frame.beat_count = 1;
        bars.on_frame(&frame).unwrap();
        assert_eq!(bars.heights()[0], 0.0);
        assert!(bars.heights()[3] > 0.4);
    }

    #[test]
    fn resizes_with_band_count() {
        let levels = split(&[0; 64], 32, 1.0);
        let volume = VolumeState::new(1);
        let mut bars = LevelBars::new(16);
        let frame = SignalFrame {
            frame: 0,
            dt: 0.0,
            levels: &levels,
            volume: &volume,
            beat: None,
            beat_count: 0,
            tempo_progress: 0.0,
            noise_time: 0.0,
            auto_mode: false,
        };
        bars.on_frame(&frame).unwrap();
        assert_eq!(bars.heights().len(), 32);
    }
}
