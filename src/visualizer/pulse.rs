use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders};

use super::Effect;
use crate::bus::SignalFrame;
use crate::driver::{Mapping, NoiseLane, ParamRange, ReactiveParam, Signal, AUTO_TIME_SCALE};
use crate::signal::BeatEvent;

/// Per-frame decay of the beat flash.
const FLASH_DECAY: f32 = 0.9;

/// Ring whose radius follows the instant volume and whose hue drifts in auto
/// mode. Beats light it up.
pub struct PulseRing {
    size: ReactiveParam,
    hue: ReactiveParam,
    flash: f32,
}

impl PulseRing {
    pub fn new(noise_seed: u32) -> Self {
        Self {
            size: ReactiveParam::new(
                "size",
                ParamRange::UNIT,
                Mapping::direct(Signal::Instant, 1.5),
            ),
            hue: ReactiveParam::new("hue", ParamRange::new(0.0, 360.0), Mapping::Manual)
                .with_auto(NoiseLane::new(noise_seed, 999.0, AUTO_TIME_SCALE)),
            flash: 0.0,
        }
    }

    pub fn size(&self) -> f32 {
        self.size.value()
    }

    pub fn hue(&self) -> f32 {
        self.hue.value()
    }

    pub fn flash(&self) -> f32 {
        self.flash
    }
}

impl Effect for PulseRing {
    fn name(&self) -> &'static str {
        "ring"
    }

    fn on_frame(&mut self, frame: &SignalFrame<'_>) -> anyhow::Result<()> {
        self.size.update(frame);
        self.hue.update(frame);
        self.flash *= FLASH_DECAY;
        Ok(())
    }

    fn on_beat(&mut self, _beat: &BeatEvent) -> anyhow::Result<()> {
        self.flash = 1.0;
        Ok(())
    }

    fn describe(&self) -> String {
        format!(
            "size={:.2} hue={:.0} flash={:.2}",
            self.size(),
            self.hue(),
            self.flash
        )
    }

    fn render(&self, frame: &mut Frame, area: Rect) {
        let block = Block::default().borders(Borders::ALL).title(" pulse ");
        let inner = block.inner(area);
        frame.render_widget(block, area);

        if inner.width < 2 || inner.height < 2 {
            return;
        }

        // Terminal cells are about twice as tall as wide.
        let cx = inner.x as f32 + inner.width as f32 / 2.0;
        let cy = inner.y as f32 + inner.height as f32 / 2.0;
        let max_radius = (inner.height as f32 / 2.0).min(inner.width as f32 / 4.0);
        let radius = 1.0 + self.size() * (max_radius - 1.0).max(0.0);
        let color = super::hsv(self.hue(), 0.9 - 0.6 * self.flash, 0.5 + 0.5 * self.flash);

        for y in inner.y..inner.y + inner.height {
            for x in inner.x..inner.x + inner.width {
                let dx = (x as f32 + 0.5 - cx) / 2.0;
                let dy = y as f32 + 0.5 - cy;
                let distance = (dx * dx + dy * dy).sqrt();
                if (distance - radius).abs() < 0.6 {
                    if let Some(cell) = frame.buffer_mut().cell_mut((x, y)) {
                        cell.set_char('●');
                        cell.set_fg(color);
                    }
                }
            }
        }
    }
}
