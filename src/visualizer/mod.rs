mod bars;
mod flash;
mod pulse;

pub use bars::LevelBars;
pub use flash::TempoFlash;
pub use pulse::PulseRing;

use palette::{Hsv, IntoColor, Srgb};
use ratatui::prelude::*;
use std::cell::RefCell;
use std::rc::Rc;

use crate::bus::{SignalBus, SignalFrame, SubscriptionId, TempoBeat};
use crate::signal::BeatEvent;

/// A visual consumer of pipeline signals.
///
/// Effects keep their own parameters, update them from the bus callbacks
/// and draw from those parameters only.
pub trait Effect {
    fn name(&self) -> &'static str;

    fn on_frame(&mut self, _frame: &SignalFrame<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_beat(&mut self, _beat: &BeatEvent) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_tempo_beat(&mut self, _beat: &TempoBeat) -> anyhow::Result<()> {
        Ok(())
    }

    /// One-line readout of the current parameters.
    fn describe(&self) -> String;

    fn render(&self, frame: &mut Frame, area: Rect);
}

/// Subscribe `effect` to all three streams of `bus`.
pub fn attach<E>(effect: E, bus: &mut SignalBus) -> (Rc<RefCell<E>>, Vec<SubscriptionId>)
where
    E: Effect + 'static,
{
    let shared = Rc::new(RefCell::new(effect));

    let on_frame = Rc::clone(&shared);
    let on_beat = Rc::clone(&shared);
    let on_tempo = Rc::clone(&shared);
    let ids = vec![
        bus.on_frame(move |f| on_frame.borrow_mut().on_frame(f)),
        bus.on_beat(move |b| on_beat.borrow_mut().on_beat(b)),
        bus.on_tempo_beat(move |t| on_tempo.borrow_mut().on_tempo_beat(t)),
    ];
    (shared, ids)
}

/// The stock effect set, attached to one bus.
pub struct VisualizerState {
    effects: Vec<Rc<RefCell<dyn Effect>>>,
    subscriptions: Vec<SubscriptionId>,
}

impl VisualizerState {
    pub fn new(bus: &mut SignalBus, band_count: usize, noise_seed: u32) -> Self {
        let mut state = Self {
            effects: Vec::new(),
            subscriptions: Vec::new(),
        };
        state.add(LevelBars::new(band_count), bus);
        state.add(PulseRing::new(noise_seed), bus);
        state.add(TempoFlash::new(), bus);
        state
    }

    pub fn add<E: Effect + 'static>(&mut self, effect: E, bus: &mut SignalBus) {
        let (shared, ids) = attach(effect, bus);
        self.effects.push(shared);
        self.subscriptions.extend(ids);
    }

    pub fn len(&self) -> usize {
        self.effects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }

    /// Unsubscribe everything from `bus`.
    pub fn detach(&mut self, bus: &mut SignalBus) {
        for id in self.subscriptions.drain(..) {
            bus.unsubscribe(id);
        }
        self.effects.clear();
    }

    pub fn summary(&self) -> String {
        self.effects
            .iter()
            .map(|e| {
                let effect = e.borrow();
                format!("{}[{}]", effect.name(), effect.describe())
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Bars on top, ring and tempo flash below.
    pub fn render(&self, frame: &mut Frame, area: Rect) {
        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
            .split(area);
        let bottom = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
            .split(rows[1]);

        let slots = [rows[0], bottom[0], bottom[1]];
        for (effect, slot) in self.effects.iter().zip(slots) {
            effect.borrow().render(frame, slot);
        }
    }
}

/// HSV (hue in degrees, s and v in 0..=1) to an RGB terminal color.
pub(crate) fn hsv(hue: f32, saturation: f32, value: f32) -> Color {
    let hsv = Hsv::new(
        hue.rem_euclid(360.0),
        saturation.clamp(0.0, 1.0),
        value.clamp(0.0, 1.0),
    );
    let rgb: Srgb = hsv.into_color();
    let rgb: Srgb<u8> = rgb.into_format();
    Color::Rgb(rgb.red, rgb.green, rgb.blue)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hsv_primaries() {
        assert_eq!(hsv(0.0, 1.0, 1.0), Color::Rgb(255, 0, 0));
        assert_eq!(hsv(120.0, 1.0, 1.0), Color::Rgb(0, 255, 0));
        assert_eq!(hsv(240.0, 1.0, 1.0), Color::Rgb(0, 0, 255));
        assert_eq!(hsv(-120.0, 1.0, 1.0), Color::Rgb(0, 0, 255));
    }

    #[test]
    fn stock_effects_subscribe_to_every_stream() {
        let mut bus = SignalBus::new();
        let mut state = VisualizerState::new(&mut bus, 16, 0);
        assert_eq!(state.len(), 3);
        assert_eq!(bus.len(), 9);
        state.detach(&mut bus);
        assert!(bus.is_empty());
        assert!(state.is_empty());
    }
}
