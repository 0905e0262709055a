pub mod tempo;

pub use tempo::{TapTempo, TempoClock};

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use tracing::warn;

use crate::error::SubscriberFault;
use crate::signal::{BeatEvent, LevelsVector, VolumeState};

/// The three streams a consumer can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalCategory {
    PerFrame,
    OnBeat,
    OnTempoBeat,
}

impl fmt::Display for SignalCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalCategory::PerFrame => write!(f, "per-frame"),
            SignalCategory::OnBeat => write!(f, "on-beat"),
            SignalCategory::OnTempoBeat => write!(f, "on-tempo-beat"),
        }
    }
}

/// Stable handle for a registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Snapshot handed to per-frame subscribers. Everything in it belongs to the
/// same frame.
#[derive(Debug, Clone, Copy)]
pub struct SignalFrame<'a> {
    pub frame: u64,
    /// Seconds since the previous frame.
    pub dt: f64,
    pub levels: &'a LevelsVector,
    pub volume: &'a VolumeState,
    /// Set when the detector fired on this frame.
    pub beat: Option<BeatEvent>,
    /// Audio beats since the current source was connected.
    pub beat_count: u64,
    /// Phase within the current tempo beat, 0..=1.
    pub tempo_progress: f32,
    /// Time axis for auto-mode noise.
    pub noise_time: f64,
    pub auto_mode: bool,
}

/// A metronome pulse from the tempo clock.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TempoBeat {
    /// Tempo beats emitted so far, including this one.
    pub count: u64,
    pub bpm: f32,
}

pub type FrameCallback = Box<dyn FnMut(&SignalFrame<'_>) -> anyhow::Result<()>>;
pub type BeatCallback = Box<dyn FnMut(&BeatEvent) -> anyhow::Result<()>>;
pub type TempoCallback = Box<dyn FnMut(&TempoBeat) -> anyhow::Result<()>>;

/// A callback together with the stream it listens to.
pub enum Callback {
    PerFrame(FrameCallback),
    OnBeat(BeatCallback),
    OnTempoBeat(TempoCallback),
}

impl Callback {
    pub fn category(&self) -> SignalCategory {
        match self {
            Callback::PerFrame(_) => SignalCategory::PerFrame,
            Callback::OnBeat(_) => SignalCategory::OnBeat,
            Callback::OnTempoBeat(_) => SignalCategory::OnTempoBeat,
        }
    }
}

struct Subscription {
    id: SubscriptionId,
    callback: Callback,
}

/// Outcome of one publish call.
#[derive(Debug, Default)]
pub struct PublishReport {
    /// Subscribers that returned normally.
    pub delivered: usize,
    pub faults: Vec<SubscriberFault>,
}

impl PublishReport {
    pub fn is_clean(&self) -> bool {
        self.faults.is_empty()
    }

    pub fn merge(&mut self, other: PublishReport) {
        self.delivered += other.delivered;
        self.faults.extend(other.faults);
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic with non-string payload".to_string()
    }
}

/// Synchronous fan-out from the pipeline to an open set of consumers.
///
/// Subscribers of a category are called in registration order. A subscriber
/// that errors or panics is reported and skipped; delivery continues with
/// the next one.
#[derive(Default)]
pub struct SignalBus {
    subscriptions: Vec<Subscription>,
    next_id: u64,
}

impl SignalBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, callback: Callback) -> SubscriptionId {
        self.next_id += 1;
        let id = SubscriptionId(self.next_id);
        self.subscriptions.push(Subscription { id, callback });
        id
    }

    pub fn on_frame<F>(&mut self, f: F) -> SubscriptionId
    where
        F: FnMut(&SignalFrame<'_>) -> anyhow::Result<()> + 'static,
    {
        self.subscribe(Callback::PerFrame(Box::new(f)))
    }

    pub fn on_beat<F>(&mut self, f: F) -> SubscriptionId
    where
        F: FnMut(&BeatEvent) -> anyhow::Result<()> + 'static,
    {
        self.subscribe(Callback::OnBeat(Box::new(f)))
    }

    pub fn on_tempo_beat<F>(&mut self, f: F) -> SubscriptionId
    where
        F: FnMut(&TempoBeat) -> anyhow::Result<()> + 'static,
    {
        self.subscribe(Callback::OnTempoBeat(Box::new(f)))
    }

    /// Returns false if the handle was unknown.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscriptions.len();
        self.subscriptions.retain(|s| s.id != id);
        self.subscriptions.len() != before
    }

    /// Drop every subscription.
    pub fn clear(&mut self) {
        self.subscriptions.clear();
    }

    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    pub fn count(&self, category: SignalCategory) -> usize {
        self.subscriptions
            .iter()
            .filter(|s| s.callback.category() == category)
            .count()
    }

    pub fn publish_per_frame(&mut self, frame: &SignalFrame<'_>) -> PublishReport {
        self.deliver(SignalCategory::PerFrame, |callback| match callback {
            Callback::PerFrame(f) => Some(f(frame)),
            _ => None,
        })
    }

    pub fn publish_beat(&mut self, beat: &BeatEvent) -> PublishReport {
        self.deliver(SignalCategory::OnBeat, |callback| match callback {
            Callback::OnBeat(f) => Some(f(beat)),
            _ => None,
        })
    }

    pub fn publish_tempo_beat(&mut self, beat: &TempoBeat) -> PublishReport {
        self.deliver(SignalCategory::OnTempoBeat, |callback| match callback {
            Callback::OnTempoBeat(f) => Some(f(beat)),
            _ => None,
        })
    }

    fn deliver<F>(&mut self, category: SignalCategory, mut invoke: F) -> PublishReport
    where
        F: FnMut(&mut Callback) -> Option<anyhow::Result<()>>,
    {
        let mut report = PublishReport::default();

        for subscription in &mut self.subscriptions {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                invoke(&mut subscription.callback)
            }));

            let message = match outcome {
                Ok(None) => continue,
                Ok(Some(Ok(()))) => {
                    report.delivered += 1;
                    continue;
                }
                Ok(Some(Err(e))) => format!("{:#}", e),
                Err(payload) => format!("panicked: {}", panic_message(payload)),
            };

            warn!(
                "{} subscriber {} failed: {}",
                category, subscription.id, message
            );
            report.faults.push(SubscriberFault {
                category,
                id: subscription.id,
                message,
            });
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn beat() -> BeatEvent {
        BeatEvent {
            index: 0,
            frame: 0,
            volume: 0.5,
            cutoff: 0.55,
        }
    }

    #[test]
    fn delivers_in_registration_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut bus = SignalBus::new();
        for name in ["a", "b", "c"] {
            let log = Rc::clone(&log);
            bus.on_beat(move |_| {
                log.borrow_mut().push(name);
                Ok(())
            });
        }
        let report = bus.publish_beat(&beat());
        assert_eq!(*log.borrow(), vec!["a", "b", "c"]);
        assert_eq!(report.delivered, 3);
        assert!(report.is_clean());
    }

    #[test]
    fn categories_are_independent() {
        let hits = Rc::new(RefCell::new(0));
        let mut bus = SignalBus::new();
        let counter = Rc::clone(&hits);
        bus.on_tempo_beat(move |_| {
            *counter.borrow_mut() += 1;
            Ok(())
        });
        bus.publish_beat(&beat());
        assert_eq!(*hits.borrow(), 0);
        bus.publish_tempo_beat(&TempoBeat { count: 1, bpm: 120.0 });
        assert_eq!(*hits.borrow(), 1);
        assert_eq!(bus.count(SignalCategory::OnTempoBeat), 1);
        assert_eq!(bus.count(SignalCategory::OnBeat), 0);
    }

    #[test]
    fn unsubscribe_removes_only_that_handle() {
        let mut bus = SignalBus::new();
        let first = bus.on_beat(|_| Ok(()));
        let _second = bus.on_beat(|_| Ok(()));
        assert!(bus.unsubscribe(first));
        assert!(!bus.unsubscribe(first));
        assert_eq!(bus.len(), 1);
        bus.clear();
        assert!(bus.is_empty());
    }

    #[test]
    fn error_and_panic_are_isolated() {
        let reached = Rc::new(RefCell::new(false));
        let mut bus = SignalBus::new();
        let failing = bus.on_beat(|_| Err(anyhow::anyhow!("bad uniform")));
        let panicking = bus.on_beat(|_| panic!("boom"));
        let flag = Rc::clone(&reached);
        bus.on_beat(move |_| {
            *flag.borrow_mut() = true;
            Ok(())
        });

        let report = bus.publish_beat(&beat());
        assert!(*reached.borrow());
        assert_eq!(report.delivered, 1);
        assert_eq!(report.faults.len(), 2);
        assert_eq!(report.faults[0].id, failing);
        assert!(report.faults[0].message.contains("bad uniform"));
        assert_eq!(report.faults[1].id, panicking);
        assert!(report.faults[1].message.contains("boom"));
    }
}
