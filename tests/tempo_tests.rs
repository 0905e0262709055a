use std::time::{Duration, Instant};

use vizpulse::bus::{TapTempo, TempoClock};

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

#[test]
fn four_taps_at_half_second_give_120_bpm() {
    let start = Instant::now();
    let mut tapper = TapTempo::default();
    let mut bpm = None;
    for i in 0..4 {
        bpm = tapper.tap(start + ms(500 * i)).or(bpm);
    }
    let bpm = bpm.unwrap();
    assert!((bpm - 120.0).abs() <= 1.0, "got {bpm}");
}

#[test]
fn long_pause_starts_a_new_sequence() {
    let start = Instant::now();
    let mut tapper = TapTempo::new(ms(2000));
    tapper.tap(start);
    tapper.tap(start + ms(500));
    assert_eq!(tapper.count(), 2);

    assert_eq!(tapper.tap(start + ms(5000)), None);
    assert_eq!(tapper.count(), 1);
    assert_eq!(tapper.tap(start + ms(5250)), Some(240.0));
}

#[test]
fn clock_ticks_at_the_configured_rate() {
    let start = Instant::now();
    let mut clock = TempoClock::new(120.0, ms(2000), start).unwrap();
    let beats = (1..=40)
        .filter_map(|i| clock.poll(start + ms(50 * i)))
        .count();
    assert_eq!(beats, 4);
    assert_eq!(clock.count(), 4);
}

#[test]
fn tapping_retimes_the_clock() {
    let start = Instant::now();
    let mut clock = TempoClock::new(60.0, ms(2000), start).unwrap();
    assert!(clock.tap(start).is_none());
    let beat = clock.tap(start + ms(250)).unwrap();
    assert_eq!(beat.bpm, 240.0);
    assert_eq!(clock.interval(), ms(250));
    assert!(clock.beat_progress(start + ms(250)) < 0.01);
}

#[test]
fn invalid_bpm_is_rejected() {
    let start = Instant::now();
    assert!(TempoClock::new(0.0, ms(2000), start).is_err());
    let mut clock = TempoClock::new(90.0, ms(2000), start).unwrap();
    assert!(clock.set_bpm(f32::NAN, start).is_err());
    assert_eq!(clock.bpm(), 90.0);
}
