use vizpulse::bus::SignalFrame;
use vizpulse::driver::{self, Mapping, NoiseLane, ParamRange, ReactiveParam, Signal};
use vizpulse::signal::{split, VolumeState};

fn frame<'a>(
    levels: &'a vizpulse::signal::LevelsVector,
    volume: &'a VolumeState,
    auto_mode: bool,
    noise_time: f64,
) -> SignalFrame<'a> {
    SignalFrame {
        frame: 0,
        dt: 1.0 / 60.0,
        levels,
        volume,
        beat: None,
        beat_count: 0,
        tempo_progress: 0.0,
        noise_time,
        auto_mode,
    }
}

#[test]
fn direct_mapping_follows_volume_within_range() {
    let levels = split(&[], 4, 1.0);
    let mut volume = VolumeState::new(4);
    volume.instant = 0.4;

    let mut param = ReactiveParam::new(
        "size",
        ParamRange::new(0.0, 0.5),
        Mapping::direct(Signal::Instant, 2.0),
    );
    assert!((param.update(&frame(&levels, &volume, false, 0.0)) - 0.5).abs() < 1e-6);

    volume.instant = 0.1;
    assert!((param.update(&frame(&levels, &volume, false, 0.0)) - 0.2).abs() < 1e-6);
}

#[test]
fn manual_value_holds_until_auto_mode() {
    let levels = split(&[], 1, 1.0);
    let volume = VolumeState::new(1);
    let mut param = driver::tilt_amount(7);
    param.set_manual(0.1);

    assert_eq!(param.update(&frame(&levels, &volume, false, 3.0)), 0.1);

    let range = param.range();
    for step in 0..500 {
        let value = param.update(&frame(&levels, &volume, true, step as f64 * 0.01));
        assert!(value >= range.min && value <= range.max);
    }
}

#[test]
fn noise_lanes_are_deterministic_and_distinct() {
    let a = NoiseLane::new(3, 99.0, driver::AUTO_TIME_SCALE);
    let b = NoiseLane::new(3, 99.0, driver::AUTO_TIME_SCALE);
    let c = NoiseLane::new(3, 9999.0, driver::AUTO_TIME_SCALE);
    let times = [0.5, 1.7, 12.25];
    for t in times {
        assert_eq!(a.sample(t), b.sample(t));
    }
    assert!(times.iter().any(|&t| a.sample(t) != c.sample(t)));
}

#[test]
fn reversed_range_is_normalised() {
    let range = ParamRange::new(1.0, -1.0);
    assert_eq!(range.min, -1.0);
    assert_eq!(range.clamp(f32::NAN), -1.0);
    assert_eq!(range.from_unit(0.5), 0.0);
}
