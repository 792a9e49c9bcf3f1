//! Morning clock properties over seeded random anchors and times.

#![allow(clippy::unwrap_used, clippy::arithmetic_side_effects)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use silo_core::{
    BreakpointCurve, LinearRampCurve, MorningClock, MorningConfig, SunriseAnchor,
    TemperatureCurve, compute_state,
};
use silo_types::{FixedPoint, TEMPERATURE_DECIMALS};

const CASES: usize = 300;

fn random_anchor(rng: &mut StdRng) -> SunriseAnchor {
    let base = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
    SunriseAnchor {
        block: rng.random_range(1..50_000_000),
        timestamp: base + Duration::seconds(rng.random_range(0..100_000_000)),
    }
}

fn random_max(rng: &mut StdRng) -> FixedPoint {
    FixedPoint::from_raw(rng.random_range(0..5_000_000_000), TEMPERATURE_DECIMALS)
}

fn offset(anchor: SunriseAnchor, seconds: i64) -> DateTime<Utc> {
    anchor.timestamp + Duration::seconds(seconds)
}

fn stepped_curve() -> BreakpointCurve {
    // Quadratic-ish fractions with six decimals.
    let fractions = (0_i128..25)
        .map(|i| FixedPoint::from_raw(i * i * 1_000_000 / 576, 6))
        .collect();
    BreakpointCurve::new(fractions, 25).unwrap()
}

fn check_curve<C: TemperatureCurve>(curve: &C, seed: u64) {
    let mut rng = StdRng::seed_from_u64(seed);
    let config = MorningConfig::default();

    for _ in 0..CASES {
        let anchor = random_anchor(&mut rng);
        let max = random_max(&mut rng);
        let a = rng.random_range(-100..4_000);
        let b = rng.random_range(-100..4_000);
        let (early, late) = (a.min(b), a.max(b));

        let first = compute_state(anchor, offset(anchor, early), &config, curve, max).unwrap();
        let second = compute_state(anchor, offset(anchor, late), &config, curve, max).unwrap();

        assert!((0..=25).contains(&first.index));
        assert!((0..=25).contains(&second.index));
        assert!(first.index <= second.index);
        assert!(first.scaled_temperature.checked_cmp(second.scaled_temperature).unwrap().is_le());
        assert!(second.scaled_temperature.checked_cmp(max).unwrap().is_le());
        if second.index >= 24 {
            assert_eq!(second.scaled_temperature, max);
        }
        assert_eq!(
            first,
            compute_state(anchor, offset(anchor, early), &config, curve, max).unwrap()
        );
    }
}

#[test]
fn linear_ramp_is_monotone_and_clamped() {
    check_curve(&LinearRampCurve::default(), 0xc10c_0001);
}

#[test]
fn breakpoint_curve_is_monotone_and_clamped() {
    check_curve(&stepped_curve(), 0xc10c_0002);
}

#[test]
fn stateful_clock_never_goes_backwards() {
    let mut rng = StdRng::seed_from_u64(0xc10c_0003);

    for _ in 0..50 {
        let anchor = random_anchor(&mut rng);
        let mut clock = MorningClock::new(MorningConfig::default(), stepped_curve()).unwrap();
        clock.resync(anchor, random_max(&mut rng)).unwrap();

        let mut highest = -1;
        for _ in 0..40 {
            let now = offset(anchor, rng.random_range(-50..3_600));
            let state = clock.advance(now).unwrap();
            assert!(state.index >= highest);
            highest = state.index;
        }
    }
}
