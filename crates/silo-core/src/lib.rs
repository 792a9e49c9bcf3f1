//! Morning clock, configuration, and async driver for the silo engine.
//!
//! The morning clock maps a sunrise anchor and the current time to an
//! interval index and an interpolated temperature. It runs independently
//! of deposit accounting; the two share only the notion of protocol time.
//!
//! # Modules
//!
//! - [`clock`] -- [`compute_state`](clock::compute_state) and the
//!   forward-only [`MorningClock`](clock::MorningClock) state machine
//! - [`config`] -- YAML configuration into strongly-typed structs
//! - [`temperature`] -- [`TemperatureCurve`](temperature::TemperatureCurve)
//!   strategies
//! - [`ticker`] -- Async tick driver publishing snapshots on a watch
//!   channel

pub mod clock;
pub mod config;
pub mod temperature;
pub mod ticker;

pub use clock::{ClockError, MorningClock, SunriseAnchor, compute_state, estimate_block_timestamp};
pub use config::{ConfigError, GerminationConfig, MorningConfig, SiloConfig, StemConfig};
pub use temperature::{
    BreakpointCurve, CurveError, LinearRampCurve, TemperatureCurve, scaled_temperature,
};
pub use ticker::{
    MorningCallback, NoOpCallback, SystemTime, TickerEnd, TickerResult, TickerSettings,
    TimeSource, run_morning_ticker,
};
