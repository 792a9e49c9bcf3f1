//! The morning clock.
//!
//! Each season begins with a sunrise. For a fixed number of intervals
//! after it, the morning auction ramps temperature toward the season's
//! maximum; after the last interval the temperature is pinned at the
//! maximum until the next sunrise.
//!
//! # Design Principles
//!
//! - [`compute_state`] is a pure function of the sunrise anchor and `now`.
//!   The same inputs always produce the same [`MorningState`].
//! - [`MorningClock`] only moves forward. A `now` earlier than the last
//!   one it saw returns the previous snapshot unchanged.
//! - A clock whose season has ended refuses to interpolate. It reports
//!   [`ClockError::StaleSeason`] until [`MorningClock::resync`] supplies a
//!   new authoritative sunrise.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use tracing::{info, warn};

use silo_types::{FixedPoint, MorningPhase, MorningState, TEMPERATURE_DECIMALS};

use crate::config::MorningConfig;
use crate::temperature::{CurveError, TemperatureCurve, scaled_temperature};

/// Errors that can occur during clock operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClockError {
    /// No sunrise has been observed (`sunrise_block == 0`).
    #[error("morning clock not initialized: no sunrise observed")]
    ClockNotInitialized,

    /// `now` is past the end of the anchored season.
    #[error("season anchored at block {sunrise_block} ended at {season_end}; resync required")]
    StaleSeason {
        /// Block of the stale sunrise.
        sunrise_block: u64,
        /// When that season ended.
        season_end: DateTime<Utc>,
    },

    /// Invalid morning configuration.
    #[error("invalid morning configuration: {reason}")]
    InvalidConfig {
        /// What is wrong.
        reason: String,
    },

    /// The temperature curve failed.
    #[error("temperature curve error: {0}")]
    Curve(#[from] CurveError),

    /// A time or block computation overflowed.
    #[error("arithmetic overflow computing {op}")]
    Arithmetic {
        /// The computation that overflowed.
        op: &'static str,
    },
}

/// The sunrise that starts a season.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SunriseAnchor {
    /// Block of the sunrise. Zero means no sunrise has been observed.
    pub block: u64,
    /// Timestamp of the sunrise.
    pub timestamp: DateTime<Utc>,
}

/// Compute the morning state at `now`.
///
/// ```text
/// seconds = max(0, floor(now) - floor(sunrise))
/// index   = min(seconds / seconds_per_interval, intervals)
/// block   = sunrise_block + index * l2_blocks_per_l1_block * 2
/// ```
///
/// # Errors
///
/// Returns [`ClockError::ClockNotInitialized`] if `anchor.block == 0`,
/// [`ClockError::InvalidConfig`] for an invalid `config`, or a curve or
/// arithmetic error.
pub fn compute_state<C: TemperatureCurve + ?Sized>(
    anchor: SunriseAnchor,
    now: DateTime<Utc>,
    config: &MorningConfig,
    curve: &C,
    max_temperature: FixedPoint,
) -> Result<MorningState, ClockError> {
    if anchor.block == 0 {
        return Err(ClockError::ClockNotInitialized);
    }
    config.validate().map_err(|err| ClockError::InvalidConfig {
        reason: err.to_string(),
    })?;

    let intervals = config.intervals_per_morning;
    let interval = config.seconds_per_interval;
    let seconds_since_sunrise = now
        .timestamp()
        .checked_sub(anchor.timestamp.timestamp())
        .ok_or(ClockError::Arithmetic {
            op: "seconds since sunrise",
        })?
        .max(0);

    let raw_index = seconds_since_sunrise
        .checked_div(interval)
        .ok_or(ClockError::Arithmetic { op: "interval index" })?;
    let index = u32::try_from(raw_index)
        .unwrap_or(u32::MAX)
        .min(intervals);
    let is_morning = index < intervals;

    let delta_blocks = u64::from(index)
        .checked_mul(config.approx_l2_blocks_per_l1_block)
        .and_then(|blocks| blocks.checked_mul(2))
        .ok_or(ClockError::Arithmetic { op: "block delta" })?;
    let block_number = anchor
        .block
        .checked_add(delta_blocks)
        .ok_or(ClockError::Arithmetic { op: "block number" })?;

    let deadline_offset = if is_morning {
        i64::from(index)
            .checked_add(1)
            .and_then(|next| next.checked_mul(interval))
    } else {
        Some(config.season_length_seconds)
    };
    let next_interval_deadline = deadline_offset
        .and_then(Duration::try_seconds)
        .and_then(|offset| anchor.timestamp.checked_add_signed(offset))
        .ok_or(ClockError::Arithmetic {
            op: "next interval deadline",
        })?;
    let remaining_seconds = next_interval_deadline
        .timestamp()
        .saturating_sub(now.timestamp())
        .max(0);

    let scaled = scaled_temperature(curve, index, intervals, max_temperature)?;

    Ok(MorningState {
        sunrise_block: anchor.block,
        sunrise_timestamp: anchor.timestamp,
        index: i32::try_from(index).map_err(|_err| ClockError::Arithmetic { op: "index" })?,
        phase: if is_morning {
            MorningPhase::Morning
        } else {
            MorningPhase::Elapsed
        },
        is_morning,
        seconds_since_sunrise,
        block_number,
        next_interval_deadline,
        remaining_seconds,
        max_temperature,
        scaled_temperature: scaled,
    })
}

/// Estimate when `block` was (or will be) produced, from the anchor and
/// the configured seconds per L2 block. Sub-second precision is kept to
/// the millisecond.
///
/// # Errors
///
/// Returns [`ClockError::Arithmetic`] if the estimate is out of range.
pub fn estimate_block_timestamp(
    anchor: SunriseAnchor,
    block: u64,
    config: &MorningConfig,
) -> Result<DateTime<Utc>, ClockError> {
    let delta = i128::from(block)
        .checked_sub(i128::from(anchor.block))
        .ok_or(ClockError::Arithmetic { op: "block delta" })?;
    let millis = Decimal::try_from_i128_with_scale(delta, 0)
        .ok()
        .and_then(|blocks| blocks.checked_mul(config.approx_secs_per_l2_block))
        .and_then(|secs| secs.checked_mul(Decimal::ONE_THOUSAND))
        .and_then(|ms| ms.trunc().to_i64())
        .ok_or(ClockError::Arithmetic {
            op: "block timestamp",
        })?;
    Duration::try_milliseconds(millis)
        .and_then(|offset| anchor.timestamp.checked_add_signed(offset))
        .ok_or(ClockError::Arithmetic {
            op: "block timestamp",
        })
}

// ---------------------------------------------------------------------------
// MorningClock
// ---------------------------------------------------------------------------

/// Forward-only morning state machine for one season at a time.
#[derive(Debug, Clone)]
pub struct MorningClock<C> {
    config: MorningConfig,
    curve: C,
    anchor: Option<SunriseAnchor>,
    last_now: Option<DateTime<Utc>>,
    stale: bool,
    state: MorningState,
}

impl<C: TemperatureCurve> MorningClock<C> {
    /// Create an uninitialized clock.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::InvalidConfig`] if the configuration is
    /// invalid, or [`ClockError::Curve`] if `curve` cannot describe a
    /// morning of `config.intervals_per_morning` intervals.
    pub fn new(config: MorningConfig, curve: C) -> Result<Self, ClockError> {
        config.validate().map_err(|err| ClockError::InvalidConfig {
            reason: err.to_string(),
        })?;
        curve.check_intervals(config.intervals_per_morning)?;
        Ok(Self {
            config,
            curve,
            anchor: None,
            last_now: None,
            stale: false,
            state: uninitialized_state(),
        })
    }

    /// The most recent snapshot. Index `-1` until the first sunrise.
    pub const fn state(&self) -> &MorningState {
        &self.state
    }

    /// The current sunrise anchor, if any.
    pub const fn anchor(&self) -> Option<SunriseAnchor> {
        self.anchor
    }

    /// The morning configuration.
    pub const fn config(&self) -> &MorningConfig {
        &self.config
    }

    /// Whether the clock is waiting for a resync.
    pub const fn is_stale(&self) -> bool {
        self.stale
    }

    /// Install a new authoritative sunrise and maximum temperature.
    ///
    /// Clears staleness and the forward-only watermark; the next
    /// [`advance`](Self::advance) computes from the new anchor.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::ClockNotInitialized`] if `anchor.block == 0`,
    /// or [`ClockError::Curve`] if `max_temperature` is negative.
    pub fn resync(
        &mut self,
        anchor: SunriseAnchor,
        max_temperature: FixedPoint,
    ) -> Result<(), ClockError> {
        if anchor.block == 0 {
            return Err(ClockError::ClockNotInitialized);
        }
        if max_temperature.is_negative() {
            return Err(CurveError::NegativeMaximum(max_temperature).into());
        }
        info!(
            sunrise_block = anchor.block,
            sunrise_timestamp = %anchor.timestamp,
            %max_temperature,
            "Morning clock resynced"
        );
        self.anchor = Some(anchor);
        self.last_now = None;
        self.stale = false;
        self.state.max_temperature = max_temperature;
        Ok(())
    }

    /// Advance to `now` and return the snapshot.
    ///
    /// # Errors
    ///
    /// - [`ClockError::ClockNotInitialized`] before the first
    ///   [`resync`](Self::resync).
    /// - [`ClockError::StaleSeason`] once `now` reaches the end of the
    ///   anchored season, and on every call after until a resync.
    pub fn advance(&mut self, now: DateTime<Utc>) -> Result<MorningState, ClockError> {
        let anchor = self.anchor.ok_or(ClockError::ClockNotInitialized)?;
        let season_end = Duration::try_seconds(self.config.season_length_seconds)
            .and_then(|length| anchor.timestamp.checked_add_signed(length))
            .ok_or(ClockError::Arithmetic { op: "season end" })?;
        if self.stale {
            return Err(ClockError::StaleSeason {
                sunrise_block: anchor.block,
                season_end,
            });
        }
        if self.last_now.is_some_and(|last| now < last) {
            return Ok(self.state.clone());
        }
        if now >= season_end {
            self.stale = true;
            warn!(
                sunrise_block = anchor.block,
                %season_end,
                %now,
                "Morning clock season is stale, waiting for resync"
            );
            return Err(ClockError::StaleSeason {
                sunrise_block: anchor.block,
                season_end,
            });
        }

        let max_temperature = self.state.max_temperature;
        let next = compute_state(anchor, now, &self.config, &self.curve, max_temperature)?;
        if next.phase != self.state.phase || next.sunrise_block != self.state.sunrise_block {
            info!(
                sunrise_block = next.sunrise_block,
                index = next.index,
                phase = ?next.phase,
                temperature = %next.scaled_temperature,
                "Morning phase changed"
            );
        }
        self.last_now = Some(now);
        self.state = next.clone();
        Ok(next)
    }

    /// Estimate the timestamp of `block` from the current anchor.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::ClockNotInitialized`] without an anchor, or
    /// [`ClockError::Arithmetic`] if the estimate is out of range.
    pub fn estimate_block_timestamp(&self, block: u64) -> Result<DateTime<Utc>, ClockError> {
        let anchor = self.anchor.ok_or(ClockError::ClockNotInitialized)?;
        estimate_block_timestamp(anchor, block, &self.config)
    }
}

/// The snapshot reported before any sunrise has been observed.
fn uninitialized_state() -> MorningState {
    MorningState {
        sunrise_block: 0,
        sunrise_timestamp: DateTime::UNIX_EPOCH,
        index: -1,
        phase: MorningPhase::Uninitialized,
        is_morning: false,
        seconds_since_sunrise: 0,
        block_number: 0,
        next_interval_deadline: DateTime::UNIX_EPOCH,
        remaining_seconds: 0,
        max_temperature: FixedPoint::zero(TEMPERATURE_DECIMALS),
        scaled_temperature: FixedPoint::zero(TEMPERATURE_DECIMALS),
    }
}
