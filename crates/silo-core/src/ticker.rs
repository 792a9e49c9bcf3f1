//! Async driver for the morning clock.
//!
//! [`run_morning_ticker`] advances a [`MorningClock`] on a fixed cadence
//! and publishes every new snapshot on a [`tokio::sync::watch`] channel.
//! Consumers subscribe to the channel rather than polling shared state.
//! The driver is the only place the engine reads wall-clock time, through
//! a [`TimeSource`].

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::{info, warn};

use silo_types::MorningState;

use crate::clock::{ClockError, MorningClock};
use crate::temperature::TemperatureCurve;

/// Where the driver reads the current time.
pub trait TimeSource: Send + Sync {
    /// The current instant.
    fn now(&self) -> DateTime<Utc>;
}

/// Reads the system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTime;

impl TimeSource for SystemTime {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Callback invoked when the published morning state changes.
///
/// Implementations can refresh a cached temperature, notify a UI, or
/// fetch a new sunrise when the season goes stale.
pub trait MorningCallback: Send {
    /// Called when the interval index or phase changes.
    fn on_transition(&mut self, previous: &MorningState, current: &MorningState);

    /// Called once when the clock reports a stale season.
    fn on_stale(&mut self, _last: &MorningState) {}
}

/// A no-op callback.
pub struct NoOpCallback;

impl MorningCallback for NoOpCallback {
    fn on_transition(&mut self, _previous: &MorningState, _current: &MorningState) {}
}

/// Why the ticker stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickerEnd {
    /// The season ended; the clock needs a resync.
    StaleSeason,
    /// Every subscriber dropped its receiver.
    ReceiversClosed,
    /// The configured number of ticks ran.
    TickLimit,
}

/// Result of a ticker run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickerResult {
    /// Why the ticker stopped.
    pub end: TickerEnd,
    /// Ticks executed.
    pub ticks: u64,
    /// The last published snapshot.
    pub last: MorningState,
}

/// Cadence and bounds for [`run_morning_ticker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickerSettings {
    /// Longest wait between ticks. The ticker wakes earlier when the next
    /// interval deadline comes first.
    pub period: std::time::Duration,
    /// Stop after this many ticks; `None` runs until stale or closed.
    pub max_ticks: Option<u64>,
}

/// Drive `clock` until its season goes stale, every receiver of
/// `publisher` is dropped, or `settings.max_ticks` ticks have run.
///
/// Each tick advances the clock to `time.now()`. A snapshot that differs
/// from the published one replaces it; an index or phase change also
/// invokes `callback`. The next tick lands on the snapshot's
/// `next_interval_deadline` or after `settings.period`, whichever is
/// sooner, so every interval boundary is published on time.
///
/// # Errors
///
/// Returns any [`ClockError`] other than
/// [`StaleSeason`](ClockError::StaleSeason), which ends the run normally.
pub async fn run_morning_ticker<C: TemperatureCurve>(
    clock: &mut MorningClock<C>,
    time: &dyn TimeSource,
    publisher: &watch::Sender<MorningState>,
    callback: &mut dyn MorningCallback,
    settings: TickerSettings,
) -> Result<TickerResult, ClockError> {
    let mut ticks: u64 = 0;

    info!(
        period_ms = settings.period.as_millis(),
        max_ticks = settings.max_ticks,
        "Morning ticker starting"
    );

    loop {
        if publisher.is_closed() {
            info!(ticks, "All morning subscribers dropped");
            return Ok(finish(TickerEnd::ReceiversClosed, ticks, publisher));
        }
        if settings.max_ticks.is_some_and(|max| ticks >= max) {
            return Ok(finish(TickerEnd::TickLimit, ticks, publisher));
        }

        let now = time.now();
        let outcome = clock.advance(now);
        ticks = ticks.saturating_add(1);
        let wait = match outcome {
            Ok(state) => {
                let wait = until_deadline(&state, now).min(settings.period);
                let previous = publisher.borrow().clone();
                if state != previous {
                    if state.index != previous.index || state.phase != previous.phase {
                        callback.on_transition(&previous, &state);
                    }
                    publisher.send_replace(state);
                }
                wait
            }
            Err(ClockError::StaleSeason { sunrise_block, .. }) => {
                warn!(sunrise_block, ticks, "Morning ticker stopping on stale season");
                callback.on_stale(&publisher.borrow());
                return Ok(finish(TickerEnd::StaleSeason, ticks, publisher));
            }
            Err(err) => return Err(err),
        };

        tokio::time::sleep(wait).await;
    }
}

/// Time from `now` to the snapshot's next deadline; zero once it has passed.
fn until_deadline(state: &MorningState, now: DateTime<Utc>) -> std::time::Duration {
    state
        .next_interval_deadline
        .signed_duration_since(now)
        .to_std()
        .unwrap_or(std::time::Duration::ZERO)
}

fn finish(end: TickerEnd, ticks: u64, publisher: &watch::Sender<MorningState>) -> TickerResult {
    TickerResult {
        end,
        ticks,
        last: publisher.borrow().clone(),
    }
}
