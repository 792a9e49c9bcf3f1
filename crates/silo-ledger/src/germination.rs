//! Germination expiry estimates.
//!
//! A deposit germinates for a fixed number of seasons after it is made.
//! The dashboard shows when a germinating crate should finish, estimated
//! from how far its stem trails the stem tip. The estimate is advisory: it
//! assumes every future season is exactly `season_length_seconds` long and
//! starts on a season boundary, which the protocol does not guarantee.

use chrono::{DateTime, Utc};

use silo_types::{AccountingParams, FixedPoint};

use crate::LedgerError;

/// Estimate when a germinating crate finishes germinating.
///
/// ```text
/// seasons_elapsed   = floor((stem_tip - stem) / stalk_earned_per_season)
/// remaining_seasons = max(0, germination_seasons - seasons_elapsed)
/// estimate          = floor(now, season) + remaining_seasons * season
/// ```
///
/// Returns `None` when the crate lies outside the window this estimate
/// covers (`stem < stem_tip - stalk_earned_per_season * (seasons - 1)`)
/// or when no stem accrues per season.
pub fn germination_date(
    stem: FixedPoint,
    stem_tip: FixedPoint,
    stalk_earned_per_season: FixedPoint,
    now: DateTime<Utc>,
    params: &AccountingParams,
) -> Result<Option<DateTime<Utc>>, LedgerError> {
    if !stalk_earned_per_season.is_positive() || params.season_length_seconds <= 0 {
        return Ok(None);
    }

    let window_seasons = params.germination_seasons.saturating_sub(1).max(0);
    let window = stalk_earned_per_season.mul_int(i128::from(window_seasons))?;
    let window_start = stem_tip.checked_sub(window)?;
    if stem.checked_cmp(window_start)?.is_lt() {
        return Ok(None);
    }

    let behind = stem_tip.checked_sub(stem)?;
    let seasons_elapsed = behind.checked_div(stalk_earned_per_season, 0)?.mantissa();
    let remaining = i128::from(params.germination_seasons)
        .saturating_sub(seasons_elapsed)
        .max(0);
    let remaining = i64::try_from(remaining).map_err(|_err| {
        LedgerError::Arithmetic(silo_types::FixedPointError::Overflow {
            op: "germination seasons",
        })
    })?;

    let season = params.season_length_seconds;
    let now_secs = now.timestamp();
    let floored = now_secs.saturating_sub(now_secs.rem_euclid(season));
    let estimate = remaining
        .checked_mul(season)
        .and_then(|offset| floored.checked_add(offset))
        .and_then(|secs| DateTime::from_timestamp(secs, 0));
    Ok(estimate)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn stem(value: i128) -> FixedPoint {
        FixedPoint::from_raw(value, 0)
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, 15, 42, 7).unwrap()
    }

    #[test]
    fn just_deposited_waits_two_seasons() {
        let estimate = germination_date(
            stem(10_000),
            stem(10_000),
            stem(500),
            now(),
            &AccountingParams::default(),
        )
        .unwrap();
        assert_eq!(estimate, Some(Utc.with_ymd_and_hms(2026, 3, 14, 17, 0, 0).unwrap()));
    }

    #[test]
    fn one_season_in_waits_one_more() {
        let estimate = germination_date(
            stem(9_500),
            stem(10_000),
            stem(500),
            now(),
            &AccountingParams::default(),
        )
        .unwrap();
        assert_eq!(estimate, Some(Utc.with_ymd_and_hms(2026, 3, 14, 16, 0, 0).unwrap()));
    }

    #[test]
    fn older_than_window_is_undefined() {
        let estimate = germination_date(
            stem(9_499),
            stem(10_000),
            stem(500),
            now(),
            &AccountingParams::default(),
        )
        .unwrap();
        assert_eq!(estimate, None);
    }

    #[test]
    fn zero_rate_is_undefined() {
        let estimate = germination_date(
            stem(10_000),
            stem(10_000),
            stem(0),
            now(),
            &AccountingParams::default(),
        )
        .unwrap();
        assert_eq!(estimate, None);
    }
}
