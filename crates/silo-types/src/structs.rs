//! Core record types: token configuration, deposit crates, accounting
//! parameters, and morning snapshots.
//!
//! Everything here is an immutable snapshot supplied by (or returned to) an
//! external collaborator. The engine never mutates these records; it
//! re-derives its outputs from them on every call.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::enums::MorningPhase;
use crate::fixed::FixedPoint;
use crate::ids::{DepositId, TokenId};

// ---------------------------------------------------------------------------
// SiloTokenConfig
// ---------------------------------------------------------------------------

/// Per-token protocol parameters, read-only for the duration of a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct SiloTokenConfig {
    /// The token this configuration describes.
    pub token: TokenId,
    /// Decimal places of the token's amounts.
    pub decimals: u8,
    /// Stalk issued per unit of BDV at deposit time.
    pub stalk_issued_per_bdv: FixedPoint,
    /// Seeds issued per unit of BDV.
    pub seeds_issued_per_bdv: FixedPoint,
    /// Current upper bound of the stem counter; grows every season.
    pub stem_tip: FixedPoint,
    /// Crates with `stem >= germinating_stem_threshold` are germinating.
    pub germinating_stem_threshold: FixedPoint,
    /// Stem units accrued per season, used to size the germination window.
    pub stalk_earned_per_season: FixedPoint,
}

// ---------------------------------------------------------------------------
// DepositCrate
// ---------------------------------------------------------------------------

/// One on-chain deposit record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct DepositCrate {
    /// On-chain deposit identifier.
    #[ts(type = "string")]
    pub id: DepositId,
    /// The deposited token.
    pub token: TokenId,
    /// Position on the token's reward curve at deposit time.
    pub stem: FixedPoint,
    /// Token units deposited, at the token's decimals.
    pub amount: FixedPoint,
    /// BDV recorded at deposit time.
    pub deposit_bdv: FixedPoint,
}

// ---------------------------------------------------------------------------
// StemLayout
// ---------------------------------------------------------------------------

/// Where the stem lives inside a 256-bit deposit identifier.
///
/// The stem occupies the low `stem_bits` bits of the id. When `signed` is
/// set those bits are read as two's complement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StemLayout {
    /// Width of the stem field in bits (1..=127).
    pub stem_bits: u32,
    /// Whether the stem field is two's complement.
    pub signed: bool,
}

impl Default for StemLayout {
    /// `token_address << 96 | uint96(int96 stem)`.
    fn default() -> Self {
        Self {
            stem_bits: 96,
            signed: true,
        }
    }
}

// ---------------------------------------------------------------------------
// AccountingParams
// ---------------------------------------------------------------------------

/// Protocol constants that shape deposit accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountingParams {
    /// Normalization between stem units and stalk units.
    pub stalk_scale: i128,
    /// Length of one season in seconds.
    pub season_length_seconds: i64,
    /// Seasons a deposit spends germinating.
    pub germination_seasons: i64,
    /// Bit layout of deposit identifiers.
    pub stem_layout: StemLayout,
}

impl Default for AccountingParams {
    fn default() -> Self {
        Self {
            stalk_scale: 10_000,
            season_length_seconds: 3_600,
            germination_seasons: 2,
            stem_layout: StemLayout::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// MorningState
// ---------------------------------------------------------------------------

/// Snapshot of the morning auction at one instant.
///
/// Two snapshots computed for the same anchor and the same `now` are
/// always equal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct MorningState {
    /// Block of the sunrise that anchors the current season.
    pub sunrise_block: u64,
    /// Timestamp of the sunrise that anchors the current season.
    pub sunrise_timestamp: DateTime<Utc>,
    /// Interval index: `-1` uninitialized, `0..intervals` morning,
    /// `intervals` elapsed.
    pub index: i32,
    /// Coarse phase derived from `index`.
    pub phase: MorningPhase,
    /// `0 <= index < intervals && sunrise_block > 0`.
    pub is_morning: bool,
    /// Whole seconds elapsed since sunrise (never negative).
    pub seconds_since_sunrise: i64,
    /// Estimated block number at the start of the current interval.
    pub block_number: u64,
    /// When the next interval starts.
    pub next_interval_deadline: DateTime<Utc>,
    /// Whole seconds until `next_interval_deadline`, floored at zero.
    pub remaining_seconds: i64,
    /// The season's maximum temperature.
    pub max_temperature: FixedPoint,
    /// Temperature for the current interval.
    pub scaled_temperature: FixedPoint,
}

impl MorningState {
    /// Whether temperature is pinned at its maximum.
    pub const fn is_pinned(&self) -> bool {
        matches!(self.phase, MorningPhase::Elapsed)
    }
}
