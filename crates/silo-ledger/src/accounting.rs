//! Per-crate accounting derivation.
//!
//! Turns one raw [`DepositCrate`] into its stalk, seed, BDV, and
//! germination figures. The derivation order is:
//!
//! 1. `is_germinating = stem >= germinating_stem_threshold`
//! 2. `seeds = bdv * seeds_issued_per_bdv`
//! 3. `total_grown = bdv * (stem_tip - stem) / SCALE`
//! 4. `mowable = bdv * (stem_tip - max(last_mow_stem, stem)) / SCALE`
//! 5. germinating: `germinating = bdv * stalk_issued_per_bdv + total_grown`;
//!    otherwise `base = bdv * stalk_issued_per_bdv + total_grown - mowable`
//!    and `grown = mowable`
//! 6. `current_bdv = amount * live_bdv_per_unit`
//!
//! Both divisions by `SCALE` truncate, and the base/grown split reuses the
//! same truncated `total_grown`, so the conservation law holds exactly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use silo_types::{
    AccountingParams, BDV_DECIMALS, DepositCrate, FixedPoint, SEED_DECIMALS, STALK_DECIMALS,
    SiloTokenConfig,
};

use crate::LedgerError;
use crate::germination::germination_date;

/// Derived accounting for a single deposit crate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct CrateAccounting {
    /// The raw deposit this accounting was derived from.
    pub deposit: DepositCrate,
    /// Whether the crate is still inside its germination window.
    pub is_germinating: bool,
    /// Stalk that has reached base status.
    pub base_stalk: FixedPoint,
    /// Grown stalk accrued since the account's last mow.
    pub grown_stalk: FixedPoint,
    /// Stalk that is still germinating.
    pub germinating_stalk: FixedPoint,
    /// Grown stalk pending credit on the next mow.
    pub mowable_stalk: FixedPoint,
    /// Seeds issued for the crate's deposit BDV.
    pub seeds: FixedPoint,
    /// BDV at the live price reading.
    pub current_bdv: FixedPoint,
    /// Advisory estimate of when germination ends.
    pub germination_estimate: Option<DateTime<Utc>>,
}

impl CrateAccounting {
    /// `base + grown + germinating`.
    pub fn total_stalk(&self) -> Result<FixedPoint, LedgerError> {
        Ok(self
            .base_stalk
            .checked_add(self.grown_stalk)?
            .checked_add(self.germinating_stalk)?)
    }
}

/// Stalk issued at deposit time: `bdv * stalk_issued_per_bdv`.
pub fn issued_stalk(bdv: FixedPoint, config: &SiloTokenConfig) -> Result<FixedPoint, LedgerError> {
    Ok(bdv.checked_mul(config.stalk_issued_per_bdv, STALK_DECIMALS)?)
}

/// Stalk grown between `from_stem` and the stem tip:
/// `bdv * (stem_tip - from_stem) / SCALE`, truncated.
pub fn grown_between(
    bdv: FixedPoint,
    from_stem: FixedPoint,
    stem_tip: FixedPoint,
    params: &AccountingParams,
) -> Result<FixedPoint, LedgerError> {
    let delta = stem_tip.checked_sub(from_stem)?;
    Ok(bdv
        .checked_mul(delta, STALK_DECIMALS)?
        .div_int(params.stalk_scale)?)
}

/// Derive the accounting for one crate.
///
/// The crate must already have passed validation against `config` (see
/// [`validate_crate`]); `last_mow_stem` must lie in `[0, stem_tip]`.
pub fn derive_crate(
    deposit: &DepositCrate,
    config: &SiloTokenConfig,
    last_mow_stem: FixedPoint,
    bdv_per_unit: FixedPoint,
    params: &AccountingParams,
    now: DateTime<Utc>,
) -> Result<CrateAccounting, LedgerError> {
    let bdv = deposit.deposit_bdv;
    let is_germinating = deposit.stem.checked_cmp(config.germinating_stem_threshold)?.is_ge();

    let seeds = bdv.checked_mul(config.seeds_issued_per_bdv, SEED_DECIMALS)?;
    let issued = issued_stalk(bdv, config)?;
    let total_grown = grown_between(bdv, deposit.stem, config.stem_tip, params)?;

    // A crate deposited after the last mow has nothing mowable below its own stem.
    let mow_from = last_mow_stem.checked_max(deposit.stem)?;
    let mowable = grown_between(bdv, mow_from, config.stem_tip, params)?;

    let zero = FixedPoint::zero(STALK_DECIMALS);
    let (base_stalk, grown_stalk, germinating_stalk) = if is_germinating {
        (zero, zero, issued.checked_add(total_grown)?)
    } else {
        let base = issued.checked_add(total_grown)?.checked_sub(mowable)?;
        (base, mowable, zero)
    };

    let current_bdv = deposit.amount.checked_mul(bdv_per_unit, BDV_DECIMALS)?;
    let germination_estimate = if is_germinating {
        germination_date(
            deposit.stem,
            config.stem_tip,
            config.stalk_earned_per_season,
            now,
            params,
        )?
    } else {
        None
    };

    Ok(CrateAccounting {
        deposit: deposit.clone(),
        is_germinating,
        base_stalk,
        grown_stalk,
        germinating_stalk,
        mowable_stalk: mowable,
        seeds,
        current_bdv,
        germination_estimate,
    })
}

/// Check a crate against its token's configuration.
///
/// # Errors
///
/// Returns [`LedgerError::InvalidCrate`] if the crate belongs to another
/// token, carries the wrong decimals, has a negative amount or BDV, or has
/// a stem outside `[0, stem_tip]`.
pub fn validate_crate(deposit: &DepositCrate, config: &SiloTokenConfig) -> Result<(), LedgerError> {
    let invalid = |reason: String| LedgerError::InvalidCrate {
        id: deposit.id,
        token: deposit.token.clone(),
        reason,
    };

    if deposit.token != config.token {
        return Err(invalid(format!("crate belongs to token {}", deposit.token)));
    }
    if deposit.amount.decimals() != config.decimals {
        return Err(invalid(format!(
            "amount carries {} decimals, token has {}",
            deposit.amount.decimals(),
            config.decimals
        )));
    }
    if deposit.amount.is_negative() {
        return Err(invalid(format!("negative amount {}", deposit.amount)));
    }
    if deposit.deposit_bdv.decimals() != BDV_DECIMALS {
        return Err(invalid(format!(
            "deposit bdv carries {} decimals, expected {BDV_DECIMALS}",
            deposit.deposit_bdv.decimals()
        )));
    }
    if deposit.deposit_bdv.is_negative() {
        return Err(invalid(format!("negative deposit bdv {}", deposit.deposit_bdv)));
    }
    if deposit.stem.decimals() != config.stem_tip.decimals() {
        return Err(invalid(format!(
            "stem carries {} decimals, stem tip has {}",
            deposit.stem.decimals(),
            config.stem_tip.decimals()
        )));
    }
    if deposit.stem.is_negative() || deposit.stem.checked_cmp(config.stem_tip)?.is_gt() {
        return Err(invalid(format!(
            "stem {} outside [0, {}]",
            deposit.stem, config.stem_tip
        )));
    }
    Ok(())
}

/// Check a token configuration for internal consistency.
///
/// # Errors
///
/// Returns [`LedgerError::InvalidConfig`] if the stem fields disagree on
/// decimals, the tip is negative, or the threshold lies above the tip.
pub fn validate_config(config: &SiloTokenConfig) -> Result<(), LedgerError> {
    let invalid = |reason: String| LedgerError::InvalidConfig {
        token: config.token.clone(),
        reason,
    };
    let tip = config.stem_tip;
    for (name, value) in [
        ("germinating_stem_threshold", config.germinating_stem_threshold),
        ("stalk_earned_per_season", config.stalk_earned_per_season),
    ] {
        if value.decimals() != tip.decimals() {
            return Err(invalid(format!(
                "{name} carries {} decimals, stem tip has {}",
                value.decimals(),
                tip.decimals()
            )));
        }
    }
    if tip.is_negative() {
        return Err(invalid(format!("negative stem tip {tip}")));
    }
    if config.germinating_stem_threshold.checked_cmp(tip)?.is_gt() {
        return Err(invalid(format!(
            "germinating threshold {} above stem tip {tip}",
            config.germinating_stem_threshold
        )));
    }
    if config.stalk_earned_per_season.is_negative() {
        return Err(invalid(format!(
            "negative stalk earned per season {}",
            config.stalk_earned_per_season
        )));
    }
    Ok(())
}
