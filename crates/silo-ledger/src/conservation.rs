//! Conservation law verification for derived deposit accounting.
//!
//! The split of a crate's stalk into base, grown, and germinating depends
//! on the account's mow history and on germination; its total does not:
//!
//! ```text
//! base + grown + germinating == bdv * stalk_per_bdv + bdv * (tip - stem) / SCALE
//! ```
//!
//! Exactly one side of the germination partition holds for each crate:
//! either `germinating == 0`, or `base == 0 && grown == 0`.
//!
//! The derivation satisfies both by construction; these checks exist to
//! catch corrupted inputs and future regressions.

use silo_types::{AccountingParams, FixedPoint, SiloTokenConfig};

use crate::AccountingAnomaly;
use crate::accounting::{CrateAccounting, grown_between, issued_stalk};
use crate::ledger::TokenDepositAggregate;

/// Projection of one summed field out of a crate's accounting.
type Field = fn(&CrateAccounting) -> FixedPoint;

/// The result of a conservation check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConservationResult {
    /// The accounting is consistent.
    Balanced,
    /// The accounting violates the conservation law or the partition.
    Anomaly(AccountingAnomaly),
}

impl ConservationResult {
    /// Whether the check passed.
    pub const fn is_balanced(&self) -> bool {
        matches!(self, Self::Balanced)
    }
}

/// Verify the conservation law and germination partition for one crate.
pub fn verify_crate(
    accounting: &CrateAccounting,
    config: &SiloTokenConfig,
    params: &AccountingParams,
) -> ConservationResult {
    let deposit = &accounting.deposit;
    let anomaly = |message: String| {
        ConservationResult::Anomaly(AccountingAnomaly {
            token: deposit.token.clone(),
            id: Some(deposit.id),
            message,
        })
    };

    let expected = issued_stalk(deposit.deposit_bdv, config).and_then(|issued| {
        let grown = grown_between(deposit.deposit_bdv, deposit.stem, config.stem_tip, params)?;
        Ok(issued.checked_add(grown)?)
    });
    let expected = match expected {
        Ok(value) => value,
        Err(err) => return anomaly(format!("cannot recompute expected stalk: {err}")),
    };
    let actual = match accounting.total_stalk() {
        Ok(value) => value,
        Err(err) => return anomaly(format!("cannot total stalk components: {err}")),
    };
    if actual != expected {
        return anomaly(format!(
            "stalk not conserved for crate {}: components sum to {actual}, expected {expected}",
            deposit.id
        ));
    }

    let germinating_empty = accounting.germinating_stalk.is_zero();
    let settled_empty = accounting.base_stalk.is_zero() && accounting.grown_stalk.is_zero();
    if !germinating_empty && !settled_empty {
        return anomaly(format!(
            "crate {} mixes germinating stalk {} with base {} / grown {}",
            deposit.id, accounting.germinating_stalk, accounting.base_stalk, accounting.grown_stalk
        ));
    }
    if accounting.is_germinating && !settled_empty {
        return anomaly(format!(
            "germinating crate {} carries base or grown stalk",
            deposit.id
        ));
    }
    if !accounting.is_germinating && !germinating_empty {
        return anomaly(format!(
            "non-germinating crate {} carries germinating stalk",
            deposit.id
        ));
    }

    ConservationResult::Balanced
}

/// Verify every crate in an aggregate, and that the aggregate totals equal
/// the per-crate sums.
pub fn verify_aggregate(
    aggregate: &TokenDepositAggregate,
    config: &SiloTokenConfig,
    params: &AccountingParams,
) -> ConservationResult {
    for accounting in &aggregate.deposits {
        let result = verify_crate(accounting, config, params);
        if !result.is_balanced() {
            return result;
        }
    }

    let anomaly = |message: String| {
        ConservationResult::Anomaly(AccountingAnomaly {
            token: aggregate.token.clone(),
            id: None,
            message,
        })
    };

    let checks: [(&str, FixedPoint, Field); 6] = [
        ("amount", aggregate.amount, |c| c.deposit.amount),
        ("deposit_bdv", aggregate.deposit_bdv, |c| c.deposit.deposit_bdv),
        ("base_stalk", aggregate.base_stalk, |c| c.base_stalk),
        ("grown_stalk", aggregate.grown_stalk, |c| c.grown_stalk),
        ("germinating_stalk", aggregate.germinating_stalk, |c| c.germinating_stalk),
        ("seeds", aggregate.seeds, |c| c.seeds),
    ];
    for (name, total, field) in checks {
        let summed = aggregate
            .deposits
            .iter()
            .try_fold(FixedPoint::zero(total.decimals()), |acc, c| acc.checked_add(field(c)));
        match summed {
            Ok(sum) if sum == total => {}
            Ok(sum) => {
                return anomaly(format!(
                    "aggregate {name} {total} differs from crate sum {sum}"
                ));
            }
            Err(err) => return anomaly(format!("cannot sum crate {name}: {err}")),
        }
    }

    let convertible = aggregate.deposits.iter().filter(|c| !c.is_germinating).count();
    if convertible != aggregate.convertible_deposits.len() {
        return anomaly(format!(
            "{} convertible crates listed, {convertible} non-germinating crates present",
            aggregate.convertible_deposits.len()
        ));
    }

    ConservationResult::Balanced
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Utc;
    use silo_types::{DepositCrate, DepositId, STALK_DECIMALS, TokenId};

    use super::*;
    use crate::DepositLedger;

    fn config() -> SiloTokenConfig {
        SiloTokenConfig {
            token: TokenId::new("0xbean").unwrap(),
            decimals: 6,
            stalk_issued_per_bdv: FixedPoint::from_raw(1, 0),
            seeds_issued_per_bdv: FixedPoint::from_raw(4, 0),
            stem_tip: FixedPoint::from_raw(20_000, 0),
            germinating_stem_threshold: FixedPoint::from_raw(19_000, 0),
            stalk_earned_per_season: FixedPoint::from_raw(500, 0),
        }
    }

    fn aggregate() -> TokenDepositAggregate {
        let crates: Vec<DepositCrate> = [(1_000, 7_777_777), (19_500, 3_333_333)]
            .into_iter()
            .map(|(stem, amount)| DepositCrate {
                id: DepositId::from_hex(&format!("{stem:x}")).unwrap(),
                token: TokenId::new("0xbean").unwrap(),
                stem: FixedPoint::from_raw(stem, 0),
                amount: FixedPoint::from_raw(amount, 6),
                deposit_bdv: FixedPoint::from_raw(amount, 6),
            })
            .collect();
        DepositLedger::default()
            .derive_token(
                &config(),
                &crates,
                FixedPoint::from_raw(15_000, 0),
                FixedPoint::from_raw(1_000_000, 6),
                Utc::now(),
            )
            .unwrap()
    }

    #[test]
    fn derived_aggregate_is_balanced() {
        let agg = aggregate();
        assert_eq!(
            verify_aggregate(&agg, &config(), &AccountingParams::default()),
            ConservationResult::Balanced
        );
    }

    #[test]
    fn tampered_split_is_an_anomaly() {
        let mut agg = aggregate();
        let first = agg.deposits.first_mut().unwrap();
        first.grown_stalk = first
            .grown_stalk
            .checked_add(FixedPoint::from_raw(1, STALK_DECIMALS))
            .unwrap();
        let result = verify_crate(first, &config(), &AccountingParams::default());
        assert!(matches!(result, ConservationResult::Anomaly(ref a) if a.id.is_some()));
    }

    #[test]
    fn mixed_partition_is_an_anomaly() {
        let mut agg = aggregate();
        let first = agg.deposits.first_mut().unwrap();
        // Move one unit from base to germinating: total unchanged, partition broken.
        let unit = FixedPoint::from_raw(1, STALK_DECIMALS);
        first.base_stalk = first.base_stalk.checked_sub(unit).unwrap();
        first.germinating_stalk = unit;
        let result = verify_crate(first, &config(), &AccountingParams::default());
        assert!(!result.is_balanced());
    }

    #[test]
    fn stale_totals_are_an_anomaly() {
        let mut agg = aggregate();
        agg.seeds = FixedPoint::zero(agg.seeds.decimals());
        let result = verify_aggregate(&agg, &config(), &AccountingParams::default());
        assert!(matches!(result, ConservationResult::Anomaly(ref a) if a.id.is_none()));
    }
}
