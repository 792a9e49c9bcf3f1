//! Newest-first crate selection and cost aggregation.

use core::cmp::Ordering;

use serde::{Deserialize, Serialize};
use tracing::debug;
use ts_rs::TS;

use silo_ledger::{CrateAccounting, TokenDepositAggregate};
use silo_types::{
    BDV_DECIMALS, DepositId, FixedPoint, Intent, SEED_DECIMALS, STALK_DECIMALS, TokenId,
};

use crate::SelectionError;

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

/// One crate chosen by a selection, with the slice of it being removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct PickedCrate {
    /// The deposit.
    #[ts(type = "string")]
    pub id: DepositId,
    /// The deposit's stem.
    pub stem: FixedPoint,
    /// Amount taken from this crate.
    pub picked_amount: FixedPoint,
    /// The crate's full amount.
    pub crate_amount: FixedPoint,
    /// Whether only part of the crate is taken.
    pub is_partial: bool,
    /// Stalk removed with this slice.
    pub stalk: StalkCost,
    /// Seeds removed with this slice.
    pub seeds: FixedPoint,
    /// Deposit BDV removed with this slice.
    pub bdv: FixedPoint,
}

/// Stalk removed by a selection, by component.
///
/// `base + grown + germinating` equals the crate total prorated by the
/// picked fraction, truncated once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct StalkCost {
    /// Base stalk removed.
    pub base: FixedPoint,
    /// Grown stalk removed.
    pub grown: FixedPoint,
    /// Germinating stalk removed.
    pub germinating: FixedPoint,
}

impl StalkCost {
    /// No stalk.
    pub const fn zero() -> Self {
        Self {
            base: FixedPoint::zero(STALK_DECIMALS),
            grown: FixedPoint::zero(STALK_DECIMALS),
            germinating: FixedPoint::zero(STALK_DECIMALS),
        }
    }

    /// Sum of all components.
    pub fn total(&self) -> Result<FixedPoint, SelectionError> {
        Ok(self
            .base
            .checked_add(self.grown)?
            .checked_add(self.germinating)?)
    }

    fn checked_add(self, other: Self) -> Result<Self, SelectionError> {
        Ok(Self {
            base: self.base.checked_add(other.base)?,
            grown: self.grown.checked_add(other.grown)?,
            germinating: self.germinating.checked_add(other.germinating)?,
        })
    }
}

/// The outcome of a successful selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Selection {
    /// The token selected from.
    pub token: TokenId,
    /// What the selection is for.
    pub intent: Intent,
    /// The requested amount.
    pub target: FixedPoint,
    /// Crates in consumption order. Sums of `picked_amount` equal `target`.
    pub picked: Vec<PickedCrate>,
    /// Stalk the account loses.
    pub stalk_cost: StalkCost,
    /// Seeds the account loses.
    pub seed_cost: FixedPoint,
    /// Deposit BDV removed.
    pub bdv_removed: FixedPoint,
}

impl Selection {
    fn empty(token: TokenId, intent: Intent, target: FixedPoint) -> Self {
        Self {
            token,
            intent,
            target,
            picked: Vec::new(),
            stalk_cost: StalkCost::zero(),
            seed_cost: FixedPoint::zero(SEED_DECIMALS),
            bdv_removed: FixedPoint::zero(BDV_DECIMALS),
        }
    }

    /// Stems of the picked crates, in order, as a transaction argument.
    pub fn stems(&self) -> Vec<FixedPoint> {
        self.picked.iter().map(|p| p.stem).collect()
    }

    /// Picked amounts, in order, as a transaction argument.
    pub fn amounts(&self) -> Vec<FixedPoint> {
        self.picked.iter().map(|p| p.picked_amount).collect()
    }

    /// Deposit ids of the picked crates, in order.
    pub fn ids(&self) -> Vec<DepositId> {
        self.picked.iter().map(|p| p.id).collect()
    }

    /// Sum of picked amounts.
    pub fn picked_total(&self) -> Result<FixedPoint, SelectionError> {
        self.picked
            .iter()
            .try_fold(FixedPoint::zero(self.target.decimals()), |acc, p| {
                Ok(acc.checked_add(p.picked_amount)?)
            })
    }
}

/// A crate whose live BDV exceeds the BDV recorded at deposit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct BdvUpdateCandidate {
    /// The deposit.
    #[ts(type = "string")]
    pub id: DepositId,
    /// The deposit's stem.
    pub stem: FixedPoint,
    /// The crate's amount.
    pub amount: FixedPoint,
    /// BDV recorded at deposit.
    pub deposit_bdv: FixedPoint,
    /// BDV at the live price.
    pub current_bdv: FixedPoint,
    /// `current_bdv - deposit_bdv`, always positive.
    pub gain: FixedPoint,
}

// ---------------------------------------------------------------------------
// CrateSelector
// ---------------------------------------------------------------------------

/// Picks crates for a withdraw, convert, or transfer request.
///
/// Stateless: every call reads only the aggregate it is given.
#[derive(Debug, Clone, Copy, Default)]
pub struct CrateSelector;

impl CrateSelector {
    /// Create a selector.
    pub const fn new() -> Self {
        Self
    }

    /// Select crates holding exactly `target` of the aggregate's token.
    ///
    /// Eligible crates have a positive amount; [`Intent::Convert`]
    /// additionally skips germinating crates. Eligible crates are taken
    /// highest stem first (ties by ascending id), whole while the remaining
    /// target covers them, then one partial crate for the remainder.
    ///
    /// # Errors
    ///
    /// - [`SelectionError::InvalidTarget`] if `target` is negative.
    /// - [`SelectionError::Arithmetic`] if `target` carries different
    ///   decimals than the token's amounts.
    /// - [`SelectionError::InsufficientBalance`] if eligible crates hold
    ///   less than `target`.
    pub fn select(
        &self,
        aggregate: &TokenDepositAggregate,
        intent: Intent,
        target: FixedPoint,
    ) -> Result<Selection, SelectionError> {
        if target.is_negative() {
            return Err(SelectionError::InvalidTarget(target));
        }
        let pool: &[CrateAccounting] = if intent.excludes_germinating() {
            &aggregate.convertible_deposits
        } else {
            &aggregate.deposits
        };
        let eligible = eligible_newest_first(pool);

        let available = eligible
            .iter()
            .try_fold(FixedPoint::zero(aggregate.amount.decimals()), |acc, c| {
                acc.checked_add(c.deposit.amount)
            })?;
        if target.checked_cmp(available)?.is_gt() {
            return Err(SelectionError::InsufficientBalance {
                intent,
                requested: target,
                available,
            });
        }

        let mut selection = Selection::empty(aggregate.token.clone(), intent, target);
        let mut remaining = target;
        for accounting in eligible {
            if remaining.is_zero() {
                break;
            }
            let amount = accounting.deposit.amount;
            let take = remaining.checked_min(amount)?;
            let picked = pick(accounting, take)?;

            selection.stalk_cost = selection.stalk_cost.checked_add(picked.stalk)?;
            selection.seed_cost = selection.seed_cost.checked_add(picked.seeds)?;
            selection.bdv_removed = selection.bdv_removed.checked_add(picked.bdv)?;
            selection.picked.push(picked);
            remaining = remaining.checked_sub(take)?;
        }

        debug!(
            token = %aggregate.token,
            %intent,
            %target,
            crates = selection.picked.len(),
            "Selected crates"
        );
        Ok(selection)
    }

    /// List non-germinating crates whose live BDV exceeds their deposit
    /// BDV, largest gain first (ties by descending stem, then id).
    ///
    /// # Errors
    ///
    /// Returns [`SelectionError::Arithmetic`] if BDV values cannot be
    /// compared.
    pub fn select_for_bdv_update(
        &self,
        aggregate: &TokenDepositAggregate,
    ) -> Result<Vec<BdvUpdateCandidate>, SelectionError> {
        let mut candidates = Vec::new();
        for accounting in &aggregate.convertible_deposits {
            let deposit = &accounting.deposit;
            let gain = accounting.current_bdv.checked_sub(deposit.deposit_bdv)?;
            if gain.is_positive() {
                candidates.push(BdvUpdateCandidate {
                    id: deposit.id,
                    stem: deposit.stem,
                    amount: deposit.amount,
                    deposit_bdv: deposit.deposit_bdv,
                    current_bdv: accounting.current_bdv,
                    gain,
                });
            }
        }
        candidates.sort_by(|a, b| {
            b.gain
                .mantissa()
                .cmp(&a.gain.mantissa())
                .then_with(|| b.stem.mantissa().cmp(&a.stem.mantissa()))
                .then_with(|| a.id.cmp(&b.id))
        });
        debug!(
            token = %aggregate.token,
            candidates = candidates.len(),
            "Listed BDV update candidates"
        );
        Ok(candidates)
    }
}

/// Crates with a positive amount, highest stem first.
///
/// Stems of one token share decimals, so mantissas compare directly.
fn eligible_newest_first(pool: &[CrateAccounting]) -> Vec<&CrateAccounting> {
    let mut eligible: Vec<&CrateAccounting> =
        pool.iter().filter(|c| c.deposit.amount.is_positive()).collect();
    eligible.sort_by(|a, b| newest_first(a, b));
    eligible
}

fn newest_first(a: &CrateAccounting, b: &CrateAccounting) -> Ordering {
    b.deposit
        .stem
        .mantissa()
        .cmp(&a.deposit.stem.mantissa())
        .then_with(|| a.deposit.id.cmp(&b.deposit.id))
}

/// Prorate one crate's stalk, seeds, and BDV by `take / amount`.
fn pick(accounting: &CrateAccounting, take: FixedPoint) -> Result<PickedCrate, SelectionError> {
    let deposit = &accounting.deposit;
    let amount = deposit.amount;
    let is_partial = take.checked_cmp(amount)?.is_lt();

    let stalk = if is_partial {
        let total = accounting
            .base_stalk
            .checked_add(accounting.grown_stalk)?
            .checked_add(accounting.germinating_stalk)?
            .mul_ratio(take, amount)?;
        let base = accounting.base_stalk.mul_ratio(take, amount)?;
        let germinating = accounting.germinating_stalk.mul_ratio(take, amount)?;
        // Grown takes the truncation residue so the parts sum to the total.
        let grown = total.checked_sub(base)?.checked_sub(germinating)?;
        StalkCost {
            base,
            grown,
            germinating,
        }
    } else {
        StalkCost {
            base: accounting.base_stalk,
            grown: accounting.grown_stalk,
            germinating: accounting.germinating_stalk,
        }
    };
    let (seeds, bdv) = if is_partial {
        (
            accounting.seeds.mul_ratio(take, amount)?,
            deposit.deposit_bdv.mul_ratio(take, amount)?,
        )
    } else {
        (accounting.seeds, deposit.deposit_bdv)
    };

    Ok(PickedCrate {
        id: deposit.id,
        stem: deposit.stem,
        picked_amount: take,
        crate_amount: amount,
        is_partial,
        stalk,
        seeds,
        bdv,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use chrono::Utc;
    use silo_ledger::DepositLedger;
    use silo_types::{DepositCrate, SiloTokenConfig};

    use super::*;

    fn bean() -> TokenId {
        TokenId::new("0xbean").unwrap()
    }

    fn config() -> SiloTokenConfig {
        SiloTokenConfig {
            token: bean(),
            decimals: 6,
            stalk_issued_per_bdv: FixedPoint::from_raw(1, 0),
            seeds_issued_per_bdv: FixedPoint::from_raw(2, 0),
            stem_tip: FixedPoint::from_raw(1_000, 0),
            germinating_stem_threshold: FixedPoint::from_raw(900, 0),
            stalk_earned_per_season: FixedPoint::from_raw(50, 0),
        }
    }

    fn units(whole: i128) -> FixedPoint {
        FixedPoint::from_integer(whole, 6).unwrap()
    }

    fn deposit(stem: i128, amount: i128) -> DepositCrate {
        DepositCrate {
            id: DepositId::from_hex(&format!("{stem:x}")).unwrap(),
            token: bean(),
            stem: FixedPoint::from_raw(stem, 0),
            amount: units(amount),
            deposit_bdv: units(amount),
        }
    }

    fn aggregate(crates: &[DepositCrate], price: FixedPoint) -> TokenDepositAggregate {
        DepositLedger::default()
            .derive_token(&config(), crates, FixedPoint::from_raw(1_000, 0), price, Utc::now())
            .unwrap()
    }

    fn par() -> FixedPoint {
        FixedPoint::from_raw(1_000_000, 6)
    }

    #[test]
    fn takes_newest_whole_then_one_partial() {
        let agg = aggregate(&[deposit(100, 50), deposit(500, 100)], par());
        let selection = CrateSelector::new()
            .select(&agg, Intent::Withdraw, units(120))
            .unwrap();

        assert_eq!(selection.picked.len(), 2);
        assert_eq!(selection.stems(), vec![FixedPoint::from_raw(500, 0), FixedPoint::from_raw(100, 0)]);
        assert_eq!(selection.amounts(), vec![units(100), units(20)]);
        assert!(!selection.picked[0].is_partial);
        assert!(selection.picked[1].is_partial);
        assert_eq!(selection.bdv_removed, units(120));
    }

    #[test]
    fn exact_match_has_no_trailing_entry() {
        let agg = aggregate(&[deposit(100, 50), deposit(500, 100)], par());
        let selection = CrateSelector::new()
            .select(&agg, Intent::Transfer, units(100))
            .unwrap();
        assert_eq!(selection.picked.len(), 1);
        assert!(!selection.picked[0].is_partial);
    }

    #[test]
    fn one_unit_over_is_insufficient() {
        let agg = aggregate(&[deposit(100, 50), deposit(500, 100)], par());
        let over = units(150).checked_add(FixedPoint::from_raw(1, 6)).unwrap();
        let err = CrateSelector::new()
            .select(&agg, Intent::Withdraw, over)
            .unwrap_err();
        assert_eq!(
            err,
            SelectionError::InsufficientBalance {
                intent: Intent::Withdraw,
                requested: over,
                available: units(150),
            }
        );
    }

    #[test]
    fn zero_target_is_an_empty_success() {
        let agg = aggregate(&[], par());
        let selection = CrateSelector::new()
            .select(&agg, Intent::Withdraw, units(0))
            .unwrap();
        assert!(selection.picked.is_empty());
        assert!(selection.stalk_cost.total().unwrap().is_zero());
        assert!(selection.seed_cost.is_zero());
    }

    #[test]
    fn empty_pool_with_target_is_insufficient() {
        let agg = aggregate(&[], par());
        let result = CrateSelector::new().select(&agg, Intent::Transfer, units(1));
        assert!(matches!(result, Err(SelectionError::InsufficientBalance { .. })));
    }

    #[test]
    fn convert_skips_germinating_crates() {
        // Stem 950 is past the 900 threshold.
        let agg = aggregate(&[deposit(950, 40), deposit(500, 10)], par());
        let selection = CrateSelector::new()
            .select(&agg, Intent::Convert, units(10))
            .unwrap();
        assert_eq!(selection.stems(), vec![FixedPoint::from_raw(500, 0)]);
        assert!(selection.stalk_cost.germinating.is_zero());

        let result = CrateSelector::new().select(&agg, Intent::Convert, units(11));
        assert!(matches!(
            result,
            Err(SelectionError::InsufficientBalance { available, .. }) if available == units(10)
        ));

        let withdraw = CrateSelector::new()
            .select(&agg, Intent::Withdraw, units(11))
            .unwrap();
        assert_eq!(withdraw.stems()[0], FixedPoint::from_raw(950, 0));
    }

    #[test]
    fn negative_target_is_rejected() {
        let agg = aggregate(&[deposit(500, 10)], par());
        let result = CrateSelector::new().select(&agg, Intent::Withdraw, units(-1));
        assert!(matches!(result, Err(SelectionError::InvalidTarget(_))));
    }

    #[test]
    fn mismatched_decimals_are_rejected() {
        let agg = aggregate(&[deposit(500, 10)], par());
        let result = CrateSelector::new().select(&agg, Intent::Withdraw, FixedPoint::from_raw(1, 18));
        assert!(matches!(result, Err(SelectionError::Arithmetic(_))));
    }

    #[test]
    fn partial_cost_parts_sum_to_prorated_total() {
        let agg = aggregate(&[deposit(333, 7)], par());
        let selection = CrateSelector::new()
            .select(&agg, Intent::Withdraw, FixedPoint::from_raw(3_141_592, 6))
            .unwrap();
        let whole = agg.deposits[0].total_stalk().unwrap();
        let expected = whole
            .mul_ratio(FixedPoint::from_raw(3_141_592, 6), units(7))
            .unwrap();
        assert_eq!(selection.stalk_cost.total().unwrap(), expected);
    }

    #[test]
    fn bdv_update_lists_gains_largest_first() {
        let crates = [
            DepositCrate {
                deposit_bdv: units(5),
                ..deposit(200, 10)
            },
            DepositCrate {
                deposit_bdv: units(9),
                ..deposit(300, 10)
            },
            deposit(400, 10),
            // Germinating, never listed.
            DepositCrate {
                deposit_bdv: units(1),
                ..deposit(950, 10)
            },
        ];
        let agg = aggregate(&crates, par());
        let candidates = CrateSelector::new().select_for_bdv_update(&agg).unwrap();
        let stems: Vec<i128> = candidates.iter().map(|c| c.stem.mantissa()).collect();
        assert_eq!(stems, vec![200, 300]);
        assert_eq!(candidates[0].gain, units(5));
        assert_eq!(candidates[1].gain, units(1));
    }

    #[test]
    fn selection_serializes_for_the_dashboard() {
        let agg = aggregate(&[deposit(500, 100)], par());
        let selection = CrateSelector::new()
            .select(&agg, Intent::Withdraw, units(40))
            .unwrap();
        let json = serde_json::to_value(&selection).unwrap();
        assert_eq!(json["intent"], "Withdraw");
        assert_eq!(json["picked"].as_array().map(Vec::len), Some(1));
        let back: Selection = serde_json::from_value(json).unwrap();
        assert_eq!(back, selection);
    }
}
