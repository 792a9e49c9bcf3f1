//! Selection properties over seeded random accounts.
//!
//! Every run draws the same accounts, so a failure reproduces exactly.

#![allow(clippy::unwrap_used, clippy::indexing_slicing, clippy::arithmetic_side_effects)]

use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use silo_ledger::{DepositLedger, TokenDepositAggregate};
use silo_selector::{CrateSelector, SelectionError};
use silo_types::{DepositCrate, DepositId, FixedPoint, Intent, SiloTokenConfig, TokenId};

const CASES: usize = 150;
const INTENTS: [Intent; 3] = [Intent::Withdraw, Intent::Convert, Intent::Transfer];

fn random_aggregate(rng: &mut StdRng) -> TokenDepositAggregate {
    let token = TokenId::new("0xbean").unwrap();
    let tip: i128 = rng.random_range(1_000..1_000_000);
    let config = SiloTokenConfig {
        token: token.clone(),
        decimals: 6,
        stalk_issued_per_bdv: FixedPoint::from_raw(1, 0),
        seeds_issued_per_bdv: FixedPoint::from_raw(rng.random_range(0..6_000_000), 6),
        stem_tip: FixedPoint::from_raw(tip, 0),
        germinating_stem_threshold: FixedPoint::from_raw(tip - rng.random_range(0..tip), 0),
        stalk_earned_per_season: FixedPoint::from_raw(100, 0),
    };
    let count: u32 = rng.random_range(0..10);
    let crates: Vec<DepositCrate> = (0..count)
        .map(|i| {
            let stem = rng.random_range(0..=tip);
            // Some empty crates, which are never eligible.
            let amount = if rng.random_range(0..8) == 0 {
                0
            } else {
                rng.random_range(1..500_000_000)
            };
            DepositCrate {
                id: DepositId::from_hex(&format!("{i:02x}{stem:024x}")).unwrap(),
                token: token.clone(),
                stem: FixedPoint::from_raw(stem, 0),
                amount: FixedPoint::from_raw(amount, 6),
                deposit_bdv: FixedPoint::from_raw(amount / 2, 6),
            }
        })
        .collect();
    let mow = FixedPoint::from_raw(rng.random_range(0..=tip), 0);
    DepositLedger::default()
        .derive_token(&config, &crates, mow, FixedPoint::from_raw(1_500_000, 6), Utc::now())
        .unwrap()
}

fn available(agg: &TokenDepositAggregate, intent: Intent) -> i128 {
    if intent.excludes_germinating() {
        agg.convertible_amount.mantissa()
    } else {
        agg.amount.mantissa()
    }
}

#[test]
fn picked_amounts_sum_to_target() {
    let mut rng = StdRng::seed_from_u64(0x5e1e_0001);
    let selector = CrateSelector::new();

    for _ in 0..CASES {
        let agg = random_aggregate(&mut rng);
        for intent in INTENTS {
            let cap = available(&agg, intent);
            let target = FixedPoint::from_raw(rng.random_range(0..=cap), 6);
            let selection = selector.select(&agg, intent, target).unwrap();

            assert_eq!(selection.picked_total().unwrap(), target);
            assert!(selection.picked.iter().all(|p| p.picked_amount.is_positive()));
            let partials = selection.picked.iter().filter(|p| p.is_partial).count();
            assert!(partials <= 1);
            if let Some((_, earlier)) = selection.picked.split_last() {
                assert!(earlier.iter().all(|p| !p.is_partial), "only the last crate may be partial");
            }
        }
    }
}

#[test]
fn newest_eligible_crate_is_consumed_first() {
    let mut rng = StdRng::seed_from_u64(0x5e1e_0002);
    let selector = CrateSelector::new();

    for _ in 0..CASES {
        let agg = random_aggregate(&mut rng);
        for intent in INTENTS {
            let pool = if intent.excludes_germinating() {
                &agg.convertible_deposits
            } else {
                &agg.deposits
            };
            let Some(highest) = pool
                .iter()
                .filter(|c| c.deposit.amount.is_positive())
                .map(|c| c.deposit.stem.mantissa())
                .max()
            else {
                continue;
            };
            let selection = selector
                .select(&agg, intent, FixedPoint::from_raw(1, 6))
                .unwrap();
            assert_eq!(selection.picked[0].stem.mantissa(), highest);

            let stems: Vec<i128> = selector
                .select(&agg, intent, FixedPoint::from_raw(available(&agg, intent), 6))
                .unwrap()
                .stems()
                .iter()
                .map(|s| s.mantissa())
                .collect();
            assert!(stems.windows(2).all(|w| w[0] >= w[1]));
        }
    }
}

#[test]
fn larger_targets_never_cost_less() {
    let mut rng = StdRng::seed_from_u64(0x5e1e_0003);
    let selector = CrateSelector::new();

    for _ in 0..CASES {
        let agg = random_aggregate(&mut rng);
        for intent in INTENTS {
            let cap = available(&agg, intent);
            let a = rng.random_range(0..=cap);
            let b = rng.random_range(0..=cap);
            let (small, large) = (a.min(b), a.max(b));

            let cost = |target: i128| {
                let selection = selector
                    .select(&agg, intent, FixedPoint::from_raw(target, 6))
                    .unwrap();
                (
                    selection.stalk_cost.total().unwrap().mantissa(),
                    selection.seed_cost.mantissa(),
                )
            };
            let (small_stalk, small_seeds) = cost(small);
            let (large_stalk, large_seeds) = cost(large);
            assert!(small_stalk <= large_stalk);
            assert!(small_seeds <= large_seeds);
        }
    }
}

#[test]
fn over_available_always_fails() {
    let mut rng = StdRng::seed_from_u64(0x5e1e_0004);
    let selector = CrateSelector::new();

    for _ in 0..CASES {
        let agg = random_aggregate(&mut rng);
        for intent in INTENTS {
            let over = FixedPoint::from_raw(available(&agg, intent) + 1, 6);
            let result = selector.select(&agg, intent, over);
            assert!(matches!(result, Err(SelectionError::InsufficientBalance { .. })));
        }
    }
}
