//! The deposit ledger: token aggregates and account snapshots.
//!
//! [`DepositLedger`] is stateless apart from its [`AccountingParams`]. It
//! can be shared freely between threads; every call allocates and returns
//! fresh aggregates.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use ts_rs::TS;

use silo_types::{
    AccountingParams, BDV_DECIMALS, DepositCrate, FixedPoint, SEED_DECIMALS, STALK_DECIMALS,
    SiloTokenConfig, TokenId,
};

use crate::LedgerError;
use crate::accounting::{CrateAccounting, derive_crate, validate_config, validate_crate};

// ---------------------------------------------------------------------------
// TokenDepositAggregate
// ---------------------------------------------------------------------------

/// Everything an account holds of one token, summed across its crates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct TokenDepositAggregate {
    /// The token.
    pub token: TokenId,
    /// Total deposited amount, at the token's decimals.
    pub amount: FixedPoint,
    /// Total BDV recorded at deposit time.
    pub deposit_bdv: FixedPoint,
    /// Total BDV at the live price reading.
    pub current_bdv: FixedPoint,
    /// Total base stalk.
    pub base_stalk: FixedPoint,
    /// Total grown stalk.
    pub grown_stalk: FixedPoint,
    /// Total germinating stalk.
    pub germinating_stalk: FixedPoint,
    /// Total stalk the next mow would credit.
    pub mowable_stalk: FixedPoint,
    /// Total seeds.
    pub seeds: FixedPoint,
    /// Every crate, in the order supplied.
    pub deposits: Vec<CrateAccounting>,
    /// Non-germinating crates only.
    pub convertible_deposits: Vec<CrateAccounting>,
    /// Sum of `amount` over `convertible_deposits`.
    pub convertible_amount: FixedPoint,
}

impl TokenDepositAggregate {
    /// An aggregate with no crates.
    pub const fn empty(token: TokenId, decimals: u8) -> Self {
        Self {
            token,
            amount: FixedPoint::zero(decimals),
            deposit_bdv: FixedPoint::zero(BDV_DECIMALS),
            current_bdv: FixedPoint::zero(BDV_DECIMALS),
            base_stalk: FixedPoint::zero(STALK_DECIMALS),
            grown_stalk: FixedPoint::zero(STALK_DECIMALS),
            germinating_stalk: FixedPoint::zero(STALK_DECIMALS),
            mowable_stalk: FixedPoint::zero(STALK_DECIMALS),
            seeds: FixedPoint::zero(SEED_DECIMALS),
            deposits: Vec::new(),
            convertible_deposits: Vec::new(),
            convertible_amount: FixedPoint::zero(decimals),
        }
    }

    /// `base + grown + germinating` over all crates.
    pub fn total_stalk(&self) -> Result<FixedPoint, LedgerError> {
        Ok(self
            .base_stalk
            .checked_add(self.grown_stalk)?
            .checked_add(self.germinating_stalk)?)
    }

    /// Fold one crate's accounting into the totals.
    fn absorb(&mut self, accounting: CrateAccounting) -> Result<(), LedgerError> {
        self.amount = self.amount.checked_add(accounting.deposit.amount)?;
        self.deposit_bdv = self.deposit_bdv.checked_add(accounting.deposit.deposit_bdv)?;
        self.current_bdv = self.current_bdv.checked_add(accounting.current_bdv)?;
        self.base_stalk = self.base_stalk.checked_add(accounting.base_stalk)?;
        self.grown_stalk = self.grown_stalk.checked_add(accounting.grown_stalk)?;
        self.germinating_stalk = self.germinating_stalk.checked_add(accounting.germinating_stalk)?;
        self.mowable_stalk = self.mowable_stalk.checked_add(accounting.mowable_stalk)?;
        self.seeds = self.seeds.checked_add(accounting.seeds)?;
        if !accounting.is_germinating {
            self.convertible_amount = self.convertible_amount.checked_add(accounting.deposit.amount)?;
            self.convertible_deposits.push(accounting.clone());
        }
        self.deposits.push(accounting);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Account snapshot
// ---------------------------------------------------------------------------

/// Raw inputs for deriving a whole account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRequest {
    /// Every crate the account holds, across all tokens.
    pub crates: Vec<DepositCrate>,
    /// Configuration per whitelisted token.
    pub configs: BTreeMap<TokenId, SiloTokenConfig>,
    /// The account's last mow stem per token.
    pub mow_stems: BTreeMap<TokenId, FixedPoint>,
    /// Live BDV per whole token unit.
    pub bdv_prices: BTreeMap<TokenId, FixedPoint>,
}

/// Account-wide totals across every successfully derived token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct AccountTotals {
    /// Total base stalk.
    pub base_stalk: FixedPoint,
    /// Total grown stalk.
    pub grown_stalk: FixedPoint,
    /// Total germinating stalk.
    pub germinating_stalk: FixedPoint,
    /// Total stalk the next mow would credit.
    pub mowable_stalk: FixedPoint,
    /// Total seeds.
    pub seeds: FixedPoint,
    /// Total BDV at deposit time.
    pub deposit_bdv: FixedPoint,
    /// Total BDV at live prices.
    pub current_bdv: FixedPoint,
}

impl Default for AccountTotals {
    fn default() -> Self {
        Self {
            base_stalk: FixedPoint::zero(STALK_DECIMALS),
            grown_stalk: FixedPoint::zero(STALK_DECIMALS),
            germinating_stalk: FixedPoint::zero(STALK_DECIMALS),
            mowable_stalk: FixedPoint::zero(STALK_DECIMALS),
            seeds: FixedPoint::zero(SEED_DECIMALS),
            deposit_bdv: FixedPoint::zero(BDV_DECIMALS),
            current_bdv: FixedPoint::zero(BDV_DECIMALS),
        }
    }
}

impl AccountTotals {
    fn absorb(&mut self, aggregate: &TokenDepositAggregate) -> Result<(), LedgerError> {
        self.base_stalk = self.base_stalk.checked_add(aggregate.base_stalk)?;
        self.grown_stalk = self.grown_stalk.checked_add(aggregate.grown_stalk)?;
        self.germinating_stalk = self.germinating_stalk.checked_add(aggregate.germinating_stalk)?;
        self.mowable_stalk = self.mowable_stalk.checked_add(aggregate.mowable_stalk)?;
        self.seeds = self.seeds.checked_add(aggregate.seeds)?;
        self.deposit_bdv = self.deposit_bdv.checked_add(aggregate.deposit_bdv)?;
        self.current_bdv = self.current_bdv.checked_add(aggregate.current_bdv)?;
        Ok(())
    }
}

/// Result of deriving a whole account.
///
/// Derivation is per token: one token failing never hides or zeroes the
/// others. Successful tokens land in `tokens`, failures in `errors`, and
/// `totals` covers only the successful tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountSnapshot {
    /// Aggregates for every token that derived cleanly.
    pub tokens: BTreeMap<TokenId, TokenDepositAggregate>,
    /// Tokens that could not be derived, with the reason.
    pub errors: BTreeMap<TokenId, LedgerError>,
    /// Sums across `tokens`.
    pub totals: AccountTotals,
}

impl AccountSnapshot {
    /// Whether every referenced token derived cleanly.
    pub fn is_complete(&self) -> bool {
        self.errors.is_empty()
    }

    /// The aggregate for one token, if it derived cleanly.
    pub fn token(&self, token: &TokenId) -> Option<&TokenDepositAggregate> {
        self.tokens.get(token)
    }
}

// ---------------------------------------------------------------------------
// DepositLedger
// ---------------------------------------------------------------------------

/// Derives deposit accounting from raw crates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DepositLedger {
    params: AccountingParams,
}

impl DepositLedger {
    /// Create a ledger with the given protocol constants.
    pub const fn new(params: AccountingParams) -> Self {
        Self { params }
    }

    /// Return the protocol constants this ledger derives with.
    pub const fn params(&self) -> &AccountingParams {
        &self.params
    }

    /// Derive one token's aggregate from its crates.
    ///
    /// Every crate is validated first; a single invalid crate rejects the
    /// whole token rather than being clamped or skipped.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidConfig`], [`LedgerError::InvalidCrate`],
    /// [`LedgerError::InvalidMowStem`], or [`LedgerError::Arithmetic`].
    pub fn derive_token(
        &self,
        config: &SiloTokenConfig,
        crates: &[DepositCrate],
        last_mow_stem: FixedPoint,
        bdv_per_unit: FixedPoint,
        now: DateTime<Utc>,
    ) -> Result<TokenDepositAggregate, LedgerError> {
        validate_config(config)?;
        if self.params.stalk_scale <= 0 {
            return Err(LedgerError::InvalidConfig {
                token: config.token.clone(),
                reason: format!("stalk scale must be positive, got {}", self.params.stalk_scale),
            });
        }
        validate_mow_stem(config, last_mow_stem)?;
        for deposit in crates {
            validate_crate(deposit, config)?;
        }

        let mut aggregate = TokenDepositAggregate::empty(config.token.clone(), config.decimals);
        for deposit in crates {
            let accounting =
                derive_crate(deposit, config, last_mow_stem, bdv_per_unit, &self.params, now)?;
            aggregate.absorb(accounting)?;
        }

        debug!(
            token = %config.token,
            crates = aggregate.deposits.len(),
            convertible = aggregate.convertible_deposits.len(),
            amount = %aggregate.amount,
            seeds = %aggregate.seeds,
            "Derived token aggregate"
        );
        Ok(aggregate)
    }

    /// Derive every token an account touches.
    ///
    /// Tokens are the union of configured tokens and tokens referenced by
    /// crates. A configured token with no crates yields an empty aggregate;
    /// crates for an unconfigured token yield
    /// [`LedgerError::MissingConfig`] for that token alone.
    pub fn derive_account(&self, request: &AccountRequest, now: DateTime<Utc>) -> AccountSnapshot {
        let mut by_token: BTreeMap<TokenId, Vec<DepositCrate>> = request
            .configs
            .keys()
            .map(|token| (token.clone(), Vec::new()))
            .collect();
        for deposit in &request.crates {
            by_token
                .entry(deposit.token.clone())
                .or_default()
                .push(deposit.clone());
        }

        let mut snapshot = AccountSnapshot {
            tokens: BTreeMap::new(),
            errors: BTreeMap::new(),
            totals: AccountTotals::default(),
        };

        for (token, crates) in by_token {
            match self.derive_listed_token(request, &token, &crates, now) {
                Ok(aggregate) => match snapshot.totals.absorb(&aggregate) {
                    Ok(()) => {
                        snapshot.tokens.insert(token, aggregate);
                    }
                    Err(err) => {
                        warn!(%token, %err, "Account totals overflowed; token excluded");
                        snapshot.errors.insert(token, err);
                    }
                },
                Err(err) => {
                    warn!(%token, crates = crates.len(), %err, "Token skipped");
                    snapshot.errors.insert(token, err);
                }
            }
        }
        snapshot
    }

    fn derive_listed_token(
        &self,
        request: &AccountRequest,
        token: &TokenId,
        crates: &[DepositCrate],
        now: DateTime<Utc>,
    ) -> Result<TokenDepositAggregate, LedgerError> {
        let config = request
            .configs
            .get(token)
            .ok_or_else(|| LedgerError::MissingConfig(token.clone()))?;
        if crates.is_empty() {
            validate_config(config)?;
            return Ok(TokenDepositAggregate::empty(token.clone(), config.decimals));
        }
        let mow_stem = request
            .mow_stems
            .get(token)
            .copied()
            .ok_or_else(|| LedgerError::MissingInput {
                token: token.clone(),
                input: "last mow stem",
            })?;
        let price = request
            .bdv_prices
            .get(token)
            .copied()
            .ok_or_else(|| LedgerError::MissingInput {
                token: token.clone(),
                input: "bdv price",
            })?;
        self.derive_token(config, crates, mow_stem, price, now)
    }
}

fn validate_mow_stem(config: &SiloTokenConfig, stem: FixedPoint) -> Result<(), LedgerError> {
    let out_of_range = stem.decimals() != config.stem_tip.decimals()
        || stem.is_negative()
        || stem.checked_cmp(config.stem_tip)?.is_gt();
    if out_of_range {
        return Err(LedgerError::InvalidMowStem {
            token: config.token.clone(),
            stem,
            stem_tip: config.stem_tip,
        });
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use silo_types::DepositId;

    use super::*;

    fn token(name: &str) -> TokenId {
        TokenId::new(name).unwrap()
    }

    fn config(name: &str) -> SiloTokenConfig {
        SiloTokenConfig {
            token: token(name),
            decimals: 6,
            stalk_issued_per_bdv: FixedPoint::from_raw(1, 0),
            seeds_issued_per_bdv: FixedPoint::from_raw(2, 0),
            stem_tip: FixedPoint::from_raw(10_000, 0),
            germinating_stem_threshold: FixedPoint::from_raw(9_000, 0),
            stalk_earned_per_season: FixedPoint::from_raw(500, 0),
        }
    }

    fn deposit(name: &str, stem: i128, amount: i128) -> DepositCrate {
        DepositCrate {
            id: DepositId::from_hex(&format!("{stem:x}")).unwrap(),
            token: token(name),
            stem: FixedPoint::from_raw(stem, 0),
            amount: FixedPoint::from_raw(amount, 6),
            deposit_bdv: FixedPoint::from_raw(amount, 6),
        }
    }

    fn request(configs: &[&str], crates: Vec<DepositCrate>) -> AccountRequest {
        let mut req = AccountRequest {
            crates,
            ..AccountRequest::default()
        };
        for name in configs {
            req.configs.insert(token(name), config(name));
        }
        for name in ["0xbean", "0xlp"] {
            req.mow_stems.insert(token(name), FixedPoint::from_raw(10_000, 0));
            req.bdv_prices.insert(token(name), FixedPoint::from_raw(1_000_000, 6));
        }
        req
    }

    #[test]
    fn partitions_convertible_crates() {
        let ledger = DepositLedger::default();
        let crates = [deposit("0xbean", 2_000, 5_000_000), deposit("0xbean", 9_500, 1_000_000)];
        let agg = ledger
            .derive_token(
                &config("0xbean"),
                &crates,
                FixedPoint::from_raw(10_000, 0),
                FixedPoint::from_raw(1_000_000, 6),
                Utc::now(),
            )
            .unwrap();
        assert_eq!(agg.deposits.len(), 2);
        assert_eq!(agg.convertible_deposits.len(), 1);
        assert_eq!(agg.amount, FixedPoint::from_raw(6_000_000, 6));
        assert_eq!(agg.convertible_amount, FixedPoint::from_raw(5_000_000, 6));
        assert_eq!(agg.seeds, FixedPoint::from_raw(12_000_000, 6));
        // germinating crate: 1 issued + 1 * 500 / 10_000 grown
        assert_eq!(agg.germinating_stalk, FixedPoint::from_raw(10_500_000_000, 10));
    }

    #[test]
    fn one_bad_crate_rejects_the_token() {
        let ledger = DepositLedger::default();
        let crates = [deposit("0xbean", 2_000, 1), deposit("0xbean", 10_001, 1)];
        let result = ledger.derive_token(
            &config("0xbean"),
            &crates,
            FixedPoint::from_raw(10_000, 0),
            FixedPoint::from_raw(1_000_000, 6),
            Utc::now(),
        );
        assert!(matches!(result, Err(LedgerError::InvalidCrate { .. })));
    }

    #[test]
    fn mow_stem_past_tip_is_rejected() {
        let ledger = DepositLedger::default();
        let result = ledger.derive_token(
            &config("0xbean"),
            &[deposit("0xbean", 2_000, 1)],
            FixedPoint::from_raw(10_001, 0),
            FixedPoint::from_raw(1_000_000, 6),
            Utc::now(),
        );
        assert!(matches!(result, Err(LedgerError::InvalidMowStem { .. })));
    }

    #[test]
    fn missing_config_is_reported_alongside_good_tokens() {
        let ledger = DepositLedger::default();
        let req = request(
            &["0xbean"],
            vec![deposit("0xbean", 2_000, 3_000_000), deposit("0xlp", 2_000, 7_000_000)],
        );
        let snapshot = ledger.derive_account(&req, Utc::now());

        assert!(!snapshot.is_complete());
        assert_eq!(
            snapshot.errors.get(&token("0xlp")),
            Some(&LedgerError::MissingConfig(token("0xlp")))
        );
        let bean = snapshot.token(&token("0xbean")).unwrap();
        assert_eq!(bean.amount, FixedPoint::from_raw(3_000_000, 6));
        assert_eq!(snapshot.totals.deposit_bdv, FixedPoint::from_raw(3_000_000, 6));
    }

    #[test]
    fn configured_token_without_crates_is_empty() {
        let ledger = DepositLedger::default();
        let mut req = request(&["0xbean", "0xlp"], vec![deposit("0xbean", 2_000, 1)]);
        req.mow_stems.remove(&token("0xlp"));
        let snapshot = ledger.derive_account(&req, Utc::now());
        assert!(snapshot.is_complete());
        let lp = snapshot.token(&token("0xlp")).unwrap();
        assert!(lp.amount.is_zero());
        assert!(lp.deposits.is_empty());
    }

    #[test]
    fn missing_price_is_a_typed_error() {
        let ledger = DepositLedger::default();
        let mut req = request(&["0xbean"], vec![deposit("0xbean", 2_000, 1)]);
        req.bdv_prices.clear();
        let snapshot = ledger.derive_account(&req, Utc::now());
        assert!(matches!(
            snapshot.errors.get(&token("0xbean")),
            Some(LedgerError::MissingInput { input: "bdv price", .. })
        ));
        assert!(snapshot.tokens.is_empty());
    }

    #[test]
    fn request_arrives_as_json() {
        let req = request(&["0xbean"], vec![deposit("0xbean", 2_000, 1)]);
        let json = serde_json::to_string(&req).unwrap();
        let back: AccountRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(back, req);

        let snapshot = DepositLedger::default().derive_account(&back, Utc::now());
        assert!(snapshot.is_complete());
        let totals = serde_json::to_value(&snapshot.totals).unwrap();
        assert!(totals.get("base_stalk").is_some());
    }

    #[test]
    fn checksum_cased_tokens_in_json_match_their_config() {
        let req = request(&["0xbean"], vec![deposit("0xbean", 2_000, 1)]);
        let mut value = serde_json::to_value(&req).unwrap();
        if let Some(token) = value.pointer_mut("/crates/0/token") {
            *token = serde_json::Value::String("0xBEAN".to_owned());
        }
        let back: AccountRequest = serde_json::from_value(value).unwrap();
        assert_eq!(back, req);

        let snapshot = DepositLedger::default().derive_account(&back, Utc::now());
        assert!(snapshot.is_complete());

        let mut value = serde_json::to_value(&req).unwrap();
        if let Some(token) = value.pointer_mut("/crates/0/token") {
            *token = serde_json::Value::String(String::new());
        }
        assert!(serde_json::from_value::<AccountRequest>(value).is_err());
    }
}
