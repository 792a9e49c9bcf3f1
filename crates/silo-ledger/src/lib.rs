//! Deposit accounting for the silo.
//!
//! Every stalk, seed, and BDV figure shown for an account is derived here
//! from the raw deposit crates and the per-token protocol configuration.
//! Nothing is stored: each call re-derives its aggregates from the crate
//! set it is given.
//!
//! # Architecture
//!
//! - [`stem`] -- Extracting the stem from a 256-bit deposit id.
//! - [`accounting`] -- Per-crate derivation ([`CrateAccounting`]).
//! - [`germination`] -- Advisory germination expiry estimates.
//! - [`ledger`] -- The [`DepositLedger`]: token aggregates and account
//!   snapshots with an explicit partial-success contract.
//! - [`conservation`] -- Conservation law and germination partition checks.
//!
//! # Conservation Law
//!
//! For every crate:
//!
//! ```text
//! base + grown + germinating == bdv * stalk_per_bdv + bdv * (tip - stem) / SCALE
//! ```
//!
//! and either `germinating == 0` or `base == 0 && grown == 0`. The split
//! between base and grown depends on the account's last mow stem; the
//! total never does.
//!
//! # Usage
//!
//! ```
//! use silo_ledger::DepositLedger;
//! use silo_types::{AccountingParams, DepositCrate, DepositId, FixedPoint, SiloTokenConfig, TokenId};
//!
//! let token = TokenId::new("0xbean").unwrap();
//! let config = SiloTokenConfig {
//!     token: token.clone(),
//!     decimals: 6,
//!     stalk_issued_per_bdv: FixedPoint::from_raw(1, 0),
//!     seeds_issued_per_bdv: FixedPoint::from_raw(2, 0),
//!     stem_tip: FixedPoint::from_raw(50_000, 0),
//!     germinating_stem_threshold: FixedPoint::from_raw(48_000, 0),
//!     stalk_earned_per_season: FixedPoint::from_raw(1_000, 0),
//! };
//! let deposit = DepositCrate {
//!     id: DepositId::from_hex("0x01").unwrap(),
//!     token: token.clone(),
//!     stem: FixedPoint::from_raw(40_000, 0),
//!     amount: FixedPoint::from_raw(100_000_000, 6),
//!     deposit_bdv: FixedPoint::from_raw(100_000_000, 6),
//! };
//!
//! let ledger = DepositLedger::new(AccountingParams::default());
//! let aggregate = ledger
//!     .derive_token(
//!         &config,
//!         &[deposit],
//!         FixedPoint::from_raw(50_000, 0),
//!         FixedPoint::from_raw(1_000_000, 6),
//!         chrono::Utc::now(),
//!     )
//!     .unwrap();
//!
//! // 100 BDV at 1 stalk/BDV plus 100 * 10_000 / 10_000 grown.
//! assert_eq!(aggregate.total_stalk().unwrap().to_string(), "200.0000000000");
//! ```

pub mod accounting;
pub mod conservation;
pub mod germination;
pub mod ledger;
pub mod stem;

pub use accounting::CrateAccounting;
pub use conservation::{ConservationResult, verify_aggregate, verify_crate};
pub use ledger::{AccountRequest, AccountSnapshot, AccountTotals, DepositLedger, TokenDepositAggregate};
pub use germination::germination_date;
pub use stem::{crate_from_raw, pack_deposit_id, unpack_stem};

use silo_types::{DepositId, FixedPoint, FixedPointError, TokenId};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that can occur while deriving deposit accounting.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    /// Crates reference a token with no configuration supplied.
    #[error("no silo configuration supplied for token {0}")]
    MissingConfig(TokenId),

    /// The token's configuration is internally inconsistent.
    #[error("invalid configuration for token {token}: {reason}")]
    InvalidConfig {
        /// The misconfigured token.
        token: TokenId,
        /// What is wrong with it.
        reason: String,
    },

    /// A crate violates a data-integrity rule (stem out of range,
    /// negative amount, wrong decimals).
    #[error("invalid crate {id} for token {token}: {reason}")]
    InvalidCrate {
        /// The offending deposit.
        id: DepositId,
        /// Its token.
        token: TokenId,
        /// Which rule it breaks.
        reason: String,
    },

    /// The account's last mow stem lies outside `[0, stem_tip]`.
    #[error("invalid last mow stem {stem} for token {token} (stem tip {stem_tip})")]
    InvalidMowStem {
        /// The token.
        token: TokenId,
        /// The supplied mow stem.
        stem: FixedPoint,
        /// The token's current stem tip.
        stem_tip: FixedPoint,
    },

    /// A per-token input other than the configuration is missing.
    #[error("missing {input} for token {token}")]
    MissingInput {
        /// The token.
        token: TokenId,
        /// Which input (`"last mow stem"`, `"bdv price"`).
        input: &'static str,
    },

    /// A stem cannot be extracted with the configured id layout.
    #[error("invalid stem layout: {0}")]
    InvalidLayout(String),

    /// Fixed-point arithmetic failed.
    #[error("arithmetic error: {0}")]
    Arithmetic(#[from] FixedPointError),
}

// ---------------------------------------------------------------------------
// Anomaly type
// ---------------------------------------------------------------------------

/// A conservation or partition violation found by [`conservation`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountingAnomaly {
    /// The token whose accounting is inconsistent.
    pub token: TokenId,
    /// The crate, when the anomaly is crate-level.
    pub id: Option<DepositId>,
    /// Human-readable description of the anomaly.
    pub message: String,
}

impl core::fmt::Display for AccountingAnomaly {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.message)
    }
}
