//! Crate selection for withdraw, convert, and transfer requests.
//!
//! Given a derived [`TokenDepositAggregate`], an [`Intent`], and a target
//! amount, the selector picks which crates to remove and reports what
//! removing them costs the account in stalk, seeds, and BDV. The caller
//! decides whether to proceed; the selector only computes.
//!
//! Selection is newest-first: crates with the highest stem (least grown
//! stalk) are consumed before older ones, whole crates first, then at most
//! one partial crate.
//!
//! # Modules
//!
//! - [`selector`] -- [`CrateSelector`], [`Selection`], and BDV-update
//!   candidate listing
//!
//! [`TokenDepositAggregate`]: silo_ledger::TokenDepositAggregate

pub mod selector;

pub use selector::{BdvUpdateCandidate, CrateSelector, PickedCrate, Selection, StalkCost};

use silo_types::{FixedPoint, FixedPointError, Intent};

/// Errors that can occur while selecting crates.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectionError {
    /// The eligible crates hold less than the requested amount.
    #[error("insufficient balance to {intent}: requested {requested}, available {available}")]
    InsufficientBalance {
        /// What the caller asked to do.
        intent: Intent,
        /// The requested amount.
        requested: FixedPoint,
        /// The amount held by eligible crates.
        available: FixedPoint,
    },

    /// The requested amount is negative.
    #[error("invalid selection target {0}")]
    InvalidTarget(FixedPoint),

    /// Fixed-point arithmetic failed, including a target whose decimals
    /// differ from the token's.
    #[error("arithmetic error: {0}")]
    Arithmetic(#[from] FixedPointError),
}
