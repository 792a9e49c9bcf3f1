//! Shared type definitions for the silo deposit engine.
//!
//! This crate is the single source of truth for the records that flow
//! between the deposit ledger, the crate selector, and the morning clock.
//! Dashboard-facing types derive `ts-rs` so the front end consumes the
//! same shapes the engine produces.
//!
//! # Modules
//!
//! - [`fixed`] -- [`FixedPoint`], the integer-mantissa decimal used for
//!   every amount, stalk, seed, and BDV quantity
//! - [`ids`] -- Token and deposit identifiers
//! - [`enums`] -- Selection intents and morning phases
//! - [`structs`] -- Token configuration, deposit crates, accounting
//!   parameters, and morning snapshots

pub mod enums;
pub mod fixed;
pub mod ids;
pub mod structs;

pub use enums::{Intent, MorningPhase};
pub use fixed::{FixedPoint, FixedPointError};
pub use ids::{DepositId, IdParseError, TokenId};
pub use primitive_types::U256;
pub use structs::{AccountingParams, DepositCrate, MorningState, SiloTokenConfig, StemLayout};

// ---------------------------------------------------------------------------
// Protocol decimal conventions
// ---------------------------------------------------------------------------

/// Decimal places carried by stalk quantities.
pub const STALK_DECIMALS: u8 = 10;

/// Decimal places carried by seed quantities.
pub const SEED_DECIMALS: u8 = 6;

/// Decimal places carried by BDV quantities.
pub const BDV_DECIMALS: u8 = 6;

/// Stems are whole stem units.
pub const STEM_DECIMALS: u8 = 0;

/// Decimal places carried by temperature values (percent with 6 places).
pub const TEMPERATURE_DECIMALS: u8 = 6;
