//! Identifiers for silo tokens and deposit crates.
//!
//! Token identifiers are contract addresses, normalized to lowercase so
//! that map lookups do not depend on checksum casing. Deposit identifiers
//! are 256-bit integers ([`U256`]); the stem they encode is extracted by
//! the ledger's stem unpacking.

use core::fmt;
use core::str::FromStr;

use primitive_types::U256;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use ts_rs::TS;

/// Errors produced when parsing an identifier from text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdParseError {
    /// The hex body has the wrong number of digits.
    #[error("expected at most {expected} hex digits, got {actual}")]
    Length {
        /// Maximum accepted digit count.
        expected: usize,
        /// Digits supplied.
        actual: usize,
    },

    /// A character outside `[0-9a-fA-F]` was found.
    #[error("invalid hex digit in {0:?}")]
    InvalidDigit(String),

    /// The identifier was empty.
    #[error("identifier must not be empty")]
    Empty,
}

// ---------------------------------------------------------------------------
// TokenId
// ---------------------------------------------------------------------------

/// Identifier of a whitelisted silo token (its contract address).
///
/// Deserialization goes through [`TokenId::new`], so ids read from JSON or
/// YAML are normalized the same way as ids built in code.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct TokenId(String);

impl TokenId {
    /// Build a token identifier, normalizing to lowercase.
    pub fn new(address: &str) -> Result<Self, IdParseError> {
        let trimmed = address.trim();
        if trimmed.is_empty() {
            return Err(IdParseError::Empty);
        }
        Ok(Self(trimmed.to_ascii_lowercase()))
    }

    /// Return the normalized address.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for TokenId {
    type Err = IdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for TokenId {
    type Error = IdParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl<'de> Deserialize<'de> for TokenId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::try_from(raw).map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// DepositId
// ---------------------------------------------------------------------------

/// Number of bytes in a deposit identifier.
pub const DEPOSIT_ID_BYTES: usize = 32;

/// A 256-bit deposit identifier.
///
/// Serialized as a `0x`-prefixed, 64-digit lowercase hex string; fields of
/// this type are exported to `TypeScript` as `string`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct DepositId(U256);

impl DepositId {
    /// Wrap a 256-bit integer.
    pub const fn new(value: U256) -> Self {
        Self(value)
    }

    /// Return the id as a 256-bit integer.
    pub const fn value(self) -> U256 {
        self.0
    }

    /// Build an id from big-endian bytes.
    pub fn from_bytes(bytes: [u8; DEPOSIT_ID_BYTES]) -> Self {
        Self(U256::from_big_endian(&bytes))
    }

    /// Return the id as big-endian bytes.
    pub fn to_bytes(self) -> [u8; DEPOSIT_ID_BYTES] {
        let mut bytes = [0_u8; DEPOSIT_ID_BYTES];
        self.0.to_big_endian(&mut bytes);
        bytes
    }

    /// Parse a hex string, with or without a `0x` prefix.
    ///
    /// Shorter inputs denote smaller integers, so `"0x01ff"` is the id
    /// `0x1ff`.
    pub fn from_hex(text: &str) -> Result<Self, IdParseError> {
        let trimmed = text.trim();
        let body = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);
        if body.is_empty() {
            return Err(IdParseError::Empty);
        }
        let max_digits = DEPOSIT_ID_BYTES.saturating_mul(2);
        if body.len() > max_digits {
            return Err(IdParseError::Length {
                expected: max_digits,
                actual: body.len(),
            });
        }
        U256::from_str_radix(body, 16)
            .map(Self)
            .map_err(|_err| IdParseError::InvalidDigit(text.to_owned()))
    }
}

impl From<U256> for DepositId {
    fn from(value: U256) -> Self {
        Self(value)
    }
}

impl fmt::Display for DepositId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let digits = format!("{:x}", self.0);
        let width = DEPOSIT_ID_BYTES.saturating_mul(2);
        write!(f, "0x{digits:0>width$}")
    }
}

impl FromStr for DepositId {
    type Err = IdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl Serialize for DepositId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for DepositId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::from_hex(&raw).map_err(serde::de::Error::custom)
    }
}
