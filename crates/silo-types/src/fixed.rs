//! Integer-mantissa fixed-point values.
//!
//! A [`FixedPoint`] is an `i128` mantissa paired with a count of decimal
//! places: the represented value is `mantissa / 10^decimals`. Every
//! quantity the engine touches (token amounts, stalk, seeds, BDV, stems,
//! temperature) is a `FixedPoint` so that no floating-point drift can leak
//! into monetary results.
//!
//! # Rules
//!
//! - Addition, subtraction, and comparison require both operands to carry
//!   the same number of decimals. A mismatch is a
//!   [`FixedPointError::DecimalMismatch`]; callers rescale explicitly with
//!   [`FixedPoint::rescale`].
//! - Multiplication and division take the output decimals as an argument.
//! - Every narrowing step truncates toward zero.
//! - Intermediate products are computed at 256-bit width, so
//!   `a * b / c` only fails when the final result does not fit in `i128`.

use core::cmp::Ordering;
use core::fmt;

use primitive_types::U256;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Largest decimal count for which `10^decimals` fits in an `i128`.
pub const MAX_DECIMALS: u8 = 38;

/// Errors produced by fixed-point arithmetic.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FixedPointError {
    /// The operands carry different decimal counts.
    #[error("decimal mismatch: {left} vs {right} places, rescale before combining")]
    DecimalMismatch {
        /// Decimals of the left operand.
        left: u8,
        /// Decimals of the right operand.
        right: u8,
    },

    /// The result does not fit in an `i128` mantissa.
    #[error("fixed-point overflow in {op}")]
    Overflow {
        /// The operation that overflowed.
        op: &'static str,
    },

    /// Division by a zero value.
    #[error("fixed-point division by zero")]
    DivisionByZero,

    /// The value cannot be represented in the requested form.
    #[error("unrepresentable fixed-point value: {reason}")]
    Unrepresentable {
        /// Explanation of why conversion failed.
        reason: String,
    },
}

/// A decimal number stored as an integer mantissa and a decimal count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct FixedPoint {
    /// Raw integer mantissa, serialized as a decimal string.
    #[serde(with = "mantissa_string")]
    #[ts(type = "string")]
    mantissa: i128,
    /// Number of decimal places the mantissa carries.
    decimals: u8,
}

impl FixedPoint {
    /// Build a value from its raw parts.
    pub const fn from_raw(mantissa: i128, decimals: u8) -> Self {
        Self { mantissa, decimals }
    }

    /// Zero with the given decimal count.
    pub const fn zero(decimals: u8) -> Self {
        Self::from_raw(0, decimals)
    }

    /// Build `value` whole units at the given decimal count.
    pub fn from_integer(value: i128, decimals: u8) -> Result<Self, FixedPointError> {
        let factor = pow10(u32::from(decimals))?;
        let mantissa = value
            .checked_mul(factor)
            .ok_or(FixedPointError::Overflow { op: "from_integer" })?;
        Ok(Self::from_raw(mantissa, decimals))
    }

    /// Parse a decimal string such as `"12.5"` into the given decimal count.
    ///
    /// Extra fractional digits beyond `decimals` are truncated.
    pub fn parse(text: &str, decimals: u8) -> Result<Self, FixedPointError> {
        let value = Decimal::from_str_exact(text.trim()).map_err(|err| {
            FixedPointError::Unrepresentable {
                reason: format!("cannot parse {text:?}: {err}"),
            }
        })?;
        Self::from_decimal(value, decimals)
    }

    /// Convert a [`Decimal`] into a fixed-point value at `decimals` places.
    pub fn from_decimal(value: Decimal, decimals: u8) -> Result<Self, FixedPointError> {
        let scale = u8::try_from(value.scale()).map_err(|_err| {
            FixedPointError::Unrepresentable {
                reason: format!("decimal scale {} out of range", value.scale()),
            }
        })?;
        Self::from_raw(value.mantissa(), scale).rescale(decimals)
    }

    /// Convert into a [`Decimal`] for display or interop.
    pub fn to_decimal(self) -> Result<Decimal, FixedPointError> {
        Decimal::try_from_i128_with_scale(self.mantissa, u32::from(self.decimals)).map_err(
            |err| FixedPointError::Unrepresentable {
                reason: format!("{self} does not fit a 96-bit decimal: {err}"),
            },
        )
    }

    /// Return the raw mantissa.
    pub const fn mantissa(self) -> i128 {
        self.mantissa
    }

    /// Return the decimal count.
    pub const fn decimals(self) -> u8 {
        self.decimals
    }

    /// Whether the value is exactly zero.
    pub const fn is_zero(self) -> bool {
        self.mantissa == 0
    }

    /// Whether the value is strictly below zero.
    pub const fn is_negative(self) -> bool {
        self.mantissa < 0
    }

    /// Whether the value is strictly above zero.
    pub const fn is_positive(self) -> bool {
        self.mantissa > 0
    }

    /// Re-express the value at a different decimal count.
    ///
    /// Widening multiplies the mantissa and can overflow; narrowing
    /// truncates toward zero.
    pub fn rescale(self, decimals: u8) -> Result<Self, FixedPointError> {
        let shift = u32::from(decimals.abs_diff(self.decimals));
        let mantissa = match decimals.cmp(&self.decimals) {
            Ordering::Equal => self.mantissa,
            Ordering::Greater => {
                if self.mantissa == 0 {
                    0
                } else {
                    self.mantissa
                        .checked_mul(pow10(shift)?)
                        .ok_or(FixedPointError::Overflow { op: "rescale" })?
                }
            }
            Ordering::Less => div_pow10(self.mantissa, shift)?,
        };
        Ok(Self::from_raw(mantissa, decimals))
    }

    /// Add two values with equal decimals.
    pub fn checked_add(self, other: Self) -> Result<Self, FixedPointError> {
        self.ensure_aligned(other)?;
        let mantissa = self
            .mantissa
            .checked_add(other.mantissa)
            .ok_or(FixedPointError::Overflow { op: "add" })?;
        Ok(Self::from_raw(mantissa, self.decimals))
    }

    /// Subtract two values with equal decimals.
    pub fn checked_sub(self, other: Self) -> Result<Self, FixedPointError> {
        self.ensure_aligned(other)?;
        let mantissa = self
            .mantissa
            .checked_sub(other.mantissa)
            .ok_or(FixedPointError::Overflow { op: "sub" })?;
        Ok(Self::from_raw(mantissa, self.decimals))
    }

    /// Compare two values with equal decimals.
    pub fn checked_cmp(self, other: Self) -> Result<Ordering, FixedPointError> {
        self.ensure_aligned(other)?;
        Ok(self.mantissa.cmp(&other.mantissa))
    }

    /// The larger of two values with equal decimals.
    pub fn checked_max(self, other: Self) -> Result<Self, FixedPointError> {
        Ok(match self.checked_cmp(other)? {
            Ordering::Less => other,
            Ordering::Equal | Ordering::Greater => self,
        })
    }

    /// The smaller of two values with equal decimals.
    pub fn checked_min(self, other: Self) -> Result<Self, FixedPointError> {
        Ok(match self.checked_cmp(other)? {
            Ordering::Greater => other,
            Ordering::Equal | Ordering::Less => self,
        })
    }

    /// Multiply two values, producing a result at `decimals` places.
    pub fn checked_mul(self, other: Self, decimals: u8) -> Result<Self, FixedPointError> {
        let product_decimals = u32::from(self.decimals).saturating_add(u32::from(other.decimals));
        let out = u32::from(decimals);
        let mantissa = if product_decimals >= out {
            let shift = product_decimals.saturating_sub(out);
            mul_div_pow10(self.mantissa, other.mantissa, shift)?
        } else {
            let shift = out.saturating_sub(product_decimals);
            self.mantissa
                .checked_mul(other.mantissa)
                .and_then(|product| product.checked_mul(pow10(shift).ok()?))
                .ok_or(FixedPointError::Overflow { op: "mul" })?
        };
        Ok(Self::from_raw(mantissa, decimals))
    }

    /// Divide by another value, producing a result at `decimals` places.
    pub fn checked_div(self, other: Self, decimals: u8) -> Result<Self, FixedPointError> {
        if other.mantissa == 0 {
            return Err(FixedPointError::DivisionByZero);
        }
        // result = self.m * 10^(out + other.d - self.d) / other.m
        let up = u32::from(decimals).saturating_add(u32::from(other.decimals));
        let down = u32::from(self.decimals);
        let mantissa = if up >= down {
            let factor = pow10(up.saturating_sub(down))?;
            mul_div(self.mantissa, factor, other.mantissa, "div")?
        } else {
            let quotient = self
                .mantissa
                .checked_div(other.mantissa)
                .ok_or(FixedPointError::Overflow { op: "div" })?;
            div_pow10(quotient, down.saturating_sub(up))?
        };
        Ok(Self::from_raw(mantissa, decimals))
    }

    /// Compute `self * numerator / denominator` keeping `self`'s decimals.
    ///
    /// `numerator` and `denominator` must share decimals. Used to prorate
    /// a quantity by a fraction of an amount.
    pub fn mul_ratio(self, numerator: Self, denominator: Self) -> Result<Self, FixedPointError> {
        numerator.ensure_aligned(denominator)?;
        let mantissa = mul_div(self.mantissa, numerator.mantissa, denominator.mantissa, "mul_ratio")?;
        Ok(Self::from_raw(mantissa, self.decimals))
    }

    /// Multiply by a plain integer factor.
    pub fn mul_int(self, factor: i128) -> Result<Self, FixedPointError> {
        let mantissa = self
            .mantissa
            .checked_mul(factor)
            .ok_or(FixedPointError::Overflow { op: "mul_int" })?;
        Ok(Self::from_raw(mantissa, self.decimals))
    }

    /// Divide by a plain integer divisor, truncating toward zero.
    pub fn div_int(self, divisor: i128) -> Result<Self, FixedPointError> {
        if divisor == 0 {
            return Err(FixedPointError::DivisionByZero);
        }
        let mantissa = self
            .mantissa
            .checked_div(divisor)
            .ok_or(FixedPointError::Overflow { op: "div_int" })?;
        Ok(Self::from_raw(mantissa, self.decimals))
    }

    const fn ensure_aligned(self, other: Self) -> Result<(), FixedPointError> {
        if self.decimals == other.decimals {
            Ok(())
        } else {
            Err(FixedPointError::DecimalMismatch {
                left: self.decimals,
                right: other.decimals,
            })
        }
    }
}

impl fmt::Display for FixedPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let digits = self.mantissa.unsigned_abs().to_string();
        let places = usize::from(self.decimals);
        let sign = if self.mantissa < 0 { "-" } else { "" };
        if places == 0 {
            return write!(f, "{sign}{digits}");
        }
        let padded = format!("{digits:0>width$}", width = places.saturating_add(1));
        let split = padded.len().saturating_sub(places);
        let (whole, frac) = padded.split_at(split);
        write!(f, "{sign}{whole}.{frac}")
    }
}

// ---------------------------------------------------------------------------
// Wide arithmetic
// ---------------------------------------------------------------------------

fn pow10(exp: u32) -> Result<i128, FixedPointError> {
    10_i128
        .checked_pow(exp)
        .ok_or(FixedPointError::Overflow { op: "pow10" })
}

/// Truncating division by `10^shift`. Shifts past the `i128` range yield 0.
fn div_pow10(value: i128, shift: u32) -> Result<i128, FixedPointError> {
    if shift > u32::from(MAX_DECIMALS) {
        return Ok(0);
    }
    value
        .checked_div(pow10(shift)?)
        .ok_or(FixedPointError::Overflow { op: "div_pow10" })
}

/// `a * b / 10^shift` with a 256-bit intermediate.
fn mul_div_pow10(a: i128, b: i128, shift: u32) -> Result<i128, FixedPointError> {
    let max = u32::from(MAX_DECIMALS);
    if shift <= max {
        return mul_div(a, b, pow10(shift)?, "mul");
    }
    let partial = mul_div(a, b, pow10(max)?, "mul")?;
    div_pow10(partial, shift.saturating_sub(max))
}

/// Signed `a * b / c`, truncated toward zero, with a 256-bit intermediate.
fn mul_div(a: i128, b: i128, c: i128, op: &'static str) -> Result<i128, FixedPointError> {
    if c == 0 {
        return Err(FixedPointError::DivisionByZero);
    }
    let negative = (a < 0) ^ (b < 0) ^ (c < 0);
    let magnitude = mul_div_u128(a.unsigned_abs(), b.unsigned_abs(), c.unsigned_abs())
        .ok_or(FixedPointError::Overflow { op })?;
    let value = i128::try_from(magnitude).map_err(|_err| FixedPointError::Overflow { op })?;
    if negative {
        value.checked_neg().ok_or(FixedPointError::Overflow { op })
    } else {
        Ok(value)
    }
}

/// Unsigned `a * b / c` (floor). `None` if `c == 0` or the quotient
/// exceeds 128 bits.
fn mul_div_u128(a: u128, b: u128, c: u128) -> Option<u128> {
    // A 128x128-bit product always fits in 256 bits.
    let quotient = U256::from(a)
        .checked_mul(U256::from(b))?
        .checked_div(U256::from(c))?;
    (quotient.bits() <= 128).then(|| quotient.low_u128())
}

mod mantissa_string {
    use serde::{Deserialize, Deserializer, Serializer};

    #[allow(clippy::trivially_copy_pass_by_ref)]
    pub fn serialize<S: Serializer>(value: &i128, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(value)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i128, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
