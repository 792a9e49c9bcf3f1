//! Stem extraction from deposit identifiers.
//!
//! A deposit id is a 256-bit integer. The low `stem_bits` bits hold the
//! stem (two's complement when the layout is signed); the bits above hold
//! a prefix, normally the token address:
//!
//! ```text
//! | prefix (256 - stem_bits bits) | stem (stem_bits bits) |
//! ```
//!
//! The layout is a configuration value ([`StemLayout`]) rather than a
//! constant so that it can be confirmed against the protocol definition
//! without touching this code.

use silo_types::{DepositCrate, DepositId, FixedPoint, STEM_DECIMALS, StemLayout, TokenId, U256};

use crate::LedgerError;

/// Widest stem field the 128-bit mantissa can hold.
const MAX_STEM_BITS: u32 = 127;

/// Width of a deposit id.
const ID_BITS: usize = 256;

/// Extract the stem encoded in a deposit id.
///
/// # Errors
///
/// Returns [`LedgerError::InvalidLayout`] if `layout.stem_bits` is outside
/// `1..=127`.
pub fn unpack_stem(id: DepositId, layout: StemLayout) -> Result<FixedPoint, LedgerError> {
    let mask = field_mask(layout)?;
    // The field is at most 127 bits wide, so it fits the low word.
    let raw = (id.value() & U256::from(mask)).low_u128();

    let sign_bit = 1_u128.wrapping_shl(layout.stem_bits.saturating_sub(1));
    let extended = if layout.signed && raw & sign_bit != 0 {
        raw | !mask
    } else {
        raw
    };
    let value = i128::from_be_bytes(extended.to_be_bytes());
    Ok(FixedPoint::from_raw(value, STEM_DECIMALS))
}

/// Build a deposit id from a prefix and a stem.
///
/// `prefix` is read as a 256-bit integer (a token address parses to one
/// via [`DepositId::from_hex`]) and shifted above the stem field.
///
/// # Errors
///
/// Returns [`LedgerError::InvalidLayout`] if the layout is invalid, the
/// stem does not fit the field, or the prefix does not fit above it.
pub fn pack_deposit_id(
    prefix: DepositId,
    stem: FixedPoint,
    layout: StemLayout,
) -> Result<DepositId, LedgerError> {
    let mask = field_mask(layout)?;
    if stem.decimals() != STEM_DECIMALS {
        return Err(LedgerError::InvalidLayout(format!(
            "stem {stem} must carry {STEM_DECIMALS} decimals"
        )));
    }

    let value = stem.mantissa();
    let fits = if layout.signed {
        let half = i128::from_be_bytes(mask.wrapping_shr(1).to_be_bytes());
        value >= half.wrapping_neg().wrapping_sub(1) && value <= half
    } else {
        value >= 0 && value.unsigned_abs() <= mask
    };
    if !fits {
        return Err(LedgerError::InvalidLayout(format!(
            "stem {stem} does not fit in {} bits",
            layout.stem_bits
        )));
    }

    let shift = layout.stem_bits;
    let room = ID_BITS.saturating_sub(usize::try_from(shift).unwrap_or(ID_BITS));
    if prefix.value().bits() > room {
        return Err(LedgerError::InvalidLayout(format!(
            "prefix {prefix} does not fit above a {shift}-bit stem"
        )));
    }
    // The prefix fits in `room` bits, so the shift drops nothing.
    #[allow(clippy::arithmetic_side_effects)]
    let shifted = prefix.value() << shift;
    let field = U256::from(u128::from_be_bytes(value.to_be_bytes()) & mask);
    Ok(DepositId::new(shifted | field))
}

/// Build a [`DepositCrate`] whose stem is taken from its id.
///
/// # Errors
///
/// Returns [`LedgerError::InvalidLayout`] if the stem cannot be extracted.
pub fn crate_from_raw(
    id: DepositId,
    token: TokenId,
    amount: FixedPoint,
    deposit_bdv: FixedPoint,
    layout: StemLayout,
) -> Result<DepositCrate, LedgerError> {
    Ok(DepositCrate {
        id,
        token,
        stem: unpack_stem(id, layout)?,
        amount,
        deposit_bdv,
    })
}

fn field_mask(layout: StemLayout) -> Result<u128, LedgerError> {
    if layout.stem_bits == 0 || layout.stem_bits > MAX_STEM_BITS {
        return Err(LedgerError::InvalidLayout(format!(
            "stem_bits must be in 1..={MAX_STEM_BITS}, got {}",
            layout.stem_bits
        )));
    }
    Ok(1_u128.wrapping_shl(layout.stem_bits).wrapping_sub(1))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::arithmetic_side_effects)]
mod tests {
    use super::*;

    const BEAN: &str = "0xbea0000029ad1c77d3d5d23ba2d8893db9d1efab";

    #[test]
    fn unpacks_positive_stem_from_low_bits() {
        // address << 96 | 1_234_567
        let id = DepositId::from_hex(&format!("{BEAN}{:024x}", 1_234_567)).unwrap();
        let stem = unpack_stem(id, StemLayout::default()).unwrap();
        assert_eq!(stem, FixedPoint::from_raw(1_234_567, 0));
    }

    #[test]
    fn unpacks_negative_stem_as_twos_complement() {
        // uint96(-5) == 2^96 - 5
        let id = DepositId::from_hex(&format!("{BEAN}{}", "f".repeat(23) + "b")).unwrap();
        let stem = unpack_stem(id, StemLayout::default()).unwrap();
        assert_eq!(stem, FixedPoint::from_raw(-5, 0));

        let unsigned = StemLayout {
            stem_bits: 96,
            signed: false,
        };
        let raw = unpack_stem(id, unsigned).unwrap();
        assert_eq!(raw.mantissa(), (1_i128 << 96) - 5);
    }

    #[test]
    fn pack_then_unpack_preserves_prefix_and_stem() {
        let prefix = DepositId::from_hex(BEAN).unwrap();
        let stem = FixedPoint::from_raw(-42_000, 0);
        let id = pack_deposit_id(prefix, stem, StemLayout::default()).unwrap();
        assert!(id.to_string().starts_with(BEAN));
        assert_eq!(unpack_stem(id, StemLayout::default()).unwrap(), stem);
    }

    #[test]
    fn rejects_stem_wider_than_field() {
        let layout = StemLayout {
            stem_bits: 8,
            signed: true,
        };
        let prefix = DepositId::from_hex("0x01").unwrap();
        assert!(pack_deposit_id(prefix, FixedPoint::from_raw(127, 0), layout).is_ok());
        assert!(pack_deposit_id(prefix, FixedPoint::from_raw(-128, 0), layout).is_ok());
        assert!(pack_deposit_id(prefix, FixedPoint::from_raw(128, 0), layout).is_err());
    }

    #[test]
    fn rejects_prefix_that_overflows() {
        let full = DepositId::from_bytes([0xff; 32]);
        let result = pack_deposit_id(full, FixedPoint::from_raw(1, 0), StemLayout::default());
        assert!(matches!(result, Err(LedgerError::InvalidLayout(_))));

        // Exactly 160 bits fits above a 96-bit stem.
        let widest = DepositId::new(U256::MAX >> 96_u32);
        let id = pack_deposit_id(widest, FixedPoint::from_raw(-1, 0), StemLayout::default()).unwrap();
        assert_eq!(id.value(), U256::MAX);
        assert_eq!(unpack_stem(id, StemLayout::default()).unwrap(), FixedPoint::from_raw(-1, 0));
    }

    #[test]
    fn packed_id_is_prefix_shifted_above_stem() {
        let prefix = DepositId::from_hex("0x02").unwrap();
        let id = pack_deposit_id(prefix, FixedPoint::from_raw(5, 0), StemLayout::default()).unwrap();
        assert_eq!(id.value(), (U256::from(2_u32) << 96_u32) | U256::from(5_u32));
    }

    #[test]
    fn rejects_degenerate_layouts() {
        let id = DepositId::from_hex("0x01").unwrap();
        for bits in [0, 128, 200] {
            let layout = StemLayout {
                stem_bits: bits,
                signed: false,
            };
            assert!(unpack_stem(id, layout).is_err());
        }
    }
}
