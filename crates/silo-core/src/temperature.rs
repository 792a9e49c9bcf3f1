//! Temperature curves for the morning auction.
//!
//! During the morning, temperature ramps from a small fraction of the
//! season's maximum up to the maximum over a fixed number of intervals.
//! The exact shape is a protocol parameter, so it is injected as a
//! [`TemperatureCurve`] strategy. [`scaled_temperature`] wraps any strategy
//! with the guarantees every caller relies on: the output never exceeds
//! the maximum, and the last interval and beyond return exactly the
//! maximum.

use core::fmt;

use silo_types::{FixedPoint, FixedPointError};

/// Errors raised while building or evaluating a temperature curve.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CurveError {
    /// A breakpoint curve has the wrong number of points.
    #[error("expected {expected} breakpoints, got {actual}")]
    BreakpointCount {
        /// Intervals per morning.
        expected: usize,
        /// Points supplied.
        actual: usize,
    },

    /// A breakpoint is lower than the one before it.
    #[error("breakpoint {index} decreases the curve")]
    NotMonotone {
        /// Position of the offending breakpoint.
        index: usize,
    },

    /// A breakpoint fraction lies outside `[0, 1]`.
    #[error("breakpoint {index} is {value}, outside [0, 1]")]
    OutOfRange {
        /// Position of the offending breakpoint.
        index: usize,
        /// Its value.
        value: FixedPoint,
    },

    /// The maximum temperature is negative.
    #[error("maximum temperature {0} is negative")]
    NegativeMaximum(FixedPoint),

    /// Fixed-point arithmetic failed.
    #[error("arithmetic error: {0}")]
    Arithmetic(#[from] FixedPointError),
}

/// Maps a morning interval index to a temperature.
///
/// Implementations must be deterministic in `index` and non-decreasing.
pub trait TemperatureCurve: fmt::Debug + Send + Sync {
    /// Temperature at `index` of an `intervals`-long morning for a season
    /// whose maximum is `max`, in `max`'s decimals.
    ///
    /// # Errors
    ///
    /// Returns [`CurveError`] if the value cannot be computed.
    fn temperature(
        &self,
        index: u32,
        intervals: u32,
        max: FixedPoint,
    ) -> Result<FixedPoint, CurveError>;

    /// Check that the curve can describe an `intervals`-long morning.
    ///
    /// # Errors
    ///
    /// Returns [`CurveError::BreakpointCount`] if it cannot.
    fn check_intervals(&self, _intervals: u32) -> Result<(), CurveError> {
        Ok(())
    }
}

/// Evaluate `curve` at `index`, capped at `max`.
///
/// Indices at or past the last interval (`intervals - 1`) return `max`
/// without consulting the curve.
///
/// # Errors
///
/// Returns [`CurveError::NegativeMaximum`] if `max` is negative,
/// [`CurveError::BreakpointCount`] if the curve does not fit `intervals`,
/// or the curve's own error.
pub fn scaled_temperature<C: TemperatureCurve + ?Sized>(
    curve: &C,
    index: u32,
    intervals: u32,
    max: FixedPoint,
) -> Result<FixedPoint, CurveError> {
    if max.is_negative() {
        return Err(CurveError::NegativeMaximum(max));
    }
    curve.check_intervals(intervals)?;
    if index >= intervals.saturating_sub(1) {
        return Ok(max);
    }
    let value = curve.temperature(index, intervals, max)?.rescale(max.decimals())?;
    Ok(value.checked_min(max)?)
}

// ---------------------------------------------------------------------------
// BreakpointCurve
// ---------------------------------------------------------------------------

/// A curve given as one fraction of the maximum per interval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakpointCurve {
    fractions: Vec<FixedPoint>,
}

impl BreakpointCurve {
    /// Build a curve from `intervals` non-decreasing fractions in `[0, 1]`,
    /// all with the same decimals.
    ///
    /// # Errors
    ///
    /// Returns [`CurveError`] if the count, order, or range is wrong.
    pub fn new(fractions: Vec<FixedPoint>, intervals: u32) -> Result<Self, CurveError> {
        let expected = usize::try_from(intervals).unwrap_or(usize::MAX);
        if fractions.len() != expected {
            return Err(CurveError::BreakpointCount {
                expected,
                actual: fractions.len(),
            });
        }

        let mut previous: Option<FixedPoint> = None;
        for (index, &value) in fractions.iter().enumerate() {
            let one = FixedPoint::from_integer(1, value.decimals())?;
            if value.is_negative() || value.checked_cmp(one)?.is_gt() {
                return Err(CurveError::OutOfRange { index, value });
            }
            if let Some(prev) = previous {
                if value.checked_cmp(prev)?.is_lt() {
                    return Err(CurveError::NotMonotone { index });
                }
            }
            previous = Some(value);
        }
        Ok(Self { fractions })
    }

    /// The fractions, one per interval.
    pub fn fractions(&self) -> &[FixedPoint] {
        &self.fractions
    }
}

impl TemperatureCurve for BreakpointCurve {
    fn temperature(
        &self,
        index: u32,
        _intervals: u32,
        max: FixedPoint,
    ) -> Result<FixedPoint, CurveError> {
        let position = usize::try_from(index).unwrap_or(usize::MAX);
        let Some(&fraction) = self.fractions.get(position).or(self.fractions.last()) else {
            return Ok(max);
        };
        let one = FixedPoint::from_integer(1, fraction.decimals())?;
        Ok(max.mul_ratio(fraction, one)?)
    }

    fn check_intervals(&self, intervals: u32) -> Result<(), CurveError> {
        let expected = usize::try_from(intervals).unwrap_or(usize::MAX);
        if self.fractions.len() == expected {
            Ok(())
        } else {
            Err(CurveError::BreakpointCount {
                expected,
                actual: self.fractions.len(),
            })
        }
    }
}

// ---------------------------------------------------------------------------
// LinearRampCurve
// ---------------------------------------------------------------------------

/// A straight line from `floor * max` at index 0 to `max` at the last
/// interval of the morning, however many intervals it has.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinearRampCurve {
    floor: FixedPoint,
}

impl LinearRampCurve {
    /// Build a ramp starting at `floor`, a fraction of the maximum in
    /// `[0, 1]`.
    ///
    /// # Errors
    ///
    /// Returns [`CurveError::OutOfRange`] if `floor` is outside `[0, 1]`.
    pub fn new(floor: FixedPoint) -> Result<Self, CurveError> {
        let one = FixedPoint::from_integer(1, floor.decimals())?;
        if floor.is_negative() || floor.checked_cmp(one)?.is_gt() {
            return Err(CurveError::OutOfRange {
                index: 0,
                value: floor,
            });
        }
        Ok(Self { floor })
    }

    /// The starting fraction.
    pub const fn floor(&self) -> FixedPoint {
        self.floor
    }
}

impl Default for LinearRampCurve {
    /// One percent of the maximum.
    fn default() -> Self {
        Self {
            floor: FixedPoint::from_raw(1, 2),
        }
    }
}

impl TemperatureCurve for LinearRampCurve {
    fn temperature(
        &self,
        index: u32,
        intervals: u32,
        max: FixedPoint,
    ) -> Result<FixedPoint, CurveError> {
        let last = intervals.saturating_sub(1);
        if last == 0 {
            return Ok(max);
        }
        let step = index.min(last);
        let one = FixedPoint::from_integer(1, self.floor.decimals())?;
        let start = max.mul_ratio(self.floor, one)?;
        let span = max.checked_sub(start)?;
        let rise = span.mul_ratio(
            FixedPoint::from_raw(i128::from(step), 0),
            FixedPoint::from_raw(i128::from(last), 0),
        )?;
        Ok(start.checked_add(rise)?)
    }
}
