//! # Fixed-Point Percentages
//!
//! Skill effects are percentages like `1.5` or `0.2`. Damage scaling must
//! floor identically on every machine (`450 * 1.5 / 100` is exactly `6`),
//! so effects are held as whole millionths of a percent and scaled with
//! integer arithmetic.
//!
//! Content files still write effects as plain TOML numbers; they are
//! rounded to the nearest millionth on load.

use std::fmt;
use std::ops::{Add, AddAssign, Mul};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Millionths per unit.
const MICROS: u64 = 1_000_000;

/// A non-negative percentage with 6 decimal places.
///
/// Arithmetic saturates at `u64::MAX` millionths instead of wrapping.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(transparent)]
pub struct FixedPoint(u64);

impl FixedPoint {
    /// 0%.
    pub const ZERO: Self = Self(0);

    /// A whole percentage.
    ///
    /// ```rust
    /// use ascendant_economy::FixedPoint;
    ///
    /// assert_eq!(FixedPoint::from_whole(10).to_string(), "10");
    /// ```
    #[inline]
    #[must_use]
    pub const fn from_whole(whole: u64) -> Self {
        Self(whole.saturating_mul(MICROS))
    }

    /// `whole` plus `micros` millionths; `micros` wraps at one million.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_lossless)]
    pub const fn from_parts(whole: u64, micros: u32) -> Self {
        Self(whole.saturating_mul(MICROS).saturating_add(micros as u64 % MICROS))
    }

    /// A value of exactly `micros` millionths.
    #[inline]
    #[must_use]
    pub const fn from_raw(micros: u64) -> Self {
        Self(micros)
    }

    /// Rounds a float to the nearest millionth.
    ///
    /// Returns `None` for negative, non-finite or out-of-range input.
    #[must_use]
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    pub fn from_f64(value: f64) -> Option<Self> {
        if !value.is_finite() || value < 0.0 {
            return None;
        }
        let micros = (value * MICROS as f64).round();
        (micros < u64::MAX as f64).then(|| Self(micros as u64))
    }

    /// Lossy float value, for reports and serialization.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn to_f64(self) -> f64 {
        self.0 as f64 / MICROS as f64
    }

    /// The value in millionths.
    #[inline]
    #[must_use]
    pub const fn micros(self) -> u64 {
        self.0
    }

    /// `floor(base * self / 100)`, saturating at `u64::MAX`.
    ///
    /// ```rust
    /// use ascendant_economy::FixedPoint;
    ///
    /// let effect = FixedPoint::from_parts(1, 500_000); // 1.5%
    /// assert_eq!(effect.percent_of(450), 6);
    /// ```
    #[inline]
    #[must_use]
    pub fn percent_of(self, base: u64) -> u64 {
        let scaled = u128::from(base) * u128::from(self.0) / u128::from(100 * MICROS);
        u64::try_from(scaled).unwrap_or(u64::MAX)
    }
}

impl Add for FixedPoint {
    type Output = Self;

    #[inline]
    fn add(self, rhs: Self) -> Self {
        Self(self.0.saturating_add(rhs.0))
    }
}

impl AddAssign for FixedPoint {
    #[inline]
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

/// Scales by a step count, e.g. `effect_per_level * (level - 1)`.
impl Mul<u64> for FixedPoint {
    type Output = Self;

    #[inline]
    fn mul(self, steps: u64) -> Self {
        Self(self.0.saturating_mul(steps))
    }
}

/// Shortest exact decimal: `1.5`, `0.2`, `10`.
impl fmt::Display for FixedPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (whole, frac) = (self.0 / MICROS, self.0 % MICROS);
        if frac == 0 {
            return write!(f, "{whole}");
        }
        let digits = format!("{frac:06}");
        write!(f, "{whole}.{}", digits.trim_end_matches('0'))
    }
}

impl fmt::Debug for FixedPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}%")
    }
}

impl Serialize for FixedPoint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.to_f64())
    }
}

impl<'de> Deserialize<'de> for FixedPoint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = f64::deserialize(deserializer)?;
        Self::from_f64(value).ok_or_else(|| {
            serde::de::Error::custom(format!("expected a non-negative percentage, got {value}"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructors_agree() {
        assert_eq!(FixedPoint::from_whole(7), FixedPoint::from_parts(7, 0));
        assert_eq!(FixedPoint::from_parts(0, 200_000).micros(), 200_000);
        assert_eq!(FixedPoint::from_raw(1_500_000), FixedPoint::from_parts(1, 500_000));
    }

    #[test]
    fn test_float_input_rounds_to_millionths() {
        assert_eq!(FixedPoint::from_f64(1.5), Some(FixedPoint::from_parts(1, 500_000)));
        // 0.1 + 0.2 is 0.30000000000000004
        assert_eq!(FixedPoint::from_f64(0.1 + 0.2), Some(FixedPoint::from_parts(0, 300_000)));
        assert_eq!(FixedPoint::from_f64(-0.5), None);
        assert_eq!(FixedPoint::from_f64(f64::NAN), None);
        assert_eq!(FixedPoint::from_f64(f64::INFINITY), None);
    }

    #[test]
    fn test_level_scaling() {
        let base = FixedPoint::from_parts(1, 500_000);
        let per_level = FixedPoint::from_parts(0, 200_000);
        assert_eq!(base + per_level * 5, FixedPoint::from_parts(2, 500_000));

        let mut total = FixedPoint::ZERO;
        total += base;
        total += FixedPoint::from_whole(10);
        assert_eq!(total, FixedPoint::from_parts(11, 500_000));
    }

    #[test]
    fn test_percent_of_floors() {
        let effect = FixedPoint::from_parts(1, 500_000);
        assert_eq!(effect.percent_of(450), 6); // 6.75
        assert_eq!(FixedPoint::from_whole(100).percent_of(37), 37);
        assert_eq!(FixedPoint::ZERO.percent_of(1_000), 0);
    }

    #[test]
    fn test_saturation() {
        let huge = FixedPoint::from_raw(u64::MAX);
        assert_eq!(huge.percent_of(u64::MAX), u64::MAX);
        assert_eq!((huge + FixedPoint::from_whole(1)).micros(), u64::MAX);
        assert_eq!((huge * 3).micros(), u64::MAX);
        assert_eq!(FixedPoint::from_whole(u64::MAX).micros(), u64::MAX);
    }

    #[test]
    fn test_display() {
        assert_eq!(FixedPoint::from_parts(1, 500_000).to_string(), "1.5");
        assert_eq!(FixedPoint::from_parts(42, 123_456).to_string(), "42.123456");
        assert_eq!(FixedPoint::from_parts(0, 5).to_string(), "0.000005");
        assert_eq!(FixedPoint::from_whole(10).to_string(), "10");
        assert_eq!(format!("{:?}", FixedPoint::from_parts(2, 100_000)), "2.1%");
    }
}
