use std::fmt;
use std::ops::{Add, AddAssign};

use serde::{Deserialize, Serialize};

/// Fixed-point scalar with 6 decimal places of precision.
///
/// Rates are kept fixed-point so estimates persisted in the store decode to
/// exactly the value that was written.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Scalar(pub i64);

impl Scalar {
    pub const SCALE: i64 = 1_000_000;

    pub fn from_f32(value: f32) -> Self {
        Self((value * Self::SCALE as f32).round() as i64)
    }

    pub fn from_u32(value: u32) -> Self {
        Self(i64::from(value) * Self::SCALE)
    }

    /// `numerator / denominator`, truncated to the fixed-point grid. A zero
    /// denominator yields zero.
    pub fn from_ratio(numerator: u32, denominator: u32) -> Self {
        if denominator == 0 {
            return Self::zero();
        }
        Self(i64::from(numerator) * Self::SCALE / i64::from(denominator))
    }

    pub fn to_f32(self) -> f32 {
        self.0 as f32 / Self::SCALE as f32
    }

    pub fn zero() -> Self {
        Self(0)
    }

    pub fn one() -> Self {
        Self(Self::SCALE)
    }

    pub fn raw(self) -> i64 {
        self.0
    }

    pub fn from_raw(value: i64) -> Self {
        Self(value)
    }

    pub fn is_positive(self) -> bool {
        self.0 > 0
    }

    pub fn mul_u32(self, factor: u32) -> Self {
        Self(self.0 * i64::from(factor))
    }

    /// Smallest integer not below the value; negatives clamp to zero.
    pub fn ceil_u32(self) -> u32 {
        if self.0 <= 0 {
            return 0;
        }
        let whole = (self.0 + Self::SCALE - 1) / Self::SCALE;
        u32::try_from(whole).unwrap_or(u32::MAX)
    }

    /// `ceil(value / divisor)` for a positive divisor.
    pub fn ceil_div(self, divisor: Scalar) -> u32 {
        if divisor.0 <= 0 || self.0 <= 0 {
            return 0;
        }
        let whole = (self.0 + divisor.0 - 1) / divisor.0;
        u32::try_from(whole).unwrap_or(u32::MAX)
    }
}

impl Add for Scalar {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl AddAssign for Scalar {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl fmt::Debug for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6}", self.to_f32())
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}", self.to_f32())
    }
}
