//! Wide integer arithmetic for the dividend accumulator.
//!
//! Token amounts are `u128`. Magnified values (`amount * MAGNITUDE`) and
//! accumulator products need up to 224 bits, so they live in [`U256`].
//! Per-account corrections can be negative and use [`SignedU256`].
//!
//! Mutating paths use the `checked_*` helpers and surface overflow as an
//! error; read paths saturate.

use std::fmt;

use crate::constants::MAGNITUDE;

#[allow(clippy::assign_op_pattern, clippy::ptr_offset_with_cast, clippy::manual_div_ceil)]
mod wide {
    uint::construct_uint! {
        /// 256-bit unsigned integer.
        pub struct U256(4);
    }
}

pub use wide::U256;

/// `value * MAGNITUDE`. Cannot overflow: `2^128 * 2^96 < 2^256`.
pub fn magnify(value: u128) -> U256 {
    U256::from(value) * U256::from(MAGNITUDE)
}

/// `floor(value / MAGNITUDE)`, saturating at `u128::MAX`.
pub fn demagnify(value: U256) -> u128 {
    to_u128_saturating(value / U256::from(MAGNITUDE))
}

/// Narrow a `U256` into `u128`, or `None` if it does not fit.
pub fn to_u128(value: U256) -> Option<u128> {
    if value.bits() > 128 {
        None
    } else {
        Some(value.low_u128())
    }
}

/// Narrow a `U256` into `u128`, clamping at `u128::MAX`.
pub fn to_u128_saturating(value: U256) -> u128 {
    to_u128(value).unwrap_or(u128::MAX)
}

/// `floor(a * b / denominator)` with a 256-bit intermediate.
///
/// Returns `None` for a zero denominator or a result wider than `u128`.
///
/// # Examples
///
/// ```
/// use stakepool_core::math::mul_div_floor;
/// assert_eq!(mul_div_floor(u128::MAX, 2, 4), Some(u128::MAX / 2));
/// assert_eq!(mul_div_floor(7, 3, 2), Some(10));
/// assert_eq!(mul_div_floor(1, 1, 0), None);
/// ```
pub fn mul_div_floor(a: u128, b: u128, denominator: u128) -> Option<u128> {
    if denominator == 0 {
        return None;
    }
    let product = U256::from(a).checked_mul(U256::from(b))?;
    to_u128(product / U256::from(denominator))
}

/// Sign-magnitude 256-bit integer.
///
/// Zero is always stored as non-negative, so derived equality is exact.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SignedU256 {
    negative: bool,
    magnitude: U256,
}

impl Default for SignedU256 {
    fn default() -> Self {
        Self::zero()
    }
}

impl SignedU256 {
    pub fn zero() -> Self {
        Self { negative: false, magnitude: U256::zero() }
    }

    pub fn positive(magnitude: U256) -> Self {
        Self { negative: false, magnitude }
    }

    pub fn negative(magnitude: U256) -> Self {
        Self { negative: !magnitude.is_zero(), magnitude }
    }

    pub fn is_negative(&self) -> bool {
        self.negative
    }

    pub fn is_zero(&self) -> bool {
        self.magnitude.is_zero()
    }

    pub fn magnitude(&self) -> U256 {
        self.magnitude
    }

    /// `self + rhs`.
    pub fn checked_add_unsigned(self, rhs: U256) -> Option<Self> {
        if !self.negative {
            return Some(Self::positive(self.magnitude.checked_add(rhs)?));
        }
        if rhs >= self.magnitude {
            Some(Self::positive(rhs - self.magnitude))
        } else {
            Some(Self::negative(self.magnitude - rhs))
        }
    }

    /// `self - rhs`.
    pub fn checked_sub_unsigned(self, rhs: U256) -> Option<Self> {
        if self.negative {
            return Some(Self::negative(self.magnitude.checked_add(rhs)?));
        }
        if self.magnitude >= rhs {
            Some(Self::positive(self.magnitude - rhs))
        } else {
            Some(Self::negative(rhs - self.magnitude))
        }
    }

    /// `base + self` as an unsigned value.
    ///
    /// Returns `None` if the sum is negative or overflows.
    pub fn offset(self, base: U256) -> Option<U256> {
        if self.negative {
            base.checked_sub(self.magnitude)
        } else {
            base.checked_add(self.magnitude)
        }
    }
}

impl fmt::Display for SignedU256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negative {
            write!(f, "-{}", self.magnitude)
        } else {
            write!(f, "{}", self.magnitude)
        }
    }
}
