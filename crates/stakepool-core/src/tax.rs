//! Basis-point tax calculation.

use crate::constants::BPS_PRECISION;
use crate::math::mul_div_floor;

/// `floor(value * basis_points / 10000)`.
///
/// Rates above 10,000 bps are accepted by the arithmetic (the result then
/// exceeds `value`) but are rejected by every configuration setter. A result
/// wider than `u128` saturates.
///
/// # Examples
///
/// ```
/// use stakepool_core::tax::find_tax_amount;
/// use stakepool_core::constants::TOKEN;
/// assert_eq!(find_tax_amount(TOKEN, 100), TOKEN / 100);
/// assert_eq!(find_tax_amount(12_345, 0), 0);
/// assert_eq!(find_tax_amount(12_345, 10_000), 12_345);
/// ```
pub fn find_tax_amount(value: u128, basis_points: u64) -> u128 {
    mul_div_floor(value, basis_points as u128, BPS_PRECISION as u128).unwrap_or(u128::MAX)
}

/// Whether `basis_points` is a valid rate (at most 100%).
pub fn is_valid_bps(basis_points: u64) -> bool {
    basis_points <= BPS_PRECISION
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::TOKEN;
    use proptest::prelude::*;

    #[test]
    fn one_percent_of_one_token() {
        assert_eq!(find_tax_amount(TOKEN, 100), 10_000_000_000_000_000);
    }

    #[test]
    fn one_percent_of_two_point_one_tokens() {
        let value = 2 * TOKEN + TOKEN / 10;
        let tax = find_tax_amount(value, 100);
        assert_eq!(tax, 21_000_000_000_000_000);
        assert_eq!(value - tax, 2_079_000_000_000_000_000);
    }

    #[test]
    fn truncates_toward_zero() {
        // 99 * 100 / 10000 = 0.99 -> 0
        assert_eq!(find_tax_amount(99, 100), 0);
        assert_eq!(find_tax_amount(100, 100), 1);
    }

    #[test]
    fn no_overflow_near_u128_max() {
        assert_eq!(find_tax_amount(u128::MAX, 10_000), u128::MAX);
        assert_eq!(find_tax_amount(u128::MAX, 5_000), u128::MAX / 2);
    }

    #[test]
    fn above_full_rate_exceeds_value() {
        assert_eq!(find_tax_amount(100, 20_000), 200);
        assert!(!is_valid_bps(10_001));
        assert!(is_valid_bps(10_000));
    }

    proptest! {
        #[test]
        fn matches_reference_formula(value in 0u128..=(u64::MAX as u128), bps in 0u64..=10_000) {
            prop_assert_eq!(find_tax_amount(value, bps), value * bps as u128 / 10_000);
        }

        #[test]
        fn never_exceeds_value_for_valid_rates(value in any::<u128>(), bps in 0u64..=10_000) {
            prop_assert!(find_tax_amount(value, bps) <= value);
        }

        #[test]
        fn zero_and_full_rate(value in any::<u128>()) {
            prop_assert_eq!(find_tax_amount(value, 0), 0);
            prop_assert_eq!(find_tax_amount(value, 10_000), value);
        }
    }
}
