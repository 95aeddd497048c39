//! Conversions between decimal token strings and base units.

use crate::constants::{TOKEN, TOKEN_DECIMALS};
use crate::error::AmountError;

/// Parse a decimal token amount ("2.1", "10", "0.000000000000000001") into
/// base units.
///
/// # Examples
///
/// ```
/// use stakepool_core::amount::parse_amount;
/// assert_eq!(parse_amount("2.1").unwrap(), 2_100_000_000_000_000_000);
/// assert_eq!(parse_amount("1").unwrap(), 1_000_000_000_000_000_000);
/// ```
pub fn parse_amount(s: &str) -> Result<u128, AmountError> {
    let s = s.trim();
    if s.is_empty() {
        return Err(AmountError::Empty);
    }
    let (whole, frac) = match s.split_once('.') {
        Some((w, f)) => (w, f),
        None => (s, ""),
    };
    if whole.is_empty() && frac.is_empty() {
        return Err(AmountError::Empty);
    }
    if frac.len() > TOKEN_DECIMALS as usize {
        return Err(AmountError::TooPrecise(frac.len()));
    }
    let digits_ok = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
    if !digits_ok(whole) || !digits_ok(frac) {
        return Err(AmountError::InvalidDigit(s.to_string()));
    }

    let whole_units = if whole.is_empty() {
        0
    } else {
        whole.parse::<u128>().map_err(|_| AmountError::Overflow)?
    };
    let frac_units = if frac.is_empty() {
        0
    } else {
        let scale = 10u128.pow(TOKEN_DECIMALS - frac.len() as u32);
        frac.parse::<u128>().map_err(|_| AmountError::Overflow)? * scale
    };

    whole_units
        .checked_mul(TOKEN)
        .and_then(|w| w.checked_add(frac_units))
        .ok_or(AmountError::Overflow)
}

/// Format base units as a decimal token string, trimming trailing zeros.
///
/// # Examples
///
/// ```
/// use stakepool_core::amount::format_amount;
/// assert_eq!(format_amount(2_079_000_000_000_000_000), "2.079");
/// assert_eq!(format_amount(3_000_000_000_000_000_000), "3");
/// ```
pub fn format_amount(units: u128) -> String {
    let whole = units / TOKEN;
    let frac = units % TOKEN;
    if frac == 0 {
        return whole.to_string();
    }
    let frac_str = format!("{frac:0width$}", width = TOKEN_DECIMALS as usize);
    format!("{whole}.{}", frac_str.trim_end_matches('0'))
}
