//! Protocol constants. All token values are in base units (1 token = 10^18 units).

/// Base units per whole token.
pub const TOKEN: u128 = 1_000_000_000_000_000_000;

/// Number of decimal places in a whole token.
pub const TOKEN_DECIMALS: u32 = 18;

/// Smallest amount accepted by `stake` and `unstake`: one whole token.
pub const MIN_STAKE: u128 = TOKEN;

/// Basis-point denominator (10,000 bps = 100%).
pub const BPS_PRECISION: u64 = 10_000;

/// Scale factor for the dividend-per-share accumulator (2^96).
///
/// Products against this factor are computed in 256-bit arithmetic, so any
/// `u128` amount can be magnified without overflow. The per-credit truncation
/// loss is `total_staked / MAGNITUDE`, below one base unit while fewer than
/// 2^96 units (~79 billion tokens) are staked.
pub const MAGNITUDE: u128 = 1 << 96;

/// Default stake-entry tax: 1%.
pub const DEFAULT_STAKING_TAX_BPS: u64 = 100;

/// Default stake-exit tax: 1%.
pub const DEFAULT_UNSTAKING_TAX_BPS: u64 = 100;

/// Default fraction of the reward reserve released per cycle: 10%.
pub const DEFAULT_RELEASE_BPS: u64 = 1_000;

/// Default reward cycle length: one week.
pub const DEFAULT_RELEASE_INTERVAL_SECS: u64 = 7 * 24 * 60 * 60;
