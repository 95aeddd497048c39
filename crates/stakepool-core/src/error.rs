//! Error types for stakepool.
use thiserror::Error;

use crate::types::AccountId;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StakingError {
    #[error("invalid amount: {amount} is below the minimum of {minimum}")] InvalidAmount { amount: u128, minimum: u128 },
    #[error("insufficient balance: have {have}, need {need}")] InsufficientBalance { have: u128, need: u128 },
    #[error("insufficient stake: have {have}, need {need}")] InsufficientStake { have: u128, need: u128 },
    #[error("no stakers to receive distribution")] NoStakers,
    #[error("unauthorized caller: {0}")] Unauthorized(AccountId),
    #[error("staking opens at {start_time}, now {now}")] NotStarted { start_time: u64, now: u64 },
    #[error("stake handler already registered: {0}")] HandlerAlreadyRegistered(AccountId),
    #[error("stake handler not registered: {0}")] HandlerNotRegistered(AccountId),
    #[error("registered stake handler missing from call: {0}")] HandlerUnavailable(AccountId),
    #[error("invalid basis points: {0} > 10000")] InvalidBasisPoints(u64),
    #[error("arithmetic overflow")] ArithmeticOverflow,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RewardPoolError {
    #[error("account already registered: {0}")] AlreadyRegistered(AccountId),
    #[error("registration is disabled for this pool")] RegistrationDisabled,
    #[error("cycle {cycle} is not claimable during cycle {current}")] NotStarted { cycle: u64, current: u64 },
    #[error("cycle {cycle} already claimed by {account}")] AlreadyClaimed { cycle: u64, account: AccountId },
    #[error("unauthorized caller: {0}")] Unauthorized(AccountId),
    #[error("invalid basis points: {0} > 10000")] InvalidBasisPoints(u64),
    #[error("release interval must be nonzero")] InvalidInterval,
    #[error("reward pool not found: {0}")] PoolNotFound(AccountId),
    #[error("reward pool detached from the staking ledger after cycle {0}")] Detached(u64),
    #[error("arithmetic overflow")] ArithmeticOverflow,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("insufficient token balance: have {have}, need {need}")] InsufficientBalance { have: u128, need: u128 },
    #[error("token supply overflow")] SupplyOverflow,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AmountError {
    #[error("empty amount")] Empty,
    #[error("invalid digit in amount: {0}")] InvalidDigit(String),
    #[error("too many decimal places: {0} > 18")] TooPrecise(usize),
    #[error("amount overflow")] Overflow,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AccountIdError {
    #[error("invalid length: expected 64 hex characters, got {0}")] InvalidLength(usize),
    #[error("invalid hex")] InvalidHex,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StakePoolError {
    #[error(transparent)] Staking(#[from] StakingError),
    #[error(transparent)] RewardPool(#[from] RewardPoolError),
    #[error(transparent)] Token(#[from] TokenError),
}
