//! Trait interfaces between stakepool components.
//!
//! - [`TokenLedger`]: the fungible-balance collaborator (external; an
//!   in-memory implementation lives in [`crate::token`])
//! - [`StakeView`]: read-only stake queries (the staking ledger implements)
//! - [`StakeHandler`]: stake-change observers (reward pools implement)

use crate::error::{StakePoolError, TokenError};
use crate::types::{AccountId, CallContext};

/// Fungible-balance ledger consumed by the staking ledger and reward pools.
///
/// Custody accounts are ordinary accounts owned by a component (the staking
/// ledger's address, a reward pool's address). The token trusts its caller to
/// name the right owner; authorization happens in the calling component.
pub trait TokenLedger {
    /// Move `amount` from `owner` into `custodian`.
    ///
    /// # Errors
    ///
    /// - [`TokenError::InsufficientBalance`] if `owner` holds less than `amount`
    fn transfer_from(
        &mut self,
        owner: &AccountId,
        custodian: &AccountId,
        amount: u128,
    ) -> Result<(), TokenError>;

    /// Pay `amount` out of `custodian` to `recipient`.
    ///
    /// # Errors
    ///
    /// - [`TokenError::InsufficientBalance`] if the custody balance is short
    fn transfer_to(
        &mut self,
        custodian: &AccountId,
        recipient: &AccountId,
        amount: u128,
    ) -> Result<(), TokenError>;

    /// Current balance of `account`. Unknown accounts hold zero.
    fn balance_of(&self, account: &AccountId) -> u128;

    /// Create `amount` new tokens for `recipient`.
    ///
    /// Only used to provision balances (stakers, reward reserves); the core
    /// staking and reward operations never mint.
    fn mint(&mut self, recipient: &AccountId, amount: u128) -> Result<(), TokenError>;

    /// Total tokens in existence.
    fn total_supply(&self) -> u128;
}

/// Read-only view of staked principal.
pub trait StakeView {
    /// Post-tax principal currently staked by `account`.
    fn stake_value(&self, account: &AccountId) -> u128;

    /// Sum of all staked principal.
    fn total_staked(&self) -> u128;
}

/// Observer of stake changes, called synchronously from inside the staking
/// ledger's stake, unstake, and reinvest operations.
///
/// `ctx.caller` is the staking ledger's own address. An error aborts the
/// triggering operation.
pub trait StakeHandler {
    /// Identity under which this handler is registered with the ledger.
    fn address(&self) -> AccountId;

    /// `account` gained `amount` of principal; its stake is now `new_stake`.
    fn handle_stake(
        &mut self,
        ctx: &CallContext,
        account: &AccountId,
        amount: u128,
        new_stake: u128,
    ) -> Result<(), StakePoolError>;

    /// `account` removed `amount` of principal; its stake is now `new_stake`.
    fn handle_unstake(
        &mut self,
        ctx: &CallContext,
        account: &AccountId,
        amount: u128,
        new_stake: u128,
    ) -> Result<(), StakePoolError>;
}
