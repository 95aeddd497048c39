//! Scaled dividend accumulator with per-account corrections.
//!
//! The accumulator stores `magnified_per_share = Σ floor(credit * M / total_staked)`
//! over every dividend credit. An account's claim is
//!
//! ```text
//! dividends = floor((magnified_per_share * staked_amount + correction) / M)
//! ```
//!
//! Whenever principal changes, the correction absorbs `magnified_per_share *
//! delta` so the change carries no claim on dividends credited before it.
//! Paying dividends out subtracts `paid * M` from the correction.

use stakepool_core::error::StakingError;
use stakepool_core::math::{demagnify, magnify, SignedU256, U256};

/// Per-account stake state. Created on first stake and kept forever.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StakeEntry {
    /// Post-tax principal credited to the account.
    pub staked_amount: u128,
    /// Signed offset against the accumulator, in magnified units.
    pub dividend_correction: SignedU256,
}

/// Outcome of crediting a dividend to the accumulator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Credit {
    /// Nothing to credit.
    Empty,
    /// No stake outstanding; the amount waits in `undistributed`.
    Deferred { amount: u128 },
    /// `amount` (including any previously deferred value) was spread over
    /// `total_staked`.
    Applied { amount: u128, total_staked: u128 },
}

/// Global dividend state of the ledger.
#[derive(Clone, Debug, Default)]
pub struct DividendAccumulator {
    magnified_per_share: U256,
    undistributed: u128,
    total_distributed: u128,
    credits_applied: u64,
}

impl DividendAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current magnified dividend per unit of stake.
    pub fn magnified_per_share(&self) -> U256 {
        self.magnified_per_share
    }

    /// Dividends held back because nothing was staked when they arrived.
    pub fn undistributed(&self) -> u128 {
        self.undistributed
    }

    /// Lifetime dividends credited (distributions and taxes).
    pub fn total_distributed(&self) -> u128 {
        self.total_distributed
    }

    /// Number of credits spread over a nonzero stake. Each one can strand
    /// less than one base unit to truncation.
    pub fn credits_applied(&self) -> u64 {
        self.credits_applied
    }

    /// Credit `amount` of new dividends to everyone currently staked.
    ///
    /// With `total_staked == 0` the amount is deferred and folded into the
    /// next applied credit.
    pub fn credit(&mut self, amount: u128, total_staked: u128) -> Result<Credit, StakingError> {
        let total_distributed = self
            .total_distributed
            .checked_add(amount)
            .ok_or(StakingError::ArithmeticOverflow)?;
        let pooled = self
            .undistributed
            .checked_add(amount)
            .ok_or(StakingError::ArithmeticOverflow)?;

        if pooled == 0 {
            return Ok(Credit::Empty);
        }
        if total_staked == 0 {
            self.total_distributed = total_distributed;
            self.undistributed = pooled;
            return Ok(Credit::Deferred { amount });
        }

        let increment = magnify(pooled) / U256::from(total_staked);
        let per_share = self
            .magnified_per_share
            .checked_add(increment)
            .ok_or(StakingError::ArithmeticOverflow)?;

        self.magnified_per_share = per_share;
        self.total_distributed = total_distributed;
        self.undistributed = 0;
        self.credits_applied = self.credits_applied.saturating_add(1);
        Ok(Credit::Applied { amount: pooled, total_staked })
    }

    /// Claimable dividends of `entry`, floored. Never negative.
    pub fn dividends_of(&self, entry: &StakeEntry) -> u128 {
        self.magnified_dividends(entry).map_or(0, demagnify)
    }

    /// Unfloored claim of `entry` in magnified units.
    ///
    /// `None` only if the correction would drive the claim negative, which
    /// the update rules rule out.
    pub fn magnified_dividends(&self, entry: &StakeEntry) -> Option<U256> {
        let gross = self
            .magnified_per_share
            .saturating_mul(U256::from(entry.staked_amount));
        entry.dividend_correction.offset(gross)
    }

    /// Add `amount` of principal to `entry` without granting it any claim on
    /// dividends credited so far.
    pub fn add_principal(&self, entry: &mut StakeEntry, amount: u128) -> Result<(), StakingError> {
        let staked = entry
            .staked_amount
            .checked_add(amount)
            .ok_or(StakingError::ArithmeticOverflow)?;
        let correction = entry
            .dividend_correction
            .checked_sub_unsigned(self.history_of(amount)?)
            .ok_or(StakingError::ArithmeticOverflow)?;
        entry.staked_amount = staked;
        entry.dividend_correction = correction;
        Ok(())
    }

    /// Remove `amount` of principal from `entry`, keeping the dividends it
    /// already earned.
    pub fn remove_principal(&self, entry: &mut StakeEntry, amount: u128) -> Result<(), StakingError> {
        let staked = entry.staked_amount.checked_sub(amount).ok_or(
            StakingError::InsufficientStake { have: entry.staked_amount, need: amount },
        )?;
        let correction = entry
            .dividend_correction
            .checked_add_unsigned(self.history_of(amount)?)
            .ok_or(StakingError::ArithmeticOverflow)?;
        entry.staked_amount = staked;
        entry.dividend_correction = correction;
        Ok(())
    }

    /// Mark `amount` of `entry`'s dividends as paid.
    pub fn settle(&self, entry: &mut StakeEntry, amount: u128) -> Result<(), StakingError> {
        entry.dividend_correction = entry
            .dividend_correction
            .checked_sub_unsigned(magnify(amount))
            .ok_or(StakingError::ArithmeticOverflow)?;
        Ok(())
    }

    /// Accumulated magnified dividends of `amount` units staked since the
    /// beginning.
    fn history_of(&self, amount: u128) -> Result<U256, StakingError> {
        self.magnified_per_share
            .checked_mul(U256::from(amount))
            .ok_or(StakingError::ArithmeticOverflow)
    }
}
