//! Staking ledger configuration.

use serde::{Deserialize, Serialize};

use stakepool_core::constants::{DEFAULT_STAKING_TAX_BPS, DEFAULT_UNSTAKING_TAX_BPS};
use stakepool_core::error::StakingError;
use stakepool_core::tax::is_valid_bps;

/// Who shares the entry tax charged on a new stake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryTaxMode {
    /// Credited over the total staked before the new principal lands. The
    /// entrant receives nothing from its own tax.
    #[default]
    ExistingStakers,
    /// Credited over the total staked after the new principal lands. The
    /// entrant receives its pro-rata share of its own tax.
    AllStakers,
}

/// Tunable parameters of a [`StakingLedger`](crate::StakingLedger).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StakingConfig {
    /// Tax on `stake` and `reinvest`, in basis points.
    pub staking_tax_bps: u64,
    /// Tax on `unstake`, in basis points.
    pub unstaking_tax_bps: u64,
    /// Stake, unstake, and reinvest are refused before this Unix time.
    /// `None` opens staking immediately.
    pub start_time: Option<u64>,
    /// Distribution of the entry tax.
    pub entry_tax_mode: EntryTaxMode,
}

impl Default for StakingConfig {
    fn default() -> Self {
        Self {
            staking_tax_bps: DEFAULT_STAKING_TAX_BPS,
            unstaking_tax_bps: DEFAULT_UNSTAKING_TAX_BPS,
            start_time: None,
            entry_tax_mode: EntryTaxMode::default(),
        }
    }
}

impl StakingConfig {
    /// Reject rates above 100%.
    pub fn validate(&self) -> Result<(), StakingError> {
        for bps in [self.staking_tax_bps, self.unstaking_tax_bps] {
            if !is_valid_bps(bps) {
                return Err(StakingError::InvalidBasisPoints(bps));
            }
        }
        Ok(())
    }

    /// Whether staking is open at `now`.
    pub fn is_open(&self, now: u64) -> bool {
        self.start_time.is_none_or(|start| now >= start)
    }
}
