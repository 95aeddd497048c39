//! Serializable snapshot of engine state.

use serde::Serialize;

use stakepool_core::traits::{StakeView, TokenLedger};
use stakepool_core::types::AccountId;
use stakepool_rewards::CycleState;

use crate::engine::{Engine, EngineState};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AccountReport {
    pub account: AccountId,
    pub balance: u128,
    pub stake: u128,
    pub dividends: u128,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PoolReport {
    pub address: AccountId,
    pub cycle: CycleState,
    /// Whether the ledger still notifies this pool.
    pub active_handler: bool,
    pub registrants: usize,
    pub balance: u128,
    pub reserve_at_launch: Option<u128>,
    pub total_paid: u128,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EngineReport {
    pub now: u64,
    pub total_supply: u128,
    pub custody: u128,
    pub total_staked: u128,
    pub total_stakers: u64,
    pub total_distributed: u128,
    pub undistributed: u128,
    pub accounts: Vec<AccountReport>,
    pub pools: Vec<PoolReport>,
}

impl EngineReport {
    /// Snapshot `state` at time `now`. Accounts are every account the ledger
    /// has seen, sorted by id.
    pub fn collect<T: TokenLedger>(state: &EngineState<T>, now: u64) -> Self {
        let ledger = &state.ledger;
        let mut accounts: Vec<AccountReport> = ledger
            .entries()
            .map(|(account, entry)| AccountReport {
                account: *account,
                balance: state.token.balance_of(account),
                stake: entry.staked_amount,
                dividends: ledger.dividends_of(account),
            })
            .collect();
        accounts.sort_by_key(|a| a.account);

        let pools = state
            .pools
            .iter()
            .map(|p| PoolReport {
                address: p.address(),
                cycle: p.cycle_state(now),
                active_handler: ledger.stake_handlers().contains(&p.address()),
                registrants: p.registrant_count(),
                balance: state.token.balance_of(&p.address()),
                reserve_at_launch: p.reserve_at_launch(),
                total_paid: p.total_paid(),
            })
            .collect();

        Self {
            now,
            total_supply: state.token.total_supply(),
            custody: state.token.balance_of(&ledger.address()),
            total_staked: ledger.total_staked(),
            total_stakers: ledger.total_stakers(),
            total_distributed: ledger.total_distributed(),
            undistributed: ledger.undistributed(),
            accounts,
            pools,
        }
    }
}

impl<T: TokenLedger + Clone> Engine<T> {
    pub fn report(&self, now: u64) -> EngineReport {
        self.read(|s| EngineReport::collect(s, now))
    }
}
