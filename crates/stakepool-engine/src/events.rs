//! Journal of committed engine operations.
//!
//! One [`Event`] per successful state change, recorded only when the whole
//! operation commits. Rolled-back operations leave no trace.

use serde::Serialize;

use stakepool_core::types::AccountId;
use stakepool_ledger::{DistributeReceipt, ReinvestReceipt, StakeReceipt, UnstakeReceipt, WithdrawReceipt};
use stakepool_rewards::{ClaimReceipt, RegisterReceipt};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    Staked(StakeReceipt),
    Unstaked(UnstakeReceipt),
    Distributed(DistributeReceipt),
    Withdrawn(WithdrawReceipt),
    Reinvested(ReinvestReceipt),
    Registered {
        pool: AccountId,
        #[serde(flatten)]
        receipt: RegisterReceipt,
    },
    Claimed {
        pool: AccountId,
        #[serde(flatten)]
        receipt: ClaimReceipt,
    },
    HandlerRegistered { handler: AccountId },
    /// The pool stays claimable up to `last_cycle`.
    HandlerDeregistered { handler: AccountId, last_cycle: u64 },
    Minted { recipient: AccountId, amount: u128 },
    /// An operator setting changed on `component` (ledger or pool address).
    ConfigUpdated {
        component: AccountId,
        setting: String,
        value: String,
    },
}

impl Event {
    /// Short name, matching the serialized tag.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Staked(_) => "staked",
            Self::Unstaked(_) => "unstaked",
            Self::Distributed(_) => "distributed",
            Self::Withdrawn(_) => "withdrawn",
            Self::Reinvested(_) => "reinvested",
            Self::Registered { .. } => "registered",
            Self::Claimed { .. } => "claimed",
            Self::HandlerRegistered { .. } => "handler_registered",
            Self::HandlerDeregistered { .. } => "handler_deregistered",
            Self::Minted { .. } => "minted",
            Self::ConfigUpdated { .. } => "config_updated",
        }
    }
}

/// A journaled event with its sequence number and commit time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct JournalEntry {
    pub seq: u64,
    pub at: u64,
    #[serde(flatten)]
    pub event: Event,
}
