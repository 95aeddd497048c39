//! # stakepool-engine: Atomic operations over the whole staking system.
//!
//! [`Engine`] owns the token ledger, the [`StakingLedger`](stakepool_ledger::StakingLedger)
//! and its [`RewardPool`](stakepool_rewards::RewardPool)s behind one mutex.
//! Each public operation runs against a staged copy and commits only on
//! success, so a failing observer or transfer never leaves partial state.

pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod report;

pub use config::{EngineConfig, PoolSpec};
pub use engine::{Engine, EngineState};
pub use error::EngineError;
pub use events::{Event, JournalEntry};
pub use report::{AccountReport, EngineReport, PoolReport};
