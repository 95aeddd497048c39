//! # stakepool-rewards: Cycle-gated reward pool.
//!
//! A [`RewardPool`] releases a fixed fraction of its reserve every cycle to
//! registered stakers, pro-rata to the stake they held when the cycle began.
//!
//! - **Cycles**: derived from wall-clock time, see [`cycle`].
//! - **Snapshots**: stake changes land in the *next* cycle's record, see
//!   [`history`]. Past and current cycles are never rewritten.
//! - **Observers**: the pool implements
//!   [`StakeHandler`](stakepool_core::traits::StakeHandler) and is driven by
//!   the staking ledger it is bound to.

pub mod cycle;
pub mod history;
pub mod pool;

pub use cycle::{CycleSchedule, CycleState};
pub use history::CycleHistory;
pub use pool::{ClaimReceipt, RegisterReceipt, RegistrationPolicy, RewardPool, RewardPoolConfig};
