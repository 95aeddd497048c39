//! # stakepool-core
//! Foundation types, traits, and integer arithmetic shared by the staking
//! ledger and the reward pools.

pub mod amount;
pub mod constants;
pub mod error;
pub mod math;
pub mod tax;
pub mod token;
pub mod traits;
pub mod types;
