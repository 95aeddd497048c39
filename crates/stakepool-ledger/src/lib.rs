//! # stakepool-ledger: Staking ledger with pro-rata dividends.
//!
//! All calculations use integer arithmetic only.
//!
//! - **Scaled accumulator**: a single dividend-per-share value, magnified by
//!   [`MAGNITUDE`](stakepool_core::constants::MAGNITUDE), tracks every dividend
//!   ever credited.
//! - **Per-account correction**: a signed offset cancels the accumulator's
//!   history for principal added or removed later, so late joiners never
//!   collect past dividends and leavers keep what they earned.
//! - **Entry and exit taxes**: retained by the ledger and credited to stakers
//!   as an immediate dividend.
//! - **Observers**: registered [`StakeHandler`](stakepool_core::traits::StakeHandler)s
//!   are notified synchronously of every principal change.

pub mod config;
pub mod dividend;
pub mod invariants;
pub mod ledger;

pub use config::{EntryTaxMode, StakingConfig};
pub use dividend::{Credit, DividendAccumulator, StakeEntry};
pub use ledger::{
    DistributeReceipt, ReinvestReceipt, StakeReceipt, StakingLedger, UnstakeReceipt,
    WithdrawReceipt,
};
