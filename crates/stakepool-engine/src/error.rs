//! Engine construction and configuration errors.
//!
//! Runtime operations return [`StakePoolError`]; this enum covers everything
//! that can go wrong before an engine exists.

use thiserror::Error;

use stakepool_core::error::{AmountError, RewardPoolError, StakePoolError, StakingError, TokenError};
use stakepool_core::types::AccountId;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("invalid reserve for pool {label}: {source}")]
    Reserve { label: String, source: AmountError },
    #[error("duplicate reward pool: {0}")]
    DuplicatePool(AccountId),
    #[error(transparent)]
    Operation(#[from] StakePoolError),
}

impl From<StakingError> for EngineError {
    fn from(e: StakingError) -> Self {
        Self::Operation(e.into())
    }
}

impl From<RewardPoolError> for EngineError {
    fn from(e: RewardPoolError) -> Self {
        Self::Operation(e.into())
    }
}

impl From<TokenError> for EngineError {
    fn from(e: TokenError) -> Self {
        Self::Operation(e.into())
    }
}
