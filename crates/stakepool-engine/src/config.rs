//! Engine configuration.
//!
//! [`EngineConfig`] is read from an optional TOML file layered with
//! `STAKEPOOL__*` environment variables, e.g.
//! `STAKEPOOL__STAKING__STAKING_TAX_BPS=250`.
//!
//! Identities are given either as 64-character hex or as a label, which is
//! hashed into an [`AccountId`] (see [`AccountId::derive`]).

use std::path::Path;

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use stakepool_core::amount::parse_amount;
use stakepool_core::types::AccountId;
use stakepool_ledger::StakingConfig;
use stakepool_rewards::RewardPoolConfig;

use crate::error::EngineError;

/// Environment prefix for overrides.
pub const ENV_PREFIX: &str = "STAKEPOOL";

/// A reward pool created at engine start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolSpec {
    /// Hex id or label of the pool's custody account.
    pub address: String,
    /// Reserve minted into the pool, in whole tokens (decimal string).
    #[serde(default = "zero_reserve")]
    pub reserve: String,
    #[serde(default)]
    pub params: RewardPoolConfig,
}

fn zero_reserve() -> String {
    "0".to_string()
}

impl PoolSpec {
    pub fn account(&self) -> AccountId {
        resolve_identity(&self.address)
    }

    /// Reserve in base units.
    pub fn reserve_units(&self) -> Result<u128, EngineError> {
        parse_amount(&self.reserve).map_err(|source| EngineError::Reserve {
            label: self.address.clone(),
            source,
        })
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Hex id or label of the operator.
    pub operator: String,
    /// Hex id or label of the staking ledger's custody account.
    pub ledger: String,
    pub staking: StakingConfig,
    pub pools: Vec<PoolSpec>,
    /// Log filter used by binaries when `RUST_LOG` is unset.
    pub log_level: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            operator: "operator".to_string(),
            ledger: "staking-ledger".to_string(),
            staking: StakingConfig::default(),
            pools: Vec::new(),
            log_level: "info".to_string(),
        }
    }
}

impl EngineConfig {
    /// Load from `path` (if given) with environment overrides on top of the
    /// defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, EngineError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }
        let cfg: Self = builder
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?
            .try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Check every component's configuration and every reserve amount.
    pub fn validate(&self) -> Result<(), EngineError> {
        self.staking.validate()?;
        for pool in &self.pools {
            pool.params.validate()?;
            pool.reserve_units()?;
        }
        Ok(())
    }

    pub fn operator_id(&self) -> AccountId {
        resolve_identity(&self.operator)
    }

    pub fn ledger_id(&self) -> AccountId {
        resolve_identity(&self.ledger)
    }
}

/// Parse a hex id, or derive one from a label.
pub fn resolve_identity(s: &str) -> AccountId {
    s.parse().unwrap_or_else(|_| AccountId::derive(s))
}
