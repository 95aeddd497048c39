//! Shared test helpers for scenario and adversarial tests.

use stakepool_core::constants::TOKEN;
use stakepool_core::token::MemoryTokenLedger;
use stakepool_core::traits::{StakeView, TokenLedger};
use stakepool_core::types::{AccountId, CallContext};
use stakepool_engine::Engine;
use stakepool_ledger::StakingConfig;
use stakepool_rewards::RewardPoolConfig;

pub type TestEngine = Engine<MemoryTokenLedger>;

/// Start time of the default test pool.
pub const POOL_START: u64 = 1_000_000;

/// Length of one reward cycle in the default test pool.
pub const CYCLE: u64 = 7 * 24 * 60 * 60;

/// Reserve minted into the default test pool.
pub const POOL_RESERVE: u128 = 10_000 * TOKEN;

/// Identity derived from a label.
pub fn acct(label: &str) -> AccountId {
    AccountId::derive(label)
}

pub fn operator() -> AccountId {
    acct("operator")
}

pub fn ledger_address() -> AccountId {
    acct("staking-ledger")
}

pub fn pool_address() -> AccountId {
    acct("reward-pool")
}

/// Call context for `label` at time `now`.
pub fn ctx(label: &str, now: u64) -> CallContext {
    CallContext::new(acct(label), now)
}

pub fn op_ctx(now: u64) -> CallContext {
    CallContext::new(operator(), now)
}

/// `whole` tokens plus `thousandths` of a token: `tokens(2, 100)` is 2.1.
pub fn tokens(whole: u128, thousandths: u128) -> u128 {
    whole * TOKEN + thousandths * (TOKEN / 1_000)
}

/// Time at which cycle `n` (1-based) of the default pool begins.
pub fn cycle_start(n: u64) -> u64 {
    POOL_START + (n - 1) * CYCLE
}

/// Engine with `config`, `balance` minted to each of `stakers`, and one
/// reward pool starting at [`POOL_START`] holding [`POOL_RESERVE`].
pub fn engine_with(config: StakingConfig, stakers: &[&str], balance: u128) -> TestEngine {
    let engine = Engine::new(operator(), ledger_address(), config, MemoryTokenLedger::new())
        .expect("valid staking config");
    for who in stakers {
        engine.mint(&op_ctx(0), acct(who), balance).expect("mint");
    }
    let pool = RewardPoolConfig { start_time: Some(POOL_START), release_interval_secs: CYCLE, ..RewardPoolConfig::default() };
    engine
        .add_reward_pool(&op_ctx(0), pool_address(), pool, POOL_RESERVE)
        .expect("add pool");
    engine
}

/// [`engine_with`] using the default 1% / 1% staking configuration.
pub fn default_engine(stakers: &[&str], balance: u128) -> TestEngine {
    engine_with(StakingConfig::default(), stakers, balance)
}

pub fn balance(engine: &TestEngine, label: &str) -> u128 {
    engine.read(|s| s.token.balance_of(&acct(label)))
}

pub fn stake_of(engine: &TestEngine, label: &str) -> u128 {
    engine.read(|s| s.ledger.stake_value(&acct(label)))
}

pub fn dividends(engine: &TestEngine, label: &str) -> u128 {
    engine.read(|s| s.ledger.dividends_of(&acct(label)))
}

/// Assert `actual` is within `tolerance` base units of `expected`.
pub fn assert_close(actual: u128, expected: u128, tolerance: u128) {
    assert!(
        actual.abs_diff(expected) <= tolerance,
        "expected {expected} ± {tolerance}, got {actual}"
    );
}
