//! Scripted replay against an engine.
//!
//! A script is a JSON document listing timestamped steps. Accounts and pools
//! are named by label or hex id; amounts are decimal token strings.
//!
//! ```json
//! {
//!   "steps": [
//!     { "at": 0, "op": "mint", "to": "alice", "amount": "100" },
//!     { "at": 0, "op": "stake", "account": "alice", "amount": "2.1" },
//!     { "at": 10, "op": "unstake", "account": "bob", "amount": "5", "expect_error": true }
//!   ]
//! }
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use stakepool_core::amount::parse_amount;
use stakepool_core::token::MemoryTokenLedger;
use stakepool_core::types::{AccountId, CallContext};
use stakepool_engine::config::resolve_identity;
use stakepool_engine::Engine;

#[derive(Debug, Clone, Deserialize)]
pub struct Script {
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Step {
    /// Unix time of the call.
    pub at: u64,
    #[serde(flatten)]
    pub action: Action,
    /// The step is expected to be rejected.
    #[serde(default)]
    pub expect_error: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Action {
    Mint { to: String, amount: String },
    Stake { account: String, amount: String },
    Unstake { account: String, amount: String },
    Distribute { from: String, amount: String },
    Withdraw { account: String },
    Reinvest { account: String },
    Register { account: String, pool: String },
    Claim { account: String, pool: String, cycle: u64 },
    SetStakingTax { bps: u64 },
    SetUnstakingTax { bps: u64 },
}

/// Result of one step.
#[derive(Debug, Clone, Serialize)]
pub struct StepOutcome {
    pub index: usize,
    pub at: u64,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Whether the outcome matched `expect_error`.
    pub as_expected: bool,
}

pub fn parse_script(json: &str) -> Result<Script> {
    serde_json::from_str(json).context("invalid script")
}

fn amount(s: &str) -> Result<u128> {
    parse_amount(s).with_context(|| format!("invalid amount {s:?}"))
}

fn caller(label: &str, at: u64) -> CallContext {
    CallContext::new(resolve_identity(label), at)
}

/// Apply one action. Script-level problems (bad amounts) are `Err`; engine
/// rejections are returned as `Ok(Err(message))`.
fn apply(
    engine: &Engine<MemoryTokenLedger>,
    operator: AccountId,
    step: &Step,
) -> Result<std::result::Result<(), String>> {
    let at = step.at;
    let op = CallContext::new(operator, at);
    let outcome = match &step.action {
        Action::Mint { to, amount: a } => engine.mint(&op, resolve_identity(to), amount(a)?),
        Action::Stake { account, amount: a } => engine.stake(&caller(account, at), amount(a)?).map(drop),
        Action::Unstake { account, amount: a } => engine.unstake(&caller(account, at), amount(a)?).map(drop),
        Action::Distribute { from, amount: a } => engine.distribute(&caller(from, at), amount(a)?).map(drop),
        Action::Withdraw { account } => engine.withdraw(&caller(account, at)).map(drop),
        Action::Reinvest { account } => engine.reinvest(&caller(account, at)).map(drop),
        Action::Register { account, pool } => engine
            .register(&caller(account, at), resolve_identity(pool))
            .map(drop),
        Action::Claim { account, pool, cycle } => engine
            .claim(&caller(account, at), resolve_identity(pool), *cycle)
            .map(drop),
        Action::SetStakingTax { bps } => engine.set_staking_tax_bps(&op, *bps),
        Action::SetUnstakingTax { bps } => engine.set_unstaking_tax_bps(&op, *bps),
    };
    Ok(outcome.map_err(|e| e.to_string()))
}

/// Replay every step in order.
pub fn run_script(
    engine: &Engine<MemoryTokenLedger>,
    operator: AccountId,
    script: &Script,
) -> Result<Vec<StepOutcome>> {
    let mut outcomes = Vec::with_capacity(script.steps.len());
    for (index, step) in script.steps.iter().enumerate() {
        let result = apply(engine, operator, step).with_context(|| format!("step {index}"))?;
        let ok = result.is_ok();
        let as_expected = ok != step.expect_error;
        if !as_expected {
            warn!(index, at = step.at, error = ?result.as_ref().err(), "unexpected step outcome");
        } else {
            debug!(index, at = step.at, ok, "step applied");
        }
        outcomes.push(StepOutcome {
            index,
            at: step.at,
            ok,
            error: result.err(),
            as_expected,
        });
    }
    Ok(outcomes)
}
