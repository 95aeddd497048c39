//! The reward pool.
//!
//! Registered stakers share `release_bps` of the pool's launch reserve each
//! cycle. Shares are taken from the registered-stake snapshot of the cycle
//! being claimed: stake changes during cycle `n` are recorded for `n + 1`.
//!
//! Rate changes follow the same rule and apply from the next cycle on. A pool
//! detached from the ledger during cycle `n` pays nothing for cycles after `n`,
//! since it no longer sees the stake changes those snapshots depend on.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use stakepool_core::constants::{BPS_PRECISION, DEFAULT_RELEASE_BPS, DEFAULT_RELEASE_INTERVAL_SECS};
use stakepool_core::error::{RewardPoolError, StakePoolError};
use stakepool_core::math::mul_div_floor;
use stakepool_core::tax::is_valid_bps;
use stakepool_core::traits::{StakeHandler, StakeView, TokenLedger};
use stakepool_core::types::{AccountId, CallContext};

use crate::cycle::{CycleSchedule, CycleState};
use crate::history::CycleHistory;

/// Whether new accounts may register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationPolicy {
    #[default]
    Open,
    Closed,
}

/// Tunable parameters of a [`RewardPool`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewardPoolConfig {
    /// Fraction of the launch reserve released per cycle, in basis points.
    pub release_bps: u64,
    /// Cycle length in seconds.
    pub release_interval_secs: u64,
    /// Unix time at which cycle 1 begins. `None` keeps the pool in cycle 0.
    pub start_time: Option<u64>,
    pub registration: RegistrationPolicy,
}

impl Default for RewardPoolConfig {
    fn default() -> Self {
        Self {
            release_bps: DEFAULT_RELEASE_BPS,
            release_interval_secs: DEFAULT_RELEASE_INTERVAL_SECS,
            start_time: None,
            registration: RegistrationPolicy::Open,
        }
    }
}

impl RewardPoolConfig {
    pub fn validate(&self) -> Result<(), RewardPoolError> {
        if !is_valid_bps(self.release_bps) {
            return Err(RewardPoolError::InvalidBasisPoints(self.release_bps));
        }
        if self.release_interval_secs == 0 {
            return Err(RewardPoolError::InvalidInterval);
        }
        Ok(())
    }

    pub fn schedule(&self) -> CycleSchedule {
        CycleSchedule::new(self.start_time, self.release_interval_secs)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RegisterReceipt {
    pub account: AccountId,
    /// Cycle whose snapshot first includes the account.
    pub cycle: u64,
    pub amount: u128,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ClaimReceipt {
    pub account: AccountId,
    pub cycle: u64,
    pub payout: u128,
}

/// Cycle-gated reward pool bound to one staking ledger.
#[derive(Clone, Debug)]
pub struct RewardPool {
    /// Custody account holding the reserve; also the handler identity.
    address: AccountId,
    operator: AccountId,
    /// The only caller allowed to drive stake callbacks.
    staking_ledger: AccountId,
    config: RewardPoolConfig,
    registered: HashSet<AccountId>,
    history: CycleHistory,
    claimed: HashSet<(u64, AccountId)>,
    reserve_at_launch: Option<u128>,
    total_paid: u128,
    /// `(first_cycle, bps)` in ascending order; the first entry starts at 1.
    release_rates: Vec<(u64, u64)>,
    /// Last cycle whose snapshot is complete, once the ledger stopped
    /// notifying this pool.
    detached_at: Option<u64>,
}

impl RewardPool {
    pub fn new(
        address: AccountId,
        operator: AccountId,
        staking_ledger: AccountId,
        config: RewardPoolConfig,
    ) -> Result<Self, RewardPoolError> {
        config.validate()?;
        let release_rates = vec![(1, config.release_bps)];
        Ok(Self {
            address,
            operator,
            staking_ledger,
            config,
            registered: HashSet::new(),
            history: CycleHistory::new(),
            claimed: HashSet::new(),
            reserve_at_launch: None,
            total_paid: 0,
            release_rates,
            detached_at: None,
        })
    }

    // --- Staker operations ---

    /// Opt the caller in. Its current stake counts from the next cycle on.
    ///
    /// # Errors
    ///
    /// - [`RewardPoolError::RegistrationDisabled`] under a closed policy
    /// - [`RewardPoolError::AlreadyRegistered`] on a second call
    /// - [`RewardPoolError::Detached`] once the ledger no longer notifies the pool
    pub fn register(
        &mut self,
        ctx: &CallContext,
        stakes: &dyn StakeView,
        token: &dyn TokenLedger,
    ) -> Result<RegisterReceipt, RewardPoolError> {
        if let Some(cycle) = self.detached_at {
            return Err(RewardPoolError::Detached(cycle));
        }
        if self.config.registration == RegistrationPolicy::Closed {
            return Err(RewardPoolError::RegistrationDisabled);
        }
        if self.registered.contains(&ctx.caller) {
            return Err(RewardPoolError::AlreadyRegistered(ctx.caller));
        }

        let cycle = self.next_cycle(ctx.now)?;
        let amount = stakes.stake_value(&ctx.caller);
        self.history.add(cycle, ctx.caller, amount)?;
        self.registered.insert(ctx.caller);
        self.snapshot_reserve(ctx.now, token);

        info!(
            account = %ctx.caller.short(),
            cycle,
            amount,
            registrants = self.registered.len(),
            "registered for rewards"
        );
        Ok(RegisterReceipt { account: ctx.caller, cycle, amount })
    }

    /// Pay the caller its share of a finished cycle.
    ///
    /// A zero payout still counts as the claim.
    ///
    /// # Errors
    ///
    /// - [`RewardPoolError::NotStarted`] during cycle 0, or for the current
    ///   or a future cycle
    /// - [`RewardPoolError::AlreadyClaimed`] on a repeat claim
    pub fn claim(
        &mut self,
        ctx: &CallContext,
        cycle: u64,
        token: &mut dyn TokenLedger,
    ) -> Result<ClaimReceipt, StakePoolError> {
        let current = self.current_cycle(ctx.now);
        if current == 0 || cycle >= current {
            return Err(RewardPoolError::NotStarted { cycle, current }.into());
        }
        if self.claimed.contains(&(cycle, ctx.caller)) {
            return Err(RewardPoolError::AlreadyClaimed { cycle, account: ctx.caller }.into());
        }

        self.snapshot_reserve(ctx.now, &*token);
        let payout = self.calculate_payout(&ctx.caller, cycle, &*token);
        let total_paid = self
            .total_paid
            .checked_add(payout)
            .ok_or(RewardPoolError::ArithmeticOverflow)?;
        if payout > 0 {
            token.transfer_to(&self.address, &ctx.caller, payout)?;
        }

        self.claimed.insert((cycle, ctx.caller));
        self.total_paid = total_paid;
        debug!(account = %ctx.caller.short(), cycle, payout, "reward claimed");
        Ok(ClaimReceipt { account: ctx.caller, cycle, payout })
    }

    /// Payout `account` is owed for `cycle`, whether or not it was claimed.
    ///
    /// Zero for cycle 0, a cycle after the pool was detached, a cycle the
    /// account had no registered stake in, or a cycle with nothing registered.
    pub fn calculate_payout(&self, account: &AccountId, cycle: u64, token: &dyn TokenLedger) -> u128 {
        if cycle == 0 || self.detached_at.is_some_and(|last| cycle > last) {
            return 0;
        }
        let amount = self.history.amount_at(account, cycle);
        let total = self.history.total_at(cycle);
        if amount == 0 || total == 0 {
            return 0;
        }
        let release = self.release_for(cycle, self.reserve(token));
        mul_div_floor(release, amount, total).unwrap_or(0)
    }

    /// Tokens released to all registrants in `cycle`.
    ///
    /// `reserve * bps / 10000` at the rate in force for `cycle`, capped by
    /// what earlier cycles left unscheduled.
    pub fn release_for(&self, cycle: u64, reserve: u128) -> u128 {
        if cycle == 0 {
            return 0;
        }
        let share = |bps: u64| {
            mul_div_floor(reserve, u128::from(bps), u128::from(BPS_PRECISION)).unwrap_or(0)
        };

        let mut scheduled: u128 = 0;
        let mut base = 0;
        for (i, &(first, bps)) in self.release_rates.iter().enumerate() {
            if first > cycle {
                break;
            }
            base = share(bps);
            let end = self
                .release_rates
                .get(i + 1)
                .map_or(cycle, |&(next, _)| next.min(cycle));
            scheduled = scheduled.saturating_add(base.saturating_mul(u128::from(end - first)));
        }
        base.min(reserve.saturating_sub(scheduled))
    }

    /// Release rate in force for `cycle`.
    pub fn release_bps_for(&self, cycle: u64) -> u64 {
        self.release_rates
            .iter()
            .rev()
            .find(|&&(first, _)| first <= cycle)
            .map_or(self.config.release_bps, |&(_, bps)| bps)
    }

    // --- Operator operations ---

    /// Change the release rate from the next cycle on. Cycles already
    /// current or finished keep the rate they started with.
    pub fn set_release_bps(&mut self, ctx: &CallContext, bps: u64) -> Result<(), RewardPoolError> {
        self.ensure_operator(ctx)?;
        if !is_valid_bps(bps) {
            return Err(RewardPoolError::InvalidBasisPoints(bps));
        }
        let from = self.next_cycle(ctx.now)?;
        self.release_rates.retain(|&(first, _)| first < from);
        self.release_rates.push((from, bps));
        self.config.release_bps = bps;
        info!(pool = %self.address.short(), bps, from_cycle = from, "release rate updated");
        Ok(())
    }

    pub fn set_release_interval(&mut self, ctx: &CallContext, secs: u64) -> Result<(), RewardPoolError> {
        self.ensure_operator(ctx)?;
        if secs == 0 {
            return Err(RewardPoolError::InvalidInterval);
        }
        self.config.release_interval_secs = secs;
        info!(pool = %self.address.short(), secs, "release interval updated");
        Ok(())
    }

    pub fn set_start_time(&mut self, ctx: &CallContext, start_time: Option<u64>) -> Result<(), RewardPoolError> {
        self.ensure_operator(ctx)?;
        self.config.start_time = start_time;
        info!(pool = %self.address.short(), ?start_time, "release start updated");
        Ok(())
    }

    /// Record that the ledger stopped notifying this pool. Snapshots up to
    /// the current cycle stay payable; later cycles pay nothing.
    ///
    /// Returns the last payable cycle. Detaching twice keeps the first one.
    pub fn detach(&mut self, ctx: &CallContext) -> Result<u64, RewardPoolError> {
        self.ensure_operator(ctx)?;
        let current = self.current_cycle(ctx.now);
        let last = *self.detached_at.get_or_insert(current);
        info!(pool = %self.address.short(), last_cycle = last, "reward pool detached");
        Ok(last)
    }

    pub fn set_registration_policy(
        &mut self,
        ctx: &CallContext,
        policy: RegistrationPolicy,
    ) -> Result<(), RewardPoolError> {
        self.ensure_operator(ctx)?;
        self.config.registration = policy;
        info!(pool = %self.address.short(), ?policy, "registration policy updated");
        Ok(())
    }

    // --- Reads ---

    pub fn address(&self) -> AccountId {
        self.address
    }

    pub fn operator(&self) -> AccountId {
        self.operator
    }

    pub fn staking_ledger(&self) -> AccountId {
        self.staking_ledger
    }

    pub fn config(&self) -> &RewardPoolConfig {
        &self.config
    }

    pub fn cycle_state(&self, now: u64) -> CycleState {
        self.config.schedule().state_at(now)
    }

    /// Current cycle index; 0 before the pool starts.
    pub fn current_cycle(&self, now: u64) -> u64 {
        self.cycle_state(now).index()
    }

    pub fn is_registered(&self, account: &AccountId) -> bool {
        self.registered.contains(account)
    }

    pub fn registrant_count(&self) -> usize {
        self.registered.len()
    }

    pub fn cycle_total_registered(&self, cycle: u64) -> u128 {
        self.history.total_at(cycle)
    }

    pub fn cycle_registrant_amount(&self, cycle: u64, account: &AccountId) -> u128 {
        self.history.amount_at(account, cycle)
    }

    pub fn has_claimed(&self, cycle: u64, account: &AccountId) -> bool {
        self.claimed.contains(&(cycle, *account))
    }

    /// Reserve fixed when the pool was first used in an active cycle.
    pub fn reserve_at_launch(&self) -> Option<u128> {
        self.reserve_at_launch
    }

    /// Reserve payouts are computed against: the launch snapshot, or the live
    /// balance before launch.
    pub fn reserve(&self, token: &dyn TokenLedger) -> u128 {
        self.reserve_at_launch
            .unwrap_or_else(|| token.balance_of(&self.address))
    }

    pub fn total_paid(&self) -> u128 {
        self.total_paid
    }

    /// Last payable cycle, if the pool was detached.
    pub fn detached_at(&self) -> Option<u64> {
        self.detached_at
    }

    // --- Internals ---

    fn ensure_operator(&self, ctx: &CallContext) -> Result<(), RewardPoolError> {
        if ctx.caller != self.operator {
            return Err(RewardPoolError::Unauthorized(ctx.caller));
        }
        Ok(())
    }

    fn ensure_staking_ledger(&self, ctx: &CallContext) -> Result<(), RewardPoolError> {
        if ctx.caller != self.staking_ledger {
            return Err(RewardPoolError::Unauthorized(ctx.caller));
        }
        Ok(())
    }

    /// Cycle receiving snapshot writes at `now`.
    fn next_cycle(&self, now: u64) -> Result<u64, RewardPoolError> {
        self.current_cycle(now)
            .checked_add(1)
            .ok_or(RewardPoolError::ArithmeticOverflow)
    }

    fn snapshot_reserve(&mut self, now: u64, token: &dyn TokenLedger) {
        if self.reserve_at_launch.is_some() || !self.cycle_state(now).is_active() {
            return;
        }
        let reserve = token.balance_of(&self.address);
        self.reserve_at_launch = Some(reserve);
        info!(pool = %self.address.short(), reserve, "reward reserve fixed at launch");
    }
}

impl StakeHandler for RewardPool {
    fn address(&self) -> AccountId {
        self.address
    }

    fn handle_stake(
        &mut self,
        ctx: &CallContext,
        account: &AccountId,
        amount: u128,
        _new_stake: u128,
    ) -> Result<(), StakePoolError> {
        self.ensure_staking_ledger(ctx)?;
        if !self.registered.contains(account) {
            return Ok(());
        }
        let cycle = self.next_cycle(ctx.now)?;
        self.history.add(cycle, *account, amount)?;
        debug!(account = %account.short(), cycle, amount, "registered stake increased");
        Ok(())
    }

    fn handle_unstake(
        &mut self,
        ctx: &CallContext,
        account: &AccountId,
        amount: u128,
        _new_stake: u128,
    ) -> Result<(), StakePoolError> {
        self.ensure_staking_ledger(ctx)?;
        if !self.registered.contains(account) {
            return Ok(());
        }
        let cycle = self.next_cycle(ctx.now)?;
        self.history.sub(cycle, *account, amount)?;
        debug!(account = %account.short(), cycle, amount, "registered stake decreased");
        Ok(())
    }
}
