//! The staking ledger.
//!
//! [`StakingLedger`] owns per-account principal and dividend state. Token
//! movements go through a caller-supplied [`TokenLedger`]; stake changes are
//! fanned out to the registered [`StakeHandler`]s, which the caller passes in
//! as a slice and the ledger resolves by address in registration order.
//!
//! Every operation validates first, stages its updates on copies, performs
//! the token transfer and observer notifications, and only then commits. An
//! error therefore leaves the ledger untouched. Rolling back the token and the
//! observers is the caller's job (see `stakepool-engine`).

use std::collections::HashMap;

use serde::Serialize;
use tracing::{debug, info};

use stakepool_core::constants::MIN_STAKE;
use stakepool_core::error::{StakePoolError, StakingError};
use stakepool_core::math::{SignedU256, U256};
use stakepool_core::tax::{find_tax_amount, is_valid_bps};
use stakepool_core::traits::{StakeHandler, StakeView, TokenLedger};
use stakepool_core::types::{AccountId, CallContext};

use crate::config::{EntryTaxMode, StakingConfig};
use crate::dividend::{DividendAccumulator, StakeEntry};

/// Result of a successful `stake`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StakeReceipt {
    pub account: AccountId,
    /// Gross amount taken from the caller.
    pub amount: u128,
    /// Entry tax credited to stakers as a dividend.
    pub tax: u128,
    /// Principal credited to the caller (`amount - tax`).
    pub credited: u128,
    pub new_stake: u128,
}

/// Result of a successful `unstake`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct UnstakeReceipt {
    pub account: AccountId,
    /// Principal removed.
    pub amount: u128,
    /// Exit tax credited to the remaining stakers.
    pub tax: u128,
    /// Tokens paid to the caller (`amount - tax`).
    pub paid: u128,
    pub new_stake: u128,
}

/// Result of a successful `distribute`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DistributeReceipt {
    pub from: AccountId,
    pub amount: u128,
    pub total_staked: u128,
}

/// Result of a `withdraw` that paid something.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct WithdrawReceipt {
    pub account: AccountId,
    pub amount: u128,
}

/// Result of a `reinvest` that moved something.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ReinvestReceipt {
    pub account: AccountId,
    /// Dividends converted to principal.
    pub dividends: u128,
    pub tax: u128,
    pub credited: u128,
    pub new_stake: u128,
}

#[derive(Clone, Copy, Debug)]
enum StakeChange {
    Added,
    Removed,
}

/// Pooled staking ledger.
#[derive(Clone, Debug)]
pub struct StakingLedger {
    /// Custody account holding staked principal and unpaid dividends.
    address: AccountId,
    operator: AccountId,
    config: StakingConfig,
    stakes: HashMap<AccountId, StakeEntry>,
    total_staked: u128,
    total_stakers: u64,
    accumulator: DividendAccumulator,
    /// Registered observers, in notification order.
    handlers: Vec<AccountId>,
}

impl StakingLedger {
    /// Create an empty ledger custodied at `address` and administered by
    /// `operator`.
    ///
    /// # Errors
    ///
    /// - [`StakingError::InvalidBasisPoints`] if a tax rate exceeds 10,000 bps
    pub fn new(
        address: AccountId,
        operator: AccountId,
        config: StakingConfig,
    ) -> Result<Self, StakingError> {
        config.validate()?;
        Ok(Self {
            address,
            operator,
            config,
            stakes: HashMap::new(),
            total_staked: 0,
            total_stakers: 0,
            accumulator: DividendAccumulator::new(),
            handlers: Vec::new(),
        })
    }

    // ------------------------------------------------------------------
    // Staker operations
    // ------------------------------------------------------------------

    /// Deposit `amount` from the caller's token balance as principal.
    ///
    /// The entry tax is kept as a dividend (see [`EntryTaxMode`]) and the rest
    /// is credited to the caller.
    ///
    /// # Errors
    ///
    /// - [`StakingError::NotStarted`] before the configured start time
    /// - [`StakingError::InvalidAmount`] below one whole token
    /// - [`StakingError::InsufficientBalance`] if the caller holds less than `amount`
    /// - any error from the token transfer or a stake handler
    pub fn stake(
        &mut self,
        ctx: &CallContext,
        amount: u128,
        token: &mut dyn TokenLedger,
        handlers: &mut [&mut dyn StakeHandler],
    ) -> Result<StakeReceipt, StakePoolError> {
        self.ensure_open(ctx)?;
        if amount < MIN_STAKE {
            return Err(StakingError::InvalidAmount { amount, minimum: MIN_STAKE }.into());
        }
        let have = token.balance_of(&ctx.caller);
        if have < amount {
            return Err(StakingError::InsufficientBalance { have, need: amount }.into());
        }

        let tax = find_tax_amount(amount, self.config.staking_tax_bps);
        let credited = amount.checked_sub(tax).ok_or(StakingError::ArithmeticOverflow)?;

        let mut entry = self.entry(&ctx.caller);
        let mut accumulator = self.accumulator.clone();
        let was_staker = entry.staked_amount > 0;
        self.credit_principal(&mut accumulator, &mut entry, tax, credited)?;
        let total_staked = self
            .total_staked
            .checked_add(credited)
            .ok_or(StakingError::ArithmeticOverflow)?;

        token.transfer_from(&ctx.caller, &self.address, amount)?;
        self.notify(ctx, handlers, &ctx.caller, credited, entry.staked_amount, StakeChange::Added)?;

        let new_stake = entry.staked_amount;
        self.commit(ctx.caller, entry, was_staker, total_staked, accumulator);
        debug!(
            account = %ctx.caller.short(),
            amount,
            tax,
            credited,
            new_stake,
            total_staked,
            "staked"
        );
        Ok(StakeReceipt { account: ctx.caller, amount, tax, credited, new_stake })
    }

    /// Withdraw `amount` of principal, paying `amount - tax` to the caller.
    ///
    /// The exit tax is credited to whoever remains staked, including the
    /// caller's own remaining principal.
    ///
    /// # Errors
    ///
    /// - [`StakingError::NotStarted`] before the configured start time
    /// - [`StakingError::InvalidAmount`] below one whole token
    /// - [`StakingError::InsufficientStake`] if `amount` exceeds the caller's principal
    /// - any error from the token transfer or a stake handler
    pub fn unstake(
        &mut self,
        ctx: &CallContext,
        amount: u128,
        token: &mut dyn TokenLedger,
        handlers: &mut [&mut dyn StakeHandler],
    ) -> Result<UnstakeReceipt, StakePoolError> {
        self.ensure_open(ctx)?;
        if amount < MIN_STAKE {
            return Err(StakingError::InvalidAmount { amount, minimum: MIN_STAKE }.into());
        }
        let mut entry = self.entry(&ctx.caller);
        if amount > entry.staked_amount {
            return Err(StakingError::InsufficientStake {
                have: entry.staked_amount,
                need: amount,
            }
            .into());
        }

        let tax = find_tax_amount(amount, self.config.unstaking_tax_bps);
        let paid = amount.checked_sub(tax).ok_or(StakingError::ArithmeticOverflow)?;

        let mut accumulator = self.accumulator.clone();
        let was_staker = entry.staked_amount > 0;
        accumulator.remove_principal(&mut entry, amount)?;
        let total_staked = self
            .total_staked
            .checked_sub(amount)
            .ok_or(StakingError::ArithmeticOverflow)?;
        accumulator.credit(tax, total_staked)?;

        token.transfer_to(&self.address, &ctx.caller, paid)?;
        self.notify(ctx, handlers, &ctx.caller, amount, entry.staked_amount, StakeChange::Removed)?;

        let new_stake = entry.staked_amount;
        self.commit(ctx.caller, entry, was_staker, total_staked, accumulator);
        debug!(
            account = %ctx.caller.short(),
            amount,
            tax,
            paid,
            new_stake,
            total_staked,
            "unstaked"
        );
        Ok(UnstakeReceipt { account: ctx.caller, amount, tax, paid, new_stake })
    }

    /// Donate `amount` from the caller's balance to all current stakers,
    /// pro-rata to principal.
    ///
    /// # Errors
    ///
    /// - [`StakingError::InvalidAmount`] for zero
    /// - [`StakingError::InsufficientBalance`] if the caller holds less than `amount`
    /// - [`StakingError::NoStakers`] if nothing is staked
    pub fn distribute(
        &mut self,
        ctx: &CallContext,
        amount: u128,
        token: &mut dyn TokenLedger,
    ) -> Result<DistributeReceipt, StakePoolError> {
        if amount == 0 {
            return Err(StakingError::InvalidAmount { amount, minimum: 1 }.into());
        }
        let have = token.balance_of(&ctx.caller);
        if have < amount {
            return Err(StakingError::InsufficientBalance { have, need: amount }.into());
        }
        if self.total_staked == 0 {
            return Err(StakingError::NoStakers.into());
        }

        let mut accumulator = self.accumulator.clone();
        accumulator.credit(amount, self.total_staked)?;
        token.transfer_from(&ctx.caller, &self.address, amount)?;

        self.accumulator = accumulator;
        debug!(from = %ctx.caller.short(), amount, total_staked = self.total_staked, "distributed");
        Ok(DistributeReceipt { from: ctx.caller, amount, total_staked: self.total_staked })
    }

    /// Pay the caller all of its accrued dividends.
    ///
    /// Returns `Ok(None)` without touching anything when there is nothing to
    /// pay.
    pub fn withdraw(
        &mut self,
        ctx: &CallContext,
        token: &mut dyn TokenLedger,
    ) -> Result<Option<WithdrawReceipt>, StakePoolError> {
        let mut entry = self.entry(&ctx.caller);
        let amount = self.accumulator.dividends_of(&entry);
        if amount == 0 {
            return Ok(None);
        }

        self.accumulator.settle(&mut entry, amount)?;
        token.transfer_to(&self.address, &ctx.caller, amount)?;

        self.stakes.insert(ctx.caller, entry);
        debug!(account = %ctx.caller.short(), amount, "withdrew dividends");
        Ok(Some(WithdrawReceipt { account: ctx.caller, amount }))
    }

    /// Convert the caller's accrued dividends into principal.
    ///
    /// Same tax and bookkeeping as [`stake`](Self::stake), without moving
    /// tokens: the dividends are already in custody. Returns `Ok(None)` when
    /// there is nothing to reinvest.
    ///
    /// # Errors
    ///
    /// - [`StakingError::NotStarted`] before the configured start time
    /// - any error from a stake handler
    pub fn reinvest(
        &mut self,
        ctx: &CallContext,
        handlers: &mut [&mut dyn StakeHandler],
    ) -> Result<Option<ReinvestReceipt>, StakePoolError> {
        self.ensure_open(ctx)?;
        let mut entry = self.entry(&ctx.caller);
        let dividends = self.accumulator.dividends_of(&entry);
        if dividends == 0 {
            return Ok(None);
        }

        let tax = find_tax_amount(dividends, self.config.staking_tax_bps);
        let credited = dividends.checked_sub(tax).ok_or(StakingError::ArithmeticOverflow)?;

        let mut accumulator = self.accumulator.clone();
        let was_staker = entry.staked_amount > 0;
        accumulator.settle(&mut entry, dividends)?;
        self.credit_principal(&mut accumulator, &mut entry, tax, credited)?;
        let total_staked = self
            .total_staked
            .checked_add(credited)
            .ok_or(StakingError::ArithmeticOverflow)?;

        self.notify(ctx, handlers, &ctx.caller, credited, entry.staked_amount, StakeChange::Added)?;

        let new_stake = entry.staked_amount;
        self.commit(ctx.caller, entry, was_staker, total_staked, accumulator);
        debug!(account = %ctx.caller.short(), dividends, tax, credited, new_stake, "reinvested");
        Ok(Some(ReinvestReceipt { account: ctx.caller, dividends, tax, credited, new_stake }))
    }

    // ------------------------------------------------------------------
    // Operator operations
    // ------------------------------------------------------------------

    pub fn set_staking_tax_bps(&mut self, ctx: &CallContext, bps: u64) -> Result<(), StakingError> {
        self.ensure_operator(ctx)?;
        if !is_valid_bps(bps) {
            return Err(StakingError::InvalidBasisPoints(bps));
        }
        self.config.staking_tax_bps = bps;
        info!(bps, "staking tax updated");
        Ok(())
    }

    pub fn set_unstaking_tax_bps(&mut self, ctx: &CallContext, bps: u64) -> Result<(), StakingError> {
        self.ensure_operator(ctx)?;
        if !is_valid_bps(bps) {
            return Err(StakingError::InvalidBasisPoints(bps));
        }
        self.config.unstaking_tax_bps = bps;
        info!(bps, "unstaking tax updated");
        Ok(())
    }

    pub fn set_start_time(&mut self, ctx: &CallContext, start_time: Option<u64>) -> Result<(), StakingError> {
        self.ensure_operator(ctx)?;
        self.config.start_time = start_time;
        info!(?start_time, "staking start time updated");
        Ok(())
    }

    /// Append `handler` to the notification list.
    ///
    /// # Errors
    ///
    /// - [`StakingError::Unauthorized`] unless called by the operator
    /// - [`StakingError::HandlerAlreadyRegistered`] for a duplicate
    pub fn register_stake_handler(
        &mut self,
        ctx: &CallContext,
        handler: AccountId,
    ) -> Result<(), StakingError> {
        self.ensure_operator(ctx)?;
        if self.handlers.contains(&handler) {
            return Err(StakingError::HandlerAlreadyRegistered(handler));
        }
        self.handlers.push(handler);
        info!(handler = %handler.short(), count = self.handlers.len(), "stake handler registered");
        Ok(())
    }

    /// Remove `handler` from the notification list, preserving the order of
    /// the others.
    pub fn deregister_stake_handler(
        &mut self,
        ctx: &CallContext,
        handler: AccountId,
    ) -> Result<(), StakingError> {
        self.ensure_operator(ctx)?;
        let pos = self
            .handlers
            .iter()
            .position(|h| *h == handler)
            .ok_or(StakingError::HandlerNotRegistered(handler))?;
        self.handlers.remove(pos);
        info!(handler = %handler.short(), count = self.handlers.len(), "stake handler deregistered");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    pub fn address(&self) -> AccountId {
        self.address
    }

    pub fn operator(&self) -> AccountId {
        self.operator
    }

    pub fn config(&self) -> &StakingConfig {
        &self.config
    }

    /// Claimable dividends of `account`, floored.
    pub fn dividends_of(&self, account: &AccountId) -> u128 {
        self.stakes
            .get(account)
            .map_or(0, |entry| self.accumulator.dividends_of(entry))
    }

    pub fn total_stakers(&self) -> u64 {
        self.total_stakers
    }

    pub fn total_distributed(&self) -> u128 {
        self.accumulator.total_distributed()
    }

    pub fn undistributed(&self) -> u128 {
        self.accumulator.undistributed()
    }

    pub fn magnified_dividend_per_share(&self) -> U256 {
        self.accumulator.magnified_per_share()
    }

    pub fn dividend_correction(&self, account: &AccountId) -> SignedU256 {
        self.stakes
            .get(account)
            .map(|e| e.dividend_correction)
            .unwrap_or_default()
    }

    pub fn accumulator(&self) -> &DividendAccumulator {
        &self.accumulator
    }

    /// Registered observers in notification order.
    pub fn stake_handlers(&self) -> &[AccountId] {
        &self.handlers
    }

    /// Every account that has ever staked, with its entry.
    pub fn entries(&self) -> impl Iterator<Item = (&AccountId, &StakeEntry)> {
        self.stakes.iter()
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn entry(&self, account: &AccountId) -> StakeEntry {
        self.stakes.get(account).cloned().unwrap_or_default()
    }

    fn ensure_open(&self, ctx: &CallContext) -> Result<(), StakingError> {
        match self.config.start_time {
            Some(start_time) if !self.config.is_open(ctx.now) => {
                Err(StakingError::NotStarted { start_time, now: ctx.now })
            }
            _ => Ok(()),
        }
    }

    fn ensure_operator(&self, ctx: &CallContext) -> Result<(), StakingError> {
        if ctx.caller != self.operator {
            return Err(StakingError::Unauthorized(ctx.caller));
        }
        Ok(())
    }

    /// Credit `credited` principal to `entry` and the entry tax to stakers,
    /// ordered by the configured [`EntryTaxMode`].
    fn credit_principal(
        &self,
        accumulator: &mut DividendAccumulator,
        entry: &mut StakeEntry,
        tax: u128,
        credited: u128,
    ) -> Result<(), StakingError> {
        match self.config.entry_tax_mode {
            EntryTaxMode::ExistingStakers => {
                accumulator.credit(tax, self.total_staked)?;
                accumulator.add_principal(entry, credited)?;
            }
            EntryTaxMode::AllStakers => {
                accumulator.add_principal(entry, credited)?;
                let total_after = self
                    .total_staked
                    .checked_add(credited)
                    .ok_or(StakingError::ArithmeticOverflow)?;
                accumulator.credit(tax, total_after)?;
            }
        }
        Ok(())
    }

    /// Call every registered handler, in registration order, with the
    /// ledger as caller.
    fn notify(
        &self,
        ctx: &CallContext,
        handlers: &mut [&mut dyn StakeHandler],
        account: &AccountId,
        amount: u128,
        new_stake: u128,
        change: StakeChange,
    ) -> Result<(), StakePoolError> {
        let ledger_ctx = ctx.as_caller(self.address);
        for registered in &self.handlers {
            let handler = handlers
                .iter_mut()
                .find(|h| h.address() == *registered)
                .ok_or(StakingError::HandlerUnavailable(*registered))?;
            match change {
                StakeChange::Added => handler.handle_stake(&ledger_ctx, account, amount, new_stake)?,
                StakeChange::Removed => {
                    handler.handle_unstake(&ledger_ctx, account, amount, new_stake)?
                }
            }
        }
        Ok(())
    }

    fn commit(
        &mut self,
        account: AccountId,
        entry: StakeEntry,
        was_staker: bool,
        total_staked: u128,
        accumulator: DividendAccumulator,
    ) {
        let is_staker = entry.staked_amount > 0;
        match (was_staker, is_staker) {
            (false, true) => self.total_stakers += 1,
            (true, false) => self.total_stakers -= 1,
            _ => {}
        }
        self.stakes.insert(account, entry);
        self.total_staked = total_staked;
        self.accumulator = accumulator;
    }
}

impl StakeView for StakingLedger {
    fn stake_value(&self, account: &AccountId) -> u128 {
        self.stakes.get(account).map_or(0, |e| e.staked_amount)
    }

    fn total_staked(&self) -> u128 {
        self.total_staked
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stakepool_core::constants::TOKEN;
    use stakepool_core::error::RewardPoolError;
    use stakepool_core::token::MemoryTokenLedger;

    fn id(seed: u8) -> AccountId {
        AccountId([seed; 32])
    }

    const LEDGER: u8 = 0xEE;
    const OPERATOR: u8 = 0xAA;

    fn ctx(seed: u8) -> CallContext {
        CallContext::new(id(seed), 1_000)
    }

    fn setup(config: StakingConfig, funded: &[u8]) -> (StakingLedger, MemoryTokenLedger) {
        let ledger = StakingLedger::new(id(LEDGER), id(OPERATOR), config).unwrap();
        let mut token = MemoryTokenLedger::new();
        for seed in funded {
            token.mint(&id(*seed), 100 * TOKEN).unwrap();
        }
        (ledger, token)
    }

    fn default_setup() -> (StakingLedger, MemoryTokenLedger) {
        setup(StakingConfig::default(), &[1, 2, 3, 4, 5, 9])
    }

    fn tokens(whole: u128, tenths: u128) -> u128 {
        whole * TOKEN + tenths * TOKEN / 10
    }

    /// Observer that records every call and can be told to fail.
    struct RecordingHandler {
        address: AccountId,
        calls: Vec<(&'static str, AccountId, u128, u128)>,
        fail: bool,
    }

    impl RecordingHandler {
        fn new(seed: u8) -> Self {
            Self { address: id(seed), calls: Vec::new(), fail: false }
        }
    }

    impl StakeHandler for RecordingHandler {
        fn address(&self) -> AccountId {
            self.address
        }

        fn handle_stake(
            &mut self,
            ctx: &CallContext,
            account: &AccountId,
            amount: u128,
            new_stake: u128,
        ) -> Result<(), StakePoolError> {
            assert_eq!(ctx.caller, id(LEDGER));
            if self.fail {
                return Err(RewardPoolError::ArithmeticOverflow.into());
            }
            self.calls.push(("stake", *account, amount, new_stake));
            Ok(())
        }

        fn handle_unstake(
            &mut self,
            ctx: &CallContext,
            account: &AccountId,
            amount: u128,
            new_stake: u128,
        ) -> Result<(), StakePoolError> {
            assert_eq!(ctx.caller, id(LEDGER));
            if self.fail {
                return Err(RewardPoolError::ArithmeticOverflow.into());
            }
            self.calls.push(("unstake", *account, amount, new_stake));
            Ok(())
        }
    }

    // ------------------------------------------------------------------
    // stake
    // ------------------------------------------------------------------

    #[test]
    fn stake_rejects_below_one_token() {
        let (mut ledger, mut token) = default_setup();
        for amount in [0, 1, TOKEN - 1] {
            let err = ledger.stake(&ctx(1), amount, &mut token, &mut []).unwrap_err();
            assert_eq!(
                err,
                StakingError::InvalidAmount { amount, minimum: MIN_STAKE }.into()
            );
        }
        assert_eq!(ledger.total_staked(), 0);
    }

    #[test]
    fn stake_rejects_more_than_balance() {
        let (mut ledger, mut token) = default_setup();
        let err = ledger.stake(&ctx(1), 100 * TOKEN + 1, &mut token, &mut []).unwrap_err();
        assert_eq!(
            err,
            StakingError::InsufficientBalance { have: 100 * TOKEN, need: 100 * TOKEN + 1 }.into()
        );
    }

    #[test]
    fn stake_moves_tokens_and_credits_net() {
        let (mut ledger, mut token) = default_setup();
        let value = tokens(2, 1);
        let receipt = ledger.stake(&ctx(1), value, &mut token, &mut []).unwrap();
        assert_eq!(receipt.tax, 21_000_000_000_000_000);
        assert_eq!(receipt.credited, 2_079_000_000_000_000_000);
        assert_eq!(token.balance_of(&id(1)), 100 * TOKEN - value);
        assert_eq!(token.balance_of(&id(LEDGER)), value);
        assert_eq!(ledger.stake_value(&id(1)), receipt.credited);
        assert_eq!(ledger.total_staked(), receipt.credited);
        assert_eq!(ledger.total_stakers(), 1);
    }

    #[test]
    fn first_stake_tax_is_deferred_in_existing_stakers_mode() {
        let (mut ledger, mut token) = default_setup();
        let r = ledger.stake(&ctx(1), 10 * TOKEN, &mut token, &mut []).unwrap();
        assert_eq!(ledger.undistributed(), r.tax);
        assert_eq!(ledger.dividends_of(&id(1)), 0);
        // The next stake flushes the deferred tax to the first staker.
        ledger.stake(&ctx(2), 10 * TOKEN, &mut token, &mut []).unwrap();
        assert_eq!(ledger.undistributed(), 0);
        let got = ledger.dividends_of(&id(1));
        assert!(got <= 2 * r.tax && got + 1 >= 2 * r.tax, "got {got}");
        assert_eq!(ledger.dividends_of(&id(2)), 0);
    }

    #[test]
    fn entry_tax_goes_to_pre_existing_stakers_only() {
        let (mut ledger, mut token) = default_setup();
        ledger.stake(&ctx(1), 10 * TOKEN, &mut token, &mut []).unwrap();
        ledger.stake(&ctx(9), TOKEN, &mut token, &mut []).unwrap(); // flush deferred tax
        let before_1 = ledger.dividends_of(&id(1));
        let before_9 = ledger.dividends_of(&id(9));

        let r = ledger.stake(&ctx(2), tokens(2, 1), &mut token, &mut []).unwrap();
        assert_eq!(r.credited, 2_079_000_000_000_000_000);
        let gained = (ledger.dividends_of(&id(1)) - before_1) + (ledger.dividends_of(&id(9)) - before_9);
        assert!(gained <= r.tax && gained + 2 >= r.tax, "gained {gained}, tax {}", r.tax);
        assert_eq!(ledger.dividends_of(&id(2)), 0);
    }

    #[test]
    fn three_equal_stakers_each_get_a_third_of_entry_tax() {
        let cfg = StakingConfig { staking_tax_bps: 0, ..StakingConfig::default() };
        let (mut ledger, mut token) = setup(cfg, &[1, 2, 3, 4]);
        for s in [1, 2, 3] {
            ledger.stake(&ctx(s), 10 * TOKEN, &mut token, &mut []).unwrap();
        }
        ledger.set_staking_tax_bps(&ctx(OPERATOR), 100).unwrap();

        let r = ledger.stake(&ctx(4), 15 * TOKEN, &mut token, &mut []).unwrap();
        for s in [1, 2, 3] {
            let got = ledger.dividends_of(&id(s));
            assert!(got <= r.tax / 3 && got + 1 >= r.tax / 3, "staker {s}: {got}");
        }
        assert_eq!(ledger.dividends_of(&id(4)), 0);
    }

    #[test]
    fn all_stakers_mode_splits_entry_tax_with_entrant() {
        let cfg = StakingConfig { entry_tax_mode: EntryTaxMode::AllStakers, ..StakingConfig::default() };
        let (mut ledger, mut token) = setup(cfg, &[1, 2]);
        ledger.stake(&ctx(1), 10 * TOKEN, &mut token, &mut []).unwrap();
        // First staker holds everything, including its own entry tax.
        let before = ledger.dividends_of(&id(1));
        let total = ledger.total_staked();

        // Gross amount whose net equals the current total: doubles the pool.
        let value = total * 10_000 / (10_000 - 100);
        let r = ledger.stake(&ctx(2), value, &mut token, &mut []).unwrap();
        assert!(r.credited.abs_diff(total) <= 1);

        let first_gain = ledger.dividends_of(&id(1)) - before;
        let second = ledger.dividends_of(&id(2));
        assert!(first_gain.abs_diff(r.tax / 2) <= 1, "first gained {first_gain}");
        assert!(second.abs_diff(r.tax / 2) <= 1, "second got {second}");
    }

    #[test]
    fn all_stakers_mode_single_staker_owns_pool() {
        let cfg = StakingConfig { entry_tax_mode: EntryTaxMode::AllStakers, ..StakingConfig::default() };
        let (mut ledger, mut token) = setup(cfg, &[1]);
        ledger.stake(&ctx(1), tokens(2, 1), &mut token, &mut []).unwrap();
        let custody = token.balance_of(&id(LEDGER));
        let owned = ledger.stake_value(&id(1)) + ledger.dividends_of(&id(1));
        assert!(owned <= custody && owned + 1 >= custody);
    }

    #[test]
    fn late_joiner_gets_nothing_from_earlier_distribution() {
        let (mut ledger, mut token) = default_setup();
        ledger.stake(&ctx(1), 10 * TOKEN, &mut token, &mut []).unwrap();
        ledger.distribute(&ctx(9), 5 * TOKEN, &mut token).unwrap();
        ledger.stake(&ctx(2), 10 * TOKEN, &mut token, &mut []).unwrap();
        assert_eq!(ledger.dividends_of(&id(2)), 0);
    }

    #[test]
    fn stake_before_start_time_is_rejected() {
        let cfg = StakingConfig { start_time: Some(5_000), ..StakingConfig::default() };
        let (mut ledger, mut token) = setup(cfg, &[1]);
        let err = ledger.stake(&ctx(1), TOKEN, &mut token, &mut []).unwrap_err();
        assert_eq!(err, StakingError::NotStarted { start_time: 5_000, now: 1_000 }.into());
        let later = CallContext::new(id(1), 5_000);
        ledger.stake(&later, TOKEN, &mut token, &mut []).unwrap();
    }

    #[test]
    fn full_tax_credits_no_principal() {
        let cfg = StakingConfig { staking_tax_bps: 10_000, ..StakingConfig::default() };
        let (mut ledger, mut token) = setup(cfg, &[1]);
        let r = ledger.stake(&ctx(1), TOKEN, &mut token, &mut []).unwrap();
        assert_eq!(r.credited, 0);
        assert_eq!(ledger.total_stakers(), 0);
        assert_eq!(ledger.undistributed(), TOKEN);
    }

    // ------------------------------------------------------------------
    // unstake
    // ------------------------------------------------------------------

    #[test]
    fn unstake_rejects_below_one_token() {
        let (mut ledger, mut token) = default_setup();
        ledger.stake(&ctx(1), 10 * TOKEN, &mut token, &mut []).unwrap();
        for amount in [0, 1, MIN_STAKE - 1] {
            let err = ledger.unstake(&ctx(1), amount, &mut token, &mut []).unwrap_err();
            assert_eq!(err, StakingError::InvalidAmount { amount, minimum: MIN_STAKE }.into());
        }
    }

    #[test]
    fn unstake_rejects_more_than_staked() {
        let (mut ledger, mut token) = default_setup();
        let r = ledger.stake(&ctx(1), 10 * TOKEN, &mut token, &mut []).unwrap();
        let err = ledger.unstake(&ctx(1), r.credited + 1, &mut token, &mut []).unwrap_err();
        assert_eq!(
            err,
            StakingError::InsufficientStake { have: r.credited, need: r.credited + 1 }.into()
        );
    }

    #[test]
    fn unstake_pays_net_and_reduces_totals() {
        let (mut ledger, mut token) = default_setup();
        ledger.stake(&ctx(1), 10 * TOKEN, &mut token, &mut []).unwrap();
        ledger.stake(&ctx(2), 10 * TOKEN, &mut token, &mut []).unwrap();
        let total_before = ledger.total_staked();
        let balance_before = token.balance_of(&id(1));

        let r = ledger.unstake(&ctx(1), TOKEN, &mut token, &mut []).unwrap();
        assert_eq!(r.tax, TOKEN / 100);
        assert_eq!(token.balance_of(&id(1)), balance_before + TOKEN - TOKEN / 100);
        assert_eq!(ledger.total_staked(), total_before - TOKEN);
        assert_eq!(ledger.stake_value(&id(1)), r.new_stake);
    }

    #[test]
    fn unstake_all_decrements_stakers() {
        let (mut ledger, mut token) = default_setup();
        ledger.stake(&ctx(1), 10 * TOKEN, &mut token, &mut []).unwrap();
        ledger.stake(&ctx(2), 10 * TOKEN, &mut token, &mut []).unwrap();
        assert_eq!(ledger.total_stakers(), 2);
        let all = ledger.stake_value(&id(1));
        ledger.unstake(&ctx(1), all, &mut token, &mut []).unwrap();
        assert_eq!(ledger.total_stakers(), 1);
        assert_eq!(ledger.stake_value(&id(1)), 0);
        // Entry survives at zero.
        assert!(ledger.entries().any(|(a, e)| *a == id(1) && e.staked_amount == 0));
    }

    #[test]
    fn exit_tax_goes_to_remaining_stakers() {
        let (mut ledger, mut token) = default_setup();
        ledger.stake(&ctx(1), 10 * TOKEN, &mut token, &mut []).unwrap();
        ledger.stake(&ctx(2), 10 * TOKEN, &mut token, &mut []).unwrap();
        let before = ledger.dividends_of(&id(2));
        let shares = ledger.stake_value(&id(2));

        let r = ledger.unstake(&ctx(1), TOKEN, &mut token, &mut []).unwrap();
        let expected = r.tax * shares / ledger.total_staked();
        let gained = ledger.dividends_of(&id(2)) - before;
        assert!(gained.abs_diff(expected) <= 1, "gained {gained}, expected {expected}");
    }

    #[test]
    fn last_unstake_defers_exit_tax() {
        let (mut ledger, mut token) = default_setup();
        ledger.stake(&ctx(1), 10 * TOKEN, &mut token, &mut []).unwrap();
        let deferred = ledger.undistributed();
        let all = ledger.stake_value(&id(1));
        let r = ledger.unstake(&ctx(1), all, &mut token, &mut []).unwrap();
        assert_eq!(ledger.total_staked(), 0);
        assert_eq!(ledger.undistributed(), deferred + r.tax);
    }

    // ------------------------------------------------------------------
    // distribute
    // ------------------------------------------------------------------

    #[test]
    fn distribute_with_no_stakers_is_rejected() {
        let (mut ledger, mut token) = default_setup();
        let err = ledger.distribute(&ctx(9), TOKEN, &mut token).unwrap_err();
        assert_eq!(err, StakingError::NoStakers.into());
        assert_eq!(token.balance_of(&id(9)), 100 * TOKEN);
    }

    #[test]
    fn distribute_more_than_balance_is_rejected() {
        let (mut ledger, mut token) = default_setup();
        ledger.stake(&ctx(1), 10 * TOKEN, &mut token, &mut []).unwrap();
        let err = ledger.distribute(&ctx(9), 100 * TOKEN + 1, &mut token).unwrap_err();
        assert!(matches!(err, StakePoolError::Staking(StakingError::InsufficientBalance { .. })));
    }

    #[test]
    fn distribute_zero_is_invalid() {
        let (mut ledger, mut token) = default_setup();
        ledger.stake(&ctx(1), 10 * TOKEN, &mut token, &mut []).unwrap();
        let err = ledger.distribute(&ctx(9), 0, &mut token).unwrap_err();
        assert_eq!(err, StakingError::InvalidAmount { amount: 0, minimum: 1 }.into());
    }

    #[test]
    fn distribute_is_pro_rata() {
        let (mut ledger, mut token) = default_setup();
        ledger.stake(&ctx(1), TOKEN, &mut token, &mut []).unwrap();
        ledger.stake(&ctx(2), tokens(1, 5), &mut token, &mut []).unwrap();
        ledger.stake(&ctx(3), tokens(1, 2), &mut token, &mut []).unwrap();
        ledger.stake(&ctx(4), 9_814_231_423_000_000_000, &mut token, &mut []).unwrap();

        let before_total = ledger.total_distributed();
        let before = ledger.dividends_of(&id(4));
        let shares = ledger.stake_value(&id(4));
        ledger.distribute(&ctx(9), TOKEN, &mut token).unwrap();

        assert_eq!(ledger.total_distributed(), before_total + TOKEN);
        let expected = TOKEN * shares / ledger.total_staked();
        let gained = ledger.dividends_of(&id(4)) - before;
        assert!(gained.abs_diff(expected) <= 1, "gained {gained}, expected {expected}");
    }

    // ------------------------------------------------------------------
    // withdraw / reinvest
    // ------------------------------------------------------------------

    #[test]
    fn withdraw_pays_dividends_and_resets() {
        let (mut ledger, mut token) = default_setup();
        ledger.stake(&ctx(1), 10 * TOKEN, &mut token, &mut []).unwrap();
        ledger.distribute(&ctx(9), 2 * TOKEN, &mut token).unwrap();
        let owed = ledger.dividends_of(&id(1));
        let balance = token.balance_of(&id(1));

        let r = ledger.withdraw(&ctx(1), &mut token).unwrap().unwrap();
        assert_eq!(r.amount, owed);
        assert_eq!(token.balance_of(&id(1)), balance + owed);
        assert_eq!(ledger.dividends_of(&id(1)), 0);
    }

    #[test]
    fn withdraw_nothing_is_noop() {
        let (mut ledger, mut token) = default_setup();
        assert_eq!(ledger.withdraw(&ctx(1), &mut token).unwrap(), None);
        ledger.stake(&ctx(1), 10 * TOKEN, &mut token, &mut []).unwrap();
        assert_eq!(ledger.withdraw(&ctx(1), &mut token).unwrap(), None);
    }

    #[test]
    fn withdraw_after_full_unstake_still_pays() {
        let (mut ledger, mut token) = default_setup();
        ledger.stake(&ctx(1), 10 * TOKEN, &mut token, &mut []).unwrap();
        ledger.distribute(&ctx(9), 2 * TOKEN, &mut token).unwrap();
        let all = ledger.stake_value(&id(1));
        ledger.unstake(&ctx(1), all, &mut token, &mut []).unwrap();
        let owed = ledger.dividends_of(&id(1));
        assert!(owed > 0);
        let r = ledger.withdraw(&ctx(1), &mut token).unwrap().unwrap();
        assert_eq!(r.amount, owed);
    }

    #[test]
    fn reinvest_moves_dividends_into_principal() {
        let (mut ledger, mut token) = default_setup();
        ledger.stake(&ctx(1), 10 * TOKEN, &mut token, &mut []).unwrap();
        ledger.distribute(&ctx(9), 2 * TOKEN, &mut token).unwrap();
        let stake_before = ledger.stake_value(&id(1));
        let custody = token.balance_of(&id(LEDGER));

        let r = ledger.reinvest(&ctx(1), &mut []).unwrap().unwrap();
        assert_eq!(r.tax, find_tax_amount(r.dividends, 100));
        assert_eq!(ledger.stake_value(&id(1)), stake_before + r.credited);
        assert_eq!(token.balance_of(&id(LEDGER)), custody);
        // Sole staker: its own reinvest tax comes back as a dividend.
        assert!(ledger.dividends_of(&id(1)).abs_diff(r.tax) <= 1);
    }

    #[test]
    fn reinvest_nothing_is_noop() {
        let (mut ledger, mut token) = default_setup();
        ledger.stake(&ctx(1), 10 * TOKEN, &mut token, &mut []).unwrap();
        assert_eq!(ledger.reinvest(&ctx(1), &mut []).unwrap(), None);
    }

    // ------------------------------------------------------------------
    // handlers
    // ------------------------------------------------------------------

    #[test]
    fn handlers_notified_in_registration_order() {
        let (mut ledger, mut token) = default_setup();
        ledger.register_stake_handler(&ctx(OPERATOR), id(0x20)).unwrap();
        ledger.register_stake_handler(&ctx(OPERATOR), id(0x10)).unwrap();
        let mut a = RecordingHandler::new(0x10);
        let mut b = RecordingHandler::new(0x20);

        let r = {
            let mut hs: [&mut dyn StakeHandler; 2] = [&mut a, &mut b];
            ledger.stake(&ctx(1), 10 * TOKEN, &mut token, &mut hs).unwrap()
        };
        assert_eq!(a.calls, vec![("stake", id(1), r.credited, r.new_stake)]);
        assert_eq!(b.calls, vec![("stake", id(1), r.credited, r.new_stake)]);

        let u = {
            let mut hs: [&mut dyn StakeHandler; 2] = [&mut a, &mut b];
            ledger.unstake(&ctx(1), TOKEN, &mut token, &mut hs).unwrap()
        };
        assert_eq!(a.calls[1], ("unstake", id(1), TOKEN, u.new_stake));
        assert_eq!(ledger.stake_handlers(), &[id(0x20), id(0x10)]);
    }

    #[test]
    fn failing_handler_leaves_ledger_untouched() {
        let (mut ledger, mut token) = default_setup();
        ledger.register_stake_handler(&ctx(OPERATOR), id(0x10)).unwrap();
        let mut h = RecordingHandler::new(0x10);
        h.fail = true;
        let mut hs: [&mut dyn StakeHandler; 1] = [&mut h];
        assert!(ledger.stake(&ctx(1), 10 * TOKEN, &mut token, &mut hs).is_err());
        assert_eq!(ledger.total_staked(), 0);
        assert_eq!(ledger.stake_value(&id(1)), 0);
        assert_eq!(ledger.total_stakers(), 0);
    }

    #[test]
    fn missing_handler_is_an_error() {
        let (mut ledger, mut token) = default_setup();
        ledger.register_stake_handler(&ctx(OPERATOR), id(0x10)).unwrap();
        let err = ledger.stake(&ctx(1), 10 * TOKEN, &mut token, &mut []).unwrap_err();
        assert_eq!(err, StakingError::HandlerUnavailable(id(0x10)).into());
    }

    #[test]
    fn handler_registry_is_operator_only() {
        let (mut ledger, _) = default_setup();
        assert_eq!(
            ledger.register_stake_handler(&ctx(1), id(0x10)),
            Err(StakingError::Unauthorized(id(1)))
        );
        ledger.register_stake_handler(&ctx(OPERATOR), id(0x10)).unwrap();
        assert_eq!(
            ledger.register_stake_handler(&ctx(OPERATOR), id(0x10)),
            Err(StakingError::HandlerAlreadyRegistered(id(0x10)))
        );
        assert_eq!(
            ledger.deregister_stake_handler(&ctx(1), id(0x10)),
            Err(StakingError::Unauthorized(id(1)))
        );
        ledger.deregister_stake_handler(&ctx(OPERATOR), id(0x10)).unwrap();
        assert_eq!(
            ledger.deregister_stake_handler(&ctx(OPERATOR), id(0x10)),
            Err(StakingError::HandlerNotRegistered(id(0x10)))
        );
    }

    // ------------------------------------------------------------------
    // operator setters
    // ------------------------------------------------------------------

    #[test]
    fn tax_setters_validate_and_authorize() {
        let (mut ledger, _) = default_setup();
        assert_eq!(ledger.set_staking_tax_bps(&ctx(1), 50), Err(StakingError::Unauthorized(id(1))));
        assert_eq!(
            ledger.set_unstaking_tax_bps(&ctx(OPERATOR), 10_001),
            Err(StakingError::InvalidBasisPoints(10_001))
        );
        ledger.set_staking_tax_bps(&ctx(OPERATOR), 50).unwrap();
        ledger.set_unstaking_tax_bps(&ctx(OPERATOR), 0).unwrap();
        assert_eq!(ledger.config().staking_tax_bps, 50);
        assert_eq!(ledger.config().unstaking_tax_bps, 0);
    }

    #[test]
    fn new_rejects_invalid_config() {
        let cfg = StakingConfig { staking_tax_bps: 20_000, ..StakingConfig::default() };
        assert_eq!(
            StakingLedger::new(id(LEDGER), id(OPERATOR), cfg).unwrap_err(),
            StakingError::InvalidBasisPoints(20_000)
        );
    }
}
