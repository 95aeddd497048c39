//! The engine: one mutex, one staged copy per operation.

use parking_lot::Mutex;
use tracing::{info, warn};

use stakepool_core::error::{RewardPoolError, StakePoolError, StakingError};
use stakepool_core::traits::{StakeHandler, TokenLedger};
use stakepool_core::types::{AccountId, CallContext};
use stakepool_ledger::invariants::{check_solvency, InvariantViolation, SolvencyReport};
use stakepool_ledger::{
    DistributeReceipt, ReinvestReceipt, StakeReceipt, StakingConfig, StakingLedger, UnstakeReceipt,
    WithdrawReceipt,
};
use stakepool_rewards::{ClaimReceipt, RegisterReceipt, RegistrationPolicy, RewardPool, RewardPoolConfig};

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::events::{Event, JournalEntry};

/// Everything an operation may touch.
#[derive(Clone, Debug)]
pub struct EngineState<T> {
    pub token: T,
    pub ledger: StakingLedger,
    /// Every pool ever added, including ones no longer registered as
    /// handlers (their past cycles stay claimable).
    pub pools: Vec<RewardPool>,
}

impl<T: TokenLedger> EngineState<T> {
    pub fn pool(&self, address: &AccountId) -> Option<&RewardPool> {
        self.pools.iter().find(|p| p.address() == *address)
    }

    fn pool_mut(&mut self, address: &AccountId) -> Result<&mut RewardPool, RewardPoolError> {
        self.pools
            .iter_mut()
            .find(|p| p.address() == *address)
            .ok_or(RewardPoolError::PoolNotFound(*address))
    }

    /// Split into the token, the ledger, and every pool as a stake handler.
    fn split(&mut self) -> (&mut T, &mut StakingLedger, Vec<&mut dyn StakeHandler>) {
        let handlers = self
            .pools
            .iter_mut()
            .map(|p| p as &mut dyn StakeHandler)
            .collect();
        (&mut self.token, &mut self.ledger, handlers)
    }
}

struct Inner<T> {
    state: EngineState<T>,
    /// Committed events not yet drained. Grows until [`Engine::drain_events`].
    journal: Vec<JournalEntry>,
    next_seq: u64,
}

/// Serialized, all-or-nothing access to the staking system.
pub struct Engine<T> {
    inner: Mutex<Inner<T>>,
}

impl<T: TokenLedger + Clone> Engine<T> {
    /// Engine with an empty ledger and no pools.
    pub fn new(
        operator: AccountId,
        ledger_address: AccountId,
        staking: StakingConfig,
        token: T,
    ) -> Result<Self, StakingError> {
        let ledger = StakingLedger::new(ledger_address, operator, staking)?;
        Ok(Self {
            inner: Mutex::new(Inner {
                state: EngineState { token, ledger, pools: Vec::new() },
                journal: Vec::new(),
                next_seq: 0,
            }),
        })
    }

    /// Build an engine from configuration, creating and funding every
    /// configured pool at time `now`.
    pub fn from_config(config: &EngineConfig, token: T, now: u64) -> Result<Self, EngineError> {
        config.validate()?;
        let operator = config.operator_id();
        let engine = Self::new(operator, config.ledger_id(), config.staking.clone(), token)?;
        let ctx = CallContext::new(operator, now);
        for spec in &config.pools {
            let address = spec.account();
            if engine.read(|s| s.pool(&address).is_some()) {
                return Err(EngineError::DuplicatePool(address));
            }
            engine.add_reward_pool(&ctx, address, spec.params.clone(), spec.reserve_units()?)?;
        }
        info!(
            operator = %operator.short(),
            pools = config.pools.len(),
            "engine configured"
        );
        Ok(engine)
    }

    /// Run `op` against a staged copy of the state and commit it, together
    /// with the events it produced, only if it succeeds.
    fn transact<R>(
        &self,
        name: &'static str,
        ctx: &CallContext,
        op: impl FnOnce(&mut EngineState<T>, &mut Vec<Event>) -> Result<R, StakePoolError>,
    ) -> Result<R, StakePoolError> {
        let mut inner = self.inner.lock();
        let mut staged = inner.state.clone();
        let mut events = Vec::new();
        match op(&mut staged, &mut events) {
            Ok(out) => {
                inner.state = staged;
                for event in events {
                    let seq = inner.next_seq;
                    inner.next_seq += 1;
                    inner.journal.push(JournalEntry { seq, at: ctx.now, event });
                }
                Ok(out)
            }
            Err(e) => {
                warn!(op = name, caller = %ctx.caller.short(), error = %e, "operation rolled back");
                Err(e)
            }
        }
    }

    // ------------------------------------------------------------------
    // Staking
    // ------------------------------------------------------------------

    pub fn stake(&self, ctx: &CallContext, amount: u128) -> Result<StakeReceipt, StakePoolError> {
        self.transact("stake", ctx, |s, events| {
            let (token, ledger, mut handlers) = s.split();
            let r = ledger.stake(ctx, amount, token, &mut handlers)?;
            events.push(Event::Staked(r.clone()));
            Ok(r)
        })
    }

    pub fn unstake(&self, ctx: &CallContext, amount: u128) -> Result<UnstakeReceipt, StakePoolError> {
        self.transact("unstake", ctx, |s, events| {
            let (token, ledger, mut handlers) = s.split();
            let r = ledger.unstake(ctx, amount, token, &mut handlers)?;
            events.push(Event::Unstaked(r.clone()));
            Ok(r)
        })
    }

    pub fn distribute(&self, ctx: &CallContext, amount: u128) -> Result<DistributeReceipt, StakePoolError> {
        self.transact("distribute", ctx, |s, events| {
            let r = s.ledger.distribute(ctx, amount, &mut s.token)?;
            events.push(Event::Distributed(r.clone()));
            Ok(r)
        })
    }

    pub fn withdraw(&self, ctx: &CallContext) -> Result<Option<WithdrawReceipt>, StakePoolError> {
        self.transact("withdraw", ctx, |s, events| {
            let r = s.ledger.withdraw(ctx, &mut s.token)?;
            if let Some(r) = &r {
                events.push(Event::Withdrawn(r.clone()));
            }
            Ok(r)
        })
    }

    pub fn reinvest(&self, ctx: &CallContext) -> Result<Option<ReinvestReceipt>, StakePoolError> {
        self.transact("reinvest", ctx, |s, events| {
            let (_, ledger, mut handlers) = s.split();
            let r = ledger.reinvest(ctx, &mut handlers)?;
            if let Some(r) = &r {
                events.push(Event::Reinvested(r.clone()));
            }
            Ok(r)
        })
    }

    // ------------------------------------------------------------------
    // Rewards
    // ------------------------------------------------------------------

    pub fn register(&self, ctx: &CallContext, pool: AccountId) -> Result<RegisterReceipt, StakePoolError> {
        self.transact("register", ctx, |s, events| {
            let EngineState { token, ledger, pools } = s;
            let target = pools
                .iter_mut()
                .find(|p| p.address() == pool)
                .ok_or(RewardPoolError::PoolNotFound(pool))?;
            let r = target.register(ctx, &*ledger, &*token)?;
            events.push(Event::Registered { pool, receipt: r.clone() });
            Ok(r)
        })
    }

    pub fn claim(&self, ctx: &CallContext, pool: AccountId, cycle: u64) -> Result<ClaimReceipt, StakePoolError> {
        self.transact("claim", ctx, |s, events| {
            let EngineState { token, pools, .. } = s;
            let target = pools
                .iter_mut()
                .find(|p| p.address() == pool)
                .ok_or(RewardPoolError::PoolNotFound(pool))?;
            let r = target.claim(ctx, cycle, token)?;
            events.push(Event::Claimed { pool, receipt: r.clone() });
            Ok(r)
        })
    }

    // ------------------------------------------------------------------
    // Operator
    // ------------------------------------------------------------------

    /// Provision `amount` new tokens to `recipient`.
    pub fn mint(&self, ctx: &CallContext, recipient: AccountId, amount: u128) -> Result<(), StakePoolError> {
        self.transact("mint", ctx, |s, events| {
            if ctx.caller != s.ledger.operator() {
                return Err(StakingError::Unauthorized(ctx.caller).into());
            }
            s.token.mint(&recipient, amount)?;
            events.push(Event::Minted { recipient, amount });
            Ok(())
        })
    }

    /// Create a pool bound to the ledger, register it as a stake handler,
    /// and mint `reserve` into its custody.
    pub fn add_reward_pool(
        &self,
        ctx: &CallContext,
        address: AccountId,
        config: RewardPoolConfig,
        reserve: u128,
    ) -> Result<(), StakePoolError> {
        self.transact("add_reward_pool", ctx, |s, events| {
            if s.pool(&address).is_some() {
                return Err(StakingError::HandlerAlreadyRegistered(address).into());
            }
            s.ledger.register_stake_handler(ctx, address)?;
            let pool = RewardPool::new(address, s.ledger.operator(), s.ledger.address(), config)?;
            s.pools.push(pool);
            events.push(Event::HandlerRegistered { handler: address });
            if reserve > 0 {
                s.token.mint(&address, reserve)?;
                events.push(Event::Minted { recipient: address, amount: reserve });
            }
            info!(pool = %address.short(), reserve, "reward pool added");
            Ok(())
        })
    }

    /// Stop notifying `pool` of stake changes. The pool stays so cycles up
    /// to the current one can still be claimed; later cycles pay nothing.
    ///
    /// Returns the last payable cycle.
    pub fn remove_reward_pool_handler(&self, ctx: &CallContext, pool: AccountId) -> Result<u64, StakePoolError> {
        self.transact("remove_reward_pool_handler", ctx, |s, events| {
            s.ledger.deregister_stake_handler(ctx, pool)?;
            let last_cycle = s.pool_mut(&pool)?.detach(ctx)?;
            events.push(Event::HandlerDeregistered { handler: pool, last_cycle });
            Ok(last_cycle)
        })
    }

    pub fn set_staking_tax_bps(&self, ctx: &CallContext, bps: u64) -> Result<(), StakePoolError> {
        self.transact("set_staking_tax_bps", ctx, |s, events| {
            s.ledger.set_staking_tax_bps(ctx, bps)?;
            events.push(ledger_setting(&s.ledger, "staking_tax_bps", bps));
            Ok(())
        })
    }

    pub fn set_unstaking_tax_bps(&self, ctx: &CallContext, bps: u64) -> Result<(), StakePoolError> {
        self.transact("set_unstaking_tax_bps", ctx, |s, events| {
            s.ledger.set_unstaking_tax_bps(ctx, bps)?;
            events.push(ledger_setting(&s.ledger, "unstaking_tax_bps", bps));
            Ok(())
        })
    }

    pub fn set_staking_start_time(&self, ctx: &CallContext, start_time: Option<u64>) -> Result<(), StakePoolError> {
        self.transact("set_staking_start_time", ctx, |s, events| {
            s.ledger.set_start_time(ctx, start_time)?;
            events.push(ledger_setting(&s.ledger, "start_time", format!("{start_time:?}")));
            Ok(())
        })
    }

    pub fn set_pool_release_bps(&self, ctx: &CallContext, pool: AccountId, bps: u64) -> Result<(), StakePoolError> {
        self.transact("set_pool_release_bps", ctx, |s, events| {
            s.pool_mut(&pool)?.set_release_bps(ctx, bps)?;
            events.push(pool_setting(pool, "release_bps", bps));
            Ok(())
        })
    }

    pub fn set_pool_release_interval(&self, ctx: &CallContext, pool: AccountId, secs: u64) -> Result<(), StakePoolError> {
        self.transact("set_pool_release_interval", ctx, |s, events| {
            s.pool_mut(&pool)?.set_release_interval(ctx, secs)?;
            events.push(pool_setting(pool, "release_interval_secs", secs));
            Ok(())
        })
    }

    pub fn set_pool_start_time(
        &self,
        ctx: &CallContext,
        pool: AccountId,
        start_time: Option<u64>,
    ) -> Result<(), StakePoolError> {
        self.transact("set_pool_start_time", ctx, |s, events| {
            s.pool_mut(&pool)?.set_start_time(ctx, start_time)?;
            events.push(pool_setting(pool, "start_time", format!("{start_time:?}")));
            Ok(())
        })
    }

    pub fn set_pool_registration_policy(
        &self,
        ctx: &CallContext,
        pool: AccountId,
        policy: RegistrationPolicy,
    ) -> Result<(), StakePoolError> {
        self.transact("set_pool_registration_policy", ctx, |s, events| {
            s.pool_mut(&pool)?.set_registration_policy(ctx, policy)?;
            events.push(pool_setting(pool, "registration", format!("{policy:?}")));
            Ok(())
        })
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Run `f` against the committed state.
    pub fn read<R>(&self, f: impl FnOnce(&EngineState<T>) -> R) -> R {
        f(&self.inner.lock().state)
    }

    /// Copy of the undrained journal.
    pub fn events(&self) -> Vec<JournalEntry> {
        self.inner.lock().journal.clone()
    }

    /// Undrained journal entries with `seq >= from`.
    pub fn events_since(&self, from: u64) -> Vec<JournalEntry> {
        let inner = self.inner.lock();
        let start = inner.journal.partition_point(|e| e.seq < from);
        inner.journal[start..].to_vec()
    }

    /// Take every undrained entry, leaving the journal empty. Sequence
    /// numbers keep counting from where they were.
    pub fn drain_events(&self) -> Vec<JournalEntry> {
        std::mem::take(&mut self.inner.lock().journal)
    }

    /// Check ledger solvency against its custody balance.
    pub fn check_solvency(&self) -> Result<SolvencyReport, InvariantViolation> {
        self.read(|s| check_solvency(&s.ledger, s.token.balance_of(&s.ledger.address())))
    }
}

fn ledger_setting(ledger: &StakingLedger, setting: &str, value: impl ToString) -> Event {
    Event::ConfigUpdated {
        component: ledger.address(),
        setting: setting.to_string(),
        value: value.to_string(),
    }
}

fn pool_setting(pool: AccountId, setting: &str, value: impl ToString) -> Event {
    Event::ConfigUpdated { component: pool, setting: setting.to_string(), value: value.to_string() }
}
