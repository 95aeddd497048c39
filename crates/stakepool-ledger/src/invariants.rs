//! Solvency checks for a [`StakingLedger`].
//!
//! The custody account must always cover every outstanding obligation:
//! principal, claimable dividends, and dividends still waiting for a staker.
//! Flooring leaves a little dust behind, bounded by one base unit per
//! account plus one per applied credit.

use thiserror::Error;

use stakepool_core::traits::StakeView;

use crate::ledger::StakingLedger;

/// Broken ledger invariant.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvariantViolation {
    #[error("custody {custody} cannot cover liabilities {liabilities}")]
    Insolvent { custody: u128, liabilities: u128 },
    #[error("dust {slack} exceeds bound {bound}")]
    ExcessDust { slack: u128, bound: u128 },
    #[error("sum of stakes {sum} differs from total_staked {total}")]
    StakeSumMismatch { sum: u128, total: u128 },
    #[error("staker count {counted} differs from total_stakers {total}")]
    StakerCountMismatch { counted: u64, total: u64 },
}

/// Snapshot of the ledger's obligations against its custody balance.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SolvencyReport {
    pub custody: u128,
    pub staked: u128,
    pub dividends: u128,
    pub undistributed: u128,
    /// Accounts with a nonzero stake.
    pub stakers: u64,
    /// Accounts ever seen.
    pub accounts: u64,
}

impl SolvencyReport {
    /// Build a report for `ledger` given its current custody balance.
    pub fn collect(ledger: &StakingLedger, custody: u128) -> Self {
        let mut staked = 0u128;
        let mut dividends = 0u128;
        let mut stakers = 0u64;
        let mut accounts = 0u64;
        for (_, entry) in ledger.entries() {
            staked = staked.saturating_add(entry.staked_amount);
            dividends = dividends.saturating_add(ledger.accumulator().dividends_of(entry));
            if entry.staked_amount > 0 {
                stakers += 1;
            }
            accounts += 1;
        }
        Self {
            custody,
            staked,
            dividends,
            undistributed: ledger.undistributed(),
            stakers,
            accounts,
        }
    }

    pub fn liabilities(&self) -> u128 {
        self.staked
            .saturating_add(self.dividends)
            .saturating_add(self.undistributed)
    }

    /// Custody not owed to anyone.
    pub fn slack(&self) -> u128 {
        self.custody.saturating_sub(self.liabilities())
    }
}

/// Verify every ledger invariant against `custody`, the token balance of the
/// ledger's address.
pub fn check_solvency(ledger: &StakingLedger, custody: u128) -> Result<SolvencyReport, InvariantViolation> {
    let report = SolvencyReport::collect(ledger, custody);

    if report.staked != ledger.total_staked() {
        return Err(InvariantViolation::StakeSumMismatch {
            sum: report.staked,
            total: ledger.total_staked(),
        });
    }
    if report.stakers != ledger.total_stakers() {
        return Err(InvariantViolation::StakerCountMismatch {
            counted: report.stakers,
            total: ledger.total_stakers(),
        });
    }
    let liabilities = report.liabilities();
    if liabilities > custody {
        return Err(InvariantViolation::Insolvent { custody, liabilities });
    }
    let bound = u128::from(report.accounts) + u128::from(ledger.accumulator().credits_applied());
    if report.slack() > bound {
        return Err(InvariantViolation::ExcessDust { slack: report.slack(), bound });
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use stakepool_core::constants::TOKEN;
    use stakepool_core::token::MemoryTokenLedger;
    use stakepool_core::traits::TokenLedger;
    use stakepool_core::types::{AccountId, CallContext};

    use crate::config::{EntryTaxMode, StakingConfig};

    fn id(seed: u8) -> AccountId {
        AccountId([seed; 32])
    }

    fn fresh(mode: EntryTaxMode) -> (StakingLedger, MemoryTokenLedger) {
        let cfg = StakingConfig { entry_tax_mode: mode, ..StakingConfig::default() };
        let ledger = StakingLedger::new(id(0xEE), id(0xAA), cfg).unwrap();
        let mut token = MemoryTokenLedger::new();
        for s in 1..=4 {
            token.mint(&id(s), 1_000_000 * TOKEN).unwrap();
        }
        (ledger, token)
    }

    #[test]
    fn empty_ledger_is_solvent() {
        let (ledger, _) = fresh(EntryTaxMode::ExistingStakers);
        let report = check_solvency(&ledger, 0).unwrap();
        assert_eq!(report.liabilities(), 0);
    }

    #[test]
    fn detects_missing_custody() {
        let (mut ledger, mut token) = fresh(EntryTaxMode::ExistingStakers);
        ledger
            .stake(&CallContext::new(id(1), 0), 10 * TOKEN, &mut token, &mut [])
            .unwrap();
        let err = check_solvency(&ledger, 5 * TOKEN).unwrap_err();
        assert!(matches!(err, InvariantViolation::Insolvent { .. }));
    }

    #[test]
    fn detects_untracked_surplus() {
        let (mut ledger, mut token) = fresh(EntryTaxMode::ExistingStakers);
        ledger
            .stake(&CallContext::new(id(1), 0), 10 * TOKEN, &mut token, &mut [])
            .unwrap();
        let custody = token.balance_of(&id(0xEE)) + TOKEN;
        let err = check_solvency(&ledger, custody).unwrap_err();
        assert!(matches!(err, InvariantViolation::ExcessDust { .. }));
    }

    #[derive(Clone, Debug)]
    enum Op {
        Stake(u8, u128),
        Unstake(u8, u128),
        Distribute(u8, u128),
        Withdraw(u8),
        Reinvest(u8),
    }

    fn op() -> impl Strategy<Value = Op> {
        let who = 1u8..=4;
        prop_oneof![
            (who.clone(), TOKEN..1_000 * TOKEN).prop_map(|(a, v)| Op::Stake(a, v)),
            (who.clone(), TOKEN..1_000 * TOKEN).prop_map(|(a, v)| Op::Unstake(a, v)),
            (who.clone(), 1u128..100 * TOKEN).prop_map(|(a, v)| Op::Distribute(a, v)),
            who.clone().prop_map(Op::Withdraw),
            who.prop_map(Op::Reinvest),
        ]
    }

    fn run(mode: EntryTaxMode, ops: Vec<Op>) -> Result<(), TestCaseError> {
        let (mut ledger, mut token) = fresh(mode);
        for op in ops {
            // Rejected operations must leave state consistent too.
            let _ = match op {
                Op::Stake(a, v) => ledger
                    .stake(&CallContext::new(id(a), 0), v, &mut token, &mut [])
                    .map(|_| ()),
                Op::Unstake(a, v) => ledger
                    .unstake(&CallContext::new(id(a), 0), v, &mut token, &mut [])
                    .map(|_| ()),
                Op::Distribute(a, v) => ledger
                    .distribute(&CallContext::new(id(a), 0), v, &mut token)
                    .map(|_| ()),
                Op::Withdraw(a) => ledger
                    .withdraw(&CallContext::new(id(a), 0), &mut token)
                    .map(|_| ()),
                Op::Reinvest(a) => ledger
                    .reinvest(&CallContext::new(id(a), 0), &mut [])
                    .map(|_| ()),
            };
            let custody = token.balance_of(&id(0xEE));
            if let Err(e) = check_solvency(&ledger, custody) {
                return Err(TestCaseError::fail(e.to_string()));
            }
        }
        Ok(())
    }

    proptest! {
        #[test]
        fn solvent_under_any_sequence(ops in prop::collection::vec(op(), 1..60)) {
            run(EntryTaxMode::ExistingStakers, ops)?;
        }

        #[test]
        fn solvent_under_any_sequence_all_stakers(ops in prop::collection::vec(op(), 1..60)) {
            run(EntryTaxMode::AllStakers, ops)?;
        }
    }
}
