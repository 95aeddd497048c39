//! Per-cycle registered-stake records.
//!
//! Records are sparse: a cycle only has an entry once something was written
//! to it, and a read falls back to the latest earlier entry. Writing cycle
//! `c` also shifts every entry after `c`, so the carry-forward chain stays
//! consistent even if a later cycle was written first.

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;

use stakepool_core::error::RewardPoolError;
use stakepool_core::types::AccountId;

#[derive(Clone, Debug, Default)]
pub struct CycleHistory {
    totals: BTreeMap<u64, u128>,
    amounts: HashMap<AccountId, BTreeMap<u64, u128>>,
}

fn carried(records: &BTreeMap<u64, u128>, cycle: u64) -> u128 {
    records.range(..=cycle).next_back().map_or(0, |(_, v)| *v)
}

/// Apply `f` to the value at `cycle` and every later record. Staged so a
/// failure leaves `records` untouched.
fn shift(
    records: &mut BTreeMap<u64, u128>,
    cycle: u64,
    f: impl Fn(u128) -> Option<u128>,
) -> Result<(), RewardPoolError> {
    let mut staged = Vec::new();
    staged.push((cycle, f(carried(records, cycle)).ok_or(RewardPoolError::ArithmeticOverflow)?));
    for (k, v) in records.range((Bound::Excluded(cycle), Bound::Unbounded)) {
        staged.push((*k, f(*v).ok_or(RewardPoolError::ArithmeticOverflow)?));
    }
    records.extend(staged);
    Ok(())
}

impl CycleHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total registered stake recorded for `cycle`.
    pub fn total_at(&self, cycle: u64) -> u128 {
        carried(&self.totals, cycle)
    }

    /// Registered stake of `account` recorded for `cycle`.
    pub fn amount_at(&self, account: &AccountId, cycle: u64) -> u128 {
        self.amounts.get(account).map_or(0, |r| carried(r, cycle))
    }

    /// Add `delta` to `account` and to the total, from `cycle` onward.
    pub fn add(&mut self, cycle: u64, account: AccountId, delta: u128) -> Result<(), RewardPoolError> {
        self.apply(cycle, account, |v| v.checked_add(delta))
    }

    /// Subtract `delta` from `account` and from the total, from `cycle` onward.
    pub fn sub(&mut self, cycle: u64, account: AccountId, delta: u128) -> Result<(), RewardPoolError> {
        self.apply(cycle, account, |v| v.checked_sub(delta))
    }

    /// Cycles with an explicit total record, ascending.
    pub fn recorded_cycles(&self) -> impl Iterator<Item = u64> + '_ {
        self.totals.keys().copied()
    }

    fn apply(
        &mut self,
        cycle: u64,
        account: AccountId,
        f: impl Fn(u128) -> Option<u128> + Copy,
    ) -> Result<(), RewardPoolError> {
        let mut totals = self.totals.clone();
        shift(&mut totals, cycle, f)?;
        let records = self.amounts.entry(account).or_default();
        shift(records, cycle, f)?;
        self.totals = totals;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(seed: u8) -> AccountId {
        AccountId([seed; 32])
    }

    #[test]
    fn empty_reads_zero() {
        let h = CycleHistory::new();
        assert_eq!(h.total_at(5), 0);
        assert_eq!(h.amount_at(&id(1), 5), 0);
    }

    #[test]
    fn writes_carry_forward() {
        let mut h = CycleHistory::new();
        h.add(1, id(1), 100).unwrap();
        assert_eq!(h.amount_at(&id(1), 0), 0);
        assert_eq!(h.amount_at(&id(1), 1), 100);
        assert_eq!(h.amount_at(&id(1), 9), 100);
        assert_eq!(h.total_at(9), 100);
    }

    #[test]
    fn later_write_leaves_earlier_cycle_alone() {
        let mut h = CycleHistory::new();
        h.add(1, id(1), 100).unwrap();
        h.add(1, id(2), 50).unwrap();
        h.sub(3, id(1), 40).unwrap();
        assert_eq!(h.amount_at(&id(1), 2), 100);
        assert_eq!(h.amount_at(&id(1), 3), 60);
        assert_eq!(h.total_at(2), 150);
        assert_eq!(h.total_at(3), 110);
        assert_eq!(h.recorded_cycles().collect::<Vec<_>>(), vec![1, 3]);
    }

    #[test]
    fn earlier_write_propagates_to_later_records() {
        let mut h = CycleHistory::new();
        h.add(5, id(1), 100).unwrap();
        h.add(2, id(1), 10).unwrap();
        assert_eq!(h.amount_at(&id(1), 2), 10);
        assert_eq!(h.amount_at(&id(1), 5), 110);
        assert_eq!(h.total_at(5), 110);
    }

    #[test]
    fn underflow_is_rejected_without_change() {
        let mut h = CycleHistory::new();
        h.add(1, id(1), 10).unwrap();
        assert_eq!(h.sub(2, id(1), 11), Err(RewardPoolError::ArithmeticOverflow));
        assert_eq!(h.amount_at(&id(1), 2), 10);
        assert_eq!(h.total_at(2), 10);
        assert_eq!(h.recorded_cycles().collect::<Vec<_>>(), vec![1]);
    }
}
