//! In-memory token ledger.
//!
//! [`MemoryTokenLedger`] implements [`TokenLedger`] over a `HashMap`. It has
//! no transfer tax and no persistence; it backs tests, benches, and the CLI
//! simulator.

use std::collections::HashMap;

use crate::error::TokenError;
use crate::traits::TokenLedger;
use crate::types::AccountId;

/// Balance-map token ledger.
#[derive(Clone, Debug, Default)]
pub struct MemoryTokenLedger {
    balances: HashMap<AccountId, u128>,
    total_supply: u128,
}

impl MemoryTokenLedger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    fn debit(&mut self, account: &AccountId, amount: u128) -> Result<(), TokenError> {
        let have = self.balance_of(account);
        if have < amount {
            return Err(TokenError::InsufficientBalance { have, need: amount });
        }
        self.balances.insert(*account, have - amount);
        Ok(())
    }

    fn credit(&mut self, account: &AccountId, amount: u128) -> Result<(), TokenError> {
        let entry = self.balances.entry(*account).or_insert(0);
        // Cannot exceed total_supply, which is itself checked on mint.
        *entry = entry.checked_add(amount).ok_or(TokenError::SupplyOverflow)?;
        Ok(())
    }

    fn transfer(&mut self, from: &AccountId, to: &AccountId, amount: u128) -> Result<(), TokenError> {
        if amount == 0 || from == to {
            // Still reject self-transfers the sender cannot cover.
            let have = self.balance_of(from);
            if have < amount {
                return Err(TokenError::InsufficientBalance { have, need: amount });
            }
            return Ok(());
        }
        self.debit(from, amount)?;
        self.credit(to, amount)
    }
}

impl TokenLedger for MemoryTokenLedger {
    fn transfer_from(
        &mut self,
        owner: &AccountId,
        custodian: &AccountId,
        amount: u128,
    ) -> Result<(), TokenError> {
        self.transfer(owner, custodian, amount)
    }

    fn transfer_to(
        &mut self,
        custodian: &AccountId,
        recipient: &AccountId,
        amount: u128,
    ) -> Result<(), TokenError> {
        self.transfer(custodian, recipient, amount)
    }

    fn balance_of(&self, account: &AccountId) -> u128 {
        self.balances.get(account).copied().unwrap_or(0)
    }

    fn mint(&mut self, recipient: &AccountId, amount: u128) -> Result<(), TokenError> {
        let supply = self
            .total_supply
            .checked_add(amount)
            .ok_or(TokenError::SupplyOverflow)?;
        self.credit(recipient, amount)?;
        self.total_supply = supply;
        Ok(())
    }

    fn total_supply(&self) -> u128 {
        self.total_supply
    }
}
