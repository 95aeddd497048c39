//! Account identities and the per-call authorization context.
//!
//! Every state-changing operation receives a [`CallContext`] naming the caller
//! and the current time. Role checks compare `ctx.caller` against the identity
//! a component was configured with; there is no ambient "sender".

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::AccountIdError;

/// A 32-byte account identity.
///
/// Used for stakers, the operator, and the custody accounts of the staking
/// ledger and each reward pool. Serializes as a 64-character hex string.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AccountId(pub [u8; 32]);

impl AccountId {
    /// Deterministically derive an identity from a human-readable label.
    ///
    /// The label is hashed with BLAKE3, so `derive("alice")` is stable across
    /// runs and processes.
    ///
    /// # Examples
    ///
    /// ```
    /// use stakepool_core::types::AccountId;
    /// assert_eq!(AccountId::derive("alice"), AccountId::derive("alice"));
    /// assert_ne!(AccountId::derive("alice"), AccountId::derive("bob"));
    /// ```
    pub fn derive(label: &str) -> Self {
        Self(*blake3::hash(label.as_bytes()).as_bytes())
    }

    /// First four bytes as hex, for compact log output.
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl FromStr for AccountId {
    type Err = AccountIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 64 {
            return Err(AccountIdError::InvalidLength(s.len()));
        }
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s, &mut bytes).map_err(|_| AccountIdError::InvalidHex)?;
        Ok(Self(bytes))
    }
}

impl TryFrom<String> for AccountId {
    type Error = AccountIdError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<AccountId> for String {
    fn from(id: AccountId) -> Self {
        id.to_string()
    }
}

/// Authorization and time context for a single call.
///
/// `caller` is the identity on whose behalf the operation runs; `now` is the
/// call's timestamp in Unix seconds, used for start-time gates and cycle
/// derivation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallContext {
    pub caller: AccountId,
    pub now: u64,
}

impl CallContext {
    pub fn new(caller: AccountId, now: u64) -> Self {
        Self { caller, now }
    }

    /// Same timestamp, different caller. Used when a component calls into
    /// another component on its own behalf.
    pub fn as_caller(&self, caller: AccountId) -> Self {
        Self { caller, now: self.now }
    }
}
