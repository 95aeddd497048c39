//! End-to-end and adversarial test suite for stakepool.
//!
//! The tests drive the full engine (token, staking ledger, reward pools)
//! through realistic scenarios and randomized operation sequences, checking
//! conservation and authorization invariants after every step.

pub mod helpers;
