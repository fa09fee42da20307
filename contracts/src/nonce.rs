//! Per-account replay protection.
//!
//! Each signer has a counter that starts at 0. An instruction carrying nonce
//! `n` is accepted only when `n == last + 1`; accepting it sets `last = n`.
//! Counters never decrease and never skip, so each signed instruction can be
//! applied at most once and in the order the signer intended.
//!
//! The ledger validates with [`NonceRegistry::check`] first and calls
//! [`NonceRegistry::advance`] only after every other check has passed, so a
//! rejected instruction never burns a nonce.

use cashier_protocol::types::AccountId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{LedgerError, LedgerResult};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NonceRegistry {
    last: BTreeMap<AccountId, u64>,
}

impl NonceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last accepted nonce; 0 for accounts that never signed anything.
    pub fn peek(&self, account: &AccountId) -> u64 {
        self.last.get(account).copied().unwrap_or(0)
    }

    /// Would `presented` be accepted right now?
    pub fn check(&self, account: &AccountId, presented: u64) -> LedgerResult<()> {
        let last = self.peek(account);
        match last.checked_add(1) {
            Some(expected) if expected == presented => Ok(()),
            // An exhausted counter accepts nothing; report the last value.
            expected => Err(LedgerError::InvalidNonce {
                account: *account,
                expected: expected.unwrap_or(last),
                presented,
            }),
        }
    }

    /// Record `presented` as consumed. Call only after [`check`](Self::check).
    pub fn advance(&mut self, account: &AccountId, presented: u64) {
        debug_assert_eq!(Some(presented), self.peek(account).checked_add(1));
        self.last.insert(*account, presented);
    }

    pub fn check_and_advance(&mut self, account: &AccountId, presented: u64) -> LedgerResult<()> {
        self.check(account, presented)?;
        self.advance(account, presented);
        Ok(())
    }

    /// Restore a persisted counter.
    pub fn restore(&mut self, account: AccountId, last: u64) {
        if last > 0 {
            self.last.insert(account, last);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&AccountId, &u64)> {
        self.last.iter()
    }
}
