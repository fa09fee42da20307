//! # Settlement Asset Bridge
//!
//! The fungible token that backs internal balances lives outside the ledger.
//! The ledger only needs a handful of operations from it, captured by the
//! [`AssetBridge`] trait: allowance-based pulls for deposits, plain
//! transfers for withdrawals, and balance queries.
//!
//! [`InMemoryAsset`] is a complete, mintable implementation. Tests use it,
//! and the node hosts one as its settlement asset.

use cashier_protocol::config::DEFAULT_ASSET_DECIMALS;
use cashier_protocol::types::{AccountId, Amount};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AssetError {
    /// The sender does not hold enough of the asset.
    #[error("asset transfer failed: {account} holds {available}, needs {requested}")]
    InsufficientFunds {
        account: AccountId,
        available: Amount,
        requested: Amount,
    },

    /// The spender was not approved for enough.
    #[error("asset allowance too low: {spender} may move {available} for {owner}, needs {requested}")]
    InsufficientAllowance {
        owner: AccountId,
        spender: AccountId,
        available: Amount,
        requested: Amount,
    },

    #[error("asset transfer to the zero account")]
    InvalidRecipient,

    #[error("asset supply overflow")]
    Overflow,
}

// ---------------------------------------------------------------------------
// Bridge
// ---------------------------------------------------------------------------

/// What the ledger needs from a fungible settlement asset.
pub trait AssetBridge: Send {
    /// Address the asset is installed under. Governance must configure the
    /// same address on the ledger before any asset moves.
    fn address(&self) -> AccountId;

    fn decimals(&self) -> u8;

    fn balance_of(&self, account: &AccountId) -> Amount;

    fn allowance(&self, owner: &AccountId, spender: &AccountId) -> Amount;

    fn approve(&mut self, owner: &AccountId, spender: &AccountId, amount: Amount)
        -> Result<(), AssetError>;

    fn transfer(&mut self, from: &AccountId, to: &AccountId, amount: Amount)
        -> Result<(), AssetError>;

    /// Move `amount` from `from` to `to` on the strength of `spender`'s allowance.
    fn transfer_from(
        &mut self,
        spender: &AccountId,
        from: &AccountId,
        to: &AccountId,
        amount: Amount,
    ) -> Result<(), AssetError>;
}

// ---------------------------------------------------------------------------
// In-memory implementation
// ---------------------------------------------------------------------------

/// A mintable fungible token kept entirely in memory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InMemoryAsset {
    address: AccountId,
    symbol: String,
    decimals: u8,
    total_supply: Amount,
    balances: BTreeMap<AccountId, Amount>,
    /// owner -> spender -> remaining allowance
    allowances: BTreeMap<AccountId, BTreeMap<AccountId, Amount>>,
}

impl InMemoryAsset {
    pub fn new(address: AccountId, symbol: impl Into<String>) -> Self {
        Self {
            address,
            symbol: symbol.into(),
            decimals: DEFAULT_ASSET_DECIMALS,
            total_supply: 0,
            balances: BTreeMap::new(),
            allowances: BTreeMap::new(),
        }
    }

    pub fn with_decimals(mut self, decimals: u8) -> Self {
        self.decimals = decimals;
        self
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn total_supply(&self) -> Amount {
        self.total_supply
    }

    /// Create new units out of thin air. Only hosts and tests call this.
    pub fn mint(&mut self, to: &AccountId, amount: Amount) -> Result<(), AssetError> {
        if to.is_zero() {
            return Err(AssetError::InvalidRecipient);
        }
        let supply = self
            .total_supply
            .checked_add(amount)
            .ok_or(AssetError::Overflow)?;
        let balance = self
            .balance_of(to)
            .checked_add(amount)
            .ok_or(AssetError::Overflow)?;
        self.total_supply = supply;
        self.balances.insert(*to, balance);
        Ok(())
    }

    fn move_balance(
        &mut self,
        from: &AccountId,
        to: &AccountId,
        amount: Amount,
    ) -> Result<(), AssetError> {
        if to.is_zero() {
            return Err(AssetError::InvalidRecipient);
        }
        let available = self.balance_of(from);
        let remaining = available
            .checked_sub(amount)
            .ok_or(AssetError::InsufficientFunds {
                account: *from,
                available,
                requested: amount,
            })?;
        self.balances.insert(*from, remaining);
        let credited = self
            .balance_of(to)
            .checked_add(amount)
            .ok_or(AssetError::Overflow)?;
        self.balances.insert(*to, credited);
        Ok(())
    }
}

impl AssetBridge for InMemoryAsset {
    fn address(&self) -> AccountId {
        self.address
    }

    fn decimals(&self) -> u8 {
        self.decimals
    }

    fn balance_of(&self, account: &AccountId) -> Amount {
        self.balances.get(account).copied().unwrap_or(0)
    }

    fn allowance(&self, owner: &AccountId, spender: &AccountId) -> Amount {
        self.allowances
            .get(owner)
            .and_then(|m| m.get(spender))
            .copied()
            .unwrap_or(0)
    }

    fn approve(
        &mut self,
        owner: &AccountId,
        spender: &AccountId,
        amount: Amount,
    ) -> Result<(), AssetError> {
        if spender.is_zero() {
            return Err(AssetError::InvalidRecipient);
        }
        self.allowances
            .entry(*owner)
            .or_default()
            .insert(*spender, amount);
        Ok(())
    }

    fn transfer(
        &mut self,
        from: &AccountId,
        to: &AccountId,
        amount: Amount,
    ) -> Result<(), AssetError> {
        self.move_balance(from, to, amount)
    }

    fn transfer_from(
        &mut self,
        spender: &AccountId,
        from: &AccountId,
        to: &AccountId,
        amount: Amount,
    ) -> Result<(), AssetError> {
        let available = self.allowance(from, spender);
        if available < amount {
            return Err(AssetError::InsufficientAllowance {
                owner: *from,
                spender: *spender,
                available,
                requested: amount,
            });
        }
        self.move_balance(from, to, amount)?;
        self.allowances
            .entry(*from)
            .or_default()
            .insert(*spender, available - amount);
        Ok(())
    }
}
