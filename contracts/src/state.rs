//! # Ledger State
//!
//! The ledger keeps its data apart from its logic. [`LedgerState`] is plain,
//! serializable data; [`crate::ledger::Ledger`] wraps it with the rules.
//! A host can persist the state, rebuild a `Ledger` around it after a
//! restart (or after shipping new logic), and carry on where it left off.
//!
//! [`Changeset`] records which keys an instruction touched, so the host can
//! persist just those in a single storage transaction instead of rewriting
//! everything.

use cashier_protocol::types::{AccountId, Amount, Hash32};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::events::LedgerEvent;
use crate::fees::FeeConfiguration;
use crate::nonce::NonceRegistry;
use crate::trust_token::TokenId;

/// Everything the ledger knows, minus the collaborators it talks to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerState {
    /// The ledger's own address. Also the treasury account fees accrue to.
    pub address: AccountId,
    /// The one account allowed to change configuration.
    pub governance: AccountId,
    /// Receives the engine cut of direct (non-relayed) deposits.
    pub fee_engine: AccountId,
    pub config: FeeConfiguration,
    /// Installed settlement asset address.
    pub asset: Option<AccountId>,
    /// Installed trust token address.
    pub trust_token: Option<AccountId>,
    pub balances: BTreeMap<AccountId, Amount>,
    pub nonces: NonceRegistry,
    pub consumed_invoices: BTreeSet<Hash32>,
}

impl LedgerState {
    pub fn new(
        address: AccountId,
        governance: AccountId,
        fee_engine: AccountId,
        config: FeeConfiguration,
    ) -> Self {
        Self {
            address,
            governance,
            fee_engine,
            config,
            asset: None,
            trust_token: None,
            balances: BTreeMap::new(),
            nonces: NonceRegistry::new(),
            consumed_invoices: BTreeSet::new(),
        }
    }

    pub fn balance_of(&self, account: &AccountId) -> Amount {
        self.balances.get(account).copied().unwrap_or(0)
    }

    /// Balance and nonce of one account, as stored.
    pub fn account(&self, account: &AccountId) -> AccountState {
        AccountState {
            balance: self.balance_of(account),
            last_nonce: self.nonces.peek(account),
        }
    }

    /// Put one stored account back.
    pub fn restore_account(&mut self, account: AccountId, stored: AccountState) {
        if stored.balance > 0 {
            self.balances.insert(account, stored.balance);
        }
        self.nonces.restore(account, stored.last_nonce);
    }

    /// Sum of all internal balances. Equals the ledger's settlement-asset
    /// holdings as long as nobody sends the asset to the ledger directly.
    pub fn total_balances(&self) -> Option<Amount> {
        self.balances
            .values()
            .try_fold(0u128, |acc, b| acc.checked_add(*b))
    }

    /// The parts that are not per-account: configuration and wiring.
    pub fn settings(&self) -> LedgerSettings {
        LedgerSettings {
            address: self.address,
            governance: self.governance,
            fee_engine: self.fee_engine,
            config: self.config,
            asset: self.asset,
            trust_token: self.trust_token,
        }
    }

    /// Rebuild a state from its settings; accounts and invoices are restored
    /// separately.
    pub fn from_settings(settings: LedgerSettings) -> Self {
        let mut state = Self::new(
            settings.address,
            settings.governance,
            settings.fee_engine,
            settings.config,
        );
        state.asset = settings.asset;
        state.trust_token = settings.trust_token;
        state
    }
}

/// Per-account record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountState {
    pub balance: Amount,
    pub last_nonce: u64,
}

/// Global, non-account portion of [`LedgerState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSettings {
    pub address: AccountId,
    pub governance: AccountId,
    pub fee_engine: AccountId,
    pub config: FeeConfiguration,
    pub asset: Option<AccountId>,
    pub trust_token: Option<AccountId>,
}

/// Keys touched since the host last took the changes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Changeset {
    pub accounts: BTreeSet<AccountId>,
    pub invoices: BTreeSet<Hash32>,
    pub tokens: BTreeSet<TokenId>,
    pub settings: bool,
    pub credential_admin: bool,
    pub asset: bool,
    pub events: Vec<LedgerEvent>,
}

impl Changeset {
    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
            && self.invoices.is_empty()
            && self.tokens.is_empty()
            && !self.settings
            && !self.credential_admin
            && !self.asset
            && self.events.is_empty()
    }
}
