//! Ledger events.
//!
//! Every successful state change appends one event. Hosts drain them after
//! each instruction, log them, and keep them in an append-only journal, which
//! is how a receiver learns that an invoice (`payment_id`) was paid.

use cashier_protocol::types::{AccountId, Amount, Hash32};
use serde::{Deserialize, Serialize};

use crate::fees::FeeSplit;
use crate::trust_token::TokenId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerEvent {
    Deposit {
        holder: AccountId,
        /// Relay that submitted it, or the designated fee engine for direct deposits.
        engine: AccountId,
        /// `None` for direct deposits, which carry no signed instruction.
        nonce: Option<u64>,
        split: FeeSplit,
    },
    Withdraw {
        holder: AccountId,
        engine: AccountId,
        nonce: u64,
        split: FeeSplit,
    },
    Payment {
        payer: AccountId,
        receiver: AccountId,
        payment_id: u128,
        engine: AccountId,
        nonce: u64,
        split: FeeSplit,
    },
    TokenMinted {
        token_id: TokenId,
        holder: AccountId,
        provider: AccountId,
        token_uri: String,
        price: Amount,
        invoice: Hash32,
        engine: AccountId,
    },
    TokenTransferred {
        token_id: TokenId,
        from: AccountId,
        to: AccountId,
        engine: AccountId,
        nonce: u64,
    },
    OwnershipTransferred {
        previous: AccountId,
        new: AccountId,
    },
    CredentialOwnershipTransferred {
        previous: AccountId,
        new: AccountId,
    },
    CredentialAuthorityChanged {
        authority: AccountId,
        granted: bool,
    },
    ConfigChanged(ConfigChange),
}

/// A governance parameter update and its new value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigChange {
    Erc20TokenAddress(AccountId),
    TrustTokenAddress(AccountId),
    CashierPercentage(u128),
    EnginePercentage(u128),
    Decimals(u8),
    LeadingZeros(u8),
    FeeEngine(AccountId),
}

impl LedgerEvent {
    /// Short name for logs and metrics labels.
    pub fn kind(&self) -> &'static str {
        match self {
            LedgerEvent::Deposit { .. } => "deposit",
            LedgerEvent::Withdraw { .. } => "withdraw",
            LedgerEvent::Payment { .. } => "payment",
            LedgerEvent::TokenMinted { .. } => "token_minted",
            LedgerEvent::TokenTransferred { .. } => "token_transferred",
            LedgerEvent::OwnershipTransferred { .. } => "ownership_transferred",
            LedgerEvent::CredentialOwnershipTransferred { .. } => "credential_ownership_transferred",
            LedgerEvent::CredentialAuthorityChanged { .. } => "credential_authority_changed",
            LedgerEvent::ConfigChanged(_) => "config_changed",
        }
    }

    /// Fees collected by this event, if it moved value.
    pub fn split(&self) -> Option<&FeeSplit> {
        match self {
            LedgerEvent::Deposit { split, .. }
            | LedgerEvent::Withdraw { split, .. }
            | LedgerEvent::Payment { split, .. } => Some(split),
            _ => None,
        }
    }
}
