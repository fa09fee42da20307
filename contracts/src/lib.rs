//! # Cashier Contracts
//!
//! The ledger logic of Cashier: internal balances backed by an external
//! settlement asset, moved by holder-signed instructions that relays submit
//! after solving a proof-of-work puzzle.
//!
//! - **Ledger**: deposits, withdrawals, payments, credential mint and
//!   transfer, governance setters. The only entry point that mutates state.
//! - **Nonce Registry**: per-signer replay protection.
//! - **Fees**: the treasury / relay split in fixed-point arithmetic.
//! - **Attestation**: provider-signed settings and attestation data.
//! - **Trust Token**: the credential-token table and its mint authority.
//! - **Asset**: the settlement-asset interface and an in-memory token.
//!
//! ## Design Principles
//!
//! 1. All monetary operations check for overflow. `checked_add` and
//!    `checked_sub` everywhere, because wrapping arithmetic and money do not
//!    mix.
//! 2. Validate everything, then write. A failed instruction changes nothing,
//!    not even the signer's nonce.
//! 3. Recover, then compare. A recovered signer is never trusted on its own.
//! 4. State is data. `LedgerState` is serializable and survives a restart or
//!    a logic upgrade untouched.

pub mod asset;
pub mod attestation;
pub mod clock;
pub mod error;
pub mod events;
pub mod fees;
pub mod instruction;
pub mod ledger;
pub mod nonce;
pub mod state;
pub mod trust_token;

pub use asset::{AssetBridge, AssetError, InMemoryAsset};
pub use clock::{Clock, FixedClock, SystemClock};
pub use error::{Collaborator, LedgerError, LedgerResult};
pub use events::{ConfigChange, LedgerEvent};
pub use fees::{FeeConfiguration, FeeSplit};
pub use instruction::{Operation, Payload, SignedPayload};
pub use ledger::{Ledger, MintReceipt, PaymentReceipt};
pub use state::{AccountState, Changeset, LedgerSettings, LedgerState};
pub use trust_token::{CredentialAuthority, CredentialError, CredentialToken, TokenId};
