//! Ledger error type.
//!
//! Every failure is terminal for the instruction that caused it and leaves
//! ledger state untouched. Component errors (`CodecError`, `SignatureError`,
//! `AssetError`, `CredentialError`) are wrapped rather than flattened so a
//! caller can still tell *which* collaborator said no.

use cashier_protocol::codec::CodecError;
use cashier_protocol::crypto::SignatureError;
use cashier_protocol::types::{AccountId, Amount, Hash32};
use thiserror::Error;

use crate::asset::AssetError;
use crate::instruction::Operation;
use crate::trust_token::CredentialError;

/// A collaborator the ledger routes calls to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collaborator {
    SettlementAsset,
    TrustToken,
}

impl std::fmt::Display for Collaborator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Collaborator::SettlementAsset => write!(f, "settlement asset"),
            Collaborator::TrustToken => write!(f, "trust token"),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// A governance-only entry point was called by someone else.
    #[error("unauthorized: {caller} is not the governance account")]
    Unauthorized { caller: AccountId },

    /// The signature is well-formed but was produced by another key.
    #[error("invalid signature: expected {expected}, recovered {recovered}")]
    InvalidSignature {
        expected: AccountId,
        recovered: AccountId,
    },

    #[error("malformed signature: {0}")]
    MalformedSignature(#[from] SignatureError),

    #[error("invalid nonce for {account}: expected {expected}, got {presented}")]
    InvalidNonce {
        account: AccountId,
        expected: u64,
        presented: u64,
    },

    #[error("insufficient proof of work: relay {relay} nonce {nonce} needs {required} leading zero bytes")]
    InsufficientProofOfWork {
        relay: AccountId,
        nonce: u64,
        required: u8,
    },

    #[error("insufficient balance: {account} has {available}, needs {requested}")]
    InsufficientBalance {
        account: AccountId,
        available: Amount,
        requested: Amount,
    },

    #[error("settings expired at {expiration}, now {now}")]
    Expired { expiration: u64, now: u64 },

    #[error("invoice 0x{} already consumed", hex_digest(.0))]
    AlreadyConsumed(Hash32),

    /// A payment was addressed to the zero account.
    #[error("invalid target: the zero account cannot receive funds")]
    InvalidTarget,

    #[error("malformed payload: {0}")]
    MalformedPayload(#[from] CodecError),

    /// The payload was signed for a different operation.
    #[error("payload carries operation tag {found}, {expected} needs {}", .expected.tag())]
    WrongOperation { expected: Operation, found: u128 },

    /// The payload was signed for another ledger instance.
    #[error("payload is bound to ledger {found}, this is {expected}")]
    WrongLedger { expected: AccountId, found: AccountId },

    /// The attestation was issued to a different relay.
    #[error("attestation names engine {named}, submitted by {caller}")]
    EngineMismatch { named: AccountId, caller: AccountId },

    #[error("attestation does not match settings: {0}")]
    AttestationMismatch(&'static str),

    #[error("fees {fees} exceed amount {amount}")]
    FeesExceedAmount { amount: Amount, fees: Amount },

    #[error("arithmetic overflow")]
    ArithmeticOverflow,

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(&'static str),

    #[error("{0} is not configured or does not match the installed address")]
    CollaboratorNotConfigured(Collaborator),

    #[error(transparent)]
    Credential(#[from] CredentialError),

    #[error(transparent)]
    Asset(#[from] AssetError),
}

impl LedgerError {
    /// Stable snake_case name, used as a metrics label and API error code.
    pub fn kind(&self) -> &'static str {
        match self {
            LedgerError::Unauthorized { .. } => "unauthorized",
            LedgerError::InvalidSignature { .. } => "invalid_signature",
            LedgerError::MalformedSignature(_) => "malformed_signature",
            LedgerError::InvalidNonce { .. } => "invalid_nonce",
            LedgerError::InsufficientProofOfWork { .. } => "insufficient_proof_of_work",
            LedgerError::InsufficientBalance { .. } => "insufficient_balance",
            LedgerError::Expired { .. } => "expired",
            LedgerError::AlreadyConsumed(_) => "already_consumed",
            LedgerError::InvalidTarget => "invalid_target",
            LedgerError::MalformedPayload(_) => "malformed_payload",
            LedgerError::WrongOperation { .. } => "wrong_operation",
            LedgerError::WrongLedger { .. } => "wrong_ledger",
            LedgerError::EngineMismatch { .. } => "engine_mismatch",
            LedgerError::AttestationMismatch(_) => "attestation_mismatch",
            LedgerError::FeesExceedAmount { .. } => "fees_exceed_amount",
            LedgerError::ArithmeticOverflow => "arithmetic_overflow",
            LedgerError::InvalidConfiguration(_) => "invalid_configuration",
            LedgerError::CollaboratorNotConfigured(_) => "collaborator_not_configured",
            LedgerError::Credential(CredentialError::Unauthorized { .. }) => "unauthorized",
            LedgerError::Credential(CredentialError::NotOwner { .. }) => "not_owner",
            LedgerError::Credential(CredentialError::UnknownToken(_)) => "unknown_token",
            LedgerError::Credential(CredentialError::InvalidTarget) => "invalid_target",
            LedgerError::Asset(_) => "asset",
        }
    }
}

fn hex_digest(digest: &Hash32) -> String {
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

pub type LedgerResult<T> = Result<T, LedgerError>;
