//! # Signer Recovery
//!
//! Cashier never asks "is this signature valid for key K?". It asks "who
//! signed this?" and then compares the answer with who *should* have signed.
//! That keeps the public key out of every payload and makes the comparison
//! explicit at each call site.
//!
//! ## Strictness
//!
//! Recovery fails (with an error, not a `false`) only when the signature
//! itself is malformed:
//!
//! - wrong length, or a recovery byte outside `{0, 1, 27, 28}`;
//! - zero or out-of-range `r`/`s`;
//! - a high-`s` value. Both `s` and `n - s` verify, so accepting either
//!   would give every signature a twin;
//! - a point that cannot be recovered.
//!
//! A well-formed signature by the wrong key recovers *somebody*; the caller
//! sees a mismatch, never an error.

use k256::ecdsa::{RecoveryId, Signature, VerifyingKey};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use thiserror::Error;

use super::hash::personal_message_hash;
use super::keys::account_id_from_verifying_key;
use crate::config::SIGNATURE_LENGTH;
use crate::types::{AccountId, Hash32};

/// Errors during signature parsing and recovery.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SignatureError {
    #[error("invalid signature length: expected {SIGNATURE_LENGTH} bytes, got {0}")]
    InvalidLength(usize),

    #[error("invalid signature encoding: not hex")]
    InvalidHex,

    #[error("invalid recovery id: {0}")]
    InvalidRecoveryId(u8),

    #[error("invalid signature scalars")]
    InvalidScalars,

    #[error("non-canonical signature: s is in the upper half of the curve order")]
    NonCanonical,

    #[error("public key recovery failed")]
    RecoveryFailed,
}

/// A 65-byte `r || s || v` signature.
///
/// Construction only checks the length; everything else is checked on
/// recovery, where it can be reported as a proper [`SignatureError`].
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct RecoverableSignature {
    bytes: [u8; SIGNATURE_LENGTH],
}

impl RecoverableSignature {
    pub fn new(bytes: [u8; SIGNATURE_LENGTH]) -> Self {
        Self { bytes }
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, SignatureError> {
        let bytes: [u8; SIGNATURE_LENGTH] = bytes
            .try_into()
            .map_err(|_| SignatureError::InvalidLength(bytes.len()))?;
        Ok(Self { bytes })
    }

    pub fn from_hex(hex_str: &str) -> Result<Self, SignatureError> {
        let trimmed = hex_str.strip_prefix("0x").unwrap_or(hex_str);
        let bytes = hex::decode(trimmed).map_err(|_| SignatureError::InvalidHex)?;
        Self::from_slice(&bytes)
    }

    pub fn as_bytes(&self) -> &[u8; SIGNATURE_LENGTH] {
        &self.bytes
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.bytes))
    }

    /// The recovery byte as transmitted.
    pub fn v(&self) -> u8 {
        self.bytes[64]
    }

    fn recovery_id(&self) -> Result<RecoveryId, SignatureError> {
        let normalized = match self.v() {
            0 | 1 => self.v(),
            27 | 28 => self.v() - 27,
            other => return Err(SignatureError::InvalidRecoveryId(other)),
        };
        RecoveryId::from_byte(normalized).ok_or(SignatureError::InvalidRecoveryId(self.v()))
    }
}

impl fmt::Debug for RecoverableSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RecoverableSignature({})", self.to_hex())
    }
}

impl Serialize for RecoverableSignature {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for RecoverableSignature {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Recover the account that signed `message` under the personal-message
/// convention.
///
/// # Example
///
/// ```
/// use cashier_protocol::crypto::{recover_signer, CashierKeypair};
///
/// let holder = CashierKeypair::from_seed(&[1u8; 32]).unwrap();
/// let stranger = CashierKeypair::from_seed(&[2u8; 32]).unwrap();
/// let sig = holder.sign_message(b"withdraw 5").unwrap();
///
/// let signer = recover_signer(b"withdraw 5", &sig).unwrap();
/// assert_eq!(signer, holder.account_id());
/// assert_ne!(signer, stranger.account_id());
/// ```
pub fn recover_signer(
    message: &[u8],
    signature: &RecoverableSignature,
) -> Result<AccountId, SignatureError> {
    recover_prehash(&personal_message_hash(message), signature)
}

/// Recover the account that signed a raw 32-byte digest.
pub fn recover_prehash(
    digest: &Hash32,
    signature: &RecoverableSignature,
) -> Result<AccountId, SignatureError> {
    let recovery_id = signature.recovery_id()?;
    let sig = Signature::from_slice(&signature.bytes[..64])
        .map_err(|_| SignatureError::InvalidScalars)?;
    if sig.normalize_s().is_some() {
        return Err(SignatureError::NonCanonical);
    }

    let key = VerifyingKey::recover_from_prehash(digest, &sig, recovery_id)
        .map_err(|_| SignatureError::RecoveryFailed)?;
    Ok(account_id_from_verifying_key(&key))
}

/// Recover, then compare. `Ok(false)` means "well-formed, wrong signer".
pub fn signed_by(
    message: &[u8],
    signature: &RecoverableSignature,
    expected: &AccountId,
) -> Result<bool, SignatureError> {
    Ok(recover_signer(message, signature)? == *expected)
}
