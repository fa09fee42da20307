//! # Core Value Types
//!
//! `AccountId` is the 20-byte identifier every balance, nonce and credential
//! is keyed by. It is derived from a secp256k1 public key (see
//! [`crate::crypto::keys`]) and rendered as `0x`-prefixed lowercase hex, the
//! format wallets and block explorers already print.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::config::ACCOUNT_ID_LENGTH;

/// Token amounts: 18-decimal fixed point, never negative.
pub type Amount = u128;

/// A Keccak-256 digest.
pub type Hash32 = [u8; 32];

/// Errors from parsing an [`AccountId`] out of text.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AccountIdParseError {
    #[error("account id is not valid hex")]
    InvalidHex,

    #[error("account id must be {ACCOUNT_ID_LENGTH} bytes, got {0}")]
    InvalidLength(usize),
}

/// A 20-byte account identifier.
///
/// The all-zero id is reserved as the "nobody" target: transfers and mints to
/// it are rejected by the ledger.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct AccountId([u8; ACCOUNT_ID_LENGTH]);

impl AccountId {
    /// The null account.
    pub const ZERO: AccountId = AccountId([0u8; ACCOUNT_ID_LENGTH]);

    pub const fn new(bytes: [u8; ACCOUNT_ID_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Build an id from a slice, returning `None` unless it is exactly 20 bytes.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let arr: [u8; ACCOUNT_ID_LENGTH] = bytes.try_into().ok()?;
        Some(Self(arr))
    }

    pub fn as_bytes(&self) -> &[u8; ACCOUNT_ID_LENGTH] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; ACCOUNT_ID_LENGTH]
    }

    /// Lowercase hex with the `0x` prefix.
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccountId({})", self.to_hex())
    }
}

impl FromStr for AccountId {
    type Err = AccountIdParseError;

    /// Accepts hex with or without the `0x` prefix, in either case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .unwrap_or(s);
        let bytes = hex::decode(trimmed).map_err(|_| AccountIdParseError::InvalidHex)?;
        Self::from_slice(&bytes).ok_or(AccountIdParseError::InvalidLength(bytes.len()))
    }
}

impl From<[u8; ACCOUNT_ID_LENGTH]> for AccountId {
    fn from(bytes: [u8; ACCOUNT_ID_LENGTH]) -> Self {
        Self(bytes)
    }
}

// Serialized as its hex string in every format, so JSON API bodies, TOML
// config files and the on-disk encoding all agree.
impl Serialize for AccountId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for AccountId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
