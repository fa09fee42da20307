//! # Hashing Utilities
//!
//! Keccak-256, the original submission and not the NIST-padded SHA3-256.
//! The two differ in a single padding byte and produce completely different
//! digests, which has bitten more than one team. `sha3::Keccak256` is the
//! right one.

use sha3::{Digest, Keccak256};

use crate::config::PERSONAL_MESSAGE_PREFIX;
use crate::types::Hash32;

/// Keccak-256 of `data`.
///
/// # Example
///
/// ```
/// use cashier_protocol::crypto::keccak256;
///
/// let digest = keccak256(b"");
/// assert_eq!(
///     hex::encode(digest),
///     "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
/// );
/// ```
pub fn keccak256(data: &[u8]) -> Hash32 {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    let result = hasher.finalize();
    let mut output = [0u8; 32];
    output.copy_from_slice(&result);
    output
}

/// Keccak-256 over several slices, as if they were concatenated.
///
/// Saves an allocation on hot paths like the proof-of-work digest.
pub fn keccak256_concat(parts: &[&[u8]]) -> Hash32 {
    let mut hasher = Keccak256::new();
    for part in parts {
        hasher.update(part);
    }
    let result = hasher.finalize();
    let mut output = [0u8; 32];
    output.copy_from_slice(&result);
    output
}

/// The digest a holder's wallet actually signs for `message`:
/// `keccak256(PERSONAL_MESSAGE_PREFIX || keccak256(message))`.
///
/// The prefix stops a signed Cashier payload from ever being replayed as a
/// raw transaction elsewhere.
pub fn personal_message_hash(message: &[u8]) -> Hash32 {
    let inner = keccak256(message);
    keccak256_concat(&[PERSONAL_MESSAGE_PREFIX, &inner])
}
