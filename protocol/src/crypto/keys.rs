//! # Key Management
//!
//! secp256k1 keypairs and the account ids derived from them.
//!
//! Holders, providers and relays all sign with ordinary secp256k1 keys. The
//! account id is the trailing 20 bytes of `keccak256(X || Y)` over the
//! uncompressed public point, so an id recovered from a signature matches the
//! one a wallet displays.
//!
//! ## Security considerations
//!
//! - Keys are generated from `OsRng`.
//! - Key bytes are never logged, and `Debug` only prints the account id.
//!   If you add logging to this module, you will be asked to leave.

use k256::ecdsa::{SigningKey, VerifyingKey};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use rand::rngs::OsRng;
use std::fmt;
use thiserror::Error;

use super::hash::{keccak256, personal_message_hash};
use super::signatures::RecoverableSignature;
use crate::config::SECRET_KEY_LENGTH;
use crate::types::{AccountId, Hash32};

/// Errors that can occur during key operations.
///
/// Intentionally vague: error messages never describe key material.
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("invalid secret key: wrong length or not a valid scalar")]
    InvalidSecretKey,

    #[error("signing failed")]
    SigningFailed,
}

/// A secp256k1 signing key plus the account id it controls.
///
/// `CashierKeypair` deliberately does not implement `Serialize`. Writing a
/// private key to disk should be a conscious act: use [`to_hex`](Self::to_hex).
///
/// # Examples
///
/// ```
/// use cashier_protocol::crypto::{recover_signer, CashierKeypair};
///
/// let kp = CashierKeypair::generate();
/// let sig = kp.sign_message(b"pay alice").unwrap();
/// assert_eq!(recover_signer(b"pay alice", &sig).unwrap(), kp.account_id());
/// ```
#[derive(Clone)]
pub struct CashierKeypair {
    signing_key: SigningKey,
    account_id: AccountId,
}

impl CashierKeypair {
    /// Fresh keypair from the OS RNG.
    pub fn generate() -> Self {
        Self::from_signing_key(SigningKey::random(&mut OsRng))
    }

    /// Deterministic keypair from a 32-byte secret scalar.
    ///
    /// Fails for zero or for values at or above the curve order. Tests use
    /// small constant seeds like `[7u8; 32]`, which are comfortably valid.
    pub fn from_seed(seed: &[u8; SECRET_KEY_LENGTH]) -> Result<Self, KeyError> {
        let signing_key = SigningKey::from_slice(seed).map_err(|_| KeyError::InvalidSecretKey)?;
        Ok(Self::from_signing_key(signing_key))
    }

    /// Load a keypair from hex, with or without a `0x` prefix.
    pub fn from_hex(hex_str: &str) -> Result<Self, KeyError> {
        let trimmed = hex_str.trim();
        let trimmed = trimmed.strip_prefix("0x").unwrap_or(trimmed);
        let bytes = hex::decode(trimmed).map_err(|_| KeyError::InvalidSecretKey)?;
        let seed: [u8; SECRET_KEY_LENGTH] =
            bytes.try_into().map_err(|_| KeyError::InvalidSecretKey)?;
        Self::from_seed(&seed)
    }

    fn from_signing_key(signing_key: SigningKey) -> Self {
        let account_id = account_id_from_verifying_key(signing_key.verifying_key());
        Self {
            signing_key,
            account_id,
        }
    }

    /// The account this key controls.
    pub fn account_id(&self) -> AccountId {
        self.account_id
    }

    /// Raw secret scalar. Handle with care.
    pub fn secret_bytes(&self) -> [u8; SECRET_KEY_LENGTH] {
        let mut out = [0u8; SECRET_KEY_LENGTH];
        out.copy_from_slice(&self.signing_key.to_bytes());
        out
    }

    /// Hex-encoded secret scalar, no prefix.
    pub fn to_hex(&self) -> String {
        hex::encode(self.secret_bytes())
    }

    /// Sign `message` under the personal-message convention. This is what a
    /// wallet produces when a holder approves a Cashier payload.
    pub fn sign_message(&self, message: &[u8]) -> Result<RecoverableSignature, KeyError> {
        self.sign_prehash(&personal_message_hash(message))
    }

    /// Sign an already-computed 32-byte digest.
    ///
    /// `k256` always emits low-`s` signatures, so everything produced here
    /// passes the strict recovery check.
    pub fn sign_prehash(&self, digest: &Hash32) -> Result<RecoverableSignature, KeyError> {
        let (signature, recovery_id) = self
            .signing_key
            .sign_prehash_recoverable(digest)
            .map_err(|_| KeyError::SigningFailed)?;

        let mut bytes = [0u8; 65];
        bytes[..64].copy_from_slice(&signature.to_bytes());
        bytes[64] = 27 + recovery_id.to_byte();
        Ok(RecoverableSignature::new(bytes))
    }
}

impl fmt::Debug for CashierKeypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CashierKeypair")
            .field("account_id", &self.account_id)
            .finish_non_exhaustive()
    }
}

/// Derive the account id of a public key: the last 20 bytes of the
/// Keccak-256 hash of the uncompressed point without its `0x04` tag.
pub fn account_id_from_verifying_key(key: &VerifyingKey) -> AccountId {
    let point = key.as_affine().to_encoded_point(false);
    let digest = keccak256(&point.as_bytes()[1..]);
    let mut id = [0u8; 20];
    id.copy_from_slice(&digest[12..]);
    AccountId::new(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_well_known_key_address() {
        // Secret key 1 is the generator point; its address is a fixture in
        // every Ethereum library test suite.
        let mut seed = [0u8; 32];
        seed[31] = 1;
        let kp = CashierKeypair::from_seed(&seed).unwrap();
        assert_eq!(
            kp.account_id().to_hex(),
            "0x7e5f4552091a69125d5dfcb7b8c2659029395bdf"
        );
    }

    #[test]
    fn test_seed_is_deterministic() {
        let a = CashierKeypair::from_seed(&[7u8; 32]).unwrap();
        let b = CashierKeypair::from_seed(&[7u8; 32]).unwrap();
        assert_eq!(a.account_id(), b.account_id());
        assert_ne!(
            a.account_id(),
            CashierKeypair::from_seed(&[8u8; 32]).unwrap().account_id()
        );
    }

    #[test]
    fn test_zero_seed_rejected() {
        assert!(CashierKeypair::from_seed(&[0u8; 32]).is_err());
        assert!(CashierKeypair::from_seed(&[0xFF; 32]).is_err());
    }

    #[test]
    fn test_hex_roundtrip() {
        let kp = CashierKeypair::generate();
        let restored = CashierKeypair::from_hex(&kp.to_hex()).unwrap();
        assert_eq!(kp.account_id(), restored.account_id());
        let prefixed = CashierKeypair::from_hex(&format!("0x{}", kp.to_hex())).unwrap();
        assert_eq!(kp.account_id(), prefixed.account_id());
        assert!(CashierKeypair::from_hex("not hex").is_err());
        assert!(CashierKeypair::from_hex("abcd").is_err());
    }

    #[test]
    fn test_signature_v_is_27_or_28() {
        let kp = CashierKeypair::from_seed(&[3u8; 32]).unwrap();
        for msg in [&b"a"[..], b"b", b"c", b"d"] {
            let sig = kp.sign_message(msg).unwrap();
            assert!(sig.v() == 27 || sig.v() == 28);
        }
    }

    #[test]
    fn test_debug_hides_secret() {
        let kp = CashierKeypair::from_seed(&[9u8; 32]).unwrap();
        let rendered = format!("{kp:?}");
        assert!(!rendered.contains(&kp.to_hex()));
        assert!(rendered.contains("account_id"));
    }
}
