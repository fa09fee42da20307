//! # Cryptographic Primitives for Cashier
//!
//! Every signer check, every proof-of-work digest, and every invoice id flows
//! through here. The choices are boring on purpose:
//!
//! - **Keccak-256** for hashing, because it's what wallet tooling signs over.
//! - **secp256k1 (recoverable ECDSA)** for signatures, so a signature alone
//!   tells us who signed. No public key has to ride along with a payload.
//!
//! ## A note on "rolling your own crypto"
//!
//! We don't. Everything here is a thin, type-safe wrapper around `k256` and
//! `sha3`. The only policy we add is strictness: malleable (high-`s`)
//! signatures are rejected, and the recovered signer is always compared by
//! the caller rather than trusted.

pub mod hash;
pub mod keys;
pub mod signatures;

pub use hash::{keccak256, keccak256_concat, personal_message_hash};
pub use keys::{CashierKeypair, KeyError};
pub use signatures::{recover_prehash, recover_signer, signed_by, RecoverableSignature, SignatureError};
