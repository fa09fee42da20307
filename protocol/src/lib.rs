// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Cashier Protocol Core Primitives
//!
//! The building blocks every other Cashier crate leans on. Nothing in here
//! holds state: it's all pure functions and small value types, which is
//! exactly what you want underneath something that moves money.
//!
//! Cashier authorizes balance operations with off-chain secp256k1 signatures
//! and lets anyone relay them, provided the relay burns a little CPU on a
//! proof-of-work puzzle first. This crate provides the pieces of that story:
//!
//! - **types**: `AccountId` (20-byte, Ethereum-style) and `Amount`.
//! - **crypto**: Keccak-256 hashing, secp256k1 keys, signer recovery.
//! - **codec**: The deterministic field encoding that payloads are signed over.
//! - **work**: The proof-of-work admission gate for relays.
//! - **config**: Protocol constants. Magic numbers live here and nowhere else.
//!
//! ## Design Philosophy
//!
//! 1. Recover, then compare. Signature recovery never decides *who* is
//!    allowed; callers check the recovered id against the expected one.
//! 2. Strict decoding. Trailing bytes and non-canonical values are errors.
//! 3. If it touches money, it has tests. Plural.

pub mod codec;
pub mod config;
pub mod crypto;
pub mod types;
pub mod work;

pub use codec::{CodecError, Decoder, Encoder};
pub use crypto::{keccak256, recover_signer, CashierKeypair, RecoverableSignature, SignatureError};
pub use types::{AccountId, Amount, Hash32};
