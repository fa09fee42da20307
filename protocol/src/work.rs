//! # Relay Proof of Work
//!
//! Anyone may relay a signed instruction, but only after showing a nonce
//! whose digest clears a difficulty bar. The puzzle is bound to the relay's
//! own account, so a solved nonce can't be lent to somebody else. It is not
//! bound to any particular instruction, so one solution can be reused until
//! governance moves the bar.
//!
//! ```text
//! digest = keccak256(relay_account (20 bytes) || uint256(nonce))
//! valid  = leading_zero_bytes(digest) >= difficulty
//! ```
//!
//! Difficulty is counted in whole zero *bytes*, so each step multiplies the
//! expected search cost by 256.

use thiserror::Error;

use crate::codec::Encoder;
use crate::config::MAX_LEADING_ZERO_BYTES;
use crate::crypto::hash::keccak256;
use crate::types::{AccountId, Hash32};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WorkError {
    #[error("no nonce met difficulty {difficulty} within {attempts} attempts")]
    Exhausted { difficulty: u8, attempts: u64 },

    #[error("difficulty {0} exceeds the digest length")]
    Unreachable(u8),
}

/// The digest a relay has to grind.
pub fn work_digest(relay: &AccountId, nonce: u64) -> Hash32 {
    let input = Encoder::new().address(relay).uint(u128::from(nonce)).finish();
    keccak256(&input)
}

/// Count of leading `0x00` bytes in a digest.
pub fn leading_zero_bytes(digest: &Hash32) -> u8 {
    digest.iter().take_while(|b| **b == 0).count() as u8
}

/// Does `nonce` clear `difficulty` for this relay?
///
/// Difficulty 0 accepts every nonce.
pub fn validate_work(relay: &AccountId, nonce: u64, difficulty: u8) -> bool {
    if difficulty == 0 {
        return true;
    }
    leading_zero_bytes(&work_digest(relay, nonce)) >= difficulty
}

/// Linear search for a valid nonce starting at `start`.
///
/// Off the hot path: relays run this once per difficulty change. The search
/// gives up after `max_attempts` rather than spinning forever on a
/// difficulty the hardware can't reach.
pub fn solve_work(
    relay: &AccountId,
    difficulty: u8,
    start: u64,
    max_attempts: u64,
) -> Result<u64, WorkError> {
    if difficulty > MAX_LEADING_ZERO_BYTES {
        return Err(WorkError::Unreachable(difficulty));
    }
    if difficulty == 0 {
        return Ok(start);
    }

    // Reuse the encoded buffer and only rewrite the nonce word.
    let mut input = Encoder::new().address(relay).uint(0).finish();
    let nonce_offset = input.len() - 8;

    let mut nonce = start;
    for _ in 0..max_attempts {
        input[nonce_offset..].copy_from_slice(&nonce.to_be_bytes());
        if leading_zero_bytes(&keccak256(&input)) >= difficulty {
            tracing::debug!(relay = %relay, nonce, difficulty, "proof of work solved");
            return Ok(nonce);
        }
        nonce = nonce.wrapping_add(1);
    }

    Err(WorkError::Exhausted {
        difficulty,
        attempts: max_attempts,
    })
}
