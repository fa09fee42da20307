//! # Protocol Configuration & Constants
//!
//! Every magic number in Cashier lives here. If you're hardcoding a constant
//! somewhere else, you're doing it wrong and you owe the team coffee.
//!
//! Several of these are fixed by the signing conventions of the wallets that
//! produce Cashier instructions. Changing them breaks every signature already
//! in flight, so don't.

// ---------------------------------------------------------------------------
// Protocol Version
// ---------------------------------------------------------------------------

/// Crate-level protocol version, reported by the node's `/status` endpoint.
pub const PROTOCOL_VERSION: &str = "0.1.0";

// ---------------------------------------------------------------------------
// Cryptographic Parameters
// ---------------------------------------------------------------------------

/// secp256k1 with public-key recovery. The same curve wallets already use,
/// so holders sign with the keys they have.
pub const SIGNING_ALGORITHM: &str = "secp256k1-ecdsa-recoverable";

/// Secret key length in bytes.
pub const SECRET_KEY_LENGTH: usize = 32;

/// Recoverable signature length: `r (32) || s (32) || v (1)`.
pub const SIGNATURE_LENGTH: usize = 65;

/// Account identifiers are the trailing 20 bytes of the Keccak-256 hash of
/// the uncompressed public key.
pub const ACCOUNT_ID_LENGTH: usize = 20;

/// Keccak-256 output size.
pub const HASH_OUTPUT_LENGTH: usize = 32;

/// Prefix of the personal-message convention. Signers never sign a raw
/// payload hash; they sign `keccak256(prefix || keccak256(payload))`.
pub const PERSONAL_MESSAGE_PREFIX: &[u8] = b"\x19Ethereum Signed Message:\n32";

/// Width of an encoded unsigned integer field.
pub const UINT_WORD_LENGTH: usize = 32;

// ---------------------------------------------------------------------------
// Fixed-Point Arithmetic
// ---------------------------------------------------------------------------

/// Balances and fee percentages are 18-decimal fixed point. A percentage of
/// `FIXED_POINT_SCALE` is 100%.
pub const FIXED_POINT_SCALE: u128 = 1_000_000_000_000_000_000;

/// Decimals reported for the settlement asset when nothing else is configured.
pub const DEFAULT_ASSET_DECIMALS: u8 = 18;

// ---------------------------------------------------------------------------
// Proof of Work
// ---------------------------------------------------------------------------

/// Leading zero *bytes* a relay digest needs out of the box. One byte means
/// roughly 256 attempts per nonce search: enough to annoy a spammer, cheap
/// enough that an honest relay won't notice.
pub const DEFAULT_LEADING_ZERO_BYTES: u8 = 1;

/// A digest has 32 bytes, so any difficulty above this can never be met.
pub const MAX_LEADING_ZERO_BYTES: u8 = HASH_OUTPUT_LENGTH as u8;

/// Default upper bound on attempts in an off-path nonce search.
pub const DEFAULT_POW_SEARCH_LIMIT: u64 = 50_000_000;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crypto_parameter_sizes() {
        assert_eq!(SECRET_KEY_LENGTH, 32);
        assert_eq!(SIGNATURE_LENGTH, 65);
        assert_eq!(ACCOUNT_ID_LENGTH, 20);
        assert_eq!(HASH_OUTPUT_LENGTH, UINT_WORD_LENGTH);
    }

    #[test]
    fn test_fixed_point_scale_is_eighteen_decimals() {
        assert_eq!(FIXED_POINT_SCALE, 10u128.pow(18));
        assert_eq!(DEFAULT_ASSET_DECIMALS, 18);
    }

    #[test]
    fn test_personal_message_prefix() {
        assert_eq!(PERSONAL_MESSAGE_PREFIX.len(), 28);
        assert_eq!(PERSONAL_MESSAGE_PREFIX[0], 0x19);
        assert!(PERSONAL_MESSAGE_PREFIX.ends_with(b":\n32"));
    }

    #[test]
    fn test_pow_constants_sanity() {
        assert!(DEFAULT_LEADING_ZERO_BYTES <= MAX_LEADING_ZERO_BYTES);
        assert!(DEFAULT_POW_SEARCH_LIMIT > 256);
    }
}
