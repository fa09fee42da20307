//! # Payload Codec
//!
//! Signatures are only as good as the bytes they cover, so every signed
//! Cashier payload is built with this encoder and parsed with this decoder.
//! The format is a plain, order-preserving concatenation of typed fields:
//!
//! | Field      | Encoding                                         |
//! |------------|--------------------------------------------------|
//! | `uint`     | 32 bytes, big-endian                             |
//! | `address`  | 20 bytes                                         |
//! | `bytesN`   | N bytes, as given                                |
//! | `bool`     | 1 byte, `0x00` or `0x01`                         |
//! | `bytes`    | u32 big-endian length, then the bytes            |
//! | `string`   | like `bytes`, UTF-8                              |
//!
//! Integers take a full 32-byte word so payloads line up with the 256-bit
//! words wallets are used to signing. Values that do not fit the Rust type
//! being decoded are rejected rather than truncated.
//!
//! Decoding is strict. A payload with trailing bytes, a bool of `0x02`, or
//! invalid UTF-8 is a different payload, and we refuse to guess.

use thiserror::Error;

use crate::config::{ACCOUNT_ID_LENGTH, UINT_WORD_LENGTH};
use crate::types::AccountId;

/// Errors produced while decoding a payload.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("unexpected end of payload: needed {needed} bytes, {remaining} left")]
    UnexpectedEnd { needed: usize, remaining: usize },

    #[error("integer field does not fit in {bits} bits")]
    ValueOutOfRange { bits: u32 },

    #[error("invalid bool byte: {0:#04x}")]
    InvalidBool(u8),

    #[error("string field is not valid UTF-8")]
    InvalidUtf8,

    #[error("{0} trailing bytes after the last field")]
    TrailingBytes(usize),

    #[error("payload tag {found} where {expected} was expected")]
    UnexpectedTag { expected: u128, found: u128 },
}

/// Builds a payload field by field.
///
/// ```
/// use cashier_protocol::codec::{Decoder, Encoder};
///
/// let bytes = Encoder::new().uint(5).bool(true).string("ok").finish();
/// let mut d = Decoder::new(&bytes);
/// assert_eq!(d.uint().unwrap(), 5);
/// assert!(d.bool().unwrap());
/// assert_eq!(d.string().unwrap(), "ok");
/// d.finish().unwrap();
/// ```
#[derive(Debug, Default, Clone)]
pub struct Encoder {
    buf: Vec<u8>,
}

impl Encoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Unsigned integer as a 32-byte big-endian word.
    pub fn uint(mut self, value: u128) -> Self {
        self.buf.extend_from_slice(&[0u8; UINT_WORD_LENGTH - 16]);
        self.buf.extend_from_slice(&value.to_be_bytes());
        self
    }

    pub fn address(mut self, account: &AccountId) -> Self {
        self.buf.extend_from_slice(account.as_bytes());
        self
    }

    /// Fixed-width bytes (`bytes2`, `bytes32`, ...).
    pub fn fixed<const N: usize>(mut self, value: &[u8; N]) -> Self {
        self.buf.extend_from_slice(value);
        self
    }

    pub fn bool(mut self, value: bool) -> Self {
        self.buf.push(u8::from(value));
        self
    }

    /// Length-prefixed bytes. Fields are bounded well below 4 GiB.
    pub fn bytes(mut self, value: &[u8]) -> Self {
        debug_assert!(u32::try_from(value.len()).is_ok());
        self.buf.extend_from_slice(&(value.len() as u32).to_be_bytes());
        self.buf.extend_from_slice(value);
        self
    }

    pub fn string(self, value: &str) -> Self {
        self.bytes(value.as_bytes())
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}

/// Reads fields back in the order they were written.
#[derive(Debug)]
pub struct Decoder<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        if self.remaining() < n {
            return Err(CodecError::UnexpectedEnd {
                needed: n,
                remaining: self.remaining(),
            });
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn uint(&mut self) -> Result<u128, CodecError> {
        let word = self.take(UINT_WORD_LENGTH)?;
        let (high, low) = word.split_at(UINT_WORD_LENGTH - 16);
        if high.iter().any(|b| *b != 0) {
            return Err(CodecError::ValueOutOfRange { bits: 128 });
        }
        let mut arr = [0u8; 16];
        arr.copy_from_slice(low);
        Ok(u128::from_be_bytes(arr))
    }

    /// A `uint` word that must also fit in a `u64` (nonces, timestamps, ids).
    pub fn uint64(&mut self) -> Result<u64, CodecError> {
        let value = self.uint()?;
        u64::try_from(value).map_err(|_| CodecError::ValueOutOfRange { bits: 64 })
    }

    /// Read a `uint` word and require it to equal `expected`.
    pub fn tag(&mut self, expected: u128) -> Result<(), CodecError> {
        match self.uint()? {
            found if found == expected => Ok(()),
            found => Err(CodecError::UnexpectedTag { expected, found }),
        }
    }

    pub fn address(&mut self) -> Result<AccountId, CodecError> {
        let bytes = self.take(ACCOUNT_ID_LENGTH)?;
        let mut arr = [0u8; ACCOUNT_ID_LENGTH];
        arr.copy_from_slice(bytes);
        Ok(AccountId::new(arr))
    }

    pub fn fixed<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
        let bytes = self.take(N)?;
        let mut arr = [0u8; N];
        arr.copy_from_slice(bytes);
        Ok(arr)
    }

    pub fn bool(&mut self) -> Result<bool, CodecError> {
        match self.take(1)?[0] {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(CodecError::InvalidBool(other)),
        }
    }

    pub fn bytes(&mut self) -> Result<Vec<u8>, CodecError> {
        let len: [u8; 4] = self.fixed()?;
        let len = u32::from_be_bytes(len) as usize;
        Ok(self.take(len)?.to_vec())
    }

    pub fn string(&mut self) -> Result<String, CodecError> {
        String::from_utf8(self.bytes()?).map_err(|_| CodecError::InvalidUtf8)
    }

    /// Succeeds only if every byte has been consumed.
    pub fn finish(self) -> Result<(), CodecError> {
        match self.remaining() {
            0 => Ok(()),
            n => Err(CodecError::TrailingBytes(n)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uint_is_32_byte_big_endian() {
        let bytes = Encoder::new().uint(0x0102).finish();
        assert_eq!(bytes.len(), 32);
        assert!(bytes[..30].iter().all(|b| *b == 0));
        assert_eq!(&bytes[30..], &[0x01, 0x02]);
    }

    #[test]
    fn test_mixed_fields_decode_in_order() {
        let who = AccountId::new([0x33; 20]);
        let bytes = Encoder::new()
            .address(&who)
            .uint(u128::MAX)
            .fixed(&[0xAA, 0xBB])
            .bytes(&[1, 2, 3])
            .string("ipfs://token")
            .finish();

        let mut d = Decoder::new(&bytes);
        assert_eq!(d.address().unwrap(), who);
        assert_eq!(d.uint().unwrap(), u128::MAX);
        assert_eq!(d.fixed::<2>().unwrap(), [0xAA, 0xBB]);
        assert_eq!(d.bytes().unwrap(), vec![1, 2, 3]);
        assert_eq!(d.string().unwrap(), "ipfs://token");
        d.finish().unwrap();
    }

    #[test]
    fn test_uint_above_u128_rejected() {
        let mut word = [0u8; 32];
        word[15] = 1;
        let err = Decoder::new(&word).uint().unwrap_err();
        assert_eq!(err, CodecError::ValueOutOfRange { bits: 128 });
    }

    #[test]
    fn test_uint64_range() {
        let bytes = Encoder::new().uint(u64::MAX as u128 + 1).finish();
        let err = Decoder::new(&bytes).uint64().unwrap_err();
        assert_eq!(err, CodecError::ValueOutOfRange { bits: 64 });

        let bytes = Encoder::new().uint(42).finish();
        assert_eq!(Decoder::new(&bytes).uint64().unwrap(), 42);
    }

    #[test]
    fn test_truncated_payload() {
        let bytes = Encoder::new().uint(1).finish();
        let err = Decoder::new(&bytes[..20]).uint().unwrap_err();
        assert_eq!(err, CodecError::UnexpectedEnd { needed: 32, remaining: 20 });
    }

    #[test]
    fn test_length_prefix_beyond_data() {
        let mut bytes = Encoder::new().bytes(&[9; 4]).finish();
        bytes.truncate(6);
        assert!(matches!(
            Decoder::new(&bytes).bytes(),
            Err(CodecError::UnexpectedEnd { needed: 4, remaining: 2 })
        ));
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let mut bytes = Encoder::new().bool(false).finish();
        bytes.push(0);
        let mut d = Decoder::new(&bytes);
        assert!(!d.bool().unwrap());
        assert_eq!(d.finish().unwrap_err(), CodecError::TrailingBytes(1));
    }

    #[test]
    fn test_non_canonical_bool_rejected() {
        assert_eq!(Decoder::new(&[2]).bool().unwrap_err(), CodecError::InvalidBool(2));
    }

    #[test]
    fn test_invalid_utf8_rejected() {
        let bytes = Encoder::new().bytes(&[0xFF, 0xFE]).finish();
        assert_eq!(Decoder::new(&bytes).string().unwrap_err(), CodecError::InvalidUtf8);
    }

    #[test]
    fn test_tag_must_match() {
        let bytes = Encoder::new().uint(2).finish();
        Decoder::new(&bytes).tag(2).unwrap();
        assert_eq!(
            Decoder::new(&bytes).tag(1).unwrap_err(),
            CodecError::UnexpectedTag { expected: 1, found: 2 }
        );
    }
}
