//! # Attestation Verifier
//!
//! A provider (the party vouching for something) publishes two signed
//! documents:
//!
//! - **NFT settings**: what kind of credential, its price, who provides it,
//!   and when the offer stops being valid.
//! - **Attestation data**: the concrete claim. It names the relay
//!   ("engine") allowed to present it, a hash-key array and a hashed-data
//!   commitment, the token URI the credential will carry, and the same type
//!   tag as the settings.
//!
//! Both are signed under the personal-message convention with the
//! provider's key. The functions here decode, recover and compare; none of
//! them hold state, and none of them decide policy beyond "is this document
//! authentic and still valid". The ledger combines the answers.

use cashier_protocol::codec::{CodecError, Decoder, Encoder};
use cashier_protocol::crypto::{keccak256_concat, recover_signer, RecoverableSignature};
use cashier_protocol::types::{AccountId, Amount, Hash32};
use serde::{Deserialize, Serialize};

use crate::error::LedgerResult;
use crate::instruction::Payload;

/// Two-byte credential type tag.
pub type NftType = [u8; 2];

// ---------------------------------------------------------------------------
// Documents
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NftSettings {
    pub provider: AccountId,
    pub price: Amount,
    pub nft_type: NftType,
    /// Unix seconds. The offer is valid while `now < expiration`.
    pub expiration: u64,
}

impl Payload for NftSettings {
    fn encode(&self) -> Vec<u8> {
        Encoder::new()
            .address(&self.provider)
            .uint(self.price)
            .fixed(&self.nft_type)
            .uint(u128::from(self.expiration))
            .finish()
    }

    fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        let mut d = Decoder::new(bytes);
        let settings = Self {
            provider: d.address()?,
            price: d.uint()?,
            nft_type: d.fixed()?,
            expiration: d.uint64()?,
        };
        d.finish()?;
        Ok(settings)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttestationData {
    pub provider: AccountId,
    /// The relay this attestation was issued to.
    pub engine: AccountId,
    pub hash_key_array: Hash32,
    pub token_uri: String,
    pub hashed_data: Hash32,
    pub nft_type: NftType,
}

impl Payload for AttestationData {
    fn encode(&self) -> Vec<u8> {
        Encoder::new()
            .address(&self.provider)
            .address(&self.engine)
            .fixed(&self.hash_key_array)
            .string(&self.token_uri)
            .fixed(&self.hashed_data)
            .fixed(&self.nft_type)
            .finish()
    }

    fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        let mut d = Decoder::new(bytes);
        let data = Self {
            provider: d.address()?,
            engine: d.address()?,
            hash_key_array: d.fixed()?,
            token_uri: d.string()?,
            hashed_data: d.fixed()?,
            nft_type: d.fixed()?,
        };
        d.finish()?;
        Ok(data)
    }
}

/// Decoded settings together with the verdict on their signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitSettings {
    pub provider: AccountId,
    pub price: Amount,
    pub settings: NftSettings,
    /// The recovered signer equals `settings.provider`.
    pub is_valid: bool,
}

/// Decoded attestation data together with the verdict on its signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitAttestation {
    /// Signed by the expected provider, and names that provider.
    pub is_valid: bool,
    pub engine: AccountId,
    pub data: AttestationData,
}

// ---------------------------------------------------------------------------
// Verification
// ---------------------------------------------------------------------------

/// Recover the signer of `message` and compare with `expected`.
///
/// Malformed signatures are errors; a wrong signer is `Ok(false)`.
pub fn verify_signature(
    message: &[u8],
    signature: &[u8],
    expected: &AccountId,
) -> LedgerResult<bool> {
    let signature = RecoverableSignature::from_slice(signature)?;
    Ok(recover_signer(message, &signature)? == *expected)
}

/// Is `signature` the `claimed` provider's signature over these settings?
pub fn verify_nft_settings(
    settings: &NftSettings,
    signature: &[u8],
    claimed: &AccountId,
) -> LedgerResult<bool> {
    verify_signature(&settings.encode(), signature, claimed)
}

/// Settings are live strictly before their expiration instant.
pub fn verify_expiration(settings: &NftSettings, now: u64) -> bool {
    settings.expiration > now
}

/// Decode encoded settings and check they were signed by the provider they
/// name.
pub fn split_and_verify(encoded: &[u8], signature: &[u8]) -> LedgerResult<SplitSettings> {
    let settings = NftSettings::decode(encoded)?;
    let is_valid = verify_signature(encoded, signature, &settings.provider)?;
    Ok(SplitSettings {
        provider: settings.provider,
        price: settings.price,
        settings,
        is_valid,
    })
}

/// Decode attestation data and check it was signed by `provider` and names
/// `provider` as its issuer.
pub fn split_attestation_data(
    provider: &AccountId,
    encoded: &[u8],
    signature: &[u8],
) -> LedgerResult<SplitAttestation> {
    let data = AttestationData::decode(encoded)?;
    let signed = verify_signature(encoded, signature, provider)?;
    Ok(SplitAttestation {
        is_valid: signed && data.provider == *provider,
        engine: data.engine,
        data,
    })
}

/// Identity of one (settings, attestation) pair. A pair can back at most one
/// credential.
pub fn invoice_id(encoded_settings: &[u8], encoded_attestation: &[u8]) -> Hash32 {
    let settings_len = (encoded_settings.len() as u64).to_be_bytes();
    let attestation_len = (encoded_attestation.len() as u64).to_be_bytes();
    keccak256_concat(&[
        &settings_len,
        encoded_settings,
        &attestation_len,
        encoded_attestation,
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use cashier_protocol::crypto::CashierKeypair;

    fn provider() -> CashierKeypair {
        CashierKeypair::from_seed(&[0x70; 32]).unwrap()
    }

    fn settings(expiration: u64) -> NftSettings {
        NftSettings {
            provider: provider().account_id(),
            price: 1,
            nft_type: [0x00, 0x01],
            expiration,
        }
    }

    fn attestation() -> AttestationData {
        AttestationData {
            provider: provider().account_id(),
            engine: AccountId::new([0xE0; 20]),
            hash_key_array: [0x01; 32],
            token_uri: "https://attest.example/token/1".into(),
            hashed_data: [0x02; 32],
            nft_type: [0x00, 0x01],
        }
    }

    #[test]
    fn test_settings_signed_by_provider() {
        let s = settings(2_000);
        let signed = s.sign(&provider()).unwrap();
        let split = split_and_verify(&signed.payload, signed.signature.as_bytes()).unwrap();
        assert!(split.is_valid);
        assert_eq!(split.provider, provider().account_id());
        assert_eq!(split.price, 1);
        assert_eq!(split.settings, s);
        assert!(verify_nft_settings(&s, signed.signature.as_bytes(), &provider().account_id()).unwrap());
    }

    #[test]
    fn test_settings_signed_by_someone_else() {
        let impostor = CashierKeypair::from_seed(&[0x71; 32]).unwrap();
        let signed = settings(2_000).sign(&impostor).unwrap();
        let split = split_and_verify(&signed.payload, signed.signature.as_bytes()).unwrap();
        assert!(!split.is_valid);
    }

    #[test]
    fn test_expiration_is_strict() {
        let s = settings(1_000);
        assert!(verify_expiration(&s, 999));
        assert!(!verify_expiration(&s, 1_000));
        assert!(!verify_expiration(&s, 1_001));
    }

    #[test]
    fn test_attestation_split_reports_engine() {
        let signed = attestation().sign(&provider()).unwrap();
        let split = split_attestation_data(
            &provider().account_id(),
            &signed.payload,
            signed.signature.as_bytes(),
        )
        .unwrap();
        assert!(split.is_valid);
        assert_eq!(split.engine, AccountId::new([0xE0; 20]));
        assert_eq!(split.data.token_uri, "https://attest.example/token/1");
    }

    #[test]
    fn test_attestation_naming_other_provider_is_invalid() {
        let mut data = attestation();
        data.provider = AccountId::new([0x99; 20]);
        let signed = data.sign(&provider()).unwrap();
        let split = split_attestation_data(
            &provider().account_id(),
            &signed.payload,
            signed.signature.as_bytes(),
        )
        .unwrap();
        assert!(!split.is_valid);
    }

    #[test]
    fn test_malformed_signature_is_error() {
        let encoded = settings(5).encode();
        assert!(split_and_verify(&encoded, &[0u8; 10]).is_err());
    }

    #[test]
    fn test_garbage_settings_rejected() {
        assert!(split_and_verify(&[1, 2, 3], &[0u8; 65]).is_err());
    }

    #[test]
    fn test_invoice_id_separates_fields() {
        // Moving a byte from one document to the other changes the id.
        assert_ne!(invoice_id(b"ab", b"c"), invoice_id(b"a", b"bc"));
        assert_eq!(invoice_id(b"ab", b"c"), invoice_id(b"ab", b"c"));
    }
}
