//! # Signed Instructions
//!
//! What a holder (or provider) actually signs. Each instruction is encoded
//! with the protocol codec, opens with a `uint` operation tag and always
//! ends with `(nonce, ledger)`. The tag stops a signature given for one
//! operation being replayed as another, the nonce makes it single-use, and
//! the ledger address pins it to one ledger instance.
//!
//! | Instruction   | Tag | Fields after the tag (in order)                                  |
//! |---------------|-----|------------------------------------------------------------------|
//! | deposit       | 1   | `uint amount, uint nonce, address ledger`                        |
//! | withdraw      | 2   | `uint amount, uint nonce, address ledger`                        |
//! | payment       | 3   | `address receiver, uint amount, uint payment_id, uint nonce, address ledger` |
//! | nft mint      | 4   | `address holder, uint nonce, bytes settings, bytes settings_sig, bytes attestation, bytes attestation_sig, address ledger` |
//! | nft transfer  | 5   | `address to, uint token_id, uint nonce, address ledger`          |

use cashier_protocol::codec::{CodecError, Decoder, Encoder};
use cashier_protocol::crypto::{CashierKeypair, KeyError, RecoverableSignature};
use cashier_protocol::types::{AccountId, Amount};
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Payload trait
// ---------------------------------------------------------------------------

/// Anything with a canonical byte encoding that someone signs.
pub trait Payload: Sized {
    fn encode(&self) -> Vec<u8>;

    fn decode(bytes: &[u8]) -> Result<Self, CodecError>;

    /// Encode and sign under the personal-message convention.
    fn sign(&self, keypair: &CashierKeypair) -> Result<SignedPayload, KeyError> {
        let payload = self.encode();
        let signature = keypair.sign_message(&payload)?;
        Ok(SignedPayload { payload, signature })
    }
}

/// Encoded payload bytes plus the signature over them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedPayload {
    pub payload: Vec<u8>,
    pub signature: RecoverableSignature,
}

/// Instructions that carry a replay nonce and a ledger binding.
pub trait Instruction: Payload {
    const OPERATION: Operation;

    fn nonce(&self) -> u64;

    fn ledger(&self) -> AccountId;
}

/// Operation names, used for logging, metrics labels and events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Deposit,
    Withdraw,
    Payment,
    NftMint,
    NftTransfer,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Deposit => "deposit",
            Operation::Withdraw => "withdraw",
            Operation::Payment => "payment",
            Operation::NftMint => "nft_mint",
            Operation::NftTransfer => "nft_transfer",
        }
    }

    /// Leading word of every instruction payload for this operation.
    pub fn tag(&self) -> u128 {
        match self {
            Operation::Deposit => 1,
            Operation::Withdraw => 2,
            Operation::Payment => 3,
            Operation::NftMint => 4,
            Operation::NftTransfer => 5,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Instructions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepositInstruction {
    pub amount: Amount,
    pub nonce: u64,
    pub ledger: AccountId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WithdrawInstruction {
    pub amount: Amount,
    pub nonce: u64,
    pub ledger: AccountId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentInstruction {
    pub receiver: AccountId,
    pub amount: Amount,
    /// Opaque reference the receiver uses to match the payment to an invoice.
    pub payment_id: u128,
    pub nonce: u64,
    pub ledger: AccountId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NftTransferInstruction {
    pub to: AccountId,
    pub token_id: u64,
    pub nonce: u64,
    pub ledger: AccountId,
}

/// Signed by the provider. Carries the provider's own signed settings and
/// attestation documents verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NftMintInstruction {
    pub holder: AccountId,
    pub nonce: u64,
    pub settings: Vec<u8>,
    pub settings_signature: Vec<u8>,
    pub attestation: Vec<u8>,
    pub attestation_signature: Vec<u8>,
    pub ledger: AccountId,
}

fn tagged(operation: Operation) -> Encoder {
    Encoder::new().uint(operation.tag())
}

fn encode_amount_nonce_ledger(
    operation: Operation,
    amount: Amount,
    nonce: u64,
    ledger: &AccountId,
) -> Vec<u8> {
    tagged(operation)
        .uint(amount)
        .uint(u128::from(nonce))
        .address(ledger)
        .finish()
}

fn decode_amount_nonce_ledger(
    operation: Operation,
    bytes: &[u8],
) -> Result<(Amount, u64, AccountId), CodecError> {
    let mut d = Decoder::new(bytes);
    d.tag(operation.tag())?;
    let fields = (d.uint()?, d.uint64()?, d.address()?);
    d.finish()?;
    Ok(fields)
}

impl Payload for DepositInstruction {
    fn encode(&self) -> Vec<u8> {
        encode_amount_nonce_ledger(Self::OPERATION, self.amount, self.nonce, &self.ledger)
    }

    fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        let (amount, nonce, ledger) = decode_amount_nonce_ledger(Self::OPERATION, bytes)?;
        Ok(Self { amount, nonce, ledger })
    }
}

impl Instruction for DepositInstruction {
    const OPERATION: Operation = Operation::Deposit;

    fn nonce(&self) -> u64 {
        self.nonce
    }

    fn ledger(&self) -> AccountId {
        self.ledger
    }
}

impl Payload for WithdrawInstruction {
    fn encode(&self) -> Vec<u8> {
        encode_amount_nonce_ledger(Self::OPERATION, self.amount, self.nonce, &self.ledger)
    }

    fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        let (amount, nonce, ledger) = decode_amount_nonce_ledger(Self::OPERATION, bytes)?;
        Ok(Self { amount, nonce, ledger })
    }
}

impl Instruction for WithdrawInstruction {
    const OPERATION: Operation = Operation::Withdraw;

    fn nonce(&self) -> u64 {
        self.nonce
    }

    fn ledger(&self) -> AccountId {
        self.ledger
    }
}

impl Payload for PaymentInstruction {
    fn encode(&self) -> Vec<u8> {
        tagged(Self::OPERATION)
            .address(&self.receiver)
            .uint(self.amount)
            .uint(self.payment_id)
            .uint(u128::from(self.nonce))
            .address(&self.ledger)
            .finish()
    }

    fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        let mut d = Decoder::new(bytes);
        d.tag(Self::OPERATION.tag())?;
        let payment = Self {
            receiver: d.address()?,
            amount: d.uint()?,
            payment_id: d.uint()?,
            nonce: d.uint64()?,
            ledger: d.address()?,
        };
        d.finish()?;
        Ok(payment)
    }
}

impl Instruction for PaymentInstruction {
    const OPERATION: Operation = Operation::Payment;

    fn nonce(&self) -> u64 {
        self.nonce
    }

    fn ledger(&self) -> AccountId {
        self.ledger
    }
}

impl Payload for NftTransferInstruction {
    fn encode(&self) -> Vec<u8> {
        tagged(Self::OPERATION)
            .address(&self.to)
            .uint(u128::from(self.token_id))
            .uint(u128::from(self.nonce))
            .address(&self.ledger)
            .finish()
    }

    fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        let mut d = Decoder::new(bytes);
        d.tag(Self::OPERATION.tag())?;
        let transfer = Self {
            to: d.address()?,
            token_id: d.uint64()?,
            nonce: d.uint64()?,
            ledger: d.address()?,
        };
        d.finish()?;
        Ok(transfer)
    }
}

impl Instruction for NftTransferInstruction {
    const OPERATION: Operation = Operation::NftTransfer;

    fn nonce(&self) -> u64 {
        self.nonce
    }

    fn ledger(&self) -> AccountId {
        self.ledger
    }
}

impl NftMintInstruction {
    /// Assemble a mint instruction from the provider's two signed documents.
    pub fn new(
        holder: AccountId,
        nonce: u64,
        settings: SignedPayload,
        attestation: SignedPayload,
        ledger: AccountId,
    ) -> Self {
        Self {
            holder,
            nonce,
            settings: settings.payload,
            settings_signature: settings.signature.as_bytes().to_vec(),
            attestation: attestation.payload,
            attestation_signature: attestation.signature.as_bytes().to_vec(),
            ledger,
        }
    }
}

impl Payload for NftMintInstruction {
    fn encode(&self) -> Vec<u8> {
        tagged(Self::OPERATION)
            .address(&self.holder)
            .uint(u128::from(self.nonce))
            .bytes(&self.settings)
            .bytes(&self.settings_signature)
            .bytes(&self.attestation)
            .bytes(&self.attestation_signature)
            .address(&self.ledger)
            .finish()
    }

    fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        let mut d = Decoder::new(bytes);
        d.tag(Self::OPERATION.tag())?;
        let mint = Self {
            holder: d.address()?,
            nonce: d.uint64()?,
            settings: d.bytes()?,
            settings_signature: d.bytes()?,
            attestation: d.bytes()?,
            attestation_signature: d.bytes()?,
            ledger: d.address()?,
        };
        d.finish()?;
        Ok(mint)
    }
}

impl Instruction for NftMintInstruction {
    const OPERATION: Operation = Operation::NftMint;

    fn nonce(&self) -> u64 {
        self.nonce
    }

    fn ledger(&self) -> AccountId {
        self.ledger
    }
}
