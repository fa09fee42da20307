//! Shared fixture for the ledger integration tests.
//!
//! One ledger at `0xC0..`, governed by `0x60..`, backed by an in-memory
//! PMTN at `0xAA..` and a credential authority at `0x77..`. Two holders
//! with real keys, a provider with a real key, and a relay whose work
//! nonce is already solved.

#![allow(dead_code)]

use std::sync::Arc;

use cashier_contracts::asset::{AssetBridge, InMemoryAsset};
use cashier_contracts::attestation::{AttestationData, NftSettings};
use cashier_contracts::clock::FixedClock;
use cashier_contracts::fees::FeeConfiguration;
use cashier_contracts::instruction::{
    DepositInstruction, NftMintInstruction, NftTransferInstruction, PaymentInstruction,
    WithdrawInstruction,
};
use cashier_contracts::{CredentialAuthority, Ledger, LedgerState, Payload, SignedPayload};
use cashier_protocol::crypto::CashierKeypair;
use cashier_protocol::types::{AccountId, Amount};
use cashier_protocol::work::solve_work;

pub const ONE: Amount = 1_000_000_000_000_000_000;
pub const START: u64 = 1_700_000_000;

pub fn acct(b: u8) -> AccountId {
    AccountId::new([b; 20])
}

pub fn ledger_address() -> AccountId {
    acct(0xC0)
}

pub fn governance() -> AccountId {
    acct(0x60)
}

pub fn fee_engine() -> AccountId {
    acct(0xFE)
}

pub fn asset_address() -> AccountId {
    acct(0xAA)
}

pub fn trust_address() -> AccountId {
    acct(0x77)
}

pub struct World {
    pub ledger: Ledger<InMemoryAsset>,
    pub clock: Arc<FixedClock>,
    pub alice: CashierKeypair,
    pub bob: CashierKeypair,
    pub provider: CashierKeypair,
    pub relay: AccountId,
    pub relay_nonce: u64,
}

/// 0.1% to the treasury and 0.1% to the relay, difficulty one byte, each
/// holder starting with 10 PMTN in the wallet and an unlimited allowance.
pub fn world() -> World {
    world_with(FeeConfiguration {
        cashier_percentage: ONE / 1000,
        engine_percentage: ONE / 1000,
        ..FeeConfiguration::default()
    })
}

pub fn world_with(config: FeeConfiguration) -> World {
    let alice = CashierKeypair::from_seed(&[0xA1; 32]).unwrap();
    let bob = CashierKeypair::from_seed(&[0xB0; 32]).unwrap();
    let provider = CashierKeypair::from_seed(&[0x70; 32]).unwrap();
    let relay = acct(0xE0);

    let mut asset = InMemoryAsset::new(asset_address(), "PMTN");
    for holder in [&alice, &bob] {
        asset.mint(&holder.account_id(), 10 * ONE).unwrap();
        asset
            .approve(&holder.account_id(), &ledger_address(), u128::MAX)
            .unwrap();
    }

    let clock = Arc::new(FixedClock::new(START));
    let state = LedgerState::new(ledger_address(), governance(), fee_engine(), config);
    let credentials = CredentialAuthority::new(trust_address(), governance(), ledger_address());
    let mut ledger = Ledger::new(state, asset, credentials, clock.clone());
    ledger
        .set_erc20_token_address(&governance(), asset_address())
        .unwrap();
    ledger
        .set_trust_token_address(&governance(), trust_address())
        .unwrap();
    ledger.take_changes();

    let relay_nonce = solve_work(&relay, config.leading_zero_bytes, 0, 10_000_000).unwrap();
    World {
        ledger,
        clock,
        alice,
        bob,
        provider,
        relay,
        relay_nonce,
    }
}

/// Payload bytes and raw signature bytes, the way a relay receives them.
pub fn wire(signed: SignedPayload) -> (Vec<u8>, Vec<u8>) {
    (signed.payload, signed.signature.as_bytes().to_vec())
}

pub fn signed_deposit(w: &World, who: &CashierKeypair, amount: Amount, nonce: u64) -> (Vec<u8>, Vec<u8>) {
    wire(
        DepositInstruction {
            amount,
            nonce,
            ledger: w.ledger.address(),
        }
        .sign(who)
        .unwrap(),
    )
}

pub fn signed_withdraw(w: &World, who: &CashierKeypair, amount: Amount, nonce: u64) -> (Vec<u8>, Vec<u8>) {
    wire(
        WithdrawInstruction {
            amount,
            nonce,
            ledger: w.ledger.address(),
        }
        .sign(who)
        .unwrap(),
    )
}

pub fn signed_payment(
    w: &World,
    who: &CashierKeypair,
    receiver: AccountId,
    amount: Amount,
    payment_id: u128,
    nonce: u64,
) -> (Vec<u8>, Vec<u8>) {
    wire(
        PaymentInstruction {
            receiver,
            amount,
            payment_id,
            nonce,
            ledger: w.ledger.address(),
        }
        .sign(who)
        .unwrap(),
    )
}

pub fn signed_transfer(
    w: &World,
    who: &CashierKeypair,
    to: AccountId,
    token_id: u64,
    nonce: u64,
) -> (Vec<u8>, Vec<u8>) {
    wire(
        NftTransferInstruction {
            to,
            token_id,
            nonce,
            ledger: w.ledger.address(),
        }
        .sign(who)
        .unwrap(),
    )
}

pub fn settings(w: &World, expiration: u64) -> NftSettings {
    NftSettings {
        provider: w.provider.account_id(),
        price: 5 * ONE,
        nft_type: *b"KY",
        expiration,
    }
}

pub fn attestation(w: &World, engine: AccountId) -> AttestationData {
    AttestationData {
        provider: w.provider.account_id(),
        engine,
        hash_key_array: [0x0A; 32],
        token_uri: "ipfs://bafy-kyc-level-2".into(),
        hashed_data: [0x0D; 32],
        nft_type: *b"KY",
    }
}

/// A provider-signed mint instruction for `holder`.
pub fn signed_mint(
    w: &World,
    holder: AccountId,
    settings: &NftSettings,
    attestation: &AttestationData,
    nonce: u64,
) -> (Vec<u8>, Vec<u8>) {
    let instruction = NftMintInstruction::new(
        holder,
        nonce,
        settings.sign(&w.provider).unwrap(),
        attestation.sign(&w.provider).unwrap(),
        w.ledger.address(),
    );
    wire(instruction.sign(&w.provider).unwrap())
}

impl World {
    /// Relay a deposit of `amount` for `who` with their next nonce.
    pub fn fund(&mut self, who: &CashierKeypair, amount: Amount) {
        let nonce = self.ledger.last_nonce(&who.account_id()) + 1;
        let (payload, sig) = signed_deposit(self, who, amount, nonce);
        self.ledger
            .relay_deposit(&self.relay, self.relay_nonce, &who.account_id(), &payload, &sig)
            .unwrap();
    }
}

/// Internal balances sum to what the ledger holds in the settlement asset.
pub fn assert_conserved(w: &World) {
    let internal = w.ledger.state().total_balances().unwrap();
    let held = w.ledger.asset().balance_of(&w.ledger.address());
    assert_eq!(internal, held, "internal balances drifted from asset holdings");
}
