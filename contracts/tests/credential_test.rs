//! Integration tests for credential minting and transfer.
//!
//! A provider signs an offer (settings) and a claim (attestation), wraps both
//! in a mint instruction signed with its own key, and a relay submits it.
//! These tests walk that path and every way it can be refused.

mod common;

use cashier_contracts::attestation::invoice_id;
use cashier_contracts::instruction::NftMintInstruction;
use cashier_contracts::{Collaborator, CredentialError, LedgerError, LedgerEvent, Payload};

use common::*;

fn mint_for_alice(w: &mut World) -> u64 {
    let s = settings(w, START + 3_600);
    let a = attestation(w, w.relay);
    let nonce = w.ledger.last_nonce(&w.provider.account_id()) + 1;
    let (payload, sig) = signed_mint(w, w.alice.account_id(), &s, &a, nonce);
    let provider = w.provider.account_id();
    w.ledger
        .nft_mint(&w.relay, w.relay_nonce, &provider, &payload, &sig)
        .unwrap()
        .token_id
}

// ---------------------------------------------------------------------------
// Minting
// ---------------------------------------------------------------------------

#[test]
fn valid_attestation_mints_to_the_holder() {
    let mut w = world();
    let provider = w.provider.account_id();
    let alice = w.alice.account_id();
    let s = settings(&w, START + 3_600);
    let a = attestation(&w, w.relay);
    let (payload, sig) = signed_mint(&w, alice, &s, &a, 1);

    let receipt = w
        .ledger
        .nft_mint(&w.relay, w.relay_nonce, &provider, &payload, &sig)
        .unwrap();

    assert_eq!(receipt.token_id, 1);
    assert_eq!(receipt.holder, alice);
    assert_eq!(receipt.invoice, invoice_id(&s.encode(), &a.encode()));
    assert_eq!(w.ledger.credentials().owner_of(1), Ok(alice));
    assert_eq!(
        w.ledger.credentials().token_uri(1),
        Ok("ipfs://bafy-kyc-level-2")
    );
    assert!(w.ledger.is_invoice_consumed(&receipt.invoice));
    assert_eq!(w.ledger.last_nonce(&provider), 1);

    let token = w.ledger.credentials().token(1).unwrap();
    assert_eq!(token.provider, provider);
    assert_eq!(token.nft_type, *b"KY");
    assert_eq!(token.minted_at, START);

    let changes = w.ledger.take_changes();
    assert!(changes.invoices.contains(&receipt.invoice));
    assert!(changes.tokens.contains(&1));
    assert!(matches!(
        changes.events.as_slice(),
        [LedgerEvent::TokenMinted { token_id: 1, price, .. }] if *price == 5 * ONE
    ));
}

#[test]
fn minting_moves_no_money() {
    let mut w = world();
    w.fund(&w.alice.clone(), ONE);
    let before = w.ledger.state().balances.clone();
    mint_for_alice(&mut w);
    assert_eq!(w.ledger.state().balances, before);
}

#[test]
fn same_invoice_mints_only_once() {
    let mut w = world();
    let provider = w.provider.account_id();
    let alice = w.alice.account_id();
    let s = settings(&w, START + 3_600);
    let a = attestation(&w, w.relay);

    let (payload, sig) = signed_mint(&w, alice, &s, &a, 1);
    let first = w
        .ledger
        .nft_mint(&w.relay, w.relay_nonce, &provider, &payload, &sig)
        .unwrap();

    // A fresh nonce gets past replay protection; the invoice still stops it.
    let (payload, sig) = signed_mint(&w, alice, &s, &a, 2);
    let err = w
        .ledger
        .nft_mint(&w.relay, w.relay_nonce, &provider, &payload, &sig)
        .unwrap_err();

    assert_eq!(err, LedgerError::AlreadyConsumed(first.invoice));
    assert_eq!(w.ledger.credentials().total_supply(), 1);
    assert_eq!(w.ledger.last_nonce(&provider), 1);
}

#[test]
fn expired_settings_are_refused() {
    let mut w = world();
    let provider = w.provider.account_id();
    let s = settings(&w, START - 1);
    let a = attestation(&w, w.relay);
    let (payload, sig) = signed_mint(&w, w.alice.account_id(), &s, &a, 1);

    let err = w
        .ledger
        .nft_mint(&w.relay, w.relay_nonce, &provider, &payload, &sig)
        .unwrap_err();
    assert_eq!(
        err,
        LedgerError::Expired {
            expiration: START - 1,
            now: START
        }
    );
    assert_eq!(w.ledger.credentials().total_supply(), 0);
}

#[test]
fn settings_expire_at_their_expiration_instant() {
    let mut w = world();
    let provider = w.provider.account_id();
    let s = settings(&w, START + 60);
    let a = attestation(&w, w.relay);
    let (payload, sig) = signed_mint(&w, w.alice.account_id(), &s, &a, 1);

    w.clock.set(START + 60);
    let err = w
        .ledger
        .nft_mint(&w.relay, w.relay_nonce, &provider, &payload, &sig)
        .unwrap_err();
    assert!(matches!(err, LedgerError::Expired { .. }));

    // One second earlier the same instruction is fine.
    w.clock.set(START + 59);
    w.ledger
        .nft_mint(&w.relay, w.relay_nonce, &provider, &payload, &sig)
        .unwrap();
}

#[test]
fn attestation_for_another_engine_is_refused() {
    let mut w = world();
    let provider = w.provider.account_id();
    let s = settings(&w, START + 3_600);
    let a = attestation(&w, acct(0xE9));
    let (payload, sig) = signed_mint(&w, w.alice.account_id(), &s, &a, 1);

    let err = w
        .ledger
        .nft_mint(&w.relay, w.relay_nonce, &provider, &payload, &sig)
        .unwrap_err();
    assert_eq!(
        err,
        LedgerError::EngineMismatch {
            named: acct(0xE9),
            caller: w.relay
        }
    );
}

#[test]
fn settings_signed_by_someone_else_are_refused() {
    let mut w = world();
    let provider = w.provider.account_id();
    let s = settings(&w, START + 3_600);
    let a = attestation(&w, w.relay);
    // Bob forges the offer; the provider's key only signs the envelope.
    let instruction = NftMintInstruction::new(
        w.alice.account_id(),
        1,
        s.sign(&w.bob).unwrap(),
        a.sign(&w.provider).unwrap(),
        w.ledger.address(),
    );
    let (payload, sig) = wire(instruction.sign(&w.provider).unwrap());

    let err = w
        .ledger
        .nft_mint(&w.relay, w.relay_nonce, &provider, &payload, &sig)
        .unwrap_err();
    assert_eq!(
        err,
        LedgerError::InvalidSignature {
            expected: provider,
            recovered: w.bob.account_id()
        }
    );
}

#[test]
fn envelope_must_be_signed_by_the_provider() {
    let mut w = world();
    let provider = w.provider.account_id();
    let s = settings(&w, START + 3_600);
    let a = attestation(&w, w.relay);
    let instruction = NftMintInstruction::new(
        w.alice.account_id(),
        1,
        s.sign(&w.provider).unwrap(),
        a.sign(&w.provider).unwrap(),
        w.ledger.address(),
    );
    let (payload, sig) = wire(instruction.sign(&w.alice).unwrap());

    let err = w
        .ledger
        .nft_mint(&w.relay, w.relay_nonce, &provider, &payload, &sig)
        .unwrap_err();
    assert!(matches!(err, LedgerError::InvalidSignature { .. }));
}

#[test]
fn attestation_type_must_match_settings() {
    let mut w = world();
    let provider = w.provider.account_id();
    let s = settings(&w, START + 3_600);
    let mut a = attestation(&w, w.relay);
    a.nft_type = *b"AM";
    let (payload, sig) = signed_mint(&w, w.alice.account_id(), &s, &a, 1);

    let err = w
        .ledger
        .nft_mint(&w.relay, w.relay_nonce, &provider, &payload, &sig)
        .unwrap_err();
    assert!(matches!(err, LedgerError::AttestationMismatch(_)));
}

#[test]
fn unconfigured_trust_token_consumes_nothing() {
    let mut w = world();
    let provider = w.provider.account_id();
    w.ledger
        .set_trust_token_address(&governance(), acct(0x78))
        .unwrap();
    let s = settings(&w, START + 3_600);
    let a = attestation(&w, w.relay);
    let (payload, sig) = signed_mint(&w, w.alice.account_id(), &s, &a, 1);

    let err = w
        .ledger
        .nft_mint(&w.relay, w.relay_nonce, &provider, &payload, &sig)
        .unwrap_err();
    assert_eq!(
        err,
        LedgerError::CollaboratorNotConfigured(Collaborator::TrustToken)
    );
    assert!(!w.ledger.is_invoice_consumed(&invoice_id(&s.encode(), &a.encode())));
    assert_eq!(w.ledger.last_nonce(&provider), 0);
}

#[test]
fn token_ids_are_sequential() {
    let mut w = world();
    let first = mint_for_alice(&mut w);

    let provider = w.provider.account_id();
    let mut a = attestation(&w, w.relay);
    a.token_uri = "ipfs://bafy-kyc-level-3".into();
    let s = settings(&w, START + 3_600);
    let (payload, sig) = signed_mint(&w, w.bob.account_id(), &s, &a, 2);
    let second = w
        .ledger
        .nft_mint(&w.relay, w.relay_nonce, &provider, &payload, &sig)
        .unwrap();

    assert_eq!((first, second.token_id), (1, 2));
    assert_eq!(w.ledger.credentials().balance_of(&w.bob.account_id()), 1);
}

#[test]
fn only_authorities_mint_directly() {
    let w = world();
    let s = settings(&w, START + 3_600);
    let a = attestation(&w, w.relay);
    let mut authority = w.ledger.credentials().clone();
    let alice = w.alice.account_id();

    let err = authority.mint(&alice, &alice, &s, &a, START).unwrap_err();
    assert_eq!(err, CredentialError::Unauthorized { caller: alice });
    assert_eq!(authority.mint(&ledger_address(), &alice, &s, &a, START), Ok(1));
    // The clone is independent of the ledger's table.
    assert_eq!(w.ledger.credentials().total_supply(), 0);
}

// ---------------------------------------------------------------------------
// Transfers
// ---------------------------------------------------------------------------

#[test]
fn holder_signed_transfer_moves_the_token() {
    let mut w = world();
    let (alice, bob) = (w.alice.account_id(), w.bob.account_id());
    let id = mint_for_alice(&mut w);
    w.ledger.take_changes();

    let (payload, sig) = signed_transfer(&w, &w.alice, bob, id, 1);
    w.ledger
        .nft_transfer(&w.relay, w.relay_nonce, &alice, &payload, &sig)
        .unwrap();

    assert_eq!(w.ledger.credentials().owner_of(id), Ok(bob));
    assert_eq!(w.ledger.last_nonce(&alice), 1);
    let changes = w.ledger.take_changes();
    assert!(changes.tokens.contains(&id));
    assert!(matches!(
        changes.events.as_slice(),
        [LedgerEvent::TokenTransferred { from, to, .. }] if *from == alice && *to == bob
    ));
}

#[test]
fn previous_holder_cannot_transfer_again() {
    let mut w = world();
    let (alice, bob) = (w.alice.account_id(), w.bob.account_id());
    let id = mint_for_alice(&mut w);

    let (payload, sig) = signed_transfer(&w, &w.alice, bob, id, 1);
    w.ledger
        .nft_transfer(&w.relay, w.relay_nonce, &alice, &payload, &sig)
        .unwrap();

    let (payload, sig) = signed_transfer(&w, &w.alice, acct(0x44), id, 2);
    let err = w
        .ledger
        .nft_transfer(&w.relay, w.relay_nonce, &alice, &payload, &sig)
        .unwrap_err();
    assert_eq!(
        err,
        LedgerError::Credential(CredentialError::NotOwner {
            token_id: id,
            claimed: alice
        })
    );
    assert_eq!(w.ledger.last_nonce(&alice), 1);
    assert_eq!(w.ledger.credentials().owner_of(id), Ok(bob));
}

#[test]
fn unknown_token_cannot_move() {
    let mut w = world();
    let alice = w.alice.account_id();
    let (payload, sig) = signed_transfer(&w, &w.alice, acct(0x44), 99, 1);
    let err = w
        .ledger
        .nft_transfer(&w.relay, w.relay_nonce, &alice, &payload, &sig)
        .unwrap_err();
    assert_eq!(
        err,
        LedgerError::Credential(CredentialError::UnknownToken(99))
    );
}

#[test]
fn transfer_to_zero_account_is_refused() {
    let mut w = world();
    let alice = w.alice.account_id();
    let id = mint_for_alice(&mut w);
    let (payload, sig) = signed_transfer(&w, &w.alice, acct(0), id, 1);
    let err = w
        .ledger
        .nft_transfer(&w.relay, w.relay_nonce, &alice, &payload, &sig)
        .unwrap_err();
    assert_eq!(err, LedgerError::Credential(CredentialError::InvalidTarget));
    assert_eq!(w.ledger.credentials().owner_of(id), Ok(alice));
}

// ---------------------------------------------------------------------------
// Administration
// ---------------------------------------------------------------------------

#[test]
fn owner_of_the_trust_contract_can_transfer_it() {
    let mut w = world();
    let successor = acct(0x62);
    assert_eq!(w.ledger.credentials().owner(), governance());

    w.ledger
        .transfer_credential_ownership(&governance(), successor)
        .unwrap();

    assert_eq!(w.ledger.credentials().owner(), successor);
    // Ledger governance is a separate role and stays put.
    assert_eq!(w.ledger.owner(), governance());
    let changes = w.ledger.take_changes();
    assert!(changes.credential_admin);
    assert!(matches!(
        changes.events.as_slice(),
        [LedgerEvent::CredentialOwnershipTransferred { previous, new }]
            if *previous == governance() && *new == successor
    ));

    assert_eq!(
        w.ledger.grant_credential_authority(&governance(), acct(0x63)),
        Err(LedgerError::Credential(CredentialError::Unauthorized {
            caller: governance()
        }))
    );
    w.ledger
        .grant_credential_authority(&successor, acct(0x63))
        .unwrap();
    assert!(w.ledger.credentials().is_authority(&acct(0x63)));
}

#[test]
fn credential_ownership_refuses_strangers_and_the_zero_account() {
    let mut w = world();
    let intruder = acct(0x66);
    assert_eq!(
        w.ledger.transfer_credential_ownership(&intruder, intruder),
        Err(LedgerError::Credential(CredentialError::Unauthorized {
            caller: intruder
        }))
    );
    assert_eq!(
        w.ledger.transfer_credential_ownership(&governance(), acct(0)),
        Err(LedgerError::Credential(CredentialError::InvalidTarget))
    );
    assert_eq!(w.ledger.credentials().owner(), governance());
    assert!(w.ledger.take_changes().is_empty());
}

#[test]
fn revoking_the_ledger_authority_stops_relayed_mints() {
    let mut w = world();
    w.ledger
        .revoke_credential_authority(&governance(), ledger_address())
        .unwrap();
    assert!(!w.ledger.credentials().is_authority(&ledger_address()));
    w.ledger.take_changes();

    let provider = w.provider.account_id();
    let s = settings(&w, START + 3_600);
    let a = attestation(&w, w.relay);
    let (payload, sig) = signed_mint(&w, w.alice.account_id(), &s, &a, 1);
    let err = w
        .ledger
        .nft_mint(&w.relay, w.relay_nonce, &provider, &payload, &sig)
        .unwrap_err();
    assert_eq!(
        err,
        LedgerError::Credential(CredentialError::Unauthorized {
            caller: ledger_address()
        })
    );
    assert_eq!(w.ledger.last_nonce(&provider), 0);
    assert!(w.ledger.take_changes().is_empty());

    w.ledger
        .grant_credential_authority(&governance(), ledger_address())
        .unwrap();
    w.ledger
        .nft_mint(&w.relay, w.relay_nonce, &provider, &payload, &sig)
        .unwrap();
}

#[test]
fn holder_can_approve_an_operator() {
    let mut w = world();
    let alice = w.alice.account_id();
    let bob = w.bob.account_id();
    let id = mint_for_alice(&mut w);
    w.ledger.take_changes();

    assert_eq!(
        w.ledger.approve_credential(&bob, bob, id),
        Err(LedgerError::Credential(CredentialError::Unauthorized { caller: bob }))
    );
    w.ledger.approve_credential(&alice, bob, id).unwrap();
    assert_eq!(w.ledger.credentials().get_approved(id), Ok(Some(bob)));
    assert!(w.ledger.take_changes().tokens.contains(&id));

    // The zero account clears it again.
    w.ledger.approve_credential(&alice, acct(0), id).unwrap();
    assert_eq!(w.ledger.credentials().get_approved(id), Ok(None));
}
