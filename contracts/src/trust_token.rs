//! # Trust Token (Credential Authority)
//!
//! Non-fungible credential tokens, one per verified attestation. The table
//! is deliberately boring: sequential ids starting at 1, never reused, one
//! holder per token, one optional approved operator per token.
//!
//! ## Security Model
//!
//! - **Mint gating**: only minting *authorities* may mint. The ledger is
//!   installed as the first authority at construction, so in practice every
//!   credential went through the ledger's attestation checks.
//! - **Authority management**: the owner account grants and revokes
//!   authorities and can hand ownership to someone else.
//! - **Transfers**: the holder, the token's approved operator, or an
//!   authority may move a token. The ledger uses its authority to execute
//!   holder-signed transfer instructions.

use cashier_protocol::types::AccountId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;
use tracing::debug;

use crate::attestation::{AttestationData, NftSettings, NftType};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CredentialError {
    /// The caller lacks the role this operation needs.
    #[error("unauthorized: {caller} may not perform this credential operation")]
    Unauthorized { caller: AccountId },

    /// `from` does not hold the token.
    #[error("not owner: {claimed} does not hold token {token_id}")]
    NotOwner { token_id: TokenId, claimed: AccountId },

    #[error("unknown token: {0}")]
    UnknownToken(TokenId),

    /// Credentials cannot be sent to the zero account.
    #[error("invalid target: the zero account cannot hold credentials")]
    InvalidTarget,
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

pub type TokenId = u64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialToken {
    pub id: TokenId,
    pub holder: AccountId,
    pub token_uri: String,
    pub nft_type: NftType,
    pub provider: AccountId,
    /// Unix seconds at mint.
    pub minted_at: u64,
}

/// The credential-token table plus its access-control metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialAuthority {
    address: AccountId,
    owner: AccountId,
    authorities: BTreeSet<AccountId>,
    tokens: BTreeMap<TokenId, CredentialToken>,
    approvals: BTreeMap<TokenId, AccountId>,
    next_id: TokenId,
}

impl CredentialAuthority {
    /// A fresh authority installed at `address`, owned by `owner`, with
    /// `minter` (normally the ledger) as its first minting authority.
    pub fn new(address: AccountId, owner: AccountId, minter: AccountId) -> Self {
        let mut authorities = BTreeSet::new();
        authorities.insert(minter);
        Self {
            address,
            owner,
            authorities,
            tokens: BTreeMap::new(),
            approvals: BTreeMap::new(),
            next_id: 1,
        }
    }

    pub fn address(&self) -> AccountId {
        self.address
    }

    pub fn owner(&self) -> AccountId {
        self.owner
    }

    pub fn is_authority(&self, account: &AccountId) -> bool {
        self.authorities.contains(account)
    }

    pub fn authorities(&self) -> impl Iterator<Item = &AccountId> {
        self.authorities.iter()
    }

    /// The id the next mint will receive.
    pub fn next_token_id(&self) -> TokenId {
        self.next_id
    }

    // -- minting -----------------------------------------------------------

    /// Issue a credential to `holder` from verified settings and attestation.
    pub fn mint(
        &mut self,
        caller: &AccountId,
        holder: &AccountId,
        settings: &NftSettings,
        attestation: &AttestationData,
        minted_at: u64,
    ) -> Result<TokenId, CredentialError> {
        if !self.is_authority(caller) {
            return Err(CredentialError::Unauthorized { caller: *caller });
        }
        if holder.is_zero() {
            return Err(CredentialError::InvalidTarget);
        }

        let id = self.next_id;
        self.next_id += 1;
        self.tokens.insert(
            id,
            CredentialToken {
                id,
                holder: *holder,
                token_uri: attestation.token_uri.clone(),
                nft_type: settings.nft_type,
                provider: settings.provider,
                minted_at,
            },
        );
        debug!(token_id = id, holder = %holder, provider = %settings.provider, "credential minted");
        Ok(id)
    }

    // -- transfers ---------------------------------------------------------

    pub fn transfer_from(
        &mut self,
        caller: &AccountId,
        from: &AccountId,
        to: &AccountId,
        token_id: TokenId,
    ) -> Result<(), CredentialError> {
        let holder = self.owner_of(token_id)?;
        if holder != *from {
            return Err(CredentialError::NotOwner {
                token_id,
                claimed: *from,
            });
        }
        if to.is_zero() {
            return Err(CredentialError::InvalidTarget);
        }
        let approved = self.approvals.get(&token_id) == Some(caller);
        if *caller != holder && !approved && !self.is_authority(caller) {
            return Err(CredentialError::Unauthorized { caller: *caller });
        }

        if let Some(token) = self.tokens.get_mut(&token_id) {
            token.holder = *to;
        }
        self.approvals.remove(&token_id);
        debug!(token_id, from = %from, to = %to, "credential transferred");
        Ok(())
    }

    /// Let `approved` move one token on the holder's behalf.
    pub fn approve(
        &mut self,
        caller: &AccountId,
        approved: &AccountId,
        token_id: TokenId,
    ) -> Result<(), CredentialError> {
        let holder = self.owner_of(token_id)?;
        if *caller != holder {
            return Err(CredentialError::Unauthorized { caller: *caller });
        }
        if approved.is_zero() {
            self.approvals.remove(&token_id);
        } else {
            self.approvals.insert(token_id, *approved);
        }
        Ok(())
    }

    pub fn get_approved(&self, token_id: TokenId) -> Result<Option<AccountId>, CredentialError> {
        self.owner_of(token_id)?;
        Ok(self.approvals.get(&token_id).copied())
    }

    // -- queries -----------------------------------------------------------

    pub fn owner_of(&self, token_id: TokenId) -> Result<AccountId, CredentialError> {
        self.token(token_id).map(|t| t.holder)
    }

    pub fn token_uri(&self, token_id: TokenId) -> Result<&str, CredentialError> {
        self.token(token_id).map(|t| t.token_uri.as_str())
    }

    pub fn token(&self, token_id: TokenId) -> Result<&CredentialToken, CredentialError> {
        self.tokens
            .get(&token_id)
            .ok_or(CredentialError::UnknownToken(token_id))
    }

    pub fn balance_of(&self, holder: &AccountId) -> usize {
        self.tokens.values().filter(|t| t.holder == *holder).count()
    }

    pub fn tokens(&self) -> impl Iterator<Item = &CredentialToken> {
        self.tokens.values()
    }

    pub fn total_supply(&self) -> usize {
        self.tokens.len()
    }

    // -- administration ----------------------------------------------------

    pub fn grant_authority(
        &mut self,
        caller: &AccountId,
        authority: AccountId,
    ) -> Result<(), CredentialError> {
        self.require_owner(caller)?;
        self.authorities.insert(authority);
        Ok(())
    }

    pub fn revoke_authority(
        &mut self,
        caller: &AccountId,
        authority: &AccountId,
    ) -> Result<(), CredentialError> {
        self.require_owner(caller)?;
        self.authorities.remove(authority);
        Ok(())
    }

    pub fn transfer_ownership(
        &mut self,
        caller: &AccountId,
        new_owner: AccountId,
    ) -> Result<(), CredentialError> {
        self.require_owner(caller)?;
        if new_owner.is_zero() {
            return Err(CredentialError::InvalidTarget);
        }
        self.owner = new_owner;
        Ok(())
    }

    fn require_owner(&self, caller: &AccountId) -> Result<(), CredentialError> {
        if *caller != self.owner {
            return Err(CredentialError::Unauthorized { caller: *caller });
        }
        Ok(())
    }

    // -- persistence -------------------------------------------------------

    pub fn meta(&self) -> CredentialMeta {
        CredentialMeta {
            address: self.address,
            owner: self.owner,
            authorities: self.authorities.clone(),
            next_id: self.next_id,
        }
    }

    /// One token together with its pending approval, as stored.
    pub fn stored(&self, token_id: TokenId) -> Option<StoredCredential> {
        self.tokens.get(&token_id).map(|token| StoredCredential {
            token: token.clone(),
            approved: self.approvals.get(&token_id).copied(),
        })
    }

    pub fn from_parts(
        meta: CredentialMeta,
        stored: impl IntoIterator<Item = StoredCredential>,
    ) -> Self {
        let mut tokens = BTreeMap::new();
        let mut approvals = BTreeMap::new();
        for entry in stored {
            if let Some(approved) = entry.approved {
                approvals.insert(entry.token.id, approved);
            }
            tokens.insert(entry.token.id, entry.token);
        }
        Self {
            address: meta.address,
            owner: meta.owner,
            authorities: meta.authorities,
            tokens,
            approvals,
            next_id: meta.next_id,
        }
    }
}

/// Access-control metadata, persisted apart from the token table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialMeta {
    pub address: AccountId,
    pub owner: AccountId,
    pub authorities: BTreeSet<AccountId>,
    pub next_id: TokenId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredCredential {
    pub token: CredentialToken,
    pub approved: Option<AccountId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn acct(b: u8) -> AccountId {
        AccountId::new([b; 20])
    }

    const LEDGER: u8 = 0xC0;
    const OWNER: u8 = 0x0A;

    fn authority() -> CredentialAuthority {
        CredentialAuthority::new(acct(0x77), acct(OWNER), acct(LEDGER))
    }

    fn settings() -> NftSettings {
        NftSettings {
            provider: acct(0x70),
            price: 1,
            nft_type: [0, 1],
            expiration: 10,
        }
    }

    fn attestation(uri: &str) -> AttestationData {
        AttestationData {
            provider: acct(0x70),
            engine: acct(0xE0),
            hash_key_array: [0; 32],
            token_uri: uri.into(),
            hashed_data: [0; 32],
            nft_type: [0, 1],
        }
    }

    fn mint_to(auth: &mut CredentialAuthority, holder: u8) -> TokenId {
        auth.mint(&acct(LEDGER), &acct(holder), &settings(), &attestation("uri"), 5)
            .unwrap()
    }

    #[test]
    fn test_sequential_ids_from_one() {
        let mut auth = authority();
        assert_eq!(mint_to(&mut auth, 1), 1);
        assert_eq!(mint_to(&mut auth, 1), 2);
        assert_eq!(auth.balance_of(&acct(1)), 2);
        assert_eq!(auth.next_token_id(), 3);
    }

    #[test]
    fn test_only_authority_mints() {
        let mut auth = authority();
        let err = auth
            .mint(&acct(1), &acct(1), &settings(), &attestation("x"), 0)
            .unwrap_err();
        assert_eq!(err, CredentialError::Unauthorized { caller: acct(1) });
        assert_eq!(auth.total_supply(), 0);
    }

    #[test]
    fn test_mint_to_zero_rejected() {
        let mut auth = authority();
        let err = auth
            .mint(&acct(LEDGER), &AccountId::ZERO, &settings(), &attestation("x"), 0)
            .unwrap_err();
        assert_eq!(err, CredentialError::InvalidTarget);
        assert_eq!(auth.next_token_id(), 1);
    }

    #[test]
    fn test_token_metadata() {
        let mut auth = authority();
        let id = auth
            .mint(&acct(LEDGER), &acct(1), &settings(), &attestation("ipfs://abc"), 42)
            .unwrap();
        assert_eq!(auth.token_uri(id).unwrap(), "ipfs://abc");
        let token = auth.token(id).unwrap();
        assert_eq!(token.provider, acct(0x70));
        assert_eq!(token.minted_at, 42);
        assert_eq!(auth.token_uri(99).unwrap_err(), CredentialError::UnknownToken(99));
    }

    #[test]
    fn test_holder_transfers() {
        let mut auth = authority();
        let id = mint_to(&mut auth, 1);
        auth.transfer_from(&acct(1), &acct(1), &acct(2), id).unwrap();
        assert_eq!(auth.owner_of(id).unwrap(), acct(2));
    }

    #[test]
    fn test_wrong_from_is_not_owner() {
        let mut auth = authority();
        let id = mint_to(&mut auth, 1);
        let err = auth.transfer_from(&acct(LEDGER), &acct(3), &acct(2), id).unwrap_err();
        assert_eq!(err, CredentialError::NotOwner { token_id: id, claimed: acct(3) });
    }

    #[test]
    fn test_stranger_cannot_transfer() {
        let mut auth = authority();
        let id = mint_to(&mut auth, 1);
        let err = auth.transfer_from(&acct(9), &acct(1), &acct(9), id).unwrap_err();
        assert_eq!(err, CredentialError::Unauthorized { caller: acct(9) });
    }

    #[test]
    fn test_approved_operator_transfers_once() {
        let mut auth = authority();
        let id = mint_to(&mut auth, 1);
        auth.approve(&acct(1), &acct(9), id).unwrap();
        assert_eq!(auth.get_approved(id).unwrap(), Some(acct(9)));
        auth.transfer_from(&acct(9), &acct(1), &acct(2), id).unwrap();
        assert_eq!(auth.get_approved(id).unwrap(), None);
        assert!(auth.transfer_from(&acct(9), &acct(2), &acct(9), id).is_err());
    }

    #[test]
    fn test_transfer_to_zero_rejected() {
        let mut auth = authority();
        let id = mint_to(&mut auth, 1);
        let err = auth.transfer_from(&acct(1), &acct(1), &AccountId::ZERO, id).unwrap_err();
        assert_eq!(err, CredentialError::InvalidTarget);
    }

    #[test]
    fn test_owner_manages_authorities() {
        let mut auth = authority();
        assert!(auth.grant_authority(&acct(1), acct(2)).is_err());
        auth.grant_authority(&acct(OWNER), acct(2)).unwrap();
        assert!(auth.is_authority(&acct(2)));
        auth.revoke_authority(&acct(OWNER), &acct(LEDGER)).unwrap();
        assert!(!auth.is_authority(&acct(LEDGER)));
        assert!(auth
            .mint(&acct(LEDGER), &acct(1), &settings(), &attestation("x"), 0)
            .is_err());
    }

    #[test]
    fn test_rebuild_from_parts() {
        let mut auth = authority();
        let first = mint_to(&mut auth, 1);
        let second = mint_to(&mut auth, 2);
        auth.approve(&acct(2), &acct(9), second).unwrap();

        let stored: Vec<_> = [first, second].iter().filter_map(|id| auth.stored(*id)).collect();
        let rebuilt = CredentialAuthority::from_parts(auth.meta(), stored);
        assert_eq!(rebuilt, auth);
        assert_eq!(rebuilt.get_approved(second).unwrap(), Some(acct(9)));
        assert_eq!(rebuilt.next_token_id(), 3);
    }

    #[test]
    fn test_ownership_transfer() {
        let mut auth = authority();
        auth.transfer_ownership(&acct(OWNER), acct(0x0B)).unwrap();
        assert_eq!(auth.owner(), acct(0x0B));
        assert!(auth.grant_authority(&acct(OWNER), acct(3)).is_err());
    }
}
