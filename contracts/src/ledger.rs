//! # Cashier Ledger
//!
//! Internal balances backed by an external settlement asset, moved only by
//! signed instructions that a relay submits on the holder's behalf.
//!
//! ## Admission
//!
//! Every relayed entry point takes `(caller, relay_nonce, signer, payload,
//! signature)` and runs the same checks, in order:
//!
//! 1. **Proof of work**: `caller`'s `relay_nonce` clears the configured
//!    difficulty.
//! 2. **Signature**: the signer recovered from `payload` equals `signer`.
//! 3. **Binding**: the payload decodes and names this ledger.
//! 4. **Nonce**: the payload's nonce is `signer`'s last nonce plus one.
//!
//! Operation-specific checks follow. Nothing is written until every check
//! has passed, so a rejected instruction leaves balances, nonces, invoices,
//! credentials and the settlement asset exactly as they were.
//!
//! ## Fees
//!
//! Deposits, withdrawals and payments split their gross amount with
//! [`FeeConfiguration::split`]. The treasury cut goes to the ledger's own
//! account; the engine cut goes to the relay that submitted the instruction
//! (or, for direct deposits, to the designated fee engine).

use std::collections::BTreeMap;
use std::sync::Arc;

use cashier_protocol::codec::Decoder;
use cashier_protocol::config::MAX_LEADING_ZERO_BYTES;
use cashier_protocol::crypto::{recover_signer, RecoverableSignature};
use cashier_protocol::types::{AccountId, Amount, Hash32};
use cashier_protocol::work::validate_work;
use tracing::{debug, info};

use crate::asset::AssetBridge;
use crate::attestation::{self, SplitAttestation, SplitSettings};
use crate::clock::Clock;
use crate::error::{Collaborator, LedgerError, LedgerResult};
use crate::events::{ConfigChange, LedgerEvent};
use crate::fees::{FeeConfiguration, FeeSplit, MAX_DECIMALS};
use crate::instruction::{
    DepositInstruction, Instruction, NftMintInstruction, NftTransferInstruction,
    PaymentInstruction, WithdrawInstruction,
};
use crate::state::{Changeset, LedgerState};
use crate::trust_token::{CredentialAuthority, TokenId};

// ---------------------------------------------------------------------------
// Receipts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentReceipt {
    pub payer: AccountId,
    pub receiver: AccountId,
    pub payment_id: u128,
    pub nonce: u64,
    pub split: FeeSplit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MintReceipt {
    pub token_id: TokenId,
    pub holder: AccountId,
    pub provider: AccountId,
    pub invoice: Hash32,
}

// ---------------------------------------------------------------------------
// Posting
// ---------------------------------------------------------------------------

/// Balance changes staged against the current balances and applied in one go.
struct Posting<'a> {
    balances: &'a BTreeMap<AccountId, Amount>,
    staged: BTreeMap<AccountId, Amount>,
}

impl<'a> Posting<'a> {
    fn new(balances: &'a BTreeMap<AccountId, Amount>) -> Self {
        Self {
            balances,
            staged: BTreeMap::new(),
        }
    }

    fn current(&self, account: &AccountId) -> Amount {
        self.staged
            .get(account)
            .or_else(|| self.balances.get(account))
            .copied()
            .unwrap_or(0)
    }

    fn credit(&mut self, account: &AccountId, amount: Amount) -> LedgerResult<()> {
        let next = self
            .current(account)
            .checked_add(amount)
            .ok_or(LedgerError::ArithmeticOverflow)?;
        self.staged.insert(*account, next);
        Ok(())
    }

    fn debit(&mut self, account: &AccountId, amount: Amount) -> LedgerResult<()> {
        let available = self.current(account);
        let next = available
            .checked_sub(amount)
            .ok_or(LedgerError::InsufficientBalance {
                account: *account,
                available,
                requested: amount,
            })?;
        self.staged.insert(*account, next);
        Ok(())
    }

    fn into_staged(self) -> BTreeMap<AccountId, Amount> {
        self.staged
    }
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

pub struct Ledger<A: AssetBridge> {
    state: LedgerState,
    asset: A,
    credentials: CredentialAuthority,
    clock: Arc<dyn Clock>,
    changes: Changeset,
}

impl<A: AssetBridge> Ledger<A> {
    /// Wrap existing state with its collaborators.
    pub fn new(
        state: LedgerState,
        asset: A,
        credentials: CredentialAuthority,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            state,
            asset,
            credentials,
            clock,
            changes: Changeset::default(),
        }
    }

    // -- read-only ---------------------------------------------------------

    pub fn address(&self) -> AccountId {
        self.state.address
    }

    /// Current governance account.
    pub fn owner(&self) -> AccountId {
        self.state.governance
    }

    pub fn fee_engine(&self) -> AccountId {
        self.state.fee_engine
    }

    pub fn config(&self) -> &FeeConfiguration {
        &self.state.config
    }

    pub fn state(&self) -> &LedgerState {
        &self.state
    }

    pub fn asset(&self) -> &A {
        &self.asset
    }

    /// Direct access to the settlement asset, for hosts that also run it.
    /// Changes made here are flagged for persistence.
    pub fn asset_mut(&mut self) -> &mut A {
        self.changes.asset = true;
        &mut self.asset
    }

    pub fn credentials(&self) -> &CredentialAuthority {
        &self.credentials
    }

    pub fn balance_of(&self, account: &AccountId) -> Amount {
        self.state.balance_of(account)
    }

    pub fn last_nonce(&self, account: &AccountId) -> u64 {
        self.state.nonces.peek(account)
    }

    /// Current relay difficulty in leading zero bytes.
    pub fn proof_of_work(&self) -> u8 {
        self.state.config.leading_zero_bytes
    }

    pub fn is_invoice_consumed(&self, invoice: &Hash32) -> bool {
        self.state.consumed_invoices.contains(invoice)
    }

    pub fn now(&self) -> u64 {
        self.clock.unix_now()
    }

    /// Everything touched since the last call, including pending events.
    pub fn take_changes(&mut self) -> Changeset {
        std::mem::take(&mut self.changes)
    }

    pub fn verify_signature(
        &self,
        message: &[u8],
        signature: &[u8],
        expected: &AccountId,
    ) -> LedgerResult<bool> {
        attestation::verify_signature(message, signature, expected)
    }

    pub fn split_nft_settings(&self, encoded: &[u8], signature: &[u8]) -> LedgerResult<SplitSettings> {
        attestation::split_and_verify(encoded, signature)
    }

    pub fn split_attestation_data(
        &self,
        provider: &AccountId,
        encoded: &[u8],
        signature: &[u8],
    ) -> LedgerResult<SplitAttestation> {
        attestation::split_attestation_data(provider, encoded, signature)
    }

    // -- admission ---------------------------------------------------------

    fn check_work(&self, relay: &AccountId, relay_nonce: u64) -> LedgerResult<()> {
        let required = self.state.config.leading_zero_bytes;
        if !validate_work(relay, relay_nonce, required) {
            return Err(LedgerError::InsufficientProofOfWork {
                relay: *relay,
                nonce: relay_nonce,
                required,
            });
        }
        Ok(())
    }

    /// Proof of work, signer, ledger binding, nonce. Mutates nothing.
    fn admit<I: Instruction>(
        &self,
        caller: &AccountId,
        relay_nonce: u64,
        signer: &AccountId,
        payload: &[u8],
        signature: &[u8],
    ) -> LedgerResult<I> {
        self.check_work(caller, relay_nonce)?;

        let signature = RecoverableSignature::from_slice(signature)?;
        let recovered = recover_signer(payload, &signature)?;
        if recovered != *signer {
            return Err(LedgerError::InvalidSignature {
                expected: *signer,
                recovered,
            });
        }

        let found = Decoder::new(payload).uint()?;
        if found != I::OPERATION.tag() {
            return Err(LedgerError::WrongOperation {
                expected: I::OPERATION,
                found,
            });
        }
        let instruction = I::decode(payload)?;
        if instruction.ledger() != self.state.address {
            return Err(LedgerError::WrongLedger {
                expected: self.state.address,
                found: instruction.ledger(),
            });
        }
        self.state.nonces.check(signer, instruction.nonce())?;
        Ok(instruction)
    }

    fn require_asset(&self) -> LedgerResult<()> {
        match self.state.asset {
            Some(address) if address == self.asset.address() => Ok(()),
            _ => Err(LedgerError::CollaboratorNotConfigured(
                Collaborator::SettlementAsset,
            )),
        }
    }

    fn require_trust_token(&self) -> LedgerResult<()> {
        match self.state.trust_token {
            Some(address) if address == self.credentials.address() => Ok(()),
            _ => Err(LedgerError::CollaboratorNotConfigured(Collaborator::TrustToken)),
        }
    }

    fn apply(&mut self, staged: BTreeMap<AccountId, Amount>) {
        for (account, balance) in staged {
            self.state.balances.insert(account, balance);
            self.changes.accounts.insert(account);
        }
    }

    fn consume_nonce(&mut self, signer: &AccountId, nonce: u64) {
        self.state.nonces.advance(signer, nonce);
        self.changes.accounts.insert(*signer);
    }

    fn emit(&mut self, event: LedgerEvent) {
        self.changes.events.push(event);
    }

    // -- deposits ----------------------------------------------------------

    /// Direct deposit: `caller` pays in `amount` of the settlement asset it
    /// has approved the ledger to pull.
    pub fn deposit(&mut self, caller: &AccountId, amount: Amount) -> LedgerResult<FeeSplit> {
        self.require_asset()?;
        let split = self.state.config.split(amount)?;
        let engine = self.state.fee_engine;

        let mut posting = Posting::new(&self.state.balances);
        posting.credit(caller, split.net)?;
        posting.credit(&self.state.address, split.cashier_fee)?;
        posting.credit(&engine, split.engine_fee)?;
        let staged = posting.into_staged();

        let ledger = self.state.address;
        self.asset.transfer_from(&ledger, caller, &ledger, amount)?;
        self.changes.asset = true;
        self.apply(staged);

        debug!(holder = %caller, amount, net = split.net, "direct deposit");
        self.emit(LedgerEvent::Deposit {
            holder: *caller,
            engine,
            nonce: None,
            split,
        });
        Ok(split)
    }

    /// Relayed deposit: the holder signed `(amount, nonce, ledger)`; the
    /// relay submits it and earns the engine cut.
    pub fn relay_deposit(
        &mut self,
        caller: &AccountId,
        relay_nonce: u64,
        holder: &AccountId,
        payload: &[u8],
        signature: &[u8],
    ) -> LedgerResult<FeeSplit> {
        let instruction: DepositInstruction =
            self.admit(caller, relay_nonce, holder, payload, signature)?;
        self.require_asset()?;
        let split = self.state.config.split(instruction.amount)?;

        let mut posting = Posting::new(&self.state.balances);
        posting.credit(holder, split.net)?;
        posting.credit(&self.state.address, split.cashier_fee)?;
        posting.credit(caller, split.engine_fee)?;
        let staged = posting.into_staged();

        let ledger = self.state.address;
        self.asset
            .transfer_from(&ledger, holder, &ledger, instruction.amount)?;
        self.changes.asset = true;
        self.apply(staged);
        self.consume_nonce(holder, instruction.nonce);

        debug!(holder = %holder, relay = %caller, nonce = instruction.nonce, amount = instruction.amount, "relayed deposit");
        self.emit(LedgerEvent::Deposit {
            holder: *holder,
            engine: *caller,
            nonce: Some(instruction.nonce),
            split,
        });
        Ok(split)
    }

    // -- withdrawals -------------------------------------------------------

    /// The holder's balance drops by exactly the signed amount. Fees stay
    /// inside the ledger as internal credits; the holder receives the net
    /// amount in the settlement asset.
    pub fn withdraw(
        &mut self,
        caller: &AccountId,
        relay_nonce: u64,
        holder: &AccountId,
        payload: &[u8],
        signature: &[u8],
    ) -> LedgerResult<FeeSplit> {
        let instruction: WithdrawInstruction =
            self.admit(caller, relay_nonce, holder, payload, signature)?;
        self.require_asset()?;
        let split = self.state.config.split(instruction.amount)?;

        let mut posting = Posting::new(&self.state.balances);
        posting.debit(holder, instruction.amount)?;
        posting.credit(&self.state.address, split.cashier_fee)?;
        posting.credit(caller, split.engine_fee)?;
        let staged = posting.into_staged();

        let ledger = self.state.address;
        self.asset.transfer(&ledger, holder, split.net)?;
        self.changes.asset = true;
        self.apply(staged);
        self.consume_nonce(holder, instruction.nonce);

        debug!(holder = %holder, relay = %caller, nonce = instruction.nonce, amount = instruction.amount, "withdrawal");
        self.emit(LedgerEvent::Withdraw {
            holder: *holder,
            engine: *caller,
            nonce: instruction.nonce,
            split,
        });
        Ok(split)
    }

    // -- payments ----------------------------------------------------------

    pub fn payment(
        &mut self,
        caller: &AccountId,
        relay_nonce: u64,
        holder: &AccountId,
        payload: &[u8],
        signature: &[u8],
    ) -> LedgerResult<PaymentReceipt> {
        let instruction: PaymentInstruction =
            self.admit(caller, relay_nonce, holder, payload, signature)?;
        if instruction.receiver.is_zero() {
            return Err(LedgerError::InvalidTarget);
        }
        let split = self.state.config.split(instruction.amount)?;

        let mut posting = Posting::new(&self.state.balances);
        posting.debit(holder, instruction.amount)?;
        posting.credit(&instruction.receiver, split.net)?;
        posting.credit(&self.state.address, split.cashier_fee)?;
        posting.credit(caller, split.engine_fee)?;
        let staged = posting.into_staged();

        self.apply(staged);
        self.consume_nonce(holder, instruction.nonce);

        debug!(
            payer = %holder,
            receiver = %instruction.receiver,
            payment_id = instruction.payment_id,
            amount = instruction.amount,
            "payment"
        );
        self.emit(LedgerEvent::Payment {
            payer: *holder,
            receiver: instruction.receiver,
            payment_id: instruction.payment_id,
            engine: *caller,
            nonce: instruction.nonce,
            split,
        });
        Ok(PaymentReceipt {
            payer: *holder,
            receiver: instruction.receiver,
            payment_id: instruction.payment_id,
            nonce: instruction.nonce,
            split,
        })
    }

    // -- credentials -------------------------------------------------------

    /// Mint a credential from a provider's signed settings and attestation.
    ///
    /// The instruction is signed by the provider and carries the provider's
    /// nonce. Each (settings, attestation) pair mints at most once.
    pub fn nft_mint(
        &mut self,
        caller: &AccountId,
        relay_nonce: u64,
        provider: &AccountId,
        payload: &[u8],
        signature: &[u8],
    ) -> LedgerResult<MintReceipt> {
        let instruction: NftMintInstruction =
            self.admit(caller, relay_nonce, provider, payload, signature)?;

        let offer = attestation::split_and_verify(
            &instruction.settings,
            &instruction.settings_signature,
        )?;
        if offer.provider != *provider {
            return Err(LedgerError::AttestationMismatch(
                "settings name a different provider",
            ));
        }
        if !offer.is_valid {
            let recovered = recover_signer(
                &instruction.settings,
                &RecoverableSignature::from_slice(&instruction.settings_signature)?,
            )?;
            return Err(LedgerError::InvalidSignature {
                expected: *provider,
                recovered,
            });
        }

        let attested = attestation::split_attestation_data(
            provider,
            &instruction.attestation,
            &instruction.attestation_signature,
        )?;
        if attested.data.provider != *provider {
            return Err(LedgerError::AttestationMismatch(
                "attestation names a different provider",
            ));
        }
        if !attested.is_valid {
            let recovered = recover_signer(
                &instruction.attestation,
                &RecoverableSignature::from_slice(&instruction.attestation_signature)?,
            )?;
            return Err(LedgerError::InvalidSignature {
                expected: *provider,
                recovered,
            });
        }
        if attested.data.nft_type != offer.settings.nft_type {
            return Err(LedgerError::AttestationMismatch(
                "attestation type differs from settings",
            ));
        }
        if attested.engine != *caller {
            return Err(LedgerError::EngineMismatch {
                named: attested.engine,
                caller: *caller,
            });
        }

        let now = self.clock.unix_now();
        if !attestation::verify_expiration(&offer.settings, now) {
            return Err(LedgerError::Expired {
                expiration: offer.settings.expiration,
                now,
            });
        }

        let invoice = attestation::invoice_id(&instruction.settings, &instruction.attestation);
        if self.is_invoice_consumed(&invoice) {
            return Err(LedgerError::AlreadyConsumed(invoice));
        }
        self.require_trust_token()?;

        let ledger = self.state.address;
        let token_id = self.credentials.mint(
            &ledger,
            &instruction.holder,
            &offer.settings,
            &attested.data,
            now,
        )?;

        self.state.consumed_invoices.insert(invoice);
        self.changes.invoices.insert(invoice);
        self.changes.tokens.insert(token_id);
        self.changes.credential_admin = true;
        self.consume_nonce(provider, instruction.nonce);

        debug!(token_id, holder = %instruction.holder, provider = %provider, relay = %caller, "credential minted");
        self.emit(LedgerEvent::TokenMinted {
            token_id,
            holder: instruction.holder,
            provider: *provider,
            token_uri: attested.data.token_uri,
            price: offer.price,
            invoice,
            engine: *caller,
        });
        Ok(MintReceipt {
            token_id,
            holder: instruction.holder,
            provider: *provider,
            invoice,
        })
    }

    /// Move a credential on the strength of its holder's signature.
    pub fn nft_transfer(
        &mut self,
        caller: &AccountId,
        relay_nonce: u64,
        holder: &AccountId,
        payload: &[u8],
        signature: &[u8],
    ) -> LedgerResult<()> {
        let instruction: NftTransferInstruction =
            self.admit(caller, relay_nonce, holder, payload, signature)?;
        self.require_trust_token()?;

        let ledger = self.state.address;
        self.credentials
            .transfer_from(&ledger, holder, &instruction.to, instruction.token_id)?;
        self.changes.tokens.insert(instruction.token_id);
        self.consume_nonce(holder, instruction.nonce);

        debug!(token_id = instruction.token_id, from = %holder, to = %instruction.to, "credential transferred");
        self.emit(LedgerEvent::TokenTransferred {
            token_id: instruction.token_id,
            from: *holder,
            to: instruction.to,
            engine: *caller,
            nonce: instruction.nonce,
        });
        Ok(())
    }

    // -- governance --------------------------------------------------------

    fn require_governance(&self, caller: &AccountId) -> LedgerResult<()> {
        if *caller != self.state.governance {
            return Err(LedgerError::Unauthorized { caller: *caller });
        }
        Ok(())
    }

    fn config_changed(&mut self, change: ConfigChange) {
        info!(?change, "ledger configuration changed");
        self.changes.settings = true;
        self.emit(LedgerEvent::ConfigChanged(change));
    }

    pub fn set_erc20_token_address(&mut self, caller: &AccountId, address: AccountId) -> LedgerResult<()> {
        self.require_governance(caller)?;
        self.state.asset = Some(address);
        self.config_changed(ConfigChange::Erc20TokenAddress(address));
        Ok(())
    }

    pub fn set_trust_token_address(&mut self, caller: &AccountId, address: AccountId) -> LedgerResult<()> {
        self.require_governance(caller)?;
        self.state.trust_token = Some(address);
        self.config_changed(ConfigChange::TrustTokenAddress(address));
        Ok(())
    }

    pub fn set_cashier_percentage(&mut self, caller: &AccountId, percentage: u128) -> LedgerResult<()> {
        self.require_governance(caller)?;
        self.state.config.cashier_percentage = percentage;
        self.config_changed(ConfigChange::CashierPercentage(percentage));
        Ok(())
    }

    pub fn set_engine_percentage(&mut self, caller: &AccountId, percentage: u128) -> LedgerResult<()> {
        self.require_governance(caller)?;
        self.state.config.engine_percentage = percentage;
        self.config_changed(ConfigChange::EnginePercentage(percentage));
        Ok(())
    }

    /// Decimal places of the settlement asset. Fees stay on the 1e18 scale.
    pub fn set_pmtn_decimals(&mut self, caller: &AccountId, decimals: u8) -> LedgerResult<()> {
        self.require_governance(caller)?;
        if decimals > MAX_DECIMALS {
            return Err(LedgerError::InvalidConfiguration("decimals above 38"));
        }
        self.state.config.decimals = decimals;
        self.config_changed(ConfigChange::Decimals(decimals));
        Ok(())
    }

    pub fn set_leading_zeros(&mut self, caller: &AccountId, leading_zero_bytes: u8) -> LedgerResult<()> {
        self.require_governance(caller)?;
        if leading_zero_bytes > MAX_LEADING_ZERO_BYTES {
            return Err(LedgerError::InvalidConfiguration(
                "difficulty above the digest length",
            ));
        }
        self.state.config.leading_zero_bytes = leading_zero_bytes;
        self.config_changed(ConfigChange::LeadingZeros(leading_zero_bytes));
        Ok(())
    }

    pub fn set_fee_engine(&mut self, caller: &AccountId, engine: AccountId) -> LedgerResult<()> {
        self.require_governance(caller)?;
        self.state.fee_engine = engine;
        self.config_changed(ConfigChange::FeeEngine(engine));
        Ok(())
    }

    pub fn transfer_ownership(&mut self, caller: &AccountId, new_owner: AccountId) -> LedgerResult<()> {
        self.require_governance(caller)?;
        if new_owner.is_zero() {
            return Err(LedgerError::InvalidTarget);
        }
        let previous = self.state.governance;
        self.state.governance = new_owner;
        self.changes.settings = true;
        info!(previous = %previous, new = %new_owner, "governance transferred");
        self.emit(LedgerEvent::OwnershipTransferred {
            previous,
            new: new_owner,
        });
        Ok(())
    }

    // -- credential administration ----------------------------------------
    //
    // Direct calls into the credential authority. Its own owner and holder
    // checks apply; the ledger only records what changed.

    /// Let `approved` move one of the caller's credentials. The zero account
    /// clears the approval.
    pub fn approve_credential(
        &mut self,
        caller: &AccountId,
        approved: AccountId,
        token_id: TokenId,
    ) -> LedgerResult<()> {
        self.credentials.approve(caller, &approved, token_id)?;
        self.changes.tokens.insert(token_id);
        Ok(())
    }

    pub fn grant_credential_authority(
        &mut self,
        caller: &AccountId,
        authority: AccountId,
    ) -> LedgerResult<()> {
        self.credentials.grant_authority(caller, authority)?;
        self.changes.credential_admin = true;
        self.emit(LedgerEvent::CredentialAuthorityChanged {
            authority,
            granted: true,
        });
        Ok(())
    }

    pub fn revoke_credential_authority(
        &mut self,
        caller: &AccountId,
        authority: AccountId,
    ) -> LedgerResult<()> {
        self.credentials.revoke_authority(caller, &authority)?;
        self.changes.credential_admin = true;
        self.emit(LedgerEvent::CredentialAuthorityChanged {
            authority,
            granted: false,
        });
        Ok(())
    }

    pub fn transfer_credential_ownership(
        &mut self,
        caller: &AccountId,
        new_owner: AccountId,
    ) -> LedgerResult<()> {
        let previous = self.credentials.owner();
        self.credentials.transfer_ownership(caller, new_owner)?;
        self.changes.credential_admin = true;
        info!(previous = %previous, new = %new_owner, "credential authority ownership transferred");
        self.emit(LedgerEvent::CredentialOwnershipTransferred {
            previous,
            new: new_owner,
        });
        Ok(())
    }
}
