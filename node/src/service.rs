//! # Relay Service
//!
//! The node's half of the relay protocol. Holders hand the node a signed
//! payload; the node submits it to the ledger as the caller, presenting its
//! own proof-of-work nonce, and earns the engine cut of the fee.
//!
//! One mutex guards the ledger and the cached work solution. An instruction
//! holds it from admission until its changes are on disk, so the store only
//! ever sees one writer and the journal sequence never races.
//!
//! If persisting fails after the ledger accepted an instruction, memory and
//! disk disagree. The service then throws the in-memory ledger away and
//! reloads it from the store, which still holds the last committed state.

use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use cashier_contracts::asset::InMemoryAsset;
use cashier_contracts::{
    AssetBridge, Clock, CredentialAuthority, CredentialToken, FeeConfiguration, Ledger,
    LedgerError, LedgerEvent, LedgerState, Operation, TokenId,
};
use cashier_protocol::crypto::CashierKeypair;
use cashier_protocol::types::AccountId;
use cashier_protocol::work::{solve_work, WorkError};

use crate::config::NodeConfig;
use crate::metrics::SharedMetrics;
use crate::store::{JournalEntry, LedgerStore, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// The ledger refused the instruction. Nothing changed.
    #[error(transparent)]
    Rejected(#[from] LedgerError),

    #[error("relay proof of work: {0}")]
    Work(#[from] WorkError),

    #[error("storage: {0}")]
    Store(#[from] StoreError),
}

/// Balance and replay counter of one account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountView {
    pub account: AccountId,
    /// Decimal string; JSON numbers lose precision past 2^53.
    pub balance: String,
    pub last_nonce: u64,
    pub credentials: usize,
}

/// What `/status` reports about the ledger.
#[derive(Debug, Clone, Serialize)]
pub struct LedgerSummary {
    pub ledger: AccountId,
    pub relay: AccountId,
    pub governance: AccountId,
    pub fee_engine: AccountId,
    pub asset: Option<AccountId>,
    pub trust_token: Option<AccountId>,
    pub config: FeeConfiguration,
    /// Cached relay nonce, if one has been solved for the current difficulty.
    pub relay_nonce: Option<u64>,
    pub credentials_minted: usize,
    pub journal_next_seq: u64,
}

#[derive(Debug, Clone, Copy)]
struct SolvedWork {
    difficulty: u8,
    nonce: u64,
}

struct Inner {
    ledger: Ledger<InMemoryAsset>,
    work: Option<SolvedWork>,
}

pub struct RelayService {
    inner: Mutex<Inner>,
    store: LedgerStore,
    relay: CashierKeypair,
    clock: Arc<dyn Clock>,
    search_limit: u64,
    metrics: SharedMetrics,
}

impl RelayService {
    /// Load the ledger from `store` and serve it with `relay` as the caller.
    pub fn open(
        store: LedgerStore,
        relay: CashierKeypair,
        clock: Arc<dyn Clock>,
        search_limit: u64,
        metrics: SharedMetrics,
    ) -> Result<Self, ServiceError> {
        let ledger = store.load(Arc::clone(&clock))?;
        let next_seq = store.next_seq()?;
        metrics.journal_head.set(next_seq as i64 - 1);
        info!(
            ledger = %ledger.address(),
            relay = %relay.account_id(),
            difficulty = ledger.proof_of_work(),
            journal = next_seq,
            "relay service ready"
        );
        Ok(Self {
            inner: Mutex::new(Inner { ledger, work: None }),
            store,
            relay,
            clock,
            search_limit,
            metrics,
        })
    }

    pub fn relay_account(&self) -> AccountId {
        self.relay.account_id()
    }

    /// Submit a signed payload as the relay.
    ///
    /// Returns the journal entries the instruction produced.
    pub fn submit(
        &self,
        operation: Operation,
        signer: &AccountId,
        payload: &[u8],
        signature: &[u8],
    ) -> Result<Vec<JournalEntry>, ServiceError> {
        let started = Instant::now();
        let result = self.submit_inner(operation, signer, payload, signature);
        self.metrics
            .instruction_latency_seconds
            .with_label_values(&[operation.as_str()])
            .observe(started.elapsed().as_secs_f64());

        match &result {
            Ok(journal) => {
                self.metrics.record_accepted(operation);
                for entry in journal {
                    if let Some(split) = entry.event.split() {
                        self.metrics.record_fees(split);
                    }
                    if matches!(entry.event, LedgerEvent::TokenMinted { .. }) {
                        self.metrics.tokens_minted_total.inc();
                    }
                }
                if let Some(last) = journal.last() {
                    self.metrics.journal_head.set(last.seq as i64);
                }
                info!(%operation, signer = %signer, events = journal.len(), "instruction applied");
            }
            Err(ServiceError::Rejected(e)) => {
                self.metrics.record_rejected(operation, e.kind());
                warn!(%operation, signer = %signer, reason = e.kind(), "instruction rejected: {}", e);
            }
            Err(e) => {
                self.metrics.record_rejected(operation, "internal");
                warn!(%operation, signer = %signer, "instruction failed: {}", e);
            }
        }
        result
    }

    fn submit_inner(
        &self,
        operation: Operation,
        signer: &AccountId,
        payload: &[u8],
        signature: &[u8],
    ) -> Result<Vec<JournalEntry>, ServiceError> {
        let mut inner = self.inner.lock();
        let relay_nonce = self.current_work(&mut inner)?;
        let relay = self.relay.account_id();

        let ledger = &mut inner.ledger;
        let applied = match operation {
            Operation::Deposit => ledger
                .relay_deposit(&relay, relay_nonce, signer, payload, signature)
                .map(|_| ()),
            Operation::Withdraw => ledger
                .withdraw(&relay, relay_nonce, signer, payload, signature)
                .map(|_| ()),
            Operation::Payment => ledger
                .payment(&relay, relay_nonce, signer, payload, signature)
                .map(|_| ()),
            Operation::NftMint => ledger
                .nft_mint(&relay, relay_nonce, signer, payload, signature)
                .map(|_| ()),
            Operation::NftTransfer => {
                ledger.nft_transfer(&relay, relay_nonce, signer, payload, signature)
            }
        };
        if let Err(e) = applied {
            // Rejections write nothing, but never let a stray change leak
            // into the next commit.
            ledger.take_changes();
            return Err(e.into());
        }

        let changes = ledger.take_changes();
        match self.store.commit(ledger, changes) {
            Ok(journal) => Ok(journal),
            Err(e) => {
                warn!("commit failed, reloading ledger from the store: {}", e);
                inner.ledger = self.store.load(Arc::clone(&self.clock))?;
                Err(e.into())
            }
        }
    }

    /// The cached relay nonce, solving a new one if governance moved the
    /// difficulty since the last solve.
    fn current_work(&self, inner: &mut Inner) -> Result<u64, ServiceError> {
        let difficulty = inner.ledger.proof_of_work();
        if let Some(work) = inner.work {
            if work.difficulty == difficulty {
                return Ok(work.nonce);
            }
        }
        let relay = self.relay.account_id();
        let nonce = solve_work(&relay, difficulty, 0, self.search_limit)?;
        self.metrics.work_solutions_total.inc();
        debug!(relay = %relay, difficulty, nonce, "relay nonce solved");
        inner.work = Some(SolvedWork { difficulty, nonce });
        Ok(nonce)
    }

    pub fn account(&self, account: &AccountId) -> AccountView {
        let inner = self.inner.lock();
        let stored = inner.ledger.state().account(account);
        AccountView {
            account: *account,
            balance: stored.balance.to_string(),
            last_nonce: stored.last_nonce,
            credentials: inner.ledger.credentials().balance_of(account),
        }
    }

    pub fn token(&self, token_id: TokenId) -> Option<CredentialToken> {
        let inner = self.inner.lock();
        inner.ledger.credentials().token(token_id).ok().cloned()
    }

    pub fn summary(&self) -> Result<LedgerSummary, ServiceError> {
        let inner = self.inner.lock();
        let state = inner.ledger.state();
        let difficulty = inner.ledger.proof_of_work();
        Ok(LedgerSummary {
            ledger: state.address,
            relay: self.relay.account_id(),
            governance: state.governance,
            fee_engine: state.fee_engine,
            asset: state.asset,
            trust_token: state.trust_token,
            config: state.config,
            relay_nonce: inner
                .work
                .filter(|w| w.difficulty == difficulty)
                .map(|w| w.nonce),
            credentials_minted: inner.ledger.credentials().total_supply(),
            journal_next_seq: self.store.next_seq()?,
        })
    }

    pub fn events(&self, since: u64, limit: usize) -> Result<Vec<JournalEntry>, ServiceError> {
        Ok(self.store.events(since, limit)?)
    }
}

// ---------------------------------------------------------------------------
// Genesis
// ---------------------------------------------------------------------------

/// Build the ledger `init` persists: configured fees and wiring, the
/// settlement asset with its genesis allocations (each pre-approved for the
/// ledger), and an empty credential table owned by governance.
///
/// Also returns the configuration events, so the journal starts with them.
pub fn genesis_ledger(
    config: &NodeConfig,
    clock: Arc<dyn Clock>,
) -> Result<(Ledger<InMemoryAsset>, Vec<LedgerEvent>), LedgerError> {
    let section = &config.ledger;
    let state = LedgerState::new(
        section.address,
        section.governance,
        section.fee_engine,
        section.fee_configuration(),
    );

    let mut asset = InMemoryAsset::new(config.asset.address, config.asset.symbol.clone())
        .with_decimals(config.asset.decimals);
    for allocation in &config.genesis.allocations {
        asset.mint(&allocation.account, allocation.amount)?;
        asset.approve(&allocation.account, &section.address, u128::MAX)?;
    }

    let credentials =
        CredentialAuthority::new(config.trust_token.address, section.governance, section.address);
    let mut ledger = Ledger::new(state, asset, credentials, clock);
    ledger.set_erc20_token_address(&section.governance, config.asset.address)?;
    ledger.set_trust_token_address(&section.governance, config.trust_token.address)?;

    let events = ledger.take_changes().events;
    Ok((ledger, events))
}
