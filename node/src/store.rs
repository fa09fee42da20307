//! # Ledger Store
//!
//! Durable home of the ledger state, built on sled. The ledger itself stays
//! in memory; after every accepted instruction the node hands the store the
//! [`Changeset`] and the store writes exactly the touched keys.
//!
//! ## Tree Layout
//!
//! | Tree          | Key                      | Value                        |
//! |---------------|--------------------------|------------------------------|
//! | `accounts`    | account id (20B)         | `bincode(AccountState)`      |
//! | `invoices`    | invoice id (32B)         | empty                        |
//! | `credentials` | `token_id` (8B BE)       | `bincode(StoredCredential)`  |
//! | `events`      | `seq` (8B BE)            | `bincode(JournalEntry)`      |
//! | `metadata`    | key (UTF-8)              | `bincode(..)`                |
//!
//! Metadata holds the ledger settings, the credential authority's access
//! metadata, the in-memory settlement asset, and the next journal sequence.
//! Token ids and journal sequences are big-endian so sled's lexicographic
//! order is numeric order and range scans work.
//!
//! ## Atomicity
//!
//! One instruction is one sled transaction across all five trees. Either the
//! balances, the nonce, the invoice, the token, and the journal entries land
//! together, or none of them do.

use serde::{Deserialize, Serialize};
use sled::transaction::{ConflictableTransactionError, TransactionError, Transactional};
use sled::{Db, Tree};
use std::path::Path;
use std::sync::Arc;

use cashier_contracts::asset::InMemoryAsset;
use cashier_contracts::trust_token::{CredentialMeta, StoredCredential};
use cashier_contracts::{
    AccountState, Changeset, Clock, CredentialAuthority, Ledger, LedgerEvent, LedgerSettings,
    LedgerState, TokenId,
};
use cashier_protocol::types::{AccountId, Hash32};

// ---------------------------------------------------------------------------
// Error Type
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// A key or value on disk does not have the shape this layout expects.
    #[error("corrupt entry in {tree}: {detail}")]
    Corrupt { tree: &'static str, detail: String },

    #[error("store is not initialized")]
    Uninitialized,

    #[error("store is already initialized")]
    AlreadyInitialized,
}

pub type StoreResult<T> = Result<T, StoreError>;

// ---------------------------------------------------------------------------
// Journal
// ---------------------------------------------------------------------------

/// One ledger event with its position in the journal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub seq: u64,
    /// Ledger time (unix seconds) when the event was committed.
    pub at: u64,
    pub event: LedgerEvent,
}

// ---------------------------------------------------------------------------
// Metadata Keys
// ---------------------------------------------------------------------------

const META_SETTINGS: &[u8] = b"ledger_settings";
const META_CREDENTIALS: &[u8] = b"credential_meta";
const META_ASSET: &[u8] = b"settlement_asset";
const META_NEXT_SEQ: &[u8] = b"journal_next_seq";

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct LedgerStore {
    db: Db,
    accounts: Tree,
    invoices: Tree,
    credentials: Tree,
    events: Tree,
    metadata: Tree,
}

impl LedgerStore {
    /// Open or create a store at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        Self::from_db(sled::open(path)?)
    }

    /// A store that lives in a temporary directory and vanishes on drop.
    pub fn open_temporary() -> StoreResult<Self> {
        Self::from_db(sled::Config::new().temporary(true).open()?)
    }

    fn from_db(db: Db) -> StoreResult<Self> {
        Ok(Self {
            accounts: db.open_tree("accounts")?,
            invoices: db.open_tree("invoices")?,
            credentials: db.open_tree("credentials")?,
            events: db.open_tree("events")?,
            metadata: db.open_tree("metadata")?,
            db,
        })
    }

    pub fn is_initialized(&self) -> StoreResult<bool> {
        Ok(self.metadata.contains_key(META_SETTINGS)?)
    }

    /// Write a complete snapshot of a freshly built ledger, journaling
    /// `events` (normally the genesis configuration changes).
    pub fn initialize(
        &self,
        ledger: &Ledger<InMemoryAsset>,
        events: Vec<LedgerEvent>,
    ) -> StoreResult<Vec<JournalEntry>> {
        if self.is_initialized()? {
            return Err(StoreError::AlreadyInitialized);
        }
        let state = ledger.state();
        let mut changes = Changeset {
            accounts: state.balances.keys().copied().collect(),
            invoices: state.consumed_invoices.clone(),
            tokens: ledger.credentials().tokens().map(|t| t.id).collect(),
            settings: true,
            credential_admin: true,
            asset: true,
            events,
        };
        changes
            .accounts
            .extend(state.nonces.iter().map(|(account, _)| *account));
        self.commit(ledger, changes)
    }

    /// Rebuild the in-memory ledger from disk.
    pub fn load(&self, clock: Arc<dyn Clock>) -> StoreResult<Ledger<InMemoryAsset>> {
        let settings: LedgerSettings = self
            .get_meta(META_SETTINGS)?
            .ok_or(StoreError::Uninitialized)?;
        let mut state = LedgerState::from_settings(settings);

        for item in self.accounts.iter() {
            let (key, value) = item?;
            let account = AccountId::from_slice(&key).ok_or_else(|| StoreError::Corrupt {
                tree: "accounts",
                detail: format!("{}-byte key", key.len()),
            })?;
            let stored: AccountState = bincode::deserialize(&value)?;
            state.restore_account(account, stored);
        }

        for item in self.invoices.iter() {
            let (key, _) = item?;
            let invoice: Hash32 = key.as_ref().try_into().map_err(|_| StoreError::Corrupt {
                tree: "invoices",
                detail: format!("{}-byte key", key.len()),
            })?;
            state.consumed_invoices.insert(invoice);
        }

        let meta: CredentialMeta = self
            .get_meta(META_CREDENTIALS)?
            .ok_or(StoreError::Uninitialized)?;
        let stored = self
            .credentials
            .iter()
            .values()
            .map(|value| Ok(bincode::deserialize::<StoredCredential>(&value?)?))
            .collect::<StoreResult<Vec<_>>>()?;
        let credentials = CredentialAuthority::from_parts(meta, stored);

        let asset: InMemoryAsset = self
            .get_meta(META_ASSET)?
            .ok_or(StoreError::Uninitialized)?;

        tracing::debug!(
            accounts = state.balances.len(),
            invoices = state.consumed_invoices.len(),
            tokens = credentials.total_supply(),
            "ledger loaded"
        );
        Ok(Ledger::new(state, asset, credentials, clock))
    }

    /// Persist everything `changes` says was touched, plus its events, in
    /// one transaction. Returns the journal entries that were written.
    pub fn commit(
        &self,
        ledger: &Ledger<InMemoryAsset>,
        changes: Changeset,
    ) -> StoreResult<Vec<JournalEntry>> {
        if changes.is_empty() {
            return Ok(Vec::new());
        }
        let state = ledger.state();

        // Serialize up front; the transaction closure may run more than once.
        let accounts = changes
            .accounts
            .iter()
            .map(|account| {
                Ok((
                    account.as_bytes().to_vec(),
                    bincode::serialize(&state.account(account))?,
                ))
            })
            .collect::<StoreResult<Vec<_>>>()?;

        let tokens = changes
            .tokens
            .iter()
            .map(|id| {
                let value = ledger
                    .credentials()
                    .stored(*id)
                    .map(|stored| bincode::serialize(&stored))
                    .transpose()?;
                Ok((token_key(*id), value))
            })
            .collect::<StoreResult<Vec<(_, Option<Vec<u8>>)>>>()?;

        let mut metadata = Vec::new();
        if changes.settings {
            metadata.push((META_SETTINGS, bincode::serialize(&state.settings())?));
        }
        if changes.credential_admin {
            metadata.push((META_CREDENTIALS, bincode::serialize(&ledger.credentials().meta())?));
        }
        if changes.asset {
            metadata.push((META_ASSET, bincode::serialize(ledger.asset())?));
        }

        // Single writer: the node holds its ledger lock across commit.
        let first_seq = self.next_seq()?;
        let at = ledger.now();
        let journal: Vec<JournalEntry> = changes
            .events
            .into_iter()
            .zip(first_seq..)
            .map(|(event, seq)| JournalEntry { seq, at, event })
            .collect();
        let events = journal
            .iter()
            .map(|entry| Ok((entry.seq.to_be_bytes(), bincode::serialize(entry)?)))
            .collect::<StoreResult<Vec<_>>>()?;
        let next_seq = (first_seq + journal.len() as u64).to_be_bytes();

        (
            &self.accounts,
            &self.invoices,
            &self.credentials,
            &self.events,
            &self.metadata,
        )
            .transaction(|(tx_accounts, tx_invoices, tx_credentials, tx_events, tx_metadata)| {
                for (key, value) in &accounts {
                    tx_accounts.insert(key.as_slice(), value.as_slice())?;
                }
                for invoice in &changes.invoices {
                    tx_invoices.insert(invoice.as_slice(), &[] as &[u8])?;
                }
                for (key, value) in &tokens {
                    match value {
                        Some(value) => tx_credentials.insert(key.as_slice(), value.as_slice())?,
                        None => tx_credentials.remove(key.as_slice())?,
                    };
                }
                for (key, value) in &events {
                    tx_events.insert(key.as_slice(), value.as_slice())?;
                }
                for (key, value) in &metadata {
                    tx_metadata.insert(*key, value.as_slice())?;
                }
                tx_metadata.insert(META_NEXT_SEQ, &next_seq[..])?;
                Ok::<(), ConflictableTransactionError<()>>(())
            })
            .map_err(|e| match e {
                TransactionError::Storage(e) => StoreError::Sled(e),
                TransactionError::Abort(()) => StoreError::Corrupt {
                    tree: "transaction",
                    detail: "aborted".into(),
                },
            })?;
        self.db.flush()?;
        Ok(journal)
    }

    /// Journal entries with `seq >= since`, oldest first, at most `limit`.
    pub fn events(&self, since: u64, limit: usize) -> StoreResult<Vec<JournalEntry>> {
        self.events
            .range(since.to_be_bytes()..)
            .values()
            .take(limit)
            .map(|value| Ok(bincode::deserialize(&value?)?))
            .collect()
    }

    /// Sequence the next journal entry will get.
    pub fn next_seq(&self) -> StoreResult<u64> {
        match self.metadata.get(META_NEXT_SEQ)? {
            Some(bytes) => {
                let raw: [u8; 8] = bytes.as_ref().try_into().map_err(|_| StoreError::Corrupt {
                    tree: "metadata",
                    detail: "journal sequence is not 8 bytes".into(),
                })?;
                Ok(u64::from_be_bytes(raw))
            }
            None => Ok(0),
        }
    }

    fn get_meta<T: serde::de::DeserializeOwned>(&self, key: &[u8]) -> StoreResult<Option<T>> {
        match self.metadata.get(key)? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }
}

fn token_key(id: TokenId) -> Vec<u8> {
    id.to_be_bytes().to_vec()
}
