use std::sync::Arc;

use thiserror::Error;

use tally_accounting::{Account, Posting};

/// Storage operation error.
///
/// These are **infrastructure errors** (IO, encoding, concurrency) as opposed
/// to ledger validation errors, which never reach the store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage io failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage encoding failed: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("storage lock poisoned")]
    Poisoned,

    /// The store already holds a record that contradicts the append.
    #[error("storage conflict: {0}")]
    Conflict(String),
}

impl StoreError {
    /// Whether retrying the same call may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Io(_) | StoreError::Poisoned)
    }
}

/// Storage collaborator for a ledger.
///
/// The engine calls `load_*` once at hydration and `append_*` once per committed
/// mutation, always *before* the in-memory ledger changes. Implementations pick
/// the storage technology; the engine assumes none.
///
/// Requirements:
/// - `load_accounts` / `load_postings` return records in ascending id order
///   (insertion order for accounts).
/// - `append_entry` persists all postings of one entry or none of them.
pub trait LedgerStore: Send + Sync {
    fn load_accounts(&self) -> Result<Vec<Account>, StoreError>;

    fn load_postings(&self) -> Result<Vec<Posting>, StoreError>;

    fn append_account(&self, account: &Account) -> Result<(), StoreError>;

    fn append_entry(&self, postings: &[Posting]) -> Result<(), StoreError>;
}

impl<S> LedgerStore for Arc<S>
where
    S: LedgerStore + ?Sized,
{
    fn load_accounts(&self) -> Result<Vec<Account>, StoreError> {
        (**self).load_accounts()
    }

    fn load_postings(&self) -> Result<Vec<Posting>, StoreError> {
        (**self).load_postings()
    }

    fn append_account(&self, account: &Account) -> Result<(), StoreError> {
        (**self).append_account(account)
    }

    fn append_entry(&self, postings: &[Posting]) -> Result<(), StoreError> {
        (**self).append_entry(postings)
    }
}
