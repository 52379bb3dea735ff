use std::sync::RwLock;

use tally_accounting::{Account, Posting};

use super::r#trait::{LedgerStore, StoreError};

#[derive(Debug, Default)]
struct Records {
    accounts: Vec<Account>,
    postings: Vec<Posting>,
}

/// In-memory append-only ledger store.
///
/// Intended for tests/dev. Not optimized for performance.
#[derive(Debug, Default)]
pub struct InMemoryLedgerStore {
    records: RwLock<Records>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with existing history (e.g. to simulate a restart).
    pub fn with_history(accounts: Vec<Account>, postings: Vec<Posting>) -> Self {
        Self {
            records: RwLock::new(Records { accounts, postings }),
        }
    }

    pub fn posting_count(&self) -> usize {
        self.records.read().map(|r| r.postings.len()).unwrap_or(0)
    }
}

impl LedgerStore for InMemoryLedgerStore {
    fn load_accounts(&self) -> Result<Vec<Account>, StoreError> {
        let records = self.records.read().map_err(|_| StoreError::Poisoned)?;
        Ok(records.accounts.clone())
    }

    fn load_postings(&self) -> Result<Vec<Posting>, StoreError> {
        let records = self.records.read().map_err(|_| StoreError::Poisoned)?;
        Ok(records.postings.clone())
    }

    fn append_account(&self, account: &Account) -> Result<(), StoreError> {
        let mut records = self.records.write().map_err(|_| StoreError::Poisoned)?;
        if records.accounts.iter().any(|a| a.code() == account.code()) {
            return Err(StoreError::Conflict(format!(
                "account code {} already stored",
                account.code()
            )));
        }
        records.accounts.push(account.clone());
        Ok(())
    }

    fn append_entry(&self, postings: &[Posting]) -> Result<(), StoreError> {
        let mut records = self.records.write().map_err(|_| StoreError::Poisoned)?;
        check_posting_order(records.postings.last(), postings)?;
        records.postings.extend_from_slice(postings);
        Ok(())
    }
}

/// Appends must continue the stored posting-id sequence.
pub(crate) fn check_posting_order(
    last: Option<&Posting>,
    postings: &[Posting],
) -> Result<(), StoreError> {
    match (last, postings.first()) {
        (Some(last), Some(first)) if first.id <= last.id => Err(StoreError::Conflict(format!(
            "posting {} does not follow stored posting {}",
            first.id, last.id
        ))),
        _ => Ok(()),
    }
}
