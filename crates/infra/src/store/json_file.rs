//! Single-document JSON file store.
//!
//! The whole ledger lives in one JSON document. Every append rewrites it via a
//! sibling temp file and a rename, so a crash mid-write leaves the previous
//! document intact.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use tally_accounting::{Account, Posting};

use super::in_memory::check_posting_order;
use super::r#trait::{LedgerStore, StoreError};

/// On-disk layout.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerDocument {
    #[serde(default)]
    pub accounts: Vec<Account>,
    #[serde(default)]
    pub postings: Vec<Posting>,
}

#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    // Serializes read-modify-write cycles within this process.
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the document; a missing file is an empty ledger.
    pub fn read_document(&self) -> Result<LedgerDocument, StoreError> {
        match fs::read(&self.path) {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(LedgerDocument::default()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(LedgerDocument::default()),
            Err(err) => Err(err.into()),
        }
    }

    fn write_document(&self, doc: &LedgerDocument) -> Result<(), StoreError> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }

        let mut tmp_name = self.path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp = PathBuf::from(tmp_name);

        let bytes = serde_json::to_vec_pretty(doc)?;
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn update(
        &self,
        f: impl FnOnce(&mut LedgerDocument) -> Result<(), StoreError>,
    ) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().map_err(|_| StoreError::Poisoned)?;
        let mut doc = self.read_document()?;
        f(&mut doc)?;
        self.write_document(&doc)
    }
}

impl LedgerStore for JsonFileStore {
    fn load_accounts(&self) -> Result<Vec<Account>, StoreError> {
        Ok(self.read_document()?.accounts)
    }

    fn load_postings(&self) -> Result<Vec<Posting>, StoreError> {
        Ok(self.read_document()?.postings)
    }

    fn append_account(&self, account: &Account) -> Result<(), StoreError> {
        self.update(|doc| {
            if doc.accounts.iter().any(|a| a.code() == account.code()) {
                return Err(StoreError::Conflict(format!(
                    "account code {} already stored",
                    account.code()
                )));
            }
            doc.accounts.push(account.clone());
            Ok(())
        })
    }

    fn append_entry(&self, postings: &[Posting]) -> Result<(), StoreError> {
        self.update(|doc| {
            check_posting_order(doc.postings.last(), postings)?;
            doc.postings.extend_from_slice(postings);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use rust_decimal::Decimal;
    use tally_accounting::Side;
    use tally_core::{EntryId, PostingId};

    fn posting(id: u64, code: u32, side: Side) -> Posting {
        Posting {
            id: PostingId::new(id),
            entry: EntryId::new(1),
            code,
            amount: Decimal::new(12_345, 2),
            side,
            date: Utc.with_ymd_and_hms(2024, 10, 14, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn missing_file_loads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("ledger.json"));
        assert!(store.load_accounts().unwrap().is_empty());
        assert!(store.load_postings().unwrap().is_empty());
    }

    #[test]
    fn survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("ledger.json");

        let store = JsonFileStore::new(&path);
        let cash = Account::new(10001, "Cash").unwrap();
        store.append_account(&cash).unwrap();
        store.append_account(&Account::new(30001, "Capital").unwrap()).unwrap();
        store
            .append_entry(&[posting(1, 10001, Side::Debit), posting(2, 30001, Side::Credit)])
            .unwrap();

        let reopened = JsonFileStore::new(&path);
        let accounts = reopened.load_accounts().unwrap();
        assert_eq!(accounts[0], cash);
        assert_eq!(accounts.len(), 2);

        let postings = reopened.load_postings().unwrap();
        assert_eq!(postings.len(), 2);
        assert_eq!(postings[0].amount, Decimal::new(12_345, 2));
        assert_eq!(postings[1].side, Side::Credit);
    }

    #[test]
    fn corrupt_document_is_an_encoding_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.json");
        fs::write(&path, b"{ not json").unwrap();

        let err = JsonFileStore::new(&path).load_accounts().unwrap_err();
        assert!(matches!(err, StoreError::Serialize(_)));
        assert!(!err.is_transient());
    }

    #[test]
    fn conflicting_append_leaves_document_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("ledger.json"));
        store.append_account(&Account::new(10001, "Cash").unwrap()).unwrap();

        assert!(store.append_account(&Account::new(10001, "Bank").unwrap()).is_err());

        let accounts = store.load_accounts().unwrap();
        assert_eq!(accounts.len(), 1);
        assert_eq!(accounts[0].name, "Cash");
    }
}
