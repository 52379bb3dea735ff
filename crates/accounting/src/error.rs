//! Ledger validation errors.

use rust_decimal::Decimal;
use thiserror::Error;

use tally_core::{AccountId, EntryId, PostingId};

use crate::chart::Category;

/// Result type used across the accounting engine.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Every way the engine can refuse a write.
///
/// All variants are deterministic, local validation failures: retrying the same
/// input yields the same error, and the ledger state is untouched when one is
/// returned.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// The code does not fall in any category range.
    #[error("account code {code} is outside every category range")]
    OutOfRange { code: u32 },

    /// The next code for the category would pass its ceiling.
    #[error("no account codes left in {category} (ceiling {ceiling})")]
    CategoryExhausted { category: Category, ceiling: u32 },

    #[error("account code {code} is already registered")]
    DuplicateCode { code: u32 },

    #[error("account id {id} is already registered")]
    DuplicateAccountId { id: AccountId },

    /// Debit and credit sums of one entry differ.
    #[error("entry {entry} is unbalanced: debits {debits} != credits {credits}")]
    UnbalancedEntry {
        entry: EntryId,
        debits: Decimal,
        credits: Decimal,
    },

    /// A posting references a code with no registered account.
    #[error("posting {posting} references unknown account code {code}")]
    UnknownAccount { posting: PostingId, code: u32 },

    #[error("entry has no postings")]
    EmptyEntry,

    #[error("postings of entry {expected} mixed with entry {found}")]
    MixedEntry { expected: EntryId, found: EntryId },

    #[error("posting {posting} has non-positive amount {amount}")]
    NonPositiveAmount { posting: PostingId, amount: Decimal },

    #[error("entry {entry} is already in the journal")]
    DuplicateEntry { entry: EntryId },

    /// Posting ids must strictly increase so journal order equals id order.
    #[error("posting id {found} does not follow {last}")]
    NonMonotonicPosting { last: u64, found: PostingId },

    #[error("posting id {posting} repeats within one entry")]
    DuplicatePosting { posting: PostingId },

    /// The entry's sums, or the journal's running totals with it, exceed the
    /// representable amount range.
    #[error("entry {entry} overflows the representable amount range")]
    AmountOverflow { entry: EntryId },
}
