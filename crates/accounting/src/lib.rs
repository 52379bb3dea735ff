//! Accounting engine (chart of accounts, double-entry journal, balances, statements).
//!
//! Pure domain logic only: no IO, no persistence, no process-wide state.

pub mod balances;
pub mod chart;
pub mod error;
pub mod journal;
pub mod ledger;
pub mod statements;

pub use balances::{AccountBalance, Balances, compute_balances, compute_balances_as_of};
pub use chart::{Account, AccountCode, Category, ChartOfAccounts, classify, next_code};
pub use error::{LedgerError, LedgerResult};
pub use journal::{EntryTotals, Journal, Posting, Side};
pub use ledger::{
    AccountRegistered, EntryDraft, EntryPosted, HistoryPolicy, HydrationReport, Ledger,
    LedgerCommand, LedgerEvent, Line,
};
pub use statements::{StatementTotals, aggregate};
