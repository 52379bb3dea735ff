//! The ledger engine: one chart of accounts plus one journal, driven by
//! commands and events.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use tally_core::{EntryId, PostingId};
use tally_events::Event;

use crate::balances::{Balances, compute_balances, compute_balances_as_of};
use crate::chart::{Account, Category, ChartOfAccounts};
use crate::error::{LedgerError, LedgerResult};
use crate::journal::{Journal, Posting, Side};
use crate::statements::StatementTotals;

/// One line of an entry that has not been assigned ids yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Line {
    pub code: u32,
    pub amount: Decimal,
    pub side: Side,
}

/// An entry as requested by a caller; the ledger allocates entry and posting ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryDraft {
    pub date: DateTime<Utc>,
    pub lines: Vec<Line>,
}

impl EntryDraft {
    pub fn new(date: DateTime<Utc>) -> Self {
        Self {
            date,
            lines: Vec::new(),
        }
    }

    /// Two-line entry moving `amount` from `credit` to `debit`.
    pub fn transfer(debit: u32, credit: u32, amount: Decimal, date: DateTime<Utc>) -> Self {
        Self::new(date).debit(debit, amount).credit(credit, amount)
    }

    pub fn debit(mut self, code: u32, amount: Decimal) -> Self {
        self.lines.push(Line {
            code,
            amount,
            side: Side::Debit,
        });
        self
    }

    pub fn credit(mut self, code: u32, amount: Decimal) -> Self {
        self.lines.push(Line {
            code,
            amount,
            side: Side::Credit,
        });
        self
    }
}

/// Command: register or allocate an account, or post an entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerCommand {
    /// Register `name` under an explicit code.
    RegisterAccount { code: u32, name: String },
    /// Allocate the next free code in `category` for `name`.
    OpenAccount { category: Category, name: String },
    PostEntry(EntryDraft),
}

/// Event: AccountRegistered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRegistered {
    pub account: Account,
    pub occurred_at: DateTime<Utc>,
}

/// Event: EntryPosted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryPosted {
    pub entry: EntryId,
    pub postings: Vec<Posting>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerEvent {
    AccountRegistered(AccountRegistered),
    EntryPosted(EntryPosted),
}

impl From<AccountRegistered> for LedgerEvent {
    fn from(event: AccountRegistered) -> Self {
        LedgerEvent::AccountRegistered(event)
    }
}

impl From<EntryPosted> for LedgerEvent {
    fn from(event: EntryPosted) -> Self {
        LedgerEvent::EntryPosted(event)
    }
}

impl Event for LedgerEvent {
    fn event_type(&self) -> &'static str {
        match self {
            LedgerEvent::AccountRegistered(_) => "ledger.account.registered",
            LedgerEvent::EntryPosted(_) => "ledger.entry.posted",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            LedgerEvent::AccountRegistered(e) => e.occurred_at,
            LedgerEvent::EntryPosted(e) => e.occurred_at,
        }
    }
}

/// What to do with stored history that fails validation during hydration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryPolicy {
    /// Abort hydration on the first invalid account or entry.
    #[default]
    Reject,
    /// Skip invalid records and report them.
    Quarantine,
}

impl core::str::FromStr for HistoryPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reject" => Ok(HistoryPolicy::Reject),
            "quarantine" => Ok(HistoryPolicy::Quarantine),
            other => Err(format!("unknown history policy: {other}")),
        }
    }
}

/// Outcome of [`Ledger::hydrate`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HydrationReport {
    pub accounts: usize,
    pub entries: usize,
    pub quarantined_accounts: Vec<(Account, LedgerError)>,
    pub quarantined_entries: Vec<(Vec<Posting>, LedgerError)>,
}

impl HydrationReport {
    pub fn is_clean(&self) -> bool {
        self.quarantined_accounts.is_empty() && self.quarantined_entries.is_empty()
    }
}

/// The accounting engine: one chart of accounts plus one journal.
///
/// Decision and mutation are split the usual way: [`Ledger::handle`] validates a
/// command against the current state and returns the event it would produce;
/// [`Ledger::apply`] re-validates an event and commits it. Remote events from a
/// sync peer go straight to `apply`, so they pass exactly the same checks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ledger {
    chart: ChartOfAccounts,
    journal: Journal,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a ledger from stored history.
    ///
    /// Accounts are registered in the given order. Postings are grouped by entry
    /// in order of first appearance and each group is appended as one entry, ids
    /// unchanged, so entries whose posting ids interleave fail the order check.
    ///
    /// Under [`HistoryPolicy::Quarantine`] the ids and codes of skipped records
    /// stay reserved: they are still in the store.
    pub fn hydrate(
        accounts: impl IntoIterator<Item = Account>,
        postings: impl IntoIterator<Item = Posting>,
        policy: HistoryPolicy,
    ) -> LedgerResult<(Self, HydrationReport)> {
        let mut ledger = Self::new();
        let mut report = HydrationReport::default();

        for account in accounts {
            match ledger.chart.check_insert(&account) {
                Ok(()) => {
                    ledger.chart.insert(account)?;
                    report.accounts += 1;
                }
                Err(err) if policy == HistoryPolicy::Quarantine => {
                    tracing::warn!(
                        code = account.code(),
                        error = %err,
                        "quarantined stored account"
                    );
                    ledger.chart.reserve(account.code());
                    report.quarantined_accounts.push((account, err));
                }
                Err(err) => return Err(err),
            }
        }

        for group in group_by_entry(postings) {
            match ledger.journal.check_entry(&group, &ledger.chart) {
                Ok(_) => {
                    ledger.journal.append_entry(group, &ledger.chart)?;
                    report.entries += 1;
                }
                Err(err) if policy == HistoryPolicy::Quarantine => {
                    tracing::warn!(
                        entry = %group[0].entry,
                        error = %err,
                        "quarantined stored entry"
                    );
                    ledger.journal.reserve(&group);
                    report.quarantined_entries.push((group, err));
                }
                Err(err) => return Err(err),
            }
        }

        tracing::info!(
            accounts = report.accounts,
            entries = report.entries,
            postings = ledger.journal.len(),
            quarantined = report.quarantined_accounts.len() + report.quarantined_entries.len(),
            "ledger hydrated"
        );

        Ok((ledger, report))
    }

    pub fn chart(&self) -> &ChartOfAccounts {
        &self.chart
    }

    pub fn journal(&self) -> &Journal {
        &self.journal
    }

    pub fn next_code(&self, category: Category) -> LedgerResult<u32> {
        self.chart.next_code(category)
    }

    /// Decide the event a command produces. Does not mutate.
    pub fn handle(&self, command: &LedgerCommand, now: DateTime<Utc>) -> LedgerResult<LedgerEvent> {
        match command {
            LedgerCommand::RegisterAccount { code, name } => {
                let account = Account::new(*code, name.clone())?;
                self.decide_account(account, now).map(LedgerEvent::AccountRegistered)
            }
            LedgerCommand::OpenAccount { category, name } => {
                let account = Account::new(self.chart.next_code(*category)?, name.clone())?;
                self.decide_account(account, now).map(LedgerEvent::AccountRegistered)
            }
            LedgerCommand::PostEntry(draft) => {
                self.decide_entry(draft).map(LedgerEvent::EntryPosted)
            }
        }
    }

    /// Decide the registration of `account`. Does not mutate.
    pub fn decide_account(
        &self,
        account: Account,
        now: DateTime<Utc>,
    ) -> LedgerResult<AccountRegistered> {
        self.chart.check_insert(&account)?;
        Ok(AccountRegistered {
            account,
            occurred_at: now,
        })
    }

    /// Allocate ids for `draft` and validate the resulting entry. Does not mutate.
    pub fn decide_entry(&self, draft: &EntryDraft) -> LedgerResult<EntryPosted> {
        let entry = self.journal.next_entry_id();
        let mut id = self.journal.next_posting_id();
        let mut postings = Vec::with_capacity(draft.lines.len());
        for line in &draft.lines {
            postings.push(Posting {
                id,
                entry,
                code: line.code,
                amount: line.amount,
                side: line.side,
                date: draft.date,
            });
            id = id.next();
        }

        self.journal.check_entry(&postings, &self.chart)?;
        Ok(EntryPosted {
            entry,
            postings,
            occurred_at: draft.date,
        })
    }

    /// Validate an event against the current state without applying it.
    pub fn check(&self, event: &LedgerEvent) -> LedgerResult<()> {
        match event {
            LedgerEvent::AccountRegistered(e) => self.chart.check_insert(&e.account),
            LedgerEvent::EntryPosted(e) => {
                self.journal.check_entry(&e.postings, &self.chart)?;
                match e.postings.first() {
                    Some(p) if p.entry != e.entry => Err(LedgerError::MixedEntry {
                        expected: e.entry,
                        found: p.entry,
                    }),
                    _ => Ok(()),
                }
            }
        }
    }

    /// Validate and commit an event (local or remote).
    pub fn apply(&mut self, event: &LedgerEvent) -> LedgerResult<()> {
        self.check(event)?;
        match event {
            LedgerEvent::AccountRegistered(e) => {
                self.commit_account(e.clone())?;
            }
            LedgerEvent::EntryPosted(e) => {
                self.journal.append_entry(e.postings.clone(), &self.chart)?;
            }
        }
        Ok(())
    }

    /// Whether `event` is already reflected in this ledger verbatim.
    ///
    /// Used to recognise re-delivered sync records.
    pub fn contains(&self, event: &LedgerEvent) -> bool {
        match event {
            LedgerEvent::AccountRegistered(e) => {
                self.chart.get(e.account.code()) == Some(&e.account)
            }
            LedgerEvent::EntryPosted(e) => {
                self.journal.entry(e.entry) == Some(e.postings.as_slice())
            }
        }
    }

    /// Register `name` under `code`.
    pub fn register(&mut self, code: u32, name: impl Into<String>) -> LedgerResult<Account> {
        let decided = self.decide_account(Account::new(code, name)?, Utc::now())?;
        self.commit_account(decided)
    }

    /// Allocate the next code in `category` and register `name` under it.
    pub fn open_account(
        &mut self,
        category: Category,
        name: impl Into<String>,
    ) -> LedgerResult<Account> {
        let code = self.chart.next_code(category)?;
        let decided = self.decide_account(Account::new(code, name)?, Utc::now())?;
        self.commit_account(decided)
    }

    /// Post a drafted entry, allocating its entry and posting ids.
    pub fn post(&mut self, draft: EntryDraft) -> LedgerResult<EntryId> {
        let decided = self.decide_entry(&draft)?;
        self.journal.append_entry(decided.postings, &self.chart)
    }

    /// Append a pre-built entry (ids already assigned).
    pub fn append_entry(&mut self, postings: Vec<Posting>) -> LedgerResult<EntryId> {
        self.journal.append_entry(postings, &self.chart)
    }

    fn commit_account(&mut self, decided: AccountRegistered) -> LedgerResult<Account> {
        self.chart.insert(decided.account.clone())?;
        tracing::debug!(
            code = decided.account.code(),
            name = %decided.account.name,
            "account registered"
        );
        Ok(decided.account)
    }

    pub fn balances(&self) -> Balances {
        compute_balances(self.journal.all(), self.chart.iter())
    }

    pub fn balances_as_of(&self, cutoff: DateTime<Utc>) -> Balances {
        compute_balances_as_of(self.journal.all(), self.chart.iter(), cutoff)
    }

    pub fn statement(&self) -> StatementTotals {
        StatementTotals::from_balances(&self.balances())
    }

    pub fn statement_as_of(&self, cutoff: DateTime<Utc>) -> StatementTotals {
        StatementTotals::from_balances(&self.balances_as_of(cutoff))
    }

    pub fn last_posting_id(&self) -> Option<PostingId> {
        self.journal.last_posting_id()
    }
}

/// Group postings by entry, keeping groups in order of first appearance and
/// postings in their original order within a group.
fn group_by_entry(postings: impl IntoIterator<Item = Posting>) -> Vec<Vec<Posting>> {
    let mut groups: Vec<Vec<Posting>> = Vec::new();
    let mut slot: HashMap<EntryId, usize> = HashMap::new();
    for p in postings {
        match slot.get(&p.entry) {
            Some(&i) => groups[i].push(p),
            None => {
                slot.insert(p.entry, groups.len());
                groups.push(vec![p]);
            }
        }
    }
    groups
}
