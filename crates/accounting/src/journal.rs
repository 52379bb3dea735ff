//! Append-only double-entry journal.
//!
//! The journal only grows by whole entries. `append_entry` validates an entry
//! completely before touching any state, so a rejected entry leaves the journal
//! exactly as it was.

use std::collections::{HashMap, HashSet};
use std::ops::Range;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use tally_core::{EntryId, PostingId};

use crate::chart::ChartOfAccounts;
use crate::error::{LedgerError, LedgerResult};

/// Posting side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Debit,
    Credit,
}

impl Side {
    pub fn opposite(self) -> Self {
        match self {
            Side::Debit => Side::Credit,
            Side::Credit => Side::Debit,
        }
    }
}

impl core::fmt::Display for Side {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Side::Debit => f.pad("debit"),
            Side::Credit => f.pad("credit"),
        }
    }
}

/// One debit or credit line of an entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Posting {
    pub id: PostingId,
    pub entry: EntryId,
    /// Code of the account this line posts to.
    pub code: u32,
    /// Positive amount; direction is carried by `side`.
    pub amount: Decimal,
    pub side: Side,
    pub date: DateTime<Utc>,
}

/// Debit and credit sums over a set of postings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryTotals {
    pub debits: Decimal,
    pub credits: Decimal,
}

impl EntryTotals {
    /// Sum debits and credits; `None` if either sum overflows.
    pub fn checked_of<'a>(postings: impl IntoIterator<Item = &'a Posting>) -> Option<Self> {
        postings.into_iter().try_fold(Self::default(), |acc, p| match p.side {
            Side::Debit => Some(Self {
                debits: acc.debits.checked_add(p.amount)?,
                ..acc
            }),
            Side::Credit => Some(Self {
                credits: acc.credits.checked_add(p.amount)?,
                ..acc
            }),
        })
    }

    pub fn checked_add(self, other: Self) -> Option<Self> {
        Some(Self {
            debits: self.debits.checked_add(other.debits)?,
            credits: self.credits.checked_add(other.credits)?,
        })
    }

    /// Debits plus credits: the sum of every amount counted.
    pub fn volume(&self) -> Option<Decimal> {
        self.debits.checked_add(self.credits)
    }

    pub fn is_balanced(&self) -> bool {
        self.debits == self.credits
    }
}

/// Ordered, append-only sequence of postings.
///
/// The sum of every amount in the journal (its volume) always fits in a
/// `Decimal`. Any balance, category total or statement figure derived from
/// its postings is bounded by that volume, so folding them cannot overflow.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Journal {
    postings: Vec<Posting>,
    /// Entry ids in append order.
    order: Vec<EntryId>,
    /// Position of each entry's postings in `postings`.
    spans: HashMap<EntryId, Range<usize>>,
    /// Running journal-wide sums.
    totals: EntryTotals,
    /// Ids held by stored entries that were not replayed (quarantined).
    reserved_entries: HashSet<EntryId>,
    reserved_posting: u64,
}

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate an entry against the current journal and chart without
    /// appending it.
    ///
    /// Checks, in order: non-empty, one shared entry id not yet in the
    /// journal, strictly increasing posting ids past the last one, positive
    /// amounts, known account codes, sums that fit the journal volume, and
    /// equal debit/credit sums.
    pub fn check_entry(
        &self,
        postings: &[Posting],
        chart: &ChartOfAccounts,
    ) -> LedgerResult<EntryTotals> {
        self.check(postings, chart).map(|(entry_totals, _)| entry_totals)
    }

    /// Returns the entry's totals and the journal totals after appending it.
    fn check(
        &self,
        postings: &[Posting],
        chart: &ChartOfAccounts,
    ) -> LedgerResult<(EntryTotals, EntryTotals)> {
        let first = postings.first().ok_or(LedgerError::EmptyEntry)?;
        let entry = first.entry;

        if self.spans.contains_key(&entry) || self.reserved_entries.contains(&entry) {
            return Err(LedgerError::DuplicateEntry { entry });
        }

        let mut last = self.posting_floor();
        let mut seen = HashSet::with_capacity(postings.len());

        for p in postings {
            if p.entry != entry {
                return Err(LedgerError::MixedEntry {
                    expected: entry,
                    found: p.entry,
                });
            }
            if !seen.insert(p.id) {
                return Err(LedgerError::DuplicatePosting { posting: p.id });
            }
            if p.id.get() <= last {
                return Err(LedgerError::NonMonotonicPosting { last, found: p.id });
            }
            last = p.id.get();

            if p.amount <= Decimal::ZERO {
                return Err(LedgerError::NonPositiveAmount {
                    posting: p.id,
                    amount: p.amount,
                });
            }
            if !chart.contains(p.code) {
                return Err(LedgerError::UnknownAccount {
                    posting: p.id,
                    code: p.code,
                });
            }
        }

        let totals =
            EntryTotals::checked_of(postings).ok_or(LedgerError::AmountOverflow { entry })?;
        if !totals.is_balanced() {
            return Err(LedgerError::UnbalancedEntry {
                entry,
                debits: totals.debits,
                credits: totals.credits,
            });
        }

        let after = self
            .totals
            .checked_add(totals)
            .filter(|t| t.volume().is_some())
            .ok_or(LedgerError::AmountOverflow { entry })?;

        Ok((totals, after))
    }

    /// Append one whole entry (all-or-nothing).
    pub fn append_entry(
        &mut self,
        postings: Vec<Posting>,
        chart: &ChartOfAccounts,
    ) -> LedgerResult<EntryId> {
        let (totals, after) = self.check(&postings, chart)?;
        let entry = postings[0].entry;
        self.totals = after;

        let start = self.postings.len();
        self.postings.extend(postings);
        let end = self.postings.len();

        self.order.push(entry);
        self.spans.insert(entry, start..end);

        tracing::debug!(
            entry = %entry,
            lines = end - start,
            amount = %totals.debits,
            "journal entry appended"
        );

        Ok(entry)
    }

    /// All postings in insertion order.
    pub fn all(&self) -> &[Posting] {
        &self.postings
    }

    pub fn iter(&self) -> impl Iterator<Item = &Posting> {
        self.postings.iter()
    }

    /// Postings of one entry.
    pub fn entry(&self, entry: EntryId) -> Option<&[Posting]> {
        self.spans.get(&entry).map(|span| &self.postings[span.clone()])
    }

    /// Entry ids in append order.
    pub fn entries(&self) -> impl Iterator<Item = EntryId> + '_ {
        self.order.iter().copied()
    }

    pub fn contains_entry(&self, entry: EntryId) -> bool {
        self.spans.contains_key(&entry)
    }

    pub fn entry_count(&self) -> usize {
        self.order.len()
    }

    /// Number of postings.
    pub fn len(&self) -> usize {
        self.postings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.postings.is_empty()
    }

    /// Highest entry id in the journal.
    pub fn last_entry_id(&self) -> Option<EntryId> {
        self.order.iter().max().copied()
    }

    /// Id of the most recently appended posting (also the highest).
    pub fn last_posting_id(&self) -> Option<PostingId> {
        self.postings.last().map(|p| p.id)
    }

    /// Keep the ids of a stored entry that is not replayed, so new entries
    /// never reuse them.
    pub fn reserve(&mut self, postings: &[Posting]) {
        for p in postings {
            self.reserved_entries.insert(p.entry);
            self.reserved_posting = self.reserved_posting.max(p.id.get());
        }
    }

    /// Highest posting id taken, counting reserved ids.
    fn posting_floor(&self) -> u64 {
        self.last_posting_id()
            .map_or(0, PostingId::get)
            .max(self.reserved_posting)
    }

    pub fn next_entry_id(&self) -> EntryId {
        self.order
            .iter()
            .chain(&self.reserved_entries)
            .max()
            .map_or(EntryId::FIRST, |e| e.next())
    }

    pub fn next_posting_id(&self) -> PostingId {
        PostingId::new(self.posting_floor()).next()
    }

    /// Journal-wide debit and credit sums (trial balance).
    pub fn totals(&self) -> EntryTotals {
        self.totals
    }
}
