//! Chart of accounts: category ranges, code allocation, and the account registry.
//!
//! The code space is partitioned into six closed ranges, one per [`Category`].
//! [`classify`] is the only place that knows those ranges; everything else in
//! the engine works with `Category` values.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};

use tally_core::AccountId;

use crate::error::{LedgerError, LedgerResult};
use crate::journal::Side;

/// Account category, determined solely by the account code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Assets,
    Liabilities,
    Equity,
    Income,
    Costs,
    Expenses,
}

impl Category {
    /// All categories in chart order.
    pub const ALL: [Category; 6] = [
        Category::Assets,
        Category::Liabilities,
        Category::Equity,
        Category::Income,
        Category::Costs,
        Category::Expenses,
    ];

    /// Valid codes for this category.
    pub const fn range(self) -> RangeInclusive<u32> {
        match self {
            Category::Assets => 10001..=19999,
            Category::Liabilities => 20001..=29999,
            Category::Equity => 30001..=39999,
            Category::Income => 40001..=49999,
            Category::Costs => 50001..=59999,
            Category::Expenses => 60001..=69999,
        }
    }

    /// One below the first valid code; allocation starts from here.
    pub const fn floor(self) -> u32 {
        *self.range().start() - 1
    }

    pub const fn ceiling(self) -> u32 {
        *self.range().end()
    }

    pub fn contains(self, code: u32) -> bool {
        self.range().contains(&code)
    }

    /// Side that increases a balance in this category.
    pub const fn normal_side(self) -> Side {
        match self {
            Category::Assets | Category::Costs | Category::Expenses => Side::Debit,
            Category::Liabilities | Category::Equity | Category::Income => Side::Credit,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Category::Assets => "assets",
            Category::Liabilities => "liabilities",
            Category::Equity => "equity",
            Category::Income => "income",
            Category::Costs => "costs",
            Category::Expenses => "expenses",
        }
    }
}

impl core::fmt::Display for Category {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.pad(self.as_str())
    }
}

impl core::str::FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "assets" | "asset" => Ok(Category::Assets),
            "liabilities" | "liability" => Ok(Category::Liabilities),
            "equity" => Ok(Category::Equity),
            "income" | "revenue" => Ok(Category::Income),
            "costs" | "cost" => Ok(Category::Costs),
            "expenses" | "expense" => Ok(Category::Expenses),
            other => Err(format!("unknown category: {other}")),
        }
    }
}

/// Classify a code into its category.
pub fn classify(code: u32) -> LedgerResult<Category> {
    Category::ALL
        .into_iter()
        .find(|c| c.contains(code))
        .ok_or(LedgerError::OutOfRange { code })
}

/// Next free code for `category`: one past the highest existing code in its
/// range, or the first code of the range when none exist.
///
/// Accounts outside `category` are ignored. Fails with `CategoryExhausted`
/// instead of producing a code past the ceiling.
pub fn next_code<'a>(
    category: Category,
    existing: impl IntoIterator<Item = &'a Account>,
) -> LedgerResult<u32> {
    let max = existing
        .into_iter()
        .map(Account::code)
        .filter(|code| category.contains(*code))
        .max();
    code_after(category, max)
}

fn code_after(category: Category, highest: Option<u32>) -> LedgerResult<u32> {
    let next = highest.unwrap_or(category.floor()) + 1;
    if next > category.ceiling() {
        return Err(LedgerError::CategoryExhausted {
            category,
            ceiling: category.ceiling(),
        });
    }
    Ok(next)
}

/// Validated account code. Construction classifies the code, so the category
/// travels with it and cannot drift.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct AccountCode {
    value: u32,
    category: Category,
}

impl AccountCode {
    pub fn new(value: u32) -> LedgerResult<Self> {
        let category = classify(value)?;
        Ok(Self { value, category })
    }

    pub fn value(self) -> u32 {
        self.value
    }

    pub fn category(self) -> Category {
        self.category
    }
}

impl TryFrom<u32> for AccountCode {
    type Error = LedgerError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<AccountCode> for u32 {
    fn from(value: AccountCode) -> Self {
        value.value
    }
}

impl core::fmt::Display for AccountCode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.value, f)
    }
}

/// A named ledger bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub code: AccountCode,
    pub name: String,
}

impl Account {
    /// Build an account with a fresh id, rejecting unclassifiable codes.
    pub fn new(code: u32, name: impl Into<String>) -> LedgerResult<Self> {
        Self::with_id(AccountId::new(), code, name)
    }

    pub fn with_id(id: AccountId, code: u32, name: impl Into<String>) -> LedgerResult<Self> {
        Ok(Self {
            id,
            code: AccountCode::new(code)?,
            name: name.into(),
        })
    }

    pub fn code(&self) -> u32 {
        self.code.value()
    }

    pub fn category(&self) -> Category {
        self.code.category()
    }
}

/// Registry of accounts keyed by code (codes are a unique key).
///
/// Codes can also be reserved without an account behind them: stored records
/// that failed to load still own their code in the store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChartOfAccounts {
    accounts: BTreeMap<u32, Account>,
    ids: HashSet<AccountId>,
    reserved: BTreeSet<u32>,
}

impl ChartOfAccounts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new account under `code` with a fresh id.
    pub fn register(&mut self, code: u32, name: impl Into<String>) -> LedgerResult<Account> {
        let account = Account::new(code, name)?;
        self.insert(account.clone())?;
        Ok(account)
    }

    /// Allocate the next code in `category` and register `name` under it.
    pub fn open(&mut self, category: Category, name: impl Into<String>) -> LedgerResult<Account> {
        let code = self.next_code(category)?;
        self.register(code, name)
    }

    /// Insert an account that already carries its id (hydration, sync).
    pub fn insert(&mut self, account: Account) -> LedgerResult<()> {
        self.check_insert(&account)?;
        self.ids.insert(account.id);
        self.accounts.insert(account.code(), account);
        Ok(())
    }

    /// Check that `account` could be inserted, without inserting it.
    pub fn check_insert(&self, account: &Account) -> LedgerResult<()> {
        let code = account.code();
        if self.accounts.contains_key(&code) || self.reserved.contains(&code) {
            return Err(LedgerError::DuplicateCode { code });
        }
        if self.ids.contains(&account.id) {
            return Err(LedgerError::DuplicateAccountId { id: account.id });
        }
        Ok(())
    }

    /// Keep `code` out of circulation: it is neither allocated by
    /// [`next_code`](Self::next_code) nor accepted by [`insert`](Self::insert).
    pub fn reserve(&mut self, code: u32) {
        self.reserved.insert(code);
    }

    pub fn next_code(&self, category: Category) -> LedgerResult<u32> {
        let taken = self.accounts.range(category.range()).next_back().map(|(c, _)| *c);
        let reserved = self.reserved.range(category.range()).next_back().copied();
        code_after(category, taken.max(reserved))
    }

    pub fn get(&self, code: u32) -> Option<&Account> {
        self.accounts.get(&code)
    }

    pub fn contains(&self, code: u32) -> bool {
        self.accounts.contains_key(&code)
    }

    /// Accounts in ascending code order.
    pub fn iter(&self) -> impl Iterator<Item = &Account> {
        self.accounts.values()
    }

    pub fn in_category(&self, category: Category) -> impl Iterator<Item = &Account> {
        self.accounts.range(category.range()).map(|(_, a)| a)
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}
