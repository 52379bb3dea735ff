//! Balance engine: folds the journal into one signed balance per account.
//!
//! Postings are grouped by account code in a single pass, then each account
//! reads its group, so the whole computation is O(postings + accounts).
//!
//! Sign convention follows the account's category: for normal-debit categories
//! (assets, costs, expenses) debits add and credits subtract; for normal-credit
//! categories (liabilities, equity, income) it is the other way round.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::chart::{Account, Category};
use crate::journal::{Posting, Side};

/// Balance of a single account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountBalance {
    pub account: Account,
    pub balance: Decimal,
}

impl AccountBalance {
    pub fn category(&self) -> Category {
        self.account.category()
    }
}

/// Read-only snapshot of every account's balance, in ascending code order.
///
/// Tied to the journal state it was computed from; recompute after appends.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Balances {
    rows: Vec<AccountBalance>,
    index: HashMap<u32, usize>,
}

impl Balances {
    pub fn get(&self, code: u32) -> Option<&AccountBalance> {
        self.index.get(&code).map(|&i| &self.rows[i])
    }

    pub fn balance_of(&self, code: u32) -> Option<Decimal> {
        self.get(code).map(|row| row.balance)
    }

    pub fn iter(&self) -> impl Iterator<Item = &AccountBalance> {
        self.rows.iter()
    }

    pub fn by_category(&self, category: Category) -> impl Iterator<Item = &AccountBalance> {
        self.rows.iter().filter(move |row| row.category() == category)
    }

    /// Sum of balances over one category.
    pub fn category_total(&self, category: Category) -> Decimal {
        self.by_category(category).map(|row| row.balance).sum()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn into_rows(self) -> Vec<AccountBalance> {
        self.rows
    }
}

/// Signed contribution of one posting to an account of `category`.
pub fn signed_amount(category: Category, posting: &Posting) -> Decimal {
    if posting.side == category.normal_side() {
        posting.amount
    } else {
        -posting.amount
    }
}

/// Compute every account's balance from `postings`.
///
/// Accounts with no postings get a zero balance. Postings whose code matches no
/// account are ignored (the journal refuses to record them). When `accounts`
/// repeats a code, the first occurrence wins.
///
/// # Panics
///
/// If the amounts of `postings` together exceed the `Decimal` range. A
/// [`Journal`](crate::journal::Journal) never holds such postings: it caps total
/// debits plus credits at that range, which bounds every sum taken here.
pub fn compute_balances<'p, 'a>(
    postings: impl IntoIterator<Item = &'p Posting>,
    accounts: impl IntoIterator<Item = &'a Account>,
) -> Balances {
    // Net debit per code: debits minus credits.
    let mut net_debit: HashMap<u32, Decimal> = HashMap::new();
    let mut folded = 0usize;
    for p in postings {
        let delta = match p.side {
            Side::Debit => p.amount,
            Side::Credit => -p.amount,
        };
        *net_debit.entry(p.code).or_insert(Decimal::ZERO) += delta;
        folded += 1;
    }

    let mut seen: HashSet<u32> = HashSet::new();
    let mut rows: Vec<AccountBalance> = accounts
        .into_iter()
        .filter(|account| seen.insert(account.code()))
        .map(|account| {
            let net = net_debit.get(&account.code()).copied().unwrap_or(Decimal::ZERO);
            let balance = match account.category().normal_side() {
                Side::Debit => net,
                Side::Credit => -net,
            };
            AccountBalance {
                account: account.clone(),
                balance,
            }
        })
        .collect();

    rows.sort_by_key(|row| row.account.code());
    let index = rows
        .iter()
        .enumerate()
        .map(|(i, row)| (row.account.code(), i))
        .collect();

    tracing::debug!(postings = folded, accounts = rows.len(), "balances computed");

    Balances { rows, index }
}

/// Balances as they stood at `cutoff`: only postings dated on or before it count.
pub fn compute_balances_as_of<'p, 'a>(
    postings: impl IntoIterator<Item = &'p Posting>,
    accounts: impl IntoIterator<Item = &'a Account>,
    cutoff: DateTime<Utc>,
) -> Balances {
    compute_balances(postings.into_iter().filter(|p| p.date <= cutoff), accounts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;
    use tally_core::{EntryId, PostingId};

    use crate::chart::ChartOfAccounts;

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 10, d, 0, 0, 0).unwrap()
    }

    fn posting(id: u64, code: u32, cents: i64, side: Side, date: DateTime<Utc>) -> Posting {
        Posting {
            id: PostingId::new(id),
            entry: EntryId::new(id),
            code,
            amount: Decimal::new(cents, 2),
            side,
            date,
        }
    }

    fn chart() -> ChartOfAccounts {
        let mut chart = ChartOfAccounts::new();
        for (code, name) in [
            (10001, "Cash"),
            (20001, "Loan"),
            (30001, "Capital"),
            (40001, "Sales"),
            (50001, "Materials"),
            (60001, "Rent"),
        ] {
            chart.register(code, name).unwrap();
        }
        chart
    }

    /// Per-account scan over every posting; reference for the grouped fold.
    fn naive(postings: &[Posting], accounts: &[Account]) -> Vec<(u32, Decimal)> {
        let mut out: Vec<(u32, Decimal)> = accounts
            .iter()
            .map(|a| {
                let balance = postings
                    .iter()
                    .filter(|p| p.code == a.code())
                    .map(|p| signed_amount(a.category(), p))
                    .sum();
                (a.code(), balance)
            })
            .collect();
        out.sort_by_key(|(code, _)| *code);
        out
    }

    #[test]
    fn sign_convention_follows_category() {
        let chart = chart();
        let postings: Vec<Posting> = [10001, 20001, 30001, 40001, 50001, 60001]
            .into_iter()
            .enumerate()
            .map(|(i, code)| posting(i as u64 + 1, code, 1_000, Side::Debit, day(1)))
            .collect();

        let balances = compute_balances(&postings, chart.iter());

        assert_eq!(balances.balance_of(10001), Some(Decimal::new(1_000, 2)));
        assert_eq!(balances.balance_of(50001), Some(Decimal::new(1_000, 2)));
        assert_eq!(balances.balance_of(60001), Some(Decimal::new(1_000, 2)));
        assert_eq!(balances.balance_of(20001), Some(Decimal::new(-1_000, 2)));
        assert_eq!(balances.balance_of(30001), Some(Decimal::new(-1_000, 2)));
        assert_eq!(balances.balance_of(40001), Some(Decimal::new(-1_000, 2)));
    }

    #[test]
    fn accounts_without_postings_are_zero() {
        let chart = chart();
        let balances = compute_balances(std::iter::empty(), chart.iter());
        assert_eq!(balances.len(), 6);
        assert!(balances.iter().all(|row| row.balance.is_zero()));
    }

    #[test]
    fn rows_are_in_code_order_even_for_unordered_input() {
        let chart = chart();
        let mut accounts: Vec<Account> = chart.iter().cloned().collect();
        accounts.reverse();

        let balances = compute_balances(std::iter::empty(), &accounts);
        let codes: Vec<u32> = balances.iter().map(|r| r.account.code()).collect();
        assert_eq!(codes, vec![10001, 20001, 30001, 40001, 50001, 60001]);
        assert_eq!(balances.get(40001).unwrap().account.name, "Sales");
    }

    #[test]
    fn orphan_postings_do_not_leak_into_balances() {
        let chart = chart();
        let postings = vec![posting(1, 19999, 500, Side::Debit, day(1))];
        let balances = compute_balances(&postings, chart.iter());
        assert_eq!(balances.category_total(Category::Assets), Decimal::ZERO);
        assert!(balances.get(19999).is_none());
    }

    #[test]
    fn as_of_ignores_later_postings() {
        let chart = chart();
        let postings = vec![
            posting(1, 10001, 10_000, Side::Debit, day(1)),
            posting(2, 10001, 2_500, Side::Credit, day(5)),
            posting(3, 10001, 700, Side::Debit, day(9)),
        ];

        let at_start = compute_balances_as_of(&postings, chart.iter(), day(1));
        let mid = compute_balances_as_of(&postings, chart.iter(), day(5));
        let all = compute_balances(&postings, chart.iter());

        assert_eq!(at_start.balance_of(10001), Some(Decimal::new(10_000, 2)));
        assert_eq!(mid.balance_of(10001), Some(Decimal::new(7_500, 2)));
        assert_eq!(all.balance_of(10001), Some(Decimal::new(8_200, 2)));
    }

    fn arb_postings() -> impl Strategy<Value = Vec<Posting>> {
        let codes = prop::sample::select(vec![10001u32, 20001, 30001, 40001, 50001, 60001, 69999]);
        prop::collection::vec((codes, 1i64..1_000_000, any::<bool>()), 0..60).prop_map(|lines| {
            lines
                .into_iter()
                .enumerate()
                .map(|(i, (code, cents, debit))| {
                    let side = if debit { Side::Debit } else { Side::Credit };
                    posting(i as u64 + 1, code, cents, side, day(1))
                })
                .collect()
        })
    }

    proptest! {
        #[test]
        fn grouped_fold_matches_naive_scan(postings in arb_postings()) {
            let chart = chart();
            let accounts: Vec<Account> = chart.iter().cloned().collect();

            let grouped: Vec<(u32, Decimal)> = compute_balances(&postings, &accounts)
                .iter()
                .map(|r| (r.account.code(), r.balance))
                .collect();

            prop_assert_eq!(grouped, naive(&postings, &accounts));
        }

        #[test]
        fn compute_balances_is_idempotent(postings in arb_postings()) {
            let chart = chart();
            let first = compute_balances(&postings, chart.iter());
            let second = compute_balances(&postings, chart.iter());
            prop_assert_eq!(first, second);
        }
    }
}
