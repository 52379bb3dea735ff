//! Statement aggregator: net income and the accounting-equation totals.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::balances::Balances;
use crate::chart::Category;

/// Summary totals derived from a [`Balances`] snapshot.
///
/// `total_equity` is the *reported* equity: contributed equity plus net income
/// rolled in as retained earnings. For a journal of balanced entries
/// `total_assets == total_liabilities + total_equity`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatementTotals {
    pub net_income: Decimal,
    pub total_assets: Decimal,
    pub total_liabilities: Decimal,
    pub total_equity: Decimal,

    pub income: Decimal,
    pub costs: Decimal,
    pub expenses: Decimal,
    /// Equity account balances before net income is rolled in.
    pub equity_contributed: Decimal,
}

impl StatementTotals {
    pub fn from_balances(balances: &Balances) -> Self {
        let income = balances.category_total(Category::Income);
        let costs = balances.category_total(Category::Costs);
        let expenses = balances.category_total(Category::Expenses);
        let equity_contributed = balances.category_total(Category::Equity);

        let net_income = income - (costs + expenses);

        Self {
            net_income,
            total_assets: balances.category_total(Category::Assets),
            total_liabilities: balances.category_total(Category::Liabilities),
            total_equity: equity_contributed + net_income,
            income,
            costs,
            expenses,
            equity_contributed,
        }
    }

    /// `assets - (liabilities + reported equity)`; zero when the books balance.
    pub fn equation_gap(&self) -> Decimal {
        self.total_assets - (self.total_liabilities + self.total_equity)
    }

    pub fn is_balanced(&self) -> bool {
        self.equation_gap().is_zero()
    }
}

/// Fold balances into statement totals.
pub fn aggregate(balances: &Balances) -> StatementTotals {
    StatementTotals::from_balances(balances)
}
