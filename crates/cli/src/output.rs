//! Text and JSON rendering for command results.

use std::io::Write;

use chrono::{DateTime, Utc};
use serde::Serialize;

use tally_accounting::{Account, AccountBalance, Balances, Posting, StatementTotals};

pub fn accounts<'a>(
    out: &mut impl Write,
    accounts: impl IntoIterator<Item = &'a Account>,
    json: bool,
) -> anyhow::Result<()> {
    let accounts: Vec<&Account> = accounts.into_iter().collect();
    if json {
        return write_json(out, &accounts);
    }
    for account in accounts {
        writeln!(out, "{:>5}  {:<11}  {}", account.code(), account.category(), account.name)?;
    }
    Ok(())
}

pub fn postings(out: &mut impl Write, postings: &[Posting], json: bool) -> anyhow::Result<()> {
    if json {
        return write_json(out, &postings);
    }
    let mut current = None;
    for p in postings {
        if current != Some(p.entry) {
            writeln!(out, "entry {}  {}", p.entry, p.date.format("%Y-%m-%d %H:%M:%S"))?;
            current = Some(p.entry);
        }
        writeln!(out, "  #{:<6} {:<6} {:>5} {:>14}", p.id, p.side, p.code, p.amount)?;
    }
    Ok(())
}

#[derive(Serialize)]
struct ReportView<'a> {
    as_of: Option<DateTime<Utc>>,
    balances: Vec<&'a AccountBalance>,
    totals: StatementTotals,
}

pub fn report(
    out: &mut impl Write,
    balances: &Balances,
    as_of: Option<DateTime<Utc>>,
    json: bool,
) -> anyhow::Result<()> {
    let totals = StatementTotals::from_balances(balances);
    if json {
        let view = ReportView {
            as_of,
            balances: balances.iter().collect(),
            totals,
        };
        return write_json(out, &view);
    }

    if let Some(cutoff) = as_of {
        writeln!(out, "as of {}", cutoff.format("%Y-%m-%d %H:%M:%S"))?;
    }
    for row in balances.iter() {
        writeln!(out, "{:>5}  {:<28} {:>14}", row.account.code(), row.account.name, row.balance)?;
    }
    writeln!(out)?;
    writeln!(out, "{:<35} {:>14}", "net income", totals.net_income)?;
    writeln!(out, "{:<35} {:>14}", "total assets", totals.total_assets)?;
    writeln!(out, "{:<35} {:>14}", "total liabilities", totals.total_liabilities)?;
    writeln!(out, "{:<35} {:>14}", "total equity", totals.total_equity)?;
    if !totals.is_balanced() {
        writeln!(out, "{:<35} {:>14}", "equation gap", totals.equation_gap())?;
    }
    Ok(())
}

fn write_json<T: Serialize + ?Sized>(out: &mut impl Write, value: &T) -> anyhow::Result<()> {
    serde_json::to_writer_pretty(&mut *out, value)?;
    writeln!(out)?;
    Ok(())
}
