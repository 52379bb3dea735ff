//! `tally`: command-line front end for a file-backed ledger.

use std::io::Write;
use std::path::PathBuf;

use anyhow::Context;
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};
use rust_decimal::Decimal;

use tally_accounting::{Category, EntryDraft};
use tally_events::InMemoryEventBus;
use tally_infra::{JsonFileStore, LedgerConfig, LedgerEnvelope, LedgerService};

mod output;

#[derive(Parser, Debug)]
#[command(name = "tally")]
#[command(about = "Double-entry bookkeeping over a single JSON ledger file")]
struct Cli {
    /// Ledger document (overrides `TALLY_DATA_PATH`).
    #[arg(long, global = true)]
    data: Option<PathBuf>,

    /// Print machine-readable JSON instead of text.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the chart of accounts.
    Accounts,
    /// Register an account under an explicit code.
    Register { code: u32, name: String },
    /// Open an account under the next free code of a category.
    Open { category: Category, name: String },
    /// Post a two-line entry.
    Post(PostArgs),
    /// List every posting grouped by entry.
    Journal,
    /// Balances and statement totals.
    Report(ReportArgs),
}

#[derive(Args, Debug)]
struct PostArgs {
    #[arg(long)]
    debit: u32,
    #[arg(long)]
    credit: u32,
    #[arg(long)]
    amount: Decimal,
    /// RFC 3339 timestamp or YYYY-MM-DD (midnight UTC). Defaults to now.
    #[arg(long, value_parser = parse_date)]
    date: Option<DateTime<Utc>>,
}

#[derive(Args, Debug)]
struct ReportArgs {
    /// Only count postings up to this instant; a bare date includes the whole day.
    #[arg(long, value_parser = parse_cutoff)]
    as_of: Option<DateTime<Utc>>,
}

fn parse_date(raw: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .ok_or_else(|| format!("expected RFC 3339 or YYYY-MM-DD, got '{raw}'"))
}

fn parse_cutoff(raw: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_nano_opt(23, 59, 59, 999_999_999))
        .map(|dt| dt.and_utc())
        .ok_or_else(|| format!("expected RFC 3339 or YYYY-MM-DD, got '{raw}'"))
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = LedgerConfig::from_env().context("reading TALLY_* configuration")?;
    if let Some(path) = &cli.data {
        config.data_path = path.clone();
    }
    tally_observability::init_with(config.log_format);

    let stdout = std::io::stdout();
    run(&cli, &config, &mut stdout.lock())
}

fn run(cli: &Cli, config: &LedgerConfig, out: &mut impl Write) -> anyhow::Result<()> {
    let store = JsonFileStore::new(&config.data_path);
    let bus = InMemoryEventBus::<LedgerEnvelope>::new();
    let (service, report) = LedgerService::from_config(store, bus, config)
        .with_context(|| format!("opening ledger {}", config.data_path.display()))?;

    if !report.is_clean() {
        tracing::warn!(
            accounts = report.quarantined_accounts.len(),
            entries = report.quarantined_entries.len(),
            "stored history quarantined"
        );
    }

    match &cli.command {
        Command::Accounts => {
            let ledger = service.snapshot()?;
            output::accounts(out, ledger.chart().iter(), cli.json)?;
        }
        Command::Register { code, name } => {
            let account = service
                .register(*code, name)
                .with_context(|| format!("registering account {code}"))?;
            output::accounts(out, [&account], cli.json)?;
        }
        Command::Open { category, name } => {
            let account = service
                .open_account(*category, name)
                .with_context(|| format!("opening {category} account '{name}'"))?;
            output::accounts(out, [&account], cli.json)?;
        }
        Command::Post(args) => {
            let date = args.date.unwrap_or_else(Utc::now);
            let posted = service
                .post(EntryDraft::transfer(args.debit, args.credit, args.amount, date))
                .context("posting entry")?;
            output::postings(out, &posted.postings, cli.json)?;
        }
        Command::Journal => {
            let ledger = service.snapshot()?;
            output::postings(out, ledger.journal().all(), cli.json)?;
        }
        Command::Report(args) => {
            let ledger = service.snapshot()?;
            let balances = match args.as_of {
                Some(cutoff) => ledger.balances_as_of(cutoff),
                None => ledger.balances(),
            };
            output::report(out, &balances, args.as_of, cli.json)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn cli(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("tally").chain(args.iter().copied())).unwrap()
    }

    fn exec(config: &LedgerConfig, args: &[&str]) -> String {
        let mut out = Vec::new();
        run(&cli(args), config, &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn parses_dates() {
        let midnight = Utc.with_ymd_and_hms(2024, 10, 14, 0, 0, 0).unwrap();
        assert_eq!(parse_date("2024-10-14").unwrap(), midnight);
        assert_eq!(parse_date("2024-10-14T02:00:00+02:00").unwrap(), midnight);
        assert!(parse_date("14/10/2024").is_err());

        let cutoff = parse_cutoff("2024-10-14").unwrap();
        assert!(cutoff > midnight);
        assert!(cutoff < Utc.with_ymd_and_hms(2024, 10, 15, 0, 0, 0).unwrap());
    }

    #[test]
    fn rejects_unknown_category() {
        assert!(Cli::try_parse_from(["tally", "open", "furniture", "Desk"]).is_err());
    }

    #[test]
    fn session_against_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = LedgerConfig {
            data_path: dir.path().join("books.json"),
            ..LedgerConfig::default()
        };

        assert!(exec(&config, &["open", "assets", "Cash"]).contains("10001"));
        assert!(exec(&config, &["open", "income", "Sales"]).contains("40001"));
        exec(
            &config,
            &[
                "post", "--debit", "10001", "--credit", "40001", "--amount", "2000.00", "--date",
                "2024-10-14",
            ],
        );

        let journal = exec(&config, &["journal"]);
        assert!(journal.contains("2000.00"));

        let report: serde_json::Value =
            serde_json::from_str(&exec(&config, &["report", "--json"])).unwrap();
        assert_eq!(report["totals"]["net_income"], "2000.00");

        let early = exec(&config, &["report", "--json", "--as-of", "2024-10-13"]);
        let early: serde_json::Value = serde_json::from_str(&early).unwrap();
        assert_eq!(early["totals"]["net_income"], "0");
    }

    #[test]
    fn refused_entry_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = LedgerConfig {
            data_path: dir.path().join("books.json"),
            ..LedgerConfig::default()
        };
        exec(&config, &["register", "10001", "Cash"]);

        let args = cli(&["post", "--debit", "10001", "--credit", "40001", "--amount", "5"]);
        let err = run(&args, &config, &mut Vec::new()).unwrap_err();
        assert!(format!("{err:#}").contains("40001"));
    }
}
