use crate::features::{
    export_snapshot, import_snapshot, parse_date, record_csv, Account, AccountError, AccountId,
    Amount, NewTransaction, Standing, Store, Transaction, TransactionId, TransactionType,
    ValidationError,
};
use anyhow::{bail, Context};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use std::fs::{self, File};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(
    name = "debt-ledger",
    version,
    about = "Keeps track of money lent to and borrowed from people"
)]
struct Cli {
    /// Ledger file, created on the first change
    #[clap(long, env = "DEBT_LEDGER_FILE", default_value = "debt-ledger.json")]
    file: PathBuf,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, PartialEq)]
enum Command {
    /// Every account with its balance
    List {
        /// Also print each account's history
        #[clap(long)]
        history: bool,
    },

    /// One account with its history, by party name or account id
    Show { account: String },

    /// Record money lent to or borrowed from someone
    Add {
        party: String,
        amount: String,
        /// lent or borrowed
        transaction_type: String,
        /// YYYY-MM-DD, defaults to today
        #[clap(long)]
        date: Option<String>,
    },

    /// Record a repayment against an account
    Pay {
        account: String,
        amount: String,
        #[clap(long)]
        date: Option<String>,
    },

    DeleteAccount {
        account: String,
        /// Skip the confirmation prompt
        #[clap(long)]
        yes: bool,
    },

    DeleteTransaction {
        account: String,
        transaction: String,
        #[clap(long)]
        yes: bool,
    },

    /// Write a backup of the whole ledger
    Export {
        #[clap(short, long)]
        output: Option<PathBuf>,
    },

    /// Replace the ledger with a backup, current or legacy format
    Import { input: PathBuf },

    /// Record rows of `party,amount,type,date` from a CSV file
    Batch { input: PathBuf },
}

pub fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut store = Store::open(&cli.file)
        .with_context(|| format!("Unable to open ledger {}", cli.file.display()))?;

    let stdin = io::stdin();
    let stdout = io::stdout();
    execute(cli.command, &mut store, &mut stdin.lock(), &mut stdout.lock())
}

fn execute(
    command: Command,
    store: &mut Store,
    input: &mut impl BufRead,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    match command {
        Command::List { history } => {
            if store.list_accounts().is_empty() {
                writeln!(out, "No debts recorded yet")?;
            }
            for account in store.list_accounts() {
                render_account(out, account, history)?;
            }
        }

        Command::Show { account } => {
            render_account(out, resolve(store, &account)?, true)?;
        }

        Command::Add {
            party,
            amount,
            transaction_type,
            date,
        } => {
            let new = NewTransaction::new(
                &party,
                amount.parse()?,
                transaction_type.parse()?,
                date_or_today(date)?,
            )?;
            let transaction = Account::add_transaction(new, store)?;
            render_transaction(out, &transaction)?;
        }

        Command::Pay {
            account,
            amount,
            date,
        } => {
            let amount: Amount = amount.parse()?;
            let date = date_or_today(date)?;
            let id = resolve(store, &account)?.get_id().clone();

            let transaction = Account::add_payment(&id, amount, date, store)?;
            render_transaction(out, &transaction)?;
        }

        Command::DeleteAccount { account, yes } => {
            let target = match resolve(store, &account) {
                Ok(found) => found,
                Err(_) => {
                    writeln!(out, "No account matches {account}, nothing to delete")?;
                    return Ok(());
                }
            };
            let id = target.get_id().clone();
            let prompt = format!(
                "Delete {} and its {} transactions?",
                target.get_party(),
                target.get_transactions().len()
            );

            if yes || confirm(input, out, &prompt)? {
                Account::delete(&id, store)?;
                writeln!(out, "Deleted")?;
            }
        }

        Command::DeleteTransaction {
            account,
            transaction,
            yes,
        } => {
            let id = match resolve(store, &account) {
                Ok(found) => found.get_id().clone(),
                Err(_) => AccountId::from(account.as_str()),
            };
            let transaction_id = TransactionId::from(transaction);

            if yes || confirm(input, out, &format!("Delete transaction {transaction_id}?"))? {
                if Account::delete_transaction(&id, &transaction_id, store)? {
                    writeln!(out, "Deleted")?;
                } else {
                    writeln!(out, "No such transaction, nothing to delete")?;
                }
            }
        }

        Command::Export { output } => {
            let path = output.unwrap_or_else(|| PathBuf::from(backup_file_name(today())));
            fs::write(&path, export_snapshot(store)?)
                .with_context(|| format!("Unable to write {}", path.display()))?;
            writeln!(
                out,
                "Exported {} accounts to {}",
                store.list_accounts().len(),
                path.display()
            )?;
        }

        Command::Import { input: path } => {
            let raw = fs::read_to_string(&path)
                .with_context(|| format!("Unable to read {}", path.display()))?;
            if !import_snapshot(store, &raw) {
                bail!("Import failed, {} is not a ledger backup", path.display());
            }
            writeln!(out, "Imported {} accounts", store.list_accounts().len())?;
        }

        Command::Batch { input: path } => {
            let file = File::open(&path)
                .with_context(|| format!("Unable to read {}", path.display()))?;
            let summary = record_csv(file, store)?;
            writeln!(
                out,
                "Recorded {} transactions, skipped {}",
                summary.recorded, summary.skipped
            )?;
        }
    }

    Ok(())
}

/// Looks an account up by id first, then by party name.
fn resolve<'a>(store: &'a Store, reference: &str) -> Result<&'a Account, AccountError> {
    let id = AccountId::from(reference);
    store
        .find(&id)
        .or_else(|| store.find_by_party(reference))
        .ok_or(AccountError::NotFound(id))
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

fn date_or_today(date: Option<String>) -> Result<NaiveDate, ValidationError> {
    date.as_deref().map_or_else(|| Ok(today()), parse_date)
}

fn backup_file_name(date: NaiveDate) -> String {
    format!("debt-ledger-backup-{}.json", date.format("%Y-%m-%d"))
}

fn confirm(input: &mut impl BufRead, out: &mut impl Write, prompt: &str) -> io::Result<bool> {
    write!(out, "{prompt} [y/N] ")?;
    out.flush()?;

    let mut answer = String::new();
    input.read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}

fn standing_label(standing: Standing) -> &'static str {
    match standing {
        Standing::Owed => "owes you",
        Standing::Owing => "you owe",
        Standing::Settled => "settled",
    }
}

fn type_label(transaction_type: TransactionType) -> &'static str {
    match transaction_type {
        TransactionType::Lent => "Loan",
        TransactionType::Borrowed => "Borrowing",
        TransactionType::Payment => "Payment",
    }
}

fn render_account(out: &mut impl Write, account: &Account, history: bool) -> io::Result<()> {
    let balance = account.calculate_balance();
    let last = account
        .last_transaction()
        .map(|t| format!("  last {}", t.get_date()))
        .unwrap_or_default();

    match account.standing() {
        Standing::Settled => writeln!(out, "{}: settled{last}", account.get_party())?,
        standing => writeln!(
            out,
            "{}: {} {:.2}{last}",
            account.get_party(),
            standing_label(standing),
            balance.abs()
        )?,
    }

    if history {
        writeln!(
            out,
            "  account {} opened {}",
            account.get_id(),
            account.get_created_at().date_naive()
        )?;
        if account.get_transactions().is_empty() {
            writeln!(out, "  no transactions yet")?;
        }
        for transaction in account.history() {
            write!(out, "  ")?;
            render_transaction(out, transaction)?;
        }
    }
    Ok(())
}

fn render_transaction(out: &mut impl Write, transaction: &Transaction) -> io::Result<()> {
    let sign = if transaction.get_amount().is_sign_positive() { "+" } else { "" };
    writeln!(
        out,
        "{sign}{:.2} {} {} [{}]",
        transaction.get_amount(),
        type_label(transaction.get_transaction_type()),
        transaction.get_date(),
        transaction.get_id()
    )
}
