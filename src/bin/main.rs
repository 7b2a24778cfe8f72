// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


use clap::{Args, Parser, Subcommand};
use commission_ledger::logging::init_logging;
use commission_ledger::{
    ConfigError, Engine, InMemoryBalanceStore, InMemoryTransactionLog, LedgerSettings, Transaction,
    UserId, api,
};
use csv::{ReaderBuilder, Trim, Writer};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info, warn};

/// Commission Ledger - customer/restaurant balances with chained commissions
#[derive(Parser, Debug)]
#[command(name = "commission-ledger")]
#[command(about = "Records transactions and reconciles balances asynchronously", long_about = None)]
struct Cli {
    /// Log level or filter directives (RUST_LOG takes precedence)
    #[arg(long, env = "LOG_LEVEL", default_value = "info", global = true)]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long, env = "LOG_JSON", global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the HTTP API
    Serve(ServeArgs),
    /// Replay a CSV of deposits and purchases and print the resulting balances
    Replay(ReplayArgs),
}

#[derive(Args, Debug)]
struct ServeArgs {
    #[arg(long, env = "SERVER_HOST", default_value = "0.0.0.0")]
    host: String,

    #[arg(long, env = "SERVER_PORT", default_value_t = 8081)]
    port: u16,

    #[command(flatten)]
    ledger: LedgerSettings,
}

#[derive(Args, Debug)]
struct ReplayArgs {
    /// Path to CSV file with transactions
    ///
    /// Expected format: type,customer,restaurant,amount
    /// Example: commission-ledger replay transactions.csv > balances.csv
    #[arg(value_name = "FILE")]
    input: PathBuf,

    #[command(flatten)]
    ledger: LedgerSettings,
}

#[derive(Error, Debug)]
enum CliError {
    #[error("invalid settings: {0}")]
    Config(#[from] ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = init_logging(&cli.log_level, cli.json_logs) {
        eprintln!("Error initialising logging: {}", e);
        process::exit(1);
    }

    let result = match cli.command {
        Command::Serve(args) => serve(args).await,
        Command::Replay(args) => replay(args).await,
    };

    if let Err(e) = result {
        error!(error = %e, "ledger exited with an error");
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn in_memory_engine(settings: LedgerSettings) -> Result<Engine, ConfigError> {
    Engine::start(
        Arc::new(InMemoryTransactionLog::new()),
        Arc::new(InMemoryBalanceStore::new()),
        settings,
    )
}

async fn serve(args: ServeArgs) -> Result<(), CliError> {
    let engine = Arc::new(in_memory_engine(args.ledger)?);

    let listener = TcpListener::bind((args.host.as_str(), args.port)).await?;
    info!(addr = %listener.local_addr()?, "ledger API listening");

    api::serve(listener, Arc::clone(&engine), shutdown_signal()).await?;

    info!("HTTP server stopped, stopping reconciliation");
    engine.shutdown().await;
    Ok(())
}

/// Resolves on Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("shutdown signal received");
}

async fn replay(args: ReplayArgs) -> Result<(), CliError> {
    let file = File::open(&args.input)?;
    let engine = in_memory_engine(args.ledger)?;

    let users = process_transactions(&engine, BufReader::new(file)).await?;
    engine.wait_idle().await;

    write_balances(&engine, &users, std::io::stdout()).await?;
    engine.shutdown().await;
    Ok(())
}

/// Raw CSV record matching the replay input format.
///
/// Fields: `type, customer, restaurant, amount`
#[derive(Debug, Deserialize)]
struct CsvRecord {
    #[serde(rename = "type")]
    tx_type: String,
    customer: String,
    #[serde(default)]
    restaurant: Option<String>,
    #[serde(deserialize_with = "csv::invalid_option")]
    amount: Option<Decimal>,
}

enum Entry {
    Deposit {
        customer: String,
        amount: Decimal,
    },
    Purchase {
        customer: String,
        restaurant: String,
        amount: Decimal,
    },
}

impl CsvRecord {
    /// Returns `None` for unknown types or missing required fields.
    fn into_entry(self) -> Option<Entry> {
        let amount = self.amount?;
        match self.tx_type.to_lowercase().as_str() {
            "deposit" => Some(Entry::Deposit {
                customer: self.customer,
                amount,
            }),
            "purchase" => Some(Entry::Purchase {
                customer: self.customer,
                restaurant: self.restaurant.filter(|r| !r.is_empty())?,
                amount,
            }),
            _ => None,
        }
    }
}

/// Records every valid row through `engine`.
///
/// Malformed rows and rows the engine rejects are skipped with a warning.
/// Returns every user a recorded transaction touched.
///
/// # CSV Format
///
/// ```csv
/// type,customer,restaurant,amount
/// deposit,c1,,100.0
/// purchase,c1,r1,40.0
/// ```
///
/// # Errors
///
/// Returns a CSV error if the header cannot be read.
async fn process_transactions<R: Read>(
    engine: &Engine,
    reader: R,
) -> Result<BTreeSet<UserId>, csv::Error> {
    let mut users = BTreeSet::new();

    let mut rdr = ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true)
        .has_headers(true)
        .from_reader(reader);
    rdr.headers()?;

    for result in rdr.deserialize::<CsvRecord>() {
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                warn!(error = %e, "skipping malformed row");
                continue;
            }
        };
        let Some(entry) = record.into_entry() else {
            warn!("skipping invalid transaction record");
            continue;
        };

        let recorded = match entry {
            Entry::Deposit { customer, amount } => engine.deposit(customer, amount).await,
            Entry::Purchase {
                customer,
                restaurant,
                amount,
            } => engine.purchase(customer, restaurant, amount).await,
        };
        match recorded {
            Ok(transaction) => users.extend(participants(&transaction)),
            Err(e) => warn!(error = %e, "skipping rejected transaction"),
        }
    }

    Ok(users)
}

fn participants(transaction: &Transaction) -> impl Iterator<Item = UserId> + '_ {
    transaction
        .customer()
        .into_iter()
        .chain(transaction.restaurant())
        .map(|user| user.id.clone())
}

/// Writes the balance of each user in `users` as CSV.
///
/// Columns: `userId, amount, totalCommission`
async fn write_balances<W: Write>(
    engine: &Engine,
    users: &BTreeSet<UserId>,
    writer: W,
) -> Result<(), CliError> {
    let mut balances = Vec::with_capacity(users.len());
    for user in users {
        match engine.get_balance(user).await {
            Ok(balance) => balances.push(balance),
            Err(e) => warn!(error = %e, user = %user, "skipping unreadable balance"),
        }
    }

    let mut wtr = Writer::from_writer(writer);
    for balance in &balances {
        wtr.serialize(balance)?;
    }
    wtr.flush()?;
    Ok(())
}
