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

use clap::Parser;
use csv::{ReaderBuilder, Trim, Writer};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::PathBuf;
use std::process;
use tracing::warn;
use tracing_subscriber::EnvFilter;
use transfer_ledger_rs::{
    AccountId, AccountStatus, AuthorizationId, Currency, InMemoryLedger, Money, TransferRequest,
};

/// Transfer Ledger - process ledger command CSV files
///
/// Reads commands from a CSV file, runs them against an in-memory ledger,
/// and outputs final account states to stdout. Supports opening accounts,
/// transfers, the global transfer limit, status changes, and approval
/// decisions.
#[derive(Parser, Debug)]
#[command(name = "transfer-ledger-rs")]
#[command(about = "A money-transfer ledger that processes command CSVs", long_about = None)]
struct Args {
    /// Path to CSV file with ledger commands
    ///
    /// Expected format: type,account,counterparty,amount,currency,detail
    /// Example: cargo run -- commands.csv > accounts.csv
    #[arg(value_name = "FILE")]
    input: PathBuf,
}

fn main() {
    // Diagnostics go to stderr so stdout stays machine-readable CSV.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let file = match File::open(&args.input) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Error opening file '{}': {}", args.input.display(), e);
            process::exit(1);
        }
    };

    let ledger = match process_commands(BufReader::new(file)) {
        Ok(ledger) => ledger,
        Err(e) => {
            eprintln!("Error processing commands: {}", e);
            process::exit(1);
        }
    };

    if let Err(e) = write_accounts(&ledger, std::io::stdout()) {
        eprintln!("Error writing output: {}", e);
        process::exit(1);
    }
}

/// Raw CSV record matching the input format.
///
/// Fields: `type, account, counterparty, amount, currency, detail`
#[derive(Debug, Deserialize)]
struct CsvCommand {
    #[serde(rename = "type")]
    command: String,
    #[serde(deserialize_with = "csv::invalid_option")]
    account: Option<u64>,
    #[serde(deserialize_with = "csv::invalid_option")]
    counterparty: Option<u64>,
    #[serde(deserialize_with = "csv::invalid_option")]
    amount: Option<Decimal>,
    currency: Option<String>,
    detail: Option<String>,
}

impl CsvCommand {
    fn currency(&self) -> Option<Currency> {
        self.currency.as_deref().and_then(|code| code.parse().ok())
    }

    fn detail(&self) -> Option<&str> {
        self.detail.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }
}

/// Applies one command to the ledger; errors are reported by the caller.
fn apply_command(ledger: &InMemoryLedger, record: &CsvCommand) -> Result<(), String> {
    match record.command.to_lowercase().as_str() {
        "open" => {
            let holder = record.detail().ok_or("missing holder name")?;
            let currency = record.currency().ok_or("missing currency")?;
            let opening = record.amount.ok_or("missing opening balance")?;
            let account = ledger
                .admin
                .open_account(holder, Money::of(opening, currency))
                .map_err(|e| e.to_string())?;
            tracing::info!(account = %account.id(), holder, "opened");
            Ok(())
        }
        "transfer" => {
            let source = AccountId(record.account.ok_or("missing source account")?);
            let destination = AccountId(record.counterparty.ok_or("missing destination account")?);
            let amount = record.amount.ok_or("missing amount")?;
            let currency = record.currency().ok_or("missing currency")?;
            let key = record.detail().ok_or("missing idempotency key")?;
            ledger
                .engine
                .transfer(&TransferRequest::new(source, destination, amount, currency, key))
                .map(|_| ())
                .map_err(|e| e.to_string())
        }
        "limit" => {
            let limit = match (record.amount, record.currency()) {
                (Some(amount), Some(currency)) => Some(Money::of(amount, currency)),
                _ => None,
            };
            ledger.limits.set_limit(limit).map_err(|e| e.to_string())
        }
        "status" => {
            let id = AccountId(record.account.ok_or("missing account")?);
            let status: AccountStatus = record
                .detail()
                .ok_or("missing status")?
                .parse()
                .map_err(|e: transfer_ledger_rs::TransferError| e.to_string())?;
            ledger
                .admin
                .change_status(id, status)
                .map(|_| ())
                .map_err(|e| e.to_string())
        }
        "approve" => {
            let id = AuthorizationId(record.account.ok_or("missing authorization id")?);
            ledger
                .approvals
                .approve(id)
                .map(|_| ())
                .map_err(|e| e.to_string())
        }
        "reject" => {
            let id = AuthorizationId(record.account.ok_or("missing authorization id")?);
            let reason = record.detail().unwrap_or("rejected by administrator");
            ledger.approvals.reject(id, reason).map_err(|e| e.to_string())
        }
        other => Err(format!("unknown command type: {other}")),
    }
}

/// Process ledger commands from a CSV reader.
///
/// Uses streaming parsing, so arbitrarily large command files never load
/// fully into memory. Malformed rows and failed commands are logged and
/// skipped; processing continues.
///
/// # CSV Format
///
/// Expected columns: `type, account, counterparty, amount, currency, detail`
/// - `open`: detail = holder name, amount = opening balance
/// - `transfer`: account = source, counterparty = destination,
///   detail = idempotency key
/// - `limit`: amount + currency set the global limit; empty amount clears it
/// - `status`: detail = ACTIVE | LOCKED | CLOSED
/// - `approve` / `reject`: account = authorization id, detail = reason
///
/// # Example
///
/// ```csv
/// type,account,counterparty,amount,currency,detail
/// open,,,500.00,USD,Alice
/// open,,,200.00,USD,Bob
/// transfer,1,2,100.00,USD,key-1
/// ```
///
/// # Errors
///
/// Returns a CSV error if the reader fails or the CSV structure is invalid.
pub fn process_commands<R: Read>(reader: R) -> Result<InMemoryLedger, csv::Error> {
    let ledger = InMemoryLedger::new();

    let mut rdr = ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true)
        .has_headers(true)
        .from_reader(reader);

    for result in rdr.deserialize::<CsvCommand>() {
        match result {
            Ok(record) => {
                if let Err(reason) = apply_command(&ledger, &record) {
                    warn!(command = %record.command, %reason, "skipping command");
                }
            }
            Err(e) => {
                warn!(error = %e, "skipping malformed row");
                continue;
            }
        }
    }

    Ok(ledger)
}

/// Write final account states to a CSV writer.
///
/// # CSV Format
///
/// Columns: `id, holder, balance, currency, status, version`
///
/// # Errors
///
/// Returns a CSV error if writing fails.
pub fn write_accounts<W: Write>(ledger: &InMemoryLedger, writer: W) -> Result<(), csv::Error> {
    let mut wtr = Writer::from_writer(writer);

    for account in ledger.admin.accounts() {
        wtr.serialize(&account)?;
    }

    wtr.flush()?;
    Ok(())
}
