use std::io;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::Money;
use crate::history::HistoryRow;
use crate::model::{BalanceTransaction, TransactionKind, TxId};
use crate::money::ParseMoneyError;

/// Errors that can occur when reading or writing csv files
#[derive(Debug, Error)]
pub enum CsvError {
    #[error("failed to open {path}: {source}")]
    Open { path: String, source: csv::Error },

    #[error("line {line}: failed to parse row: {source}")]
    Parse { line: usize, source: csv::Error },

    #[error("line {line}: unrecognized transaction type '{tx_type}'")]
    UnrecognizedType { line: usize, tx_type: String },

    #[error("line {line}: {kind} missing amount")]
    MissingAmount { line: usize, kind: TransactionKind },

    #[error("line {line}: {source}")]
    InvalidAmount { line: usize, source: ParseMoneyError },

    #[error("line {line}: invalid timestamp '{raw}'")]
    InvalidTimestamp { line: usize, raw: String },

    #[error("transaction {tx}: running balance out of range")]
    BalanceOverflow { tx: TxId },

    #[error("failed to write csv: {0}")]
    Write(#[from] csv::Error),

    #[error("failed to write csv: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Deserialize)]
struct InputRow {
    id: TxId,
    r#type: String,
    amount: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    created_at: Option<String>,
}

#[derive(Debug, Serialize)]
struct StatementRow<'a> {
    id: TxId,
    r#type: &'static str,
    amount: String,
    balance: String,
    description: &'a str,
}

#[derive(Debug, Serialize)]
struct BetRow {
    r#match: String,
    bet: &'static str,
    stake: String,
    odds: String,
    status: &'static str,
    payout: String,
    estimate: String,
    placed_at: String,
}

/// Read balance transactions from a csv file with the columns
/// `id,type,amount[,description][,created_at]`.
///
/// Rows without a timestamp are stamped with the read time.
pub fn read_transactions(
    path: impl AsRef<Path>,
) -> Result<impl Iterator<Item = Result<BalanceTransaction, CsvError>>, CsvError> {
    let path = path.as_ref();
    let reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_path(path)
        .map_err(|source| CsvError::Open {
            path: path.display().to_string(),
            source,
        })?;

    Ok(reader
        .into_deserialize::<InputRow>()
        .enumerate()
        .map(|(idx, result)| {
            let line = idx + 2; // 1-indexed, skip header
            let row = result.map_err(|source| CsvError::Parse { line, source })?;
            parse_row(line, row)
        }))
}

fn parse_row(line: usize, row: InputRow) -> Result<BalanceTransaction, CsvError> {
    let kind: TransactionKind = row
        .r#type
        .parse()
        .map_err(|_| CsvError::UnrecognizedType {
            line,
            tx_type: row.r#type.clone(),
        })?;
    let raw_amount = row
        .amount
        .filter(|a| !a.is_empty())
        .ok_or(CsvError::MissingAmount { line, kind })?;
    let amount: Money = raw_amount
        .parse()
        .map_err(|source| CsvError::InvalidAmount { line, source })?;
    let created_at = match row.created_at.filter(|c| !c.is_empty()) {
        Some(raw) => DateTime::parse_from_rfc3339(&raw)
            .map(|d| d.with_timezone(&Utc))
            .map_err(|_| CsvError::InvalidTimestamp { line, raw })?,
        None => Utc::now(),
    };

    Ok(BalanceTransaction {
        id: row.id,
        kind,
        amount,
        description: row.description.unwrap_or_default(),
        created_at,
    })
}

/// Write applied transactions with the running balance after each one.
pub fn write_statement<'a>(
    out: impl io::Write,
    initial: Money,
    applied: impl IntoIterator<Item = &'a BalanceTransaction>,
) -> Result<Money, CsvError> {
    let mut writer = csv::Writer::from_writer(out);
    let mut balance = initial;

    for tx in applied {
        balance = tx
            .apply_to(balance)
            .ok_or(CsvError::BalanceOverflow { tx: tx.id })?;
        writer.serialize(StatementRow {
            id: tx.id,
            r#type: tx.kind.as_str(),
            amount: tx.amount.to_string(),
            balance: balance.to_string(),
            description: &tx.description,
        })?;
    }

    writer.flush()?;
    Ok(balance)
}

/// Write reconciled bet history rows. Pending bets have no payout, only the
/// stake x odds estimate.
pub fn write_bets<'a>(
    out: impl io::Write,
    rows: impl IntoIterator<Item = &'a HistoryRow>,
) -> Result<(), CsvError> {
    let mut writer = csv::Writer::from_writer(out);

    for row in rows {
        let entry = &row.entry;
        let render = |m: Option<Money>| m.map(|m| m.to_string()).unwrap_or_default();
        writer.serialize(BetRow {
            r#match: row.label.to_string(),
            bet: entry.outcome().as_str(),
            stake: entry.stake().to_string(),
            odds: entry.odds().to_string(),
            status: row.status_label(),
            payout: render(entry.displayed_payout()),
            estimate: render(entry.display_estimate()),
            placed_at: entry.created_at().to_rfc3339(),
        })?;
    }

    writer.flush()?;
    Ok(())
}
