use chrono::NaiveDate;
use ledgermend_core::{BankTransaction, ReconStatus};
use ledgermend_storage::{bank, Session};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;
use std::str::FromStr;
use thiserror::Error;

use crate::fingerprint::fingerprint;

/// One statement line as handed over by the export tooling. Amounts and
/// dates arrive as strings and are validated here; `account_number` and
/// `running_balance` are trusted as given, never re-derived.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BankRow {
    pub account_number: String,
    pub transaction_date: String,
    pub posted_date: Option<String>,
    pub description: String,
    pub debit_amount: Option<String>,
    pub credit_amount: Option<String>,
    pub running_balance: Option<String>,
    pub source_file: String,
}

/// Why a single row was rejected. Rejection is per-row; it never aborts
/// the batch and never leaves a partial insert.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RowError {
    #[error("Invalid date: '{0}'")]
    InvalidDate(String),
    #[error("Invalid amount: '{0}'")]
    InvalidAmount(String),
    #[error("Row has neither a debit nor a credit amount")]
    MissingAmount,
    #[error("Row has both a debit and a credit amount")]
    ConflictingAmounts,
}

#[derive(Error, Debug)]
pub enum ImportError {
    #[error("Storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

#[derive(Debug)]
pub enum RowOutcome {
    Inserted(i64),
    /// A transaction with the same fingerprint already exists. Expected on
    /// rerun; not an error.
    Duplicate,
    Rejected(RowError),
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct ImportSummary {
    pub read: usize,
    pub inserted: usize,
    pub duplicates: usize,
    pub rejected: usize,
}

pub fn parse_date(s: &str) -> Result<NaiveDate, RowError> {
    let s = s.trim();
    for fmt in &[
        "%Y-%m-%d", "%m/%d/%Y", "%d/%m/%Y", "%Y/%m/%d", "%m-%d-%Y", "%d-%m-%Y",
    ] {
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            return Ok(date);
        }
    }
    Err(RowError::InvalidDate(s.to_string()))
}

/// Parse the amount shapes bank exports actually produce: `1,234.56`,
/// `$99.99`, `(75.25)` for negatives.
fn parse_cents(s: &str) -> Option<i64> {
    let s = s.trim();
    let (negative, s) = if s.starts_with('(') && s.ends_with(')') {
        (true, &s[1..s.len() - 1])
    } else {
        (false, s)
    };
    let s = s.replace([',', '$', ' '], "");
    if s.is_empty() {
        return None;
    }
    let mut dec = Decimal::from_str(&s).ok()?;
    if negative {
        dec = -dec;
    }
    (dec * Decimal::from(100)).round().to_i64()
}

/// Statement debit/credit columns are magnitudes, so the result must come
/// out strictly positive.
pub fn parse_amount(s: &str) -> Result<i64, RowError> {
    let cents = parse_cents(s).ok_or_else(|| RowError::InvalidAmount(s.to_string()))?;
    if cents <= 0 {
        return Err(RowError::InvalidAmount(s.to_string()));
    }
    Ok(cents)
}

/// Validate one raw row into an insertable transaction, computing its
/// fingerprint along the way.
pub fn validate_row(row: &BankRow) -> Result<BankTransaction, RowError> {
    let transaction_date = parse_date(&row.transaction_date)?;
    let posted_date = row.posted_date.as_deref().map(parse_date).transpose()?;

    let debit_cents = row.debit_amount.as_deref().map(parse_amount).transpose()?;
    let credit_cents = row.credit_amount.as_deref().map(parse_amount).transpose()?;
    match (debit_cents, credit_cents) {
        (None, None) => return Err(RowError::MissingAmount),
        (Some(_), Some(_)) => return Err(RowError::ConflictingAmounts),
        _ => {}
    }

    // The running balance is trusted input; a malformed one still rejects
    // the row rather than storing a half-parsed line.
    let bank_balance_cents = match row.running_balance.as_deref() {
        Some(raw) => {
            Some(parse_cents(raw).ok_or_else(|| RowError::InvalidAmount(raw.to_string()))?)
        }
        None => None,
    };

    let content_hash = fingerprint(transaction_date, &row.description, debit_cents, credit_cents);

    Ok(BankTransaction {
        id: None,
        account_number: row.account_number.clone(),
        transaction_date,
        posted_date,
        description: row.description.clone(),
        debit_cents,
        credit_cents,
        bank_balance_cents,
        source_file: row.source_file.clone(),
        content_hash,
        status: ReconStatus::Unreconciled,
        created_at: None,
    })
}

/// Idempotency guard around a single insert: a row whose fingerprint is
/// already present is skipped, everything else lands as `unreconciled`.
/// No matching happens here.
pub async fn import_row(
    conn: &mut SqliteConnection,
    row: &BankRow,
) -> Result<RowOutcome, ImportError> {
    let tx = match validate_row(row) {
        Ok(tx) => tx,
        Err(e) => return Ok(RowOutcome::Rejected(e)),
    };

    if bank::find_id_by_content_hash(conn, &tx.content_hash)
        .await?
        .is_some()
    {
        return Ok(RowOutcome::Duplicate);
    }

    let id = bank::insert_bank_transaction(conn, &tx).await?;
    Ok(RowOutcome::Inserted(id))
}

/// Import a batch of rows inside one session. Malformed rows are logged
/// and counted, duplicates skipped silently.
pub async fn import_rows(
    session: &mut Session,
    rows: &[BankRow],
    limit: Option<usize>,
) -> Result<ImportSummary, ImportError> {
    let mut summary = ImportSummary::default();
    let bounded = match limit {
        Some(n) => &rows[..rows.len().min(n)],
        None => rows,
    };

    for row in bounded {
        summary.read += 1;
        match import_row(session.conn(), row).await? {
            RowOutcome::Inserted(id) => {
                tracing::debug!(id, source = %row.source_file, "imported bank transaction");
                summary.inserted += 1;
            }
            RowOutcome::Duplicate => summary.duplicates += 1,
            RowOutcome::Rejected(err) => {
                tracing::warn!(
                    source = %row.source_file,
                    date = %row.transaction_date,
                    description = %row.description,
                    "rejected bank row: {err}"
                );
                summary.rejected += 1;
            }
        }
    }

    tracing::info!(
        read = summary.read,
        inserted = summary.inserted,
        duplicates = summary.duplicates,
        rejected = summary.rejected,
        "import batch complete"
    );
    Ok(summary)
}
