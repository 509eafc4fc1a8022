use chrono::NaiveDate;
use ledgermend_core::{BankTransaction, BankTransactionId, ReconStatus};
use sqlx::SqliteConnection;

use crate::db::parse_timestamp;

type BankRow = (
    i64,
    String,
    NaiveDate,
    Option<NaiveDate>,
    String,
    Option<i64>,
    Option<i64>,
    Option<i64>,
    String,
    String,
    String,
    String,
);

const BANK_COLUMNS: &str = "id, account_number, transaction_date, posted_date, description, \
     debit_cents, credit_cents, bank_balance_cents, source_file, content_hash, status, created_at";

fn from_row(r: BankRow) -> BankTransaction {
    BankTransaction {
        id: Some(BankTransactionId(r.0)),
        account_number: r.1,
        transaction_date: r.2,
        posted_date: r.3,
        description: r.4,
        debit_cents: r.5,
        credit_cents: r.6,
        bank_balance_cents: r.7,
        source_file: r.8,
        content_hash: r.9,
        status: r.10.parse().unwrap_or(ReconStatus::Unreconciled),
        created_at: parse_timestamp(&r.11),
    }
}

pub async fn insert_bank_transaction(
    conn: &mut SqliteConnection,
    tx: &BankTransaction,
) -> Result<i64, sqlx::Error> {
    let row = sqlx::query_as::<_, (i64,)>(
        r#"
        INSERT INTO bank_transactions
            (account_number, transaction_date, posted_date, description,
             debit_cents, credit_cents, bank_balance_cents, source_file, content_hash, status)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(&tx.account_number)
    .bind(tx.transaction_date)
    .bind(tx.posted_date)
    .bind(&tx.description)
    .bind(tx.debit_cents)
    .bind(tx.credit_cents)
    .bind(tx.bank_balance_cents)
    .bind(&tx.source_file)
    .bind(&tx.content_hash)
    .bind(tx.status.as_str())
    .fetch_one(conn)
    .await?;
    Ok(row.0)
}

pub async fn find_id_by_content_hash(
    conn: &mut SqliteConnection,
    content_hash: &str,
) -> Result<Option<i64>, sqlx::Error> {
    let row = sqlx::query_as::<_, (i64,)>("SELECT id FROM bank_transactions WHERE content_hash = ?")
        .bind(content_hash)
        .fetch_optional(conn)
        .await?;
    Ok(row.map(|r| r.0))
}

pub async fn get_bank_transaction(
    conn: &mut SqliteConnection,
    id: i64,
) -> Result<Option<BankTransaction>, sqlx::Error> {
    let row = sqlx::query_as::<_, BankRow>(&format!(
        "SELECT {BANK_COLUMNS} FROM bank_transactions WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(conn)
    .await?;
    Ok(row.map(from_row))
}

/// Unreconciled transactions in insertion order, optionally bounded.
pub async fn list_unreconciled(
    conn: &mut SqliteConnection,
    limit: Option<i64>,
) -> Result<Vec<BankTransaction>, sqlx::Error> {
    let rows = sqlx::query_as::<_, BankRow>(&format!(
        "SELECT {BANK_COLUMNS} FROM bank_transactions WHERE status = 'unreconciled' \
         ORDER BY id LIMIT ?"
    ))
    .bind(limit.unwrap_or(-1))
    .fetch_all(conn)
    .await?;
    Ok(rows.into_iter().map(from_row).collect())
}

pub async fn list_by_status(
    conn: &mut SqliteConnection,
    status: ReconStatus,
) -> Result<Vec<BankTransaction>, sqlx::Error> {
    let rows = sqlx::query_as::<_, BankRow>(&format!(
        "SELECT {BANK_COLUMNS} FROM bank_transactions WHERE status = ? ORDER BY id"
    ))
    .bind(status.as_str())
    .fetch_all(conn)
    .await?;
    Ok(rows.into_iter().map(from_row).collect())
}

/// Unreconciled transactions dated on or before `cutoff` — candidates for
/// the stale-unmatched finding.
pub async fn list_unreconciled_on_or_before(
    conn: &mut SqliteConnection,
    cutoff: NaiveDate,
) -> Result<Vec<BankTransaction>, sqlx::Error> {
    let rows = sqlx::query_as::<_, BankRow>(&format!(
        "SELECT {BANK_COLUMNS} FROM bank_transactions \
         WHERE status = 'unreconciled' AND transaction_date <= ? ORDER BY id"
    ))
    .bind(cutoff)
    .fetch_all(conn)
    .await?;
    Ok(rows.into_iter().map(from_row).collect())
}

pub async fn update_status(
    conn: &mut SqliteConnection,
    id: i64,
    status: ReconStatus,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE bank_transactions SET status = ? WHERE id = ?")
        .bind(status.as_str())
        .bind(id)
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn count_by_status(
    conn: &mut SqliteConnection,
    status: ReconStatus,
) -> Result<i64, sqlx::Error> {
    let row = sqlx::query_as::<_, (i64,)>("SELECT COUNT(*) FROM bank_transactions WHERE status = ?")
        .bind(status.as_str())
        .fetch_one(conn)
        .await?;
    Ok(row.0)
}

pub async fn count_all(conn: &mut SqliteConnection) -> Result<i64, sqlx::Error> {
    let row = sqlx::query_as::<_, (i64,)>("SELECT COUNT(*) FROM bank_transactions")
        .fetch_one(conn)
        .await?;
    Ok(row.0)
}

/// Raw delete. Callers must go through the audited correction path in
/// `audit`; this is not exported from the crate root.
pub(crate) async fn delete_bank_transaction(
    conn: &mut SqliteConnection,
    id: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM bank_transactions WHERE id = ?")
        .bind(id)
        .execute(conn)
        .await?;
    Ok(())
}
