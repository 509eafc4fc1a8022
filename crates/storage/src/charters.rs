use chrono::NaiveDate;
use ledgermend_core::{Charter, CharterStatus};
use sqlx::SqliteConnection;

use crate::db::parse_timestamp;

type CharterRow = (
    i64,
    String,
    Option<String>,
    Option<NaiveDate>,
    Option<i64>,
    i64,
    i64,
    String,
    i64,
    String,
);

const CHARTER_COLUMNS: &str = "id, reserve_number, client, charter_date, total_due_cents, \
     paid_cents, balance_cents, status, needs_review, created_at";

fn from_row(r: CharterRow) -> Charter {
    Charter {
        id: Some(r.0),
        reserve_number: r.1,
        client: r.2,
        charter_date: r.3,
        total_due_cents: r.4,
        paid_cents: r.5,
        balance_cents: r.6,
        status: r.7.parse().unwrap_or(CharterStatus::Active),
        needs_review: r.8 != 0,
        created_at: parse_timestamp(&r.9),
    }
}

pub async fn insert_charter(
    conn: &mut SqliteConnection,
    charter: &Charter,
) -> Result<i64, sqlx::Error> {
    let row = sqlx::query_as::<_, (i64,)>(
        r#"
        INSERT INTO charters
            (reserve_number, client, charter_date, total_due_cents,
             paid_cents, balance_cents, status, needs_review)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(&charter.reserve_number)
    .bind(&charter.client)
    .bind(charter.charter_date)
    .bind(charter.total_due_cents)
    .bind(charter.paid_cents)
    .bind(charter.balance_cents)
    .bind(charter.status.as_str())
    .bind(charter.needs_review as i64)
    .fetch_one(conn)
    .await?;
    Ok(row.0)
}

pub async fn get_by_reserve(
    conn: &mut SqliteConnection,
    reserve_number: &str,
) -> Result<Option<Charter>, sqlx::Error> {
    let row = sqlx::query_as::<_, CharterRow>(&format!(
        "SELECT {CHARTER_COLUMNS} FROM charters WHERE reserve_number = ?"
    ))
    .bind(reserve_number)
    .fetch_optional(conn)
    .await?;
    Ok(row.map(from_row))
}

/// Write the derived fields. The balance recalculator is the only caller.
pub async fn update_derived(
    conn: &mut SqliteConnection,
    reserve_number: &str,
    paid_cents: i64,
    balance_cents: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE charters SET paid_cents = ?, balance_cents = ? WHERE reserve_number = ?")
        .bind(paid_cents)
        .bind(balance_cents)
        .bind(reserve_number)
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn set_needs_review(
    conn: &mut SqliteConnection,
    reserve_number: &str,
    needs_review: bool,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE charters SET needs_review = ? WHERE reserve_number = ?")
        .bind(needs_review as i64)
        .bind(reserve_number)
        .execute(conn)
        .await?;
    Ok(())
}

/// Cancellation policy: the amount due is forced to zero. The derived
/// fields are rewritten by the recalculator immediately afterwards, which
/// turns any prior payment into a credit balance.
pub async fn mark_cancelled(
    conn: &mut SqliteConnection,
    reserve_number: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE charters SET status = 'cancelled', total_due_cents = 0 WHERE reserve_number = ?")
        .bind(reserve_number)
        .execute(conn)
        .await?;
    Ok(())
}

/// Reserve numbers in stable order for chunked batch recalculation.
pub async fn list_reserve_numbers(
    conn: &mut SqliteConnection,
    offset: i64,
    limit: i64,
) -> Result<Vec<String>, sqlx::Error> {
    let rows = sqlx::query_as::<_, (String,)>(
        "SELECT reserve_number FROM charters ORDER BY reserve_number LIMIT ? OFFSET ?",
    )
    .bind(limit)
    .bind(offset)
    .fetch_all(conn)
    .await?;
    Ok(rows.into_iter().map(|r| r.0).collect())
}

pub async fn count_all(conn: &mut SqliteConnection) -> Result<i64, sqlx::Error> {
    let row = sqlx::query_as::<_, (i64,)>("SELECT COUNT(*) FROM charters")
        .fetch_one(conn)
        .await?;
    Ok(row.0)
}
