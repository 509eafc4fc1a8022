use chrono::NaiveDate;
use ledgermend_core::{DateRange, Payment, PaymentMethod};
use sqlx::SqliteConnection;

use crate::db::parse_timestamp;

type PaymentRow = (
    i64,
    String,
    i64,
    NaiveDate,
    String,
    Option<i64>,
    String,
);

const PAYMENT_COLUMNS: &str =
    "id, reserve_number, amount_cents, payment_date, method, banking_transaction_id, created_at";

fn from_row(r: PaymentRow) -> Payment {
    Payment {
        id: Some(r.0),
        reserve_number: r.1,
        amount_cents: r.2,
        payment_date: r.3,
        method: r.4.parse().unwrap_or(PaymentMethod::Other),
        banking_transaction_id: r.5,
        created_at: parse_timestamp(&r.6),
    }
}

pub async fn insert_payment(
    conn: &mut SqliteConnection,
    payment: &Payment,
) -> Result<i64, sqlx::Error> {
    let row = sqlx::query_as::<_, (i64,)>(
        r#"
        INSERT INTO payments
            (reserve_number, amount_cents, payment_date, method, banking_transaction_id)
        VALUES (?, ?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(&payment.reserve_number)
    .bind(payment.amount_cents)
    .bind(payment.payment_date)
    .bind(payment.method.as_str())
    .bind(payment.banking_transaction_id)
    .fetch_one(conn)
    .await?;
    Ok(row.0)
}

pub async fn get_payment(
    conn: &mut SqliteConnection,
    id: i64,
) -> Result<Option<Payment>, sqlx::Error> {
    let row = sqlx::query_as::<_, PaymentRow>(&format!(
        "SELECT {PAYMENT_COLUMNS} FROM payments WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(conn)
    .await?;
    Ok(row.map(from_row))
}

pub async fn list_for_reserve(
    conn: &mut SqliteConnection,
    reserve_number: &str,
) -> Result<Vec<Payment>, sqlx::Error> {
    let rows = sqlx::query_as::<_, PaymentRow>(&format!(
        "SELECT {PAYMENT_COLUMNS} FROM payments WHERE reserve_number = ? ORDER BY id"
    ))
    .bind(reserve_number)
    .fetch_all(conn)
    .await?;
    Ok(rows.into_iter().map(from_row).collect())
}

/// Sum of all payments against one reserve number. The recalculator's
/// source of truth for `paid_cents`.
pub async fn sum_for_reserve(
    conn: &mut SqliteConnection,
    reserve_number: &str,
) -> Result<i64, sqlx::Error> {
    let row = sqlx::query_as::<_, (i64,)>(
        "SELECT COALESCE(SUM(amount_cents), 0) FROM payments WHERE reserve_number = ?",
    )
    .bind(reserve_number)
    .fetch_one(conn)
    .await?;
    Ok(row.0)
}

/// Match candidates: unlinked payments inside the date window whose amount
/// falls within [lo_cents, hi_cents]. Ordered by id for deterministic ties.
pub async fn unlinked_in_window(
    conn: &mut SqliteConnection,
    window: DateRange,
    lo_cents: i64,
    hi_cents: i64,
) -> Result<Vec<Payment>, sqlx::Error> {
    let rows = sqlx::query_as::<_, PaymentRow>(&format!(
        "SELECT {PAYMENT_COLUMNS} FROM payments \
         WHERE banking_transaction_id IS NULL \
           AND payment_date >= ? AND payment_date <= ? \
           AND amount_cents >= ? AND amount_cents <= ? \
           AND id NOT IN (SELECT payment_id FROM match_records \
                          WHERE payment_id IS NOT NULL AND match_status = 'active') \
         ORDER BY id"
    ))
    .bind(window.start)
    .bind(window.end)
    .bind(lo_cents)
    .bind(hi_cents)
    .fetch_all(conn)
    .await?;
    Ok(rows.into_iter().map(from_row).collect())
}

pub async fn link_to_bank(
    conn: &mut SqliteConnection,
    payment_id: i64,
    bank_transaction_id: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE payments SET banking_transaction_id = ? WHERE id = ?")
        .bind(bank_transaction_id)
        .bind(payment_id)
        .execute(conn)
        .await?;
    Ok(())
}

pub(crate) async fn clear_bank_link(
    conn: &mut SqliteConnection,
    payment_id: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE payments SET banking_transaction_id = NULL WHERE id = ?")
        .bind(payment_id)
        .execute(conn)
        .await?;
    Ok(())
}

/// Payments whose reserve number has no charter. Excluded from aggregate
/// calculations and surfaced by the reporter, never coerced onto a guessed
/// charter.
pub async fn list_orphaned(conn: &mut SqliteConnection) -> Result<Vec<Payment>, sqlx::Error> {
    let rows = sqlx::query_as::<_, PaymentRow>(&format!(
        "SELECT p.{} FROM payments p \
         LEFT JOIN charters c ON c.reserve_number = p.reserve_number \
         WHERE c.id IS NULL ORDER BY p.id",
        PAYMENT_COLUMNS.replace(", ", ", p.")
    ))
    .fetch_all(conn)
    .await?;
    Ok(rows.into_iter().map(from_row).collect())
}

/// (date, amount) pairs shared by more than one payment.
pub async fn duplicate_date_amount_groups(
    conn: &mut SqliteConnection,
) -> Result<Vec<(NaiveDate, i64)>, sqlx::Error> {
    sqlx::query_as::<_, (NaiveDate, i64)>(
        "SELECT payment_date, amount_cents FROM payments \
         GROUP BY payment_date, amount_cents HAVING COUNT(*) > 1 \
         ORDER BY payment_date, amount_cents",
    )
    .fetch_all(conn)
    .await
}

pub async fn list_by_date_amount(
    conn: &mut SqliteConnection,
    date: NaiveDate,
    amount_cents: i64,
) -> Result<Vec<Payment>, sqlx::Error> {
    let rows = sqlx::query_as::<_, PaymentRow>(&format!(
        "SELECT {PAYMENT_COLUMNS} FROM payments \
         WHERE payment_date = ? AND amount_cents = ? ORDER BY id"
    ))
    .bind(date)
    .bind(amount_cents)
    .fetch_all(conn)
    .await?;
    Ok(rows.into_iter().map(from_row).collect())
}
