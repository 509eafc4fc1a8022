use chrono::NaiveDate;
use ledgermend_core::{DateRange, Receipt};
use sqlx::SqliteConnection;

use crate::db::parse_timestamp;

type ReceiptRow = (
    i64,
    NaiveDate,
    String,
    i64,
    Option<i64>,
    Option<String>,
    Option<i64>,
    Option<i64>,
    i64,
    i64,
    i64,
    String,
);

const RECEIPT_COLUMNS: &str = "id, receipt_date, vendor, gross_cents, gst_cents, memo, \
     banking_transaction_id, split_group_id, is_split_receipt, potential_duplicate, \
     verified_by_edit, created_at";

fn from_row(r: ReceiptRow) -> Receipt {
    Receipt {
        id: Some(r.0),
        receipt_date: r.1,
        vendor: r.2,
        gross_cents: r.3,
        gst_cents: r.4,
        memo: r.5,
        banking_transaction_id: r.6,
        split_group_id: r.7,
        is_split_receipt: r.8 != 0,
        potential_duplicate: r.9 != 0,
        verified_by_edit: r.10 != 0,
        created_at: parse_timestamp(&r.11),
    }
}

pub async fn insert_receipt(
    conn: &mut SqliteConnection,
    receipt: &Receipt,
) -> Result<i64, sqlx::Error> {
    let row = sqlx::query_as::<_, (i64,)>(
        r#"
        INSERT INTO receipts
            (receipt_date, vendor, gross_cents, gst_cents, memo,
             banking_transaction_id, split_group_id, is_split_receipt,
             potential_duplicate, verified_by_edit)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(receipt.receipt_date)
    .bind(&receipt.vendor)
    .bind(receipt.gross_cents)
    .bind(receipt.gst_cents)
    .bind(&receipt.memo)
    .bind(receipt.banking_transaction_id)
    .bind(receipt.split_group_id)
    .bind(receipt.is_split_receipt as i64)
    .bind(receipt.potential_duplicate as i64)
    .bind(receipt.verified_by_edit as i64)
    .fetch_one(conn)
    .await?;
    Ok(row.0)
}

pub async fn get_receipt(
    conn: &mut SqliteConnection,
    id: i64,
) -> Result<Option<Receipt>, sqlx::Error> {
    let row = sqlx::query_as::<_, ReceiptRow>(&format!(
        "SELECT {RECEIPT_COLUMNS} FROM receipts WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(conn)
    .await?;
    Ok(row.map(from_row))
}

/// Match candidates: unlinked receipts inside the date window whose gross
/// amount falls within [lo_cents, hi_cents]. Ordered by id so ranking ties
/// resolve deterministically.
pub async fn unlinked_in_window(
    conn: &mut SqliteConnection,
    window: DateRange,
    lo_cents: i64,
    hi_cents: i64,
) -> Result<Vec<Receipt>, sqlx::Error> {
    let rows = sqlx::query_as::<_, ReceiptRow>(&format!(
        "SELECT {RECEIPT_COLUMNS} FROM receipts \
         WHERE banking_transaction_id IS NULL \
           AND receipt_date >= ? AND receipt_date <= ? \
           AND gross_cents >= ? AND gross_cents <= ? \
           AND id NOT IN (SELECT receipt_id FROM match_records \
                          WHERE receipt_id IS NOT NULL AND match_status = 'active') \
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
    receipt_id: i64,
    bank_transaction_id: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE receipts SET banking_transaction_id = ? WHERE id = ?")
        .bind(bank_transaction_id)
        .bind(receipt_id)
        .execute(conn)
        .await?;
    Ok(())
}

pub(crate) async fn clear_bank_link(
    conn: &mut SqliteConnection,
    receipt_id: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE receipts SET banking_transaction_id = NULL WHERE id = ?")
        .bind(receipt_id)
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn set_split_group(
    conn: &mut SqliteConnection,
    receipt_id: i64,
    split_group_id: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE receipts SET split_group_id = ?, is_split_receipt = 1 WHERE id = ?")
        .bind(split_group_id)
        .bind(receipt_id)
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn mark_potential_duplicate(
    conn: &mut SqliteConnection,
    receipt_id: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE receipts SET potential_duplicate = 1 WHERE id = ?")
        .bind(receipt_id)
        .execute(conn)
        .await?;
    Ok(())
}

/// All receipts in id order — the split resolver scans the full table so
/// reruns always see the same input.
pub async fn list_all(conn: &mut SqliteConnection) -> Result<Vec<Receipt>, sqlx::Error> {
    let rows = sqlx::query_as::<_, ReceiptRow>(&format!(
        "SELECT {RECEIPT_COLUMNS} FROM receipts ORDER BY id"
    ))
    .fetch_all(conn)
    .await?;
    Ok(rows.into_iter().map(from_row).collect())
}

/// (date, amount) pairs shared by more than one receipt. Input to the
/// duplicate-candidate finding.
pub async fn duplicate_date_amount_groups(
    conn: &mut SqliteConnection,
) -> Result<Vec<(NaiveDate, i64)>, sqlx::Error> {
    sqlx::query_as::<_, (NaiveDate, i64)>(
        "SELECT receipt_date, gross_cents FROM receipts \
         GROUP BY receipt_date, gross_cents HAVING COUNT(*) > 1 \
         ORDER BY receipt_date, gross_cents",
    )
    .fetch_all(conn)
    .await
}

pub async fn list_by_date_amount(
    conn: &mut SqliteConnection,
    date: NaiveDate,
    gross_cents: i64,
) -> Result<Vec<Receipt>, sqlx::Error> {
    let rows = sqlx::query_as::<_, ReceiptRow>(&format!(
        "SELECT {RECEIPT_COLUMNS} FROM receipts \
         WHERE receipt_date = ? AND gross_cents = ? ORDER BY id"
    ))
    .bind(date)
    .bind(gross_cents)
    .fetch_all(conn)
    .await?;
    Ok(rows.into_iter().map(from_row).collect())
}

/// Raw delete; only the audited correction path may call this.
pub(crate) async fn delete_receipt(
    conn: &mut SqliteConnection,
    id: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM receipts WHERE id = ?")
        .bind(id)
        .execute(conn)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_db;
    use crate::session::{RunMode, Session};

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 1, d).unwrap()
    }

    #[tokio::test]
    async fn window_query_filters_on_date_amount_and_link() {
        let dir = tempfile::tempdir().unwrap();
        let pool = create_db(&dir.path().join("test.db")).await.unwrap();
        let mut session = Session::begin(&pool, RunMode::Write).await.unwrap();
        let conn = session.conn();

        let inside = Receipt::new(date(15), "ACME LIMO FUEL", 15000);
        let wrong_amount = Receipt::new(date(15), "ACME LIMO FUEL", 14000);
        let outside_window = Receipt::new(date(25), "ACME LIMO FUEL", 15000);
        let mut linked = Receipt::new(date(15), "ACME LIMO FUEL", 15000);

        let inside_id = insert_receipt(conn, &inside).await.unwrap();
        insert_receipt(conn, &wrong_amount).await.unwrap();
        insert_receipt(conn, &outside_window).await.unwrap();

        // Linked receipts are not candidates.
        let bank_id = sqlx::query_as::<_, (i64,)>(
            "INSERT INTO bank_transactions \
             (account_number, transaction_date, description, debit_cents, source_file, content_hash) \
             VALUES ('1', '2026-01-15', 'X', 15000, 'f', 'h') RETURNING id",
        )
        .fetch_one(&mut *conn)
        .await
        .unwrap()
        .0;
        linked.banking_transaction_id = Some(bank_id);
        insert_receipt(conn, &linked).await.unwrap();

        let found = unlinked_in_window(conn, DateRange::new(date(12), date(18)), 14999, 15001)
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, Some(inside_id));
    }

    #[tokio::test]
    async fn duplicate_groups_found() {
        let dir = tempfile::tempdir().unwrap();
        let pool = create_db(&dir.path().join("test.db")).await.unwrap();
        let mut session = Session::begin(&pool, RunMode::Write).await.unwrap();
        let conn = session.conn();

        insert_receipt(conn, &Receipt::new(date(15), "A", 7500)).await.unwrap();
        insert_receipt(conn, &Receipt::new(date(15), "B", 7500)).await.unwrap();
        insert_receipt(conn, &Receipt::new(date(16), "C", 7500)).await.unwrap();

        let groups = duplicate_date_amount_groups(conn).await.unwrap();
        assert_eq!(groups, vec![(date(15), 7500)]);
        assert_eq!(list_by_date_amount(conn, date(15), 7500).await.unwrap().len(), 2);
    }
}
