use chrono::NaiveDate;
use ledgermend_core::{MatchRecord, MatchStatus, MatchTarget, MatchType};
use sqlx::SqliteConnection;

use crate::db::parse_timestamp;

type MatchRow = (
    i64,
    i64,
    Option<i64>,
    Option<i64>,
    NaiveDate,
    String,
    String,
    f64,
    Option<String>,
    String,
    String,
);

const MATCH_COLUMNS: &str = "id, banking_transaction_id, receipt_id, payment_id, match_date, \
     match_type, match_status, confidence, notes, created_by, created_at";

fn from_row(r: MatchRow) -> MatchRecord {
    let target = match (r.2, r.3) {
        (Some(receipt_id), _) => MatchTarget::Receipt(receipt_id),
        (None, Some(payment_id)) => MatchTarget::Payment(payment_id),
        // Unreachable under the schema CHECK; a zero target would indicate
        // a migration fault.
        (None, None) => MatchTarget::Receipt(0),
    };
    MatchRecord {
        id: Some(r.0),
        banking_transaction_id: r.1,
        target,
        match_date: r.4,
        match_type: r.5.parse().unwrap_or(MatchType::Manual),
        match_status: r.6.parse().unwrap_or(MatchStatus::Active),
        confidence: r.7,
        notes: r.8,
        created_by: r.9,
        created_at: parse_timestamp(&r.10),
    }
}

pub async fn insert_match_record(
    conn: &mut SqliteConnection,
    record: &MatchRecord,
) -> Result<i64, sqlx::Error> {
    let row = sqlx::query_as::<_, (i64,)>(
        r#"
        INSERT INTO match_records
            (banking_transaction_id, receipt_id, payment_id, match_date,
             match_type, match_status, confidence, notes, created_by)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(record.banking_transaction_id)
    .bind(record.target.receipt_id())
    .bind(record.target.payment_id())
    .bind(record.match_date)
    .bind(record.match_type.as_str())
    .bind(record.match_status.as_str())
    .bind(record.confidence)
    .bind(&record.notes)
    .bind(&record.created_by)
    .fetch_one(conn)
    .await?;
    Ok(row.0)
}

/// The active record for a receipt or payment, if any. At most one exists;
/// the matcher checks this before attaching.
pub async fn active_for_target(
    conn: &mut SqliteConnection,
    target: MatchTarget,
) -> Result<Option<MatchRecord>, sqlx::Error> {
    let (column, id) = match target {
        MatchTarget::Receipt(id) => ("receipt_id", id),
        MatchTarget::Payment(id) => ("payment_id", id),
    };
    let row = sqlx::query_as::<_, MatchRow>(&format!(
        "SELECT {MATCH_COLUMNS} FROM match_records \
         WHERE {column} = ? AND match_status = 'active' ORDER BY id LIMIT 1"
    ))
    .bind(id)
    .fetch_optional(conn)
    .await?;
    Ok(row.map(from_row))
}

/// All active records for a bank transaction. More than one is legitimate
/// only for bulk deposits.
pub async fn active_for_bank_transaction(
    conn: &mut SqliteConnection,
    banking_transaction_id: i64,
) -> Result<Vec<MatchRecord>, sqlx::Error> {
    let rows = sqlx::query_as::<_, MatchRow>(&format!(
        "SELECT {MATCH_COLUMNS} FROM match_records \
         WHERE banking_transaction_id = ? AND match_status = 'active' ORDER BY id"
    ))
    .bind(banking_transaction_id)
    .fetch_all(conn)
    .await?;
    Ok(rows.into_iter().map(from_row).collect())
}

/// Retire a record during an audited correction. Records are never
/// deleted or overwritten in place.
pub async fn supersede(conn: &mut SqliteConnection, match_id: i64) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE match_records SET match_status = 'superseded' WHERE id = ?")
        .bind(match_id)
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn count_active(conn: &mut SqliteConnection) -> Result<i64, sqlx::Error> {
    let row = sqlx::query_as::<_, (i64,)>(
        "SELECT COUNT(*) FROM match_records WHERE match_status = 'active'",
    )
    .fetch_one(conn)
    .await?;
    Ok(row.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_db;
    use crate::session::{RunMode, Session};

    async fn seed_bank_tx(conn: &mut SqliteConnection, hash: &str) -> i64 {
        sqlx::query_as::<_, (i64,)>(
            "INSERT INTO bank_transactions \
             (account_number, transaction_date, description, debit_cents, source_file, content_hash) \
             VALUES ('1', '2026-01-15', 'X', 15000, 'f', ?) RETURNING id",
        )
        .bind(hash)
        .fetch_one(conn)
        .await
        .unwrap()
        .0
    }

    async fn seed_receipt(conn: &mut SqliteConnection) -> i64 {
        sqlx::query_as::<_, (i64,)>(
            "INSERT INTO receipts (receipt_date, vendor, gross_cents) \
             VALUES ('2026-01-15', 'V', 15000) RETURNING id",
        )
        .fetch_one(conn)
        .await
        .unwrap()
        .0
    }

    fn record(bank_id: i64, target: MatchTarget) -> MatchRecord {
        MatchRecord {
            id: None,
            banking_transaction_id: bank_id,
            target,
            match_date: NaiveDate::from_ymd_opt(2026, 1, 15).unwrap(),
            match_type: MatchType::AutoGenerated,
            match_status: MatchStatus::Active,
            confidence: 1.0,
            notes: None,
            created_by: "auto-matcher".to_string(),
            created_at: None,
        }
    }

    #[tokio::test]
    async fn active_lookup_per_target() {
        let dir = tempfile::tempdir().unwrap();
        let pool = create_db(&dir.path().join("test.db")).await.unwrap();
        let mut session = Session::begin(&pool, RunMode::Write).await.unwrap();
        let conn = session.conn();

        let bank_id = seed_bank_tx(conn, "h1").await;
        let receipt_id = seed_receipt(conn).await;

        assert!(active_for_target(conn, MatchTarget::Receipt(receipt_id))
            .await
            .unwrap()
            .is_none());

        insert_match_record(conn, &record(bank_id, MatchTarget::Receipt(receipt_id)))
            .await
            .unwrap();

        let found = active_for_target(conn, MatchTarget::Receipt(receipt_id))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.banking_transaction_id, bank_id);
        assert_eq!(found.match_type, MatchType::AutoGenerated);
    }

    #[tokio::test]
    async fn superseded_records_drop_out_of_active_queries() {
        let dir = tempfile::tempdir().unwrap();
        let pool = create_db(&dir.path().join("test.db")).await.unwrap();
        let mut session = Session::begin(&pool, RunMode::Write).await.unwrap();
        let conn = session.conn();

        let bank_id = seed_bank_tx(conn, "h1").await;
        let receipt_id = seed_receipt(conn).await;
        let match_id = insert_match_record(conn, &record(bank_id, MatchTarget::Receipt(receipt_id)))
            .await
            .unwrap();

        supersede(conn, match_id).await.unwrap();

        assert!(active_for_target(conn, MatchTarget::Receipt(receipt_id))
            .await
            .unwrap()
            .is_none());
        assert_eq!(count_active(conn).await.unwrap(), 0);
        assert!(active_for_bank_transaction(conn, bank_id).await.unwrap().is_empty());
    }
}
