use ledgermend_core::{MatchTarget, ReconStatus};
use serde::Serialize;
use sqlx::SqliteConnection;

use crate::{bank, matches, payments, receipts};

#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub id: i64,
    pub entity: String,
    pub entity_id: i64,
    pub action: String,
    pub snapshot: serde_json::Value,
    pub note: Option<String>,
}

/// Append an immutable audit record. Every destructive correction writes
/// one of these with the prior row state before mutating anything.
pub async fn append_audit<T: Serialize>(
    conn: &mut SqliteConnection,
    entity: &str,
    entity_id: i64,
    action: &str,
    prior_state: &T,
    note: Option<&str>,
) -> Result<i64, sqlx::Error> {
    let snapshot = serde_json::to_string(prior_state).map_err(|e| sqlx::Error::Encode(Box::new(e)))?;
    let row = sqlx::query_as::<_, (i64,)>(
        "INSERT INTO audit_log (entity, entity_id, action, snapshot, note) \
         VALUES (?, ?, ?, ?, ?) RETURNING id",
    )
    .bind(entity)
    .bind(entity_id)
    .bind(action)
    .bind(snapshot)
    .bind(note)
    .fetch_one(conn)
    .await?;
    Ok(row.0)
}

pub async fn list_audit_entries(
    conn: &mut SqliteConnection,
    entity: &str,
) -> Result<Vec<AuditEntry>, sqlx::Error> {
    let rows = sqlx::query_as::<_, (i64, String, i64, String, String, Option<String>)>(
        "SELECT id, entity, entity_id, action, snapshot, note FROM audit_log \
         WHERE entity = ? ORDER BY id",
    )
    .bind(entity)
    .fetch_all(conn)
    .await?;
    Ok(rows
        .into_iter()
        .map(|r| AuditEntry {
            id: r.0,
            entity: r.1,
            entity_id: r.2,
            action: r.3,
            snapshot: serde_json::from_str(&r.4).unwrap_or(serde_json::Value::Null),
            note: r.5,
        })
        .collect())
}

/// Audited correction: snapshot the bank row, retire its match records,
/// then delete it. The only path that removes a bank transaction.
pub async fn delete_bank_transaction_with_audit(
    conn: &mut SqliteConnection,
    id: i64,
    note: &str,
) -> Result<(), sqlx::Error> {
    let Some(tx) = bank::get_bank_transaction(conn, id).await? else {
        return Ok(());
    };
    append_audit(conn, "bank_transaction", id, "delete", &tx, Some(note)).await?;
    for record in matches::active_for_bank_transaction(conn, id).await? {
        if let Some(match_id) = record.id {
            matches::supersede(conn, match_id).await?;
        }
        match record.target {
            MatchTarget::Receipt(receipt_id) => {
                receipts::clear_bank_link(conn, receipt_id).await?;
            }
            MatchTarget::Payment(payment_id) => {
                payments::clear_bank_link(conn, payment_id).await?;
            }
        }
    }
    bank::delete_bank_transaction(conn, id).await
}

/// Audited correction: snapshot and delete a receipt.
pub async fn delete_receipt_with_audit(
    conn: &mut SqliteConnection,
    id: i64,
    note: &str,
) -> Result<(), sqlx::Error> {
    let Some(receipt) = receipts::get_receipt(conn, id).await? else {
        return Ok(());
    };
    append_audit(conn, "receipt", id, "delete", &receipt, Some(note)).await?;
    if let Some(record) = matches::active_for_target(conn, MatchTarget::Receipt(id)).await? {
        if let Some(match_id) = record.id {
            matches::supersede(conn, match_id).await?;
        }
    }
    receipts::delete_receipt(conn, id).await?;

    if let Some(bank_id) = receipt.banking_transaction_id {
        if matches::active_for_bank_transaction(conn, bank_id).await?.is_empty() {
            bank::update_status(conn, bank_id, ReconStatus::Unreconciled).await?;
        }
    }
    Ok(())
}

/// Audited correction: break a receipt's bank link. The match record is
/// superseded, the receipt unlinked, and the bank transaction returned to
/// `unreconciled` if no other active record remains.
pub async fn unlink_receipt_with_audit(
    conn: &mut SqliteConnection,
    receipt_id: i64,
    note: &str,
) -> Result<bool, sqlx::Error> {
    let Some(receipt) = receipts::get_receipt(conn, receipt_id).await? else {
        return Ok(false);
    };
    let Some(bank_id) = receipt.banking_transaction_id else {
        return Ok(false);
    };

    append_audit(conn, "receipt", receipt_id, "unlink", &receipt, Some(note)).await?;
    if let Some(record) = matches::active_for_target(conn, MatchTarget::Receipt(receipt_id)).await? {
        if let Some(match_id) = record.id {
            matches::supersede(conn, match_id).await?;
        }
    }
    receipts::clear_bank_link(conn, receipt_id).await?;

    if matches::active_for_bank_transaction(conn, bank_id).await?.is_empty() {
        bank::update_status(conn, bank_id, ReconStatus::Unreconciled).await?;
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_db;
    use crate::session::{RunMode, Session};
    use chrono::NaiveDate;
    use ledgermend_core::{MatchRecord, MatchStatus, MatchType, Receipt};

    async fn seed(conn: &mut SqliteConnection) -> (i64, i64) {
        let bank_id = sqlx::query_as::<_, (i64,)>(
            "INSERT INTO bank_transactions \
             (account_number, transaction_date, description, debit_cents, source_file, content_hash, status) \
             VALUES ('1', '2026-01-15', 'X', 15000, 'f', 'h1', 'matched') RETURNING id",
        )
        .fetch_one(&mut *conn)
        .await
        .unwrap()
        .0;

        let mut receipt = Receipt::new(NaiveDate::from_ymd_opt(2026, 1, 15).unwrap(), "V", 15000);
        receipt.banking_transaction_id = Some(bank_id);
        let receipt_id = receipts::insert_receipt(conn, &receipt).await.unwrap();

        matches::insert_match_record(
            conn,
            &MatchRecord {
                id: None,
                banking_transaction_id: bank_id,
                target: MatchTarget::Receipt(receipt_id),
                match_date: NaiveDate::from_ymd_opt(2026, 1, 15).unwrap(),
                match_type: MatchType::AutoGenerated,
                match_status: MatchStatus::Active,
                confidence: 1.0,
                notes: None,
                created_by: "auto-matcher".to_string(),
                created_at: None,
            },
        )
        .await
        .unwrap();

        (bank_id, receipt_id)
    }

    #[tokio::test]
    async fn unlink_restores_unreconciled_and_writes_audit() {
        let dir = tempfile::tempdir().unwrap();
        let pool = create_db(&dir.path().join("test.db")).await.unwrap();
        let mut session = Session::begin(&pool, RunMode::Write).await.unwrap();
        let conn = session.conn();

        let (bank_id, receipt_id) = seed(conn).await;
        assert!(unlink_receipt_with_audit(conn, receipt_id, "entered against wrong line")
            .await
            .unwrap());

        let receipt = receipts::get_receipt(conn, receipt_id).await.unwrap().unwrap();
        assert!(receipt.banking_transaction_id.is_none());

        let tx = bank::get_bank_transaction(conn, bank_id).await.unwrap().unwrap();
        assert_eq!(tx.status, ReconStatus::Unreconciled);

        let entries = list_audit_entries(conn, "receipt").await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].action, "unlink");
        // The snapshot preserves the pre-correction link.
        assert_eq!(
            entries[0].snapshot["banking_transaction_id"],
            serde_json::json!(bank_id)
        );
    }

    #[tokio::test]
    async fn delete_bank_transaction_snapshots_prior_row() {
        let dir = tempfile::tempdir().unwrap();
        let pool = create_db(&dir.path().join("test.db")).await.unwrap();
        let mut session = Session::begin(&pool, RunMode::Write).await.unwrap();
        let conn = session.conn();

        let (bank_id, receipt_id) = seed(conn).await;
        delete_bank_transaction_with_audit(conn, bank_id, "duplicate statement line")
            .await
            .unwrap();

        assert!(bank::get_bank_transaction(conn, bank_id).await.unwrap().is_none());
        // The linked receipt survives, unlinked.
        let receipt = receipts::get_receipt(conn, receipt_id).await.unwrap().unwrap();
        assert!(receipt.banking_transaction_id.is_none());

        let entries = list_audit_entries(conn, "bank_transaction").await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].snapshot["description"], serde_json::json!("X"));
    }

    #[tokio::test]
    async fn unlink_of_unlinked_receipt_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let pool = create_db(&dir.path().join("test.db")).await.unwrap();
        let mut session = Session::begin(&pool, RunMode::Write).await.unwrap();
        let conn = session.conn();

        let receipt_id = receipts::insert_receipt(
            conn,
            &Receipt::new(NaiveDate::from_ymd_opt(2026, 1, 15).unwrap(), "V", 100),
        )
        .await
        .unwrap();

        assert!(!unlink_receipt_with_audit(conn, receipt_id, "n/a").await.unwrap());
        assert!(list_audit_entries(conn, "receipt").await.unwrap().is_empty());
    }
}
