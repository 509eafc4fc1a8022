use sqlx::{sqlite::SqlitePoolOptions, Pool, Sqlite};
use std::path::Path;

pub type DbPool = Pool<Sqlite>;

pub async fn create_db(path: &Path) -> Result<DbPool, sqlx::Error> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect(&format!("sqlite:{}?mode=rwc", path.display()))
        .await?;

    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA synchronous = NORMAL")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA busy_timeout = 5000")
        .execute(&pool)
        .await?;

    run_migrations(&pool).await?;

    Ok(pool)
}

async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS bank_transactions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            account_number TEXT NOT NULL,
            transaction_date TEXT NOT NULL,
            posted_date TEXT,
            description TEXT NOT NULL,
            debit_cents INTEGER,
            credit_cents INTEGER,
            bank_balance_cents INTEGER,
            source_file TEXT NOT NULL,
            content_hash TEXT NOT NULL UNIQUE,
            status TEXT NOT NULL DEFAULT 'unreconciled',
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            CHECK ((debit_cents IS NULL) != (credit_cents IS NULL))
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS receipts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            receipt_date TEXT NOT NULL,
            vendor TEXT NOT NULL,
            gross_cents INTEGER NOT NULL,
            gst_cents INTEGER,
            memo TEXT,
            banking_transaction_id INTEGER REFERENCES bank_transactions(id),
            split_group_id INTEGER,
            is_split_receipt INTEGER NOT NULL DEFAULT 0,
            potential_duplicate INTEGER NOT NULL DEFAULT 0,
            verified_by_edit INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS payments (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            reserve_number TEXT NOT NULL,
            amount_cents INTEGER NOT NULL,
            payment_date TEXT NOT NULL,
            method TEXT NOT NULL,
            banking_transaction_id INTEGER REFERENCES bank_transactions(id),
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS charters (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            reserve_number TEXT NOT NULL UNIQUE,
            client TEXT,
            charter_date TEXT,
            total_due_cents INTEGER,
            paid_cents INTEGER NOT NULL DEFAULT 0,
            balance_cents INTEGER NOT NULL DEFAULT 0,
            status TEXT NOT NULL DEFAULT 'active',
            needs_review INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        -- banking_transaction_id carries no FK: match records are audit
        -- entries and outlive corrected (deleted) bank rows.
        CREATE TABLE IF NOT EXISTS match_records (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            banking_transaction_id INTEGER NOT NULL,
            receipt_id INTEGER REFERENCES receipts(id),
            payment_id INTEGER REFERENCES payments(id),
            match_date TEXT NOT NULL,
            match_type TEXT NOT NULL,
            match_status TEXT NOT NULL DEFAULT 'active',
            confidence REAL NOT NULL,
            notes TEXT,
            created_by TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            CHECK ((receipt_id IS NULL) != (payment_id IS NULL))
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS audit_log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            occurred_at TEXT NOT NULL DEFAULT (datetime('now')),
            entity TEXT NOT NULL,
            entity_id INTEGER NOT NULL,
            action TEXT NOT NULL,
            snapshot TEXT NOT NULL,
            note TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    for idx in [
        "CREATE INDEX IF NOT EXISTS idx_bank_status ON bank_transactions(status)",
        "CREATE INDEX IF NOT EXISTS idx_bank_date ON bank_transactions(transaction_date)",
        "CREATE INDEX IF NOT EXISTS idx_receipts_date ON receipts(receipt_date)",
        "CREATE INDEX IF NOT EXISTS idx_receipts_vendor_date ON receipts(vendor, receipt_date)",
        "CREATE INDEX IF NOT EXISTS idx_payments_reserve ON payments(reserve_number)",
        "CREATE INDEX IF NOT EXISTS idx_payments_date ON payments(payment_date)",
        "CREATE INDEX IF NOT EXISTS idx_matches_bank ON match_records(banking_transaction_id)",
        "CREATE INDEX IF NOT EXISTS idx_matches_receipt ON match_records(receipt_id)",
        "CREATE INDEX IF NOT EXISTS idx_matches_payment ON match_records(payment_id)",
    ] {
        sqlx::query(idx).execute(pool).await?;
    }

    Ok(())
}

/// Parse a `datetime('now')` timestamp column into UTC. Returns `None`
/// for anything unparseable rather than failing the whole row.
pub(crate) fn parse_timestamp(raw: &str) -> Option<chrono::DateTime<chrono::Utc>> {
    chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|naive| chrono::DateTime::from_naive_utc_and_offset(naive, chrono::Utc))
}
