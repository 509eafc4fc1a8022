use ledgermend_core::CharterStatus;
use ledgermend_storage::{append_audit, charters, payments, DbPool, RunMode, Session};
use serde::Serialize;
use sqlx::SqliteConnection;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BalanceError {
    #[error("No charter exists for reserve number '{0}'")]
    UnknownReserve(String),
    #[error("Storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

#[derive(Debug, Clone, Serialize)]
pub struct RecalcOutcome {
    pub reserve_number: String,
    pub paid_cents: i64,
    pub balance_cents: i64,
    /// False when the stored derived fields were already correct — the
    /// recalculation was a no-op.
    pub changed: bool,
    /// The charter had no amount due on record; it was treated as zero
    /// and the charter marked for review.
    pub missing_total: bool,
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct BatchRecalcSummary {
    pub examined: usize,
    pub changed: usize,
    pub missing_total: usize,
    pub chunks_committed: usize,
}

/// Derive `paid` and `balance` for one charter from its payments and
/// store them when they differ. Safe to call unconditionally after any
/// payment insert, delete, or update.
pub async fn recalculate(
    conn: &mut SqliteConnection,
    reserve_number: &str,
) -> Result<RecalcOutcome, BalanceError> {
    let charter = charters::get_by_reserve(conn, reserve_number)
        .await?
        .ok_or_else(|| BalanceError::UnknownReserve(reserve_number.to_string()))?;

    let paid_cents = payments::sum_for_reserve(conn, reserve_number).await?;

    let missing_total = charter.total_due_cents.is_none();
    let total_due = charter.total_due_cents.unwrap_or(0);
    let balance_cents = total_due - paid_cents;

    let changed = paid_cents != charter.paid_cents || balance_cents != charter.balance_cents;
    if changed {
        charters::update_derived(conn, reserve_number, paid_cents, balance_cents).await?;
    }
    if missing_total && !charter.needs_review {
        // Financial totals are never left undefined silently.
        tracing::warn!(reserve_number, "charter has no amount due; flagging for review");
        charters::set_needs_review(conn, reserve_number, true).await?;
    }

    Ok(RecalcOutcome {
        reserve_number: reserve_number.to_string(),
        paid_cents,
        balance_cents,
        changed,
        missing_total,
    })
}

/// Full-table reconciliation in chunks with per-chunk commits: a crash
/// loses at most one chunk of progress, and each chunk's sum-then-write
/// is atomic.
pub async fn recalculate_all(
    pool: &DbPool,
    mode: RunMode,
    chunk_size: i64,
    limit: Option<i64>,
) -> Result<BatchRecalcSummary, BalanceError> {
    let mut summary = BatchRecalcSummary::default();
    let mut offset: i64 = 0;

    loop {
        let remaining = match limit {
            Some(n) => {
                let left = n - offset;
                if left <= 0 {
                    break;
                }
                left.min(chunk_size)
            }
            None => chunk_size,
        };

        let mut session = Session::begin(pool, mode).await?;
        let reserves = charters::list_reserve_numbers(session.conn(), offset, remaining).await?;
        if reserves.is_empty() {
            session.finish().await?;
            break;
        }

        for reserve in &reserves {
            let outcome = recalculate(session.conn(), reserve).await?;
            summary.examined += 1;
            if outcome.changed {
                summary.changed += 1;
            }
            if outcome.missing_total {
                summary.missing_total += 1;
            }
        }

        offset += reserves.len() as i64;
        if session.finish().await? {
            summary.chunks_committed += 1;
        }
    }

    tracing::info!(
        examined = summary.examined,
        changed = summary.changed,
        missing_total = summary.missing_total,
        chunks = summary.chunks_committed,
        "batch recalculation complete"
    );
    Ok(summary)
}

/// Cancellation policy: snapshot the charter, force its amount due to
/// zero, and rederive. Any prior payment becomes a credit balance rather
/// than being dropped.
pub async fn cancel_charter(
    conn: &mut SqliteConnection,
    reserve_number: &str,
    note: &str,
) -> Result<RecalcOutcome, BalanceError> {
    let charter = charters::get_by_reserve(conn, reserve_number)
        .await?
        .ok_or_else(|| BalanceError::UnknownReserve(reserve_number.to_string()))?;

    if charter.status != CharterStatus::Cancelled {
        append_audit(conn, "charter", charter.id.unwrap_or(0), "cancel", &charter, Some(note)).await?;
        charters::mark_cancelled(conn, reserve_number).await?;
    }
    recalculate(conn, reserve_number).await
}
