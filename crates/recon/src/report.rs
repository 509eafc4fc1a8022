use chrono::{Days, NaiveDate};
use ledgermend_core::{MatchTarget, ReconSettings, ReconStatus};
use ledgermend_storage::{bank, charters, matches, payments, receipts, Session};
use serde::Serialize;
use thiserror::Error;

use crate::split::resolve_groups;

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

/// A single exception finding. The reporter surfaces these for human
/// resolution; it never auto-repairs the data behind them.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Finding {
    /// Unreconciled past the stale-age threshold with no resolution.
    Unmatched {
        banking_transaction_id: i64,
        transaction_date: NaiveDate,
        description: String,
        amount_cents: i64,
        age_days: i64,
    },
    /// Identical (date, amount) where exactly one entity is bank-linked.
    /// The unlinked ones need human disambiguation, not deletion.
    DuplicateCandidate {
        entity: String,
        date: NaiveDate,
        amount_cents: i64,
        linked_id: i64,
        unlinked_ids: Vec<i64>,
    },
    /// Stored derived fields disagree with recomputation — the
    /// recalculator was bypassed by a direct write. Always a defect.
    BalanceMismatch {
        reserve_number: String,
        stored_paid_cents: i64,
        stored_balance_cents: i64,
        derived_paid_cents: i64,
        derived_balance_cents: i64,
    },
    /// A matched bank transaction whose linked amounts no longer add up.
    LinkageMismatch {
        banking_transaction_id: i64,
        transaction_cents: i64,
        linked_cents: i64,
    },
    /// Payment referencing a reserve number with no charter. Excluded
    /// from aggregates, never coerced onto a guessed charter.
    OrphanedPayment {
        payment_id: i64,
        reserve_number: String,
        amount_cents: i64,
    },
    /// Split family with no explicit marker on any member — grouping is
    /// plausible but its provenance is unverified.
    UnverifiedSplit {
        anchor_id: i64,
        member_ids: Vec<i64>,
    },
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct Report {
    pub findings: Vec<Finding>,
    /// Bank transactions newly flagged by this pass.
    pub flagged: usize,
    /// Previously flagged transactions found consistent and restored to
    /// matched.
    pub restored: usize,
}

impl Report {
    pub fn count(&self, kind: &str) -> usize {
        self.findings
            .iter()
            .filter(|f| {
                matches!(
                    (kind, f),
                    ("unmatched", Finding::Unmatched { .. })
                        | ("duplicate_candidate", Finding::DuplicateCandidate { .. })
                        | ("balance_mismatch", Finding::BalanceMismatch { .. })
                        | ("linkage_mismatch", Finding::LinkageMismatch { .. })
                        | ("orphaned_payment", Finding::OrphanedPayment { .. })
                        | ("unverified_split", Finding::UnverifiedSplit { .. })
                )
            })
            .count()
    }
}

/// Sum the amounts of every entity actively linked to a bank transaction.
async fn linked_cents(
    conn: &mut sqlx::SqliteConnection,
    banking_transaction_id: i64,
) -> Result<i64, ReportError> {
    let mut total = 0;
    for record in matches::active_for_bank_transaction(conn, banking_transaction_id).await? {
        total += match record.target {
            MatchTarget::Receipt(id) => receipts::get_receipt(conn, id)
                .await?
                .map(|r| r.gross_cents)
                .unwrap_or(0),
            MatchTarget::Payment(id) => payments::get_payment(conn, id)
                .await?
                .map(|p| p.amount_cents)
                .unwrap_or(0),
        };
    }
    Ok(total)
}

/// One full diagnostic pass. The only writes are the `flagged` overlay on
/// bank transactions (applied, like everything else, inside the session —
/// a dry-run session reports identically and persists nothing) and the
/// `potential_duplicate` flag on duplicate-candidate receipts.
pub async fn run_report(
    session: &mut Session,
    settings: &ReconSettings,
    as_of: NaiveDate,
) -> Result<Report, ReportError> {
    let mut report = Report::default();

    // Stale unmatched transactions.
    let cutoff = as_of
        .checked_sub_days(Days::new(settings.stale_age_days()))
        .unwrap_or(as_of);
    for tx in bank::list_unreconciled_on_or_before(session.conn(), cutoff).await? {
        let Some(id) = tx.id else { continue };
        report.findings.push(Finding::Unmatched {
            banking_transaction_id: id.0,
            transaction_date: tx.transaction_date,
            description: tx.description.clone(),
            amount_cents: tx.unsigned_amount_cents(),
            age_days: (as_of - tx.transaction_date).num_days(),
        });
    }

    // Duplicate candidates among receipts: flag the unlinked ones.
    for (date, cents) in receipts::duplicate_date_amount_groups(session.conn()).await? {
        let members = receipts::list_by_date_amount(session.conn(), date, cents).await?;
        let linked: Vec<_> = members.iter().filter(|r| r.is_linked()).collect();
        let unlinked: Vec<_> = members.iter().filter(|r| !r.is_linked()).collect();
        if linked.len() != 1 || unlinked.is_empty() {
            continue;
        }
        let unlinked_ids: Vec<i64> = unlinked.iter().filter_map(|r| r.id).collect();
        for receipt in &unlinked {
            if !receipt.potential_duplicate {
                if let Some(id) = receipt.id {
                    receipts::mark_potential_duplicate(session.conn(), id).await?;
                }
            }
        }
        report.findings.push(Finding::DuplicateCandidate {
            entity: "receipt".to_string(),
            date,
            amount_cents: cents,
            linked_id: linked[0].id.unwrap_or(0),
            unlinked_ids,
        });
    }

    // Duplicate candidates among payments: report only, nothing to flag.
    for (date, cents) in payments::duplicate_date_amount_groups(session.conn()).await? {
        let members = payments::list_by_date_amount(session.conn(), date, cents).await?;
        let linked: Vec<_> = members
            .iter()
            .filter(|p| p.banking_transaction_id.is_some())
            .collect();
        let unlinked_ids: Vec<i64> = members
            .iter()
            .filter(|p| p.banking_transaction_id.is_none())
            .filter_map(|p| p.id)
            .collect();
        if linked.len() != 1 || unlinked_ids.is_empty() {
            continue;
        }
        report.findings.push(Finding::DuplicateCandidate {
            entity: "payment".to_string(),
            date,
            amount_cents: cents,
            linked_id: linked[0].id.unwrap_or(0),
            unlinked_ids,
        });
    }

    // Stored derived fields vs recomputation, every charter.
    let mut offset = 0;
    loop {
        let reserves = charters::list_reserve_numbers(session.conn(), offset, 500).await?;
        if reserves.is_empty() {
            break;
        }
        offset += reserves.len() as i64;
        for reserve in reserves {
            let Some(charter) = charters::get_by_reserve(session.conn(), &reserve).await? else {
                continue;
            };
            let derived_paid = payments::sum_for_reserve(session.conn(), &reserve).await?;
            let derived_balance = charter.total_due_cents.unwrap_or(0) - derived_paid;
            if derived_paid != charter.paid_cents || derived_balance != charter.balance_cents {
                report.findings.push(Finding::BalanceMismatch {
                    reserve_number: reserve,
                    stored_paid_cents: charter.paid_cents,
                    stored_balance_cents: charter.balance_cents,
                    derived_paid_cents: derived_paid,
                    derived_balance_cents: derived_balance,
                });
            }
        }
    }

    // Orphaned payments.
    for payment in payments::list_orphaned(session.conn()).await? {
        report.findings.push(Finding::OrphanedPayment {
            payment_id: payment.id.unwrap_or(0),
            reserve_number: payment.reserve_number.clone(),
            amount_cents: payment.amount_cents,
        });
    }

    // Unverified split provenance.
    let all_receipts = receipts::list_all(session.conn()).await?;
    for group in resolve_groups(&all_receipts) {
        if !group.has_marker {
            report.findings.push(Finding::UnverifiedSplit {
                anchor_id: group.anchor_id,
                member_ids: group.member_ids.clone(),
            });
        }
    }

    // Linkage consistency: flag matched transactions whose linked amounts
    // drifted, restore flagged ones that check out again.
    for status in [ReconStatus::Matched, ReconStatus::Flagged] {
        for tx in bank::list_by_status(session.conn(), status).await? {
            let Some(id) = tx.id else { continue };
            let expected = tx.unsigned_amount_cents();
            let linked = linked_cents(session.conn(), id.0).await?;
            let consistent = (expected - linked).abs() <= settings.amount_epsilon_cents;

            if !consistent {
                report.findings.push(Finding::LinkageMismatch {
                    banking_transaction_id: id.0,
                    transaction_cents: expected,
                    linked_cents: linked,
                });
                if status == ReconStatus::Matched {
                    bank::update_status(session.conn(), id.0, ReconStatus::Flagged).await?;
                    report.flagged += 1;
                }
            } else if status == ReconStatus::Flagged {
                bank::update_status(session.conn(), id.0, ReconStatus::Matched).await?;
                report.restored += 1;
            }
        }
    }

    tracing::info!(
        findings = report.findings.len(),
        flagged = report.flagged,
        restored = report.restored,
        "conflict report complete"
    );
    Ok(report)
}
