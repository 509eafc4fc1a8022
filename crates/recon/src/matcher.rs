use chrono::NaiveDate;
use ledgermend_core::{
    BankTransaction, MatchRecord, MatchStatus, MatchTarget, MatchType, ReconSettings, ReconStatus,
};
use ledgermend_storage::{bank, matches, payments, receipts, Session};
use serde::Serialize;
use sqlx::SqliteConnection;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MatchError {
    #[error("Storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

/// Ranking tiers, best first. Exact date + exact amount beats a same-day
/// epsilon match beats a nearest-date match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum MatchTier {
    ExactDateAmount,
    SameDay,
    NearDate,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScoredCandidate {
    pub target: MatchTarget,
    pub date: NaiveDate,
    pub amount_cents: i64,
    pub tier: MatchTier,
    pub date_diff_days: i64,
    pub confidence: f64,
}

#[derive(Debug)]
pub enum MatchDecision {
    Attach(ScoredCandidate),
    /// Two or more equally-ranked candidates. Never guessed between;
    /// surfaced for human disambiguation.
    Ambiguous(Vec<ScoredCandidate>),
    BelowFloor(ScoredCandidate),
    NoCandidates,
}

#[derive(Debug)]
pub enum AttachOutcome {
    Attached(i64),
    /// The target already has an active match record. Attaching again is a
    /// no-op; the existing record is never overwritten.
    AlreadyLinked,
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct MatchSummary {
    pub examined: usize,
    pub matched: usize,
    pub ambiguous: usize,
    pub below_floor: usize,
    pub no_candidates: usize,
}

fn confidence_for(tier: MatchTier, date_diff_days: i64, window_days: u64) -> f64 {
    match tier {
        MatchTier::ExactDateAmount => 1.0,
        MatchTier::SameDay => 0.9,
        // Scales the date distance against the channel's own window: the
        // window edge lands exactly on the default floor, so tightening
        // the floor shrinks the auto-match radius without touching the
        // candidate search.
        MatchTier::NearDate => {
            0.9 - 0.2 * (date_diff_days as f64 / window_days.max(1) as f64)
        }
    }
}

/// Raw candidate rows as pulled from storage, before scoring.
pub(crate) struct Candidate {
    pub target: MatchTarget,
    pub date: NaiveDate,
    pub amount_cents: i64,
    /// Channel-specific window that admitted this candidate.
    pub window_days: u64,
}

fn target_order(target: MatchTarget) -> (u8, i64) {
    match target {
        MatchTarget::Receipt(id) => (0, id),
        MatchTarget::Payment(id) => (1, id),
    }
}

/// Score and order candidates for one transaction. The ordering is total
/// and deterministic: tier, then date distance, then receipts before
/// payments, then lowest id — never iteration order.
pub(crate) fn rank_candidates(tx: &BankTransaction, candidates: Vec<Candidate>) -> Vec<ScoredCandidate> {
    let amount = tx.unsigned_amount_cents();
    let mut scored: Vec<ScoredCandidate> = candidates
        .into_iter()
        .map(|c| {
            let date_diff_days = (tx.transaction_date - c.date).num_days().abs();
            let tier = if date_diff_days == 0 && c.amount_cents == amount {
                MatchTier::ExactDateAmount
            } else if date_diff_days == 0 {
                MatchTier::SameDay
            } else {
                MatchTier::NearDate
            };
            ScoredCandidate {
                target: c.target,
                date: c.date,
                amount_cents: c.amount_cents,
                tier,
                date_diff_days,
                confidence: confidence_for(tier, date_diff_days, c.window_days),
            }
        })
        .collect();

    scored.sort_by_key(|c| {
        let (kind, id) = target_order(c.target);
        (c.tier, c.date_diff_days, kind, id)
    });
    scored
}

/// Pick the outcome for one transaction from its ranked candidates.
pub fn decide(ranked: Vec<ScoredCandidate>, confidence_floor: f64) -> MatchDecision {
    let mut iter = ranked.into_iter();
    let Some(best) = iter.next() else {
        return MatchDecision::NoCandidates;
    };

    let rivals: Vec<ScoredCandidate> = iter
        .filter(|c| c.tier == best.tier && c.date_diff_days == best.date_diff_days)
        .collect();
    if !rivals.is_empty() {
        let mut all = vec![best];
        all.extend(rivals);
        return MatchDecision::Ambiguous(all);
    }

    if best.confidence < confidence_floor {
        return MatchDecision::BelowFloor(best);
    }
    MatchDecision::Attach(best)
}

/// Create a match record and link both sides. Refuses to double-book:
/// a target with an existing active record is left untouched.
pub async fn attach_match(
    conn: &mut SqliteConnection,
    banking_transaction_id: i64,
    target: MatchTarget,
    match_date: NaiveDate,
    match_type: MatchType,
    confidence: f64,
    notes: Option<String>,
    created_by: &str,
) -> Result<AttachOutcome, MatchError> {
    if matches::active_for_target(conn, target).await?.is_some() {
        tracing::warn!(%target, "already linked; refusing to overwrite match");
        return Ok(AttachOutcome::AlreadyLinked);
    }

    let record_id = matches::insert_match_record(
        conn,
        &MatchRecord {
            id: None,
            banking_transaction_id,
            target,
            match_date,
            match_type,
            match_status: MatchStatus::Active,
            confidence,
            notes,
            created_by: created_by.to_string(),
            created_at: None,
        },
    )
    .await?;

    match target {
        MatchTarget::Receipt(receipt_id) => {
            receipts::link_to_bank(conn, receipt_id, banking_transaction_id).await?;
        }
        MatchTarget::Payment(payment_id) => {
            payments::link_to_bank(conn, payment_id, banking_transaction_id).await?;
        }
    }
    bank::update_status(conn, banking_transaction_id, ReconStatus::Matched).await?;

    Ok(AttachOutcome::Attached(record_id))
}

/// Gather scored candidates for one unreconciled transaction: unlinked
/// receipts in the default window, unlinked payments in their
/// channel-specific windows.
pub async fn find_candidates(
    conn: &mut SqliteConnection,
    settings: &ReconSettings,
    tx: &BankTransaction,
) -> Result<Vec<ScoredCandidate>, MatchError> {
    let amount = tx.unsigned_amount_cents();
    let lo = amount - settings.amount_epsilon_cents;
    let hi = amount + settings.amount_epsilon_cents;

    let mut candidates = Vec::new();

    let receipt_window_days = settings.windows.for_method(None);
    let receipt_window = settings.window_around(tx.transaction_date, None);
    for receipt in receipts::unlinked_in_window(conn, receipt_window, lo, hi).await? {
        if let Some(id) = receipt.id {
            candidates.push(Candidate {
                target: MatchTarget::Receipt(id),
                date: receipt.receipt_date,
                amount_cents: receipt.gross_cents,
                window_days: receipt_window_days,
            });
        }
    }

    // Pull payments at the widest window, then keep each candidate only if
    // it falls inside the window for its own channel.
    let widest = ledgermend_core::DateRange::around(tx.transaction_date, settings.windows.widest());
    for payment in payments::unlinked_in_window(conn, widest, lo, hi).await? {
        let window_days = settings.windows.for_method(Some(payment.method));
        let diff = (tx.transaction_date - payment.payment_date).num_days().unsigned_abs();
        if diff > window_days {
            continue;
        }
        if let Some(id) = payment.id {
            candidates.push(Candidate {
                target: MatchTarget::Payment(id),
                date: payment.payment_date,
                amount_cents: payment.amount_cents,
                window_days,
            });
        }
    }

    Ok(rank_candidates(tx, candidates))
}

/// One matching pass over the unreconciled backlog. Idempotent: a second
/// run over a fully-matched store attaches nothing.
pub async fn run_matcher(
    session: &mut Session,
    settings: &ReconSettings,
    match_date: NaiveDate,
    limit: Option<i64>,
) -> Result<MatchSummary, MatchError> {
    let mut summary = MatchSummary::default();
    let backlog = bank::list_unreconciled(session.conn(), limit).await?;

    for tx in backlog {
        summary.examined += 1;
        let Some(id) = tx.id else { continue };
        let tx_id = id.0;

        let ranked = find_candidates(session.conn(), settings, &tx).await?;
        match decide(ranked, settings.confidence_floor) {
            MatchDecision::Attach(candidate) => {
                let outcome = attach_match(
                    session.conn(),
                    tx_id,
                    candidate.target,
                    match_date,
                    MatchType::AutoGenerated,
                    candidate.confidence,
                    None,
                    "auto-matcher",
                )
                .await?;
                match outcome {
                    AttachOutcome::Attached(_) => summary.matched += 1,
                    AttachOutcome::AlreadyLinked => summary.ambiguous += 1,
                }
            }
            MatchDecision::Ambiguous(candidates) => {
                tracing::debug!(
                    bank_transaction = tx_id,
                    candidates = candidates.len(),
                    "ambiguous match left unreconciled"
                );
                summary.ambiguous += 1;
            }
            MatchDecision::BelowFloor(best) => {
                tracing::debug!(
                    bank_transaction = tx_id,
                    confidence = best.confidence,
                    "best candidate below confidence floor"
                );
                summary.below_floor += 1;
            }
            MatchDecision::NoCandidates => summary.no_candidates += 1,
        }
    }

    tracing::info!(
        examined = summary.examined,
        matched = summary.matched,
        ambiguous = summary.ambiguous,
        below_floor = summary.below_floor,
        no_candidates = summary.no_candidates,
        "matcher pass complete"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 1, d).unwrap()
    }

    fn tx(day: u32, debit_cents: i64) -> BankTransaction {
        BankTransaction {
            id: Some(ledgermend_core::BankTransactionId(1)),
            account_number: "1001".to_string(),
            transaction_date: date(day),
            posted_date: None,
            description: "VENDOR X".to_string(),
            debit_cents: Some(debit_cents),
            credit_cents: None,
            bank_balance_cents: None,
            source_file: "f".to_string(),
            content_hash: "h".to_string(),
            status: ReconStatus::Unreconciled,
            created_at: None,
        }
    }

    fn cand(target: MatchTarget, day: u32, cents: i64) -> Candidate {
        Candidate {
            target,
            date: date(day),
            amount_cents: cents,
            window_days: 3,
        }
    }

    #[test]
    fn exact_beats_same_day_beats_near_date() {
        let ranked = rank_candidates(
            &tx(15, 15000),
            vec![
                cand(MatchTarget::Receipt(3), 16, 15000), // near date
                cand(MatchTarget::Receipt(2), 15, 15001), // same day, epsilon
                cand(MatchTarget::Receipt(1), 15, 15000), // exact
            ],
        );
        assert_eq!(ranked[0].target, MatchTarget::Receipt(1));
        assert_eq!(ranked[0].tier, MatchTier::ExactDateAmount);
        assert_eq!(ranked[0].confidence, 1.0);
        assert_eq!(ranked[1].target, MatchTarget::Receipt(2));
        assert_eq!(ranked[2].target, MatchTarget::Receipt(3));
    }

    #[test]
    fn ties_break_by_lowest_id_receipts_first() {
        let ranked = rank_candidates(
            &tx(15, 15000),
            vec![
                cand(MatchTarget::Payment(1), 15, 15000),
                cand(MatchTarget::Receipt(9), 15, 15000),
                cand(MatchTarget::Receipt(4), 15, 15000),
            ],
        );
        assert_eq!(ranked[0].target, MatchTarget::Receipt(4));
        assert_eq!(ranked[1].target, MatchTarget::Receipt(9));
        assert_eq!(ranked[2].target, MatchTarget::Payment(1));
    }

    #[test]
    fn decide_attaches_single_high_confidence() {
        let ranked = rank_candidates(&tx(15, 15000), vec![cand(MatchTarget::Receipt(1), 15, 15000)]);
        assert!(matches!(decide(ranked, 0.7), MatchDecision::Attach(_)));
    }

    #[test]
    fn decide_refuses_equal_rank() {
        let ranked = rank_candidates(
            &tx(15, 15000),
            vec![
                cand(MatchTarget::Receipt(1), 15, 15000),
                cand(MatchTarget::Receipt(2), 15, 15000),
            ],
        );
        match decide(ranked, 0.7) {
            MatchDecision::Ambiguous(all) => assert_eq!(all.len(), 2),
            other => panic!("expected ambiguous, got {other:?}"),
        }
    }

    #[test]
    fn decide_reports_below_tightened_floor() {
        // 2 days off in a 3-day window scores 0.9 - 0.2 * 2/3 ≈ 0.767:
        // enough for the default floor, not for a stricter one.
        let ranked = rank_candidates(&tx(15, 15000), vec![cand(MatchTarget::Receipt(1), 17, 15000)]);
        assert!(matches!(decide(ranked.clone(), 0.7), MatchDecision::Attach(_)));
        assert!(matches!(decide(ranked, 0.8), MatchDecision::BelowFloor(_)));
    }

    #[test]
    fn window_edge_scores_at_the_default_floor() {
        // 10 days off in a 10-day cheque window: 0.9 - 0.2 = 0.7 exactly.
        let c = Candidate {
            target: MatchTarget::Payment(1),
            date: date(25),
            amount_cents: 15000,
            window_days: 10,
        };
        let ranked = rank_candidates(&tx(15, 15000), vec![c]);
        assert!(matches!(decide(ranked, 0.7), MatchDecision::Attach(_)));
    }

    #[test]
    fn decide_handles_empty() {
        assert!(matches!(decide(Vec::new(), 0.7), MatchDecision::NoCandidates));
    }
}
