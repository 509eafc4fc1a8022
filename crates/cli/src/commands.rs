use std::path::Path;
use std::process::ExitCode;

use anyhow::Context;
use chrono::Utc;
use ledgermend_core::ReconSettings;
use ledgermend_recon::{
    cancel_charter, import_rows, recalculate, recalculate_all, run_matcher, run_report,
    run_split_resolver, BankRow, Finding,
};
use ledgermend_storage::{unlink_receipt_with_audit, DbPool, RunMode, Session};

fn mode_for(write: bool) -> RunMode {
    if write {
        RunMode::Write
    } else {
        RunMode::DryRun
    }
}

fn dry_run_notice(committed: bool) {
    if !committed {
        println!("Dry-run: nothing was committed. Re-run with --write to apply.");
    }
}

pub async fn import(
    pool: &DbPool,
    file: &Path,
    write: bool,
    limit: Option<usize>,
) -> anyhow::Result<ExitCode> {
    let raw = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;

    let mut rows: Vec<BankRow> = Vec::new();
    let mut unparseable = 0usize;
    for (lineno, line) in raw.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<BankRow>(line) {
            Ok(row) => rows.push(row),
            Err(e) => {
                tracing::warn!(line = lineno + 1, "unparseable bank row: {e}");
                unparseable += 1;
            }
        }
    }

    let mode = mode_for(write);
    let mut session = Session::begin(pool, mode).await?;
    let summary = import_rows(&mut session, &rows, limit).await?;
    let committed = session.finish().await?;

    println!(
        "Import ({}): read {}, inserted {}, duplicates skipped {}, rejected {}",
        mode.label(),
        summary.read + unparseable,
        summary.inserted,
        summary.duplicates,
        summary.rejected + unparseable,
    );
    dry_run_notice(committed);

    if summary.rejected + unparseable > 0 {
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

pub async fn run_match(
    pool: &DbPool,
    settings: &ReconSettings,
    write: bool,
    limit: Option<i64>,
) -> anyhow::Result<ExitCode> {
    let mode = mode_for(write);
    let mut session = Session::begin(pool, mode).await?;
    let summary = run_matcher(&mut session, settings, Utc::now().date_naive(), limit).await?;
    let committed = session.finish().await?;

    println!(
        "Match ({}): examined {}, matched {}, ambiguous {}, below floor {}, no candidates {}",
        mode.label(),
        summary.examined,
        summary.matched,
        summary.ambiguous,
        summary.below_floor,
        summary.no_candidates,
    );
    dry_run_notice(committed);
    Ok(ExitCode::SUCCESS)
}

pub async fn splits(pool: &DbPool, write: bool, limit: Option<usize>) -> anyhow::Result<ExitCode> {
    let mode = mode_for(write);
    let mut session = Session::begin(pool, mode).await?;
    let (summary, _groups) = run_split_resolver(&mut session, limit).await?;
    let committed = session.finish().await?;

    println!(
        "Splits ({}): {} groups, {} members updated, {} unverified, {} synthetic parents",
        mode.label(),
        summary.groups,
        summary.members_updated,
        summary.unverified_groups,
        summary.synthetic_parents,
    );
    dry_run_notice(committed);
    Ok(ExitCode::SUCCESS)
}

pub async fn recalc(
    pool: &DbPool,
    reserve: Option<&str>,
    write: bool,
    limit: Option<i64>,
    chunk_size: i64,
) -> anyhow::Result<ExitCode> {
    let mode = mode_for(write);

    match reserve {
        Some(reserve) => {
            let mut session = Session::begin(pool, mode).await?;
            let outcome = recalculate(session.conn(), reserve).await?;
            let committed = session.finish().await?;

            println!(
                "Recalc ({}): {} paid {} balance {}{}{}",
                mode.label(),
                outcome.reserve_number,
                ledgermend_core::Money::from_cents(outcome.paid_cents),
                ledgermend_core::Money::from_cents(outcome.balance_cents),
                if outcome.changed { "" } else { " (already correct)" },
                if outcome.missing_total {
                    " [no amount due on record; flagged for review]"
                } else {
                    ""
                },
            );
            dry_run_notice(committed);
        }
        None => {
            let summary = recalculate_all(pool, mode, chunk_size, limit).await?;
            println!(
                "Recalc ({}): examined {}, changed {}, missing totals {}, chunks committed {}",
                mode.label(),
                summary.examined,
                summary.changed,
                summary.missing_total,
                summary.chunks_committed,
            );
            dry_run_notice(mode.is_write());
        }
    }
    Ok(ExitCode::SUCCESS)
}

pub async fn cancel(
    pool: &DbPool,
    reserve: &str,
    note: &str,
    write: bool,
) -> anyhow::Result<ExitCode> {
    let mode = mode_for(write);
    let mut session = Session::begin(pool, mode).await?;
    let outcome = cancel_charter(session.conn(), reserve, note).await?;
    let committed = session.finish().await?;

    println!(
        "Cancel ({}): {} amount due forced to $0.00, balance {}",
        mode.label(),
        outcome.reserve_number,
        ledgermend_core::Money::from_cents(outcome.balance_cents),
    );
    dry_run_notice(committed);
    Ok(ExitCode::SUCCESS)
}

pub async fn unlink(
    pool: &DbPool,
    receipt_id: i64,
    note: &str,
    write: bool,
) -> anyhow::Result<ExitCode> {
    let mode = mode_for(write);
    let mut session = Session::begin(pool, mode).await?;
    let unlinked = unlink_receipt_with_audit(session.conn(), receipt_id, note).await?;
    let committed = session.finish().await?;

    if unlinked {
        println!("Unlink ({}): receipt #{receipt_id} unlinked", mode.label());
    } else {
        println!(
            "Unlink ({}): receipt #{receipt_id} has no bank link; nothing to do",
            mode.label()
        );
    }
    dry_run_notice(committed);
    Ok(ExitCode::SUCCESS)
}

fn describe(finding: &Finding) -> String {
    match finding {
        Finding::Unmatched {
            banking_transaction_id,
            transaction_date,
            description,
            amount_cents,
            age_days,
        } => format!(
            "unmatched: bank #{banking_transaction_id} {transaction_date} '{description}' {} ({age_days} days old)",
            ledgermend_core::Money::from_cents(*amount_cents)
        ),
        Finding::DuplicateCandidate {
            entity,
            date,
            amount_cents,
            linked_id,
            unlinked_ids,
        } => format!(
            "duplicate candidate: {entity}s on {date} for {} — #{linked_id} is linked, {:?} are not",
            ledgermend_core::Money::from_cents(*amount_cents),
            unlinked_ids
        ),
        Finding::BalanceMismatch {
            reserve_number,
            stored_balance_cents,
            derived_balance_cents,
            ..
        } => format!(
            "balance mismatch: charter {reserve_number} stores {} but payments derive {}",
            ledgermend_core::Money::from_cents(*stored_balance_cents),
            ledgermend_core::Money::from_cents(*derived_balance_cents)
        ),
        Finding::LinkageMismatch {
            banking_transaction_id,
            transaction_cents,
            linked_cents,
        } => format!(
            "linkage mismatch: bank #{banking_transaction_id} is {} but its links total {}",
            ledgermend_core::Money::from_cents(*transaction_cents),
            ledgermend_core::Money::from_cents(*linked_cents)
        ),
        Finding::OrphanedPayment {
            payment_id,
            reserve_number,
            amount_cents,
        } => format!(
            "orphaned payment: #{payment_id} for {} references unknown reserve '{reserve_number}'",
            ledgermend_core::Money::from_cents(*amount_cents)
        ),
        Finding::UnverifiedSplit {
            anchor_id,
            member_ids,
        } => format!(
            "unverified split: family #{anchor_id} groups {member_ids:?} without an explicit marker"
        ),
    }
}

pub async fn report(
    pool: &DbPool,
    settings: &ReconSettings,
    write: bool,
    json: bool,
) -> anyhow::Result<ExitCode> {
    let mode = mode_for(write);
    let mut session = Session::begin(pool, mode).await?;
    let report = run_report(&mut session, settings, Utc::now().date_naive()).await?;
    let committed = session.finish().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for finding in &report.findings {
            println!("{}", describe(finding));
        }
        println!(
            "Report ({}): {} findings ({} unmatched, {} duplicates, {} balance mismatches, \
             {} linkage mismatches, {} orphaned payments, {} unverified splits); \
             {} flagged, {} restored",
            mode.label(),
            report.findings.len(),
            report.count("unmatched"),
            report.count("duplicate_candidate"),
            report.count("balance_mismatch"),
            report.count("linkage_mismatch"),
            report.count("orphaned_payment"),
            report.count("unverified_split"),
            report.flagged,
            report.restored,
        );
    }
    dry_run_notice(committed);

    // Invariant violations mean the run did not end in a clean state.
    let violations = report.count("balance_mismatch")
        + report.count("linkage_mismatch")
        + report.count("orphaned_payment");
    if violations > 0 {
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}
