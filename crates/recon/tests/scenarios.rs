//! End-to-end runs of the reconciliation engine against a real SQLite
//! file: import, matching, balances, splits, and the conflict report.

use chrono::NaiveDate;
use ledgermend_core::{
    Charter, MatchTarget, Payment, PaymentMethod, Receipt, ReconSettings, ReconStatus,
};
use ledgermend_recon::{
    cancel_charter, import_rows, recalculate, run_matcher, run_report, run_split_resolver,
    BankRow, Finding,
};
use ledgermend_storage::{bank, charters, create_db, matches, payments, receipts, DbPool, RunMode, Session};

async fn test_pool() -> (tempfile::TempDir, DbPool) {
    let dir = tempfile::tempdir().unwrap();
    let pool = create_db(&dir.path().join("ledger.db")).await.unwrap();
    (dir, pool)
}

fn date(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 1, d).unwrap()
}

fn vendor_row(day: u32, description: &str, debit: &str) -> BankRow {
    BankRow {
        account_number: "1001".to_string(),
        transaction_date: format!("2026-01-{day:02}"),
        posted_date: None,
        description: description.to_string(),
        debit_amount: Some(debit.to_string()),
        credit_amount: None,
        running_balance: None,
        source_file: "jan.jsonl".to_string(),
    }
}

#[tokio::test]
async fn scenario_a_importing_twice_inserts_once() {
    let (_dir, pool) = test_pool().await;
    let rows = vec![vendor_row(15, "VENDOR X", "150.00")];

    for _ in 0..2 {
        let mut session = Session::begin(&pool, RunMode::Write).await.unwrap();
        import_rows(&mut session, &rows, None).await.unwrap();
        session.finish().await.unwrap();
    }

    let mut session = Session::begin(&pool, RunMode::DryRun).await.unwrap();
    assert_eq!(bank::count_all(session.conn()).await.unwrap(), 1);
    let txs = bank::list_unreconciled(session.conn(), None).await.unwrap();
    assert_eq!(txs.len(), 1);
    assert_eq!(txs[0].status, ReconStatus::Unreconciled);
    assert_eq!(txs[0].debit_cents, Some(15000));
}

#[tokio::test]
async fn dry_run_import_commits_nothing() {
    let (_dir, pool) = test_pool().await;
    let rows = vec![vendor_row(15, "VENDOR X", "150.00")];

    let mut session = Session::begin(&pool, RunMode::DryRun).await.unwrap();
    let summary = import_rows(&mut session, &rows, None).await.unwrap();
    assert_eq!(summary.inserted, 1);
    session.finish().await.unwrap();

    let mut session = Session::begin(&pool, RunMode::DryRun).await.unwrap();
    assert_eq!(bank::count_all(session.conn()).await.unwrap(), 0);
}

#[tokio::test]
async fn malformed_rows_are_rejected_individually() {
    let (_dir, pool) = test_pool().await;
    let mut bad_date = vendor_row(15, "VENDOR X", "150.00");
    bad_date.transaction_date = "not-a-date".to_string();
    let mut both_amounts = vendor_row(16, "VENDOR Y", "10.00");
    both_amounts.credit_amount = Some("10.00".to_string());
    let rows = vec![bad_date, vendor_row(17, "VENDOR Z", "20.00"), both_amounts];

    let mut session = Session::begin(&pool, RunMode::Write).await.unwrap();
    let summary = import_rows(&mut session, &rows, None).await.unwrap();
    session.finish().await.unwrap();

    assert_eq!(summary.read, 3);
    assert_eq!(summary.inserted, 1);
    assert_eq!(summary.rejected, 2);
}

#[tokio::test]
async fn scenario_b_single_candidate_auto_matches_and_rerun_is_noop() {
    let (_dir, pool) = test_pool().await;
    let settings = ReconSettings::default();

    let mut session = Session::begin(&pool, RunMode::Write).await.unwrap();
    receipts::insert_receipt(session.conn(), &Receipt::new(date(15), "VENDOR X", 15000))
        .await
        .unwrap();
    import_rows(&mut session, &[vendor_row(15, "VENDOR X", "150.00")], None)
        .await
        .unwrap();
    let summary = run_matcher(&mut session, &settings, date(20), None).await.unwrap();
    session.finish().await.unwrap();

    assert_eq!(summary.matched, 1);

    let mut session = Session::begin(&pool, RunMode::Write).await.unwrap();
    let conn = session.conn();
    assert_eq!(bank::count_by_status(conn, ReconStatus::Matched).await.unwrap(), 1);
    let records = matches::active_for_bank_transaction(conn, 1).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].match_type, ledgermend_core::MatchType::AutoGenerated);
    assert_eq!(records[0].created_by, "auto-matcher");

    // Rerunning over the fully-matched store produces zero new records.
    let again = run_matcher(&mut session, &settings, date(21), None).await.unwrap();
    assert_eq!(again.examined, 0);
    assert_eq!(again.matched, 0);
    assert_eq!(matches::count_active(session.conn()).await.unwrap(), 1);
}

#[tokio::test]
async fn equal_candidates_stay_unreconciled() {
    let (_dir, pool) = test_pool().await;
    let settings = ReconSettings::default();

    let mut session = Session::begin(&pool, RunMode::Write).await.unwrap();
    receipts::insert_receipt(session.conn(), &Receipt::new(date(15), "VENDOR X", 15000))
        .await
        .unwrap();
    receipts::insert_receipt(session.conn(), &Receipt::new(date(15), "VENDOR X", 15000))
        .await
        .unwrap();
    import_rows(&mut session, &[vendor_row(15, "VENDOR X", "150.00")], None)
        .await
        .unwrap();

    let summary = run_matcher(&mut session, &settings, date(20), None).await.unwrap();
    assert_eq!(summary.matched, 0);
    assert_eq!(summary.ambiguous, 1);
    assert_eq!(
        bank::count_by_status(session.conn(), ReconStatus::Unreconciled).await.unwrap(),
        1
    );
}

#[tokio::test]
async fn no_receipt_or_payment_is_double_booked() {
    let (_dir, pool) = test_pool().await;
    let settings = ReconSettings::default();

    let mut session = Session::begin(&pool, RunMode::Write).await.unwrap();
    let receipt_id =
        receipts::insert_receipt(session.conn(), &Receipt::new(date(15), "VENDOR X", 15000))
            .await
            .unwrap();
    // Two bank lines that would both like the same receipt.
    import_rows(
        &mut session,
        &[
            vendor_row(15, "VENDOR X", "150.00"),
            vendor_row(15, "VENDOR X POS", "150.00"),
        ],
        None,
    )
    .await
    .unwrap();

    let summary = run_matcher(&mut session, &settings, date(20), None).await.unwrap();
    assert_eq!(summary.matched, 1);
    // The second transaction found the receipt already linked.
    assert_eq!(summary.matched + summary.no_candidates, 2);

    assert_eq!(matches::count_active(session.conn()).await.unwrap(), 1);
    let record = matches::active_for_target(session.conn(), MatchTarget::Receipt(receipt_id))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.banking_transaction_id, 1);
}

#[tokio::test]
async fn payment_channel_window_governs_matching() {
    let (_dir, pool) = test_pool().await;
    let settings = ReconSettings::default();

    let mut session = Session::begin(&pool, RunMode::Write).await.unwrap();
    // Cheque dated 8 days before the bank line: inside the 10-day cheque
    // window, outside every other channel's.
    payments::insert_payment(
        session.conn(),
        &Payment::new("R-1", 22000, date(7), PaymentMethod::Cheque),
    )
    .await
    .unwrap();
    let mut row = vendor_row(15, "CHEQUE DEPOSIT", "220.00");
    row.debit_amount = None;
    row.credit_amount = Some("220.00".to_string());
    import_rows(&mut session, &[row], None).await.unwrap();

    let summary = run_matcher(&mut session, &settings, date(20), None).await.unwrap();
    assert_eq!(summary.matched, 1);

    let record = matches::active_for_bank_transaction(session.conn(), 1).await.unwrap();
    assert_eq!(record[0].target, MatchTarget::Payment(1));
    assert!(record[0].confidence >= settings.confidence_floor);
}

#[tokio::test]
async fn scenario_c_paid_and_balance_derive_from_payments() {
    let (_dir, pool) = test_pool().await;

    let mut session = Session::begin(&pool, RunMode::Write).await.unwrap();
    let conn = session.conn();
    charters::insert_charter(conn, &Charter::new("R-100", Some(30000))).await.unwrap();
    for cents in [15000, 10000, 5000] {
        payments::insert_payment(conn, &Payment::new("R-100", cents, date(10), PaymentMethod::Card))
            .await
            .unwrap();
        recalculate(conn, "R-100").await.unwrap();
    }

    let charter = charters::get_by_reserve(conn, "R-100").await.unwrap().unwrap();
    assert_eq!(charter.paid_cents, 30000);
    assert_eq!(charter.balance_cents, 0);
}

#[tokio::test]
async fn scenario_d_cancelled_charter_keeps_payments_as_credit() {
    let (_dir, pool) = test_pool().await;

    let mut session = Session::begin(&pool, RunMode::Write).await.unwrap();
    let conn = session.conn();
    charters::insert_charter(conn, &Charter::new("R-7", Some(20000))).await.unwrap();
    payments::insert_payment(conn, &Payment::new("R-7", 5000, date(10), PaymentMethod::ETransfer))
        .await
        .unwrap();
    recalculate(conn, "R-7").await.unwrap();

    let outcome = cancel_charter(conn, "R-7", "client cancelled").await.unwrap();
    assert_eq!(outcome.balance_cents, -5000);

    let charter = charters::get_by_reserve(conn, "R-7").await.unwrap().unwrap();
    assert_eq!(charter.total_due_cents, Some(0));
    assert_eq!(charter.paid_cents, 5000);
    assert_eq!(charter.balance_cents, -5000);
}

#[tokio::test]
async fn scenario_e_duplicate_receipt_is_flagged_not_deleted() {
    let (_dir, pool) = test_pool().await;
    let settings = ReconSettings::default();

    let mut session = Session::begin(&pool, RunMode::Write).await.unwrap();
    import_rows(&mut session, &[vendor_row(15, "CAR WASH", "75.00")], None)
        .await
        .unwrap();

    let mut linked = Receipt::new(date(15), "CAR WASH", 7500);
    linked.banking_transaction_id = Some(1);
    let linked_id = receipts::insert_receipt(session.conn(), &linked).await.unwrap();
    let unlinked_id =
        receipts::insert_receipt(session.conn(), &Receipt::new(date(15), "CAR WASH DUP", 7500))
            .await
            .unwrap();

    let report = run_report(&mut session, &settings, date(31)).await.unwrap();
    let dup = report
        .findings
        .iter()
        .find_map(|f| match f {
            Finding::DuplicateCandidate { linked_id: l, unlinked_ids, entity, .. }
                if entity == "receipt" =>
            {
                Some((*l, unlinked_ids.clone()))
            }
            _ => None,
        })
        .expect("duplicate candidate finding");
    assert_eq!(dup.0, linked_id);
    assert_eq!(dup.1, vec![unlinked_id]);

    // Flagged for human disambiguation, not removed.
    let survivor = receipts::get_receipt(session.conn(), unlinked_id).await.unwrap().unwrap();
    assert!(survivor.potential_duplicate);
}

#[tokio::test]
async fn split_groups_are_stable_across_reruns() {
    let (_dir, pool) = test_pool().await;

    let mut session = Session::begin(&pool, RunMode::Write).await.unwrap();
    let conn = session.conn();
    let a = receipts::insert_receipt(conn, &Receipt::new(date(15), "DEPOT FUEL", 5000)).await.unwrap();
    let mut part = Receipt::new(date(15), "DEPOT FUEL", 7000);
    part.memo = Some(format!("split with #{a}"));
    let b = receipts::insert_receipt(conn, &part).await.unwrap();

    let (first, groups) = run_split_resolver(&mut session, None).await.unwrap();
    assert_eq!(first.groups, 1);
    assert_eq!(first.members_updated, 2);
    assert_eq!(groups[0].anchor_id, a);
    session.finish().await.unwrap();

    let mut session = Session::begin(&pool, RunMode::Write).await.unwrap();
    let (second, groups) = run_split_resolver(&mut session, None).await.unwrap();
    assert_eq!(second.members_updated, 0);
    assert_eq!(groups[0].anchor_id, a);
    session.finish().await.unwrap();

    let mut session = Session::begin(&pool, RunMode::DryRun).await.unwrap();
    for id in [a, b] {
        let r = receipts::get_receipt(session.conn(), id).await.unwrap().unwrap();
        assert_eq!(r.split_group_id, Some(a));
        assert!(r.is_split_receipt);
    }
}

#[tokio::test]
async fn report_flags_drifted_linkage_and_restores_corrected() {
    let (_dir, pool) = test_pool().await;
    let settings = ReconSettings::default();

    let mut session = Session::begin(&pool, RunMode::Write).await.unwrap();
    receipts::insert_receipt(session.conn(), &Receipt::new(date(15), "VENDOR X", 15000))
        .await
        .unwrap();
    import_rows(&mut session, &[vendor_row(15, "VENDOR X", "150.00")], None)
        .await
        .unwrap();
    run_matcher(&mut session, &settings, date(20), None).await.unwrap();

    // A direct write bypasses the engine and corrupts the linked amount.
    sqlx::query("UPDATE receipts SET gross_cents = 9999 WHERE id = 1")
        .execute(session.conn())
        .await
        .unwrap();

    let report = run_report(&mut session, &settings, date(31)).await.unwrap();
    assert_eq!(report.flagged, 1);
    assert_eq!(
        bank::count_by_status(session.conn(), ReconStatus::Flagged).await.unwrap(),
        1
    );

    // Correcting the receipt lets the next pass restore `matched`.
    sqlx::query("UPDATE receipts SET gross_cents = 15000 WHERE id = 1")
        .execute(session.conn())
        .await
        .unwrap();
    let report = run_report(&mut session, &settings, date(31)).await.unwrap();
    assert_eq!(report.restored, 1);
    assert_eq!(
        bank::count_by_status(session.conn(), ReconStatus::Matched).await.unwrap(),
        1
    );
}

#[tokio::test]
async fn report_surfaces_balance_mismatch_and_orphans() {
    let (_dir, pool) = test_pool().await;
    let settings = ReconSettings::default();

    let mut session = Session::begin(&pool, RunMode::Write).await.unwrap();
    let conn = session.conn();
    charters::insert_charter(conn, &Charter::new("R-1", Some(30000))).await.unwrap();
    payments::insert_payment(conn, &Payment::new("R-1", 30000, date(10), PaymentMethod::Card))
        .await
        .unwrap();
    // Derived fields never recalculated: stored paid/balance are stale.
    payments::insert_payment(conn, &Payment::new("R-404", 5000, date(10), PaymentMethod::Cash))
        .await
        .unwrap();

    let report = run_report(&mut session, &settings, date(31)).await.unwrap();
    assert_eq!(report.count("balance_mismatch"), 1);
    assert_eq!(report.count("orphaned_payment"), 1);
    assert!(report
        .findings
        .iter()
        .any(|f| matches!(f, Finding::OrphanedPayment { reserve_number, .. } if reserve_number == "R-404")));
}

#[tokio::test]
async fn report_surfaces_stale_unmatched() {
    let (_dir, pool) = test_pool().await;
    let settings = ReconSettings::default();

    let mut session = Session::begin(&pool, RunMode::Write).await.unwrap();
    import_rows(&mut session, &[vendor_row(2, "MYSTERY DEBIT", "42.00")], None)
        .await
        .unwrap();

    // Well past the widest window plus the stale threshold.
    let as_of = NaiveDate::from_ymd_opt(2026, 4, 1).unwrap();
    let report = run_report(&mut session, &settings, as_of).await.unwrap();
    assert_eq!(report.count("unmatched"), 1);

    // The day after import it is not yet stale.
    let report = run_report(&mut session, &settings, date(3)).await.unwrap();
    assert_eq!(report.count("unmatched"), 0);
}
