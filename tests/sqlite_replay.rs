use tempfile::TempDir;

use libcat::{
    book::BookDraft,
    core::catalog::{Catalog, CatalogConfig},
    loan::{LoanDraft, PatronDraft},
    persist::{OpSink, sqlite::SqliteOpSink},
    types::BookStatus,
};

fn config() -> CatalogConfig {
    CatalogConfig {
        current_year: Some(2026),
    }
}

fn patron() -> PatronDraft {
    PatronDraft::new("Ana", "ana@x.com")
}

#[test]
fn sqlite_replay_round_trips_state_and_order() {
    let tmp = TempDir::new().expect("tmp");
    let db_path = tmp.path().join("catalog.db");

    let mut cat = Catalog::with_config(config());
    let mut sink = SqliteOpSink::open(&db_path).expect("open sqlite");

    cat.register_book(BookDraft::new("Dune", 1965, 412)).expect("register dune");
    cat.register_book(BookDraft::new("Emma", 1815, 300)).expect("register emma");
    cat.create_loan(LoanDraft::new(1, patron())).expect("loan 1");
    cat.create_loan(LoanDraft::new(2, patron())).expect("loan 2");
    cat.return_book(2).expect("return");
    cat.delete_loan(2).expect("delete");

    let ops = cat.drain_pending_ops();
    assert_eq!(sink.append_ops(&ops).expect("append"), 6);
    drop(sink);

    let reopened = SqliteOpSink::open(&db_path).expect("reopen");
    assert_eq!(reopened.latest_seq().expect("latest"), 6);
    let replayed = reopened.load_catalog(config()).expect("replay");

    assert_eq!(replayed.export_snapshot(), cat.export_snapshot());
    assert_eq!(replayed.get_book(1).map(|b| b.status), Some(BookStatus::Loaned));
    assert_eq!(replayed.get_book(2).map(|b| b.status), Some(BookStatus::Available));
    assert!(replayed.get_loan(2).is_none());
}

#[test]
fn snapshot_and_compaction_preserve_replay() {
    let tmp = TempDir::new().expect("tmp");
    let db_path = tmp.path().join("snap.db");

    let mut cat = Catalog::with_config(config());
    let mut sink = SqliteOpSink::open(&db_path).expect("open sqlite");

    for i in 0..10 {
        cat.register_book(BookDraft::new(format!("Volume {i}"), 1990, 120))
            .expect("register");
    }
    cat.create_loan(LoanDraft::new(3, patron())).expect("loan");
    sink.append_ops(&cat.drain_pending_ops()).expect("append");

    let snapshot = cat.export_snapshot();
    let last_seq = cat.latest_op_seq();
    sink.write_snapshot(&snapshot, last_seq).expect("snapshot");
    let removed = sink.compact_through(last_seq).expect("compact");
    assert_eq!(removed, 11);

    cat.return_book(3).expect("return after snapshot");
    sink.append_ops(&cat.drain_pending_ops()).expect("append tail");
    drop(sink);

    let reopened = SqliteOpSink::open(&db_path).expect("reopen");
    let mut replayed = reopened.load_catalog(config()).expect("replay");
    assert_eq!(replayed.export_snapshot(), cat.export_snapshot());

    let (book, op) = replayed
        .register_book(BookDraft::new("After restart", 2001, 90))
        .expect("register after replay");
    assert_eq!(book.id, 11);
    assert_eq!(op.seq, 13);
}

#[test]
fn per_record_history_follows_book_and_loan_columns() {
    let mut cat = Catalog::with_config(config());
    let mut sink = SqliteOpSink::open_in_memory().expect("open sqlite");

    cat.register_book(BookDraft::new("Dune", 1965, 412)).expect("register dune");
    cat.register_book(BookDraft::new("Emma", 1815, 300)).expect("register emma");
    cat.create_loan(LoanDraft::new(2, patron())).expect("loan");
    cat.return_book(2).expect("return");
    cat.delete_loan(1).expect("delete");
    sink.append_ops(&cat.drain_pending_ops()).expect("append");

    let kinds = |ops: Vec<libcat::op::StoredOp>| ops.iter().map(|o| o.op.kind_code()).collect::<Vec<_>>();
    assert_eq!(kinds(sink.book_history(2).expect("book history")), vec![1, 2, 3]);
    assert_eq!(kinds(sink.book_history(1).expect("book history")), vec![1]);
    assert_eq!(kinds(sink.loan_history(1).expect("loan history")), vec![2, 3, 4]);
    assert!(sink.loan_history(7).expect("loan history").is_empty());
}

#[test]
fn rejected_batch_leaves_no_rows_and_can_be_retried() {
    let mut cat = Catalog::with_config(config());
    let mut sink = SqliteOpSink::open_in_memory().expect("open sqlite");

    cat.register_book(BookDraft::new("Dune", 1965, 412)).expect("register");
    let first = cat.drain_pending_ops();
    sink.append_ops(&first).expect("append");

    cat.create_loan(LoanDraft::new(1, patron())).expect("loan");
    let second = cat.drain_pending_ops();

    // seq 1 is already stored, so the whole batch must roll back
    let clashing: Vec<_> = second.iter().chain(first.iter()).cloned().collect();
    assert!(sink.append_ops(&clashing).is_err());
    assert_eq!(sink.latest_seq().expect("latest"), 1);

    assert_eq!(sink.append_ops(&second).expect("retry"), 2);
    let replayed = sink.load_catalog(config()).expect("replay");
    assert_eq!(replayed.export_snapshot(), cat.export_snapshot());
}
