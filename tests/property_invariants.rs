use hashbrown::HashMap;
use proptest::prelude::*;

use libcat::{
    book::BookDraft,
    core::catalog::{Catalog, CatalogConfig},
    error::CatalogError,
    loan::{LoanDraft, PatronDraft},
    types::{BookId, BookStatus},
};

#[derive(Debug, Clone)]
enum Action {
    Register { title_idx: u8 },
    Loan { target: u8 },
    Return { target: u8 },
    Delete { target: u8 },
}

fn action_strategy() -> impl Strategy<Value = Action> {
    prop_oneof![
        (0u8..16).prop_map(|title_idx| Action::Register { title_idx }),
        (0u8..24).prop_map(|target| Action::Loan { target }),
        (0u8..24).prop_map(|target| Action::Return { target }),
        (0u8..24).prop_map(|target| Action::Delete { target }),
    ]
}

fn catalog() -> Catalog {
    Catalog::with_config(CatalogConfig {
        current_year: Some(2026),
    })
}

fn loaned_iff_active_loan(cat: &Catalog) -> Result<(), TestCaseError> {
    let mut active: HashMap<BookId, usize> = HashMap::new();
    for loan in cat.list_loans().iter().filter(|l| l.is_active()) {
        *active.entry(loan.book_id).or_default() += 1;
    }
    for count in active.values() {
        prop_assert_eq!(*count, 1);
    }

    let snapshot = cat.export_snapshot();
    for book in &snapshot.books {
        let has_loan = active.contains_key(&book.id);
        prop_assert_eq!(book.status == BookStatus::Loaned, has_loan, "book {}", book.id);
    }
    Ok(())
}

proptest! {
    #[test]
    fn random_sequences_keep_status_and_ledger_in_step(actions in prop::collection::vec(action_strategy(), 1..200)) {
        let mut cat = catalog();
        let mut last_book_id = 0;
        let mut last_loan_id = 0;

        for action in actions {
            let before = cat.export_snapshot();
            let result: Result<(), CatalogError> = match action {
                Action::Register { title_idx } => {
                    cat.register_book(BookDraft::new(format!("Title {title_idx}"), 1900, 100))
                        .map(|(book, _)| {
                            assert!(book.id > last_book_id);
                            last_book_id = book.id;
                        })
                }
                Action::Loan { target } => {
                    let draft = LoanDraft::new(u64::from(target), PatronDraft::new("Ana", "ana@x.com"));
                    cat.create_loan(draft).map(|(loan, _)| {
                        assert!(loan.id > last_loan_id);
                        last_loan_id = loan.id;
                    })
                }
                Action::Return { target } => cat.return_book(u64::from(target)).map(|_| ()),
                Action::Delete { target } => cat.delete_loan(u64::from(target)).map(|_| ()),
            };

            if result.is_err() {
                prop_assert_eq!(cat.export_snapshot(), before);
            }
            loaned_iff_active_loan(&cat)?;
        }

        let ops = cat.drain_pending_ops();
        let mut replayed = catalog();
        for op in ops {
            replayed.apply_replayed_op(op).expect("replay");
        }
        prop_assert_eq!(replayed.export_snapshot(), cat.export_snapshot());
    }
}
