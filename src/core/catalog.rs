use std::sync::Arc;

use chrono::{Datelike, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    book::{Book, BookDraft, YearBound},
    error::{CatalogError, CatalogResult, Conflict},
    loan::{Loan, LoanDraft},
    op::{Op, StoredOp},
    types::{BookId, BookStatus, LoanId, OpSeq},
};

use super::{
    ids::IdGenerator,
    ledger::LoanLedger,
    registry::BookRegistry,
    traits::{BookRepository, LoanRepository},
};

/// Catalog behaviour knobs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Pins the latest accepted publication year. Uses the wall clock when unset.
    pub current_year: Option<i32>,
}

impl CatalogConfig {
    /// Upper bound applied to publication years right now.
    pub fn year_bound(&self) -> YearBound {
        YearBound {
            current_year: self.current_year.unwrap_or_else(|| Utc::now().year()),
        }
    }
}

/// Point-in-time image of the whole catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogSnapshotV1 {
    /// Id the next registered book receives.
    pub next_book_id: BookId,
    /// Id the next opened loan receives.
    pub next_loan_id: LoanId,
    /// Sequence the next journal op receives.
    pub next_op_seq: OpSeq,
    /// Books in registration order.
    pub books: Vec<Book>,
    /// Loans in creation order, returned ones included.
    pub loans: Vec<Loan>,
}

/// Orchestrates the book and loan repositories.
///
/// Each mutating method either applies all of its effects and returns the
/// journal op describing them, or fails without touching state.
#[derive(Debug)]
pub struct Catalog<B = BookRegistry, L = LoanLedger> {
    books: B,
    loans: L,
    config: CatalogConfig,
    pending_ops: Vec<StoredOp>,
    next_op_seq: OpSeq,
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new()
    }
}

impl Catalog {
    /// Empty catalog that checks years against the wall clock.
    pub fn new() -> Self {
        Self::with_config(CatalogConfig::default())
    }

    /// Empty catalog with a shared id generator.
    pub fn with_config(config: CatalogConfig) -> Self {
        let ids = Arc::new(IdGenerator::new());
        Self::from_parts(
            BookRegistry::new(Arc::clone(&ids)),
            LoanLedger::new(ids),
            config,
        )
    }

    /// Rebuilds a catalog from a snapshot, keeping its id counters.
    pub fn from_snapshot(snapshot: CatalogSnapshotV1, config: CatalogConfig) -> CatalogResult<Self> {
        let ids = Arc::new(IdGenerator::starting_at(
            snapshot.next_book_id,
            snapshot.next_loan_id,
        ));
        let mut catalog = Self::from_parts(
            BookRegistry::new(Arc::clone(&ids)),
            LoanLedger::new(ids),
            config,
        );
        catalog.next_op_seq = snapshot.next_op_seq.max(1);

        for book in snapshot.books {
            catalog.books.restore(book)?;
        }
        for loan in snapshot.loans {
            catalog.loans.restore(loan)?;
        }
        Ok(catalog)
    }
}

impl<B: BookRepository, L: LoanRepository> Catalog<B, L> {
    /// Assembles a catalog over caller-provided repositories.
    pub fn from_parts(books: B, loans: L, config: CatalogConfig) -> Self {
        Self {
            books,
            loans,
            config,
            pending_ops: Vec::new(),
            next_op_seq: 1,
        }
    }

    /// Active configuration.
    pub fn config(&self) -> &CatalogConfig {
        &self.config
    }

    /// Validates and stores a new `Available` book.
    pub fn register_book(&mut self, draft: BookDraft) -> CatalogResult<(Book, StoredOp)> {
        let book = self.books.register(draft, self.config.year_bound())?;
        debug!(book.id = book.id, book.title = book.title.as_str(), "book registered");
        let stored = self.record(Op::BookRegistered { book: book.clone() });
        Ok((book, stored))
    }

    /// Books that can be loaned, in registration order.
    pub fn list_available(&self) -> Vec<Book> {
        self.books.list_available()
    }

    /// Case-insensitive substring match on titles. An empty query matches all.
    pub fn search_by_title(&self, query: &str) -> Vec<Book> {
        self.books.search_by_title(query)
    }

    /// Book by id.
    pub fn get_book(&self, id: BookId) -> Option<&Book> {
        self.books.find_by_id(id)
    }

    /// Loan by id, active or returned.
    pub fn get_loan(&self, id: LoanId) -> Option<&Loan> {
        self.loans.find_by_id(id)
    }

    /// Every loan record in creation order.
    pub fn list_loans(&self) -> Vec<Loan> {
        self.loans.all()
    }

    /// Loans a book. The book flips to loaned and the loan record is created
    /// together, or neither happens.
    pub fn create_loan(&mut self, draft: LoanDraft) -> CatalogResult<(Loan, StoredOp)> {
        let (book_id, patron) = draft.into_valid()?;

        let book = self
            .books
            .find_by_id(book_id)
            .ok_or(CatalogError::book_not_found(book_id))?;
        if book.status == BookStatus::Loaned {
            return Err(Conflict::AlreadyLoaned(book_id).into());
        }

        let loan = self.loans.create(book_id, patron, now_ms())?;
        if let Err(err) = self.books.set_status(book_id, BookStatus::Loaned) {
            self.loans.remove(loan.id)?;
            return Err(err);
        }

        debug!(loan.id = loan.id, book.id = book_id, "loan opened");
        let stored = self.record(Op::LoanOpened { loan: loan.clone() });
        Ok((loan, stored))
    }

    /// Closes the active loan for `book_id` and makes the book available.
    /// The closed loan record is kept until it is deleted.
    pub fn return_book(&mut self, book_id: BookId) -> CatalogResult<(Loan, StoredOp)> {
        let loan_id = self
            .loans
            .find_active_by_book_id(book_id)
            .map(|l| l.id)
            .ok_or(Conflict::NoActiveLoan(book_id))?;
        if self.books.find_by_id(book_id).is_none() {
            return Err(CatalogError::book_not_found(book_id));
        }

        let returned_at_ms = now_ms();
        let loan = self.loans.close(loan_id, returned_at_ms)?;
        self.books.set_status(book_id, BookStatus::Available)?;

        debug!(loan.id = loan_id, book.id = book_id, "book returned");
        let stored = self.record(Op::BookReturned {
            loan_id,
            book_id,
            returned_at_ms,
        });
        Ok((loan, stored))
    }

    /// Removes a returned loan record. Book status is never changed here.
    ///
    /// An active loan is refused with [`Conflict::LoanStillActive`] instead of
    /// being dropped: removing it would leave its book `Loaned` with no loan
    /// to return, breaking the rule that a book is loaned exactly when an
    /// active loan exists for it. Return the book first, then delete.
    pub fn delete_loan(&mut self, loan_id: LoanId) -> CatalogResult<(Loan, StoredOp)> {
        let loan = self
            .loans
            .find_by_id(loan_id)
            .ok_or(CatalogError::loan_not_found(loan_id))?;
        if loan.is_active() {
            return Err(Conflict::LoanStillActive(loan_id).into());
        }

        let loan = self.loans.remove(loan_id)?;
        debug!(loan.id = loan_id, "loan deleted");
        let stored = self.record(Op::LoanDeleted { loan_id });
        Ok((loan, stored))
    }

    /// Re-applies a journaled op without emitting a new one.
    pub fn apply_replayed_op(&mut self, stored: StoredOp) -> CatalogResult<()> {
        match stored.op {
            Op::BookRegistered { book } => {
                self.books.restore(book)?;
            }
            Op::LoanOpened { loan } => {
                let book_id = loan.book_id;
                if self.books.find_by_id(book_id).is_none() {
                    return Err(CatalogError::book_not_found(book_id));
                }
                self.loans.restore(loan)?;
                self.books.set_status(book_id, BookStatus::Loaned)?;
            }
            Op::BookReturned {
                loan_id,
                book_id,
                returned_at_ms,
            } => {
                self.loans.close(loan_id, returned_at_ms)?;
                self.books.set_status(book_id, BookStatus::Available)?;
            }
            Op::LoanDeleted { loan_id } => {
                self.loans.remove(loan_id)?;
            }
        }
        self.next_op_seq = self.next_op_seq.max(stored.seq.saturating_add(1));
        Ok(())
    }

    /// Captures every record plus the id and sequence counters.
    pub fn export_snapshot(&self) -> CatalogSnapshotV1 {
        CatalogSnapshotV1 {
            next_book_id: self.books.next_id(),
            next_loan_id: self.loans.next_id(),
            next_op_seq: self.next_op_seq,
            books: self.books.all(),
            loans: self.loans.all(),
        }
    }

    /// Takes the ops recorded since the last drain, oldest first.
    pub fn drain_pending_ops(&mut self) -> Vec<StoredOp> {
        std::mem::take(&mut self.pending_ops)
    }

    /// Sequence of the most recent op, or 0 before the first.
    pub fn latest_op_seq(&self) -> OpSeq {
        self.next_op_seq.saturating_sub(1)
    }

    fn record(&mut self, op: Op) -> StoredOp {
        let seq = self.next_op_seq;
        self.next_op_seq += 1;
        let stored = StoredOp {
            seq,
            ts_ms: now_ms(),
            op,
        };
        self.pending_ops.push(stored.clone());
        stored
    }
}

fn now_ms() -> u64 {
    u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loan::PatronDraft;

    fn catalog() -> Catalog {
        Catalog::with_config(CatalogConfig {
            current_year: Some(2026),
        })
    }

    fn ana(book_id: BookId) -> LoanDraft {
        LoanDraft::new(book_id, PatronDraft::new("Ana", "ana@x.com"))
    }

    #[test]
    fn validation_failure_leaves_no_trace() {
        let mut cat = catalog();
        cat.register_book(BookDraft::new("Dune", 1965, 412)).unwrap();
        let bad = LoanDraft::new(1, PatronDraft::new("Ana", "nope"));
        assert!(matches!(
            cat.create_loan(bad),
            Err(CatalogError::Validation { .. })
        ));
        assert!(cat.list_loans().is_empty());
        assert_eq!(cat.list_available().len(), 1);
        assert_eq!(cat.drain_pending_ops().len(), 1);
    }

    #[test]
    fn returned_book_can_be_loaned_again() {
        let mut cat = catalog();
        cat.register_book(BookDraft::new("Dune", 1965, 412)).unwrap();
        cat.create_loan(ana(1)).unwrap();
        cat.return_book(1).unwrap();
        let (second, _) = cat.create_loan(ana(1)).unwrap();
        assert_eq!(second.id, 2);
        assert_eq!(cat.get_book(1).map(|b| b.status), Some(BookStatus::Loaned));
    }

    #[test]
    fn active_loan_cannot_be_deleted() {
        let mut cat = catalog();
        cat.register_book(BookDraft::new("Dune", 1965, 412)).unwrap();
        let (loan, _) = cat.create_loan(ana(1)).unwrap();
        assert_eq!(
            cat.delete_loan(loan.id),
            Err(CatalogError::Conflict(Conflict::LoanStillActive(loan.id)))
        );
        assert!(cat.get_loan(loan.id).is_some());
        assert_eq!(cat.get_book(1).map(|b| b.status), Some(BookStatus::Loaned));
    }

    #[test]
    fn ops_are_sequenced_and_replay_rebuilds_state() {
        let mut cat = catalog();
        cat.register_book(BookDraft::new("Dune", 1965, 412)).unwrap();
        cat.register_book(BookDraft::new("Emma", 1815, 300)).unwrap();
        cat.create_loan(ana(2)).unwrap();
        cat.create_loan(ana(1)).unwrap();
        cat.return_book(2).unwrap();
        cat.delete_loan(1).unwrap();

        let ops = cat.drain_pending_ops();
        let seqs: Vec<_> = ops.iter().map(|o| o.seq).collect();
        assert_eq!(seqs, vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(cat.latest_op_seq(), 6);

        let mut replayed = catalog();
        for op in ops {
            replayed.apply_replayed_op(op).unwrap();
        }
        assert_eq!(replayed.export_snapshot(), cat.export_snapshot());
        assert!(replayed.drain_pending_ops().is_empty());
    }

    #[test]
    fn snapshot_restores_counters() {
        let mut cat = catalog();
        cat.register_book(BookDraft::new("Dune", 1965, 412)).unwrap();
        let (loan, _) = cat.create_loan(ana(1)).unwrap();
        cat.return_book(1).unwrap();
        cat.delete_loan(loan.id).unwrap();

        let mut restored =
            Catalog::from_snapshot(cat.export_snapshot(), cat.config().clone()).unwrap();
        let (book, _) = restored
            .register_book(BookDraft::new("Emma", 1815, 300))
            .unwrap();
        let (loan, stored) = restored.create_loan(ana(book.id)).unwrap();
        assert_eq!(book.id, 2);
        assert_eq!(loan.id, 2);
        assert_eq!(stored.seq, 6);
    }
}
