use std::sync::Arc;

use hashbrown::HashMap;

use crate::{
    error::{CatalogError, CatalogResult, Conflict},
    loan::{Loan, Patron},
    types::{BookId, IdKind, LoanId},
};

use super::{ids::IdGenerator, traits::LoanRepository};

/// In-memory [`LoanRepository`].
///
/// `active_by_book` holds exactly the loans whose `returned_at_ms` is `None`,
/// so a second active loan for the same book is refused here as well as in
/// the catalog.
#[derive(Debug)]
pub struct LoanLedger {
    records: HashMap<LoanId, Loan>,
    order: Vec<LoanId>,
    active_by_book: HashMap<BookId, LoanId>,
    ids: Arc<IdGenerator>,
}

impl Default for LoanLedger {
    fn default() -> Self {
        Self::new(Arc::new(IdGenerator::new()))
    }
}

impl LoanLedger {
    /// Empty store drawing ids from `ids`.
    pub fn new(ids: Arc<IdGenerator>) -> Self {
        Self {
            records: HashMap::new(),
            order: Vec::new(),
            active_by_book: HashMap::new(),
            ids,
        }
    }

    /// Number of stored loans.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    #[allow(missing_docs)]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Number of loans not yet returned.
    pub fn active_len(&self) -> usize {
        self.active_by_book.len()
    }

    fn remove_from_order(&mut self, id: LoanId) {
        if let Some(pos) = self.order.iter().position(|x| *x == id) {
            self.order.remove(pos);
        }
    }
}

impl LoanRepository for LoanLedger {
    fn create(&mut self, book_id: BookId, patron: Patron, loaned_at_ms: u64) -> CatalogResult<Loan> {
        if self.active_by_book.contains_key(&book_id) {
            return Err(Conflict::AlreadyLoaned(book_id).into());
        }

        let id = self.ids.next(IdKind::Loan);
        let loan = Loan {
            id,
            book_id,
            patron,
            loaned_at_ms,
            returned_at_ms: None,
        };
        self.active_by_book.insert(book_id, id);
        self.order.push(id);
        self.records.insert(id, loan.clone());
        Ok(loan)
    }

    fn restore(&mut self, loan: Loan) -> CatalogResult<()> {
        if self.records.contains_key(&loan.id) {
            return Err(Conflict::DuplicateId {
                kind: IdKind::Loan,
                id: loan.id,
            }
            .into());
        }
        if loan.is_active() {
            if self.active_by_book.contains_key(&loan.book_id) {
                return Err(Conflict::AlreadyLoaned(loan.book_id).into());
            }
            self.active_by_book.insert(loan.book_id, loan.id);
        }
        self.ids.observe(IdKind::Loan, loan.id);
        self.order.push(loan.id);
        self.records.insert(loan.id, loan);
        Ok(())
    }

    fn find_active_by_book_id(&self, book_id: BookId) -> Option<&Loan> {
        self.active_by_book
            .get(&book_id)
            .and_then(|id| self.records.get(id))
    }

    fn find_by_id(&self, id: LoanId) -> Option<&Loan> {
        self.records.get(&id)
    }

    fn close(&mut self, id: LoanId, returned_at_ms: u64) -> CatalogResult<Loan> {
        let loan = self
            .records
            .get_mut(&id)
            .ok_or(CatalogError::loan_not_found(id))?;
        if !loan.is_active() {
            return Err(Conflict::NoActiveLoan(loan.book_id).into());
        }
        loan.returned_at_ms = Some(returned_at_ms);
        let closed = loan.clone();
        self.active_by_book.remove(&closed.book_id);
        Ok(closed)
    }

    fn remove(&mut self, id: LoanId) -> CatalogResult<Loan> {
        let loan = self
            .records
            .remove(&id)
            .ok_or(CatalogError::loan_not_found(id))?;
        if self.active_by_book.get(&loan.book_id) == Some(&id) {
            self.active_by_book.remove(&loan.book_id);
        }
        self.remove_from_order(id);
        Ok(loan)
    }

    fn all(&self) -> Vec<Loan> {
        self.order
            .iter()
            .filter_map(|id| self.records.get(id))
            .cloned()
            .collect()
    }

    fn next_id(&self) -> LoanId {
        self.ids.peek(IdKind::Loan)
    }
}
