use crate::{
    book::{Book, BookDraft, YearBound},
    error::CatalogResult,
    loan::{Loan, Patron},
    types::{BookId, BookStatus, LoanId},
};

/// Storage for books.
///
/// Implementations assign ids, keep registration order, and own their state.
pub trait BookRepository: Send {
    /// Validates `draft`, assigns a fresh id, and stores an available book.
    fn register(&mut self, draft: BookDraft, bound: YearBound) -> CatalogResult<Book>;

    /// Stores an already materialized book, keeping its id.
    fn restore(&mut self, book: Book) -> CatalogResult<()>;

    /// Available books in registration order.
    fn list_available(&self) -> Vec<Book>;

    /// Book by id, whatever its status.
    fn find_by_id(&self, id: BookId) -> Option<&Book>;

    /// Case-insensitive substring search in registration order.
    /// An empty query matches every book.
    fn search_by_title(&self, query: &str) -> Vec<Book>;

    /// Overwrites the status and returns the previous one.
    fn set_status(&mut self, id: BookId, status: BookStatus) -> CatalogResult<BookStatus>;

    /// Every book in registration order.
    fn all(&self) -> Vec<Book>;

    /// Id the next registration will receive.
    fn next_id(&self) -> BookId;
}

/// Storage for loan records.
pub trait LoanRepository: Send {
    /// Records a new active loan. At most one active loan may exist per book.
    fn create(&mut self, book_id: BookId, patron: Patron, loaned_at_ms: u64) -> CatalogResult<Loan>;

    /// Stores an already materialized loan, keeping its id.
    fn restore(&mut self, loan: Loan) -> CatalogResult<()>;

    /// The unreturned loan for `book_id`, if any.
    fn find_active_by_book_id(&self, book_id: BookId) -> Option<&Loan>;

    /// Loan by id, active or returned.
    fn find_by_id(&self, id: LoanId) -> Option<&Loan>;

    /// Marks an active loan as returned.
    fn close(&mut self, id: LoanId, returned_at_ms: u64) -> CatalogResult<Loan>;

    /// Deletes the record entirely.
    fn remove(&mut self, id: LoanId) -> CatalogResult<Loan>;

    /// Every loan in creation order.
    fn all(&self) -> Vec<Loan>;

    /// Id the next loan will receive.
    fn next_id(&self) -> LoanId;
}
