//! Runtime event stream payloads.

use crate::types::{BookId, LoanId, OpSeq};

/// Events emitted from the single-writer runtime loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogEvent {
    /// A book was registered.
    BookRegistered {
        /// New book id.
        id: BookId,
    },
    /// A book was loaned out.
    BookLoaned {
        /// Loaned book.
        book_id: BookId,
        /// Opened loan.
        loan_id: LoanId,
    },
    /// A book came back and its loan was closed.
    BookReturned {
        /// Returned book.
        book_id: BookId,
        /// Closed loan.
        loan_id: LoanId,
    },
    /// A loan record was deleted.
    LoanDeleted {
        /// Deleted loan.
        loan_id: LoanId,
    },
    /// Persistence has reached at least this op sequence.
    DurableUpTo {
        /// Highest sequence known durable.
        op_seq: OpSeq,
    },
}
