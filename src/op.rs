//! Journal operation model and persistence wrappers.

use serde::{Deserialize, Serialize};

use crate::{
    book::Book,
    loan::Loan,
    types::{BookId, LoanId, OpSeq},
};

/// Version number for serialized [`StoredOpEnvelope`] payloads.
pub const OP_FORMAT_VERSION: u16 = 1;

/// Immutable catalog mutation appended to the journal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Op {
    /// A book was registered.
    BookRegistered {
        /// Registered record.
        book: Book,
    },
    /// A loan was opened; its book became loaned.
    LoanOpened {
        /// Opened loan.
        loan: Loan,
    },
    /// An active loan was closed; its book became available.
    BookReturned {
        /// Closed loan.
        loan_id: LoanId,
        /// Returned book.
        book_id: BookId,
        /// Return time in milliseconds.
        returned_at_ms: u64,
    },
    /// A closed loan record was deleted.
    LoanDeleted {
        /// Deleted loan.
        loan_id: LoanId,
    },
}

impl Op {
    /// Numeric kind stored alongside the payload.
    pub fn kind_code(&self) -> i64 {
        match self {
            Self::BookRegistered { .. } => 1,
            Self::LoanOpened { .. } => 2,
            Self::BookReturned { .. } => 3,
            Self::LoanDeleted { .. } => 4,
        }
    }

    /// Book touched by this op, if any.
    pub fn book_id(&self) -> Option<BookId> {
        match self {
            Self::BookRegistered { book } => Some(book.id),
            Self::LoanOpened { loan } => Some(loan.book_id),
            Self::BookReturned { book_id, .. } => Some(*book_id),
            Self::LoanDeleted { .. } => None,
        }
    }

    /// Loan touched by this op, if any.
    pub fn loan_id(&self) -> Option<LoanId> {
        match self {
            Self::BookRegistered { .. } => None,
            Self::LoanOpened { loan } => Some(loan.id),
            Self::BookReturned { loan_id, .. } | Self::LoanDeleted { loan_id } => Some(*loan_id),
        }
    }
}

/// Journal row metadata plus operation payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredOp {
    /// Monotonic operation sequence.
    pub seq: OpSeq,
    /// Operation timestamp in milliseconds.
    pub ts_ms: u64,
    /// Operation body.
    pub op: Op,
}

/// Versioned wrapper for stable on-disk payload decoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredOpEnvelope {
    /// Payload format version.
    pub format_version: u16,
    /// Wrapped operation.
    pub stored: StoredOp,
}

impl StoredOpEnvelope {
    /// Constructs an envelope using [`OP_FORMAT_VERSION`].
    pub fn new(stored: StoredOp) -> Self {
        Self {
            format_version: OP_FORMAT_VERSION,
            stored,
        }
    }
}
