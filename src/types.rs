//! Shared primitive IDs and catalog-wide enums.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Monotonic book identifier, starting at 1.
pub type BookId = u64;
/// Monotonic loan identifier, starting at 1.
pub type LoanId = u64;
/// Monotonic journal operation sequence number.
pub type OpSeq = u64;

/// Availability of a book.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookStatus {
    /// On the shelf and loanable.
    #[default]
    Available,
    /// Held by a patron through an active loan.
    Loaned,
}

/// Entity families that draw from independent id counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IdKind {
    /// Book ids.
    Book,
    /// Loan ids.
    Loan,
}

impl fmt::Display for IdKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Book => f.write_str("book"),
            Self::Loan => f.write_str("loan"),
        }
    }
}
