//! Catalog error taxonomy.

use thiserror::Error;

use crate::types::{BookId, IdKind, LoanId};

/// Business-rule violations reported as conflicts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Conflict {
    /// The book already has an active loan.
    #[error("book {0} already loaned")]
    AlreadyLoaned(BookId),
    /// There is no active loan to close for this book.
    #[error("no active loan record for book {0}")]
    NoActiveLoan(BookId),
    /// The loan has not been returned yet and cannot be deleted.
    #[error("loan {0} still active")]
    LoanStillActive(LoanId),
    /// A restored record reuses an id that is already stored.
    #[error("{kind} {id} already exists")]
    DuplicateId {
        /// Entity family.
        kind: IdKind,
        /// Clashing id.
        id: u64,
    },
}

/// Every failure a catalog operation can report.
///
/// All variants are terminal for the request. They are raised before any
/// state mutation on the failing path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    /// Malformed or out-of-range input.
    #[error("invalid {field}: {message}")]
    Validation {
        /// Path of the offending field, e.g. `title` or `patron.email`.
        field: String,
        /// Human-readable reason.
        message: String,
    },
    /// Referenced entity does not exist.
    #[error("{kind} {id} not found")]
    NotFound {
        /// Entity family.
        kind: IdKind,
        /// Requested id.
        id: u64,
    },
    /// Operation violates a catalog invariant.
    #[error(transparent)]
    Conflict(#[from] Conflict),
}

impl CatalogError {
    /// Builds a validation error for `field`.
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Builds a not-found error for a book.
    pub fn book_not_found(id: BookId) -> Self {
        Self::NotFound {
            kind: IdKind::Book,
            id,
        }
    }

    /// Builds a not-found error for a loan.
    pub fn loan_not_found(id: LoanId) -> Self {
        Self::NotFound {
            kind: IdKind::Loan,
            id,
        }
    }

    /// HTTP-style status code for request/response bindings.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation { .. } => 400,
            Self::NotFound { .. } => 404,
            Self::Conflict(_) => 409,
        }
    }

    /// Short machine-readable class name.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation",
            Self::NotFound { .. } => "not_found",
            Self::Conflict(_) => "conflict",
        }
    }
}

impl From<garde::Report> for CatalogError {
    fn from(report: garde::Report) -> Self {
        match report.iter().next() {
            Some((path, err)) => Self::validation(path.to_string(), err.message().to_string()),
            None => Self::validation("input", "validation failed"),
        }
    }
}

/// Result alias for catalog operations.
pub type CatalogResult<T> = Result<T, CatalogError>;
