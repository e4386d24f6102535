//! Loan record, patron snapshot, and loan request types.

use garde::Validate;
use serde::{Deserialize, Serialize};

use crate::{
    error::CatalogResult,
    types::{BookId, LoanId},
};

/// Non-empty patron name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PersonName(String);

impl PersonName {
    /// Name text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Syntactically valid email address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Email(String);

impl Email {
    /// Address text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Borrower captured by value on each loan. Never shared between loans.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Patron {
    /// Patron name.
    pub name: PersonName,
    /// Patron email.
    pub email: Email,
}

/// Caller-supplied patron input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct PatronDraft {
    /// Raw name.
    #[garde(length(chars, min = 1))]
    pub name: String,
    /// Raw email address.
    #[garde(email)]
    pub email: String,
}

impl PatronDraft {
    /// Convenience constructor.
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }
}

/// Loan request: which book and who borrows it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct LoanDraft {
    /// Book to loan.
    #[garde(skip)]
    pub book_id: BookId,
    /// Borrower.
    #[garde(dive)]
    pub patron: PatronDraft,
}

impl LoanDraft {
    /// Convenience constructor.
    pub fn new(book_id: BookId, patron: PatronDraft) -> Self {
        Self { book_id, patron }
    }

    /// Validates the patron and returns the book id with a patron snapshot.
    pub fn into_valid(self) -> CatalogResult<(BookId, Patron)> {
        self.validate()?;
        let patron = Patron {
            name: PersonName(self.patron.name),
            email: Email(self.patron.email),
        };
        Ok((self.book_id, patron))
    }
}

/// Loan record. Active while `returned_at_ms` is `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Loan {
    /// Stable loan identifier.
    pub id: LoanId,
    /// Loaned book.
    pub book_id: BookId,
    /// Borrower snapshot at loan time.
    pub patron: Patron,
    /// Loan creation time in milliseconds since epoch.
    pub loaned_at_ms: u64,
    /// Return time in milliseconds since epoch, once returned.
    pub returned_at_ms: Option<u64>,
}

impl Loan {
    /// True until the book is returned.
    pub fn is_active(&self) -> bool {
        self.returned_at_ms.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CatalogError;

    #[test]
    fn valid_patron_is_snapshotted() {
        let (book_id, patron) = LoanDraft::new(3, PatronDraft::new("Ana", "ana@x.com"))
            .into_valid()
            .unwrap();
        assert_eq!(book_id, 3);
        assert_eq!(patron.name.as_str(), "Ana");
        assert_eq!(patron.email.as_str(), "ana@x.com");
    }

    #[test]
    fn invalid_patron_names_nested_field() {
        let err = LoanDraft::new(1, PatronDraft::new("", "ana@x.com"))
            .into_valid()
            .unwrap_err();
        assert!(matches!(err, CatalogError::Validation { ref field, .. } if field == "patron.name"));

        let err = LoanDraft::new(1, PatronDraft::new("Ana", "not-an-email"))
            .into_valid()
            .unwrap_err();
        assert!(matches!(err, CatalogError::Validation { ref field, .. } if field == "patron.email"));
    }
}
