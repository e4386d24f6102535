//! Framework-agnostic JSON request/response binding.
//!
//! A transport hands [`dispatch`] the raw request body and writes the returned
//! [`Reply`] back with its status code.
//!
//! | op               | success | failure  |
//! |------------------|---------|----------|
//! | register_book    | 201     | 400      |
//! | list_available   | 200     |          |
//! | search_by_title  | 200     |          |
//! | create_loan      | 201     | 404, 409 |
//! | return_book      | 200     | 409      |
//! | delete_loan      | 204     | 404      |

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::{
    book::BookDraft,
    error::CatalogError,
    loan::LoanDraft,
    runtime::handle::{CatalogHandle, RuntimeError},
    types::{BookId, LoanId},
};

/// Message returned by a successful return.
pub const RETURN_ACK: &str = "book returned";

/// One catalog request, tagged by `op`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    /// Register a new book.
    RegisterBook(BookDraft),
    /// List books that can be loaned.
    ListAvailable,
    /// Search titles.
    SearchByTitle {
        /// Substring to look for.
        #[serde(default)]
        query: String,
    },
    /// Loan a book to a patron.
    CreateLoan(LoanDraft),
    /// Return a loaned book.
    ReturnBook {
        /// Book being returned.
        book_id: BookId,
    },
    /// Delete a loan record.
    DeleteLoan {
        /// Loan to delete.
        loan_id: LoanId,
    },
}

/// Status code plus JSON body.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    /// HTTP-style status code.
    pub status: u16,
    /// Response body; `null` for 204.
    pub body: Value,
}

impl Reply {
    fn ok<T: Serialize>(status: u16, body: &T) -> Self {
        match serde_json::to_value(body) {
            Ok(body) => Self { status, body },
            Err(err) => Self::internal(&err.to_string()),
        }
    }

    fn no_content() -> Self {
        Self {
            status: 204,
            body: Value::Null,
        }
    }

    fn internal(detail: &str) -> Self {
        Self {
            status: 500,
            body: json!({ "kind": "internal", "detail": detail }),
        }
    }

    fn malformed(detail: &str) -> Self {
        Self {
            status: 400,
            body: json!({ "kind": "validation", "field": Value::Null, "detail": detail }),
        }
    }

    fn from_error(err: &RuntimeError) -> Self {
        match err.as_catalog() {
            Some(err) => Self::from_catalog_error(err),
            None => Self::internal(&err.to_string()),
        }
    }

    fn from_catalog_error(err: &CatalogError) -> Self {
        let field = match err {
            CatalogError::Validation { field, .. } => Value::String(field.clone()),
            _ => Value::Null,
        };
        Self {
            status: err.status_code(),
            body: json!({ "kind": err.kind(), "field": field, "detail": err.to_string() }),
        }
    }
}

/// Parses `raw` as a [`Request`] and executes it.
///
/// Malformed JSON, missing fields and wrong types are answered with the same
/// 400 validation class as out-of-range values.
pub async fn dispatch(handle: &CatalogHandle, raw: &str) -> Reply {
    match serde_json::from_str::<Request>(raw) {
        Ok(request) => execute(handle, request).await,
        Err(err) => Reply::malformed(&err.to_string()),
    }
}

/// Executes an already parsed request.
pub async fn execute(handle: &CatalogHandle, request: Request) -> Reply {
    let result = match request {
        Request::RegisterBook(draft) => handle
            .register_book(draft)
            .await
            .map(|book| Reply::ok(201, &book)),
        Request::ListAvailable => handle
            .list_available()
            .await
            .map(|books| Reply::ok(200, &books)),
        Request::SearchByTitle { query } => handle
            .search_by_title(query)
            .await
            .map(|books| Reply::ok(200, &books)),
        Request::CreateLoan(draft) => handle
            .create_loan(draft)
            .await
            .map(|loan| Reply::ok(201, &loan)),
        Request::ReturnBook { book_id } => handle
            .return_book(book_id)
            .await
            .map(|_| Reply::ok(200, &json!({ "message": RETURN_ACK }))),
        Request::DeleteLoan { loan_id } => handle
            .delete_loan(loan_id)
            .await
            .map(|()| Reply::no_content()),
    };
    result.unwrap_or_else(|err| Reply::from_error(&err))
}
