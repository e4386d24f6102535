//! In-memory digital library catalog: books, availability, and loan records.
//!
//! # Examples
//!
//! Direct usage with [`core::catalog::Catalog`]:
//! ```
//! use libcat::{
//!     book::BookDraft,
//!     core::catalog::{Catalog, CatalogConfig},
//!     loan::{LoanDraft, PatronDraft},
//!     types::BookStatus,
//! };
//!
//! let mut catalog = Catalog::with_config(CatalogConfig { current_year: Some(2026) });
//! let (book, _op) = catalog
//!     .register_book(BookDraft::new("Dune", 1965, 412))
//!     .expect("register");
//! assert_eq!(book.id, 1);
//!
//! let (loan, _op) = catalog
//!     .create_loan(LoanDraft::new(book.id, PatronDraft::new("Ana", "ana@x.com")))
//!     .expect("loan");
//! assert_eq!(loan.id, 1);
//! assert_eq!(catalog.get_book(1).map(|b| b.status), Some(BookStatus::Loaned));
//! ```
//!
//! Runtime usage with a SQLite journal:
//! ```no_run
//! use libcat::{
//!     book::BookDraft,
//!     core::catalog::CatalogConfig,
//!     persist::sqlite::SqliteOpSink,
//!     runtime::handle::{spawn_catalog, RuntimeConfig},
//! };
//!
//! # #[tokio::main]
//! # async fn main() {
//! let sink = SqliteOpSink::open("catalog.db").expect("open sqlite");
//! let catalog = sink.load_catalog(CatalogConfig::default()).expect("replay");
//! let handle = spawn_catalog(catalog, Some(Box::new(sink)), RuntimeConfig::default());
//! let book = handle
//!     .register_book(BookDraft::new("Dune", 1965, 412))
//!     .await
//!     .expect("register");
//! println!("registered {}", book.id);
//! handle.shutdown().await.expect("shutdown");
//! # }
//! ```
#![warn(missing_docs)]

/// JSON request/response binding.
pub mod api;
/// Book record and registration input.
pub mod book;
/// Identifier generation, repositories, and the catalog service.
pub mod core;
/// Catalog error taxonomy.
pub mod error;
/// Loan record and patron snapshot.
pub mod loan;
/// Journal op model and persistence wrapper types.
pub mod op;
/// Persistence abstraction and SQLite implementation.
pub mod persist;
/// Single-writer runtime handle and events.
pub mod runtime;
/// Shared primitive types and enums.
pub mod types;
