//! In-memory catalog state: id generation, repositories, and the service.

/// Catalog service orchestrating books and loans.
pub mod catalog;
/// Process-local identifier generator.
pub mod ids;
/// In-memory loan ledger.
pub mod ledger;
/// In-memory book registry.
pub mod registry;
/// Repository interfaces the catalog is built over.
pub mod traits;
