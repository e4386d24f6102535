use std::sync::Arc;

use hashbrown::HashMap;

use crate::{
    book::{Book, BookDraft, YearBound},
    error::{CatalogError, CatalogResult, Conflict},
    types::{BookId, BookStatus, IdKind},
};

use super::{ids::IdGenerator, traits::BookRepository};

/// In-memory [`BookRepository`] keyed by id with registration order.
#[derive(Debug)]
pub struct BookRegistry {
    records: HashMap<BookId, Book>,
    order: Vec<BookId>,
    ids: Arc<IdGenerator>,
}

impl Default for BookRegistry {
    fn default() -> Self {
        Self::new(Arc::new(IdGenerator::new()))
    }
}

impl BookRegistry {
    /// Empty store drawing ids from `ids`.
    pub fn new(ids: Arc<IdGenerator>) -> Self {
        Self {
            records: HashMap::new(),
            order: Vec::new(),
            ids,
        }
    }

    /// Number of stored books.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    #[allow(missing_docs)]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    fn ordered(&self) -> impl Iterator<Item = &Book> {
        self.order.iter().filter_map(|id| self.records.get(id))
    }
}

impl BookRepository for BookRegistry {
    fn register(&mut self, draft: BookDraft, bound: YearBound) -> CatalogResult<Book> {
        let valid = draft.into_valid(bound)?;
        let id = self.ids.next(IdKind::Book);
        let book = Book::from_valid(id, valid);
        self.order.push(id);
        self.records.insert(id, book.clone());
        Ok(book)
    }

    fn restore(&mut self, book: Book) -> CatalogResult<()> {
        if self.records.contains_key(&book.id) {
            return Err(Conflict::DuplicateId {
                kind: IdKind::Book,
                id: book.id,
            }
            .into());
        }
        self.ids.observe(IdKind::Book, book.id);
        self.order.push(book.id);
        self.records.insert(book.id, book);
        Ok(())
    }

    fn list_available(&self) -> Vec<Book> {
        self.ordered().filter(|b| b.is_available()).cloned().collect()
    }

    fn find_by_id(&self, id: BookId) -> Option<&Book> {
        self.records.get(&id)
    }

    fn search_by_title(&self, query: &str) -> Vec<Book> {
        let needle = query.to_lowercase();
        self.ordered()
            .filter(|b| b.title_contains(&needle))
            .cloned()
            .collect()
    }

    fn set_status(&mut self, id: BookId, status: BookStatus) -> CatalogResult<BookStatus> {
        let book = self
            .records
            .get_mut(&id)
            .ok_or(CatalogError::book_not_found(id))?;
        Ok(std::mem::replace(&mut book.status, status))
    }

    fn all(&self) -> Vec<Book> {
        self.ordered().cloned().collect()
    }

    fn next_id(&self) -> BookId {
        self.ids.peek(IdKind::Book)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BOUND: YearBound = YearBound { current_year: 2026 };

    fn seeded() -> BookRegistry {
        let mut reg = BookRegistry::default();
        for (title, year) in [("La Biblia", 1500), ("Dune", 1965), ("Bible Stories", 1990)] {
            reg.register(BookDraft::new(title, year, 100), BOUND).unwrap();
        }
        reg
    }

    #[test]
    fn register_assigns_increasing_ids_and_available_status() {
        let reg = seeded();
        let ids: Vec<_> = reg.all().iter().map(|b| b.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert!(reg.all().iter().all(Book::is_available));
    }

    #[test]
    fn rejected_registration_consumes_no_id() {
        let mut reg = BookRegistry::default();
        assert!(reg.register(BookDraft::new("x", 1965, 100), BOUND).is_err());
        let book = reg.register(BookDraft::new("Dune", 1965, 412), BOUND).unwrap();
        assert_eq!(book.id, 1);
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn search_is_case_insensitive_substring_in_order() {
        let reg = seeded();
        let titles: Vec<_> = reg
            .search_by_title("BIBL")
            .into_iter()
            .map(|b| b.title.as_str().to_string())
            .collect();
        assert_eq!(titles, vec!["La Biblia", "Bible Stories"]);
        assert_eq!(reg.search_by_title("").len(), 3);
        assert!(reg.search_by_title("zzz").is_empty());
    }

    #[test]
    fn list_available_skips_loaned_books() {
        let mut reg = seeded();
        assert_eq!(reg.set_status(2, BookStatus::Loaned).unwrap(), BookStatus::Available);
        let ids: Vec<_> = reg.list_available().iter().map(|b| b.id).collect();
        assert_eq!(ids, vec![1, 3]);
    }

    #[test]
    fn set_status_on_unknown_book_fails() {
        let mut reg = seeded();
        assert_eq!(
            reg.set_status(99, BookStatus::Loaned),
            Err(CatalogError::book_not_found(99))
        );
    }
}
