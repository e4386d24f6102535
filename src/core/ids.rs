use std::sync::atomic::{AtomicU64, Ordering};

use crate::types::IdKind;

/// Independent monotonic counters for books and loans.
///
/// Ids start at 1 and are never reused, even after the entity is removed.
#[derive(Debug)]
pub struct IdGenerator {
    books: AtomicU64,
    loans: AtomicU64,
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl IdGenerator {
    /// Both counters start at 1.
    pub fn new() -> Self {
        Self::starting_at(1, 1)
    }

    /// Resumes from counters saved in a snapshot.
    pub fn starting_at(next_book: u64, next_loan: u64) -> Self {
        Self {
            books: AtomicU64::new(next_book.max(1)),
            loans: AtomicU64::new(next_loan.max(1)),
        }
    }

    /// Hands out the next id of `kind`.
    pub fn next(&self, kind: IdKind) -> u64 {
        self.counter(kind).fetch_add(1, Ordering::Relaxed)
    }

    /// The id `next(kind)` would return, without consuming it.
    pub fn peek(&self, kind: IdKind) -> u64 {
        self.counter(kind).load(Ordering::Relaxed)
    }

    /// Ensures `next(kind)` will return something greater than `id`.
    pub fn observe(&self, kind: IdKind, id: u64) {
        self.counter(kind)
            .fetch_max(id.saturating_add(1), Ordering::Relaxed);
    }

    fn counter(&self, kind: IdKind) -> &AtomicU64 {
        match kind {
            IdKind::Book => &self.books,
            IdKind::Loan => &self.loans,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, thread};

    use hashbrown::HashSet;

    use super::*;

    #[test]
    fn counters_are_independent_and_start_at_one() {
        let ids = IdGenerator::new();
        assert_eq!(ids.next(IdKind::Book), 1);
        assert_eq!(ids.next(IdKind::Book), 2);
        assert_eq!(ids.next(IdKind::Loan), 1);
        assert_eq!(ids.peek(IdKind::Book), 3);
    }

    #[test]
    fn observe_never_moves_backwards() {
        let ids = IdGenerator::new();
        ids.observe(IdKind::Loan, 9);
        ids.observe(IdKind::Loan, 4);
        assert_eq!(ids.next(IdKind::Loan), 10);
    }

    #[test]
    fn concurrent_callers_get_unique_ids() {
        let ids = Arc::new(IdGenerator::new());
        let workers: Vec<_> = (0..4)
            .map(|_| {
                let ids = Arc::clone(&ids);
                thread::spawn(move || (0..250).map(|_| ids.next(IdKind::Book)).collect::<Vec<_>>())
            })
            .collect();

        let mut seen = HashSet::new();
        for w in workers {
            for id in w.join().unwrap() {
                assert!(seen.insert(id), "duplicate id {id}");
            }
        }
        assert_eq!(seen.len(), 1000);
    }
}
