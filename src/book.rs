//! Book record, registration draft, and validated field types.

use garde::Validate;
use serde::{Deserialize, Serialize};

use crate::{
    error::CatalogResult,
    types::{BookId, BookStatus},
};

/// Years at or before this one are rejected.
pub const EARLIEST_YEAR_EXCLUSIVE: i32 = 1450;

/// Validation context for [`BookDraft`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct YearBound {
    /// Latest accepted publication year.
    pub current_year: i32,
}

/// Book title, 2 to 100 characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Title(String);

impl Title {
    /// Title text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Publication year in `(1450, current year]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PublicationYear(i32);

impl PublicationYear {
    /// Year value.
    pub fn get(self) -> i32 {
        self.0
    }
}

/// Page count, always greater than one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PageCount(u32);

impl PageCount {
    /// Page count value.
    pub fn get(self) -> u32 {
        self.0
    }
}

/// Caller-supplied registration input. Status is never accepted from callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[garde(context(YearBound))]
pub struct BookDraft {
    /// Raw title.
    #[garde(length(chars, min = 2, max = 100))]
    pub title: String,
    /// Raw publication year.
    #[garde(range(min = 1451), custom(not_after_current_year))]
    pub year: i32,
    /// Raw page count.
    #[garde(range(min = 2))]
    pub pages: i64,
}

/// Registration input whose fields have passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidBook {
    /// Validated title.
    pub title: Title,
    /// Validated year.
    pub year: PublicationYear,
    /// Validated page count.
    pub pages: PageCount,
}

impl BookDraft {
    /// Convenience constructor.
    pub fn new(title: impl Into<String>, year: i32, pages: i64) -> Self {
        Self {
            title: title.into(),
            year,
            pages,
        }
    }

    /// Validates every field and converts into typed values.
    pub fn into_valid(self, bound: YearBound) -> CatalogResult<ValidBook> {
        self.validate_with(&bound)?;
        let pages = u32::try_from(self.pages)
            .map_err(|_| crate::error::CatalogError::validation("pages", "page count too large"))?;
        Ok(ValidBook {
            title: Title(self.title),
            year: PublicationYear(self.year),
            pages: PageCount(pages),
        })
    }
}

fn not_after_current_year(value: &i32, bound: &YearBound) -> garde::Result {
    if *value > bound.current_year {
        return Err(garde::Error::new(format!(
            "year {value} is after the current year {}",
            bound.current_year
        )));
    }
    Ok(())
}

/// Authoritative book record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Book {
    /// Stable book identifier.
    pub id: BookId,
    /// Title.
    pub title: Title,
    /// Publication year.
    pub year: PublicationYear,
    /// Number of pages.
    pub pages: PageCount,
    /// Current availability.
    pub status: BookStatus,
}

impl Book {
    /// Builds an available book from validated input.
    pub fn from_valid(id: BookId, valid: ValidBook) -> Self {
        Self {
            id,
            title: valid.title,
            year: valid.year,
            pages: valid.pages,
            status: BookStatus::Available,
        }
    }

    /// True when the book can be loaned.
    pub fn is_available(&self) -> bool {
        self.status == BookStatus::Available
    }

    /// Case-insensitive substring match against the title.
    pub fn title_contains(&self, needle_lower: &str) -> bool {
        self.title.as_str().to_lowercase().contains(needle_lower)
    }
}
