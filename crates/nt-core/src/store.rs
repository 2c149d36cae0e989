//! Storage seam for diary entries.

use std::collections::BTreeSet;

use chrono::NaiveDate;
use thiserror::Error;

use crate::diary::{DatedProduct, DiaryEntry, StoredEntry};

/// Errors surfaced by a diary store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Another writer changed the entry for this date first.
    #[error("concurrent write detected for {date}")]
    Conflict { date: NaiveDate },
    /// Failure inside the storage backend.
    #[error("storage backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl StoreError {
    pub fn backend(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Backend(Box::new(err))
    }
}

/// Document store holding at most one entry per date.
pub trait DiaryStore {
    /// Looks up the entry for `date`.
    fn find_by_date(&self, date: NaiveDate) -> Result<Option<StoredEntry>, StoreError>;

    /// Inserts a new entry. Fails with [`StoreError::Conflict`] if the date
    /// already has one.
    fn insert(&mut self, entry: &DiaryEntry) -> Result<StoredEntry, StoreError>;

    /// Writes back a previously loaded entry.
    ///
    /// The write only succeeds if the stored revision still equals
    /// `stored.revision`; the returned record carries the new revision.
    fn update(&mut self, stored: &StoredEntry) -> Result<StoredEntry, StoreError>;

    /// Lists products matching `filter`, ordered by date.
    fn find_products_with_filters(
        &self,
        filter: &ProductFilter,
    ) -> Result<Vec<DatedProduct>, StoreError>;
}

/// Keyword filter over product names.
///
/// Keywords are trimmed and lower-cased; blank keywords are dropped. A name
/// matches when it contains at least one inclusion keyword and none of the
/// exclusion keywords, ignoring case.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProductFilter {
    include: BTreeSet<String>,
    exclude: BTreeSet<String>,
    since: Option<NaiveDate>,
}

impl ProductFilter {
    pub fn new<I, E, S, T>(include: I, exclude: E, since: Option<NaiveDate>) -> Self
    where
        I: IntoIterator<Item = S>,
        E: IntoIterator<Item = T>,
        S: AsRef<str>,
        T: AsRef<str>,
    {
        Self {
            include: normalize_keywords(include),
            exclude: normalize_keywords(exclude),
            since,
        }
    }

    pub const fn include(&self) -> &BTreeSet<String> {
        &self.include
    }

    pub const fn exclude(&self) -> &BTreeSet<String> {
        &self.exclude
    }

    /// Entries strictly before this date are excluded.
    pub const fn since(&self) -> Option<NaiveDate> {
        self.since
    }

    pub fn matches_name(&self, name: &str) -> bool {
        let name = name.to_lowercase();
        self.include.iter().any(|keyword| name.contains(keyword.as_str()))
            && !self.exclude.iter().any(|keyword| name.contains(keyword.as_str()))
    }

    pub fn matches_date(&self, date: NaiveDate) -> bool {
        self.since.is_none_or(|since| date >= since)
    }
}

fn normalize_keywords<I, S>(keywords: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    keywords
        .into_iter()
        .map(|keyword| keyword.as_ref().trim().to_lowercase())
        .filter(|keyword| !keyword.is_empty())
        .collect()
}

#[cfg(test)]
pub(crate) mod memory {
    //! In-memory store used by unit tests.

    use std::collections::BTreeMap;

    use super::*;

    #[derive(Debug, Default)]
    pub struct MemoryStore {
        pub entries: BTreeMap<NaiveDate, StoredEntry>,
        pub writes: usize,
        next_id: usize,
    }

    impl MemoryStore {
        pub fn with_entries(entries: impl IntoIterator<Item = DiaryEntry>) -> Self {
            let mut store = Self::default();
            for entry in entries {
                store.insert(&entry).unwrap();
            }
            store.writes = 0;
            store
        }
    }

    impl DiaryStore for MemoryStore {
        fn find_by_date(&self, date: NaiveDate) -> Result<Option<StoredEntry>, StoreError> {
            Ok(self.entries.get(&date).cloned())
        }

        fn insert(&mut self, entry: &DiaryEntry) -> Result<StoredEntry, StoreError> {
            if self.entries.contains_key(&entry.date) {
                return Err(StoreError::Conflict { date: entry.date });
            }
            self.next_id += 1;
            let stored = StoredEntry {
                id: format!("entry-{}", self.next_id),
                revision: 1,
                entry: entry.clone(),
            };
            self.entries.insert(entry.date, stored.clone());
            self.writes += 1;
            Ok(stored)
        }

        fn update(&mut self, stored: &StoredEntry) -> Result<StoredEntry, StoreError> {
            let date = stored.entry.date;
            let current = self
                .entries
                .get_mut(&date)
                .filter(|current| current.id == stored.id && current.revision == stored.revision)
                .ok_or(StoreError::Conflict { date })?;
            *current = StoredEntry {
                revision: stored.revision + 1,
                ..stored.clone()
            };
            self.writes += 1;
            Ok(current.clone())
        }

        fn find_products_with_filters(
            &self,
            filter: &ProductFilter,
        ) -> Result<Vec<DatedProduct>, StoreError> {
            Ok(self
                .entries
                .values()
                .filter(|stored| filter.matches_date(stored.entry.date))
                .flat_map(|stored| {
                    stored
                        .entry
                        .products
                        .iter()
                        .filter(|product| filter.matches_name(&product.name))
                        .map(|product| DatedProduct {
                            date: stored.entry.date,
                            product: product.clone(),
                        })
                })
                .collect())
        }
    }
}
