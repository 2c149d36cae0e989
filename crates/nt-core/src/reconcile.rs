//! Writing parsed entries to persistence backends.
//!
//! Each backend is a [`DiarySink`]. The document store is wrapped in a
//! [`Reconciler`], which compares before writing so that repeated exports of
//! the same days leave the store untouched. [`SinkSet`] fans an entry out to
//! every enabled sink.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::diary::DiaryEntry;
use crate::store::{DiaryStore, StoreError};

/// Result of writing one entry to one sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UpsertOutcome {
    Inserted,
    Updated,
    Unchanged,
}

impl fmt::Display for UpsertOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Inserted => "inserted",
            Self::Updated => "updated",
            Self::Unchanged => "unchanged",
        };
        write!(f, "{s}")
    }
}

/// A persistence backend for parsed diary entries.
pub trait DiarySink {
    /// Short backend name used in logs.
    fn name(&self) -> &'static str;

    fn upsert(&mut self, entry: &DiaryEntry) -> Result<UpsertOutcome, StoreError>;
}

/// Idempotent upsert into a [`DiaryStore`].
pub struct Reconciler<'a, S: ?Sized> {
    store: &'a mut S,
}

impl<'a, S: DiaryStore + ?Sized> Reconciler<'a, S> {
    pub const fn new(store: &'a mut S) -> Self {
        Self { store }
    }
}

impl<S: DiaryStore + ?Sized> DiarySink for Reconciler<'_, S> {
    fn name(&self) -> &'static str {
        "document"
    }

    fn upsert(&mut self, entry: &DiaryEntry) -> Result<UpsertOutcome, StoreError> {
        match self.store.find_by_date(entry.date)? {
            None => {
                let stored = self.store.insert(entry)?;
                tracing::debug!(date = %entry.date, id = %stored.id, "inserted diary entry");
                Ok(UpsertOutcome::Inserted)
            }
            Some(existing) if existing.entry == *entry => Ok(UpsertOutcome::Unchanged),
            Some(mut existing) => {
                existing.merge_nutrition(entry);
                let stored = self.store.update(&existing)?;
                tracing::debug!(
                    date = %entry.date,
                    id = %stored.id,
                    revision = stored.revision,
                    "updated diary entry"
                );
                Ok(UpsertOutcome::Updated)
            }
        }
    }
}

/// Sinks enabled for an export run.
///
/// The reported outcome is the one of the first sink, which is the document
/// store whenever it is enabled.
#[derive(Default)]
pub struct SinkSet<'a> {
    sinks: Vec<Box<dyn DiarySink + 'a>>,
}

impl<'a> SinkSet<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, sink: impl DiarySink + 'a) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.sinks.iter().map(|sink| sink.name()).collect()
    }
}

impl DiarySink for SinkSet<'_> {
    fn name(&self) -> &'static str {
        "all"
    }

    fn upsert(&mut self, entry: &DiaryEntry) -> Result<UpsertOutcome, StoreError> {
        let mut first = None;
        for sink in &mut self.sinks {
            let outcome = sink.upsert(entry)?;
            tracing::debug!(sink = sink.name(), date = %entry.date, %outcome, "sink write");
            first.get_or_insert(outcome);
        }
        Ok(first.unwrap_or(UpsertOutcome::Unchanged))
    }
}

/// Storage capabilities an operation may depend on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    DocumentStore,
    TimeSeries,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::DocumentStore => "document store",
            Self::TimeSeries => "time-series store",
        };
        write!(f, "{s}")
    }
}

/// An operation required a capability that is switched off.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{0} is disabled in the configuration")]
pub struct CapabilityDisabled(pub Capability);

/// Storage backends switched on by configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub document_store: bool,
    pub time_series: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            document_store: true,
            time_series: false,
        }
    }
}

impl Capabilities {
    pub const fn enabled(&self, capability: Capability) -> bool {
        match capability {
            Capability::DocumentStore => self.document_store,
            Capability::TimeSeries => self.time_series,
        }
    }

    /// Fails unless `capability` is enabled.
    pub const fn require(&self, capability: Capability) -> Result<(), CapabilityDisabled> {
        if self.enabled(capability) {
            Ok(())
        } else {
            Err(CapabilityDisabled(capability))
        }
    }
}
