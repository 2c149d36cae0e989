//! Core domain logic for the nutrition diary tracker.
//!
//! This crate contains:
//! - Calendar: mapping dates onto the source site's diary windows
//! - Parsing: turning a diary page into a [`DiaryEntry`]
//! - Export: the day-by-day pipeline with its failure policy
//! - Reconciliation: idempotent upserts into the configured sinks
//! - Correlation: co-occurrence of foods with event dates

pub mod calendar;
pub mod correlation;
mod diary;
pub mod export;
pub mod parser;
pub mod reconcile;
pub mod store;

pub use calendar::{DiaryCalendar, Timeframe};
pub use correlation::{CorrelationDetail, CorrelationInput, CorrelationOutput, correlate};
pub use diary::{
    DatedProduct, DiaryEntry, NutrientField, Product, StoredEntry, Totals, UnknownNutrient,
    format_date,
};
pub use export::{
    DaysBackLimits, DiaryFetcher, ExportError, ExportResult, Exporter, FetchError,
    ValidationError,
};
pub use parser::{ParseError, parse_diary};
pub use reconcile::{
    Capabilities, Capability, CapabilityDisabled, DiarySink, Reconciler, SinkSet, UpsertOutcome,
};
pub use store::{DiaryStore, ProductFilter, StoreError};
