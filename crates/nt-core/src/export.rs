//! Day-by-day export of the diary into the enabled sinks.
//!
//! Days are processed in ascending order, one at a time. A day whose page
//! cannot be parsed is recorded as unsuccessful and the run continues. An
//! authentication failure aborts the run: it applies to every remaining day.

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::calendar::{DiaryCalendar, Timeframe};
use crate::diary::format_date;
use crate::parser::{ParseError, parse_diary};
use crate::reconcile::{DiarySink, UpsertOutcome};
use crate::store::StoreError;

/// Errors from the fetch collaborator.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The site rejected the credentials or the session.
    #[error("source site rejected the credentials")]
    Unauthorized,
    /// Network or protocol failure.
    #[error("fetch failed: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Retrieves the raw diary page for one window.
pub trait DiaryFetcher {
    fn fetch(&mut self, timeframe: &Timeframe) -> Result<String, FetchError>;
}

/// Request errors detected before any work starts.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("start date {from} is after end date {to}")]
    InvertedRange { from: NaiveDate, to: NaiveDate },
    #[error("days must be between {min} and {max}, got {days}")]
    DaysOutOfRange { days: u32, min: u32, max: u32 },
}

/// Export failures.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// The session is not authenticated; no further days were attempted.
    #[error("authentication failed while exporting {date}")]
    Authentication { date: NaiveDate },
    #[error("failed to fetch diary for {date}")]
    Fetch {
        date: NaiveDate,
        #[source]
        source: FetchError,
    },
    #[error("failed to parse diary for {date}")]
    Parse {
        date: NaiveDate,
        #[source]
        source: ParseError,
    },
    #[error("failed to store diary for {date}")]
    Store {
        date: NaiveDate,
        #[source]
        source: StoreError,
    },
}

/// Per-day classification of an export run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportResult {
    pub successful_days: Vec<String>,
    pub unsuccessful_days: Vec<String>,
}

/// Accepted bounds for days-back exports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaysBackLimits {
    pub min_days: u32,
    pub max_days: u32,
}

impl Default for DaysBackLimits {
    fn default() -> Self {
        Self {
            min_days: 1,
            max_days: 365,
        }
    }
}

/// Resolves a days-back request into an inclusive date range ending at
/// `today` (or the day before when `include_today` is false).
pub fn days_back_range(
    today: NaiveDate,
    days: u32,
    include_today: bool,
    limits: DaysBackLimits,
) -> Result<(NaiveDate, NaiveDate), ValidationError> {
    let out_of_range = ValidationError::DaysOutOfRange {
        days,
        min: limits.min_days,
        max: limits.max_days,
    };
    if days < limits.min_days || days > limits.max_days || days == 0 {
        return Err(out_of_range);
    }
    let to = if include_today {
        Some(today)
    } else {
        today.checked_sub_days(Days::new(1))
    };
    let from = to.and_then(|to| to.checked_sub_days(Days::new(u64::from(days) - 1)));
    match (from, to) {
        (Some(from), Some(to)) => Ok((from, to)),
        _ => Err(out_of_range),
    }
}

/// Drives calendar, fetcher, parser and sinks over a range of days.
pub struct Exporter<F, S> {
    fetcher: F,
    sink: S,
    calendar: DiaryCalendar,
    limits: DaysBackLimits,
}

impl<F: DiaryFetcher, S: DiarySink> Exporter<F, S> {
    pub fn new(fetcher: F, sink: S) -> Self {
        Self {
            fetcher,
            sink,
            calendar: DiaryCalendar::default(),
            limits: DaysBackLimits::default(),
        }
    }

    #[must_use]
    pub const fn with_calendar(mut self, calendar: DiaryCalendar) -> Self {
        self.calendar = calendar;
        self
    }

    #[must_use]
    pub const fn with_limits(mut self, limits: DaysBackLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Exports every day from `from` to `to` inclusive.
    pub fn export_range(
        &mut self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<ExportResult, ExportError> {
        if from > to {
            return Err(ValidationError::InvertedRange { from, to }.into());
        }

        tracing::info!(%from, %to, "starting export");
        let mut result = ExportResult::default();
        for date in from.iter_days().take_while(|date| *date <= to) {
            match self.export_day(date) {
                Ok(outcome) => {
                    tracing::info!(%date, %outcome, "exported day");
                    result.successful_days.push(format_date(date));
                }
                Err(ExportError::Parse { date, source }) => {
                    tracing::warn!(%date, error = %source, "skipping day");
                    result.unsuccessful_days.push(format_date(date));
                }
                Err(err) => return Err(err),
            }
        }
        tracing::info!(
            successful = result.successful_days.len(),
            unsuccessful = result.unsuccessful_days.len(),
            "export finished"
        );
        Ok(result)
    }

    /// Exports the last `days` days, validated against the configured bounds.
    pub fn export_days_back(
        &mut self,
        days: u32,
        include_today: bool,
    ) -> Result<ExportResult, ExportError> {
        let today = self.calendar.today();
        self.export_days_back_from(today, days, include_today)
    }

    /// Like [`Self::export_days_back`] with an explicit reference date.
    pub fn export_days_back_from(
        &mut self,
        today: NaiveDate,
        days: u32,
        include_today: bool,
    ) -> Result<ExportResult, ExportError> {
        let (from, to) = days_back_range(today, days, include_today, self.limits)?;
        self.export_range(from, to)
    }

    /// Exports yesterday as seen from the site timezone.
    pub fn export_yesterday(&mut self) -> Result<UpsertOutcome, ExportError> {
        let yesterday = self.calendar.yesterday();
        self.export_day(yesterday)
    }

    /// Fetches, parses and stores a single day. Parse failures are returned
    /// to the caller.
    pub fn export_day(&mut self, date: NaiveDate) -> Result<UpsertOutcome, ExportError> {
        let window = self.calendar.window_for(date);
        let markup = match self.fetcher.fetch(&window) {
            Ok(markup) => markup,
            Err(FetchError::Unauthorized) => return Err(ExportError::Authentication { date }),
            Err(source) => return Err(ExportError::Fetch { date, source }),
        };
        let entry = match parse_diary(&markup, date) {
            Ok(entry) => entry,
            Err(ParseError::Unauthenticated) => {
                return Err(ExportError::Authentication { date });
            }
            Err(source) => return Err(ExportError::Parse { date, source }),
        };
        self.sink
            .upsert(&entry)
            .map_err(|source| ExportError::Store { date, source })
    }
}
