//! Blocking adapters from the async HTTP clients onto the core traits.

use nt_core::{
    DiaryCalendar, DiaryEntry, DiaryFetcher, DiarySink, FetchError, StoreError, Timeframe,
    UpsertOutcome,
};
use nt_web::{Client, InfluxWriter, WebError};
use tokio::runtime::Runtime;

/// Fetches diary pages one request at a time on a shared runtime.
pub struct BlockingFetcher<'rt> {
    runtime: &'rt Runtime,
    client: Client,
}

impl<'rt> BlockingFetcher<'rt> {
    pub const fn new(runtime: &'rt Runtime, client: Client) -> Self {
        Self { runtime, client }
    }
}

impl DiaryFetcher for BlockingFetcher<'_> {
    fn fetch(&mut self, timeframe: &Timeframe) -> Result<String, FetchError> {
        self.runtime
            .block_on(self.client.fetch_diary(timeframe))
            .map_err(|err| match err {
                WebError::Unauthorized { .. } => FetchError::Unauthorized,
                other => FetchError::Transport(Box::new(other)),
            })
    }
}

/// Writes each exported day as a time-series point stamped with the start of
/// its diary window.
pub struct InfluxSink<'rt> {
    runtime: &'rt Runtime,
    writer: InfluxWriter,
    calendar: DiaryCalendar,
}

impl<'rt> InfluxSink<'rt> {
    pub const fn new(runtime: &'rt Runtime, writer: InfluxWriter, calendar: DiaryCalendar) -> Self {
        Self {
            runtime,
            writer,
            calendar,
        }
    }
}

impl DiarySink for InfluxSink<'_> {
    fn name(&self) -> &'static str {
        "time-series"
    }

    fn upsert(&mut self, entry: &DiaryEntry) -> Result<UpsertOutcome, StoreError> {
        let timestamp = self.calendar.window_for(entry.date).from();
        self.runtime
            .block_on(self.writer.write(entry, timestamp))
            .map_err(StoreError::backend)?;
        // Points for the same day and timestamp overwrite each other.
        Ok(UpsertOutcome::Updated)
    }
}
