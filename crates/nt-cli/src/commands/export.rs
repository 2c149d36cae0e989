//! Export diary days from the source site into the configured sinks.

use std::io::Write;

use anyhow::{Context, Result, anyhow, bail};
use chrono::NaiveDate;
use clap::{Args, Subcommand};
use nt_core::{
    Capability, DiaryCalendar, DiaryFetcher, DiarySink, ExportResult, Exporter, Reconciler,
    SinkSet,
};
use nt_web::{Client, InfluxWriter};

use crate::Config;
use crate::adapters::{BlockingFetcher, InfluxSink};
use crate::commands::open_database;

#[derive(Debug, Subcommand)]
pub enum ExportCommand {
    /// Export every day from --from to --to inclusive.
    Range(RangeArgs),
    /// Export the last N days.
    Days(DaysArgs),
    /// Export yesterday only.
    Yesterday,
}

#[derive(Debug, Args)]
pub struct RangeArgs {
    /// First day (YYYY-MM-DD).
    #[arg(long)]
    pub from: NaiveDate,
    /// Last day (YYYY-MM-DD), inclusive.
    #[arg(long)]
    pub to: NaiveDate,
}

#[derive(Debug, Args)]
pub struct DaysArgs {
    /// Number of days to export.
    #[arg(long)]
    pub days: u32,
    /// End the range today instead of yesterday.
    #[arg(long)]
    pub include_today: bool,
}

pub fn run<W: Write>(writer: &mut W, command: &ExportCommand, config: &Config) -> Result<()> {
    let capabilities = config.capabilities();
    let calendar = DiaryCalendar::default();
    let runtime = tokio::runtime::Runtime::new().context("failed to initialize tokio runtime")?;

    let mut db = if capabilities.enabled(Capability::DocumentStore) {
        Some(open_database(config)?)
    } else {
        None
    };
    let mut sinks = SinkSet::new();
    if let Some(db) = db.as_mut() {
        sinks = sinks.with(Reconciler::new(db));
    }
    if capabilities.enabled(Capability::TimeSeries) {
        sinks = sinks.with(InfluxSink::new(&runtime, influx_writer(config)?, calendar));
    }
    if sinks.is_empty() {
        bail!("no storage is enabled (set storage.document_store or influx.enabled)");
    }
    tracing::debug!(sinks = ?sinks.names(), "export sinks");

    let fetcher = BlockingFetcher::new(&runtime, source_client(config)?);
    let mut exporter = Exporter::new(fetcher, sinks)
        .with_calendar(calendar)
        .with_limits(config.export.limits());
    execute(writer, &mut exporter, command)
}

/// Runs `command` on an already assembled exporter.
pub fn execute<W, F, S>(
    writer: &mut W,
    exporter: &mut Exporter<F, S>,
    command: &ExportCommand,
) -> Result<()>
where
    W: Write,
    F: DiaryFetcher,
    S: DiarySink,
{
    match command {
        ExportCommand::Range(args) => {
            let result = exporter
                .export_range(args.from, args.to)
                .context("export failed")?;
            write_result(writer, &result)
        }
        ExportCommand::Days(args) => {
            let result = exporter
                .export_days_back(args.days, args.include_today)
                .context("export failed")?;
            write_result(writer, &result)
        }
        ExportCommand::Yesterday => {
            let outcome = exporter.export_yesterday().context("export failed")?;
            writeln!(writer, "yesterday: {outcome}")?;
            Ok(())
        }
    }
}

fn write_result<W: Write>(writer: &mut W, result: &ExportResult) -> Result<()> {
    writeln!(writer, "{}", serde_json::to_string_pretty(result)?)?;
    Ok(())
}

fn source_client(config: &Config) -> Result<Client> {
    let username = config
        .source
        .username
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| {
            anyhow!("missing source username (set NT_SOURCE__USERNAME or config.toml)")
        })?;
    let password = config.source.password.clone().unwrap_or_default();
    Client::new(config.source.base_url.clone(), username, password)
        .context("failed to create source client")
}

fn influx_writer(config: &Config) -> Result<InfluxWriter> {
    let influx = &config.influx;
    let token = influx
        .token
        .as_deref()
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| anyhow!("missing influx token (set NT_INFLUX__TOKEN or config.toml)"))?;
    InfluxWriter::new(
        influx.url.clone(),
        influx.org.clone(),
        influx.bucket.clone(),
        token,
    )
    .context("failed to create influx writer")
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use insta::assert_snapshot;
    use nt_core::{DiaryStore, ExportError, FetchError, Timeframe};
    use nt_db::Database;

    use super::*;

    const DAY_PAGE: &str = r#"
        <html><body>
        <table class="myday-table-std">
          <tr>
            <td><a href="/db/apfel.html">100 g Apfel</a></td><td></td>
            <td>52 kcal</td><td>0,2 g</td><td>14 g</td><td>0,3 g</td>
          </tr>
          <tr>
            <td><b>Summe</b></td><td></td>
            <td>52 kcal</td><td>0,2 g</td><td>14 g</td><td>0,3 g</td>
          </tr>
        </table>
        </body></html>
    "#;

    const LOGIN_PAGE: &str =
        r#"<html><body><h1 id="fddb-headline1">Anmelden</h1></body></html>"#;

    /// Serves canned pages keyed by window start; unknown windows get a
    /// maintenance page.
    struct CannedFetcher {
        pages: HashMap<i64, &'static str>,
    }

    impl CannedFetcher {
        fn new(days: &[(NaiveDate, &'static str)]) -> Self {
            let calendar = DiaryCalendar::default();
            Self {
                pages: days
                    .iter()
                    .map(|(day, page)| (calendar.window_for(*day).from(), *page))
                    .collect(),
            }
        }
    }

    impl DiaryFetcher for CannedFetcher {
        fn fetch(&mut self, timeframe: &Timeframe) -> Result<String, FetchError> {
            Ok(self
                .pages
                .get(&timeframe.from())
                .copied()
                .unwrap_or("<html><body>Wartungsarbeiten</body></html>")
                .to_string())
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn range_export_prints_partitioned_days() {
        let mut db = Database::open_in_memory().unwrap();
        let fetcher = CannedFetcher::new(&[
            (date(2024, 1, 1), DAY_PAGE),
            (date(2024, 1, 3), DAY_PAGE),
        ]);
        let mut exporter = Exporter::new(fetcher, Reconciler::new(&mut db));
        let command = ExportCommand::Range(RangeArgs {
            from: date(2024, 1, 1),
            to: date(2024, 1, 3),
        });

        let mut output = Vec::new();
        execute(&mut output, &mut exporter, &command).unwrap();
        drop(exporter);

        assert_snapshot!(String::from_utf8(output).unwrap(), @r#"
        {
          "successfulDays": [
            "2024-01-01",
            "2024-01-03"
          ],
          "unsuccessfulDays": [
            "2024-01-02"
          ]
        }
        "#);
        let stored = db.find_by_date(date(2024, 1, 3)).unwrap().unwrap();
        assert_eq!(stored.entry.products[0].name, "Apfel");
        assert_eq!(stored.entry.totals.fat, 0.2);
        assert!(db.find_by_date(date(2024, 1, 2)).unwrap().is_none());
    }

    #[test]
    fn login_page_aborts_the_export() {
        let mut db = Database::open_in_memory().unwrap();
        let fetcher = CannedFetcher::new(&[
            (date(2024, 1, 1), DAY_PAGE),
            (date(2024, 1, 2), LOGIN_PAGE),
            (date(2024, 1, 3), DAY_PAGE),
        ]);
        let mut exporter = Exporter::new(fetcher, Reconciler::new(&mut db));
        let command = ExportCommand::Range(RangeArgs {
            from: date(2024, 1, 1),
            to: date(2024, 1, 3),
        });

        let mut output = Vec::new();
        let err = execute(&mut output, &mut exporter, &command).unwrap_err();
        drop(exporter);

        assert!(matches!(
            err.downcast_ref::<ExportError>(),
            Some(ExportError::Authentication { .. })
        ));
        assert!(output.is_empty());
        assert_eq!(db.count_entries().unwrap(), 1);
    }

    #[test]
    fn days_outside_limits_are_rejected() {
        let mut db = Database::open_in_memory().unwrap();
        let mut exporter = Exporter::new(CannedFetcher::new(&[]), Reconciler::new(&mut db));
        let command = ExportCommand::Days(DaysArgs {
            days: 0,
            include_today: false,
        });

        let mut output = Vec::new();
        let err = execute(&mut output, &mut exporter, &command).unwrap_err();
        assert!(format!("{err:#}").contains("days must be between 1 and 365"));
    }

    #[test]
    fn export_without_sinks_fails() {
        let mut config = Config::default();
        config.storage.document_store = false;
        let err = run(&mut Vec::new(), &ExportCommand::Yesterday, &config).unwrap_err();
        assert!(err.to_string().contains("no storage is enabled"));
    }

    #[test]
    fn export_requires_source_username() {
        let temp = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.database_path = temp.path().join("nt.db");
        let err = run(&mut Vec::new(), &ExportCommand::Yesterday, &config).unwrap_err();
        assert!(err.to_string().contains("missing source username"));
    }
}
