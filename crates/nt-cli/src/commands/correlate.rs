//! Correlate consumed products with external event dates.

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::Args;
use nt_core::{Capability, CorrelationInput, DiaryStore, correlate};

use crate::Config;
use crate::commands::open_database;

#[derive(Debug, Args)]
pub struct CorrelateArgs {
    /// Keyword a product name must contain (repeatable). Without any, nothing matches.
    #[arg(long = "include", value_name = "KEYWORD")]
    pub include: Vec<String>,

    /// Keyword that rules a product out (repeatable).
    #[arg(long = "exclude", value_name = "KEYWORD")]
    pub exclude: Vec<String>,

    /// Date of an observed event, YYYY-MM-DD (repeatable).
    #[arg(long = "date", value_name = "DATE")]
    pub dates: Vec<NaiveDate>,

    /// Ignore consumption before this date.
    #[arg(long)]
    pub since: Option<NaiveDate>,

    /// Read the request as JSON from a file instead ("-" for stdin).
    #[arg(long, conflicts_with_all = ["include", "exclude", "dates", "since"])]
    pub input: Option<PathBuf>,
}

pub fn run<W: Write>(writer: &mut W, args: &CorrelateArgs, config: &Config) -> Result<()> {
    config.capabilities().require(Capability::DocumentStore)?;
    let request = build_request(args)?;
    let db = open_database(config)?;
    execute(writer, &db, &request)
}

/// Runs the analysis against `store` and prints the JSON result.
pub fn execute<W: Write, S: DiaryStore + ?Sized>(
    writer: &mut W,
    store: &S,
    request: &CorrelationInput,
) -> Result<()> {
    let output = correlate(store, request).context("correlation query failed")?;
    writeln!(writer, "{}", serde_json::to_string_pretty(&output)?)?;
    Ok(())
}

fn build_request(args: &CorrelateArgs) -> Result<CorrelationInput> {
    if let Some(path) = &args.input {
        let raw = if path.as_os_str() == "-" {
            std::io::read_to_string(std::io::stdin()).context("failed to read request from stdin")?
        } else {
            std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?
        };
        return serde_json::from_str(&raw).context("invalid correlation request");
    }

    Ok(CorrelationInput {
        inclusion_keywords: args.include.iter().cloned().collect(),
        exclusion_keywords: args.exclude.iter().cloned().collect(),
        occurrence_dates: args.dates.clone(),
        start_date: args.since,
    })
}
