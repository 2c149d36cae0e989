//! Statistics over stored diary days.

use std::io::Write;

use anyhow::Result;
use clap::Args;
use nt_core::{Capability, NutrientField, StoredEntry, Totals};
use serde::Serialize;

use crate::Config;
use crate::commands::open_database;

#[derive(Debug, Args)]
pub struct StatsArgs {
    /// Nutrient used to pick the peak day.
    #[arg(long, default_value_t = NutrientField::Calories)]
    pub max_by: NutrientField,

    /// Output as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Aggregates shown by the command.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub entries: u64,
    pub averages: Option<Totals>,
    pub max_by: NutrientField,
    pub peak_date: Option<String>,
    pub peak_value: Option<f64>,
}

pub fn run<W: Write>(writer: &mut W, args: &StatsArgs, config: &Config) -> Result<()> {
    config.capabilities().require(Capability::DocumentStore)?;
    let db = open_database(config)?;
    let peak = db.max_by(args.max_by)?;
    let stats = collect(db.count_entries()?, db.average_totals()?, args.max_by, peak.as_ref());
    if args.json {
        writeln!(writer, "{}", serde_json::to_string_pretty(&stats)?)?;
        Ok(())
    } else {
        render(writer, &stats)
    }
}

fn collect(
    entries: u64,
    averages: Option<Totals>,
    max_by: NutrientField,
    peak: Option<&StoredEntry>,
) -> Stats {
    Stats {
        entries,
        averages,
        max_by,
        peak_date: peak.map(|stored| nt_core::format_date(stored.entry.date)),
        peak_value: peak.map(|stored| stored.entry.totals.get(max_by)),
    }
}

fn render<W: Write>(writer: &mut W, stats: &Stats) -> Result<()> {
    writeln!(writer, "Diary entries: {}", stats.entries)?;
    let Some(averages) = stats.averages else {
        writeln!(writer, "No diary entries stored.")?;
        return Ok(());
    };

    writeln!(writer, "Average per day:")?;
    for field in NutrientField::ALL {
        writeln!(writer, "  {:<9}{:>8.1}", field.as_str(), averages.get(field))?;
    }
    if let (Some(date), Some(value)) = (&stats.peak_date, stats.peak_value) {
        writeln!(writer, "Highest {}: {date} ({value:.1})", stats.max_by)?;
    }
    Ok(())
}
