//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::commands::correlate::CorrelateArgs;
use crate::commands::export::ExportCommand;
use crate::commands::search::SearchArgs;
use crate::commands::stats::StatsArgs;

/// Nutrition diary tracker.
///
/// Exports daily food diaries from the source site into local storage and
/// analyses which foods tend to precede recorded events.
#[derive(Debug, Parser)]
#[command(name = "nt", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Export diary days from the source site.
    Export {
        #[command(subcommand)]
        command: ExportCommand,
    },

    /// Correlate consumed products with event dates.
    Correlate(CorrelateArgs),

    /// Search stored products by name.
    Search(SearchArgs),

    /// Show statistics over stored diary days.
    Stats(StatsArgs),
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use clap::CommandFactory;
    use nt_core::NutrientField;

    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_export_range() {
        let cli = Cli::parse_from([
            "nt", "export", "range", "--from", "2024-01-01", "--to", "2024-01-03",
        ]);
        let Some(Commands::Export {
            command: ExportCommand::Range(args),
        }) = cli.command
        else {
            panic!("expected export range");
        };
        assert_eq!(args.from, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert_eq!(args.to, NaiveDate::from_ymd_opt(2024, 1, 3).unwrap());
    }

    #[test]
    fn parses_repeated_correlate_flags() {
        let cli = Cli::parse_from([
            "nt",
            "-v",
            "correlate",
            "--include",
            "milch",
            "--include",
            "käse",
            "--exclude",
            "hafer",
            "--date",
            "2024-01-10",
            "--since",
            "2023-12-01",
        ]);
        assert!(cli.verbose);
        let Some(Commands::Correlate(args)) = cli.command else {
            panic!("expected correlate");
        };
        assert_eq!(args.include, vec!["milch", "käse"]);
        assert_eq!(args.exclude, vec!["hafer"]);
        assert_eq!(args.dates.len(), 1);
        assert!(args.since.is_some());
    }

    #[test]
    fn stats_defaults_to_calories() {
        let cli = Cli::parse_from(["nt", "stats"]);
        let Some(Commands::Stats(args)) = cli.command else {
            panic!("expected stats");
        };
        assert_eq!(args.max_by, NutrientField::Calories);
    }

    #[test]
    fn rejects_unknown_nutrient() {
        assert!(Cli::try_parse_from(["nt", "stats", "--max-by", "salt"]).is_err());
    }
}
