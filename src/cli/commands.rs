//! CLI commands and argument parsing

use crate::types::Tier;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Layered ingestion of delimited text exports
#[derive(Parser, Debug)]
#[command(name = "tierline")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Project file (YAML)
    #[arg(short, long, global = true, default_value = "tierline.yaml")]
    pub project: PathBuf,

    /// Store location, overrides the project file (`:memory:` allowed)
    #[arg(short, long, global = true)]
    pub store: Option<String>,

    /// Output format
    #[arg(short, long, global = true, default_value = "json")]
    pub format: OutputFormat,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Capture raw files into the bronze tier
    Ingest {
        /// Input directory, overrides the project file
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Capture files again even when already captured
        #[arg(long)]
        force: bool,
    },

    /// Normalize bronze tables into the silver tier
    Normalize {
        /// Sources to run (comma-separated, empty = all)
        #[arg(long)]
        sources: Option<String>,

        /// Ignore watermarks
        #[arg(long)]
        full: bool,

        /// Run sources concurrently
        #[arg(long)]
        parallel: bool,
    },

    /// Merge silver relations into the gold tier
    Consolidate {
        /// Consolidations to run (comma-separated, empty = all)
        #[arg(long)]
        only: Option<String>,
    },

    /// Full pipeline, gated by the run windows
    Run {
        /// Run outside the configured windows
        #[arg(long)]
        force: bool,

        /// Ignore watermarks
        #[arg(long)]
        full: bool,

        /// Run sources concurrently
        #[arg(long)]
        parallel: bool,

        /// Capture files again even when already captured
        #[arg(long)]
        recapture: bool,
    },

    /// Write a Parquet snapshot of a tier
    Export {
        /// Tier to export
        #[arg(long, default_value = "gold")]
        tier: TierArg,

        /// Single relation (all relations of the tier when absent)
        #[arg(long)]
        table: Option<String>,

        /// Output directory, overrides the project file
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Partition date (today when absent), `YYYY-MM-DD`
        #[arg(long)]
        date: Option<NaiveDate>,
    },

    /// Validate the project file
    Validate,

    /// List built-in source definitions
    Sources {
        /// Print one definition as YAML
        #[arg(long)]
        show: Option<String>,
    },
}

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// JSON output (one message per line)
    Json,
    /// Human-readable output
    Pretty,
}

/// Tier selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum TierArg {
    Bronze,
    Silver,
    Gold,
}

impl From<TierArg> for Tier {
    fn from(arg: TierArg) -> Self {
        match arg {
            TierArg::Bronze => Tier::Bronze,
            TierArg::Silver => Tier::Silver,
            TierArg::Gold => Tier::Gold,
        }
    }
}

/// Split a comma-separated list, dropping blanks
pub fn split_list(value: Option<&str>) -> Vec<String> {
    value
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run() {
        let cli = Cli::parse_from(["tierline", "run", "--force", "--parallel", "-s", ":memory:"]);
        assert_eq!(cli.store.as_deref(), Some(":memory:"));
        assert_eq!(cli.project, PathBuf::from("tierline.yaml"));
        match cli.command {
            Commands::Run {
                force,
                full,
                parallel,
                recapture,
            } => {
                assert!(force);
                assert!(!full);
                assert!(parallel);
                assert!(!recapture);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_export() {
        let cli = Cli::parse_from([
            "tierline", "export", "--tier", "silver", "--date", "2025-12-14", "-p", "x.yaml",
        ]);
        match cli.command {
            Commands::Export { tier, date, .. } => {
                assert_eq!(Tier::from(tier), Tier::Silver);
                assert_eq!(date, NaiveDate::from_ymd_opt(2025, 12, 14));
            }
            other => panic!("unexpected command: {other:?}"),
        }
        assert_eq!(cli.project, PathBuf::from("x.yaml"));
    }

    #[test]
    fn test_split_list() {
        assert_eq!(split_list(Some("a, b,,c")), vec!["a", "b", "c"]);
        assert!(split_list(None).is_empty());
    }
}
