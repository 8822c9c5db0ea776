//! CLI module
//!
//! Command-line interface for running pipelines.
//!
//! # Commands
//!
//! - `ingest` - Capture raw files into bronze
//! - `normalize` - Bronze → silver
//! - `consolidate` - Silver → gold
//! - `run` - Full pipeline inside the run windows
//! - `export` - Parquet snapshot of a tier
//! - `validate` - Check the project file
//! - `sources` - List built-in source definitions

mod commands;
mod runner;

pub use commands::{Cli, Commands, OutputFormat, TierArg};
pub use runner::Runner;
