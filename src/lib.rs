// Allow common clippy pedantic lints that aren't critical for this codebase
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_lossless)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::ref_option)]
#![allow(clippy::unused_self)]
#![allow(clippy::struct_excessive_bools)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::items_after_statements)]
#![allow(clippy::unnecessary_wraps)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::match_wildcard_for_single_variants)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::unused_async)]

//! # tierline
//!
//! Layered ingestion of noisy delimited text exports (point of sale, access
//! control, receivables, weather scrapes) into a DuckDB store.
//!
//! ## Features
//!
//! - **Raw Capture**: Every physical line kept in the bronze tier, append-only
//! - **Boundary Extraction**: Header located by prefix, data ended by stop markers
//! - **Locale-Aware Casting**: `1.234,56`, day-first dates, explicit cast outcomes
//! - **Streaming Normalization**: Size-triggered flushes under a byte budget
//! - **Idempotent Loading**: Insert-if-absent by natural key, safe to re-run
//! - **Consolidation**: One gold row per key merged across source systems
//! - **Parquet Output**: Partitioned snapshots of any tier
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use tierline::{load_project, pipeline::Pipeline, store::Store, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let project = load_project("tierline.yaml")?;
//!     let store = Store::open(&project.store.path)?;
//!     store.bootstrap()?;
//!
//!     let report = Pipeline::new(&project, &store).run().await?;
//!     println!("inserted {} rows", report.inserted());
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//!  raw files ──▶ bronze.<raw_table>   line_no, raw_line, source_file, batch_id
//!                      │
//!                      │  boundary → cast → derive → filter   (streamed, flushed)
//!                      ▼
//!                silver.<target>      typed rows, insert if key absent
//!                      │
//!                      │  merge by natural key across sources
//!                      ▼
//!                gold.<target>        one row per key, upsert
//!
//!  any tier ──▶ <export>/<table>/load_date=YYYY-MM-DD/<table>.parquet
//! ```

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]

// ============================================================================
// Module declarations
// ============================================================================

/// Error types
pub mod error;

/// Typed cells, batches and tiers
pub mod types;

/// Header and stop-marker detection
pub mod boundary;

/// Locale-aware string to value casting
pub mod cast;

/// Project and source definitions
pub mod config;

/// Built-in source definitions
pub mod sources;

/// Run windows
pub mod schedule;

/// DuckDB store and bulk-load wire format
pub mod store;

/// Raw capture (bronze)
pub mod raw;

/// Streaming normalizer (bronze → silver)
pub mod normalize;

/// Idempotent tier loader
pub mod tier;

/// Multi-source consolidation (silver → gold)
pub mod consolidate;

/// Pipeline orchestration
pub mod pipeline;

/// Arrow/Parquet output
pub mod output;

/// Command-line interface
pub mod cli;

// ============================================================================
// Re-exports
// ============================================================================

pub use error::{Error, Result};
pub use types::*;

// Re-export commonly used types
pub use config::{load_project, load_project_from_str, load_source, ProjectDefinition, SourceDefinition};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");
