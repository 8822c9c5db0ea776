//! Output module
//!
//! Parquet snapshots of store relations.
//!
//! # Overview
//!
//! This module provides utilities for:
//! - Mapping column types to Arrow types
//! - Converting typed batches to Arrow RecordBatches
//! - Writing Parquet files under a `load_date` partition

mod export;
mod schema;
mod writer;

pub use export::{build_partitioned_path, export_relation, export_tier, relation_schema, ExportOutcome};
pub use schema::{arrow_schema, arrow_type, batch_to_arrow, column_from_sql, DECIMAL_PRECISION};
pub use writer::{write_batch_to_parquet, ParquetWriter, ParquetWriterConfig};

#[cfg(test)]
mod tests;
