//! Parquet snapshots of store relations

use crate::error::{Error, Result};
use crate::output::schema::column_from_sql;
use crate::output::writer::{ParquetWriter, ParquetWriterConfig};
use crate::store::Store;
use crate::types::{ColumnSchema, Tier};
use chrono::NaiveDate;
use std::fs;
use std::path::{Path, PathBuf};

/// Hive-style partitioned path for one snapshot
///
/// Format: `{base}/{table}/load_date={YYYY-MM-DD}/{table}.parquet`
pub fn build_partitioned_path(base: &Path, table: &str, load_date: NaiveDate) -> PathBuf {
    let date = load_date.format("%Y-%m-%d");
    base.join(table)
        .join(format!("load_date={date}"))
        .join(format!("{table}.parquet"))
}

/// Result of one export
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportOutcome {
    /// `schema.table`
    pub relation: String,
    pub path: PathBuf,
    pub rows: usize,
}

/// Column layout of a store relation
pub fn relation_schema(store: &Store, tier: Tier, table: &str) -> Result<Vec<ColumnSchema>> {
    Ok(store
        .relation_columns(tier.schema(), table)?
        .iter()
        .map(|(name, data_type)| column_from_sql(name, data_type))
        .collect())
}

/// Export one relation to a partitioned Parquet file
pub fn export_relation(
    store: &Store,
    tier: Tier,
    table: &str,
    base: &Path,
    load_date: NaiveDate,
    config: &ParquetWriterConfig,
) -> Result<ExportOutcome> {
    let columns = relation_schema(store, tier, table)?;
    let batch = store.read_typed(tier.schema(), table, &columns, None)?;

    let path = build_partitioned_path(base, table, load_date);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| Error::output(format!("Failed to create '{}': {e}", parent.display())))?;
    }

    let mut writer = ParquetWriter::new(&path, &columns, config)?;
    writer.write(&batch)?;
    let rows = writer.close()?;

    tracing::info!(
        relation = %format!("{tier}.{table}"),
        rows = rows,
        path = %path.display(),
        "Exported relation"
    );
    Ok(ExportOutcome {
        relation: format!("{tier}.{table}"),
        path,
        rows,
    })
}

/// Export every relation of a tier
pub fn export_tier(
    store: &Store,
    tier: Tier,
    base: &Path,
    load_date: NaiveDate,
    config: &ParquetWriterConfig,
) -> Result<Vec<ExportOutcome>> {
    let tables = store.list_tables(tier.schema())?;
    if tables.is_empty() {
        tracing::warn!(tier = %tier, "No relations to export");
    }
    tables
        .iter()
        .map(|table| export_relation(store, tier, table, base, load_date, config))
        .collect()
}
