//! Parquet file writer
//!
//! Writes typed batches from any tier as Snappy-compressed Parquet through
//! Arrow. One writer holds one column layout.

use crate::error::{Error, Result};
use crate::output::schema::{arrow_schema, batch_to_arrow};
use crate::types::{ColumnSchema, TypedBatch};
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

/// Rows per row group unless configured otherwise
pub const DEFAULT_ROW_GROUP_ROWS: usize = 1024 * 1024;

/// Parquet output settings
#[derive(Debug, Clone)]
pub struct ParquetWriterConfig {
    compression: Compression,
    row_group_size: usize,
}

impl Default for ParquetWriterConfig {
    fn default() -> Self {
        Self {
            compression: Compression::SNAPPY,
            row_group_size: DEFAULT_ROW_GROUP_ROWS,
        }
    }
}

impl ParquetWriterConfig {
    /// Snappy, default row groups
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rows per row group (at least one)
    #[must_use]
    pub fn with_row_group_size(mut self, size: usize) -> Self {
        self.row_group_size = size.max(1);
        self
    }

    /// Write without compression
    #[must_use]
    pub fn uncompressed(mut self) -> Self {
        self.compression = Compression::UNCOMPRESSED;
        self
    }

    /// Rows per row group
    #[must_use]
    pub fn row_group_size(&self) -> usize {
        self.row_group_size
    }

    fn properties(&self) -> WriterProperties {
        WriterProperties::builder()
            .set_compression(self.compression)
            .set_max_row_group_size(self.row_group_size)
            .build()
    }
}

/// Writes batches sharing one column layout into a single Parquet file
pub struct ParquetWriter {
    writer: ArrowWriter<File>,
    columns: Vec<ColumnSchema>,
    rows_written: usize,
}

impl ParquetWriter {
    /// Create the file at `path` for the given columns
    pub fn new(
        path: impl AsRef<Path>,
        columns: &[ColumnSchema],
        config: &ParquetWriterConfig,
    ) -> Result<Self> {
        let path = path.as_ref();
        let file = File::create(path)
            .map_err(|e| Error::output(format!("Cannot create '{}': {e}", path.display())))?;

        let schema = Arc::new(arrow_schema(columns));
        let writer = ArrowWriter::try_new(file, schema, Some(config.properties()))?;

        Ok(Self {
            writer,
            columns: columns.to_vec(),
            rows_written: 0,
        })
    }

    /// Append a batch; its columns must equal the file layout
    pub fn write(&mut self, batch: &TypedBatch) -> Result<()> {
        if batch.columns != self.columns {
            return Err(Error::output(format!(
                "Batch from '{}' does not match the file layout",
                batch.lineage
            )));
        }
        if batch.is_empty() {
            return Ok(());
        }
        self.writer.write(&batch_to_arrow(batch)?)?;

        self.rows_written += batch.num_rows();
        Ok(())
    }

    /// Rows written so far
    #[must_use]
    pub fn rows_written(&self) -> usize {
        self.rows_written
    }

    /// Write the footer; returns the total row count
    pub fn close(self) -> Result<usize> {
        self.writer.close()?;
        Ok(self.rows_written)
    }
}

/// Write one batch to its own Parquet file
pub fn write_batch_to_parquet(
    path: impl AsRef<Path>,
    batch: &TypedBatch,
    config: Option<&ParquetWriterConfig>,
) -> Result<usize> {
    let config = config.cloned().unwrap_or_default();
    let mut writer = ParquetWriter::new(path, &batch.columns, &config)?;
    writer.write(batch)?;
    writer.close()
}
