//! Bulk-load wire format
//!
//! Tab-delimited, quoted only when needed, newline-terminated rows written to
//! a temporary file the store copies from. An empty field is null.

use crate::error::Result;
use crate::types::{CellValue, TypedBatch};
use csv::{QuoteStyle, Terminator, WriterBuilder};
use std::io::Write;
use tempfile::NamedTempFile;

const DELIMITER: u8 = b'\t';

/// A wire-format file ready to be copied into the store
#[derive(Debug)]
pub struct WireFile {
    file: NamedTempFile,
    rows: usize,
}

impl WireFile {
    /// Encode a typed batch. The first field of each row is its position in
    /// the batch, so staging relations can keep the first of duplicate keys.
    pub fn from_batch(batch: &TypedBatch) -> Result<Self> {
        Self::write(batch.rows.iter().enumerate().map(|(ord, row)| {
            std::iter::once(ord.to_string())
                .chain(row.iter().map(CellValue::to_wire))
                .collect()
        }))
    }

    /// Encode raw lines of one captured file
    pub fn from_raw_lines<'a, I>(first_line_no: i64, lines: I, source_file: &str, batch_id: &str) -> Result<Self>
    where
        I: IntoIterator<Item = &'a str>,
    {
        Self::write(lines.into_iter().enumerate().map(|(idx, line)| {
            vec![
                (first_line_no + idx as i64).to_string(),
                line.to_string(),
                source_file.to_string(),
                batch_id.to_string(),
            ]
        }))
    }

    fn write<I>(records: I) -> Result<Self>
    where
        I: IntoIterator<Item = Vec<String>>,
    {
        let file = NamedTempFile::new()?;
        let mut writer = WriterBuilder::new()
            .delimiter(DELIMITER)
            .quote_style(QuoteStyle::Necessary)
            .terminator(Terminator::Any(b'\n'))
            .has_headers(false)
            .from_writer(file.reopen()?);

        let mut rows = 0;
        for record in records {
            writer.write_record(&record)?;
            rows += 1;
        }
        let mut inner = writer
            .into_inner()
            .map_err(|e| crate::error::Error::Io(e.into_error()))?;
        inner.flush()?;

        Ok(Self { file, rows })
    }

    /// Rows written
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Path as text, for the store's COPY statement
    pub fn path_str(&self) -> String {
        self.file.path().to_string_lossy().into_owned()
    }

    /// COPY options matching this encoding
    pub fn copy_options(&self) -> String {
        format!(
            "(FORMAT CSV, HEADER false, DELIMITER '{}', QUOTE '\"', ESCAPE '\"', NULLSTR '')",
            DELIMITER as char
        )
    }
}
