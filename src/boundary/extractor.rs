//! Header and stop-marker matching

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

const BOM: char = '\u{feff}';

/// Strip a leading byte-order mark, if any
pub fn strip_bom(line: &str) -> &str {
    line.strip_prefix(BOM).unwrap_or(line)
}

/// Where the table starts and where it ends inside a raw export
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Boundary {
    /// Literal prefix of the header line
    pub header_prefix: String,

    /// Literal prefixes of the first line after the table (matched on trimmed content)
    #[serde(default)]
    pub stop_markers: Vec<String>,
}

impl Boundary {
    /// Create a boundary from a header prefix and stop markers
    pub fn new(header_prefix: impl Into<String>, stop_markers: Vec<String>) -> Self {
        Self {
            header_prefix: header_prefix.into(),
            stop_markers,
        }
    }

    /// Whether the line is the table header
    pub fn is_header(&self, line: &str) -> bool {
        strip_bom(line).starts_with(&self.header_prefix)
    }

    /// Whether the line terminates the table.
    ///
    /// Markers are matched as prefixes of the line content with surrounding
    /// whitespace and any byte-order mark removed, so indented footers and
    /// CRLF line ends still stop the table.
    pub fn is_stop(&self, line: &str) -> bool {
        let trimmed = strip_bom(line.trim()).trim_start();
        self.stop_markers
            .iter()
            .any(|marker| trimmed.starts_with(marker.as_str()))
    }

    /// Position of the first header line, if any
    pub fn find_header<S: AsRef<str>>(&self, lines: &[S]) -> Option<usize> {
        lines.iter().position(|line| self.is_header(line.as_ref()))
    }

    /// Extract `[header, data...]` from an ordered sequence of raw lines.
    ///
    /// Blank lines are never part of the output. Lines are returned verbatim.
    ///
    /// # Errors
    ///
    /// `BoundaryNotFound` when no line starts with the header prefix,
    /// `EmptyTable` when the header is followed by no data line.
    pub fn extract<'a, S: AsRef<str>>(&self, table: &str, lines: &'a [S]) -> Result<Vec<&'a str>> {
        let start = self
            .find_header(lines)
            .ok_or_else(|| Error::boundary_not_found(table, &self.header_prefix))?;

        let mut selected: Vec<&'a str> = Vec::new();
        for line in &lines[start..] {
            let line = line.as_ref();
            if line.trim().is_empty() {
                continue;
            }
            if !selected.is_empty() && self.is_stop(line) {
                break;
            }
            selected.push(line);
        }

        if selected.len() <= 1 {
            return Err(Error::empty_table(table));
        }

        tracing::debug!(
            table = table,
            header_line = start,
            data_lines = selected.len() - 1,
            "Extracted table boundary"
        );

        Ok(selected)
    }
}
