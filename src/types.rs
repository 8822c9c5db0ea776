//! Common types used throughout tierline
//!
//! This module contains the typed cell and batch representations that flow
//! between the normalizer, the loaders and the Parquet exporter.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Column Types
// ============================================================================

/// Logical type of a column in the normalized and consolidated tiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    /// Trimmed text
    #[default]
    Text,
    /// Calendar date
    Date,
    /// Date and time without timezone
    Datetime,
    /// Time of day
    Time,
    /// Fixed-scale decimal (locale aware on input)
    Decimal,
    /// 64-bit integer (coerced through a decimal intermediate)
    Integer,
}

impl ColumnType {
    /// SQL type used for this column in the store
    pub fn sql_type(self, scale: u32) -> String {
        match self {
            ColumnType::Text => "VARCHAR".to_string(),
            ColumnType::Date => "DATE".to_string(),
            ColumnType::Datetime => "TIMESTAMP".to_string(),
            ColumnType::Time => "TIME".to_string(),
            ColumnType::Decimal => format!("DECIMAL(18,{scale})"),
            ColumnType::Integer => "BIGINT".to_string(),
        }
    }

    /// Whether values of this type are numeric
    pub fn is_numeric(self) -> bool {
        matches!(self, ColumnType::Decimal | ColumnType::Integer)
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColumnType::Text => "text",
            ColumnType::Date => "date",
            ColumnType::Datetime => "datetime",
            ColumnType::Time => "time",
            ColumnType::Decimal => "decimal",
            ColumnType::Integer => "integer",
        };
        f.write_str(name)
    }
}

// ============================================================================
// Cell Values
// ============================================================================

/// A single typed cell
#[derive(Debug, Clone, PartialEq, Default)]
pub enum CellValue {
    /// Absent / unparseable value
    #[default]
    Null,
    Text(String),
    Integer(i64),
    Decimal(f64),
    Date(NaiveDate),
    Time(NaiveTime),
    Datetime(NaiveDateTime),
}

impl CellValue {
    /// Check whether the cell is null
    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }

    /// Encode the value for the bulk-load wire format (empty string = null)
    pub fn to_wire(&self) -> String {
        match self {
            CellValue::Null => String::new(),
            CellValue::Text(s) => s.clone(),
            CellValue::Integer(i) => i.to_string(),
            CellValue::Decimal(d) => format_decimal(*d),
            CellValue::Date(d) => d.format("%Y-%m-%d").to_string(),
            CellValue::Time(t) => t.format("%H:%M:%S%.6f").to_string(),
            CellValue::Datetime(dt) => dt.format("%Y-%m-%d %H:%M:%S%.6f").to_string(),
        }
    }

    /// Borrow the text content, if this is a text cell
    pub fn as_text(&self) -> Option<&str> {
        match self {
            CellValue::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Numeric view of the cell (integers and decimals)
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CellValue::Integer(i) => Some(*i as f64),
            CellValue::Decimal(d) => Some(*d),
            _ => None,
        }
    }

    /// Datetime view of the cell (dates are promoted to midnight)
    pub fn as_datetime(&self) -> Option<NaiveDateTime> {
        match self {
            CellValue::Datetime(dt) => Some(*dt),
            CellValue::Date(d) => d.and_hms_opt(0, 0, 0),
            _ => None,
        }
    }

    /// Parse a value read back from the store as text into the given type
    pub fn from_store_text(text: Option<String>, column_type: ColumnType) -> Self {
        let Some(text) = text else {
            return CellValue::Null;
        };
        match column_type {
            ColumnType::Text => CellValue::Text(text),
            ColumnType::Integer => text.parse().map_or(CellValue::Null, CellValue::Integer),
            ColumnType::Decimal => text.parse().map_or(CellValue::Null, CellValue::Decimal),
            ColumnType::Date => NaiveDate::parse_from_str(&text, "%Y-%m-%d")
                .map_or(CellValue::Null, CellValue::Date),
            ColumnType::Time => NaiveTime::parse_from_str(&text, "%H:%M:%S%.f")
                .map_or(CellValue::Null, CellValue::Time),
            ColumnType::Datetime => NaiveDateTime::parse_from_str(&text, "%Y-%m-%d %H:%M:%S%.f")
                .map_or(CellValue::Null, CellValue::Datetime),
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Null => f.write_str("NULL"),
            other => f.write_str(&other.to_wire()),
        }
    }
}

/// Format a decimal without exponent notation
fn format_decimal(value: f64) -> String {
    let formatted = format!("{value:.6}");
    let trimmed = formatted.trim_end_matches('0');
    trimmed.strip_suffix('.').unwrap_or(trimmed).to_string()
}

// ============================================================================
// Schemas and Batches
// ============================================================================

/// A column declaration for a typed batch or a store relation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSchema {
    /// Canonical column name
    pub name: String,
    /// Logical type
    #[serde(rename = "type")]
    pub column_type: ColumnType,
    /// Decimal scale (ignored for non-decimal columns)
    #[serde(default = "default_scale")]
    pub scale: u32,
}

pub(crate) fn default_scale() -> u32 {
    2
}

impl ColumnSchema {
    /// Create a column declaration with the default decimal scale
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            scale: default_scale(),
        }
    }

    /// SQL type for this column
    pub fn sql_type(&self) -> String {
        self.column_type.sql_type(self.scale)
    }
}

/// A batch of typed rows sharing one schema
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TypedBatch {
    /// Relation the rows were derived from (raw table or source relation)
    pub lineage: String,
    /// Column declarations, in row order
    pub columns: Vec<ColumnSchema>,
    /// Rows; each row has exactly `columns.len()` cells
    pub rows: Vec<Vec<CellValue>>,
}

impl TypedBatch {
    /// Create an empty batch
    pub fn new(lineage: impl Into<String>, columns: Vec<ColumnSchema>) -> Self {
        Self {
            lineage: lineage.into(),
            columns,
            rows: Vec::new(),
        }
    }

    /// Number of rows
    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    /// Whether the batch holds no rows
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of a column by name
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Cell at (row, column name)
    pub fn value(&self, row: usize, column: &str) -> Option<&CellValue> {
        let idx = self.column_index(column)?;
        self.rows.get(row).and_then(|r| r.get(idx))
    }

    /// Append a row, padding or truncating it to the schema width
    pub fn push_row(&mut self, mut row: Vec<CellValue>) {
        row.resize(self.columns.len(), CellValue::Null);
        self.rows.push(row);
    }
}

// ============================================================================
// Tiers
// ============================================================================

/// Quality tier of a relation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// Line-level raw capture
    Bronze,
    /// Typed per-source records
    Silver,
    /// Consolidated facts
    Gold,
}

impl Tier {
    /// Schema name used for this tier in the store
    pub fn schema(self) -> &'static str {
        match self {
            Tier::Bronze => "bronze",
            Tier::Silver => "silver",
            Tier::Gold => "gold",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.schema())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_encoding() {
        assert_eq!(CellValue::Null.to_wire(), "");
        assert_eq!(CellValue::Decimal(1234.56).to_wire(), "1234.56");
        assert_eq!(CellValue::Decimal(0.0).to_wire(), "0");
        assert_eq!(CellValue::Integer(-7).to_wire(), "-7");
        let date = NaiveDate::from_ymd_opt(2025, 11, 3).unwrap();
        assert_eq!(CellValue::Date(date).to_wire(), "2025-11-03");
        let dt = date.and_hms_micro_opt(8, 5, 1, 250).unwrap();
        assert_eq!(
            CellValue::Datetime(dt).to_wire(),
            "2025-11-03 08:05:01.000250"
        );
    }

    #[test]
    fn test_from_store_text() {
        assert_eq!(
            CellValue::from_store_text(Some("2025-01-31".into()), ColumnType::Date),
            CellValue::Date(NaiveDate::from_ymd_opt(2025, 1, 31).unwrap())
        );
        assert_eq!(
            CellValue::from_store_text(Some("14:30:00".into()), ColumnType::Time),
            CellValue::Time(NaiveTime::from_hms_opt(14, 30, 0).unwrap())
        );
        assert_eq!(
            CellValue::from_store_text(None, ColumnType::Integer),
            CellValue::Null
        );
    }

    #[test]
    fn test_batch_push_row_pads() {
        let mut batch = TypedBatch::new(
            "t_1",
            vec![
                ColumnSchema::new("a", ColumnType::Text),
                ColumnSchema::new("b", ColumnType::Integer),
            ],
        );
        batch.push_row(vec![CellValue::Text("x".into())]);
        assert_eq!(batch.value(0, "b"), Some(&CellValue::Null));
        assert_eq!(batch.num_rows(), 1);
    }

    #[test]
    fn test_sql_types() {
        assert_eq!(ColumnType::Decimal.sql_type(2), "DECIMAL(18,2)");
        assert_eq!(ColumnType::Datetime.sql_type(2), "TIMESTAMP");
        assert_eq!(Tier::Silver.schema(), "silver");
    }
}
