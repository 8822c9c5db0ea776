//! Typed batch to Arrow conversion

use crate::error::{Error, Result};
use crate::types::{CellValue, ColumnSchema, ColumnType, TypedBatch};
use arrow::array::{
    ArrayRef, Date32Array, Decimal128Array, Int64Array, StringArray, Time64MicrosecondArray,
    TimestampMicrosecondArray,
};
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::record_batch::RecordBatch;
use chrono::{NaiveDate, Timelike};
use std::sync::Arc;

/// Precision of every decimal column
pub const DECIMAL_PRECISION: u8 = 18;

/// Arrow type for a column
pub fn arrow_type(column: &ColumnSchema) -> DataType {
    match column.column_type {
        ColumnType::Text => DataType::Utf8,
        ColumnType::Integer => DataType::Int64,
        ColumnType::Decimal => DataType::Decimal128(DECIMAL_PRECISION, column.scale as i8),
        ColumnType::Date => DataType::Date32,
        ColumnType::Time => DataType::Time64(TimeUnit::Microsecond),
        ColumnType::Datetime => DataType::Timestamp(TimeUnit::Microsecond, None),
    }
}

/// Arrow schema for a set of columns; every field is nullable
pub fn arrow_schema(columns: &[ColumnSchema]) -> Schema {
    Schema::new(
        columns
            .iter()
            .map(|c| Field::new(&c.name, arrow_type(c), true))
            .collect::<Vec<_>>(),
    )
}

/// Column type for a store data type (`DECIMAL(18,2)`, `TIMESTAMP`, ...)
pub fn column_from_sql(name: &str, data_type: &str) -> ColumnSchema {
    let upper = data_type.to_ascii_uppercase();
    let column_type = match upper.as_str() {
        "DATE" => ColumnType::Date,
        "TIME" => ColumnType::Time,
        "TIMESTAMP" | "TIMESTAMP WITH TIME ZONE" => ColumnType::Datetime,
        "BIGINT" | "INTEGER" | "SMALLINT" | "TINYINT" => ColumnType::Integer,
        t if t.starts_with("DECIMAL") => ColumnType::Decimal,
        _ => ColumnType::Text,
    };

    let mut column = ColumnSchema::new(name, column_type);
    if column_type == ColumnType::Decimal {
        if let Some(scale) = upper
            .trim_end_matches(')')
            .split(',')
            .nth(1)
            .and_then(|s| s.trim().parse().ok())
        {
            column.scale = scale;
        }
    }
    column
}

/// Convert a typed batch to an Arrow record batch
pub fn batch_to_arrow(batch: &TypedBatch) -> Result<RecordBatch> {
    let schema = Arc::new(arrow_schema(&batch.columns));
    let arrays = batch
        .columns
        .iter()
        .enumerate()
        .map(|(idx, column)| build_array(batch, idx, column))
        .collect::<Result<Vec<_>>>()?;

    RecordBatch::try_new(schema, arrays).map_err(Error::from)
}

fn build_array(batch: &TypedBatch, idx: usize, column: &ColumnSchema) -> Result<ArrayRef> {
    let cells = batch.rows.iter().map(|row| &row[idx]);
    let array: ArrayRef = match column.column_type {
        ColumnType::Text => Arc::new(
            cells
                .map(|c| match c {
                    CellValue::Null => None,
                    other => Some(other.to_wire()),
                })
                .collect::<StringArray>(),
        ),
        ColumnType::Integer => Arc::new(
            cells
                .map(|c| match c {
                    CellValue::Integer(i) => Some(*i),
                    CellValue::Decimal(d) => Some(d.trunc() as i64),
                    _ => None,
                })
                .collect::<Int64Array>(),
        ),
        ColumnType::Decimal => {
            let factor = 10f64.powi(column.scale as i32);
            Arc::new(
                cells
                    .map(|c| c.as_f64().map(|v| (v * factor).round() as i128))
                    .collect::<Decimal128Array>()
                    .with_precision_and_scale(DECIMAL_PRECISION, column.scale as i8)?,
            )
        }
        ColumnType::Date => {
            let epoch = NaiveDate::from_ymd_opt(1970, 1, 1)
                .ok_or_else(|| Error::output("invalid epoch"))?;
            Arc::new(
                cells
                    .map(|c| match c {
                        CellValue::Date(d) => Some((*d - epoch).num_days() as i32),
                        CellValue::Datetime(dt) => Some((dt.date() - epoch).num_days() as i32),
                        _ => None,
                    })
                    .collect::<Date32Array>(),
            )
        }
        ColumnType::Time => Arc::new(
            cells
                .map(|c| match c {
                    CellValue::Time(t) => Some(
                        i64::from(t.num_seconds_from_midnight()) * 1_000_000
                            + i64::from(t.nanosecond() / 1_000),
                    ),
                    _ => None,
                })
                .collect::<Time64MicrosecondArray>(),
        ),
        ColumnType::Datetime => Arc::new(
            cells
                .map(|c| c.as_datetime().map(|dt| dt.and_utc().timestamp_micros()))
                .collect::<TimestampMicrosecondArray>(),
        ),
    };
    Ok(array)
}
