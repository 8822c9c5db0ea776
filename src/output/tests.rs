//! Tests for output module

use super::*;
use crate::store::Store;
use crate::types::{CellValue, ColumnSchema, ColumnType, Tier, TypedBatch};
use arrow::array::{Array, Decimal128Array, Int64Array, StringArray, TimestampMicrosecondArray};
use arrow::datatypes::{DataType, TimeUnit};
use chrono::{NaiveDate, NaiveTime};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use std::fs::File;
use std::path::Path;
use tempfile::tempdir;

fn sample_batch() -> TypedBatch {
    let mut batch = TypedBatch::new(
        "vendas",
        vec![
            ColumnSchema::new("id_venda", ColumnType::Integer),
            ColumnSchema::new("cliente", ColumnType::Text),
            ColumnSchema::new("vlr_total", ColumnType::Decimal),
            ColumnSchema::new("dt_venda", ColumnType::Date),
            ColumnSchema::new("hr_venda", ColumnType::Time),
            ColumnSchema::new("criado", ColumnType::Datetime),
        ],
    );
    let day = NaiveDate::from_ymd_opt(2025, 11, 3).unwrap();
    batch.push_row(vec![
        CellValue::Integer(1),
        CellValue::Text("João".into()),
        CellValue::Decimal(1234.56),
        CellValue::Date(day),
        CellValue::Time(NaiveTime::from_hms_opt(14, 22, 10).unwrap()),
        CellValue::Datetime(day.and_hms_opt(14, 22, 10).unwrap()),
    ]);
    batch.push_row(vec![CellValue::Integer(2)]);
    batch
}

fn read_back(path: &Path) -> arrow::record_batch::RecordBatch {
    let file = File::open(path).unwrap();
    let mut reader = ParquetRecordBatchReaderBuilder::try_new(file)
        .unwrap()
        .build()
        .unwrap();
    reader.next().unwrap().unwrap()
}

// ============================================================================
// Schema Tests
// ============================================================================

#[test]
fn test_arrow_types() {
    let mut decimal = ColumnSchema::new("v", ColumnType::Decimal);
    decimal.scale = 4;
    assert_eq!(arrow_type(&decimal), DataType::Decimal128(18, 4));
    assert_eq!(
        arrow_type(&ColumnSchema::new("t", ColumnType::Time)),
        DataType::Time64(TimeUnit::Microsecond)
    );
    assert_eq!(
        arrow_type(&ColumnSchema::new("d", ColumnType::Datetime)),
        DataType::Timestamp(TimeUnit::Microsecond, None)
    );
    assert_eq!(arrow_type(&ColumnSchema::new("d", ColumnType::Date)), DataType::Date32);
}

#[test]
fn test_column_from_sql() {
    let decimal = column_from_sql("vlr", "DECIMAL(18,3)");
    assert_eq!(decimal.column_type, ColumnType::Decimal);
    assert_eq!(decimal.scale, 3);
    assert_eq!(column_from_sql("c", "TIMESTAMP").column_type, ColumnType::Datetime);
    assert_eq!(column_from_sql("c", "BIGINT").column_type, ColumnType::Integer);
    assert_eq!(column_from_sql("c", "VARCHAR").column_type, ColumnType::Text);
    assert_eq!(column_from_sql("c", "BOOLEAN").column_type, ColumnType::Text);
}

#[test]
fn test_batch_to_arrow() {
    let record_batch = batch_to_arrow(&sample_batch()).unwrap();
    assert_eq!(record_batch.num_rows(), 2);
    assert_eq!(record_batch.num_columns(), 6);

    let values = record_batch
        .column(2)
        .as_any()
        .downcast_ref::<Decimal128Array>()
        .unwrap();
    assert_eq!(values.value(0), 123_456);
    assert!(values.is_null(1));

    let created = record_batch
        .column(5)
        .as_any()
        .downcast_ref::<TimestampMicrosecondArray>()
        .unwrap();
    assert_eq!(created.value(0), 1_762_179_730_000_000);
}

// ============================================================================
// Parquet Writer Tests
// ============================================================================

#[test]
fn test_parquet_writer_config_default() {
    let config = ParquetWriterConfig::default();
    assert_eq!(config.row_group_size(), 1024 * 1024);
    assert_eq!(ParquetWriterConfig::new().with_row_group_size(10).row_group_size(), 10);
}

#[test]
fn test_write_batch_to_parquet() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("vendas.parquet");
    let rows = write_batch_to_parquet(&path, &sample_batch(), None).unwrap();
    assert_eq!(rows, 2);

    let read = read_back(&path);
    assert_eq!(read.num_rows(), 2);
    let names = read
        .column(1)
        .as_any()
        .downcast_ref::<StringArray>()
        .unwrap();
    assert_eq!(names.value(0), "João");
    assert!(names.is_null(1));
}

#[test]
fn test_writer_rejects_other_layout() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("x.parquet");
    let columns = vec![ColumnSchema::new("a", ColumnType::Text)];
    let mut writer = ParquetWriter::new(&path, &columns, &ParquetWriterConfig::new().uncompressed()).unwrap();
    assert!(writer.write(&sample_batch()).is_err());
    assert_eq!(writer.rows_written(), 0);
}

// ============================================================================
// Export Tests
// ============================================================================

#[test]
fn test_build_partitioned_path() {
    let path = build_partitioned_path(
        Path::new("ods"),
        "vendas",
        NaiveDate::from_ymd_opt(2025, 12, 14).unwrap(),
    );
    assert_eq!(
        path,
        Path::new("ods/vendas/load_date=2025-12-14/vendas.parquet")
    );
}

#[test]
fn test_export_relation() {
    let store = Store::open_in_memory().unwrap();
    store.bootstrap().unwrap();
    let batch = sample_batch();
    store
        .ensure_gold_table("vendas", &batch.columns, &["id_venda".to_string()])
        .unwrap();
    crate::tier::TierLoader::upsert(&store, Tier::Gold, "vendas", vec!["id_venda".to_string()])
        .load_batch(&batch)
        .unwrap();

    let dir = tempdir().unwrap();
    let day = NaiveDate::from_ymd_opt(2025, 12, 14).unwrap();
    let outcome = export_relation(
        &store,
        Tier::Gold,
        "vendas",
        dir.path(),
        day,
        &ParquetWriterConfig::default(),
    )
    .unwrap();
    assert_eq!(outcome.relation, "gold.vendas");
    assert_eq!(outcome.rows, 2);
    assert!(outcome.path.ends_with("vendas/load_date=2025-12-14/vendas.parquet"));

    let read = read_back(&outcome.path);
    // key, attributes, last_updated_at, freshness_source
    assert_eq!(read.num_columns(), 8);
    let ids = read
        .column(0)
        .as_any()
        .downcast_ref::<Int64Array>()
        .unwrap();
    let mut ids: Vec<i64> = ids.iter().flatten().collect();
    ids.sort_unstable();
    assert_eq!(ids, vec![1, 2]);

    let all = export_tier(&store, Tier::Gold, dir.path(), day, &ParquetWriterConfig::default()).unwrap();
    assert_eq!(all.len(), 1);
}
