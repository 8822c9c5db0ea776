//! Tests for the tier loader

use super::*;
use crate::config::{load_source_from_str, NormalizeSettings};
use crate::error::Error;
use crate::normalize::{normalize_lines, NormalizePlan};
use crate::store::Store;
use crate::types::{CellValue, ColumnSchema, ColumnType, Tier, TypedBatch};
use chrono::NaiveDate;
use pretty_assertions::assert_eq;

fn store() -> Store {
    let store = Store::open_in_memory().unwrap();
    store.bootstrap().unwrap();
    store
}

fn columns() -> Vec<ColumnSchema> {
    vec![
        ColumnSchema::new("id_venda", ColumnType::Integer),
        ColumnSchema::new("produto", ColumnType::Text),
        ColumnSchema::new("vlr_total", ColumnType::Decimal),
    ]
}

fn key() -> Vec<String> {
    vec!["id_venda".to_string(), "produto".to_string()]
}

fn row(id: Option<i64>, produto: &str, valor: f64) -> Vec<CellValue> {
    vec![
        id.map_or(CellValue::Null, CellValue::Integer),
        CellValue::Text(produto.to_string()),
        CellValue::Decimal(valor),
    ]
}

fn batch(rows: Vec<Vec<CellValue>>) -> TypedBatch {
    let mut batch = TypedBatch::new("t_202511_270", columns());
    for r in rows {
        batch.push_row(r);
    }
    batch
}

#[test]
fn test_insert_absent_is_idempotent() {
    let store = store();
    store.ensure_silver_table("vendas", &columns(), &key()).unwrap();
    let mut loader = TierLoader::insert_absent(&store, Tier::Silver, "vendas", key());

    let first = batch(vec![row(Some(1), "A", 10.0), row(Some(2), "A", 20.0)]);
    assert_eq!(loader.load_batch(&first).unwrap(), 2);
    assert_eq!(loader.load_batch(&first).unwrap(), 0);

    let stats = loader.stats();
    assert_eq!(stats.offered, 4);
    assert_eq!(stats.inserted, 2);
    assert_eq!(stats.already_present(), 2);
    assert_eq!(store.count_rows("silver", "vendas").unwrap(), 2);
}

#[test]
fn test_present_keys_are_never_updated() {
    let store = store();
    store.ensure_silver_table("vendas", &columns(), &key()).unwrap();
    let mut loader = TierLoader::insert_absent(&store, Tier::Silver, "vendas", key());

    loader.load_batch(&batch(vec![row(Some(1), "A", 10.0)])).unwrap();
    let inserted = loader
        .load_batch(&batch(vec![row(Some(1), "A", 99.0), row(Some(1), "B", 5.0)]))
        .unwrap();
    assert_eq!(inserted, 1);

    let read = store.read_typed("silver", "vendas", &columns(), None).unwrap();
    let first = read
        .rows
        .iter()
        .find(|r| r[1] == CellValue::Text("A".into()))
        .unwrap();
    assert_eq!(first[2], CellValue::Decimal(10.0));
}

#[test]
fn test_duplicate_keys_in_batch_keep_first() {
    let store = store();
    store.ensure_silver_table("vendas", &columns(), &key()).unwrap();
    let mut loader = TierLoader::insert_absent(&store, Tier::Silver, "vendas", key());

    let inserted = loader
        .load_batch(&batch(vec![
            row(Some(7), "A", 1.0),
            row(Some(7), "A", 2.0),
            row(Some(7), "A", 3.0),
        ]))
        .unwrap();
    assert_eq!(inserted, 1);

    let read = store.read_typed("silver", "vendas", &columns(), None).unwrap();
    assert_eq!(read.rows, vec![row(Some(7), "A", 1.0)]);
}

#[test]
fn test_null_keys_are_skipped_and_counted() {
    let store = store();
    store.ensure_silver_table("vendas", &columns(), &key()).unwrap();
    let mut loader = TierLoader::insert_absent(&store, Tier::Silver, "vendas", key());

    let inserted = loader
        .load_batch(&batch(vec![row(None, "A", 1.0), row(Some(3), "A", 2.0)]))
        .unwrap();
    assert_eq!(inserted, 1);
    assert_eq!(loader.stats().null_key, 1);

    assert_eq!(loader.load_batch(&batch(vec![row(None, "A", 1.0)])).unwrap(), 0);
    assert_eq!(loader.stats().null_key, 2);
    assert_eq!(loader.stats().batches, 1);
}

#[test]
fn test_lineage_is_recorded() {
    let store = store();
    store.ensure_silver_table("vendas", &columns(), &key()).unwrap();
    let mut loader = TierLoader::insert_absent(&store, Tier::Silver, "vendas", key());
    loader.load_batch(&batch(vec![row(Some(1), "A", 1.0)])).unwrap();

    let lineage: String = store
        .connection()
        .query_row("SELECT source_lineage FROM silver.vendas", [], |r| r.get(0))
        .unwrap();
    assert_eq!(lineage, "t_202511_270");
}

#[test]
fn test_missing_relation_is_load_failure() {
    let store = store();
    let mut loader = TierLoader::insert_absent(&store, Tier::Silver, "nope", key());
    let err = loader.load_batch(&batch(vec![row(Some(1), "A", 1.0)])).unwrap_err();
    assert!(matches!(err, Error::LoadFailure { ref relation, .. } if relation == "silver.nope"));
}

#[test]
fn test_missing_key_column_is_load_failure() {
    let store = store();
    let mut loader =
        TierLoader::insert_absent(&store, Tier::Silver, "vendas", vec!["id_acesso".to_string()]);
    let err = loader.load_batch(&batch(vec![row(Some(1), "A", 1.0)])).unwrap_err();
    assert!(matches!(err, Error::LoadFailure { .. }));
}

#[test]
fn test_upsert_overwrites() {
    let store = store();
    let gold = vec![
        ColumnSchema::new("id", ColumnType::Integer),
        ColumnSchema::new("dia", ColumnType::Date),
        ColumnSchema::new("nome", ColumnType::Text),
    ];
    let key = vec!["id".to_string()];
    store.ensure_gold_table("fatos", &gold, &key).unwrap();
    let mut loader = TierLoader::upsert(&store, Tier::Gold, "fatos", key);

    let day = NaiveDate::from_ymd_opt(2025, 1, 2).unwrap();
    let mut first = TypedBatch::new("gold", gold.clone());
    first.push_row(vec![CellValue::Integer(1), CellValue::Date(day), CellValue::Text("a".into())]);
    assert_eq!(loader.load_batch(&first).unwrap(), 1);

    let mut second = TypedBatch::new("gold", gold.clone());
    second.push_row(vec![CellValue::Integer(1), CellValue::Null, CellValue::Text("b".into())]);
    second.push_row(vec![CellValue::Integer(2), CellValue::Date(day), CellValue::Null]);
    loader.load_batch(&second).unwrap();

    let mut read = store.read_typed("gold", "fatos", &gold, None).unwrap();
    read.rows.sort_by_key(|r| match r[0] {
        CellValue::Integer(i) => i,
        _ => 0,
    });
    assert_eq!(read.rows, second.rows);
}

#[test]
fn test_boundary_scenario_inserts_once() {
    let def = load_source_from_str(
        r#"
name: vendas
raw_tables: "_270$"
target: vendas
header_prefix: "Conta;Autorização;Cliente;"
stop_markers: ['"";"";']
natural_key: [id_venda]
columns:
  - { name: id_venda, aliases: [Conta], type: integer }
  - { name: autorizacao, aliases: ["Autorização"] }
  - { name: cliente, aliases: [Cliente] }
  - { name: vlr_total, aliases: [Total], type: decimal }
"#,
    )
    .unwrap();
    let lines = [
        "junk;junk",
        "Conta;Autorização;Cliente;Total",
        "1;A1;João;1.234,56",
        "\"\";\"\";",
        "more;junk",
    ];

    let store = store();
    store
        .ensure_silver_table(&def.target, &def.silver_schema(), &def.natural_key)
        .unwrap();
    let plan = NormalizePlan::compile(&def).unwrap();
    let settings = NormalizeSettings::default();

    let mut loader = TierLoader::insert_absent(&store, Tier::Silver, &def.target, def.natural_key.clone());
    let stats = normalize_lines(&plan, &def.boundary, def.delimiter, &settings, "t_1", lines, |b: TypedBatch| {
        loader.load_batch(&b)
    })
    .unwrap();
    assert_eq!(stats.inserted, 1);

    let mut again = TierLoader::insert_absent(&store, Tier::Silver, &def.target, def.natural_key.clone());
    let stats = normalize_lines(&plan, &def.boundary, def.delimiter, &settings, "t_1", lines, |b: TypedBatch| {
        again.load_batch(&b)
    })
    .unwrap();
    assert_eq!(stats.inserted, 0);
    assert_eq!(store.count_rows("silver", "vendas").unwrap(), 1);
}
