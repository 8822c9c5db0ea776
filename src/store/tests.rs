use super::*;
use crate::types::{CellValue, ColumnSchema, ColumnType, Tier, TypedBatch};
use chrono::NaiveDate;
use pretty_assertions::assert_eq;

fn store() -> Store {
    let store = Store::open_in_memory().unwrap();
    store.bootstrap().unwrap();
    store
}

#[test]
fn test_quote_ident() {
    assert_eq!(quote_ident("id_venda"), "\"id_venda\"");
    assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
    assert_eq!(quote_literal("it's"), "'it''s'");
    assert_eq!(qualified("silver", "x"), "\"silver\".\"x\"");
}

#[test]
fn test_bootstrap_is_repeatable() {
    let store = store();
    store.bootstrap().unwrap();
    assert!(store.relation_exists(CONTROL_SCHEMA, "etl_watermark").unwrap());
}

#[test]
fn test_raw_capture_roundtrip() {
    let store = store();
    store.ensure_raw_table("t_202511_270").unwrap();
    assert_eq!(store.raw_max_line_no("t_202511_270").unwrap(), 0);

    let lines = ["junk", "Conta;Cliente;", "1;\"João\"\twith tab;", ""];
    let wire = WireFile::from_raw_lines(1, lines.iter().copied(), "202511_270.csv", "b-1").unwrap();
    assert_eq!(wire.rows(), 4);
    assert_eq!(store.copy_raw_lines("t_202511_270", &wire).unwrap(), 4);

    assert_eq!(store.raw_max_line_no("t_202511_270").unwrap(), 4);
    assert!(store.raw_has_file("t_202511_270", "202511_270.csv").unwrap());
    assert!(!store.raw_has_file("t_202511_270", "other.csv").unwrap());

    let page = store.read_raw_page("t_202511_270", 1, 4, 2).unwrap();
    assert_eq!(
        page,
        vec![
            RawLine {
                line_no: 2,
                raw_line: "Conta;Cliente;".to_string()
            },
            RawLine {
                line_no: 3,
                raw_line: "1;\"João\"\twith tab;".to_string()
            },
        ]
    );
    let rest = store.read_raw_page("t_202511_270", 3, 4, 10).unwrap();
    assert_eq!(rest.len(), 1);
    assert_eq!(rest[0].raw_line, "");
}

#[test]
fn test_raw_spans_per_capture_batch() {
    let store = store();
    store.ensure_raw_table("t_pos").unwrap();
    let first = WireFile::from_raw_lines(1, ["a", "b", "c"], "pos.csv", "b-1").unwrap();
    store.copy_raw_lines("t_pos", &first).unwrap();
    let second = WireFile::from_raw_lines(4, ["d", "e"], "pos.csv", "b-2").unwrap();
    store.copy_raw_lines("t_pos", &second).unwrap();

    let spans = store.raw_spans("t_pos", 0).unwrap();
    assert_eq!(
        spans,
        vec![
            RawSpan {
                batch_id: "b-1".into(),
                source_file: "pos.csv".into(),
                first_line_no: 1,
                last_line_no: 3
            },
            RawSpan {
                batch_id: "b-2".into(),
                source_file: "pos.csv".into(),
                first_line_no: 4,
                last_line_no: 5
            },
        ]
    );
    assert_eq!(store.raw_spans("t_pos", 3).unwrap().len(), 1);
    assert!(store.raw_spans("t_pos", 5).unwrap().is_empty());

    // Pages never cross the end of a span
    let page = store.read_raw_page("t_pos", 0, 3, 10).unwrap();
    assert_eq!(page.last().unwrap().raw_line, "c");
}

#[test]
fn test_list_tables() {
    let store = store();
    store.ensure_raw_table("t_b").unwrap();
    store.ensure_raw_table("t_a").unwrap();
    assert_eq!(
        store.list_tables(Tier::Bronze.schema()).unwrap(),
        vec!["t_a".to_string(), "t_b".to_string()]
    );
    assert!(store.list_tables(Tier::Gold.schema()).unwrap().is_empty());
}

#[test]
fn test_watermarks() {
    let store = store();
    assert_eq!(store.get_watermark("novaxs_270", "t_1").unwrap(), None);
    store.set_watermark("novaxs_270", "t_1", 10).unwrap();
    store.set_watermark("novaxs_270", "t_1", 25).unwrap();
    assert_eq!(store.get_watermark("novaxs_270", "t_1").unwrap(), Some(25));
    assert_eq!(store.get_watermark("novaxs_664", "t_1").unwrap(), None);
}

#[test]
fn test_transaction_rolls_back() {
    let store = store();
    store.ensure_raw_table("t_1").unwrap();
    let result: crate::error::Result<()> = store.transaction(|conn| {
        conn.execute_batch(
            "INSERT INTO bronze.t_1 (line_no, raw_line, source_file, batch_id) VALUES (1, 'x', 'f', 'b')",
        )?;
        Err(crate::error::Error::Other("boom".into()))
    });
    assert!(result.is_err());
    assert_eq!(store.count_rows("bronze", "t_1").unwrap(), 0);
}

#[test]
fn test_stage_and_read_typed() {
    let store = store();
    let columns = vec![
        ColumnSchema::new("id", ColumnType::Integer),
        ColumnSchema::new("dia", ColumnType::Date),
        ColumnSchema::new("valor", ColumnType::Decimal),
        ColumnSchema::new("nome", ColumnType::Text),
    ];
    store
        .ensure_silver_table("vendas", &columns, &["id".to_string()])
        .unwrap();

    let mut batch = TypedBatch::new("t_1", columns.clone());
    batch.push_row(vec![
        CellValue::Integer(1),
        CellValue::Date(NaiveDate::from_ymd_opt(2025, 11, 3).unwrap()),
        CellValue::Decimal(1234.56),
        CellValue::Text("São Paulo".into()),
    ]);
    batch.push_row(vec![CellValue::Integer(2)]);

    let wire = WireFile::from_batch(&batch).unwrap();
    assert_eq!(store.stage("_stage_vendas", &columns, &wire).unwrap(), 2);
    store
        .connection()
        .execute_batch(
            "INSERT INTO silver.vendas (id, dia, valor, nome, source_lineage)
             SELECT id, dia, valor, nome, 't_1' FROM _stage_vendas ORDER BY _ord",
        )
        .unwrap();
    store.drop_stage("_stage_vendas").unwrap();

    let read = store.read_typed("silver", "vendas", &columns, None).unwrap();
    assert_eq!(read.num_rows(), 2);
    assert_eq!(read.rows[0], batch.rows[0]);
    assert_eq!(
        read.rows[1],
        vec![
            CellValue::Integer(2),
            CellValue::Null,
            CellValue::Null,
            CellValue::Null
        ]
    );

    let filtered = store
        .read_typed("silver", "vendas", &columns, Some(("nome", "são")))
        .unwrap();
    assert_eq!(filtered.num_rows(), 1);
}

#[test]
fn test_relation_columns_missing() {
    let store = store();
    let err = store.relation_columns("silver", "nope").unwrap_err();
    assert!(matches!(err, crate::error::Error::RelationNotFound { .. }));
}
