//! Integration tests for the full pipeline
//!
//! Tests the end-to-end flow: export files → bronze lines → silver rows →
//! gold facts → Parquet output, against an in-memory store.

use chrono::NaiveDate;
use parquet::file::reader::{FileReader, SerializedFileReader};
use std::fs::{self, File};
use std::path::Path;
use tierline::config::ProjectDefinition;
use tierline::output::{export_relation, ParquetWriterConfig};
use tierline::pipeline::{Outcome, Pipeline, RunOptions};
use tierline::store::Store;
use tierline::tier::TierLoader;
use tierline::{load_project_from_str, CellValue, ColumnSchema, ColumnType, Tier, TypedBatch};

const PROJECT: &str = r#"
name: thermas
store: { path: ":memory:" }
input: { directory: "__DIR__" }
sources:
  - novaxs_270
"#;

const NOVAXS_EXPORT: &str = "\
Relatório de Vendas;;;
Período: 01/11/2025 a 30/11/2025;;;
Conta;Autorização;Cliente;Email;Criado;Produto;Qtd;Un.;Total;Status
1;A1;João;QA@Example.com;03/11/2025 14:22:10;Passaporte;2;50,00;100,00;Pago
1;A1;João;QA@Example.com;03/11/2025 14:22:10;Estacionamento;1;20,00;20,00;Pago
2;A2;Maria;teste@thermasdamata.com.br;04/11/2025 09:00:00;Passaporte;1;1.234,56;1.234,56;Pago
\"\";\"\";
\"Total Geral\";1.354,56
Produtos/Combos vendidos
Produto;Qtd;Total
Passaporte;3;1.334,56
";

fn setup(dir: &Path) -> (ProjectDefinition, Store) {
    fs::write(dir.join("202511_270.csv"), NOVAXS_EXPORT).unwrap();
    let project =
        load_project_from_str(&PROJECT.replace("__DIR__", &dir.display().to_string())).unwrap();
    let store = Store::open_in_memory().unwrap();
    store.bootstrap().unwrap();
    (project, store)
}

// ============================================================================
// Built-in Source Tests
// ============================================================================

#[tokio::test]
async fn test_novaxs_export_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let (project, store) = setup(dir.path());

    let report = Pipeline::new(&project, &store).run().await.unwrap();

    assert!(!report.has_failures());
    assert_eq!(report.capture.as_ref().unwrap().total_lines(), 11);
    assert_eq!(report.sources.len(), 1);
    assert_eq!(report.sources[0].target, "novaxs_vendas");
    assert_eq!(report.inserted(), 3);
    assert_eq!(store.count_rows("bronze", "t_202511_270").unwrap(), 11);
    assert_eq!(store.count_rows("silver", "novaxs_vendas").unwrap(), 3);

    let (email, dt_venda, total, teste): (String, String, f64, String) = store
        .connection()
        .query_row(
            "SELECT email, CAST(dt_venda AS VARCHAR), CAST(vlr_total AS DOUBLE), teste \
             FROM silver.novaxs_vendas WHERE id_venda = '2'",
            [],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
        )
        .unwrap();
    assert_eq!(email, "teste@thermasdamata.com.br");
    assert_eq!(dt_venda, "2025-11-04");
    assert!((total - 1234.56).abs() < 1e-9);
    assert_eq!(teste, "SIM");

    let lineage: String = store
        .connection()
        .query_row(
            "SELECT DISTINCT source_lineage FROM silver.novaxs_vendas",
            [],
            |r| r.get(0),
        )
        .unwrap();
    assert_eq!(lineage, "t_202511_270");
}

#[tokio::test]
async fn test_run_twice_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let (project, store) = setup(dir.path());

    Pipeline::new(&project, &store).run().await.unwrap();
    let second = Pipeline::new(&project, &store).run().await.unwrap();
    assert_eq!(second.inserted(), 0);
    assert!(matches!(
        second.sources[0].tables[0].outcome,
        Outcome::Skipped { .. }
    ));

    // Recapture plus a full pass re-reads everything and still adds nothing
    let options = RunOptions::new().with_force_capture(true).with_full(true);
    let forced = Pipeline::new(&project, &store)
        .with_options(options)
        .run()
        .await
        .unwrap();
    assert!(!forced.has_failures());
    assert_eq!(forced.inserted(), 0);
    assert_eq!(store.count_rows("bronze", "t_202511_270").unwrap(), 22);
    assert_eq!(store.count_rows("silver", "novaxs_vendas").unwrap(), 3);
}

// ============================================================================
// Tier Loader Tests
// ============================================================================

#[test]
fn test_sales_key_inserted_once() {
    let store = Store::open_in_memory().unwrap();
    store.bootstrap().unwrap();
    let columns = vec![
        ColumnSchema::new("id_venda", ColumnType::Text),
        ColumnSchema::new("cliente", ColumnType::Text),
        ColumnSchema::new("vlr_total", ColumnType::Decimal),
    ];
    store
        .ensure_silver_table("vendas", &columns, &["id_venda".to_string()])
        .unwrap();

    let mut batch = TypedBatch::new("t_202511_270", columns);
    batch.push_row(vec![
        CellValue::Text("1".into()),
        CellValue::Text("João".into()),
        CellValue::Decimal(1234.56),
    ]);

    let mut loader = TierLoader::insert_absent(&store, Tier::Silver, "vendas", vec!["id_venda".into()]);
    assert_eq!(loader.load_batch(&batch).unwrap(), 1);
    assert_eq!(loader.load_batch(&batch).unwrap(), 0);
    assert_eq!(loader.stats().already_present(), 1);
    assert_eq!(store.count_rows("silver", "vendas").unwrap(), 1);
}

// ============================================================================
// Parquet Export Tests
// ============================================================================

#[tokio::test]
async fn test_export_silver_relation() {
    let dir = tempfile::tempdir().unwrap();
    let (project, store) = setup(dir.path());
    Pipeline::new(&project, &store).run().await.unwrap();

    let out = tempfile::tempdir().unwrap();
    let load_date = NaiveDate::from_ymd_opt(2025, 11, 30).unwrap();
    let outcome = export_relation(
        &store,
        Tier::Silver,
        "novaxs_vendas",
        out.path(),
        load_date,
        &ParquetWriterConfig::default(),
    )
    .unwrap();

    assert_eq!(outcome.rows, 3);
    assert_eq!(outcome.relation, "silver.novaxs_vendas");
    assert_eq!(
        outcome.path,
        out.path()
            .join("novaxs_vendas")
            .join("load_date=2025-11-30")
            .join("novaxs_vendas.parquet")
    );

    let reader = SerializedFileReader::new(File::open(&outcome.path).unwrap()).unwrap();
    assert_eq!(reader.metadata().file_metadata().num_rows(), 3);
}
