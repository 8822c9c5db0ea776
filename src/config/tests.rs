//! Tests for project and source configuration

use super::*;
use crate::types::ColumnType;
use pretty_assertions::assert_eq;

const INLINE_SOURCE: &str = r#"
name: vendas
raw_tables: "_270$"
target: vendas
header_prefix: "Conta;Autorização;Cliente;"
stop_markers: ['"";"";']
natural_key: [id_venda]
columns:
  - { name: id_venda, aliases: [Conta] }
  - { name: cliente, aliases: [Cliente] }
  - { name: vlr_total, aliases: [Total], type: decimal }
"#;

// ============================================================================
// Source Loading Tests
// ============================================================================

#[test]
fn test_load_minimal_source() {
    let def = load_source_from_str(INLINE_SOURCE).unwrap();
    assert_eq!(def.name, "vendas");
    assert_eq!(def.delimiter, ';');
    assert_eq!(def.boundary.header_prefix, "Conta;Autorização;Cliente;");
    assert_eq!(def.boundary.stop_markers, vec!["\"\";\"\";".to_string()]);
    assert_eq!(def.column("vlr_total").unwrap().column_type, ColumnType::Decimal);
    assert_eq!(def.column("vlr_total").unwrap().scale, 2);
    assert_eq!(def.locale.decimal_separator, ',');
}

#[test]
fn test_load_builtin_by_name() {
    let def = load_source("novaxs_664").unwrap();
    assert_eq!(def.target, "novaxs_cupons");
    assert!(def.column("id_venda").unwrap().forward_fill);
    assert_eq!(
        def.filters.drop_if_empty_or_zero,
        vec!["nome_desconto".to_string(), "produto".to_string()]
    );
}

#[test]
fn test_load_unknown_source_lists_builtins() {
    let err = load_source("does_not_exist").unwrap_err();
    assert!(err.to_string().contains("novaxs_270"));
}

#[test]
fn test_silver_schema_skips_transient() {
    let def = load_source("novaxs_270").unwrap();
    let schema = def.silver_schema();
    assert!(schema.iter().all(|c| c.name != "criado"));
    assert!(schema.iter().any(|c| c.name == "dt_venda"));
}

#[test]
fn test_unclassified_policy_parsing() {
    let def = load_source("quality_acessos").unwrap();
    let split = def
        .derive
        .iter()
        .find(|d| matches!(d, DeriveDefinition::Split { .. }))
        .unwrap();
    match split {
        DeriveDefinition::Split {
            unclassified,
            numeric_head,
            ..
        } => {
            assert_eq!(unclassified, &UnclassifiedPolicy::Label("OUTROS".to_string()));
            assert!(numeric_head);
        }
        _ => unreachable!(),
    }
    assert_eq!(
        UnclassifiedPolicy::from("drop".to_string()),
        UnclassifiedPolicy::Drop
    );
}

// ============================================================================
// Source Validation Tests
// ============================================================================

#[test]
fn test_reject_undeclared_natural_key() {
    let yaml = INLINE_SOURCE.replace("natural_key: [id_venda]", "natural_key: [missing]");
    let err = load_source_from_str(&yaml).unwrap_err();
    assert!(err.to_string().contains("natural key column 'missing'"));
}

#[test]
fn test_reject_transient_natural_key() {
    let yaml = INLINE_SOURCE.replace(
        "{ name: id_venda, aliases: [Conta] }",
        "{ name: id_venda, aliases: [Conta], transient: true }",
    );
    let err = load_source_from_str(&yaml).unwrap_err();
    assert!(err.to_string().contains("transient"));
}

#[test]
fn test_reject_unknown_type() {
    let yaml = INLINE_SOURCE.replace("type: decimal", "type: money");
    assert!(load_source_from_str(&yaml).is_err());
}

#[test]
fn test_reject_bad_raw_tables_regex() {
    let yaml = INLINE_SOURCE.replace("\"_270$\"", "\"(unclosed\"");
    let err = load_source_from_str(&yaml).unwrap_err();
    assert!(matches!(err, crate::Error::InvalidConfigValue { .. }));
}

#[test]
fn test_reject_undeclared_derive_target() {
    let yaml = format!(
        "{INLINE_SOURCE}derive:\n  - {{ kind: flag, from: cliente, equals: x, into: teste }}\n"
    );
    let err = load_source_from_str(&yaml).unwrap_err();
    assert!(err.to_string().contains("derive column 'teste'"));
}

#[test]
fn test_reject_duplicate_column() {
    let yaml = INLINE_SOURCE.replace(
        "{ name: cliente, aliases: [Cliente] }",
        "{ name: id_venda, aliases: [Cliente] }",
    );
    assert!(load_source_from_str(&yaml).is_err());
}

#[test]
fn test_identifier_check() {
    assert!(is_identifier("id_venda"));
    assert!(is_identifier("idEmpresaRelacionamento"));
    assert!(!is_identifier("1abc"));
    assert!(!is_identifier("a-b"));
    assert!(!is_identifier(""));
}

// ============================================================================
// Project Tests
// ============================================================================

#[test]
fn test_load_project_with_builtin_and_inline() {
    let yaml = format!(
        r#"
name: parque
store:
  path: ":memory:"
sources:
  - novaxs_270
  - {}
"#,
        serde_json::to_string(&serde_yaml::from_str::<serde_yaml::Value>(INLINE_SOURCE).unwrap())
            .unwrap()
    );
    let project = load_project_from_str(&yaml).unwrap();
    assert_eq!(project.resolved_sources.len(), 2);
    assert!(project.source("novaxs_270").is_some());
    assert!(project.source("vendas").is_some());
    assert_eq!(project.normalize.batch_rows, 200_000);
    assert_eq!(project.normalize.flush_threshold_bytes, 8 * 1024 * 1024);
    assert_eq!(project.input.encoding, Encoding::Auto);
}

#[test]
fn test_project_rejects_duplicate_source() {
    let yaml = r"
name: parque
sources: [novaxs_270, novaxs_270]
";
    assert!(load_project_from_str(yaml).is_err());
}

#[test]
fn test_project_consolidation_validation() {
    let yaml = r"
name: parque
sources: [clima_scraping]
consolidations:
  - name: clima
    target: clima_consolidado
    key:
      - { name: cidade }
      - { name: uf, default: SP }
      - { name: dt_forecast, type: date }
    attributes:
      - { name: temp_min_c, type: integer, prefer: [accuweather, climatempo] }
    sources:
      - name: accuweather
        table: clima_previsao
        captured_at: dt_hr_scraping
        filter: { column: origem, starts_with: accu }
      - name: climatempo
        table: clima_previsao
        captured_at: dt_hr_scraping
        filter: { column: origem, starts_with: clima }
";
    let project = load_project_from_str(yaml).unwrap();
    let consolidation = project.consolidation("clima").unwrap();
    assert_eq!(consolidation.key_names(), vec!["cidade", "uf", "dt_forecast"]);
    assert_eq!(consolidation.gold_schema().len(), 4);

    let bad = yaml.replace("table: clima_previsao\n        captured_at: dt_hr_scraping\n        filter: { column: origem, starts_with: clima }",
        "table: nowhere\n        captured_at: dt_hr_scraping");
    let err = load_project_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("unknown silver relation 'nowhere'"));
}

#[test]
fn test_project_rejects_bad_window() {
    let yaml = r#"
name: parque
sources: [novaxs_418]
schedule:
  windows: [{ start: "8h", end: "20:00" }]
"#;
    assert!(load_project_from_str(yaml).is_err());
}

#[test]
fn test_sample_project_file_loads() {
    let project = load_project(concat!(env!("CARGO_MANIFEST_DIR"), "/tierline.yaml")).unwrap();
    assert_eq!(project.resolved_sources.len(), 7);
    let clima = project.consolidation("clima").unwrap();
    assert_eq!(clima.key_names(), vec!["cidade", "uf", "dt_forecast"]);
    assert_eq!(clima.sources[0].captured_at, "dt_hr_scraping");

    let acessos = project.consolidation("acessos").unwrap();
    assert_eq!(acessos.key_names(), vec!["origem", "id_acesso"]);
    assert_eq!(acessos.sources[0].constants["origem"], "LIMBER");
    assert_eq!(acessos.sources[0].column_for("num_ingresso"), "qrcode");
    assert_eq!(acessos.sources[1].column_for("num_ingresso"), "num_ingresso");
}
