//! Reads contributors from the silver tier and upserts the merge into gold

use crate::cast::{CastRule, Caster, NumberLocale};
use crate::config::{ConsolidationDefinition, ContributorDefinition};
use crate::consolidate::merge::{merge, ContributorRow, ContributorRows, MergeStats};
use crate::error::{Error, Result};
use crate::store::Store;
use crate::tier::TierLoader;
use crate::types::{CellValue, ColumnSchema, ColumnType, Tier};

/// Result of one consolidation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsolidateOutcome {
    /// Consolidated relation
    pub target: String,
    /// Contributors that had a silver relation
    pub contributors: usize,
    /// Merge counters
    pub merge: MergeStats,
    /// Rows inserted or updated in gold
    pub upserted: usize,
}

/// Where a consolidated column comes from for one contributor
enum ColumnSource {
    /// Position in the selected silver columns
    Column(usize),
    Constant(CellValue),
    Absent,
}

/// Merge every contributor of `def` and upsert into `gold.<target>`
pub fn consolidate(store: &Store, def: &ConsolidationDefinition) -> Result<ConsolidateOutcome> {
    store.ensure_gold_table(&def.target, &def.gold_schema(), &def.key_names())?;

    let mut contributors = Vec::with_capacity(def.sources.len());
    for contributor in &def.sources {
        if !store.relation_exists(Tier::Silver.schema(), &contributor.table)? {
            tracing::warn!(
                consolidation = %def.name,
                contributor = %contributor.name,
                table = %contributor.table,
                "Contributing relation does not exist yet, skipping"
            );
            contributors.push(ContributorRows {
                name: contributor.name.clone(),
                rows: Vec::new(),
            });
            continue;
        }
        contributors.push(read_contributor(store, def, contributor)?);
    }

    let available = contributors.iter().filter(|c| !c.rows.is_empty()).count();
    let (batch, merge_stats) = merge(def, &contributors);
    if merge_stats.null_key > 0 {
        tracing::warn!(
            consolidation = %def.name,
            skipped = merge_stats.null_key,
            "Skipping contributor rows with a null key component"
        );
    }

    let mut outcome = ConsolidateOutcome {
        target: def.target.clone(),
        contributors: available,
        merge: merge_stats,
        upserted: 0,
    };
    if batch.is_empty() {
        tracing::warn!(consolidation = %def.name, "Nothing to consolidate");
        return Ok(outcome);
    }

    let mut loader = TierLoader::upsert(store, Tier::Gold, def.target.clone(), def.key_names());
    outcome.upserted = loader.load_batch(&batch)?;

    tracing::info!(
        consolidation = %def.name,
        target = %def.target,
        contributors = outcome.contributors,
        entities = outcome.merge.entities,
        upserted = outcome.upserted,
        "Consolidated"
    );
    Ok(outcome)
}

fn read_contributor(
    store: &Store,
    def: &ConsolidationDefinition,
    contributor: &ContributorDefinition,
) -> Result<ContributorRows> {
    let available: Vec<String> = store
        .relation_columns(Tier::Silver.schema(), &contributor.table)?
        .into_iter()
        .map(|(name, _)| name)
        .collect();
    let caster = Caster::new(NumberLocale::dot_decimal());

    let mut selected: Vec<ColumnSchema> = Vec::new();
    let mut plan = Vec::new();
    for column in def.gold_schema() {
        let silver = contributor.column_for(&column.name);
        let source = if available.iter().any(|c| c == silver) {
            selected.push(ColumnSchema {
                name: silver.to_string(),
                column_type: column.column_type,
                scale: column.scale,
            });
            ColumnSource::Column(selected.len() - 1)
        } else if let Some(constant) = contributor.constants.get(&column.name) {
            let rule = CastRule::of(column.column_type).with_scale(column.scale);
            ColumnSource::Constant(caster.cast(constant, &rule).into_value())
        } else {
            ColumnSource::Absent
        };
        plan.push(source);
    }

    for (key, source) in def.key.iter().zip(&plan) {
        if matches!(source, ColumnSource::Absent) && key.default.is_none() {
            return Err(Error::invalid_value(
                format!("consolidations.{}.sources.{}", def.name, contributor.name),
                format!(
                    "relation '{}' has no column for key '{}' and the key has no default",
                    contributor.table, key.name
                ),
            ));
        }
    }

    if !available.iter().any(|c| c == &contributor.captured_at) {
        return Err(Error::invalid_value(
            format!("consolidations.{}.sources.{}.captured_at", def.name, contributor.name),
            format!("relation '{}' has no column '{}'", contributor.table, contributor.captured_at),
        ));
    }
    selected.push(ColumnSchema::new(contributor.captured_at.clone(), ColumnType::Datetime));
    let captured_idx = selected.len() - 1;

    let filter = contributor
        .filter
        .as_ref()
        .map(|f| (f.column.as_str(), f.starts_with.as_str()));
    let batch = store.read_typed(Tier::Silver.schema(), &contributor.table, &selected, filter)?;

    let key_defaults: Vec<CellValue> = def
        .key
        .iter()
        .map(|k| match &k.default {
            Some(text) => {
                let rule = CastRule::of(k.column_type).with_scale(k.scale);
                caster.cast(text, &rule).into_value()
            }
            None => CellValue::Null,
        })
        .collect();

    let key_len = def.key.len();
    let rows = batch
        .rows
        .into_iter()
        .map(|cells| {
            let project = |idx: usize| match &plan[idx] {
                ColumnSource::Column(i) => cells[*i].clone(),
                ColumnSource::Constant(v) => v.clone(),
                ColumnSource::Absent => CellValue::Null,
            };
            let key = (0..key_len)
                .map(|i| match project(i) {
                    CellValue::Null => key_defaults[i].clone(),
                    value => value,
                })
                .collect();
            let attributes = (key_len..plan.len()).map(project).collect();
            ContributorRow {
                key,
                attributes,
                captured_at: cells[captured_idx].as_datetime(),
            }
        })
        .collect();

    tracing::debug!(
        consolidation = %def.name,
        contributor = %contributor.name,
        table = %contributor.table,
        "Read contributor"
    );
    Ok(ContributorRows {
        name: contributor.name.clone(),
        rows,
    })
}
