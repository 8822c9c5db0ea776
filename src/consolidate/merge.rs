//! Multi-source merge
//!
//! Pure function from contributor rows to one consolidated row per key.

use crate::config::ConsolidationDefinition;
use crate::types::{CellValue, ColumnSchema, ColumnType, TypedBatch};
use chrono::{Local, NaiveDateTime};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Freshness columns appended to every consolidated row
pub const LAST_UPDATED_AT: &str = "last_updated_at";
pub const FRESHNESS_SOURCE: &str = "freshness_source";

/// One contributing row, already projected onto the consolidated columns
#[derive(Debug, Clone, PartialEq)]
pub struct ContributorRow {
    /// Key cells, in key order
    pub key: Vec<CellValue>,
    /// Attribute cells, in attribute order; null when not provided
    pub attributes: Vec<CellValue>,
    /// Capture timestamp of the row
    pub captured_at: Option<NaiveDateTime>,
}

/// All rows of one contributor
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContributorRows {
    pub name: String,
    pub rows: Vec<ContributorRow>,
}

/// Counters for one merge
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeStats {
    /// Rows offered by contributors
    pub contributor_rows: usize,
    /// Rows skipped because a key component was null
    pub null_key: usize,
    /// Consolidated rows produced
    pub entities: usize,
}

/// Newest non-null values of one contributor for one key
#[derive(Debug, Clone)]
struct SourceView {
    latest: Option<NaiveDateTime>,
    values: Vec<Option<(Option<NaiveDateTime>, CellValue)>>,
}

impl SourceView {
    fn new(width: usize) -> Self {
        Self {
            latest: None,
            values: vec![None; width],
        }
    }

    fn absorb(&mut self, row: &ContributorRow) {
        if row.captured_at > self.latest {
            self.latest = row.captured_at;
        }
        for (slot, value) in self.values.iter_mut().zip(&row.attributes) {
            if value.is_null() {
                continue;
            }
            let newer = match slot {
                Some((at, _)) => row.captured_at >= *at,
                None => true,
            };
            if newer {
                *slot = Some((row.captured_at, value.clone()));
            }
        }
    }

    fn value(&self, attr: usize) -> Option<&CellValue> {
        self.values[attr].as_ref().map(|(_, v)| v)
    }
}

struct Entity {
    key: Vec<CellValue>,
    sources: Vec<Option<SourceView>>,
}

/// Output schema: key, attributes, freshness columns
pub fn consolidated_schema(def: &ConsolidationDefinition) -> Vec<ColumnSchema> {
    let mut columns = def.gold_schema();
    columns.push(ColumnSchema::new(LAST_UPDATED_AT, ColumnType::Datetime));
    columns.push(ColumnSchema::new(FRESHNESS_SOURCE, ColumnType::Text));
    columns
}

/// Merge contributor rows into one row per key.
///
/// `contributors` must follow the configured contributor order, which breaks
/// recency ties. Entities no contributor timestamped are stamped with the
/// current local time.
pub fn merge(def: &ConsolidationDefinition, contributors: &[ContributorRows]) -> (TypedBatch, MergeStats) {
    merge_at(def, contributors, Local::now().naive_local())
}

/// [`merge`] with an explicit fallback for `last_updated_at`
pub fn merge_at(
    def: &ConsolidationDefinition,
    contributors: &[ContributorRows],
    now: NaiveDateTime,
) -> (TypedBatch, MergeStats) {
    let width = def.attributes.len();
    let mut stats = MergeStats::default();
    let mut entities: BTreeMap<Vec<String>, Entity> = BTreeMap::new();

    for (source_idx, contributor) in contributors.iter().enumerate() {
        let mut rows: Vec<&ContributorRow> = contributor.rows.iter().collect();
        rows.sort_by(|a, b| compare_rows(a, b));

        for row in rows {
            stats.contributor_rows += 1;
            if row.key.iter().any(CellValue::is_null) {
                stats.null_key += 1;
                continue;
            }
            let id: Vec<String> = row.key.iter().map(CellValue::to_wire).collect();
            let entity = entities.entry(id).or_insert_with(|| Entity {
                key: row.key.clone(),
                sources: vec![None; contributors.len()],
            });
            entity.sources[source_idx]
                .get_or_insert_with(|| SourceView::new(width))
                .absorb(row);
        }
    }

    let preferences: Vec<Vec<usize>> = def
        .attributes
        .iter()
        .map(|attr| {
            attr.prefer
                .iter()
                .filter_map(|name| contributors.iter().position(|c| &c.name == name))
                .collect()
        })
        .collect();

    let mut batch = TypedBatch::new(def.target.clone(), consolidated_schema(def));
    for entity in entities.into_values() {
        let by_recency = recency_order(&entity.sources);

        let mut row = entity.key;
        for (attr_idx, preferred) in preferences.iter().enumerate() {
            let value = preferred
                .iter()
                .chain(by_recency.iter().filter(|i| !preferred.contains(*i)))
                .find_map(|&i| entity.sources[i].as_ref().and_then(|s| s.value(attr_idx)))
                .cloned()
                .unwrap_or_default();
            row.push(value);
        }

        let freshest = by_recency[0];
        let last_updated_at = entity.sources[freshest]
            .as_ref()
            .and_then(|s| s.latest)
            .unwrap_or(now);
        row.push(CellValue::Datetime(last_updated_at));
        row.push(CellValue::Text(contributors[freshest].name.clone()));
        batch.push_row(row);
    }

    stats.entities = batch.num_rows();
    (batch, stats)
}

/// Contributing sources, most recently captured first; ties keep configured order
fn recency_order(sources: &[Option<SourceView>]) -> Vec<usize> {
    let mut order: Vec<(usize, Option<NaiveDateTime>)> = sources
        .iter()
        .enumerate()
        .filter_map(|(i, s)| s.as_ref().map(|s| (i, s.latest)))
        .collect();
    // Stable sort; `None` sorts last
    order.sort_by(|a, b| b.1.cmp(&a.1));
    order.into_iter().map(|(i, _)| i).collect()
}

fn compare_rows(a: &ContributorRow, b: &ContributorRow) -> Ordering {
    a.captured_at.cmp(&b.captured_at).then_with(|| {
        let left = a.attributes.iter().map(CellValue::to_wire);
        let right = b.attributes.iter().map(CellValue::to_wire);
        left.cmp(right)
    })
}
