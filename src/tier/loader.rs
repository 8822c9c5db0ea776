//! Idempotent tier loader
//!
//! Batches are staged through the wire format and merged into their target
//! relation inside one transaction per batch.

use crate::error::{Error, Result};
use crate::normalize::BatchSink;
use crate::store::{qualified, quote_ident, quote_literal, Store, WireFile};
use crate::types::{Tier, TypedBatch};

/// How staged rows merge into the target relation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeMode {
    /// Insert rows whose key is absent, skip the rest
    InsertAbsent,
    /// Insert or overwrite every column on key conflict
    Upsert,
}

/// Counters for one loader
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadStats {
    /// Batches merged
    pub batches: usize,
    /// Rows offered across batches
    pub offered: usize,
    /// Rows written
    pub inserted: usize,
    /// Rows skipped because a key component was null
    pub null_key: usize,
}

impl LoadStats {
    /// Rows skipped because their key was already present
    pub fn already_present(&self) -> usize {
        self.offered - self.null_key - self.inserted
    }
}

/// Loads typed batches into one tier relation
pub struct TierLoader<'a> {
    store: &'a Store,
    tier: Tier,
    table: String,
    key: Vec<String>,
    mode: MergeMode,
    stats: LoadStats,
}

impl<'a> TierLoader<'a> {
    /// Loader that inserts absent keys and tags rows with the batch lineage
    pub fn insert_absent(store: &'a Store, tier: Tier, table: impl Into<String>, key: Vec<String>) -> Self {
        Self::new(store, tier, table, key, MergeMode::InsertAbsent)
    }

    /// Loader that overwrites rows on key conflict
    pub fn upsert(store: &'a Store, tier: Tier, table: impl Into<String>, key: Vec<String>) -> Self {
        Self::new(store, tier, table, key, MergeMode::Upsert)
    }

    fn new(store: &'a Store, tier: Tier, table: impl Into<String>, key: Vec<String>, mode: MergeMode) -> Self {
        Self {
            store,
            tier,
            table: table.into(),
            key,
            mode,
            stats: LoadStats::default(),
        }
    }

    /// Counters so far
    pub fn stats(&self) -> &LoadStats {
        &self.stats
    }

    /// Fully qualified target name
    pub fn relation(&self) -> String {
        format!("{}.{}", self.tier.schema(), self.table)
    }

    /// Merge one batch; returns the number of rows written
    pub fn load_batch(&mut self, batch: &TypedBatch) -> Result<usize> {
        let key_idx = self.key_indices(batch)?;
        self.stats.offered += batch.num_rows();

        let mut keyed = TypedBatch::new(batch.lineage.clone(), batch.columns.clone());
        for row in &batch.rows {
            if key_idx.iter().any(|&i| row[i].is_null()) {
                self.stats.null_key += 1;
                continue;
            }
            keyed.rows.push(row.clone());
        }
        if keyed.rows.len() < batch.num_rows() {
            tracing::warn!(
                relation = %self.relation(),
                skipped = batch.num_rows() - keyed.rows.len(),
                "Skipping rows with a null key component"
            );
        }
        if keyed.is_empty() {
            return Ok(0);
        }

        let inserted = self
            .merge(&keyed)
            .map_err(|e| Error::load_failure(self.relation(), e.to_string()))?;
        self.stats.batches += 1;
        self.stats.inserted += inserted;

        tracing::debug!(
            relation = %self.relation(),
            rows = keyed.num_rows(),
            inserted = inserted,
            "Merged batch"
        );
        Ok(inserted)
    }

    fn key_indices(&self, batch: &TypedBatch) -> Result<Vec<usize>> {
        self.key
            .iter()
            .map(|k| {
                batch.column_index(k).ok_or_else(|| {
                    Error::load_failure(self.relation(), format!("batch has no key column '{k}'"))
                })
            })
            .collect()
    }

    fn merge(&self, batch: &TypedBatch) -> Result<usize> {
        let wire = WireFile::from_batch(batch)?;
        let stage = format!("_stage_{}_{}", self.tier.schema(), self.table);
        let sql = match self.mode {
            MergeMode::InsertAbsent => self.insert_absent_sql(batch, &stage),
            MergeMode::Upsert => self.upsert_sql(batch, &stage),
        };

        self.store.transaction(|conn| {
            self.store.stage(&stage, &batch.columns, &wire)?;
            let written = conn.execute(&sql, [])?;
            self.store.drop_stage(&stage)?;
            Ok(written)
        })
    }

    fn insert_absent_sql(&self, batch: &TypedBatch, stage: &str) -> String {
        let target = qualified(self.tier.schema(), &self.table);
        let mut columns: Vec<String> = batch.columns.iter().map(|c| quote_ident(&c.name)).collect();
        let mut values: Vec<String> = columns.iter().map(|c| format!("s.{c}")).collect();
        columns.push(quote_ident("source_lineage"));
        values.push(quote_literal(&batch.lineage));

        let keys: Vec<String> = self.key.iter().map(|k| quote_ident(k)).collect();
        let join: Vec<String> = keys.iter().map(|k| format!("s.{k} = t.{k}")).collect();
        let partition: Vec<String> = keys.iter().map(|k| format!("s.{k}")).collect();

        format!(
            "INSERT OR IGNORE INTO {target} ({columns})
             SELECT {values}
             FROM {stage} s
             LEFT JOIN {target} t ON {join}
             WHERE t.{first} IS NULL
             QUALIFY row_number() OVER (PARTITION BY {partition} ORDER BY s._ord) = 1",
            columns = columns.join(", "),
            values = values.join(", "),
            stage = quote_ident(stage),
            join = join.join(" AND "),
            first = keys[0],
            partition = partition.join(", "),
        )
    }

    fn upsert_sql(&self, batch: &TypedBatch, stage: &str) -> String {
        let target = qualified(self.tier.schema(), &self.table);
        let columns: Vec<String> = batch.columns.iter().map(|c| quote_ident(&c.name)).collect();
        let keys: Vec<String> = self.key.iter().map(|k| quote_ident(k)).collect();
        let updates: Vec<String> = batch
            .columns
            .iter()
            .filter(|c| !self.key.contains(&c.name))
            .map(|c| {
                let col = quote_ident(&c.name);
                format!("{col} = EXCLUDED.{col}")
            })
            .collect();
        let conflict = if updates.is_empty() {
            "DO NOTHING".to_string()
        } else {
            format!("DO UPDATE SET {}", updates.join(", "))
        };

        format!(
            "INSERT INTO {target} ({columns})
             SELECT {columns} FROM {stage}
             ON CONFLICT ({keys}) {conflict}",
            columns = columns.join(", "),
            stage = quote_ident(stage),
            keys = keys.join(", "),
        )
    }
}

impl BatchSink for TierLoader<'_> {
    fn load(&mut self, batch: TypedBatch) -> Result<usize> {
        self.load_batch(&batch)
    }
}
