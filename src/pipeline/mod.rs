//! Pipeline orchestration
//!
//! Runs raw capture, one bronze → silver pipeline per source and then every
//! consolidation. A failing source never stops its siblings or the
//! consolidations.
//!
//! # Overview
//!
//! - [`Pipeline`] - Orchestrates a run over one store
//! - [`normalize_source`] - One source pipeline, usable on its own connection
//! - [`RunReport`] - What happened, per stage

mod types;

pub use types::{
    ConsolidationReport, Outcome, RunOptions, RunReport, SourceReport, TableReport,
};

use crate::config::{NormalizeSettings, ProjectDefinition, SourceDefinition};
use crate::consolidate::consolidate;
use crate::error::{Error, Result};
use crate::normalize::{NormalizePlan, NormalizeStats, StreamingNormalizer};
use crate::raw::{capture_directory, CaptureReport};
use crate::store::{RawSpan, Store};
use crate::tier::TierLoader;
use crate::types::{Tier, TypedBatch};
use regex::Regex;
use std::time::Instant;
use tokio::task::JoinSet;

/// Settings shared by every source pipeline of a run
#[derive(Debug, Clone)]
pub struct NormalizeContext {
    /// Watermark namespace (the project name)
    pub project: String,
    pub settings: NormalizeSettings,
    /// Raw lines read per page
    pub page_size: usize,
    /// Ignore watermarks
    pub full: bool,
}

impl NormalizeContext {
    /// Context for a project
    pub fn from_project(project: &ProjectDefinition, full: bool) -> Self {
        Self {
            project: project.name.clone(),
            settings: project.normalize.clone(),
            page_size: project.store.page_size.max(1),
            full,
        }
    }

    /// Watermark pipeline name for a source
    pub fn watermark_pipeline(&self, source: &str) -> String {
        format!("{}/{}", self.project, source)
    }
}

/// Pipeline orchestrator over one store
pub struct Pipeline<'a> {
    project: &'a ProjectDefinition,
    store: &'a Store,
    options: RunOptions,
}

impl<'a> Pipeline<'a> {
    /// Create an orchestrator
    pub fn new(project: &'a ProjectDefinition, store: &'a Store) -> Self {
        Self {
            project,
            store,
            options: RunOptions::default(),
        }
    }

    /// Set run options
    #[must_use]
    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    /// Run options
    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    /// Capture the input directory into the bronze tier
    pub fn capture(&self) -> Result<Option<CaptureReport>> {
        if self.project.input.directory.is_none() {
            tracing::debug!("No input directory configured, skipping raw capture");
            return Ok(None);
        }
        let report = capture_directory(self.store, &self.project.input, self.options.force_capture)?;
        tracing::info!(
            files = report.captured.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            lines = report.total_lines(),
            "Raw capture finished"
        );
        Ok(Some(report))
    }

    /// Sources taking part in this run, in configured order
    pub fn sources(&self) -> Vec<&'a SourceDefinition> {
        self.project
            .resolved_sources
            .iter()
            .filter(|s| self.options.includes(&s.name))
            .collect()
    }

    /// Run every source pipeline. Failures end up in the reports.
    pub async fn normalize_all(&self) -> Vec<SourceReport> {
        let context = NormalizeContext::from_project(self.project, self.options.full);
        let sources = self.sources();

        if !self.options.parallel {
            return sources
                .into_iter()
                .map(|source| normalize_source(self.store, source, &context))
                .collect();
        }

        let mut reports: Vec<SourceReport> = sources
            .iter()
            .map(|s| SourceReport::failed(&s.name, &s.target, "source pipeline did not complete"))
            .collect();
        let mut tasks = JoinSet::new();
        for (idx, source) in sources.iter().enumerate() {
            // Catalog changes stay on this connection
            let prepared = self
                .store
                .ensure_silver_table(&source.target, &source.silver_schema(), &source.natural_key)
                .and_then(|()| self.store.try_clone());
            let store = match prepared {
                Ok(store) => store,
                Err(e) => {
                    tracing::error!(source = %source.name, error = %e, "Source pipeline failed to start");
                    reports[idx] = SourceReport::failed(&source.name, &source.target, e);
                    continue;
                }
            };
            let source = (*source).clone();
            let context = context.clone();
            tasks.spawn_blocking(move || (idx, normalize_source(&store, &source, &context)));
        }

        join_reports(tasks, reports).await
    }

    /// Run every consolidation
    pub fn consolidate_all(&self) -> Vec<ConsolidationReport> {
        self.project
            .consolidations
            .iter()
            .map(|def| match consolidate(self.store, def) {
                Ok(outcome) => ConsolidationReport {
                    name: def.name.clone(),
                    target: def.target.clone(),
                    outcome: if outcome.merge.entities == 0 {
                        Outcome::skipped("no contributing rows")
                    } else {
                        Outcome::Completed
                    },
                    entities: outcome.merge.entities,
                    upserted: outcome.upserted,
                },
                Err(e) => {
                    tracing::error!(consolidation = %def.name, error = %e, "Consolidation failed");
                    ConsolidationReport {
                        name: def.name.clone(),
                        target: def.target.clone(),
                        outcome: Outcome::failed(e),
                        entities: 0,
                        upserted: 0,
                    }
                }
            })
            .collect()
    }

    /// Raw capture, every source pipeline, then every consolidation
    pub async fn run(&self) -> Result<RunReport> {
        let start = Instant::now();
        let mut report = RunReport::default();

        match self.capture() {
            Ok(capture) => report.capture = capture,
            Err(e) => {
                tracing::error!(error = %e, "Raw capture failed");
                report.capture_error = Some(e.to_string());
            }
        }

        report.sources = self.normalize_all().await;
        report.consolidations = self.consolidate_all();
        report.duration_ms = start.elapsed().as_millis() as u64;

        tracing::info!(
            sources = report.sources.len(),
            inserted = report.inserted(),
            consolidations = report.consolidations.len(),
            upserted = report.upserted(),
            duration_ms = report.duration_ms,
            failed = report.has_failures(),
            "Run finished"
        );
        Ok(report)
    }
}

/// Collect finished source pipelines into their slots. A slot whose task
/// panicked keeps its failed placeholder.
async fn join_reports(
    mut tasks: JoinSet<(usize, SourceReport)>,
    mut reports: Vec<SourceReport>,
) -> Vec<SourceReport> {
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((idx, report)) => reports[idx] = report,
            Err(e) => tracing::error!(error = %e, "Source pipeline task failed"),
        }
    }
    reports
}

/// Normalize every raw table owned by a source into its silver relation.
///
/// Errors never escape: they end up in the report. A load failure stops the
/// remaining tables of this source; a missing header only fails the capture
/// batch it belongs to.
pub fn normalize_source(store: &Store, source: &SourceDefinition, context: &NormalizeContext) -> SourceReport {
    let mut report = SourceReport::new(&source.name, &source.target);

    let (plan, tables) = match prepare_source(store, source) {
        Ok(prepared) => prepared,
        Err(e) => {
            tracing::error!(source = %source.name, error = %e, "Source pipeline failed");
            report.error = Some(e.to_string());
            return report;
        }
    };
    if tables.is_empty() {
        tracing::warn!(source = %source.name, pattern = %source.raw_tables, "No raw tables for source");
    }

    for raw_table in tables {
        match normalize_table(store, source, &plan, &raw_table, context) {
            Ok(table) => report.tables.push(table),
            Err(e) => {
                tracing::error!(source = %source.name, raw_table = %raw_table, error = %e, "Source pipeline failed");
                report.tables.push(TableReport::failed(&raw_table, &e));
                report.error = Some(e.to_string());
                break;
            }
        }
    }

    tracing::info!(
        source = %source.name,
        target = %source.target,
        tables = report.tables.len(),
        inserted = report.inserted(),
        failed = report.has_failures(),
        "Source pipeline finished"
    );
    report
}

fn prepare_source(store: &Store, source: &SourceDefinition) -> Result<(NormalizePlan, Vec<String>)> {
    let plan = NormalizePlan::compile(source)?;
    store.ensure_silver_table(&source.target, &source.silver_schema(), &source.natural_key)?;

    let pattern = Regex::new(&source.raw_tables)?;
    let tables = store
        .list_tables(Tier::Bronze.schema())
        .map_err(|e| Error::source_unavailable(&source.name, e.to_string()))?
        .into_iter()
        .filter(|t| pattern.is_match(t))
        .collect();
    Ok((plan, tables))
}

/// Normalize the capture batches of a raw table past its watermark. Each
/// batch is a separate export, read by its own normalizer.
fn normalize_table(
    store: &Store,
    source: &SourceDefinition,
    plan: &NormalizePlan,
    raw_table: &str,
    context: &NormalizeContext,
) -> Result<TableReport> {
    let pipeline = context.watermark_pipeline(&source.name);
    let max_line_no = store.raw_max_line_no(raw_table)?;
    if max_line_no == 0 {
        tracing::warn!(source = %source.name, raw_table = %raw_table, "Raw table has no lines, skipping");
        return Ok(TableReport::skipped(raw_table, "no raw lines"));
    }
    let watermark = if context.full {
        0
    } else {
        store.get_watermark(&pipeline, raw_table)?.unwrap_or(0)
    };
    if watermark >= max_line_no {
        tracing::debug!(source = %source.name, raw_table = %raw_table, "Already normalized, skipping");
        return Ok(TableReport::skipped(raw_table, "already normalized"));
    }

    let mut loader = TierLoader::insert_absent(store, Tier::Silver, &source.target, source.natural_key.clone());
    let mut stats = NormalizeStats::default();
    let mut completed = 0;
    let mut failures = Vec::new();
    let spans = store.raw_spans(raw_table, watermark)?;

    for span in &spans {
        match normalize_span(store, source, plan, raw_table, span, context, &mut loader) {
            Ok(span_stats) => {
                stats.absorb(&span_stats);
                completed += 1;
            }
            Err(e) if e.is_skippable() => {
                tracing::warn!(
                    source = %source.name,
                    raw_table = %raw_table,
                    file = %span.source_file,
                    batch_id = %span.batch_id,
                    "Empty table, skipping"
                );
            }
            Err(e @ Error::BoundaryNotFound { .. }) => {
                tracing::error!(
                    source = %source.name,
                    raw_table = %raw_table,
                    file = %span.source_file,
                    batch_id = %span.batch_id,
                    error = %e,
                    "Header not found"
                );
                failures.push(format!("{} ({}): {e}", span.source_file, span.batch_id));
            }
            Err(e) => return Err(e),
        }
        store.set_watermark(&pipeline, raw_table, span.last_line_no)?;
    }

    let outcome = if !failures.is_empty() {
        Outcome::failed(failures.join("; "))
    } else if completed == 0 {
        Outcome::skipped("no data rows")
    } else {
        Outcome::Completed
    };

    tracing::info!(
        source = %source.name,
        raw_table = %raw_table,
        spans = spans.len(),
        rows = stats.rows_emitted,
        inserted = stats.inserted,
        flushes = stats.flushes,
        unparseable = stats.cast.unparseable,
        "Normalized raw table"
    );
    Ok(TableReport {
        raw_table: raw_table.to_string(),
        outcome,
        stats: (completed > 0).then_some(stats),
        null_key: loader.stats().null_key,
        spans: spans.len(),
    })
}

fn normalize_span(
    store: &Store,
    source: &SourceDefinition,
    plan: &NormalizePlan,
    raw_table: &str,
    span: &RawSpan,
    context: &NormalizeContext,
    loader: &mut TierLoader<'_>,
) -> Result<NormalizeStats> {
    let mut normalizer = StreamingNormalizer::new(
        plan,
        &source.boundary,
        source.delimiter,
        &context.settings,
        raw_table,
        |batch: TypedBatch| loader.load_batch(&batch),
    )?;

    let mut after = span.first_line_no - 1;
    'pages: loop {
        let page = store.read_raw_page(raw_table, after, span.last_line_no, context.page_size)?;
        let Some(last) = page.last() else {
            break;
        };
        after = last.line_no;
        for line in &page {
            normalizer.push_line(&line.raw_line)?;
            if normalizer.is_stopped() {
                break 'pages;
            }
        }
    }
    normalizer.finish()
}
