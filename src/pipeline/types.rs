//! Pipeline types
//!
//! Run options and the per-stage reports returned by the orchestrator.

use crate::normalize::NormalizeStats;
use crate::raw::CaptureReport;

/// Options for one pipeline run
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Re-capture files already present in the bronze tier
    pub force_capture: bool,
    /// Ignore watermarks and re-normalize every raw table
    pub full: bool,
    /// Run source pipelines concurrently
    pub parallel: bool,
    /// Only run these sources (all when empty)
    pub only_sources: Vec<String>,
}

impl RunOptions {
    /// Create default options
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-capture already captured files
    #[must_use]
    pub fn with_force_capture(mut self, force: bool) -> Self {
        self.force_capture = force;
        self
    }

    /// Ignore watermarks
    #[must_use]
    pub fn with_full(mut self, full: bool) -> Self {
        self.full = full;
        self
    }

    /// Run source pipelines concurrently
    #[must_use]
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Restrict the run to some sources
    #[must_use]
    pub fn with_sources(mut self, sources: Vec<String>) -> Self {
        self.only_sources = sources;
        self
    }

    /// Whether a source takes part in this run
    pub fn includes(&self, source: &str) -> bool {
        self.only_sources.is_empty() || self.only_sources.iter().any(|s| s == source)
    }
}

/// Outcome of one unit of work
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Finished
    Completed,
    /// Nothing to do
    Skipped { reason: String },
    /// Failed; siblings still run
    Failed { error: String },
}

impl Outcome {
    /// Create a skipped outcome
    pub fn skipped(reason: impl Into<String>) -> Self {
        Self::Skipped {
            reason: reason.into(),
        }
    }

    /// Create a failed outcome
    pub fn failed(error: impl ToString) -> Self {
        Self::Failed {
            error: error.to_string(),
        }
    }

    /// Check if this outcome is a failure
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// One raw table normalized into silver
#[derive(Debug, Clone)]
pub struct TableReport {
    /// Bronze table
    pub raw_table: String,
    pub outcome: Outcome,
    /// Normalizer counters (absent when skipped before reading)
    pub stats: Option<NormalizeStats>,
    /// Rows skipped for a null key component
    pub null_key: usize,
    /// Capture batches read
    pub spans: usize,
}

impl TableReport {
    /// Report for a table that was not read
    pub fn skipped(raw_table: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            raw_table: raw_table.into(),
            outcome: Outcome::skipped(reason),
            stats: None,
            null_key: 0,
            spans: 0,
        }
    }

    /// Report for a table that failed
    pub fn failed(raw_table: impl Into<String>, error: impl ToString) -> Self {
        Self {
            raw_table: raw_table.into(),
            outcome: Outcome::failed(error),
            stats: None,
            null_key: 0,
            spans: 0,
        }
    }

    /// Rows inserted into silver
    pub fn inserted(&self) -> usize {
        self.stats.as_ref().map_or(0, |s| s.inserted)
    }
}

/// One source pipeline (bronze → silver)
#[derive(Debug, Clone)]
pub struct SourceReport {
    /// Source name
    pub source: String,
    /// Silver relation
    pub target: String,
    /// Raw tables visited, in order
    pub tables: Vec<TableReport>,
    /// Error that aborted the source pipeline
    pub error: Option<String>,
}

impl SourceReport {
    /// Create an empty report
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            tables: Vec::new(),
            error: None,
        }
    }

    /// Report for a source pipeline that could not start or finish
    pub fn failed(source: impl Into<String>, target: impl Into<String>, error: impl ToString) -> Self {
        let mut report = Self::new(source, target);
        report.error = Some(error.to_string());
        report
    }

    /// Rows inserted into silver across tables
    pub fn inserted(&self) -> usize {
        self.tables.iter().map(TableReport::inserted).sum()
    }

    /// Whether the pipeline or any of its tables failed
    pub fn has_failures(&self) -> bool {
        self.error.is_some() || self.tables.iter().any(|t| t.outcome.is_failed())
    }
}

/// One consolidation (silver → gold)
#[derive(Debug, Clone)]
pub struct ConsolidationReport {
    pub name: String,
    pub target: String,
    pub outcome: Outcome,
    /// Consolidated rows produced
    pub entities: usize,
    /// Rows inserted or updated in gold
    pub upserted: usize,
}

/// Everything one run did
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    /// Raw capture, when an input directory is configured
    pub capture: Option<CaptureReport>,
    /// Raw capture error that prevented scanning the input
    pub capture_error: Option<String>,
    pub sources: Vec<SourceReport>,
    pub consolidations: Vec<ConsolidationReport>,
    /// Duration in milliseconds
    pub duration_ms: u64,
}

impl RunReport {
    /// Whether any component failed
    pub fn has_failures(&self) -> bool {
        self.capture_error.is_some()
            || self.capture.as_ref().is_some_and(CaptureReport::has_failures)
            || self.sources.iter().any(SourceReport::has_failures)
            || self.consolidations.iter().any(|c| c.outcome.is_failed())
    }

    /// Rows inserted into silver across sources
    pub fn inserted(&self) -> usize {
        self.sources.iter().map(SourceReport::inserted).sum()
    }

    /// Rows upserted into gold across consolidations
    pub fn upserted(&self) -> usize {
        self.consolidations.iter().map(|c| c.upserted).sum()
    }
}
