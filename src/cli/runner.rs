//! CLI runner - executes commands

use crate::cli::commands::{split_list, Cli, Commands, OutputFormat, TierArg};
use crate::config::{load_project, load_source_from_str, ProjectDefinition};
use crate::error::{Error, Result};
use crate::output::{export_relation, export_tier, ExportOutcome, ParquetWriterConfig};
use crate::pipeline::{
    ConsolidationReport, Outcome, Pipeline, RunOptions, RunReport, SourceReport,
};
use crate::raw::CaptureReport;
use crate::schedule::Schedule;
use crate::sources::{get_builtin, list_builtin};
use crate::store::Store;
use crate::types::Tier;
use chrono::{Local, NaiveDate};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};

/// CLI runner
pub struct Runner {
    cli: Cli,
}

impl Runner {
    /// Create a new runner
    pub fn new(cli: Cli) -> Self {
        Self { cli }
    }

    /// Run the CLI command
    pub async fn run(&self) -> Result<()> {
        match &self.cli.command {
            Commands::Ingest { input, force } => self.ingest(input.as_deref(), *force),
            Commands::Normalize {
                sources,
                full,
                parallel,
            } => {
                let options = RunOptions::new()
                    .with_sources(split_list(sources.as_deref()))
                    .with_full(*full)
                    .with_parallel(*parallel);
                self.normalize(options).await
            }
            Commands::Consolidate { only } => self.consolidate(&split_list(only.as_deref())),
            Commands::Run {
                force,
                full,
                parallel,
                recapture,
            } => {
                let options = RunOptions::new()
                    .with_force_capture(*recapture)
                    .with_full(*full)
                    .with_parallel(*parallel);
                self.run_pipeline(*force, options).await
            }
            Commands::Export {
                tier,
                table,
                output,
                date,
            } => self.export(*tier, table.as_deref(), output.as_deref(), *date),
            Commands::Validate => self.validate(),
            Commands::Sources { show } => self.sources(show.as_deref()),
        }
    }

    /// Load the project file, applying CLI overrides
    fn load_project(&self) -> Result<ProjectDefinition> {
        let mut project = load_project(&self.cli.project)?;
        if let Some(store) = &self.cli.store {
            project.store.path.clone_from(store);
        }
        Ok(project)
    }

    fn open_store(&self, project: &ProjectDefinition) -> Result<Store> {
        let store = Store::open(&project.store.path)?;
        store.bootstrap()?;
        Ok(store)
    }

    /// Capture raw files
    fn ingest(&self, input: Option<&Path>, force: bool) -> Result<()> {
        let mut project = self.load_project()?;
        if let Some(input) = input {
            project.input.directory = Some(input.display().to_string());
        }
        if project.input.directory.is_none() {
            return Err(Error::missing_field("input.directory"));
        }
        let store = self.open_store(&project)?;

        let pipeline =
            Pipeline::new(&project, &store).with_options(RunOptions::new().with_force_capture(force));
        let report = pipeline.capture()?.unwrap_or_default();
        self.output_message(&json!({
            "type": "CAPTURE",
            "capture": capture_json(&report)
        }));

        if report.has_failures() {
            return Err(Error::Other(format!("{} file(s) failed to capture", report.failed.len())));
        }
        Ok(())
    }

    /// Normalize bronze into silver
    async fn normalize(&self, options: RunOptions) -> Result<()> {
        let project = self.load_project()?;
        for name in &options.only_sources {
            if project.source(name).is_none() {
                return Err(Error::config(format!("Unknown source '{name}'")));
            }
        }
        let store = self.open_store(&project)?;

        let reports = Pipeline::new(&project, &store)
            .with_options(options)
            .normalize_all()
            .await;
        self.output_message(&json!({
            "type": "NORMALIZE",
            "sources": reports.iter().map(source_json).collect::<Vec<_>>()
        }));

        let failed = reports.iter().filter(|r| r.has_failures()).count();
        if failed > 0 {
            return Err(Error::Other(format!("{failed} source pipeline(s) failed")));
        }
        Ok(())
    }

    /// Merge silver into gold
    fn consolidate(&self, only: &[String]) -> Result<()> {
        let mut project = self.load_project()?;
        if !only.is_empty() {
            for name in only {
                if project.consolidation(name).is_none() {
                    return Err(Error::config(format!("Unknown consolidation '{name}'")));
                }
            }
            project.consolidations.retain(|c| only.contains(&c.name));
        }
        let store = self.open_store(&project)?;

        let reports = Pipeline::new(&project, &store).consolidate_all();
        self.output_message(&json!({
            "type": "CONSOLIDATE",
            "consolidations": reports.iter().map(consolidation_json).collect::<Vec<_>>()
        }));

        let failed = reports.iter().filter(|r| r.outcome.is_failed()).count();
        if failed > 0 {
            return Err(Error::Other(format!("{failed} consolidation(s) failed")));
        }
        Ok(())
    }

    /// Full pipeline, gated by the schedule
    async fn run_pipeline(&self, force: bool, options: RunOptions) -> Result<()> {
        let project = self.load_project()?;
        let schedule = Schedule::from_definition(&project.schedule)?;
        let decision = schedule.decide(force);
        if !decision.should_run() {
            tracing::info!(decision = ?decision, "Outside the run windows, nothing to do");
            self.output_message(&json!({
                "type": "RUN",
                "decision": format!("{decision:?}"),
                "ran": false
            }));
            return Ok(());
        }
        tracing::info!(decision = ?decision, project = %project.name, "Starting run");

        let store = self.open_store(&project)?;
        let report = Pipeline::new(&project, &store)
            .with_options(options)
            .run()
            .await?;
        self.output_message(&json!({
            "type": "RUN",
            "decision": format!("{decision:?}"),
            "ran": true,
            "report": run_json(&report)
        }));

        if report.has_failures() {
            return Err(Error::Other("Run finished with failures".to_string()));
        }
        Ok(())
    }

    /// Write Parquet snapshots
    fn export(
        &self,
        tier: TierArg,
        table: Option<&str>,
        output: Option<&Path>,
        date: Option<NaiveDate>,
    ) -> Result<()> {
        let project = self.load_project()?;
        let store = self.open_store(&project)?;
        let tier = Tier::from(tier);
        let base = output.map_or_else(|| PathBuf::from(&project.export.directory), Path::to_path_buf);
        let date = date.unwrap_or_else(|| Local::now().date_naive());
        let config = ParquetWriterConfig::default();

        let outcomes = match table {
            Some(table) => vec![export_relation(&store, tier, table, &base, date, &config)?],
            None => export_tier(&store, tier, &base, date, &config)?,
        };
        self.output_message(&json!({
            "type": "EXPORT",
            "files": outcomes.iter().map(export_json).collect::<Vec<_>>()
        }));
        Ok(())
    }

    /// Validate the project file
    fn validate(&self) -> Result<()> {
        let project = self.load_project()?;

        self.output_message(&json!({
            "type": "LOG",
            "log": {
                "level": "INFO",
                "message": format!(
                    "Project '{}' is valid with {} sources and {} consolidations",
                    project.name,
                    project.resolved_sources.len(),
                    project.consolidations.len()
                )
            }
        }));

        Ok(())
    }

    /// List or show built-in sources
    fn sources(&self, show: Option<&str>) -> Result<()> {
        if let Some(name) = show {
            let yaml = get_builtin(name).ok_or_else(|| {
                Error::config(format!(
                    "Unknown built-in source '{name}'. Available: {}",
                    list_builtin().join(", ")
                ))
            })?;
            println!("{yaml}");
            return Ok(());
        }

        let sources = list_builtin()
            .into_iter()
            .filter_map(|name| get_builtin(name).map(|yaml| (name, yaml)))
            .map(|(name, yaml)| {
                let def = load_source_from_str(yaml)?;
                Ok(json!({
                    "name": name,
                    "description": def.description,
                    "target": def.target,
                    "raw_tables": def.raw_tables,
                    "natural_key": def.natural_key
                }))
            })
            .collect::<Result<Vec<Value>>>()?;

        self.output_message(&json!({
            "type": "SOURCES",
            "sources": sources
        }));
        Ok(())
    }

    /// Print a message in the selected format
    fn output_message(&self, msg: &Value) {
        match self.cli.format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string(msg).unwrap_or_default());
            }
            OutputFormat::Pretty => {
                println!("{}", serde_json::to_string_pretty(msg).unwrap_or_default());
            }
        }
    }
}

// ============================================================================
// Report rendering
// ============================================================================

fn outcome_json(outcome: &Outcome) -> Value {
    match outcome {
        Outcome::Completed => json!({ "status": "completed" }),
        Outcome::Skipped { reason } => json!({ "status": "skipped", "reason": reason }),
        Outcome::Failed { error } => json!({ "status": "failed", "error": error }),
    }
}

fn capture_json(report: &CaptureReport) -> Value {
    json!({
        "captured": report.captured.iter().map(|c| json!({
            "file": c.file,
            "raw_table": c.raw_table,
            "lines": c.lines,
            "batch_id": c.batch_id
        })).collect::<Vec<_>>(),
        "skipped": report.skipped.iter().map(|c| c.file.clone()).collect::<Vec<_>>(),
        "failed": report.failed.iter().map(|(file, error)| json!({
            "file": file,
            "error": error
        })).collect::<Vec<_>>()
    })
}

fn source_json(report: &SourceReport) -> Value {
    json!({
        "source": report.source,
        "target": report.target,
        "inserted": report.inserted(),
        "error": report.error,
        "tables": report.tables.iter().map(|t| {
            let mut table = json!({
                "raw_table": t.raw_table,
                "outcome": outcome_json(&t.outcome),
                "null_key": t.null_key
            });
            if let Some(stats) = &t.stats {
                table["rows"] = json!(stats.rows_emitted);
                table["inserted"] = json!(stats.inserted);
                table["flushes"] = json!(stats.flushes);
                table["unparseable"] = json!(stats.cast.unparseable);
            }
            table
        }).collect::<Vec<_>>()
    })
}

fn consolidation_json(report: &ConsolidationReport) -> Value {
    json!({
        "name": report.name,
        "target": report.target,
        "outcome": outcome_json(&report.outcome),
        "entities": report.entities,
        "upserted": report.upserted
    })
}

fn run_json(report: &RunReport) -> Value {
    json!({
        "capture": report.capture.as_ref().map(capture_json),
        "capture_error": report.capture_error,
        "sources": report.sources.iter().map(source_json).collect::<Vec<_>>(),
        "consolidations": report.consolidations.iter().map(consolidation_json).collect::<Vec<_>>(),
        "inserted": report.inserted(),
        "upserted": report.upserted(),
        "duration_ms": report.duration_ms,
        "failed": report.has_failures()
    })
}

fn export_json(outcome: &ExportOutcome) -> Value {
    json!({
        "relation": outcome.relation,
        "path": outcome.path.display().to_string(),
        "rows": outcome.rows
    })
}
