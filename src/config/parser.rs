//! YAML parser for project and source definitions
//!
//! Parses and validates project files and source definitions.
//! Sources can be referenced by built-in name or defined inline.

use crate::config::types::{
    ConsolidationDefinition, DeriveDefinition, ProjectDefinition, SourceDefinition, SourceRef,
};
use crate::error::{Error, Result};
use crate::schedule::parse_clock;
use crate::sources;
use regex::Regex;
use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// Whether a name can be used as a relation or column name
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Load a project definition from a file
pub fn load_project(path: impl AsRef<Path>) -> Result<ProjectDefinition> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::FileNotFound {
                path: path.display().to_string(),
            }
        } else {
            Error::config(format!(
                "Failed to read project file '{}': {}",
                path.display(),
                e
            ))
        }
    })?;
    load_project_from_str(&content)
}

/// Load a project definition from a YAML string
pub fn load_project_from_str(yaml: &str) -> Result<ProjectDefinition> {
    let mut project: ProjectDefinition = serde_yaml::from_str(yaml)
        .map_err(|e| Error::config(format!("Failed to parse project YAML: {e}")))?;

    let mut resolved = Vec::with_capacity(project.sources.len());
    for source in &project.sources {
        let def = match source {
            SourceRef::Builtin(name) => load_source(name)?,
            SourceRef::Inline(def) => {
                validate_source(def)?;
                (**def).clone()
            }
        };
        resolved.push(def);
    }
    project.resolved_sources = resolved;

    validate_project(&project)?;
    Ok(project)
}

/// Load a source definition from a built-in name or a file path
pub fn load_source(name_or_path: impl AsRef<Path>) -> Result<SourceDefinition> {
    let path = name_or_path.as_ref();
    let path_str = path.to_string_lossy();

    if !path_str.contains('/')
        && !path_str.contains('\\')
        && !path_str.ends_with(".yaml")
        && !path_str.ends_with(".yml")
    {
        if let Some(yaml) = sources::get_builtin(&path_str) {
            return load_source_from_str(yaml);
        }
    }

    let content = fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            let builtin_list = sources::list_builtin().join(", ");
            Error::config(format!(
                "Source '{}' not found. Built-in sources: {}. Or provide a path to a YAML file.",
                path.display(),
                builtin_list
            ))
        } else {
            Error::config(format!(
                "Failed to read source file '{}': {}",
                path.display(),
                e
            ))
        }
    })?;
    load_source_from_str(&content)
}

/// Load a source definition from a YAML string
pub fn load_source_from_str(yaml: &str) -> Result<SourceDefinition> {
    let def: SourceDefinition = serde_yaml::from_str(yaml)
        .map_err(|e| Error::config(format!("Failed to parse source YAML: {e}")))?;

    validate_source(&def)?;
    Ok(def)
}

// ============================================================================
// Validation
// ============================================================================

/// Validate a source definition
pub fn validate_source(def: &SourceDefinition) -> Result<()> {
    if def.name.is_empty() {
        return Err(Error::config("Source name cannot be empty"));
    }

    if def.boundary.header_prefix.is_empty() {
        return Err(Error::missing_field(format!("{}.header_prefix", def.name)));
    }

    Regex::new(&def.raw_tables).map_err(|e| {
        Error::invalid_value(format!("{}.raw_tables", def.name), e.to_string())
    })?;

    if !is_identifier(&def.target) {
        return Err(Error::invalid_value(
            format!("{}.target", def.name),
            format!("'{}' is not a valid relation name", def.target),
        ));
    }

    if matches!(def.delimiter, '\n' | '\r' | '"') {
        return Err(Error::invalid_value(
            format!("{}.delimiter", def.name),
            "delimiter cannot be a newline or a quote",
        ));
    }

    if def.columns.is_empty() {
        return Err(Error::config(format!(
            "Source '{}' must declare at least one column",
            def.name
        )));
    }

    let mut seen = HashSet::new();
    for column in &def.columns {
        if !is_identifier(&column.name) {
            return Err(Error::invalid_value(
                format!("{}.columns", def.name),
                format!("'{}' is not a valid column name", column.name),
            ));
        }
        if matches!(column.name.as_str(), "source_lineage" | "ingested_at") {
            return Err(Error::invalid_value(
                format!("{}.columns", def.name),
                format!("'{}' is assigned by the store", column.name),
            ));
        }
        if !seen.insert(column.name.as_str()) {
            return Err(Error::config(format!(
                "Source '{}' declares column '{}' twice",
                def.name, column.name
            )));
        }
        if column.scale > 18 {
            return Err(Error::invalid_value(
                format!("{}.{}.scale", def.name, column.name),
                "scale must be between 0 and 18",
            ));
        }
    }

    if def.natural_key.is_empty() {
        return Err(Error::missing_field(format!("{}.natural_key", def.name)));
    }
    for key in &def.natural_key {
        match def.column(key) {
            None => {
                return Err(Error::config(format!(
                    "Source '{}': natural key column '{}' is not declared",
                    def.name, key
                )))
            }
            Some(column) if column.transient => {
                return Err(Error::config(format!(
                    "Source '{}': natural key column '{}' is transient",
                    def.name, key
                )))
            }
            Some(_) => {}
        }
    }

    for rule in &def.derive {
        validate_derive(def, rule)?;
    }

    for column in def
        .filters
        .drop_if_empty_or_zero
        .iter()
        .chain(def.filters.exclude.iter().map(|e| &e.column))
    {
        if def.column(column).is_none() {
            return Err(Error::config(format!(
                "Source '{}': filter column '{}' is not declared",
                def.name, column
            )));
        }
    }

    Ok(())
}

fn validate_derive(def: &SourceDefinition, rule: &DeriveDefinition) -> Result<()> {
    for column in rule.inputs().into_iter().chain(rule.outputs()) {
        if def.column(column).is_none() {
            return Err(Error::config(format!(
                "Source '{}': derive column '{}' is not declared",
                def.name, column
            )));
        }
    }

    match rule {
        DeriveDefinition::Replace { pattern, .. } => {
            Regex::new(pattern).map_err(|e| {
                Error::invalid_value(format!("{}.derive.pattern", def.name), e.to_string())
            })?;
        }
        DeriveDefinition::Split { delimiter, .. } if delimiter.is_empty() => {
            return Err(Error::invalid_value(
                format!("{}.derive.delimiter", def.name),
                "split delimiter cannot be empty",
            ));
        }
        _ => {}
    }
    Ok(())
}

/// Validate a resolved project definition
pub fn validate_project(project: &ProjectDefinition) -> Result<()> {
    if project.name.is_empty() {
        return Err(Error::config("Project name cannot be empty"));
    }

    if project.normalize.flush_threshold_bytes == 0 {
        return Err(Error::invalid_value(
            "normalize.flush_threshold_bytes",
            "must be greater than zero",
        ));
    }
    if project.normalize.batch_rows == 0 {
        return Err(Error::invalid_value(
            "normalize.batch_rows",
            "must be greater than zero",
        ));
    }
    if project.store.page_size == 0 {
        return Err(Error::invalid_value("store.page_size", "must be greater than zero"));
    }

    for window in &project.schedule.windows {
        parse_clock(&window.start)?;
        parse_clock(&window.end)?;
    }

    let mut names = HashSet::new();
    let mut targets = HashSet::new();
    for source in &project.resolved_sources {
        if !names.insert(source.name.as_str()) {
            return Err(Error::config(format!(
                "Source '{}' is listed twice",
                source.name
            )));
        }
        if !targets.insert(source.target.as_str()) {
            return Err(Error::config(format!(
                "Silver relation '{}' is fed by more than one source",
                source.target
            )));
        }
    }

    let mut consolidation_targets = HashSet::new();
    for consolidation in &project.consolidations {
        if !consolidation_targets.insert(consolidation.target.as_str()) {
            return Err(Error::config(format!(
                "Gold relation '{}' is defined twice",
                consolidation.target
            )));
        }
        validate_consolidation(project, consolidation)?;
    }

    Ok(())
}

fn validate_consolidation(
    project: &ProjectDefinition,
    def: &ConsolidationDefinition,
) -> Result<()> {
    if def.name.is_empty() {
        return Err(Error::config("Consolidation name cannot be empty"));
    }
    if !is_identifier(&def.target) {
        return Err(Error::invalid_value(
            format!("{}.target", def.name),
            format!("'{}' is not a valid relation name", def.target),
        ));
    }
    if def.key.is_empty() {
        return Err(Error::missing_field(format!("{}.key", def.name)));
    }
    if def.sources.is_empty() {
        return Err(Error::missing_field(format!("{}.sources", def.name)));
    }

    let mut columns = HashSet::new();
    for schema in def.gold_schema() {
        if !is_identifier(&schema.name) {
            return Err(Error::invalid_value(
                format!("{}.attributes", def.name),
                format!("'{}' is not a valid column name", schema.name),
            ));
        }
        if matches!(schema.name.as_str(), "last_updated_at" | "freshness_source") {
            return Err(Error::invalid_value(
                format!("{}.attributes", def.name),
                format!("'{}' is assigned by the consolidator", schema.name),
            ));
        }
        if !columns.insert(schema.name) {
            return Err(Error::config(format!(
                "Consolidation '{}' declares a column twice",
                def.name
            )));
        }
    }

    let mut contributors = HashSet::new();
    for contributor in &def.sources {
        if !contributors.insert(contributor.name.as_str()) {
            return Err(Error::config(format!(
                "Consolidation '{}' lists contributor '{}' twice",
                def.name, contributor.name
            )));
        }
        if !project
            .resolved_sources
            .iter()
            .any(|s| s.target == contributor.table)
        {
            return Err(Error::config(format!(
                "Consolidation '{}': contributor '{}' reads unknown silver relation '{}'",
                def.name, contributor.name, contributor.table
            )));
        }
        for gold in contributor.columns.keys().chain(contributor.constants.keys()) {
            if !columns.contains(gold) {
                return Err(Error::config(format!(
                    "Consolidation '{}': contributor '{}' maps unknown column '{}'",
                    def.name, contributor.name, gold
                )));
            }
        }
    }

    for attribute in &def.attributes {
        for preferred in &attribute.prefer {
            if !contributors.contains(preferred.as_str()) {
                return Err(Error::config(format!(
                    "Consolidation '{}': attribute '{}' prefers unknown contributor '{}'",
                    def.name, attribute.name, preferred
                )));
            }
        }
    }

    Ok(())
}
