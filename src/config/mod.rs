//! Project configuration
//!
//! Parse project files and source definitions from YAML.
//!
//! # Overview
//!
//! The config module provides:
//! - `ProjectDefinition` - store, input, schedule, sources and consolidations
//! - `SourceDefinition` - one export format: boundary, columns, natural key, derive rules
//! - `ConsolidationDefinition` - a gold relation merged from several silver relations
//! - YAML parsing with validation

mod parser;
mod types;

pub use parser::{
    is_identifier, load_project, load_project_from_str, load_source, load_source_from_str,
    validate_project, validate_source,
};
pub use types::{
    AttributeDefinition, ColumnDefinition, ConsolidationDefinition, ContributorDefinition,
    ContributorFilter, DeriveDefinition, Encoding, ExcludeDefinition, ExportDefinition,
    FilterDefinition, InputDefinition, KeyColumnDefinition, NormalizeSettings, ProjectDefinition,
    ScheduleDefinition, SourceDefinition, SourceRef, StoreDefinition, UnclassifiedPolicy,
    WindowDefinition,
};

#[cfg(test)]
mod tests;
