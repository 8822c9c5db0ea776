//! Configuration types
//!
//! Declarative project and source definitions for YAML parsing.

use crate::boundary::Boundary;
use crate::cast::{CastRule, NumberLocale};
use crate::types::{default_scale, ColumnSchema, ColumnType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// Project Definition
// ============================================================================

/// Top-level project definition
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ProjectDefinition {
    /// Project name (used as the watermark pipeline prefix)
    pub name: String,
    /// Store location
    #[serde(default)]
    pub store: StoreDefinition,
    /// Raw input location
    #[serde(default)]
    pub input: InputDefinition,
    /// Normalizer tuning
    #[serde(default)]
    pub normalize: NormalizeSettings,
    /// Run windows
    #[serde(default)]
    pub schedule: ScheduleDefinition,
    /// Sources: built-in names or inline definitions
    pub sources: Vec<SourceRef>,
    /// Consolidated (gold) relations
    #[serde(default)]
    pub consolidations: Vec<ConsolidationDefinition>,
    /// Parquet export location
    #[serde(default)]
    pub export: ExportDefinition,
    /// Sources after built-in references are resolved
    #[serde(skip)]
    pub resolved_sources: Vec<SourceDefinition>,
}

impl ProjectDefinition {
    /// Find a resolved source by name
    pub fn source(&self, name: &str) -> Option<&SourceDefinition> {
        self.resolved_sources.iter().find(|s| s.name == name)
    }

    /// Find a consolidation by name
    pub fn consolidation(&self, name: &str) -> Option<&ConsolidationDefinition> {
        self.consolidations.iter().find(|c| c.name == name)
    }
}

/// A source entry: a built-in name or an inline definition
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SourceRef {
    /// Built-in source by name (e.g. `novaxs_270`)
    Builtin(String),
    /// Inline source definition
    Inline(Box<SourceDefinition>),
}

/// Store location
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct StoreDefinition {
    /// Database file path, or `:memory:`
    #[serde(default = "default_store_path")]
    pub path: String,
    /// Raw lines read per page while normalizing
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

impl Default for StoreDefinition {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            page_size: default_page_size(),
        }
    }
}

fn default_store_path() -> String {
    "tierline.duckdb".to_string()
}

fn default_page_size() -> usize {
    50_000
}

/// Raw input location
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct InputDefinition {
    /// Directory scanned for raw exports
    #[serde(default)]
    pub directory: Option<String>,
    /// File extensions picked up (lower-case, without dot)
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
    /// Text encoding of the raw files
    #[serde(default)]
    pub encoding: Encoding,
}

fn default_extensions() -> Vec<String> {
    vec!["csv".to_string(), "txt".to_string()]
}

/// Text encoding of raw files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Encoding {
    #[serde(rename = "utf-8", alias = "utf8")]
    Utf8,
    #[serde(rename = "latin1", alias = "latin-1", alias = "iso-8859-1")]
    Latin1,
    /// Sample the file and pick UTF-8 when it decodes cleanly
    #[default]
    #[serde(rename = "auto")]
    Auto,
}

/// Normalizer tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct NormalizeSettings {
    /// Buffered data bytes that trigger a flush
    #[serde(default = "default_flush_threshold")]
    pub flush_threshold_bytes: usize,
    /// Maximum rows per loaded batch
    #[serde(default = "default_batch_rows")]
    pub batch_rows: usize,
}

impl Default for NormalizeSettings {
    fn default() -> Self {
        Self {
            flush_threshold_bytes: default_flush_threshold(),
            batch_rows: default_batch_rows(),
        }
    }
}

fn default_flush_threshold() -> usize {
    8 * 1024 * 1024
}

fn default_batch_rows() -> usize {
    200_000
}

/// Parquet export location
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ExportDefinition {
    /// Output directory
    #[serde(default = "default_export_directory")]
    pub directory: String,
}

impl Default for ExportDefinition {
    fn default() -> Self {
        Self {
            directory: default_export_directory(),
        }
    }
}

fn default_export_directory() -> String {
    "ods".to_string()
}

// ============================================================================
// Schedule Definition
// ============================================================================

/// Run windows
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ScheduleDefinition {
    /// Daily windows, `HH:MM` inclusive
    #[serde(default = "default_windows")]
    pub windows: Vec<WindowDefinition>,
    /// Extend the run window across the year boundary (Dec 31 20:00 to Jan 1 03:00)
    #[serde(default = "default_true")]
    pub new_year_event: bool,
    /// Fixed UTC offset in hours; local time when absent
    #[serde(default)]
    pub utc_offset_hours: Option<i32>,
}

impl Default for ScheduleDefinition {
    fn default() -> Self {
        Self {
            windows: default_windows(),
            new_year_event: true,
            utc_offset_hours: None,
        }
    }
}

/// A daily window
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowDefinition {
    pub start: String,
    pub end: String,
}

fn default_windows() -> Vec<WindowDefinition> {
    vec![WindowDefinition {
        start: "08:00".to_string(),
        end: "20:00".to_string(),
    }]
}

fn default_true() -> bool {
    true
}

// ============================================================================
// Source Definition
// ============================================================================

/// One export format and the silver relation it feeds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SourceDefinition {
    /// Source name (e.g. `novaxs_270`)
    pub name: String,
    /// Human description
    #[serde(default)]
    pub description: Option<String>,
    /// Regex over raw table names owned by this source
    pub raw_tables: String,
    /// Silver relation name
    pub target: String,
    /// Header and stop markers
    #[serde(flatten)]
    pub boundary: Boundary,
    /// Field delimiter
    #[serde(default = "default_delimiter")]
    pub delimiter: char,
    /// Number locale
    #[serde(default)]
    pub locale: NumberLocale,
    /// Natural key columns
    pub natural_key: Vec<String>,
    /// Declared columns in output order
    pub columns: Vec<ColumnDefinition>,
    /// Derive rules applied in order after casting
    #[serde(default)]
    pub derive: Vec<DeriveDefinition>,
    /// Row filters
    #[serde(default)]
    pub filters: FilterDefinition,
}

fn default_delimiter() -> char {
    ';'
}

impl SourceDefinition {
    /// Find a declared column
    pub fn column(&self, name: &str) -> Option<&ColumnDefinition> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Columns written to the silver relation, in order
    pub fn persisted_columns(&self) -> impl Iterator<Item = &ColumnDefinition> {
        self.columns.iter().filter(|c| !c.transient)
    }

    /// Schema of the silver relation (without store-assigned columns)
    pub fn silver_schema(&self) -> Vec<ColumnSchema> {
        self.persisted_columns().map(ColumnDefinition::schema).collect()
    }
}

/// A declared column
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ColumnDefinition {
    /// Canonical name
    pub name: String,
    /// Header spellings mapped to this column
    #[serde(default)]
    pub aliases: Vec<String>,
    /// Logical type
    #[serde(default, rename = "type")]
    pub column_type: ColumnType,
    /// Decimal scale
    #[serde(default = "default_scale")]
    pub scale: u32,
    /// Explicit chrono format tried first
    #[serde(default)]
    pub format: Option<String>,
    /// Literals removed before parsing
    #[serde(default)]
    pub strip: Vec<String>,
    /// Lower-case text
    #[serde(default)]
    pub lowercase: bool,
    /// Blank cells inherit the previous non-blank value
    #[serde(default)]
    pub forward_fill: bool,
    /// Derive input only, never persisted
    #[serde(default)]
    pub transient: bool,
}

impl ColumnDefinition {
    /// Cast rule for this column
    pub fn cast_rule(&self) -> CastRule {
        CastRule {
            column_type: self.column_type,
            scale: self.scale,
            format: self.format.clone(),
            strip: self.strip.clone(),
            lowercase: self.lowercase,
        }
    }

    /// Schema entry for this column
    pub fn schema(&self) -> ColumnSchema {
        ColumnSchema {
            name: self.name.clone(),
            column_type: self.column_type,
            scale: self.scale,
        }
    }

    /// Whether a header cell names this column
    pub fn matches_header(&self, header: &str) -> bool {
        header == self.name || self.aliases.iter().any(|a| a == header)
    }
}

/// Derive rules
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeriveDefinition {
    /// One datetime into separate date and time columns
    SplitDatetime {
        from: String,
        date: String,
        time: String,
    },
    /// Separate date and time columns into one datetime
    CombineDatetime {
        date: String,
        time: String,
        into: String,
    },
    /// `"12 - Day use"` into head and tail
    Split {
        from: String,
        #[serde(default = "default_split_delimiter")]
        delimiter: String,
        head: String,
        tail: String,
        #[serde(default)]
        numeric_head: bool,
        #[serde(default)]
        unclassified: UnclassifiedPolicy,
    },
    /// Marker column from a case-insensitive comparison
    Flag {
        from: String,
        equals: String,
        into: String,
        #[serde(default = "default_when_true")]
        when_true: String,
        #[serde(default = "default_when_false")]
        when_false: String,
    },
    /// Regex replacement on a text column
    Replace {
        column: String,
        pattern: String,
        #[serde(default)]
        with: String,
    },
}

impl DeriveDefinition {
    /// Columns this rule reads
    pub fn inputs(&self) -> Vec<&str> {
        match self {
            DeriveDefinition::SplitDatetime { from, .. }
            | DeriveDefinition::Split { from, .. }
            | DeriveDefinition::Flag { from, .. } => vec![from.as_str()],
            DeriveDefinition::CombineDatetime { date, time, .. } => {
                vec![date.as_str(), time.as_str()]
            }
            DeriveDefinition::Replace { column, .. } => vec![column.as_str()],
        }
    }

    /// Columns this rule writes
    pub fn outputs(&self) -> Vec<&str> {
        match self {
            DeriveDefinition::SplitDatetime { date, time, .. } => {
                vec![date.as_str(), time.as_str()]
            }
            DeriveDefinition::CombineDatetime { into, .. } | DeriveDefinition::Flag { into, .. } => {
                vec![into.as_str()]
            }
            DeriveDefinition::Split { head, tail, .. } => vec![head.as_str(), tail.as_str()],
            DeriveDefinition::Replace { column, .. } => vec![column.as_str()],
        }
    }
}

fn default_split_delimiter() -> String {
    " - ".to_string()
}

fn default_when_true() -> String {
    "SIM".to_string()
}

fn default_when_false() -> String {
    "NÃO".to_string()
}

/// What a split does with values it cannot classify
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum UnclassifiedPolicy {
    /// Whole value into head, null tail
    #[default]
    Keep,
    /// Drop the row
    Drop,
    /// Null head, sentinel label into tail
    Label(String),
}

impl From<String> for UnclassifiedPolicy {
    fn from(value: String) -> Self {
        match value.as_str() {
            "keep" => UnclassifiedPolicy::Keep,
            "drop" => UnclassifiedPolicy::Drop,
            _ => UnclassifiedPolicy::Label(value),
        }
    }
}

impl From<UnclassifiedPolicy> for String {
    fn from(value: UnclassifiedPolicy) -> Self {
        match value {
            UnclassifiedPolicy::Keep => "keep".to_string(),
            UnclassifiedPolicy::Drop => "drop".to_string(),
            UnclassifiedPolicy::Label(label) => label,
        }
    }
}

/// Row filters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct FilterDefinition {
    /// Drop rows whose value is null or numerically zero
    #[serde(default)]
    pub drop_if_empty_or_zero: Vec<String>,
    /// Drop rows whose text value is one of the listed values
    #[serde(default)]
    pub exclude: Vec<ExcludeDefinition>,
}

/// Exclusion by value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExcludeDefinition {
    pub column: String,
    pub values: Vec<String>,
}

// ============================================================================
// Consolidation Definition
// ============================================================================

/// A gold relation merged from several silver relations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ConsolidationDefinition {
    /// Consolidation name
    pub name: String,
    /// Gold relation name
    pub target: String,
    /// Natural key columns
    pub key: Vec<KeyColumnDefinition>,
    /// Merged attributes
    pub attributes: Vec<AttributeDefinition>,
    /// Contributing sources; list order is the default tie-break order
    pub sources: Vec<ContributorDefinition>,
}

impl ConsolidationDefinition {
    /// Schema of the key columns followed by the attributes
    pub fn gold_schema(&self) -> Vec<ColumnSchema> {
        self.key
            .iter()
            .map(|k| ColumnSchema {
                name: k.name.clone(),
                column_type: k.column_type,
                scale: k.scale,
            })
            .chain(self.attributes.iter().map(|a| ColumnSchema {
                name: a.name.clone(),
                column_type: a.column_type,
                scale: a.scale,
            }))
            .collect()
    }

    /// Key column names
    pub fn key_names(&self) -> Vec<String> {
        self.key.iter().map(|k| k.name.clone()).collect()
    }
}

/// A key column of a consolidated relation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct KeyColumnDefinition {
    pub name: String,
    #[serde(default, rename = "type")]
    pub column_type: ColumnType,
    #[serde(default = "default_scale")]
    pub scale: u32,
    /// Text applied when a contributor has no value
    #[serde(default)]
    pub default: Option<String>,
}

/// A merged attribute
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct AttributeDefinition {
    pub name: String,
    #[serde(default, rename = "type")]
    pub column_type: ColumnType,
    #[serde(default = "default_scale")]
    pub scale: u32,
    /// Contributor preference order; most recent capture first when empty
    #[serde(default)]
    pub prefer: Vec<String>,
}

/// A contributing silver relation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ContributorDefinition {
    /// Contributor name (used in preferences and `freshness_source`)
    pub name: String,
    /// Silver relation
    pub table: String,
    /// Column holding the capture timestamp
    #[serde(default = "default_captured_at")]
    pub captured_at: String,
    /// Row filter
    #[serde(default)]
    pub filter: Option<ContributorFilter>,
    /// Gold column → silver column
    #[serde(default)]
    pub columns: BTreeMap<String, String>,
    /// Gold column → constant text
    #[serde(default)]
    pub constants: BTreeMap<String, String>,
}

impl ContributorDefinition {
    /// Silver column feeding a gold column (same name when unmapped)
    pub fn column_for<'a>(&'a self, gold: &'a str) -> &'a str {
        self.columns.get(gold).map_or(gold, String::as_str)
    }
}

fn default_captured_at() -> String {
    "ingested_at".to_string()
}

/// Case-insensitive prefix filter on a text column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContributorFilter {
    pub column: String,
    pub starts_with: String,
}
