//! Error types for tierline
//!
//! This module defines the error hierarchy for the whole pipeline.
//! All public APIs return `Result<T, Error>` where Error is defined here.
//! Per-cell cast failures are not errors: they surface as
//! [`CastOutcome::Unparseable`](crate::cast::CastOutcome) and become nulls.

use thiserror::Error;

/// The main error type for tierline
#[derive(Error, Debug)]
pub enum Error {
    // ============================================================================
    // Configuration Errors
    // ============================================================================
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Missing required config field: {field}")]
    MissingConfigField { field: String },

    #[error("Invalid config value for '{field}': {message}")]
    InvalidConfigValue { field: String, message: String },

    #[error("Failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("Failed to serialize JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid pattern: {0}")]
    Regex(#[from] regex::Error),

    // ============================================================================
    // Boundary Errors
    // ============================================================================
    #[error("Header with prefix '{prefix}' not found in '{table}'")]
    BoundaryNotFound { table: String, prefix: String },

    #[error("Table in '{table}' has a header but no data rows")]
    EmptyTable { table: String },

    // ============================================================================
    // Parsing Errors
    // ============================================================================
    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Failed to parse buffered chunk of '{table}': {message}")]
    ChunkParse { table: String, message: String },

    // ============================================================================
    // Store Errors
    // ============================================================================
    #[error("Store error: {0}")]
    Store(#[from] duckdb::Error),

    #[error("Bulk load into '{relation}' rejected: {message}")]
    LoadFailure { relation: String, message: String },

    #[error("Source '{source_name}' unavailable: {message}")]
    SourceSystemUnavailable {
        source_name: String,
        message: String,
    },

    #[error("Relation '{relation}' not found")]
    RelationNotFound { relation: String },

    // ============================================================================
    // Output Errors
    // ============================================================================
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("Output error: {message}")]
    Output { message: String },

    // ============================================================================
    // I/O Errors
    // ============================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("File not found: {path}")]
    FileNotFound { path: String },

    // ============================================================================
    // Generic Errors
    // ============================================================================
    #[error("{0}")]
    Other(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl Error {
    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a missing field error
    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingConfigField {
            field: field.into(),
        }
    }

    /// Create an invalid value error
    pub fn invalid_value(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfigValue {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a boundary-not-found error
    pub fn boundary_not_found(table: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self::BoundaryNotFound {
            table: table.into(),
            prefix: prefix.into(),
        }
    }

    /// Create an empty-table error
    pub fn empty_table(table: impl Into<String>) -> Self {
        Self::EmptyTable {
            table: table.into(),
        }
    }

    /// Create a load failure
    pub fn load_failure(relation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::LoadFailure {
            relation: relation.into(),
            message: message.into(),
        }
    }

    /// Create a source-unavailable error
    pub fn source_unavailable(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SourceSystemUnavailable {
            source_name: source_name.into(),
            message: message.into(),
        }
    }

    /// Create an output error
    pub fn output(message: impl Into<String>) -> Self {
        Self::Output {
            message: message.into(),
        }
    }

    /// Whether this error means "nothing to do here" rather than a failure
    pub fn is_skippable(&self) -> bool {
        matches!(self, Error::EmptyTable { .. })
    }
}

/// Result type alias for tierline
pub type Result<T> = std::result::Result<T, Error>;

/// Extension trait for adding context to errors
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, message: impl Into<String>) -> Result<T>;

    /// Add context with a closure (lazy evaluation)
    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T>;
}

impl<T, E: Into<Error>> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.map_err(|e| {
            let inner = e.into();
            Error::Other(format!("{}: {}", message.into(), inner))
        })
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        self.map_err(|e| {
            let inner = e.into();
            Error::Other(format!("{}: {}", f(), inner))
        })
    }
}
