//! Cell caster implementation

use crate::types::{default_scale, CellValue, ColumnType};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

/// Literal cell contents treated as "no value"
pub const NULL_MARKERS: &[&str] = &["", "NULL", "null", "nan", "NaN", "None"];

/// Day-first datetime formats tried after the explicit format
const DATETIME_FALLBACKS: &[&str] = &[
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
    "%d-%m-%Y %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

/// Day-first date formats tried after the explicit format
const DATE_FALLBACKS: &[&str] = &["%d/%m/%Y", "%d-%m-%Y", "%Y-%m-%d"];

const TIME_FORMATS: &[&str] = &["%H:%M:%S%.f", "%H:%M"];

/// Result of casting one cell
#[derive(Debug, Clone, PartialEq)]
pub enum CastOutcome {
    /// The cell held a value of the requested type
    Parsed(CellValue),
    /// The cell was blank or a null marker
    Empty,
    /// The cell held something that is not a value of the requested type
    Unparseable(String),
}

impl CastOutcome {
    /// Collapse into a cell; failures become null
    pub fn into_value(self) -> CellValue {
        match self {
            CastOutcome::Parsed(value) => value,
            CastOutcome::Empty | CastOutcome::Unparseable(_) => CellValue::Null,
        }
    }

    /// Whether the cast failed
    pub fn is_unparseable(&self) -> bool {
        matches!(self, CastOutcome::Unparseable(_))
    }
}

/// Decimal and thousands separators used by a source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NumberLocale {
    /// Decimal separator
    #[serde(default = "default_decimal_separator")]
    pub decimal_separator: char,

    /// Thousands separator (removed before the decimal separator is substituted)
    #[serde(default = "default_thousands_separator")]
    pub thousands_separator: Option<char>,
}

fn default_decimal_separator() -> char {
    ','
}

fn default_thousands_separator() -> Option<char> {
    Some('.')
}

impl Default for NumberLocale {
    fn default() -> Self {
        Self {
            decimal_separator: default_decimal_separator(),
            thousands_separator: default_thousands_separator(),
        }
    }
}

impl NumberLocale {
    /// Plain `1234.56` numbers
    pub fn dot_decimal() -> Self {
        Self {
            decimal_separator: '.',
            thousands_separator: None,
        }
    }
}

/// How a single column is cast
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CastRule {
    pub column_type: ColumnType,
    pub scale: u32,
    /// Explicit chrono format tried before the permissive fallbacks
    pub format: Option<String>,
    /// Literal substrings removed before parsing (e.g. `°`, `%`)
    pub strip: Vec<String>,
    /// Lower-case text values
    pub lowercase: bool,
}

impl CastRule {
    /// Rule for a type with default scale and no extras
    pub fn of(column_type: ColumnType) -> Self {
        Self {
            column_type,
            scale: default_scale(),
            ..Default::default()
        }
    }

    /// Set an explicit format
    #[must_use]
    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    /// Set the decimal scale
    #[must_use]
    pub fn with_scale(mut self, scale: u32) -> Self {
        self.scale = scale;
        self
    }

    /// Add a literal to strip
    #[must_use]
    pub fn with_strip(mut self, literal: impl Into<String>) -> Self {
        self.strip.push(literal.into());
        self
    }

    /// Lower-case text values
    #[must_use]
    pub fn lowercased(mut self) -> Self {
        self.lowercase = true;
        self
    }
}

/// Counters of unparseable cells per column
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CastStats {
    /// Total unparseable cells
    pub unparseable: usize,
    /// Unparseable cells per canonical column
    pub by_column: std::collections::BTreeMap<String, usize>,
}

impl CastStats {
    /// Record one failed cell
    pub fn record(&mut self, column: &str) {
        self.unparseable += 1;
        *self.by_column.entry(column.to_string()).or_default() += 1;
    }

    /// Fold another set of counters into this one
    pub fn merge(&mut self, other: &CastStats) {
        self.unparseable += other.unparseable;
        for (column, count) in &other.by_column {
            *self.by_column.entry(column.clone()).or_default() += count;
        }
    }
}

/// Pure, deterministic cell caster
#[derive(Debug, Clone, Copy, Default)]
pub struct Caster {
    locale: NumberLocale,
}

impl Caster {
    /// Create a caster for a number locale
    pub fn new(locale: NumberLocale) -> Self {
        Self { locale }
    }

    /// Number locale in use
    pub fn locale(&self) -> NumberLocale {
        self.locale
    }

    /// Cast one raw cell
    pub fn cast(&self, raw: &str, rule: &CastRule) -> CastOutcome {
        let mut text = raw.trim().to_string();
        for literal in &rule.strip {
            text = text.replace(literal.as_str(), "");
        }
        let text = text.trim();

        if NULL_MARKERS.contains(&text) {
            return CastOutcome::Empty;
        }

        let parsed = match rule.column_type {
            ColumnType::Text => Some(CellValue::Text(if rule.lowercase {
                text.to_lowercase()
            } else {
                text.to_string()
            })),
            ColumnType::Decimal => self
                .parse_decimal(text)
                .map(|d| CellValue::Decimal(round_to(d, rule.scale))),
            ColumnType::Integer => self.parse_decimal(text).and_then(|d| {
                let truncated = d.trunc();
                (truncated.abs() < 9.0e15).then(|| CellValue::Integer(truncated as i64))
            }),
            ColumnType::Datetime => {
                parse_datetime(text, rule.format.as_deref()).map(CellValue::Datetime)
            }
            ColumnType::Date => parse_date(text, rule.format.as_deref()).map(CellValue::Date),
            ColumnType::Time => parse_time(text, rule.format.as_deref()).map(CellValue::Time),
        };

        match parsed {
            Some(value) => CastOutcome::Parsed(value),
            None => CastOutcome::Unparseable(text.to_string()),
        }
    }

    /// Parse a locale-formatted number.
    ///
    /// The thousands separator is removed first, then the decimal separator
    /// is replaced with `.`.
    pub fn parse_decimal(&self, text: &str) -> Option<f64> {
        let mut cleaned: String = text
            .trim_start_matches("R$")
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();
        if let Some(thousands) = self.locale.thousands_separator {
            cleaned.retain(|c| c != thousands);
        }
        if self.locale.decimal_separator != '.' {
            cleaned = cleaned.replace(self.locale.decimal_separator, ".");
        }
        if cleaned.is_empty() {
            return None;
        }
        cleaned.parse::<f64>().ok().filter(|d| d.is_finite())
    }
}

/// Round half away from zero to `scale` places
fn round_to(value: f64, scale: u32) -> f64 {
    let factor = 10f64.powi(scale as i32);
    (value * factor).round() / factor
}

/// Parse a datetime: explicit format first, then day-first fallbacks, then date-only at midnight
pub(crate) fn parse_datetime(text: &str, format: Option<&str>) -> Option<NaiveDateTime> {
    if let Some(format) = format {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, format) {
            return Some(dt);
        }
        if let Ok(d) = NaiveDate::parse_from_str(text, format) {
            return d.and_hms_opt(0, 0, 0);
        }
    }
    DATETIME_FALLBACKS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(text, f).ok())
        .or_else(|| {
            DATE_FALLBACKS
                .iter()
                .find_map(|f| NaiveDate::parse_from_str(text, f).ok())
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

fn parse_date(text: &str, format: Option<&str>) -> Option<NaiveDate> {
    if let Some(format) = format {
        if let Ok(d) = NaiveDate::parse_from_str(text, format) {
            return Some(d);
        }
    }
    parse_datetime(text, format).map(|dt| dt.date())
}

fn parse_time(text: &str, format: Option<&str>) -> Option<NaiveTime> {
    if let Some(format) = format {
        if let Ok(t) = NaiveTime::parse_from_str(text, format) {
            return Some(t);
        }
    }
    TIME_FORMATS
        .iter()
        .find_map(|f| NaiveTime::parse_from_str(text, f).ok())
        .or_else(|| {
            DATETIME_FALLBACKS
                .iter()
                .find_map(|f| NaiveDateTime::parse_from_str(text, f).ok())
                .map(|dt| dt.time())
        })
}
