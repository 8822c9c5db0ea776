//! Per-source normalization plan
//!
//! Compiles a source definition into header matching, casting, derive
//! and filter steps applied to each parsed record.

use crate::boundary::strip_bom;
use crate::cast::{CastOutcome, CastRule, CastStats, Caster};
use crate::config::{ColumnDefinition, DeriveDefinition, SourceDefinition, UnclassifiedPolicy};
use crate::error::{Error, Result};
use crate::types::{CellValue, ColumnSchema};
use csv::StringRecord;
use regex::Regex;

/// Where each declared column is found in a header
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderMap {
    /// Header cell index per declared column
    pub positions: Vec<Option<usize>>,
    /// Header cells with no name (dropped)
    pub anonymous: usize,
    /// Named header cells no column claims
    pub unknown: Vec<String>,
}

impl HeaderMap {
    /// Declared columns that were not found
    pub fn missing<'a>(&self, plan: &'a NormalizePlan) -> Vec<&'a str> {
        self.positions
            .iter()
            .zip(&plan.columns)
            .filter(|(pos, col)| pos.is_none() && !plan.is_derived(&col.def.name))
            .map(|(_, col)| col.def.name.as_str())
            .collect()
    }
}

/// Last non-blank raw value per forward-filled column
#[derive(Debug, Clone, Default)]
pub struct ForwardFill {
    last: Vec<Option<String>>,
}

#[derive(Debug, Clone)]
struct PlannedColumn {
    def: ColumnDefinition,
    rule: CastRule,
}

#[derive(Debug, Clone)]
enum CompiledDerive {
    SplitDatetime {
        from: usize,
        date: usize,
        time: usize,
    },
    CombineDatetime {
        date: usize,
        time: usize,
        into: usize,
    },
    Split {
        from: usize,
        delimiter: String,
        head: usize,
        tail: usize,
        numeric_head: bool,
        unclassified: UnclassifiedPolicy,
    },
    Flag {
        from: usize,
        equals: String,
        into: usize,
        when_true: String,
        when_false: String,
    },
    Replace {
        column: usize,
        pattern: Regex,
        with: String,
    },
}

/// Compiled normalization steps for one source
#[derive(Debug, Clone)]
pub struct NormalizePlan {
    source: String,
    columns: Vec<PlannedColumn>,
    derive: Vec<CompiledDerive>,
    derived: Vec<bool>,
    drop_if_empty_or_zero: Vec<usize>,
    exclude: Vec<(usize, Vec<String>)>,
    persisted: Vec<usize>,
    schema: Vec<ColumnSchema>,
    caster: Caster,
}

impl NormalizePlan {
    /// Compile a validated source definition
    pub fn compile(def: &SourceDefinition) -> Result<Self> {
        let index = |name: &str| -> Result<usize> {
            def.columns
                .iter()
                .position(|c| c.name == name)
                .ok_or_else(|| {
                    Error::config(format!(
                        "Source '{}': column '{}' is not declared",
                        def.name, name
                    ))
                })
        };

        let columns: Vec<PlannedColumn> = def
            .columns
            .iter()
            .map(|c| PlannedColumn {
                def: c.clone(),
                rule: c.cast_rule(),
            })
            .collect();

        let mut derived = vec![false; columns.len()];
        let mut derive = Vec::with_capacity(def.derive.len());
        for rule in &def.derive {
            for output in rule.outputs() {
                derived[index(output)?] = true;
            }
            derive.push(match rule {
                DeriveDefinition::SplitDatetime { from, date, time } => {
                    CompiledDerive::SplitDatetime {
                        from: index(from)?,
                        date: index(date)?,
                        time: index(time)?,
                    }
                }
                DeriveDefinition::CombineDatetime { date, time, into } => {
                    CompiledDerive::CombineDatetime {
                        date: index(date)?,
                        time: index(time)?,
                        into: index(into)?,
                    }
                }
                DeriveDefinition::Split {
                    from,
                    delimiter,
                    head,
                    tail,
                    numeric_head,
                    unclassified,
                } => CompiledDerive::Split {
                    from: index(from)?,
                    delimiter: delimiter.clone(),
                    head: index(head)?,
                    tail: index(tail)?,
                    numeric_head: *numeric_head,
                    unclassified: unclassified.clone(),
                },
                DeriveDefinition::Flag {
                    from,
                    equals,
                    into,
                    when_true,
                    when_false,
                } => CompiledDerive::Flag {
                    from: index(from)?,
                    equals: equals.trim().to_lowercase(),
                    into: index(into)?,
                    when_true: when_true.clone(),
                    when_false: when_false.clone(),
                },
                DeriveDefinition::Replace {
                    column,
                    pattern,
                    with,
                } => CompiledDerive::Replace {
                    column: index(column)?,
                    pattern: Regex::new(pattern)?,
                    with: with.clone(),
                },
            });
        }

        let drop_if_empty_or_zero = def
            .filters
            .drop_if_empty_or_zero
            .iter()
            .map(|c| index(c))
            .collect::<Result<Vec<_>>>()?;
        let exclude = def
            .filters
            .exclude
            .iter()
            .map(|e| Ok((index(&e.column)?, e.values.clone())))
            .collect::<Result<Vec<_>>>()?;

        let persisted: Vec<usize> = columns
            .iter()
            .enumerate()
            .filter(|(_, c)| !c.def.transient)
            .map(|(i, _)| i)
            .collect();
        let schema = persisted.iter().map(|&i| columns[i].def.schema()).collect();

        Ok(Self {
            source: def.name.clone(),
            columns,
            derive,
            derived,
            drop_if_empty_or_zero,
            exclude,
            persisted,
            schema,
            caster: Caster::new(def.locale),
        })
    }

    /// Source name
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Output schema (persisted columns, declaration order)
    pub fn schema(&self) -> &[ColumnSchema] {
        &self.schema
    }

    fn is_derived(&self, name: &str) -> bool {
        self.columns
            .iter()
            .zip(&self.derived)
            .any(|(c, &d)| d && c.def.name == name)
    }

    /// Match header cells to declared columns.
    ///
    /// A header cell is claimed by the first declared column whose name or
    /// alias equals it; anonymous cells are dropped.
    pub fn map_header(&self, header: &StringRecord) -> HeaderMap {
        let mut map = HeaderMap {
            positions: vec![None; self.columns.len()],
            ..HeaderMap::default()
        };

        for (cell_idx, cell) in header.iter().enumerate() {
            let name = strip_bom(cell).trim();
            if name.is_empty() || name.to_lowercase().starts_with("unnamed") {
                map.anonymous += 1;
                continue;
            }
            let claimed = self
                .columns
                .iter()
                .enumerate()
                .find(|(col_idx, c)| map.positions[*col_idx].is_none() && c.def.matches_header(name));
            match claimed {
                Some((col_idx, _)) => map.positions[col_idx] = Some(cell_idx),
                None => map.unknown.push(name.to_string()),
            }
        }

        map
    }

    /// Create forward-fill state for this plan
    pub fn forward_fill_state(&self) -> ForwardFill {
        ForwardFill {
            last: vec![None; self.columns.len()],
        }
    }

    /// Turn one parsed record into a persisted row, or `None` when filtered out
    pub fn transform(
        &self,
        record: &StringRecord,
        header: &HeaderMap,
        fill: &mut ForwardFill,
        stats: &mut CastStats,
    ) -> Option<Vec<CellValue>> {
        if record.iter().all(|cell| cell.trim().is_empty()) {
            return None;
        }
        let mut row: Vec<CellValue> = Vec::with_capacity(self.columns.len());

        for (col_idx, column) in self.columns.iter().enumerate() {
            let raw = header.positions[col_idx].and_then(|pos| record.get(pos));
            let raw = if column.def.forward_fill {
                match raw {
                    Some(value) if !value.trim().is_empty() => {
                        fill.last[col_idx] = Some(value.to_string());
                        Some(value)
                    }
                    _ => fill.last[col_idx].as_deref(),
                }
            } else {
                raw
            };

            let value = match raw {
                None => CellValue::Null,
                Some(raw) => self.cast_cell(raw, col_idx, stats),
            };
            row.push(value);
        }

        for rule in &self.derive {
            if !self.apply_derive(rule, &mut row, stats) {
                return None;
            }
        }

        if !self.passes_filters(&row) {
            return None;
        }

        let persisted: Vec<CellValue> = self.persisted.iter().map(|&i| row[i].clone()).collect();
        if persisted.iter().all(CellValue::is_null) {
            return None;
        }
        Some(persisted)
    }

    fn cast_cell(&self, raw: &str, col_idx: usize, stats: &mut CastStats) -> CellValue {
        let column = &self.columns[col_idx];
        let outcome = self.caster.cast(raw, &column.rule);
        if let CastOutcome::Unparseable(ref text) = outcome {
            tracing::trace!(
                source = %self.source,
                column = %column.def.name,
                value = %text,
                "Unparseable cell"
            );
            stats.record(&column.def.name);
        }
        outcome.into_value()
    }

    /// Apply one derive rule; `false` drops the row
    fn apply_derive(
        &self,
        rule: &CompiledDerive,
        row: &mut [CellValue],
        stats: &mut CastStats,
    ) -> bool {
        match rule {
            CompiledDerive::SplitDatetime { from, date, time } => {
                match row[*from].as_datetime() {
                    Some(dt) => {
                        row[*date] = CellValue::Date(dt.date());
                        row[*time] = CellValue::Time(dt.time());
                    }
                    None => {
                        row[*date] = CellValue::Null;
                        row[*time] = CellValue::Null;
                    }
                }
            }
            CompiledDerive::CombineDatetime { date, time, into } => {
                let combined = match (&row[*date], &row[*time]) {
                    (CellValue::Date(d), CellValue::Time(t)) => CellValue::Datetime(d.and_time(*t)),
                    (CellValue::Date(d), _) => d
                        .and_hms_opt(0, 0, 0)
                        .map_or(CellValue::Null, CellValue::Datetime),
                    (CellValue::Datetime(dt), _) => CellValue::Datetime(*dt),
                    _ => CellValue::Null,
                };
                row[*into] = combined;
            }
            CompiledDerive::Split {
                from,
                delimiter,
                head,
                tail,
                numeric_head,
                unclassified,
            } => {
                let value = match &row[*from] {
                    CellValue::Null => None,
                    other => Some(other.to_wire()),
                };
                let parts = value.as_deref().and_then(|v| {
                    let (h, t) = v.split_once(delimiter.as_str())?;
                    let h = if *numeric_head {
                        let compact: String = h.chars().filter(|c| !c.is_whitespace()).collect();
                        if compact.is_empty() || !compact.chars().all(|c| c.is_ascii_digit()) {
                            return None;
                        }
                        compact
                    } else {
                        h.trim().to_string()
                    };
                    Some((h, t.trim().to_string()))
                });

                match (parts, unclassified) {
                    (Some((h, t)), _) => {
                        row[*head] = self.cast_cell(&h, *head, stats);
                        row[*tail] = self.cast_cell(&t, *tail, stats);
                    }
                    (None, UnclassifiedPolicy::Drop) => return false,
                    (None, UnclassifiedPolicy::Keep) => {
                        row[*head] = match value {
                            Some(v) => self.cast_cell(&v, *head, stats),
                            None => CellValue::Null,
                        };
                        row[*tail] = CellValue::Null;
                    }
                    (None, UnclassifiedPolicy::Label(label)) => {
                        row[*head] = CellValue::Null;
                        row[*tail] = CellValue::Text(label.clone());
                    }
                }
            }
            CompiledDerive::Flag {
                from,
                equals,
                into,
                when_true,
                when_false,
            } => {
                let matched = row[*from]
                    .as_text()
                    .is_some_and(|v| v.trim().to_lowercase() == *equals);
                row[*into] = CellValue::Text(if matched {
                    when_true.clone()
                } else {
                    when_false.clone()
                });
            }
            CompiledDerive::Replace {
                column,
                pattern,
                with,
            } => {
                if let CellValue::Text(text) = &row[*column] {
                    let replaced = pattern.replace_all(text, with.as_str()).into_owned();
                    row[*column] = CellValue::Text(replaced);
                }
            }
        }
        true
    }

    fn passes_filters(&self, row: &[CellValue]) -> bool {
        for &idx in &self.drop_if_empty_or_zero {
            let zero = match &row[idx] {
                CellValue::Null => true,
                CellValue::Integer(i) => *i == 0,
                CellValue::Decimal(d) => *d == 0.0,
                CellValue::Text(s) => self
                    .caster
                    .parse_decimal(s.trim().trim_end_matches('%'))
                    .is_some_and(|d| d == 0.0),
                _ => false,
            };
            if zero {
                return false;
            }
        }
        for (idx, values) in &self.exclude {
            if let Some(text) = row[*idx].as_text() {
                if values.iter().any(|v| v == text) {
                    return false;
                }
            }
        }
        true
    }
}
