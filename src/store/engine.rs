//! DuckDB-backed tier store
//!
//! Holds the bronze, silver and gold relations plus the `_control` schema.

use crate::error::{Error, Result};
use crate::store::wire::WireFile;
use crate::types::{CellValue, ColumnSchema, ColumnType, Tier, TypedBatch};
use duckdb::{params, Connection};

/// Schema holding pipeline control tables
pub const CONTROL_SCHEMA: &str = "_control";

/// Quote an identifier for SQL
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quote a string literal for SQL
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// `"schema"."table"`
pub fn qualified(schema: &str, table: &str) -> String {
    format!("{}.{}", quote_ident(schema), quote_ident(table))
}

/// One raw line read back from the bronze tier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLine {
    pub line_no: i64,
    pub raw_line: String,
}

/// Contiguous lines of one capture batch in a raw table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawSpan {
    pub batch_id: String,
    pub source_file: String,
    pub first_line_no: i64,
    pub last_line_no: i64,
}

/// Relational store for all tiers
pub struct Store {
    /// DuckDB connection
    conn: Connection,
    /// Location (file path or `:memory:`)
    location: String,
}

impl Store {
    /// Open a store at a file path, or in memory for `:memory:`
    pub fn open(location: &str) -> Result<Self> {
        let conn = if location == ":memory:" {
            Connection::open_in_memory()
        } else {
            Connection::open(location)
        }
        .map_err(|e| Error::config(format!("Failed to open store '{location}': {e}")))?;

        tracing::debug!(location = location, "Opened store");
        Ok(Self {
            conn,
            location: location.to_string(),
        })
    }

    /// Open an in-memory store
    pub fn open_in_memory() -> Result<Self> {
        Self::open(":memory:")
    }

    /// Another connection to the same database
    pub fn try_clone(&self) -> Result<Self> {
        let conn = self.conn.try_clone()?;
        Ok(Self {
            conn,
            location: self.location.clone(),
        })
    }

    /// Store location
    pub fn location(&self) -> &str {
        &self.location
    }

    /// Underlying connection
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Create tier schemas and control tables
    pub fn bootstrap(&self) -> Result<()> {
        let sql = format!(
            "CREATE SCHEMA IF NOT EXISTS {bronze};
             CREATE SCHEMA IF NOT EXISTS {silver};
             CREATE SCHEMA IF NOT EXISTS {gold};
             CREATE SCHEMA IF NOT EXISTS {control};
             CREATE TABLE IF NOT EXISTS {watermark} (
                 pipeline VARCHAR NOT NULL,
                 entity VARCHAR NOT NULL,
                 watermark_value BIGINT NOT NULL,
                 updated_at TIMESTAMP NOT NULL DEFAULT current_timestamp,
                 PRIMARY KEY (pipeline, entity)
             );",
            bronze = quote_ident(Tier::Bronze.schema()),
            silver = quote_ident(Tier::Silver.schema()),
            gold = quote_ident(Tier::Gold.schema()),
            control = quote_ident(CONTROL_SCHEMA),
            watermark = qualified(CONTROL_SCHEMA, "etl_watermark"),
        );
        self.conn
            .execute_batch(&sql)
            .map_err(|e| Error::config(format!("Failed to bootstrap store: {e}")))?;
        Ok(())
    }

    /// Run `f` inside one transaction; rolls back on error
    pub fn transaction<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        self.conn.execute_batch("BEGIN TRANSACTION")?;
        match f(&self.conn) {
            Ok(value) => {
                self.conn.execute_batch("COMMIT")?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback) = self.conn.execute_batch("ROLLBACK") {
                    tracing::warn!(error = %rollback, "Rollback failed");
                }
                Err(e)
            }
        }
    }

    // ========================================================================
    // Catalog
    // ========================================================================

    /// Whether a relation exists
    pub fn relation_exists(&self, schema: &str, table: &str) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM information_schema.tables
             WHERE table_schema = ? AND table_name = ?",
            params![schema, table],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// List relations of a schema, sorted
    pub fn list_tables(&self, schema: &str) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT table_name FROM information_schema.tables
             WHERE table_schema = ?
             ORDER BY table_name",
        )?;
        let tables = stmt
            .query_map(params![schema], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(tables)
    }

    /// Row count of a relation
    pub fn count_rows(&self, schema: &str, table: &str) -> Result<usize> {
        let sql = format!("SELECT COUNT(*) FROM {}", qualified(schema, table));
        let count: i64 = self.conn.query_row(&sql, [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Declared columns of a relation, in order
    pub fn relation_columns(&self, schema: &str, table: &str) -> Result<Vec<(String, String)>> {
        let mut stmt = self.conn.prepare(
            "SELECT column_name, data_type FROM information_schema.columns
             WHERE table_schema = ? AND table_name = ?
             ORDER BY ordinal_position",
        )?;
        let columns = stmt
            .query_map(params![schema, table], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        if columns.is_empty() {
            return Err(Error::RelationNotFound {
                relation: format!("{schema}.{table}"),
            });
        }
        Ok(columns)
    }

    // ========================================================================
    // Bronze
    // ========================================================================

    /// Create a raw capture table
    pub fn ensure_raw_table(&self, table: &str) -> Result<()> {
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} (
                 line_no BIGINT NOT NULL,
                 raw_line VARCHAR,
                 source_file VARCHAR NOT NULL,
                 batch_id VARCHAR NOT NULL,
                 captured_at TIMESTAMP NOT NULL DEFAULT current_timestamp
             )",
            qualified(Tier::Bronze.schema(), table)
        );
        self.conn.execute_batch(&sql)?;
        Ok(())
    }

    /// Highest line number in a raw table (0 when empty)
    pub fn raw_max_line_no(&self, table: &str) -> Result<i64> {
        let sql = format!(
            "SELECT COALESCE(MAX(line_no), 0) FROM {}",
            qualified(Tier::Bronze.schema(), table)
        );
        Ok(self.conn.query_row(&sql, [], |row| row.get(0))?)
    }

    /// Whether a file name was already captured into a raw table
    pub fn raw_has_file(&self, table: &str, source_file: &str) -> Result<bool> {
        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE source_file = ?",
            qualified(Tier::Bronze.schema(), table)
        );
        let count: i64 = self
            .conn
            .query_row(&sql, params![source_file], |row| row.get(0))?;
        Ok(count > 0)
    }

    /// Bulk-append raw lines from a wire file into a raw table
    pub fn copy_raw_lines(&self, table: &str, wire: &WireFile) -> Result<usize> {
        let sql = format!(
            "COPY {} (line_no, raw_line, source_file, batch_id) FROM {} {}",
            qualified(Tier::Bronze.schema(), table),
            quote_literal(&wire.path_str()),
            wire.copy_options()
        );
        let rows = self.conn.execute(&sql, []).map_err(|e| {
            Error::load_failure(format!("{}.{table}", Tier::Bronze.schema()), e.to_string())
        })?;
        Ok(rows)
    }

    /// Capture batches with lines after `after_line_no`, in line order
    pub fn raw_spans(&self, table: &str, after_line_no: i64) -> Result<Vec<RawSpan>> {
        let sql = format!(
            "SELECT batch_id, MIN(source_file), MIN(line_no), MAX(line_no) FROM {}
             WHERE line_no > ?
             GROUP BY batch_id
             ORDER BY MIN(line_no)",
            qualified(Tier::Bronze.schema(), table)
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let spans = stmt
            .query_map(params![after_line_no], |row| {
                Ok(RawSpan {
                    batch_id: row.get(0)?,
                    source_file: row.get(1)?,
                    first_line_no: row.get(2)?,
                    last_line_no: row.get(3)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(spans)
    }

    /// Read one page of raw lines in `(after_line_no, until_line_no]` (keyset pagination)
    pub fn read_raw_page(
        &self,
        table: &str,
        after_line_no: i64,
        until_line_no: i64,
        limit: usize,
    ) -> Result<Vec<RawLine>> {
        let sql = format!(
            "SELECT line_no, COALESCE(raw_line, '') FROM {}
             WHERE line_no > ? AND line_no <= ?
             ORDER BY line_no ASC LIMIT {limit}",
            qualified(Tier::Bronze.schema(), table)
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let lines = stmt
            .query_map(params![after_line_no, until_line_no], |row| {
                Ok(RawLine {
                    line_no: row.get(0)?,
                    raw_line: row.get(1)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(lines)
    }

    // ========================================================================
    // Silver and Gold
    // ========================================================================

    /// Create a silver relation with a natural-key constraint
    pub fn ensure_silver_table(
        &self,
        table: &str,
        columns: &[ColumnSchema],
        natural_key: &[String],
    ) -> Result<()> {
        let mut defs: Vec<String> = columns
            .iter()
            .map(|c| format!("{} {}", quote_ident(&c.name), c.sql_type()))
            .collect();
        defs.push("source_lineage VARCHAR".to_string());
        defs.push("ingested_at TIMESTAMP NOT NULL DEFAULT current_timestamp".to_string());
        defs.push(primary_key(natural_key));

        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            qualified(Tier::Silver.schema(), table),
            defs.join(", ")
        );
        self.conn.execute_batch(&sql)?;
        Ok(())
    }

    /// Create a gold relation keyed by its natural key
    pub fn ensure_gold_table(
        &self,
        table: &str,
        columns: &[ColumnSchema],
        key: &[String],
    ) -> Result<()> {
        let mut defs: Vec<String> = columns
            .iter()
            .map(|c| format!("{} {}", quote_ident(&c.name), c.sql_type()))
            .collect();
        defs.push("last_updated_at TIMESTAMP".to_string());
        defs.push("freshness_source VARCHAR".to_string());
        defs.push(primary_key(key));

        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            qualified(Tier::Gold.schema(), table),
            defs.join(", ")
        );
        self.conn.execute_batch(&sql)?;
        Ok(())
    }

    /// Create a temporary staging relation and fill it from a wire file
    pub fn stage(&self, name: &str, columns: &[ColumnSchema], wire: &WireFile) -> Result<usize> {
        let defs: Vec<String> = std::iter::once("_ord BIGINT".to_string())
            .chain(
                columns
                    .iter()
                    .map(|c| format!("{} {}", quote_ident(&c.name), c.sql_type())),
            )
            .collect();
        let stage = quote_ident(name);
        self.conn.execute_batch(&format!(
            "DROP TABLE IF EXISTS {stage}; CREATE TEMP TABLE {stage} ({});",
            defs.join(", ")
        ))?;
        let copied = self.conn.execute(
            &format!(
                "COPY {stage} FROM {} {}",
                quote_literal(&wire.path_str()),
                wire.copy_options()
            ),
            [],
        )?;
        Ok(copied)
    }

    /// Drop a staging relation
    pub fn drop_stage(&self, name: &str) -> Result<()> {
        self.conn
            .execute_batch(&format!("DROP TABLE IF EXISTS {}", quote_ident(name)))?;
        Ok(())
    }

    /// Read columns of a relation as a typed batch.
    ///
    /// `prefix_filter` keeps rows whose text value of a column starts with a
    /// prefix, case-insensitively.
    pub fn read_typed(
        &self,
        schema: &str,
        table: &str,
        columns: &[ColumnSchema],
        prefix_filter: Option<(&str, &str)>,
    ) -> Result<TypedBatch> {
        let select: Vec<String> = columns.iter().map(select_expr).collect();
        let mut sql = format!(
            "SELECT {} FROM {}",
            select.join(", "),
            qualified(schema, table)
        );
        if let Some((column, prefix)) = prefix_filter {
            sql.push_str(&format!(
                " WHERE starts_with(lower(CAST({} AS VARCHAR)), lower({}))",
                quote_ident(column),
                quote_literal(prefix)
            ));
        }

        tracing::debug!("Executing query: {}", sql);

        let mut stmt = self.conn.prepare(&sql)?;
        let mut batch = TypedBatch::new(table, columns.to_vec());
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let mut cells = Vec::with_capacity(columns.len());
            for (idx, column) in columns.iter().enumerate() {
                cells.push(read_cell(row, idx, column.column_type)?);
            }
            batch.push_row(cells);
        }
        Ok(batch)
    }

    // ========================================================================
    // Watermarks
    // ========================================================================

    /// Last fully processed line number for a pipeline entity
    pub fn get_watermark(&self, pipeline: &str, entity: &str) -> Result<Option<i64>> {
        let sql = format!(
            "SELECT watermark_value FROM {} WHERE pipeline = ? AND entity = ?",
            qualified(CONTROL_SCHEMA, "etl_watermark")
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params![pipeline, entity])?;
        match rows.next()? {
            Some(row) => Ok(Some(row.get(0)?)),
            None => Ok(None),
        }
    }

    /// Record the last fully processed line number
    pub fn set_watermark(&self, pipeline: &str, entity: &str, value: i64) -> Result<()> {
        let sql = format!(
            "INSERT INTO {} (pipeline, entity, watermark_value, updated_at)
             VALUES (?, ?, ?, current_timestamp)
             ON CONFLICT (pipeline, entity) DO UPDATE SET
                 watermark_value = EXCLUDED.watermark_value,
                 updated_at = EXCLUDED.updated_at",
            qualified(CONTROL_SCHEMA, "etl_watermark")
        );
        self.conn.execute(&sql, params![pipeline, entity, value])?;
        Ok(())
    }
}

fn primary_key(columns: &[String]) -> String {
    let cols: Vec<String> = columns.iter().map(|c| quote_ident(c)).collect();
    format!("PRIMARY KEY ({})", cols.join(", "))
}

/// Select expression reading a column back in a type `read_cell` understands
fn select_expr(column: &ColumnSchema) -> String {
    let ident = quote_ident(&column.name);
    match column.column_type {
        ColumnType::Integer => format!("CAST({ident} AS BIGINT)"),
        ColumnType::Decimal => format!("CAST({ident} AS DOUBLE)"),
        _ => format!("CAST({ident} AS VARCHAR)"),
    }
}

fn read_cell(row: &duckdb::Row<'_>, idx: usize, column_type: ColumnType) -> Result<CellValue> {
    let cell = match column_type {
        ColumnType::Integer => row
            .get::<_, Option<i64>>(idx)?
            .map_or(CellValue::Null, CellValue::Integer),
        ColumnType::Decimal => row
            .get::<_, Option<f64>>(idx)?
            .map_or(CellValue::Null, CellValue::Decimal),
        other => CellValue::from_store_text(row.get::<_, Option<String>>(idx)?, other),
    };
    Ok(cell)
}
