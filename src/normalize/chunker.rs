//! Streaming chunked normalizer
//!
//! State machine over raw lines: seek the header, buffer data lines under a
//! byte threshold, flush each buffer as typed batches into a sink.

use crate::boundary::{strip_bom, Boundary};
use crate::cast::CastStats;
use crate::config::NormalizeSettings;
use crate::error::{Error, Result};
use crate::normalize::plan::{ForwardFill, HeaderMap, NormalizePlan};
use crate::types::TypedBatch;
use csv::{ReaderBuilder, StringRecord};

/// Receives typed batches as they are produced
pub trait BatchSink {
    /// Load a batch; returns the number of rows actually inserted
    fn load(&mut self, batch: TypedBatch) -> Result<usize>;
}

impl<F> BatchSink for F
where
    F: FnMut(TypedBatch) -> Result<usize>,
{
    fn load(&mut self, batch: TypedBatch) -> Result<usize> {
        self(batch)
    }
}

/// Counters for one normalized raw table
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizeStats {
    /// Raw lines offered to the normalizer
    pub lines_seen: usize,
    /// Data lines buffered (header, blanks and stop region excluded)
    pub data_lines: usize,
    /// Data bytes buffered
    pub data_bytes: usize,
    /// Flushes that carried data
    pub flushes: usize,
    /// Batches handed to the sink
    pub batches: usize,
    /// Records parsed from flushed buffers
    pub rows_parsed: usize,
    /// Records removed by derive rules, filters or the all-null rule
    pub rows_dropped: usize,
    /// Rows handed to the sink
    pub rows_emitted: usize,
    /// Rows the sink reported as inserted
    pub inserted: usize,
    /// Unparseable cells
    pub cast: CastStats,
}

impl NormalizeStats {
    /// Fold the counters of another pass into these
    pub fn absorb(&mut self, other: &NormalizeStats) {
        self.lines_seen += other.lines_seen;
        self.data_lines += other.data_lines;
        self.data_bytes += other.data_bytes;
        self.flushes += other.flushes;
        self.batches += other.batches;
        self.rows_parsed += other.rows_parsed;
        self.rows_dropped += other.rows_dropped;
        self.rows_emitted += other.rows_emitted;
        self.inserted += other.inserted;
        self.cast.merge(&other.cast);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    SeekingHeader,
    Buffering,
    Stopped,
}

/// Streaming normalizer for one raw table
pub struct StreamingNormalizer<'a, S: BatchSink> {
    plan: &'a NormalizePlan,
    boundary: &'a Boundary,
    delimiter: u8,
    lineage: String,
    threshold: usize,
    batch_rows: usize,
    sink: S,
    state: State,
    header: Option<String>,
    header_map: HeaderMap,
    buffer: String,
    buffered_bytes: usize,
    fill: ForwardFill,
    stats: NormalizeStats,
}

impl<'a, S: BatchSink> StreamingNormalizer<'a, S> {
    /// Create a normalizer tagging batches with `lineage`
    pub fn new(
        plan: &'a NormalizePlan,
        boundary: &'a Boundary,
        delimiter: char,
        settings: &NormalizeSettings,
        lineage: impl Into<String>,
        sink: S,
    ) -> Result<Self> {
        let delimiter = u8::try_from(delimiter).map_err(|_| {
            Error::invalid_value("delimiter", format!("'{delimiter}' is not a single-byte character"))
        })?;
        Ok(Self {
            plan,
            boundary,
            delimiter,
            lineage: lineage.into(),
            threshold: settings.flush_threshold_bytes.max(1),
            batch_rows: settings.batch_rows.max(1),
            sink,
            state: State::SeekingHeader,
            header: None,
            header_map: HeaderMap::default(),
            buffer: String::new(),
            buffered_bytes: 0,
            fill: plan.forward_fill_state(),
            stats: NormalizeStats::default(),
        })
    }

    /// Whether a stop marker was reached
    pub fn is_stopped(&self) -> bool {
        self.state == State::Stopped
    }

    /// Offer one raw line
    pub fn push_line(&mut self, line: &str) -> Result<()> {
        self.stats.lines_seen += 1;
        match self.state {
            State::SeekingHeader => {
                if self.boundary.is_header(line) {
                    self.start_table(strip_bom(line))?;
                }
            }
            State::Buffering => {
                if line.trim().is_empty() {
                    return Ok(());
                }
                if self.boundary.is_stop(line) {
                    tracing::debug!(lineage = %self.lineage, "Stop marker reached");
                    self.state = State::Stopped;
                    return Ok(());
                }
                if self.header.as_deref() == Some(strip_bom(line)) {
                    return Ok(());
                }

                let len = line.len() + 1;
                if self.buffered_bytes > 0 && self.buffered_bytes + len > self.threshold {
                    self.flush()?;
                }
                self.buffer.push_str(line);
                self.buffer.push('\n');
                self.buffered_bytes += len;
                self.stats.data_lines += 1;
                self.stats.data_bytes += len;
            }
            State::Stopped => {}
        }
        Ok(())
    }

    /// Flush what is left and return the counters.
    ///
    /// # Errors
    ///
    /// `BoundaryNotFound` when no header was seen, `EmptyTable` when the
    /// header was followed by no data, or any sink failure.
    pub fn finish(mut self) -> Result<NormalizeStats> {
        if self.header.is_none() {
            return Err(Error::boundary_not_found(
                &self.lineage,
                &self.boundary.header_prefix,
            ));
        }
        self.flush()?;
        self.state = State::Stopped;
        if self.stats.data_lines == 0 {
            return Err(Error::empty_table(&self.lineage));
        }
        Ok(self.stats)
    }

    fn start_table(&mut self, header: &str) -> Result<()> {
        let mut reader = ReaderBuilder::new()
            .delimiter(self.delimiter)
            .has_headers(false)
            .flexible(true)
            .from_reader(header.as_bytes());
        let record = reader
            .records()
            .next()
            .transpose()?
            .unwrap_or_else(StringRecord::new);

        self.header_map = self.plan.map_header(&record);
        let missing = self.header_map.missing(self.plan);
        if !missing.is_empty() {
            tracing::debug!(
                lineage = %self.lineage,
                missing = ?missing,
                "Columns absent from this export are filled with nulls"
            );
        }
        if !self.header_map.unknown.is_empty() {
            tracing::debug!(
                lineage = %self.lineage,
                unknown = ?self.header_map.unknown,
                "Ignoring undeclared header cells"
            );
        }

        self.header = Some(header.to_string());
        self.reset_buffer();
        self.state = State::Buffering;
        Ok(())
    }

    fn reset_buffer(&mut self) {
        self.buffer.clear();
        if let Some(header) = &self.header {
            self.buffer.push_str(header);
            self.buffer.push('\n');
        }
        self.buffered_bytes = 0;
    }

    fn flush(&mut self) -> Result<()> {
        if self.buffered_bytes == 0 {
            return Ok(());
        }

        let buffer = std::mem::take(&mut self.buffer);
        let mut reader = ReaderBuilder::new()
            .delimiter(self.delimiter)
            .has_headers(true)
            .flexible(true)
            .from_reader(buffer.as_bytes());

        let mut batch = TypedBatch::new(self.lineage.clone(), self.plan.schema().to_vec());
        let mut record = StringRecord::new();
        loop {
            let more = reader.read_record(&mut record).map_err(|e| Error::ChunkParse {
                table: self.lineage.clone(),
                message: e.to_string(),
            })?;
            if !more {
                break;
            }
            self.stats.rows_parsed += 1;
            match self.plan.transform(
                &record,
                &self.header_map,
                &mut self.fill,
                &mut self.stats.cast,
            ) {
                Some(row) => batch.push_row(row),
                None => self.stats.rows_dropped += 1,
            }
            if batch.num_rows() >= self.batch_rows {
                let full = std::mem::replace(
                    &mut batch,
                    TypedBatch::new(self.lineage.clone(), self.plan.schema().to_vec()),
                );
                self.emit(full)?;
            }
        }
        if !batch.is_empty() {
            self.emit(batch)?;
        }

        self.stats.flushes += 1;
        tracing::debug!(
            lineage = %self.lineage,
            flush = self.stats.flushes,
            bytes = self.buffered_bytes,
            "Flushed buffer"
        );
        drop(reader);
        self.buffer = buffer;
        self.reset_buffer();
        Ok(())
    }

    fn emit(&mut self, batch: TypedBatch) -> Result<()> {
        let rows = batch.num_rows();
        let inserted = self.sink.load(batch)?;
        self.stats.batches += 1;
        self.stats.rows_emitted += rows;
        self.stats.inserted += inserted;
        Ok(())
    }
}

/// Normalize a whole line sequence into a sink
pub fn normalize_lines<I, L, S>(
    plan: &NormalizePlan,
    boundary: &Boundary,
    delimiter: char,
    settings: &NormalizeSettings,
    lineage: &str,
    lines: I,
    sink: S,
) -> Result<NormalizeStats>
where
    I: IntoIterator<Item = L>,
    L: AsRef<str>,
    S: BatchSink,
{
    let mut normalizer =
        StreamingNormalizer::new(plan, boundary, delimiter, settings, lineage, sink)?;
    for line in lines {
        normalizer.push_line(line.as_ref())?;
        if normalizer.is_stopped() {
            break;
        }
    }
    normalizer.finish()
}
