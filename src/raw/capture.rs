//! Raw capture into the bronze tier
//!
//! Every physical line of a file becomes one bronze row. Line numbers
//! continue after the current maximum of the raw table, and all lines of one
//! file share a batch id.

use crate::config::{Encoding, InputDefinition};
use crate::error::{Error, Result};
use crate::store::{Store, WireFile};
use std::fs;
use std::path::{Path, PathBuf};

/// Bytes sampled when guessing the encoding
pub const ENCODING_SAMPLE_BYTES: usize = 200_000;

/// Raw table name for a file stem (`202511_270` → `t_202511_270`)
pub fn sanitize_table_name(stem: &str) -> String {
    let mut name = String::with_capacity(stem.len());
    let mut last_underscore = false;
    for ch in stem.trim().to_lowercase().chars() {
        if ch.is_ascii_lowercase() || ch.is_ascii_digit() {
            name.push(ch);
            last_underscore = false;
        } else if !last_underscore {
            name.push('_');
            last_underscore = true;
        }
    }
    let name = name.trim_matches('_');

    if name.is_empty() {
        "t_unnamed".to_string()
    } else if name.starts_with(|c: char| c.is_ascii_digit()) {
        format!("t_{name}")
    } else {
        name.to_string()
    }
}

/// Pick UTF-8 when the sample decodes cleanly, Latin-1 otherwise
pub fn detect_encoding(sample: &[u8]) -> Encoding {
    let sample = &sample[..sample.len().min(ENCODING_SAMPLE_BYTES)];
    match std::str::from_utf8(sample) {
        Ok(_) => Encoding::Utf8,
        // A multi-byte character cut by the sample boundary
        Err(e) if e.error_len().is_none() => Encoding::Utf8,
        Err(_) => Encoding::Latin1,
    }
}

/// Decode file bytes
pub fn decode(bytes: &[u8], encoding: Encoding) -> String {
    let encoding = match encoding {
        Encoding::Auto => detect_encoding(bytes),
        other => other,
    };
    match encoding {
        Encoding::Latin1 => bytes.iter().map(|&b| b as char).collect(),
        _ => String::from_utf8_lossy(bytes).into_owned(),
    }
}

/// Result of capturing one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureOutcome {
    /// File name
    pub file: String,
    /// Bronze table written
    pub raw_table: String,
    /// Lines captured (0 when skipped)
    pub lines: usize,
    /// First line number assigned
    pub first_line_no: i64,
    /// Batch id shared by the lines
    pub batch_id: Option<String>,
    /// Already captured and not forced
    pub skipped: bool,
}

/// Result of capturing a directory
#[derive(Debug, Clone, Default)]
pub struct CaptureReport {
    pub captured: Vec<CaptureOutcome>,
    pub skipped: Vec<CaptureOutcome>,
    /// (file, error)
    pub failed: Vec<(String, String)>,
}

impl CaptureReport {
    /// Lines captured across files
    pub fn total_lines(&self) -> usize {
        self.captured.iter().map(|c| c.lines).sum()
    }

    /// Whether any file failed
    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }
}

/// Capture one file into `bronze.<sanitized stem>`
pub fn capture_file(store: &Store, path: &Path, encoding: Encoding, force: bool) -> Result<CaptureOutcome> {
    let file = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| Error::FileNotFound {
            path: path.display().to_string(),
        })?;
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let raw_table = sanitize_table_name(&stem);

    store.ensure_raw_table(&raw_table)?;
    if !force && store.raw_has_file(&raw_table, &file)? {
        tracing::warn!(file = %file, raw_table = %raw_table, "File already captured, skipping");
        return Ok(CaptureOutcome {
            file,
            raw_table,
            lines: 0,
            first_line_no: 0,
            batch_id: None,
            skipped: true,
        });
    }

    let bytes = fs::read(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => Error::FileNotFound {
            path: path.display().to_string(),
        },
        _ => Error::Io(e),
    })?;
    let text = decode(&bytes, encoding);
    let batch_id = uuid::Uuid::new_v4().to_string();

    let (first_line_no, lines) = store.transaction(|_| {
        let first = store.raw_max_line_no(&raw_table)? + 1;
        let wire = WireFile::from_raw_lines(first, text.lines(), &file, &batch_id)?;
        if wire.rows() == 0 {
            return Ok((first, 0));
        }
        let lines = store.copy_raw_lines(&raw_table, &wire)?;
        Ok((first, lines))
    })?;

    tracing::info!(
        file = %file,
        raw_table = %raw_table,
        lines = lines,
        batch_id = %batch_id,
        "Captured file"
    );

    Ok(CaptureOutcome {
        file,
        raw_table,
        lines,
        first_line_no,
        batch_id: Some(batch_id),
        skipped: false,
    })
}

/// Files in a directory matching the configured extensions, sorted by name
pub fn list_input_files(directory: &Path, extensions: &[String]) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(directory).map_err(|e| {
        Error::source_unavailable(directory.display().to_string(), e.to_string())
    })?;

    let mut files = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let matches = path
            .extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
            .is_some_and(|ext| extensions.iter().any(|e| e.eq_ignore_ascii_case(&ext)));
        if matches {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Capture every matching file of the input directory
pub fn capture_directory(store: &Store, input: &InputDefinition, force: bool) -> Result<CaptureReport> {
    let directory = input
        .directory
        .as_deref()
        .ok_or_else(|| Error::missing_field("input.directory"))?;
    let files = list_input_files(Path::new(directory), &input.extensions)?;
    if files.is_empty() {
        tracing::warn!(directory = %directory, "No input files found");
    }

    let mut report = CaptureReport::default();
    for path in files {
        match capture_file(store, &path, input.encoding, force) {
            Ok(outcome) if outcome.skipped => report.skipped.push(outcome),
            Ok(outcome) => report.captured.push(outcome),
            Err(e) => {
                tracing::error!(file = %path.display(), error = %e, "Raw capture failed");
                report.failed.push((path.display().to_string(), e.to_string()));
            }
        }
    }
    Ok(report)
}
