//! Streaming chunked normalization
//!
//! Turns raw lines of one export into typed, canonically-named batches.
//!
//! # Overview
//!
//! The normalize module provides:
//! - `NormalizePlan` - compiled header matching, casting, derive rules and filters
//! - `StreamingNormalizer` - header/buffer/flush state machine with a byte threshold
//! - `BatchSink` - where flushed batches go (the tier loader in production)
//! - `normalize_lines` - drive a whole line sequence through the state machine

mod chunker;
mod plan;

pub use chunker::{normalize_lines, BatchSink, NormalizeStats, StreamingNormalizer};
pub use plan::{ForwardFill, HeaderMap, NormalizePlan};
