//! Locale-aware casting
//!
//! Converts raw string cells into typed values under source-locale conventions.
//!
//! # Overview
//!
//! The cast module provides:
//! - `CastRule` - how one column is cast (type, scale, explicit format, strip list)
//! - `NumberLocale` - decimal and thousands separators of a source
//! - `Caster` - pure, deterministic cell caster returning a `CastOutcome`
//! - `CastStats` - per-batch counters of unparseable cells

mod caster;

pub use caster::{CastOutcome, CastRule, CastStats, Caster, NumberLocale, NULL_MARKERS};
