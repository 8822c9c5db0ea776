//! Boundary extraction
//!
//! Locates the real tabular region inside a noisy raw text dump.
//!
//! # Overview
//!
//! Exports from point-of-sale and access-control systems carry report titles,
//! filter summaries and totals around the table itself. The boundary module provides:
//! - `Boundary` - header prefix and stop markers for one export format
//! - `Boundary::extract` - the minimal `[header, data...]` slice of a line sequence

mod extractor;

pub use extractor::{strip_bom, Boundary};
