//! Relational store for the bronze, silver and gold tiers

mod engine;
mod wire;

pub use engine::{qualified, quote_ident, quote_literal, RawLine, RawSpan, Store, CONTROL_SCHEMA};
pub use wire::WireFile;

#[cfg(test)]
mod tests;
