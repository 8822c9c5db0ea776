//! Idempotent loading into the silver and gold tiers

mod loader;

pub use loader::{LoadStats, MergeMode, TierLoader};

#[cfg(test)]
mod tests;
