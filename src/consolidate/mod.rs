//! Multi-source consolidation (silver → gold)

mod merge;
mod runner;

pub use merge::{
    consolidated_schema, merge, merge_at, ContributorRow, ContributorRows, MergeStats, FRESHNESS_SOURCE,
    LAST_UPDATED_AT,
};
pub use runner::{consolidate, ConsolidateOutcome};
