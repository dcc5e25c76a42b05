//! Shared types for the diffgrade workspace.
//!
//! This crate holds the serializable surface of the engine: the run
//! configuration a caller hands in and the [`RunReport`] it gets back.
//! It has no dependency on the engine itself, so formatting layers can
//! consume reports without linking the core.

pub mod config;
pub mod report;

pub use config::{
    ComplexitySchedule, ResolvedArguments, RunArguments, RunConfig, SeedPolicy,
    DEFAULT_MAX_COMPLEXITY, DEFAULT_MAX_DISCARDS, DEFAULT_NUM_TESTS,
};
pub use report::{OutcomeSummary, RunReport, TrialKind, TrialRecord, Verdict};
