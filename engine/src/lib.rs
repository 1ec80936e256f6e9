//! Usage-driven protection reconciliation
//!
//! Keeps the protection state of a large item catalog in line with a
//! two-threshold usage policy:
//! - items used at or above the usage limit get indefinite semi-protection
//! - protected items that fall below the cooldown floor may have it lifted
//! - items in between keep whatever state they have
//!
//! Only protections applied by a trusted actor, or matching a curated legacy
//! grant, are ever lifted. All external systems are reached through the
//! traits in [`collaborators`]; this crate performs no I/O of its own apart
//! from writing the report and optional dataset dumps.

#![deny(clippy::print_stdout, clippy::print_stderr)]

pub mod classifier;
pub mod collaborators;
pub mod config;
pub mod controller;
pub mod dataset;
pub mod dump;
pub mod errors;
pub mod outcome;
pub mod provenance;
pub mod report;
pub mod shape;
pub mod transition;

pub use classifier::{Case, ClassifiedSets, Thresholds, classify};
pub use collaborators::{
    CatalogApi, CatalogItem, Collaborators, DenyListFeed, HistoryStore, LegacyGrantSource,
    ProtectAction, RankingFeed,
};
pub use config::GuardConfig;
pub use controller::{PassStatus, RunController, RunOutcome, RunPhase};
pub use dataset::{
    Datasets, DenyList, LegacyGrant, ProtectionRecord, RawUsageRow, UsageRecord,
    normalize_usage, parse_deny_list, parse_legacy_grants, parse_ranking_csv,
};
pub use errors::{ErrorCategory, Result, UsageGuardError};
pub use outcome::{CaseResult, Direction, Outcome, OutcomeTally, RunCounters};
pub use provenance::ProvenanceValidator;
pub use report::RunSummary;
pub use shape::{ProtectionRequest, ProtectionShape, Restriction};
pub use transition::{MachineSettings, ProtectionMachine};

/// Engine version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
