//! lexr-dedup - Duplicate detection and reconciliation for word occurrences
//!
//! Pipeline: the [`grouper`] partitions a raw store snapshot by identity key,
//! a [`scoring`] policy ranks the members of each group, the [`selector`]
//! picks one survivor, and the [`reconciler`] deletes the losers in batches
//! and re-scans to verify convergence. The [`enforcer`] gates a structural
//! uniqueness constraint on a clean scan, and the [`monitor`] re-scans on a
//! cadence and keeps a bounded history.

pub mod analyze;
pub mod artifacts;
pub mod config;
pub mod enforcer;
pub mod error;
pub mod grouper;
pub mod model;
pub mod monitor;
pub mod plan;
pub mod reconciler;
pub mod restore;
pub mod retry;
pub mod scoring;
pub mod selector;
pub mod store;

pub use error::{ReconcileError, ReconcileResult};
pub use model::{IdentityKey, KeyMode, Record};
pub use store::{ConstraintStatus, RecordFilter, RecordStore};
