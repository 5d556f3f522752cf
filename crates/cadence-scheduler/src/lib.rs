//! `cadence-scheduler` — constrained periodic work scheduler with SQLite
//! persistence.
//!
//! # Overview
//!
//! A host registers named recurring work through a [`SchedulerHandle`]; each
//! unit carries an interval, a [`ConstraintSet`] of environmental
//! preconditions, and a [`ConflictPolicy`] deciding what a repeat
//! registration of the same name means. Entries are persisted to a SQLite
//! `work_entries` table and survive restarts; the [`engine::SchedulerEngine`]
//! loop wakes on a poll cadence or an environment change, scans for due
//! entries, and dispatches the ones whose constraints are currently met.
//!
//! # Conflict policies
//!
//! | Policy    | Behaviour when the name already exists                  |
//! |-----------|---------------------------------------------------------|
//! | `Keep`    | Existing entry wins; registration is a no-op (default)  |
//! | `Replace` | New definition installed under a fresh generation       |
//! | `Append`  | Registration fails with a conflict error                |
//!
//! # Execution results
//!
//! A work body reports [`WorkResult::Success`], [`WorkResult::Retry`]
//! (retryable failure — rescheduled under capped doubling backoff, sooner
//! than the normal cadence) or [`WorkResult::Failure`] (permanent — recorded
//! as failed but scheduled a full interval out, like a success).

pub mod backoff;
pub mod constraints;
pub mod db;
pub mod engine;
pub mod error;
pub mod executor;
pub mod store;
pub mod types;

pub use backoff::BackoffPolicy;
pub use constraints::is_admissible;
pub use engine::{SchedulerEngine, SchedulerHandle};
pub use error::{Result, SchedulerError};
pub use executor::{Work, WorkRegistry};
pub use store::ScheduleStore;
pub use types::{
    ConflictPolicy, ConstraintSet, LastResult, NetworkRequirement, RegisterOutcome, ScheduleEntry,
    WorkRequest, WorkResult,
};
