use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use cadence_core::env::NetworkClass;

use crate::executor::Work;

/// Network condition a unit of work requires before it may run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkRequirement {
    /// No network needed.
    #[default]
    None,
    /// Any connection, metered or not.
    Any,
    /// Only an unmetered connection (the classic "don't burn mobile data").
    Unmetered,
}

/// Conjunction of environmental preconditions. All enforced predicates must
/// hold simultaneously for the work to be admissible.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstraintSet {
    #[serde(default)]
    pub network: NetworkRequirement,
    /// Require the battery to not be low.
    #[serde(default)]
    pub battery_not_low: bool,
    /// Require external power.
    #[serde(default)]
    pub requires_charging: bool,
    /// Require the device to be idle. Only enforced on hosts that report an
    /// idle signal; elsewhere the predicate is vacuously satisfied.
    #[serde(default)]
    pub requires_idle: bool,
}

/// What to do when a registration names work that already has an entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// Keep the existing entry untouched; discard the incoming definition.
    /// This makes repeated registration idempotent and is the default.
    #[default]
    Keep,
    /// Tear down the existing entry and install the new definition with a
    /// fresh generation; any in-flight result of the old generation is
    /// discarded when it arrives.
    Replace,
    /// Fail the registration with a conflict error — duplicate registration
    /// is itself a caller bug in this mode.
    Append,
}

impl std::fmt::Display for ConflictPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConflictPolicy::Keep => "keep",
            ConflictPolicy::Replace => "replace",
            ConflictPolicy::Append => "append",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for ConflictPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "keep" => Ok(ConflictPolicy::Keep),
            "replace" => Ok(ConflictPolicy::Replace),
            "append" => Ok(ConflictPolicy::Append),
            other => Err(format!("unknown conflict policy: {other}")),
        }
    }
}

/// Outcome of a registration call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterOutcome {
    /// No entry existed; a fresh one was created.
    Created,
    /// An entry existed and the KEEP policy preserved it unchanged.
    Kept,
    /// An entry existed and the REPLACE policy installed the new definition.
    Replaced,
}

/// Result reported by a work body for one execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkResult {
    /// The run succeeded; schedule the next run a full interval out.
    Success,
    /// The run failed but is worth retrying sooner than the normal cadence.
    Retry,
    /// The run failed permanently; recorded as a failure but scheduled like
    /// a success (no early retry).
    Failure,
}

/// Most recent recorded outcome for an entry, as persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LastResult {
    /// The entry has never completed a run.
    NeverRun,
    Success,
    Failed,
}

impl std::fmt::Display for LastResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LastResult::NeverRun => "never_run",
            LastResult::Success => "success",
            LastResult::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for LastResult {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "never_run" => Ok(LastResult::NeverRun),
            "success" => Ok(LastResult::Success),
            "failed" => Ok(LastResult::Failed),
            other => Err(format!("unknown result: {other}")),
        }
    }
}

/// A caller's request to run named work periodically.
pub struct WorkRequest {
    /// Process-wide unique key. Re-registering the same name goes through
    /// the conflict policy instead of creating a second schedule.
    pub name: String,
    /// Repeat interval. Must be at least [`cadence_core::config::MIN_INTERVAL_SECS`].
    pub every: Duration,
    pub constraints: ConstraintSet,
    pub policy: ConflictPolicy,
    /// When true the first run is eligible immediately instead of being
    /// deferred by one full interval.
    pub run_immediately: bool,
    /// The task body. Opaque to the scheduler; only invoked, never inspected.
    pub work: Arc<dyn Work>,
}

impl WorkRequest {
    pub fn new(name: impl Into<String>, every: Duration, work: Arc<dyn Work>) -> Self {
        Self {
            name: name.into(),
            every,
            constraints: ConstraintSet::default(),
            policy: ConflictPolicy::default(),
            run_immediately: false,
            work,
        }
    }

    pub fn constraints(mut self, constraints: ConstraintSet) -> Self {
        self.constraints = constraints;
        self
    }

    pub fn policy(mut self, policy: ConflictPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn run_immediately(mut self) -> Self {
        self.run_immediately = true;
        self
    }
}

/// A persisted schedule entry — one row of the `work_entries` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleEntry {
    /// Work name — primary key.
    pub name: String,
    /// Repeat interval.
    pub every: Duration,
    pub constraints: ConstraintSet,
    pub policy: ConflictPolicy,
    /// Earliest instant the next run may start.
    pub next_eligible: DateTime<Utc>,
    /// Outcome of the most recent completed run.
    pub last_result: LastResult,
    /// True while an execution is in flight (or was, when the process died).
    pub running: bool,
    /// Bumped on every REPLACE so results from a superseded definition can be
    /// told apart from current ones and discarded.
    pub generation: u64,
    /// Consecutive retryable failures since the last success; drives backoff.
    pub consecutive_failures: u32,
    /// Total completed runs.
    pub run_count: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl NetworkRequirement {
    /// Whether `class` satisfies this requirement.
    pub fn satisfied_by(&self, class: NetworkClass) -> bool {
        match self {
            NetworkRequirement::None => true,
            NetworkRequirement::Any => class != NetworkClass::Offline,
            NetworkRequirement::Unmetered => class == NetworkClass::Unmetered,
        }
    }
}
