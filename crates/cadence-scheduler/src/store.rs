//! Schedule store — the durable table of named recurring-work entries, and
//! the conflict-policy resolver that merges registrations into it.
//!
//! The store is the single shared mutable resource of the scheduler. Every
//! operation takes the connection mutex for its whole read-modify-write, so
//! per-name updates are atomic with respect to each other; the engine loop,
//! worker tasks and caller-facing registration all go through here.
//!
//! Timestamps are stored as fixed-precision RFC 3339 strings, which makes
//! SQL string comparison chronological for the due-scan.

use std::str::FromStr;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use rusqlite::Connection;
use tracing::warn;

use crate::db::init_db;
use crate::error::{Result, SchedulerError};
use crate::types::{ConflictPolicy, LastResult, RegisterOutcome, ScheduleEntry, WorkRequest, WorkResult};

/// Serialise a timestamp at fixed precision so lexicographic order in SQLite
/// matches chronological order.
fn to_ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Raw `work_entries` row as read from SQLite, before decoding.
type EntryRow = (
    String,         // name
    i64,            // every_secs
    String,         // constraints JSON
    String,         // policy
    String,         // next_eligible
    String,         // last_result
    i64,            // running
    i64,            // generation
    i64,            // consecutive_failures
    i64,            // run_count
    String,         // created_at
    String,         // updated_at
);

const ENTRY_COLUMNS: &str = "name, every_secs, constraints, policy, next_eligible, last_result,
                             running, generation, consecutive_failures, run_count, created_at, updated_at";

fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<EntryRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
        row.get(9)?,
        row.get(10)?,
        row.get(11)?,
    ))
}

fn decode_row(raw: EntryRow) -> Option<ScheduleEntry> {
    let (
        name,
        every_secs,
        constraints_json,
        policy_str,
        next_eligible,
        last_result,
        running,
        generation,
        consecutive_failures,
        run_count,
        created_at,
        updated_at,
    ) = raw;

    let constraints = serde_json::from_str(&constraints_json).ok()?;
    let policy = ConflictPolicy::from_str(&policy_str).ok()?;
    let last_result = LastResult::from_str(&last_result).ok()?;

    Some(ScheduleEntry {
        name,
        every: Duration::seconds(every_secs),
        constraints,
        policy,
        next_eligible: parse_ts(&next_eligible)?,
        last_result,
        running: running != 0,
        generation: generation as u64,
        consecutive_failures: consecutive_failures as u32,
        run_count: run_count as u64,
        created_at: parse_ts(&created_at)?,
        updated_at: parse_ts(&updated_at)?,
    })
}

/// Durable keyed table of schedule entries, backed by SQLite.
pub struct ScheduleStore {
    conn: Arc<Mutex<Connection>>,
}

impl ScheduleStore {
    /// Wrap an open connection, initialising the schema if needed.
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open (or create) the store at `path`.
    pub fn open(path: &str) -> Result<Self> {
        Self::new(Connection::open(path)?)
    }

    /// Volatile store for tests and throwaway hosts.
    pub fn in_memory() -> Result<Self> {
        Self::new(Connection::open_in_memory()?)
    }

    /// Merge a registration into the store per its conflict policy.
    ///
    /// A brand-new name always creates an entry whose first run is deferred
    /// by one full interval unless the request asks to run immediately.
    /// For an existing name: KEEP leaves the row untouched, REPLACE installs
    /// the new definition under a strictly greater generation, APPEND fails
    /// with a conflict error.
    pub fn merge(&self, req: &WorkRequest, now: DateTime<Utc>) -> Result<RegisterOutcome> {
        let conn = self.conn.lock().unwrap();
        let now_str = to_ts(now);
        let first_eligible = if req.run_immediately { now } else { now + req.every };
        let constraints_json = serde_json::to_string(&req.constraints)
            .map_err(|e| SchedulerError::InvalidConstraints(e.to_string()))?;

        let existing: Option<i64> = conn
            .query_row(
                "SELECT generation FROM work_entries WHERE name = ?1",
                [&req.name],
                |row| row.get(0),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?;

        match existing {
            None => {
                conn.execute(
                    "INSERT INTO work_entries
                     (name, every_secs, constraints, policy, next_eligible, last_result,
                      running, generation, consecutive_failures, run_count, created_at, updated_at)
                     VALUES (?1,?2,?3,?4,?5,'never_run',0,1,0,0,?6,?6)",
                    rusqlite::params![
                        req.name,
                        req.every.num_seconds(),
                        constraints_json,
                        req.policy.to_string(),
                        to_ts(first_eligible),
                        now_str,
                    ],
                )?;
                Ok(RegisterOutcome::Created)
            }
            Some(_) if req.policy == ConflictPolicy::Keep => Ok(RegisterOutcome::Kept),
            Some(_) if req.policy == ConflictPolicy::Append => Err(SchedulerError::Conflict {
                name: req.name.clone(),
            }),
            Some(generation) => {
                // REPLACE: fresh definition under the next generation. Any
                // in-flight result of the old generation is discarded at
                // record time by the generation check.
                conn.execute(
                    "UPDATE work_entries
                     SET every_secs = ?2, constraints = ?3, policy = ?4, next_eligible = ?5,
                         last_result = 'never_run', running = 0, generation = ?6,
                         consecutive_failures = 0, run_count = 0, created_at = ?7, updated_at = ?7
                     WHERE name = ?1",
                    rusqlite::params![
                        req.name,
                        req.every.num_seconds(),
                        constraints_json,
                        req.policy.to_string(),
                        to_ts(first_eligible),
                        generation + 1,
                        now_str,
                    ],
                )?;
                Ok(RegisterOutcome::Replaced)
            }
        }
    }

    /// Fetch one entry by name.
    pub fn get(&self, name: &str) -> Result<Option<ScheduleEntry>> {
        let conn = self.conn.lock().unwrap();
        let raw = conn
            .query_row(
                &format!("SELECT {ENTRY_COLUMNS} FROM work_entries WHERE name = ?1"),
                [name],
                map_row,
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?;

        match raw {
            None => Ok(None),
            Some(raw) => decode_row(raw)
                .map(Some)
                .ok_or_else(|| SchedulerError::InvalidConstraints(format!("corrupt entry: {name}"))),
        }
    }

    /// All entries, ordered by name.
    pub fn list_all(&self) -> Result<Vec<ScheduleEntry>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare(&format!("SELECT {ENTRY_COLUMNS} FROM work_entries ORDER BY name"))?;
        let entries = stmt
            .query_map([], map_row)?
            .filter_map(|r| r.ok())
            .filter_map(|raw| {
                let name = raw.0.clone();
                let decoded = decode_row(raw);
                if decoded.is_none() {
                    warn!(work = %name, "corrupt entry row skipped");
                }
                decoded
            })
            .collect();
        Ok(entries)
    }

    /// Entries due at `now` and not already running, earliest first (ties
    /// broken by name so a wake cycle processes them deterministically).
    pub fn list_due(&self, now: DateTime<Utc>) -> Result<Vec<ScheduleEntry>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {ENTRY_COLUMNS} FROM work_entries
             WHERE running = 0 AND next_eligible <= ?1
             ORDER BY next_eligible, name"
        ))?;
        let entries = stmt
            .query_map([to_ts(now)], map_row)?
            .filter_map(|r| r.ok())
            .filter_map(|raw| {
                let name = raw.0.clone();
                let decoded = decode_row(raw);
                if decoded.is_none() {
                    warn!(work = %name, "corrupt entry row skipped");
                }
                decoded
            })
            .collect();
        Ok(entries)
    }

    /// Remove an entry. Returns false when no such name existed (cancel is
    /// idempotent, so that is not an error).
    pub fn delete(&self, name: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let n = conn.execute("DELETE FROM work_entries WHERE name = ?1", [name])?;
        Ok(n > 0)
    }

    /// Claim an entry for execution. Check-and-set in a single statement:
    /// returns false when the entry is gone, already running, or no longer
    /// the generation the caller scanned (a REPLACE landed since), in which
    /// case the caller must not dispatch.
    pub fn mark_running(&self, name: &str, generation: u64, now: DateTime<Utc>) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let n = conn.execute(
            "UPDATE work_entries SET running = 1, updated_at = ?3
             WHERE name = ?1 AND generation = ?2 AND running = 0",
            rusqlite::params![name, generation as i64, to_ts(now)],
        )?;
        Ok(n > 0)
    }

    /// Release an entry without recording a result (used when a dispatch is
    /// abandoned before the body ran).
    pub fn mark_idle(&self, name: &str, now: DateTime<Utc>) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE work_entries SET running = 0, updated_at = ?2 WHERE name = ?1",
            rusqlite::params![name, to_ts(now)],
        )?;
        Ok(())
    }

    /// Record a completed execution for `name`, provided `generation` still
    /// matches the stored entry.
    ///
    /// Returns false (and changes nothing) when the entry was cancelled or
    /// replaced while the body ran — the stale result is discarded rather
    /// than corrupting the current entry. `next_eligible` never moves
    /// backwards: the stored value wins if it is later than the candidate.
    pub fn record_result(
        &self,
        name: &str,
        generation: u64,
        result: WorkResult,
        next_eligible: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let conn = self.conn.lock().unwrap();

        let current: Option<(i64, String, i64)> = conn
            .query_row(
                "SELECT generation, next_eligible, consecutive_failures
                 FROM work_entries WHERE name = ?1",
                [name],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?;

        let Some((stored_gen, stored_next, failures)) = current else {
            return Ok(false);
        };
        if stored_gen as u64 != generation {
            return Ok(false);
        }

        let stored_next = parse_ts(&stored_next);
        let next = match stored_next {
            Some(existing) if existing > next_eligible => existing,
            _ => next_eligible,
        };

        let (last_result, new_failures) = match result {
            WorkResult::Success => (LastResult::Success, 0),
            WorkResult::Retry => (LastResult::Failed, failures + 1),
            WorkResult::Failure => (LastResult::Failed, 0),
        };

        conn.execute(
            "UPDATE work_entries
             SET running = 0, last_result = ?2, next_eligible = ?3,
                 consecutive_failures = ?4, run_count = run_count + 1, updated_at = ?5
             WHERE name = ?1 AND generation = ?6",
            rusqlite::params![
                name,
                last_result.to_string(),
                to_ts(next),
                new_failures,
                to_ts(now),
                stored_gen,
            ],
        )?;
        Ok(true)
    }

    /// Restart repair: clear running flags inherited from a previous process
    /// instance that died mid-execution, so those entries become eligible
    /// again instead of staying wedged forever. Returns how many were reset.
    pub fn recover_stale_running(&self, now: DateTime<Utc>) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let n = conn.execute(
            "UPDATE work_entries SET running = 0, updated_at = ?1 WHERE running = 1",
            [to_ts(now)],
        )?;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::Work;
    use crate::types::{ConstraintSet, NetworkRequirement, WorkResult};
    use async_trait::async_trait;
    use chrono::TimeZone;

    struct Noop;

    #[async_trait]
    impl Work for Noop {
        async fn run(&self) -> WorkResult {
            WorkResult::Success
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn request(name: &str, every: Duration) -> WorkRequest {
        WorkRequest::new(name, every, std::sync::Arc::new(Noop))
    }

    #[test]
    fn new_entry_defers_first_run_by_one_interval() {
        let store = ScheduleStore::in_memory().unwrap();
        let outcome = store.merge(&request("feed-sync", Duration::hours(24)), t0()).unwrap();
        assert_eq!(outcome, RegisterOutcome::Created);

        let entry = store.get("feed-sync").unwrap().unwrap();
        assert_eq!(entry.next_eligible, t0() + Duration::hours(24));
        assert_eq!(entry.generation, 1);
        assert_eq!(entry.last_result, LastResult::NeverRun);
        assert!(!entry.running);

        // Not due yet.
        assert!(store.list_due(t0()).unwrap().is_empty());
        // Due once the interval has elapsed.
        assert_eq!(store.list_due(t0() + Duration::hours(24)).unwrap().len(), 1);
    }

    #[test]
    fn run_immediately_makes_entry_due_at_once() {
        let store = ScheduleStore::in_memory().unwrap();
        let req = request("feed-sync", Duration::hours(24)).run_immediately();
        store.merge(&req, t0()).unwrap();

        let due = store.list_due(t0()).unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].name, "feed-sync");
    }

    #[test]
    fn keep_policy_preserves_existing_entry() {
        let store = ScheduleStore::in_memory().unwrap();
        let mut req = request("feed-sync", Duration::hours(24));
        req.constraints = ConstraintSet {
            network: NetworkRequirement::Unmetered,
            battery_not_low: true,
            ..Default::default()
        };
        store.merge(&req, t0()).unwrap();

        // Second registration with a different definition must change nothing.
        let outcome = store
            .merge(&request("feed-sync", Duration::hours(1)), t0() + Duration::minutes(5))
            .unwrap();
        assert_eq!(outcome, RegisterOutcome::Kept);

        let entry = store.get("feed-sync").unwrap().unwrap();
        assert_eq!(entry.every, Duration::hours(24));
        assert_eq!(entry.constraints.network, NetworkRequirement::Unmetered);
        assert!(entry.constraints.battery_not_low);
        assert_eq!(entry.generation, 1);
    }

    #[test]
    fn replace_policy_installs_new_definition_with_greater_generation() {
        let store = ScheduleStore::in_memory().unwrap();
        store.merge(&request("feed-sync", Duration::hours(24)), t0()).unwrap();

        let req = request("feed-sync", Duration::hours(6)).policy(ConflictPolicy::Replace);
        let outcome = store.merge(&req, t0() + Duration::hours(1)).unwrap();
        assert_eq!(outcome, RegisterOutcome::Replaced);

        let all = store.list_all().unwrap();
        assert_eq!(all.len(), 1, "replace must not duplicate the entry");
        let entry = &all[0];
        assert_eq!(entry.every, Duration::hours(6));
        assert_eq!(entry.generation, 2);
        assert_eq!(entry.last_result, LastResult::NeverRun);
        assert_eq!(entry.next_eligible, t0() + Duration::hours(1) + Duration::hours(6));
    }

    #[test]
    fn append_policy_rejects_duplicates() {
        let store = ScheduleStore::in_memory().unwrap();
        store.merge(&request("feed-sync", Duration::hours(24)), t0()).unwrap();

        let req = request("feed-sync", Duration::hours(24)).policy(ConflictPolicy::Append);
        let err = store.merge(&req, t0()).unwrap_err();
        assert!(matches!(err, SchedulerError::Conflict { .. }));

        // A fresh name under APPEND still registers fine.
        let req = request("other", Duration::hours(24)).policy(ConflictPolicy::Append);
        assert_eq!(store.merge(&req, t0()).unwrap(), RegisterOutcome::Created);
    }

    #[test]
    fn list_due_orders_by_time_then_name() {
        let store = ScheduleStore::in_memory().unwrap();
        let b = request("b-work", Duration::hours(1)).run_immediately();
        let a = request("a-work", Duration::hours(1)).run_immediately();
        let c = request("c-work", Duration::hours(2));
        store.merge(&b, t0()).unwrap();
        store.merge(&a, t0()).unwrap();
        store.merge(&c, t0() - Duration::hours(2)).unwrap(); // due exactly at t0

        let due = store.list_due(t0()).unwrap();
        let names: Vec<&str> = due.iter().map(|e| e.name.as_str()).collect();
        // c-work became eligible at t0 - 2h + 2h = t0, same as a/b; all tie at t0.
        assert_eq!(names, vec!["a-work", "b-work", "c-work"]);
    }

    #[test]
    fn running_entries_are_not_due() {
        let store = ScheduleStore::in_memory().unwrap();
        store
            .merge(&request("feed-sync", Duration::hours(1)).run_immediately(), t0())
            .unwrap();

        assert!(store.mark_running("feed-sync", 1, t0()).unwrap());
        assert!(store.list_due(t0()).unwrap().is_empty());

        // Second claim fails — one in-flight execution per name.
        assert!(!store.mark_running("feed-sync", 1, t0()).unwrap());

        store.mark_idle("feed-sync", t0()).unwrap();
        assert_eq!(store.list_due(t0()).unwrap().len(), 1);
    }

    #[test]
    fn claim_with_a_superseded_generation_fails() {
        let store = ScheduleStore::in_memory().unwrap();
        store
            .merge(&request("feed-sync", Duration::hours(24)).run_immediately(), t0())
            .unwrap();

        // The due-scan sees generation 1...
        let scanned = store.list_due(t0()).unwrap().remove(0);
        assert_eq!(scanned.generation, 1);

        // ...but a REPLACE lands before the claim.
        let req = request("feed-sync", Duration::hours(6))
            .policy(ConflictPolicy::Replace)
            .run_immediately();
        store.merge(&req, t0()).unwrap();

        // The stale claim must fail and leave the new generation untouched.
        assert!(!store.mark_running("feed-sync", scanned.generation, t0()).unwrap());
        let entry = store.get("feed-sync").unwrap().unwrap();
        assert!(!entry.running);
        assert_eq!(entry.generation, 2);

        // The new generation is still claimable and releasable as normal.
        assert!(store.mark_running("feed-sync", entry.generation, t0()).unwrap());
        store
            .record_result("feed-sync", 2, WorkResult::Success, t0() + Duration::hours(6), t0())
            .unwrap();
        assert!(!store.get("feed-sync").unwrap().unwrap().running);
    }

    #[test]
    fn record_result_advances_schedule_and_clears_running() {
        let store = ScheduleStore::in_memory().unwrap();
        store
            .merge(&request("feed-sync", Duration::hours(24)).run_immediately(), t0())
            .unwrap();
        store.mark_running("feed-sync", 1, t0()).unwrap();

        let done = t0() + Duration::minutes(3);
        let recorded = store
            .record_result("feed-sync", 1, WorkResult::Success, done + Duration::hours(24), done)
            .unwrap();
        assert!(recorded);

        let entry = store.get("feed-sync").unwrap().unwrap();
        assert!(!entry.running);
        assert_eq!(entry.last_result, LastResult::Success);
        assert_eq!(entry.next_eligible, done + Duration::hours(24));
        assert_eq!(entry.run_count, 1);
        assert_eq!(entry.consecutive_failures, 0);
    }

    #[test]
    fn retryable_failures_build_a_streak_and_success_resets_it() {
        let store = ScheduleStore::in_memory().unwrap();
        store
            .merge(&request("feed-sync", Duration::hours(24)).run_immediately(), t0())
            .unwrap();

        let mut now = t0();
        for expected in 1..=3u32 {
            store.mark_running("feed-sync", 1, now).unwrap();
            now = now + Duration::minutes(1);
            store
                .record_result("feed-sync", 1, WorkResult::Retry, now + Duration::seconds(30), now)
                .unwrap();
            let entry = store.get("feed-sync").unwrap().unwrap();
            assert_eq!(entry.consecutive_failures, expected);
            assert_eq!(entry.last_result, LastResult::Failed);
            now = now + Duration::minutes(1);
        }

        store.mark_running("feed-sync", 1, now).unwrap();
        store
            .record_result("feed-sync", 1, WorkResult::Success, now + Duration::hours(24), now)
            .unwrap();
        assert_eq!(store.get("feed-sync").unwrap().unwrap().consecutive_failures, 0);
    }

    #[test]
    fn permanent_failure_scheduled_like_success_but_recorded_as_failure() {
        let store = ScheduleStore::in_memory().unwrap();
        store
            .merge(&request("feed-sync", Duration::hours(24)).run_immediately(), t0())
            .unwrap();
        store.mark_running("feed-sync", 1, t0()).unwrap();

        let done = t0() + Duration::minutes(1);
        store
            .record_result("feed-sync", 1, WorkResult::Failure, done + Duration::hours(24), done)
            .unwrap();

        let entry = store.get("feed-sync").unwrap().unwrap();
        assert_eq!(entry.last_result, LastResult::Failed);
        assert_eq!(entry.consecutive_failures, 0);
        assert_eq!(entry.next_eligible, done + Duration::hours(24));
    }

    #[test]
    fn next_eligible_never_moves_backwards() {
        let store = ScheduleStore::in_memory().unwrap();
        store.merge(&request("feed-sync", Duration::hours(24)), t0()).unwrap();
        let scheduled = t0() + Duration::hours(24);

        store.mark_running("feed-sync", 1, t0()).unwrap();
        // A candidate earlier than the stored next_eligible must lose.
        store
            .record_result("feed-sync", 1, WorkResult::Success, t0() + Duration::hours(1), t0())
            .unwrap();
        let entry = store.get("feed-sync").unwrap().unwrap();
        assert_eq!(entry.next_eligible, scheduled);
    }

    #[test]
    fn stale_generation_result_is_discarded() {
        let store = ScheduleStore::in_memory().unwrap();
        store
            .merge(&request("feed-sync", Duration::hours(24)).run_immediately(), t0())
            .unwrap();
        store.mark_running("feed-sync", 1, t0()).unwrap();

        // Replace while generation 1 is in flight.
        let req = request("feed-sync", Duration::hours(6)).policy(ConflictPolicy::Replace);
        store.merge(&req, t0() + Duration::minutes(1)).unwrap();

        // The old execution completes — its result must be a no-op.
        let recorded = store
            .record_result(
                "feed-sync",
                1,
                WorkResult::Success,
                t0() + Duration::hours(24),
                t0() + Duration::minutes(2),
            )
            .unwrap();
        assert!(!recorded);

        let entry = store.get("feed-sync").unwrap().unwrap();
        assert_eq!(entry.generation, 2);
        assert_eq!(entry.last_result, LastResult::NeverRun);
        assert_eq!(entry.run_count, 0);
    }

    #[test]
    fn result_for_cancelled_entry_is_discarded() {
        let store = ScheduleStore::in_memory().unwrap();
        store
            .merge(&request("feed-sync", Duration::hours(24)).run_immediately(), t0())
            .unwrap();
        store.mark_running("feed-sync", 1, t0()).unwrap();
        assert!(store.delete("feed-sync").unwrap());

        let recorded = store
            .record_result("feed-sync", 1, WorkResult::Success, t0() + Duration::hours(24), t0())
            .unwrap();
        assert!(!recorded);
        assert!(store.get("feed-sync").unwrap().is_none());
    }

    #[test]
    fn delete_is_idempotent() {
        let store = ScheduleStore::in_memory().unwrap();
        assert!(!store.delete("absent").unwrap());
        assert!(!store.delete("absent").unwrap());
        assert!(store.list_all().unwrap().is_empty());
    }

    #[test]
    fn recovery_resets_stale_running_flags() {
        let store = ScheduleStore::in_memory().unwrap();
        store
            .merge(&request("feed-sync", Duration::hours(1)).run_immediately(), t0())
            .unwrap();
        store.mark_running("feed-sync", 1, t0()).unwrap();
        // Simulate a crash: the flag was never cleared.
        assert!(store.list_due(t0() + Duration::hours(2)).unwrap().is_empty());

        let reset = store.recover_stale_running(t0() + Duration::hours(2)).unwrap();
        assert_eq!(reset, 1);
        assert_eq!(store.list_due(t0() + Duration::hours(2)).unwrap().len(), 1);

        // Nothing left to repair on a second pass.
        assert_eq!(store.recover_stale_running(t0() + Duration::hours(2)).unwrap(), 0);
    }

    #[test]
    fn entries_round_trip_every_field() {
        let store = ScheduleStore::in_memory().unwrap();
        let mut req = request("feed-sync", Duration::hours(24));
        req.constraints = ConstraintSet {
            network: NetworkRequirement::Unmetered,
            battery_not_low: true,
            requires_charging: true,
            requires_idle: true,
        };
        req.policy = ConflictPolicy::Replace;
        store.merge(&req, t0()).unwrap();

        let entry = store.get("feed-sync").unwrap().unwrap();
        assert_eq!(entry.name, "feed-sync");
        assert_eq!(entry.every, Duration::hours(24));
        assert_eq!(entry.constraints, req.constraints);
        assert_eq!(entry.policy, ConflictPolicy::Replace);
        assert_eq!(entry.generation, 1);
        assert_eq!(entry.created_at, t0());
        assert_eq!(entry.updated_at, t0());
    }
}
