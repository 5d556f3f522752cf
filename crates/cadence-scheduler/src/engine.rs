//! Scheduler loop and the caller-facing handle.
//!
//! [`SchedulerHandle`] is what a host process holds: registration,
//! cancellation, inspection, the environment publisher, and the
//! `start`/`stop` lifecycle. [`SchedulerEngine`] is the background loop it
//! spawns: wake on the earlier of a fixed poll tick or an environment
//! change, snapshot the environment once, scan for due entries, and
//! dispatch the admissible ones on worker tasks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use cadence_core::config::{SchedulerConfig, MIN_INTERVAL_SECS};
use cadence_core::env::EnvironmentSnapshot;

use crate::backoff::BackoffPolicy;
use crate::constraints::is_admissible;
use crate::error::{Result, SchedulerError};
use crate::executor::{self, Work, WorkRegistry};
use crate::store::ScheduleStore;
use crate::types::{RegisterOutcome, ScheduleEntry, WorkRequest, WorkResult};

/// Caller-facing scheduler API. Cheap to share; all methods take `&self`
/// and are safe to call concurrently from multiple tasks.
pub struct SchedulerHandle {
    store: Arc<ScheduleStore>,
    registry: Arc<WorkRegistry>,
    backoff: BackoffPolicy,
    execution_timeout: Option<StdDuration>,
    poll_interval: StdDuration,
    env_tx: watch::Sender<EnvironmentSnapshot>,
    shutdown_tx: watch::Sender<bool>,
    started: AtomicBool,
    stopped: AtomicBool,
}

impl SchedulerHandle {
    /// Build a handle over `store` with the given tuning. The engine is not
    /// running yet; call [`start`](Self::start) from within a tokio runtime.
    pub fn new(store: ScheduleStore, config: &SchedulerConfig) -> Self {
        let (env_tx, _) = watch::channel(EnvironmentSnapshot::default());
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            store: Arc::new(store),
            registry: Arc::new(WorkRegistry::new()),
            backoff: BackoffPolicy::new(
                chrono::Duration::seconds(config.backoff_base_secs as i64),
                chrono::Duration::seconds(config.backoff_cap_secs as i64),
            ),
            execution_timeout: config.execution_timeout_secs.map(StdDuration::from_secs),
            poll_interval: StdDuration::from_secs(config.poll_interval_secs),
            env_tx,
            shutdown_tx,
            started: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
        }
    }

    /// Register named periodic work.
    ///
    /// For a name that already has an entry the declared conflict policy
    /// decides: KEEP leaves the entry untouched (the body is still attached,
    /// so a restarted host can serve the surviving entry), REPLACE installs
    /// the new definition under a fresh generation, APPEND fails with
    /// [`SchedulerError::Conflict`].
    pub fn register(&self, req: WorkRequest) -> Result<RegisterOutcome> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(SchedulerError::Shutdown);
        }
        let got_secs = req.every.num_seconds();
        if got_secs < MIN_INTERVAL_SECS as i64 {
            return Err(SchedulerError::InvalidInterval {
                got_secs,
                min_secs: MIN_INTERVAL_SECS,
            });
        }

        let outcome = self.store.merge(&req, Utc::now())?;
        // Attach on every successful outcome, Kept included: the entry in
        // the store may predate this process and needs a live body again.
        self.registry.attach(&req.name, Arc::clone(&req.work));

        info!(work = %req.name, policy = %req.policy, outcome = ?outcome, "work registered");
        Ok(outcome)
    }

    /// Cancel named work. Idempotent; cancelling an absent name is a no-op.
    /// An in-flight execution runs to completion but its result is discarded.
    pub fn cancel(&self, name: &str) -> Result<()> {
        let removed = self.store.delete(name)?;
        self.registry.detach(name);
        if removed {
            info!(work = %name, "work cancelled");
        }
        Ok(())
    }

    /// Current entry state for `name`, if registered.
    pub fn get(&self, name: &str) -> Result<Option<ScheduleEntry>> {
        self.store.get(name)
    }

    /// All entries, ordered by name.
    pub fn list(&self) -> Result<Vec<ScheduleEntry>> {
        self.store.list_all()
    }

    /// Publish a fresh environment snapshot. Wakes the engine immediately so
    /// work blocked on the previous conditions is re-evaluated without
    /// waiting for the next poll tick.
    pub fn publish_environment(&self, snapshot: EnvironmentSnapshot) {
        // ignore send error: the engine may not be running yet
        let _ = self.env_tx.send(snapshot);
    }

    /// Start the engine loop. Safe to call more than once; only the first
    /// call spawns. Must be called from within a tokio runtime.
    pub fn start(&self) -> Result<()> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(SchedulerError::Shutdown);
        }
        if self.started.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let engine = SchedulerEngine {
            store: Arc::clone(&self.store),
            registry: Arc::clone(&self.registry),
            backoff: self.backoff.clone(),
            execution_timeout: self.execution_timeout,
            env_rx: self.env_tx.subscribe(),
        };
        let shutdown_rx = self.shutdown_tx.subscribe();
        tokio::spawn(engine.run(self.poll_interval, shutdown_rx));
        Ok(())
    }

    /// Stop the engine loop. Idempotent. In-flight executions finish and
    /// record their results through the store; no new admission occurs.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        // ignore send error: the engine may already be gone
        let _ = self.shutdown_tx.send(true);
    }
}

/// Background loop: recover, then wake-scan-dispatch until shutdown.
pub struct SchedulerEngine {
    store: Arc<ScheduleStore>,
    registry: Arc<WorkRegistry>,
    backoff: BackoffPolicy,
    execution_timeout: Option<StdDuration>,
    env_rx: watch::Receiver<EnvironmentSnapshot>,
}

impl SchedulerEngine {
    /// Main event loop. Wakes on the poll cadence or an environment change,
    /// until `shutdown` broadcasts `true`.
    pub async fn run(mut self, poll_interval: StdDuration, mut shutdown: watch::Receiver<bool>) {
        info!("scheduler engine started");

        // Repair running flags inherited from a process that died mid-run,
        // before the first due-scan can observe them.
        match self.store.recover_stale_running(Utc::now()) {
            Ok(n) if n > 0 => warn!(count = n, "stale running entries reset on startup"),
            Err(e) => error!("startup recovery failed: {e}"),
            _ => {}
        }

        let mut interval = tokio::time::interval(poll_interval);
        let mut env_open = true;
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.tick(Utc::now());
                }
                changed = self.env_rx.changed(), if env_open => {
                    match changed {
                        Ok(()) => self.tick(Utc::now()),
                        Err(_) => {
                            // Publisher gone — keep running on the poll cadence alone.
                            env_open = false;
                        }
                    }
                }
                changed = shutdown.changed() => {
                    // A closed channel means the handle is gone and can
                    // never signal again; treat it as a stop.
                    if changed.is_err() || *shutdown.borrow() {
                        info!("scheduler engine shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// One wake cycle: snapshot the environment once so every entry in this
    /// cycle is judged against the same conditions, then dispatch each due,
    /// admissible, idle entry. Entries that are due but inadmissible stay
    /// due and are re-examined next wake. Store errors skip the affected
    /// work for this cycle only.
    fn tick(&self, now: DateTime<Utc>) {
        let env = self.env_rx.borrow().clone();

        let due = match self.store.list_due(now) {
            Ok(due) => due,
            Err(e) => {
                error!("scheduler tick error: {e}");
                return;
            }
        };

        for entry in due {
            if !is_admissible(&entry.constraints, &env) {
                debug!(work = %entry.name, "due but constraints unmet; retrying next wake");
                continue;
            }

            let Some(work) = self.registry.get(&entry.name) else {
                warn!(work = %entry.name, "no body attached; waiting for re-registration");
                continue;
            };

            match self.store.mark_running(&entry.name, entry.generation, now) {
                Ok(true) => {}
                // Lost a race with a concurrent replace/cancel — skip. The
                // generation in the claim keeps a replace that landed after
                // the scan from being flagged with this entry's dispatch.
                Ok(false) => continue,
                Err(e) => {
                    error!(work = %entry.name, "failed to claim entry: {e}");
                    continue;
                }
            }

            info!(work = %entry.name, generation = entry.generation, "dispatching work");
            self.dispatch(entry, work);
        }
    }

    /// Run one claimed entry on its own task. The worker records the result
    /// directly through the store, so completions survive an engine stop and
    /// never block the admission scan.
    fn dispatch(&self, entry: ScheduleEntry, work: Arc<dyn Work>) {
        let store = Arc::clone(&self.store);
        let backoff = self.backoff.clone();
        let timeout = self.execution_timeout;

        tokio::spawn(async move {
            let result = executor::invoke(work, timeout).await;

            let now = Utc::now();
            let next_eligible = match result {
                // A permanent failure is scheduled like a success; it is
                // recorded as failed for observability only.
                WorkResult::Success | WorkResult::Failure => now + entry.every,
                WorkResult::Retry => {
                    now + backoff.delay(entry.consecutive_failures + 1, entry.every)
                }
            };

            match store.record_result(&entry.name, entry.generation, result, next_eligible, now) {
                Ok(true) => {
                    info!(work = %entry.name, result = ?result, "work completed");
                }
                Ok(false) => {
                    debug!(work = %entry.name, generation = entry.generation,
                           "result discarded (entry replaced or cancelled mid-run)");
                }
                Err(e) => {
                    error!(work = %entry.name, "failed to record result: {e}");
                }
            }
        });
    }
}
