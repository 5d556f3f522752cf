//! Execution adapter — the boundary between the scheduler and caller code.
//!
//! The scheduler only ever sees a [`Work`] trait object: it invokes `run`,
//! observes the [`WorkResult`], and never inspects what the body actually
//! does. Bodies run on their own spawned task so a slow or stuck one never
//! delays the admission scan, and so a panic is contained at the join
//! boundary instead of taking the loop down.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use crate::types::WorkResult;

/// A unit of background work supplied by the host.
///
/// Implementations should be idempotent per run where possible: a process
/// crash mid-run means the same work becomes eligible again after restart
/// recovery.
#[async_trait]
pub trait Work: Send + Sync {
    async fn run(&self) -> WorkResult;
}

/// In-process table of work bodies, keyed by work name.
///
/// Bodies cannot be persisted, so after a restart a stored entry has no body
/// until the host re-registers it; the engine skips such entries with a
/// warning rather than failing them.
#[derive(Default)]
pub struct WorkRegistry {
    handlers: Mutex<HashMap<String, Arc<dyn Work>>>,
}

impl WorkRegistry {
    pub fn new() -> Self {
        Self {
            handlers: Mutex::new(HashMap::new()),
        }
    }

    /// Attach (or swap) the body for `name`.
    pub fn attach(&self, name: &str, work: Arc<dyn Work>) {
        let mut handlers = self.handlers.lock().unwrap();
        handlers.insert(name.to_string(), work);
    }

    pub fn detach(&self, name: &str) {
        let mut handlers = self.handlers.lock().unwrap();
        handlers.remove(name);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Work>> {
        let handlers = self.handlers.lock().unwrap();
        handlers.get(name).cloned()
    }
}

/// Run one work body to completion, bounded by `max_duration` when set.
///
/// Exceeding the cap aborts the body and reports a retryable failure, as
/// does a panic inside it — both are conditions worth retrying under backoff
/// rather than waiting a full interval.
pub async fn invoke(work: Arc<dyn Work>, max_duration: Option<Duration>) -> WorkResult {
    let mut handle = tokio::spawn(async move { work.run().await });

    let joined = match max_duration {
        Some(limit) => match tokio::time::timeout(limit, &mut handle).await {
            Ok(joined) => joined,
            Err(_) => {
                handle.abort();
                warn!(limit_secs = limit.as_secs(), "work exceeded execution cap");
                return WorkResult::Retry;
            }
        },
        None => (&mut handle).await,
    };

    match joined {
        Ok(result) => result,
        Err(e) => {
            warn!("work body panicked: {e}");
            WorkResult::Retry
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(WorkResult);

    #[async_trait]
    impl Work for Fixed {
        async fn run(&self) -> WorkResult {
            self.0
        }
    }

    struct Panics;

    #[async_trait]
    impl Work for Panics {
        async fn run(&self) -> WorkResult {
            panic!("boom");
        }
    }

    struct Stalls;

    #[async_trait]
    impl Work for Stalls {
        async fn run(&self) -> WorkResult {
            tokio::time::sleep(Duration::from_secs(60)).await;
            WorkResult::Success
        }
    }

    #[tokio::test]
    async fn invoke_passes_result_through() {
        assert_eq!(
            invoke(Arc::new(Fixed(WorkResult::Success)), None).await,
            WorkResult::Success
        );
        assert_eq!(
            invoke(Arc::new(Fixed(WorkResult::Failure)), None).await,
            WorkResult::Failure
        );
    }

    #[tokio::test]
    async fn panic_becomes_retryable_failure() {
        assert_eq!(invoke(Arc::new(Panics), None).await, WorkResult::Retry);
    }

    #[tokio::test]
    async fn timeout_becomes_retryable_failure() {
        let result = invoke(Arc::new(Stalls), Some(Duration::from_millis(20))).await;
        assert_eq!(result, WorkResult::Retry);
    }

    #[tokio::test]
    async fn registry_attach_get_detach() {
        let registry = WorkRegistry::new();
        assert!(registry.get("feed-sync").is_none());

        registry.attach("feed-sync", Arc::new(Fixed(WorkResult::Success)));
        assert!(registry.get("feed-sync").is_some());

        registry.detach("feed-sync");
        assert!(registry.get("feed-sync").is_none());
    }
}
