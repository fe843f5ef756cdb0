//! Job registry: the single chokepoint for active executions.
//!
//! Each job id may hold at most one execution slot at a time. The slot
//! couples a cancellation token (polled by the crawl and validation loops)
//! with a completion signal the registry waits on during shutdown.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use webcatalog_shared::{CatalogError, JobId, Result};

/// Registry-side view of one active execution.
struct Execution {
    cancel: CancellationToken,
    done: watch::Receiver<bool>,
    started_at: DateTime<Utc>,
}

/// Pipeline-side handle for a registered execution. The pipeline polls
/// `cancel` at its unit-of-work boundaries and calls [`ExecutionSlot::finish`]
/// when it exits, on every path.
pub struct ExecutionSlot {
    /// Cooperative cancellation token for this execution.
    pub cancel: CancellationToken,
    done: watch::Sender<bool>,
}

impl ExecutionSlot {
    /// Signal that the execution has finished. Dropping the slot has the
    /// same effect (the registry treats a closed channel as done).
    pub fn finish(self) {
        let _ = self.done.send(true);
    }
}

/// Table of (job id → execution), with exclusive-registration semantics.
#[derive(Default)]
pub struct JobRegistry {
    inner: Mutex<HashMap<String, Execution>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the execution slot for a job. Fails with `AlreadyRunning` if an
    /// execution is already registered for this job id.
    pub fn register(&self, job_id: &JobId) -> Result<ExecutionSlot> {
        let mut inner = self.inner.lock().expect("registry poisoned");
        let key = job_id.to_string();

        if inner.contains_key(&key) {
            return Err(CatalogError::AlreadyRunning { job_id: key });
        }

        let cancel = CancellationToken::new();
        let (done_tx, done_rx) = watch::channel(false);
        inner.insert(
            key,
            Execution {
                cancel: cancel.clone(),
                done: done_rx,
                started_at: Utc::now(),
            },
        );

        debug!(%job_id, "execution registered");
        Ok(ExecutionSlot {
            cancel,
            done: done_tx,
        })
    }

    /// Release a job's slot. Safe to call for an unregistered job.
    pub fn release(&self, job_id: &JobId) {
        let mut inner = self.inner.lock().expect("registry poisoned");
        if inner.remove(&job_id.to_string()).is_some() {
            debug!(%job_id, "execution released");
        }
    }

    /// Fire the cancellation token for a job's execution, if one is
    /// registered. Returns whether a token existed. Cancellation is
    /// cooperative: the execution stops at its next poll point.
    pub fn stop(&self, job_id: &JobId) -> bool {
        let inner = self.inner.lock().expect("registry poisoned");
        match inner.get(&job_id.to_string()) {
            Some(execution) => {
                info!(%job_id, "stop requested");
                execution.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Whether an execution is currently registered for this job.
    pub fn is_active(&self, job_id: &JobId) -> bool {
        self.inner
            .lock()
            .expect("registry poisoned")
            .contains_key(&job_id.to_string())
    }

    /// Number of registered executions.
    pub fn active_count(&self) -> usize {
        self.inner.lock().expect("registry poisoned").len()
    }

    /// Best-effort shutdown: cancel every registered execution, wait up to
    /// `grace` for them to drain, then drop all tracking state. Residual
    /// work past the grace period is abandoned, not interrupted.
    pub async fn shutdown(&self, grace: Duration) {
        let executions: Vec<(String, watch::Receiver<bool>)> = {
            let inner = self.inner.lock().expect("registry poisoned");
            inner
                .iter()
                .map(|(id, execution)| {
                    execution.cancel.cancel();
                    (id.clone(), execution.done.clone())
                })
                .collect()
        };

        if executions.is_empty() {
            return;
        }

        info!(count = executions.len(), "shutdown: cancelling active executions");

        let deadline = tokio::time::Instant::now() + grace;
        for (job_id, mut done) in executions {
            let wait = async {
                // wait_for errors when the sender is dropped, which also
                // means the execution is gone.
                let _ = done.wait_for(|finished| *finished).await;
            };
            if tokio::time::timeout_at(deadline, wait).await.is_err() {
                warn!(%job_id, "execution did not drain within grace period");
            }
        }

        self.inner.lock().expect("registry poisoned").clear();
    }

    /// When the oldest registered execution started, if any. Exposed for
    /// status output.
    pub fn oldest_started_at(&self) -> Option<DateTime<Utc>> {
        self.inner
            .lock()
            .expect("registry poisoned")
            .values()
            .map(|e| e.started_at)
            .min()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_is_exclusive_per_job() {
        let registry = JobRegistry::new();
        let job_id = JobId::new();

        let slot = registry.register(&job_id).expect("first registration");
        let second = registry.register(&job_id);
        assert!(matches!(second, Err(CatalogError::AlreadyRunning { .. })));

        // A different job is unaffected.
        let other = JobId::new();
        registry.register(&other).expect("other job registers");

        slot.finish();
        registry.release(&job_id);
        assert!(!registry.is_active(&job_id));
        assert!(registry.is_active(&other));

        // Slot free again after release.
        registry.register(&job_id).expect("re-register after release");
    }

    #[test]
    fn stop_reports_whether_a_token_existed() {
        let registry = JobRegistry::new();
        let job_id = JobId::new();

        assert!(!registry.stop(&job_id));

        let slot = registry.register(&job_id).unwrap();
        assert!(registry.stop(&job_id));
        assert!(slot.cancel.is_cancelled());
    }

    #[tokio::test]
    async fn shutdown_waits_for_draining_executions() {
        let registry = JobRegistry::new();
        let job_id = JobId::new();
        let slot = registry.register(&job_id).unwrap();

        let cancel = slot.cancel.clone();
        let worker = tokio::spawn(async move {
            // Simulated pipeline: loops until its token fires, then finishes.
            cancel.cancelled().await;
            tokio::time::sleep(Duration::from_millis(20)).await;
            slot.finish();
        });

        registry.shutdown(Duration::from_secs(2)).await;
        assert_eq!(registry.active_count(), 0);
        worker.await.unwrap();
    }

    #[tokio::test]
    async fn shutdown_abandons_stuck_executions_without_deadlock() {
        let registry = JobRegistry::new();
        let job_id = JobId::new();
        // Slot kept alive and never finished: a stuck execution.
        let _slot = registry.register(&job_id).unwrap();

        let start = std::time::Instant::now();
        registry.shutdown(Duration::from_millis(100)).await;

        // Returned after the grace period, state cleared either way.
        assert!(start.elapsed() < Duration::from_secs(2));
        assert_eq!(registry.active_count(), 0);
    }
}
