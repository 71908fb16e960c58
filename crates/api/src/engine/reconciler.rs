//! Periodic reconciliation of execution records against backend jobs.
//!
//! Every tick reads the active executions, asks the backend for all job
//! counters in one query, plans the updates with
//! [`plan_updates`](scriptexec_core::reconcile::plan_updates) and writes
//! them back as one batch. Nothing is written until the read phase is
//! complete, so a failed read leaves the store untouched and the next tick
//! simply tries again.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use scriptexec_core::reconcile::{plan_updates, Candidate};
use scriptexec_core::types::Timestamp;
use scriptexec_db::models::execution::Execution;
use scriptexec_db::repositories::execution_repo::AppliedUpdates;
use scriptexec_kube::backend::{BackendError, JobBackend};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::store::ExecutionStore;
use crate::config::ReconcileConfig;

/// Why a tick stopped early. Ticks are independent, so every variant is
/// recovered from by the next tick.
#[derive(Debug, thiserror::Error)]
pub enum TickError {
    #[error("Failed to load active executions: {0}")]
    Load(#[source] sqlx::Error),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("Failed to persist reconcile updates: {0}")]
    Persist(#[source] sqlx::Error),
}

/// Result of a tick that was allowed to run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Active executions considered.
    pub candidates: usize,
    /// Candidates the backend reported counters for.
    pub observed: usize,
    /// Rows changed by the write phase.
    pub applied: AppliedUpdates,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Another tick was still in progress.
    Skipped,
    Completed(TickReport),
}

/// Missed intervals after which the loop counts as stalled.
const STALL_AFTER_TICKS: u32 = 10;

/// Floor for the stall threshold, kept above the backend request timeout.
const MIN_STALL_THRESHOLD: Duration = Duration::from_secs(30);

const NEVER: i64 = i64::MIN;

/// When the reconcile loop last finished a tick, shared with `/health`.
///
/// Failed ticks count: the heartbeat tracks that the loop keeps turning,
/// not that the backend is healthy.
#[derive(Debug)]
pub struct Heartbeat {
    started_at: Timestamp,
    stall_threshold: Duration,
    last_tick_ms: AtomicI64,
}

impl Heartbeat {
    pub fn new(interval: Duration) -> Self {
        Self {
            started_at: chrono::Utc::now(),
            stall_threshold: (interval * STALL_AFTER_TICKS).max(MIN_STALL_THRESHOLD),
            last_tick_ms: AtomicI64::new(NEVER),
        }
    }

    pub fn beat(&self, at: Timestamp) {
        self.last_tick_ms
            .store(at.timestamp_millis(), Ordering::Release);
    }

    pub fn last_tick(&self) -> Option<Timestamp> {
        match self.last_tick_ms.load(Ordering::Acquire) {
            NEVER => None,
            ms => chrono::DateTime::from_timestamp_millis(ms),
        }
    }

    /// True when no tick has finished within the stall threshold, counted
    /// from start-up until the first tick.
    pub fn is_stalled(&self, now: Timestamp) -> bool {
        let since = self.last_tick().unwrap_or(self.started_at);
        (now - since)
            .to_std()
            .is_ok_and(|elapsed| elapsed > self.stall_threshold)
    }
}

/// Background reconciler.
///
/// A single long-lived Tokio task drives [`Reconciler::run`]; the
/// `running` flag additionally guarantees that two ticks never overlap,
/// whoever triggers them.
pub struct Reconciler {
    store: Arc<dyn ExecutionStore>,
    backend: Arc<dyn JobBackend>,
    config: ReconcileConfig,
    running: AtomicBool,
    heartbeat: Arc<Heartbeat>,
}

/// Clears the running flag when a tick ends, including on cancellation.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn ExecutionStore>,
        backend: Arc<dyn JobBackend>,
        config: ReconcileConfig,
    ) -> Self {
        let heartbeat = Arc::new(Heartbeat::new(config.interval));
        Self {
            store,
            backend,
            config,
            running: AtomicBool::new(false),
            heartbeat,
        }
    }

    pub fn heartbeat(&self) -> Arc<Heartbeat> {
        Arc::clone(&self.heartbeat)
    }

    /// Run the reconcile loop until the cancellation token is triggered.
    ///
    /// Ticks that come due while one is still running are dropped rather
    /// than queued up.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tracing::info!(
            interval_ms = self.config.interval.as_millis() as u64,
            queue_timeout_secs = self.config.policy.queue_timeout_secs,
            selector = %self.config.selector,
            "Reconciler started",
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Reconciler shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    self.tick_and_log().await;
                }
            }
        }
    }

    /// Run one tick at the current time.
    pub async fn tick(&self) -> Result<TickOutcome, TickError> {
        self.tick_at(chrono::Utc::now()).await
    }

    /// Run one tick treating `now` as the current time.
    pub async fn tick_at(&self, now: Timestamp) -> Result<TickOutcome, TickError> {
        let Some(_guard) = self.try_begin() else {
            return Ok(TickOutcome::Skipped);
        };
        let result = self.reconcile(now).await;
        self.heartbeat.beat(now);
        result.map(TickOutcome::Completed)
    }

    async fn tick_and_log(&self) {
        let started = std::time::Instant::now();
        match self.tick().await {
            Ok(TickOutcome::Skipped) => {
                tracing::debug!("Reconcile tick skipped, previous tick still running");
            }
            Ok(TickOutcome::Completed(report)) => {
                let elapsed_ms = started.elapsed().as_millis() as u64;
                if report.applied.statuses > 0 || report.applied.outcomes > 0 {
                    tracing::info!(
                        candidates = report.candidates,
                        observed = report.observed,
                        statuses = report.applied.statuses,
                        outcomes = report.applied.outcomes,
                        elapsed_ms,
                        "Reconcile tick applied updates",
                    );
                } else {
                    tracing::debug!(
                        candidates = report.candidates,
                        observed = report.observed,
                        elapsed_ms,
                        "Reconcile tick found nothing to update",
                    );
                }
            }
            Err(TickError::Backend(e)) => {
                tracing::warn!(error = %e, "Reconcile tick aborted, backend query failed");
            }
            Err(e) => {
                tracing::error!(error = %e, "Reconcile tick failed");
            }
        }
    }

    fn try_begin(&self) -> Option<RunningGuard<'_>> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RunningGuard(&self.running))
    }

    async fn reconcile(&self, now: Timestamp) -> Result<TickReport, TickError> {
        // ---- read ----
        let active = self.store.find_active().await.map_err(TickError::Load)?;
        let candidates: Vec<Candidate> = active.iter().filter_map(to_candidate).collect();
        if candidates.is_empty() {
            return Ok(TickReport::default());
        }

        let counters = self.backend.list_counters(&self.config.selector).await?;
        let observed = candidates
            .iter()
            .filter(|c| counters.contains_key(&c.job_name))
            .count();

        // ---- diff ----
        let plan = plan_updates(&candidates, &counters, now, &self.config.policy);

        let mut report = TickReport {
            candidates: candidates.len(),
            observed,
            applied: AppliedUpdates::default(),
        };
        if plan.is_empty() {
            return Ok(report);
        }

        // ---- write ----
        report.applied = self
            .store
            .apply_updates(&plan)
            .await
            .map_err(TickError::Persist)?;
        Ok(report)
    }
}

fn to_candidate(execution: &Execution) -> Option<Candidate> {
    let job_name = execution.job_name.clone()?;
    let status = match execution.status() {
        Ok(status) => status,
        Err(e) => {
            tracing::warn!(execution_id = %execution.id, error = %e, "Skipping execution");
            return None;
        }
    };
    Some(Candidate {
        id: execution.id,
        status,
        job_name,
        created_at: execution.created_at,
    })
}
