//! Pure diff step of the reconciliation loop.
//!
//! Takes the read set (active executions plus the counters the backend
//! reported for them) and produces the write set. No I/O happens here, so
//! the same inputs always yield the same plan.

use std::collections::{BTreeMap, HashMap};

use crate::execution::{
    derive_job_state, start_timeout_outcome, ExecutionStatus, JobCounters,
};
use crate::types::{ExecutionId, Timestamp};

/// Default time an execution may stay queued before it is failed.
pub const DEFAULT_QUEUE_TIMEOUT_SECS: u64 = 300;

/// Timeout policy applied on every tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcilePolicy {
    /// Maximum seconds an execution may remain `QUEUED`.
    pub queue_timeout_secs: u64,
}

impl Default for ReconcilePolicy {
    fn default() -> Self {
        Self {
            queue_timeout_secs: DEFAULT_QUEUE_TIMEOUT_SECS,
        }
    }
}

/// The slice of an execution record the planner needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub id: ExecutionId,
    pub status: ExecutionStatus,
    pub job_name: String,
    pub created_at: Timestamp,
}

/// Updates staged by one tick, keyed by execution id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcilePlan {
    pub status_updates: BTreeMap<ExecutionId, ExecutionStatus>,
    pub outcome_updates: BTreeMap<ExecutionId, String>,
}

impl ReconcilePlan {
    pub fn is_empty(&self) -> bool {
        self.status_updates.is_empty() && self.outcome_updates.is_empty()
    }
}

/// Whether a queued execution has waited at least `threshold_secs`.
///
/// Only `QUEUED` executions can time out; a job that reached the cluster
/// scheduler is governed by its own running deadline.
pub fn is_queue_timed_out(
    status: ExecutionStatus,
    created_at: Timestamp,
    now: Timestamp,
    threshold_secs: u64,
) -> bool {
    if status != ExecutionStatus::Queued {
        return false;
    }
    let waited = (now - created_at).num_seconds();
    waited >= 0 && waited as u64 >= threshold_secs
}

/// Compute the status and outcome updates for one tick.
///
/// For each candidate the backend reported counters for:
///
/// 1. A queued execution past the timeout is finished with a
///    `START_TIMEOUT` outcome, and derivation is skipped.
/// 2. Otherwise the derived status is staged when it moves the execution
///    forward. A derived status behind the persisted one is ignored.
/// 3. A transition into `FINISHED` also stages the derived outcome.
///
/// Candidates without counters are left alone: the backend may simply not
/// have the job yet.
pub fn plan_updates(
    candidates: &[Candidate],
    counters: &HashMap<String, JobCounters>,
    now: Timestamp,
    policy: &ReconcilePolicy,
) -> ReconcilePlan {
    let mut plan = ReconcilePlan::default();

    for candidate in candidates {
        if candidate.status.is_terminal() {
            continue;
        }
        let Some(job_counters) = counters.get(&candidate.job_name) else {
            continue;
        };

        if is_queue_timed_out(
            candidate.status,
            candidate.created_at,
            now,
            policy.queue_timeout_secs,
        ) {
            plan.status_updates
                .insert(candidate.id, ExecutionStatus::Finished);
            plan.outcome_updates
                .insert(candidate.id, start_timeout_outcome(policy.queue_timeout_secs));
            continue;
        }

        let state = derive_job_state(*job_counters);
        if state.status > candidate.status {
            plan.status_updates.insert(candidate.id, state.status);

            if state.status.is_terminal() {
                if let Some(outcome) = state.outcome {
                    plan.outcome_updates.insert(candidate.id, outcome);
                }
            }
        }
    }

    plan
}
