//! Execution lifecycle: status enum, backend counters, and job-state derivation.

use serde::Serialize;

use crate::error::CoreError;

/// Status ID type matching the SMALLINT `execution_statuses` lookup table.
pub type StatusId = i16;

/// Outcome recorded when the backend reports at least one succeeded pod.
pub const OUTCOME_SUCCESS: &str = "SUCCESS";

/// Outcome recorded when the backend reports only failed pods.
pub const OUTCOME_FAILED: &str = "FAILED";

/// Prefix of the outcome recorded when a job never left the queue.
pub const OUTCOME_START_TIMEOUT_PREFIX: &str = "START_TIMEOUT";

/// Prefix for generated backend job names.
pub const JOB_NAME_PREFIX: &str = "exec-";

/// Number of hex characters taken from a random UUID for the job name suffix.
const JOB_NAME_SUFFIX_LEN: usize = 8;

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Lifecycle status of an execution.
///
/// Discriminants match the seed order of the `execution_statuses` table and
/// increase along the only legal direction of travel, so `a.id() < b.id()`
/// means `b` is further along than `a`.
#[repr(i16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    Queued = 1,
    InProgress = 2,
    Finished = 3,
}

impl ExecutionStatus {
    /// Return the database status ID.
    pub fn id(self) -> StatusId {
        self as StatusId
    }

    /// Map a database status ID back to the enum.
    pub fn from_id(id: StatusId) -> Result<Self, CoreError> {
        match id {
            1 => Ok(Self::Queued),
            2 => Ok(Self::InProgress),
            3 => Ok(Self::Finished),
            other => Err(CoreError::Internal(format!(
                "Unknown execution status id {other}"
            ))),
        }
    }

    /// Wire name used in API responses.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "QUEUED",
            Self::InProgress => "IN_PROGRESS",
            Self::Finished => "FINISHED",
        }
    }

    pub fn is_terminal(self) -> bool {
        self == Self::Finished
    }
}

impl From<ExecutionStatus> for StatusId {
    fn from(value: ExecutionStatus) -> Self {
        value as StatusId
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Backend counters and derived state
// ---------------------------------------------------------------------------

/// Raw pod counters the backend reports for one job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobCounters {
    pub active: u32,
    pub succeeded: u32,
    pub failed: u32,
}

impl JobCounters {
    pub fn new(active: u32, succeeded: u32, failed: u32) -> Self {
        Self {
            active,
            succeeded,
            failed,
        }
    }
}

/// Normalized lifecycle state of one backend job, derived fresh every tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobState {
    pub status: ExecutionStatus,
    /// `Some` exactly when `status` is [`ExecutionStatus::Finished`].
    pub outcome: Option<String>,
}

/// Derive the lifecycle state of a job from its raw counters.
///
/// Total over every counter triple and independent of time or history:
///
/// - any active pod means the job is running;
/// - otherwise any succeeded or failed pod means it finished, and a
///   succeeded pod wins over a failed one;
/// - otherwise the job has not been scheduled yet.
pub fn derive_job_state(counters: JobCounters) -> JobState {
    if counters.active > 0 {
        return JobState {
            status: ExecutionStatus::InProgress,
            outcome: None,
        };
    }

    if counters.succeeded > 0 || counters.failed > 0 {
        let outcome = if counters.succeeded > 0 {
            OUTCOME_SUCCESS
        } else {
            OUTCOME_FAILED
        };
        return JobState {
            status: ExecutionStatus::Finished,
            outcome: Some(outcome.to_string()),
        };
    }

    JobState {
        status: ExecutionStatus::Queued,
        outcome: None,
    }
}

/// Outcome text for an execution that stayed queued past the threshold.
pub fn start_timeout_outcome(threshold_secs: u64) -> String {
    format!("{OUTCOME_START_TIMEOUT_PREFIX}: job did not start within {threshold_secs}s")
}

/// Generate a fresh backend job name, e.g. `exec-1a2b3c4d`.
pub fn new_job_name() -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{JOB_NAME_PREFIX}{}", &suffix[..JOB_NAME_SUFFIX_LEN])
}
