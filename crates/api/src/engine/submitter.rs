//! Background submission of execution jobs to the backend.
//!
//! Handlers hand a [`SubmissionRequest`] to [`JobSubmitter::dispatch`] and
//! return immediately; the submission runs on its own task. When the backend
//! rejects a job outright, the execution is finished with the error text as
//! its outcome, since no backend job will ever exist for the reconciler to
//! observe.

use std::sync::Arc;
use std::time::Duration;

use scriptexec_kube::backend::{BackendError, JobBackend};
use scriptexec_kube::manifest::{shell_command, ResourceLimits};
use tokio::sync::Semaphore;
use tokio_util::task::TaskTracker;

use super::store::ExecutionStore;
use crate::config::SubmitterConfig;

/// A job ready to be handed to the backend.
#[derive(Debug, Clone)]
pub struct SubmissionRequest {
    pub job_name: String,
    pub script: String,
    pub resources: ResourceLimits,
}

/// Worker pool for backend submissions.
///
/// At most `max_concurrency` submissions talk to the backend at once; the
/// rest wait for a permit. Tasks are tracked so shutdown can drain them.
pub struct JobSubmitter {
    backend: Arc<dyn JobBackend>,
    store: Arc<dyn ExecutionStore>,
    permits: Arc<Semaphore>,
    tracker: TaskTracker,
}

impl JobSubmitter {
    pub fn new(
        backend: Arc<dyn JobBackend>,
        store: Arc<dyn ExecutionStore>,
        config: &SubmitterConfig,
    ) -> Self {
        Self {
            backend,
            store,
            permits: Arc::new(Semaphore::new(config.max_concurrency)),
            tracker: TaskTracker::new(),
        }
    }

    /// Submit `request` on a background task.
    pub fn dispatch(self: &Arc<Self>, request: SubmissionRequest) {
        let submitter = Arc::clone(self);
        self.tracker.spawn(async move {
            let Ok(_permit) = Arc::clone(&submitter.permits).acquire_owned().await else {
                tracing::warn!(job_name = %request.job_name, "Submitter closed, job dropped");
                return;
            };
            // Failures are recorded on the execution itself.
            let _ = submitter.submit(&request).await;
        });
    }

    /// Submit `request` now, recording a rejection on the execution.
    pub async fn submit(&self, request: &SubmissionRequest) -> Result<(), BackendError> {
        let command = shell_command(&request.script);
        match self
            .backend
            .submit(&request.job_name, &command, &request.resources)
            .await
        {
            Ok(()) => {
                tracing::debug!(job_name = %request.job_name, "Job submitted");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(job_name = %request.job_name, error = %e, "Job submission failed");
                self.record_failure(&request.job_name, &e).await;
                Err(e)
            }
        }
    }

    /// Number of submissions still running or waiting for a permit.
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Stop accepting new work and wait up to `timeout` for in-flight
    /// submissions. Returns `false` if the wait timed out.
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        self.tracker.close();
        let pending = self.tracker.len();
        if pending > 0 {
            tracing::info!(pending, "Waiting for in-flight submissions");
        }
        tokio::time::timeout(timeout, self.tracker.wait()).await.is_ok()
    }

    async fn record_failure(&self, job_name: &str, error: &BackendError) {
        let outcome = error.to_string();
        match self.store.force_finish_by_job_name(job_name, &outcome).await {
            Ok(true) => {
                tracing::info!(job_name, outcome = %outcome, "Execution finished after rejected submission");
            }
            Ok(false) => match self.store.find_by_job_name(job_name).await {
                Ok(Some(execution)) => {
                    tracing::debug!(
                        job_name,
                        execution_id = %execution.id,
                        "Execution already finished, rejection not recorded",
                    );
                }
                Ok(None) => {
                    tracing::warn!(job_name, "No execution bound to rejected job");
                }
                Err(e) => {
                    tracing::error!(job_name, error = %e, "Failed to look up rejected job");
                }
            },
            Err(e) => {
                // The execution stays QUEUED with no backend job behind it.
                tracing::error!(job_name, error = %e, "Failed to record rejected submission");
            }
        }
    }
}
