//! The job backend seam used by the execution engine.
//!
//! [`JobBackend`] is the only thing the engine knows about the cluster:
//! submit a job, and list raw counters for the jobs this service owns.
//! [`KubernetesBackend`] implements it on top of [`KubeApi`].

use std::collections::HashMap;

use async_trait::async_trait;
use scriptexec_core::execution::JobCounters;

use crate::api::{KubeApi, KubeApiError};
use crate::config::KubeConfig;
use crate::manifest::{build_job, ResourceLimits};

/// Errors a job backend reports to the engine.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// The backend rejected or never received a job submission.
    #[error("Job submission failed: {0}")]
    Submission(String),

    /// Listing job counters failed; the caller should retry later.
    #[error("Job status query failed: {0}")]
    Query(String),
}

/// A workload backend that runs submitted jobs and reports their counters.
#[async_trait]
pub trait JobBackend: Send + Sync {
    /// Submit one job. Fails with [`BackendError::Submission`].
    async fn submit(
        &self,
        job_name: &str,
        command: &[String],
        resources: &ResourceLimits,
    ) -> Result<(), BackendError>;

    /// List counters for every job matching `selector`, keyed by job name.
    /// Fails with [`BackendError::Query`].
    async fn list_counters(
        &self,
        selector: &str,
    ) -> Result<HashMap<String, JobCounters>, BackendError>;
}

/// [`JobBackend`] backed by the Kubernetes `batch/v1` API.
pub struct KubernetesBackend {
    api: KubeApi,
    config: KubeConfig,
}

impl KubernetesBackend {
    /// Connect using `config`, loading credentials from disk.
    pub fn new(config: KubeConfig) -> Result<Self, KubeApiError> {
        let api = KubeApi::from_config(&config)?;
        Ok(Self { api, config })
    }

    /// Wrap an existing API client.
    pub fn with_api(api: KubeApi, config: KubeConfig) -> Self {
        Self { api, config }
    }
}

#[async_trait]
impl JobBackend for KubernetesBackend {
    async fn submit(
        &self,
        job_name: &str,
        command: &[String],
        resources: &ResourceLimits,
    ) -> Result<(), BackendError> {
        let job = build_job(&self.config, job_name, command, resources);
        self.api
            .create_job(&job)
            .await
            .map_err(|e| BackendError::Submission(e.to_string()))?;

        tracing::info!(
            job_name,
            namespace = %self.config.namespace,
            "Kubernetes job created",
        );
        Ok(())
    }

    async fn list_counters(
        &self,
        selector: &str,
    ) -> Result<HashMap<String, JobCounters>, BackendError> {
        let list = self
            .api
            .list_jobs(selector)
            .await
            .map_err(|e| BackendError::Query(e.to_string()))?;
        Ok(list.into_counters())
    }
}
