//! Execution store seam shared by the HTTP handlers, the submitter and the
//! reconciler.
//!
//! [`PgExecutionStore`] delegates to [`ExecutionRepo`]; tests swap in an
//! in-memory implementation.

use std::collections::BTreeMap;

use async_trait::async_trait;
use scriptexec_core::execution::ExecutionStatus;
use scriptexec_core::reconcile::ReconcilePlan;
use scriptexec_core::types::ExecutionId;
use scriptexec_db::models::execution::{CreateExecution, Execution};
use scriptexec_db::repositories::execution_repo::AppliedUpdates;
use scriptexec_db::repositories::ExecutionRepo;
use scriptexec_db::DbPool;

/// Durable record of executions.
#[async_trait]
pub trait ExecutionStore: Send + Sync {
    /// Insert a queued execution bound to `job_name`.
    async fn create(
        &self,
        input: &CreateExecution,
        job_name: &str,
    ) -> Result<Execution, sqlx::Error>;

    async fn find_by_id(&self, id: ExecutionId) -> Result<Option<Execution>, sqlx::Error>;

    async fn find_by_job_name(&self, job_name: &str) -> Result<Option<Execution>, sqlx::Error>;

    /// Unfinished executions that carry a job name.
    async fn find_active(&self) -> Result<Vec<Execution>, sqlx::Error>;

    async fn batch_update_status(
        &self,
        updates: &BTreeMap<ExecutionId, ExecutionStatus>,
    ) -> Result<u64, sqlx::Error>;

    async fn batch_update_outcome(
        &self,
        updates: &BTreeMap<ExecutionId, String>,
    ) -> Result<u64, sqlx::Error>;

    /// Write a reconcile plan: statuses first, then outcomes.
    async fn apply_updates(&self, plan: &ReconcilePlan) -> Result<AppliedUpdates, sqlx::Error> {
        let statuses = self.batch_update_status(&plan.status_updates).await?;
        let outcomes = self.batch_update_outcome(&plan.outcome_updates).await?;
        Ok(AppliedUpdates { statuses, outcomes })
    }

    /// Finish the unfinished execution bound to `job_name` with `outcome`.
    /// Returns `false` when nothing was changed.
    async fn force_finish_by_job_name(
        &self,
        job_name: &str,
        outcome: &str,
    ) -> Result<bool, sqlx::Error>;
}

/// [`ExecutionStore`] backed by PostgreSQL.
#[derive(Clone)]
pub struct PgExecutionStore {
    pool: DbPool,
}

impl PgExecutionStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ExecutionStore for PgExecutionStore {
    async fn create(
        &self,
        input: &CreateExecution,
        job_name: &str,
    ) -> Result<Execution, sqlx::Error> {
        ExecutionRepo::create(&self.pool, input, job_name).await
    }

    async fn find_by_id(&self, id: ExecutionId) -> Result<Option<Execution>, sqlx::Error> {
        ExecutionRepo::find_by_id(&self.pool, id).await
    }

    async fn find_by_job_name(&self, job_name: &str) -> Result<Option<Execution>, sqlx::Error> {
        ExecutionRepo::find_by_job_name(&self.pool, job_name).await
    }

    async fn find_active(&self) -> Result<Vec<Execution>, sqlx::Error> {
        ExecutionRepo::find_active(&self.pool).await
    }

    async fn batch_update_status(
        &self,
        updates: &BTreeMap<ExecutionId, ExecutionStatus>,
    ) -> Result<u64, sqlx::Error> {
        ExecutionRepo::batch_update_status(&self.pool, updates).await
    }

    async fn batch_update_outcome(
        &self,
        updates: &BTreeMap<ExecutionId, String>,
    ) -> Result<u64, sqlx::Error> {
        ExecutionRepo::batch_update_outcome(&self.pool, updates).await
    }

    /// Both batches share one transaction so a failed outcome write never
    /// leaves a finished row without its outcome.
    async fn apply_updates(&self, plan: &ReconcilePlan) -> Result<AppliedUpdates, sqlx::Error> {
        ExecutionRepo::apply_updates(&self.pool, &plan.status_updates, &plan.outcome_updates).await
    }

    async fn force_finish_by_job_name(
        &self,
        job_name: &str,
        outcome: &str,
    ) -> Result<bool, sqlx::Error> {
        ExecutionRepo::force_finish_by_job_name(&self.pool, job_name, outcome).await
    }
}
