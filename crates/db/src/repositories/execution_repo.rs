//! Repository for the `executions` table.
//!
//! Status writes only ever move an execution forward, and outcome writes
//! only fill an empty outcome on a finished row. Both guards live in SQL so
//! a stale writer can never undo a newer state.

use std::collections::BTreeMap;

use scriptexec_core::execution::{ExecutionStatus, StatusId};
use scriptexec_core::types::{ExecutionId, Timestamp};
use sqlx::{PgConnection, PgPool};

use crate::models::execution::{CreateExecution, Execution};

/// Column list for `executions` queries.
const COLUMNS: &str = "\
    id, status_id, script, requested_cpu, requested_memory, \
    job_name, outcome, created_at, updated_at";

/// Rows touched by a combined reconcile write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AppliedUpdates {
    pub statuses: u64,
    pub outcomes: u64,
}

/// Provides persistence operations for script executions.
pub struct ExecutionRepo;

impl ExecutionRepo {
    /// Insert a new queued execution bound to `job_name`, stamped with the
    /// application clock.
    pub async fn create(
        pool: &PgPool,
        input: &CreateExecution,
        job_name: &str,
    ) -> Result<Execution, sqlx::Error> {
        Self::create_at(pool, input, job_name, chrono::Utc::now()).await
    }

    /// Insert a new queued execution with an explicit creation time.
    ///
    /// The queue timeout compares `created_at` against the reconciler's
    /// clock, so the timestamp must come from the same clock and never from
    /// the database's `NOW()`.
    pub async fn create_at(
        pool: &PgPool,
        input: &CreateExecution,
        job_name: &str,
        created_at: Timestamp,
    ) -> Result<Execution, sqlx::Error> {
        let query = format!(
            "INSERT INTO executions \
                (id, status_id, script, requested_cpu, requested_memory, job_name, \
                 created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $7) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Execution>(&query)
            .bind(ExecutionId::now_v7())
            .bind(ExecutionStatus::Queued.id())
            .bind(&input.script)
            .bind(&input.resources.cpu)
            .bind(&input.resources.memory)
            .bind(job_name)
            .bind(created_at)
            .fetch_one(pool)
            .await
    }

    /// Find an execution by its ID.
    pub async fn find_by_id(
        pool: &PgPool,
        id: ExecutionId,
    ) -> Result<Option<Execution>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM executions WHERE id = $1");
        sqlx::query_as::<_, Execution>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Find the execution bound to a backend job name.
    pub async fn find_by_job_name(
        pool: &PgPool,
        job_name: &str,
    ) -> Result<Option<Execution>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM executions WHERE job_name = $1");
        sqlx::query_as::<_, Execution>(&query)
            .bind(job_name)
            .fetch_optional(pool)
            .await
    }

    /// List every unfinished execution that has a backend job name,
    /// oldest first.
    pub async fn find_active(pool: &PgPool) -> Result<Vec<Execution>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM executions \
             WHERE status_id <> $1 AND job_name IS NOT NULL \
             ORDER BY created_at ASC, id ASC"
        );
        sqlx::query_as::<_, Execution>(&query)
            .bind(ExecutionStatus::Finished.id())
            .fetch_all(pool)
            .await
    }

    /// Set statuses for many executions in one statement.
    ///
    /// Rows whose stored status is already at or past the requested one are
    /// left alone. Returns the number of rows changed.
    pub async fn batch_update_status(
        pool: &PgPool,
        updates: &BTreeMap<ExecutionId, ExecutionStatus>,
    ) -> Result<u64, sqlx::Error> {
        let mut conn = pool.acquire().await?;
        Self::update_statuses(&mut conn, updates).await
    }

    /// Record outcomes for many executions in one statement.
    ///
    /// Only finished rows with no outcome yet are written, so an outcome is
    /// never overwritten. Returns the number of rows changed.
    pub async fn batch_update_outcome(
        pool: &PgPool,
        updates: &BTreeMap<ExecutionId, String>,
    ) -> Result<u64, sqlx::Error> {
        let mut conn = pool.acquire().await?;
        Self::update_outcomes(&mut conn, updates).await
    }

    /// Apply a reconcile tick's status batch and then its outcome batch in
    /// one transaction.
    pub async fn apply_updates(
        pool: &PgPool,
        statuses: &BTreeMap<ExecutionId, ExecutionStatus>,
        outcomes: &BTreeMap<ExecutionId, String>,
    ) -> Result<AppliedUpdates, sqlx::Error> {
        if statuses.is_empty() && outcomes.is_empty() {
            return Ok(AppliedUpdates::default());
        }

        let mut tx = pool.begin().await?;
        let statuses = Self::update_statuses(&mut tx, statuses).await?;
        let outcomes = Self::update_outcomes(&mut tx, outcomes).await?;
        tx.commit().await?;

        Ok(AppliedUpdates { statuses, outcomes })
    }

    /// Finish an execution by job name with the given outcome.
    ///
    /// Used when the backend rejects a submission outright. Returns `false`
    /// if no unfinished execution carries that job name.
    pub async fn force_finish_by_job_name(
        pool: &PgPool,
        job_name: &str,
        outcome: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE executions \
             SET status_id = $2, outcome = $3 \
             WHERE job_name = $1 AND status_id <> $2",
        )
        .bind(job_name)
        .bind(ExecutionStatus::Finished.id())
        .bind(outcome)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    // ---- private helpers ----

    async fn update_statuses(
        conn: &mut PgConnection,
        updates: &BTreeMap<ExecutionId, ExecutionStatus>,
    ) -> Result<u64, sqlx::Error> {
        if updates.is_empty() {
            return Ok(0);
        }

        let ids: Vec<ExecutionId> = updates.keys().copied().collect();
        let status_ids: Vec<StatusId> = updates.values().map(|s| s.id()).collect();

        let result = sqlx::query(
            "UPDATE executions AS e \
             SET status_id = u.status_id \
             FROM UNNEST($1::uuid[], $2::smallint[]) AS u(id, status_id) \
             WHERE e.id = u.id AND e.status_id < u.status_id",
        )
        .bind(&ids)
        .bind(&status_ids)
        .execute(&mut *conn)
        .await?;

        tracing::debug!(
            requested = updates.len(),
            updated = result.rows_affected(),
            "Execution statuses written",
        );
        Ok(result.rows_affected())
    }

    async fn update_outcomes(
        conn: &mut PgConnection,
        updates: &BTreeMap<ExecutionId, String>,
    ) -> Result<u64, sqlx::Error> {
        if updates.is_empty() {
            return Ok(0);
        }

        let ids: Vec<ExecutionId> = updates.keys().copied().collect();
        let outcomes: Vec<String> = updates.values().cloned().collect();

        let result = sqlx::query(
            "UPDATE executions AS e \
             SET outcome = u.outcome \
             FROM UNNEST($1::uuid[], $2::text[]) AS u(id, outcome) \
             WHERE e.id = u.id AND e.outcome IS NULL AND e.status_id = $3",
        )
        .bind(&ids)
        .bind(&outcomes)
        .bind(ExecutionStatus::Finished.id())
        .execute(&mut *conn)
        .await?;

        tracing::debug!(
            requested = updates.len(),
            updated = result.rows_affected(),
            "Execution outcomes written",
        );
        Ok(result.rows_affected())
    }
}
