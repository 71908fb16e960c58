//! Integration tests for `ExecutionRepo` against a real database:
//! - Create and lookup by id / job name
//! - Active set selection
//! - Forward-only status writes and append-only outcome writes
//! - Forced finish on submission failure

use std::collections::BTreeMap;

use assert_matches::assert_matches;
use scriptexec_core::execution::ExecutionStatus;
use scriptexec_db::models::execution::{CreateExecution, ExecutionResources};
use scriptexec_db::repositories::ExecutionRepo;
use sqlx::PgPool;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn new_execution(script: &str) -> CreateExecution {
    CreateExecution {
        script: script.to_string(),
        resources: ExecutionResources::default(),
    }
}

async fn status_of(pool: &PgPool, id: uuid::Uuid) -> ExecutionStatus {
    ExecutionRepo::find_by_id(pool, id)
        .await
        .unwrap()
        .expect("execution exists")
        .status()
        .unwrap()
}

// ---------------------------------------------------------------------------
// Create / lookup
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn create_starts_queued_without_outcome(pool: PgPool) {
    let execution = ExecutionRepo::create(&pool, &new_execution("echo hi"), "exec-create1")
        .await
        .unwrap();

    assert_matches!(execution.status(), Ok(ExecutionStatus::Queued));
    assert_eq!(execution.outcome, None);
    assert_eq!(execution.job_name.as_deref(), Some("exec-create1"));
    assert_eq!(execution.requested_cpu, "500m");
    assert_eq!(execution.requested_memory, "256Mi");

    let found = ExecutionRepo::find_by_id(&pool, execution.id)
        .await
        .unwrap()
        .expect("created execution is readable");
    assert_eq!(found.script, "echo hi");
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn create_at_keeps_the_given_creation_time(pool: PgPool) {
    let stamped = chrono::DateTime::from_timestamp(1_700_000_000, 0).unwrap();

    let execution =
        ExecutionRepo::create_at(&pool, &new_execution("true"), "exec-stamped1", stamped)
            .await
            .unwrap();
    assert_eq!(execution.created_at, stamped);

    let active = ExecutionRepo::find_active(&pool).await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].created_at, stamped);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn find_by_id_returns_none_for_unknown(pool: PgPool) {
    let found = ExecutionRepo::find_by_id(&pool, uuid::Uuid::now_v7())
        .await
        .unwrap();
    assert!(found.is_none());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn find_by_job_name_matches_exactly(pool: PgPool) {
    let created = ExecutionRepo::create(&pool, &new_execution("true"), "exec-byname1")
        .await
        .unwrap();

    let found = ExecutionRepo::find_by_job_name(&pool, "exec-byname1")
        .await
        .unwrap()
        .expect("lookup by job name");
    assert_eq!(found.id, created.id);

    assert!(ExecutionRepo::find_by_job_name(&pool, "exec-missing")
        .await
        .unwrap()
        .is_none());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn duplicate_job_name_is_rejected(pool: PgPool) {
    ExecutionRepo::create(&pool, &new_execution("true"), "exec-dup00001")
        .await
        .unwrap();
    let err = ExecutionRepo::create(&pool, &new_execution("true"), "exec-dup00001")
        .await
        .unwrap_err();

    let db_err = err.as_database_error().expect("database error");
    assert_eq!(db_err.constraint(), Some("uq_executions_job_name"));
}

// ---------------------------------------------------------------------------
// Active set
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn find_active_excludes_finished(pool: PgPool) {
    let queued = ExecutionRepo::create(&pool, &new_execution("a"), "exec-active01")
        .await
        .unwrap();
    let running = ExecutionRepo::create(&pool, &new_execution("b"), "exec-active02")
        .await
        .unwrap();
    let done = ExecutionRepo::create(&pool, &new_execution("c"), "exec-active03")
        .await
        .unwrap();

    let statuses = BTreeMap::from([
        (running.id, ExecutionStatus::InProgress),
        (done.id, ExecutionStatus::Finished),
    ]);
    let outcomes = BTreeMap::from([(done.id, "SUCCESS".to_string())]);
    ExecutionRepo::apply_updates(&pool, &statuses, &outcomes)
        .await
        .unwrap();

    let active: Vec<_> = ExecutionRepo::find_active(&pool)
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.id)
        .collect();
    assert_eq!(active, vec![queued.id, running.id]);
}

// ---------------------------------------------------------------------------
// Batched writes
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn status_updates_never_move_backward(pool: PgPool) {
    let e = ExecutionRepo::create(&pool, &new_execution("x"), "exec-forward1")
        .await
        .unwrap();

    let forward = BTreeMap::from([(e.id, ExecutionStatus::InProgress)]);
    assert_eq!(ExecutionRepo::batch_update_status(&pool, &forward).await.unwrap(), 1);

    let backward = BTreeMap::from([(e.id, ExecutionStatus::Queued)]);
    assert_eq!(ExecutionRepo::batch_update_status(&pool, &backward).await.unwrap(), 0);

    assert_eq!(status_of(&pool, e.id).await, ExecutionStatus::InProgress);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn outcome_is_written_once(pool: PgPool) {
    let e = ExecutionRepo::create(&pool, &new_execution("x"), "exec-outcome1")
        .await
        .unwrap();

    ExecutionRepo::apply_updates(
        &pool,
        &BTreeMap::from([(e.id, ExecutionStatus::Finished)]),
        &BTreeMap::from([(e.id, "FAILED".to_string())]),
    )
    .await
    .unwrap();

    let again = BTreeMap::from([(e.id, "SUCCESS".to_string())]);
    assert_eq!(ExecutionRepo::batch_update_outcome(&pool, &again).await.unwrap(), 0);

    let found = ExecutionRepo::find_by_id(&pool, e.id).await.unwrap().unwrap();
    assert_eq!(found.outcome.as_deref(), Some("FAILED"));
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn outcome_requires_finished_status(pool: PgPool) {
    let e = ExecutionRepo::create(&pool, &new_execution("x"), "exec-outcome2")
        .await
        .unwrap();

    let outcomes = BTreeMap::from([(e.id, "SUCCESS".to_string())]);
    assert_eq!(ExecutionRepo::batch_update_outcome(&pool, &outcomes).await.unwrap(), 0);

    let found = ExecutionRepo::find_by_id(&pool, e.id).await.unwrap().unwrap();
    assert_eq!(found.outcome, None);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn empty_batches_are_no_ops(pool: PgPool) {
    let applied = ExecutionRepo::apply_updates(&pool, &BTreeMap::new(), &BTreeMap::new())
        .await
        .unwrap();
    assert_eq!(applied.statuses, 0);
    assert_eq!(applied.outcomes, 0);
}

// ---------------------------------------------------------------------------
// Forced finish
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn force_finish_sets_status_and_outcome(pool: PgPool) {
    let e = ExecutionRepo::create(&pool, &new_execution("x"), "exec-force001")
        .await
        .unwrap();

    let changed = ExecutionRepo::force_finish_by_job_name(&pool, "exec-force001", "quota exceeded")
        .await
        .unwrap();
    assert!(changed);

    let found = ExecutionRepo::find_by_id(&pool, e.id).await.unwrap().unwrap();
    assert_matches!(found.status(), Ok(ExecutionStatus::Finished));
    assert_eq!(found.outcome.as_deref(), Some("quota exceeded"));

    let again = ExecutionRepo::force_finish_by_job_name(&pool, "exec-force001", "other")
        .await
        .unwrap();
    assert!(!again, "finished executions keep their first outcome");
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn force_finish_unknown_job_is_noop(pool: PgPool) {
    let changed = ExecutionRepo::force_finish_by_job_name(&pool, "exec-nobody00", "boom")
        .await
        .unwrap();
    assert!(!changed);
}
