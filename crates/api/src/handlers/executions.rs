//! Handlers for the `/executions` resource.
//!
//! Creating an execution records it as `QUEUED` and hands the job to the
//! background submitter; the response never waits on the backend. Status
//! changes after that are made by the reconciler only.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use scriptexec_core::error::CoreError;
use scriptexec_core::execution::{new_job_name, ExecutionStatus};
use scriptexec_core::types::{ExecutionId, Timestamp};
use scriptexec_core::validation::validate_script;
use scriptexec_db::models::execution::CreateExecution;
use scriptexec_kube::manifest::ResourceLimits;
use serde::Serialize;
use validator::Validate;

use crate::engine::submitter::SubmissionRequest;
use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Response bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct CreatedExecution {
    pub id: ExecutionId,
    pub status: ExecutionStatus,
}

#[derive(Debug, Serialize)]
pub struct ExecutionView {
    pub id: ExecutionId,
    pub status: ExecutionStatus,
    pub created_at: Timestamp,
    pub outcome: Option<String>,
}

// ---------------------------------------------------------------------------
// Create
// ---------------------------------------------------------------------------

/// POST /api/v1/executions
///
/// Validate the request, record a queued execution bound to a fresh job
/// name and dispatch the job. Returns 201 with the id and `QUEUED` status.
/// Bodies that are not valid JSON for the request shape get a 400 in the
/// usual error envelope.
pub async fn create_execution(
    State(state): State<AppState>,
    payload: Result<Json<CreateExecution>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let Json(input) = payload.map_err(|rejection| AppError::BadRequest(rejection.body_text()))?;
    input.validate()?;
    validate_script(&input.script)?;

    let job_name = new_job_name();
    let execution = state.store.create(&input, &job_name).await?;

    tracing::info!(
        execution_id = %execution.id,
        job_name = %job_name,
        cpu = %execution.requested_cpu,
        memory = %execution.requested_memory,
        "Execution queued",
    );

    state.submitter.dispatch(SubmissionRequest {
        job_name,
        script: execution.script,
        resources: ResourceLimits {
            cpu: execution.requested_cpu,
            memory: execution.requested_memory,
        },
    });

    Ok((
        StatusCode::CREATED,
        Json(DataResponse {
            data: CreatedExecution {
                id: execution.id,
                status: ExecutionStatus::Queued,
            },
        }),
    ))
}

// ---------------------------------------------------------------------------
// Get
// ---------------------------------------------------------------------------

/// GET /api/v1/executions/{id}
pub async fn get_execution(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<DataResponse<ExecutionView>>> {
    let id: ExecutionId = id
        .parse()
        .map_err(|_| AppError::BadRequest(format!("Invalid execution id: {id}")))?;

    let execution = state
        .store
        .find_by_id(id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "Execution",
            id: id.to_string(),
        }))?;

    let status = execution.status()?;

    Ok(Json(DataResponse {
        data: ExecutionView {
            id: execution.id,
            status,
            created_at: execution.created_at,
            outcome: execution.outcome,
        },
    }))
}
