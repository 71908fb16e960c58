//! `GET /health`: database reachability, reconcile loop progress and the
//! submission backlog.
//!
//! Answers 503 when the database is unreachable or the reconciler has not
//! finished a tick within its stall threshold, so the kubelet restarts a pod
//! whose loop is wedged.

use axum::extract::State;
use axum::http::StatusCode;
use axum::{routing::get, Json, Router};
use scriptexec_core::types::Timestamp;
use serde::Serialize;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthReport {
    /// `ok` or `degraded`.
    pub status: &'static str,
    pub version: &'static str,
    pub database_reachable: bool,
    pub reconciler: ReconcilerHealth,
    /// Submissions dispatched but not yet acknowledged by the backend.
    pub submissions_in_flight: usize,
}

#[derive(Debug, Serialize)]
pub struct ReconcilerHealth {
    pub last_tick_at: Option<Timestamp>,
    pub stalled: bool,
}

async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthReport>) {
    let database_reachable = scriptexec_db::health_check(&state.pool).await.is_ok();
    let stalled = state.heartbeat.is_stalled(chrono::Utc::now());

    let healthy = database_reachable && !stalled;
    let code = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let report = HealthReport {
        status: if healthy { "ok" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        database_reachable,
        reconciler: ReconcilerHealth {
            last_tick_at: state.heartbeat.last_tick(),
            stalled,
        },
        submissions_in_flight: state.submitter.in_flight(),
    };
    (code, Json(report))
}

/// Mounted at the root, outside `/api/v1`.
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health))
}
