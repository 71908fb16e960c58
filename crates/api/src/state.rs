use std::sync::Arc;

use crate::config::ServerConfig;
use crate::engine::reconciler::Heartbeat;
use crate::engine::store::ExecutionStore;
use crate::engine::submitter::JobSubmitter;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc` or is already `Clone`).
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool (health checks).
    pub pool: scriptexec_db::DbPool,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Execution records.
    pub store: Arc<dyn ExecutionStore>,
    /// Background job submission.
    pub submitter: Arc<JobSubmitter>,
    /// Reconcile loop liveness, reported by `/health`.
    pub heartbeat: Arc<Heartbeat>,
}
