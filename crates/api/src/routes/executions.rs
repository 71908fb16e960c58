//! Route definitions for the `/executions` resource.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::executions;
use crate::state::AppState;

/// Routes mounted at `/executions`.
///
/// ```text
/// POST   /                -> create_execution
/// GET    /{id}            -> get_execution
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(executions::create_execution))
        .route("/{id}", get(executions::get_execution))
}
