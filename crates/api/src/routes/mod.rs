pub mod executions;
pub mod health;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /executions                 create
/// /executions/{id}            get
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new().nest("/executions", executions::router())
}
