#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderName, Method, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use http_body_util::BodyExt;
use scriptexec_core::execution::JobCounters;
use scriptexec_core::reconcile::ReconcilePolicy;
use scriptexec_kube::backend::{BackendError, JobBackend};
use scriptexec_kube::manifest::ResourceLimits;
use sqlx::PgPool;
use tower::ServiceExt;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

use scriptexec_api::config::{ReconcileConfig, ServerConfig, SubmitterConfig};
use scriptexec_api::engine::reconciler::Reconciler;
use scriptexec_api::engine::store::{ExecutionStore, PgExecutionStore};
use scriptexec_api::engine::submitter::JobSubmitter;
use scriptexec_api::routes;
use scriptexec_api::state::AppState;

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 30,
    }
}

// ---------------------------------------------------------------------------
// Backend double
// ---------------------------------------------------------------------------

/// Job backend that records submissions instead of talking to a cluster.
#[derive(Default)]
pub struct RecordingBackend {
    pub submitted: Mutex<Vec<(String, Vec<String>, ResourceLimits)>>,
    pub counters: Mutex<HashMap<String, JobCounters>>,
    pub reject_with: Option<String>,
}

impl RecordingBackend {
    pub fn rejecting(message: &str) -> Self {
        Self {
            reject_with: Some(message.to_string()),
            ..Self::default()
        }
    }
}

#[async_trait]
impl JobBackend for RecordingBackend {
    async fn submit(
        &self,
        job_name: &str,
        command: &[String],
        resources: &ResourceLimits,
    ) -> Result<(), BackendError> {
        if let Some(message) = &self.reject_with {
            return Err(BackendError::Submission(message.clone()));
        }
        self.submitted.lock().unwrap().push((
            job_name.to_string(),
            command.to_vec(),
            resources.clone(),
        ));
        Ok(())
    }

    async fn list_counters(
        &self,
        _selector: &str,
    ) -> Result<HashMap<String, JobCounters>, BackendError> {
        Ok(self.counters.lock().unwrap().clone())
    }
}

// ---------------------------------------------------------------------------
// App construction
// ---------------------------------------------------------------------------

/// Handles a test needs besides the router.
pub struct TestApp {
    pub router: Router,
    pub store: Arc<dyn ExecutionStore>,
    pub submitter: Arc<JobSubmitter>,
    pub reconciler: Arc<Reconciler>,
    pub backend: Arc<RecordingBackend>,
}

/// Build the full application router with a recording backend.
pub fn build_test_app(pool: PgPool) -> Router {
    build_test_app_with(pool, RecordingBackend::default()).router
}

/// Build the full application router with all middleware layers, using the
/// given database pool and backend.
///
/// This mirrors the router construction in `main.rs` so integration tests
/// exercise the same middleware stack (CORS, request ID, timeout, tracing,
/// panic recovery) that production uses.
pub fn build_test_app_with(pool: PgPool, backend: RecordingBackend) -> TestApp {
    let backend = Arc::new(backend);
    let store: Arc<dyn ExecutionStore> = Arc::new(PgExecutionStore::new(pool.clone()));
    let submitter = Arc::new(JobSubmitter::new(
        Arc::clone(&backend) as Arc<dyn JobBackend>,
        Arc::clone(&store),
        &SubmitterConfig::default(),
    ));

    let reconciler = Arc::new(Reconciler::new(
        Arc::clone(&store),
        Arc::clone(&backend) as Arc<dyn JobBackend>,
        ReconcileConfig {
            interval: Duration::from_secs(3),
            policy: ReconcilePolicy::default(),
            selector: "app=executor-api".into(),
        },
    ));

    let state = AppState {
        pool,
        config: Arc::new(test_config()),
        store: Arc::clone(&store),
        submitter: Arc::clone(&submitter),
        heartbeat: reconciler.heartbeat(),
    };

    let cors = CorsLayer::new()
        .allow_origin(["http://localhost:5173".parse().unwrap()])
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(3600));

    let request_id_header = HeaderName::from_static("x-request-id");

    let router = Router::new()
        .merge(routes::health::router())
        .nest("/api/v1", routes::api_routes())
        .layer(CatchPanicLayer::new())
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(30),
        ))
        .layer(PropagateRequestIdLayer::new(request_id_header.clone()))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(SetRequestIdLayer::new(request_id_header, MakeRequestUuid))
        .layer(cors)
        .with_state(state);

    TestApp {
        router,
        store,
        submitter,
        reconciler,
        backend,
    }
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

pub async fn get(app: Router, uri: &str) -> Response {
    let request = Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> Response {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn body_json(response: Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
