use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderName, Method, StatusCode};
use axum::Router;
use tokio_util::sync::CancellationToken;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use scriptexec_api::config::{ReconcileConfig, ServerConfig, SubmitterConfig};
use scriptexec_api::engine::reconciler::Reconciler;
use scriptexec_api::engine::store::{ExecutionStore, PgExecutionStore};
use scriptexec_api::engine::submitter::JobSubmitter;
use scriptexec_api::routes;
use scriptexec_api::state::AppState;
use scriptexec_kube::backend::{JobBackend, KubernetesBackend};
use scriptexec_kube::config::KubeConfig;

/// Filter used when `RUST_LOG` is unset.
const DEFAULT_LOG_FILTER: &str =
    "scriptexec_api=debug,scriptexec_kube=debug,scriptexec_db=debug,tower_http=debug";

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    init_tracing();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    let kube_config = KubeConfig::from_env();
    tracing::info!(
        api_url = %kube_config.api_url,
        namespace = %kube_config.namespace,
        image = %kube_config.image,
        "Loaded Kubernetes configuration",
    );

    // --- Database ---
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = scriptexec_db::create_pool(&database_url)
        .await
        .expect("Failed to connect to database");
    tracing::info!("Database connection pool created");

    scriptexec_db::health_check(&pool)
        .await
        .expect("Database health check failed");
    tracing::info!("Database health check passed");

    scriptexec_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database migrations applied");

    // --- Job backend ---
    let backend: Arc<dyn JobBackend> = Arc::new(
        KubernetesBackend::new(kube_config.clone()).expect("Failed to create Kubernetes client"),
    );
    let store: Arc<dyn ExecutionStore> = Arc::new(PgExecutionStore::new(pool.clone()));

    // --- Submitter ---
    let submitter_config = SubmitterConfig::from_env();
    tracing::info!(
        max_concurrency = submitter_config.max_concurrency,
        "Job submitter ready",
    );
    let submitter = Arc::new(JobSubmitter::new(
        Arc::clone(&backend),
        Arc::clone(&store),
        &submitter_config,
    ));

    // --- Reconciler ---
    let reconcile_config = ReconcileConfig::from_env(kube_config.label_selector());
    let reconciler = Reconciler::new(Arc::clone(&store), backend, reconcile_config);
    let heartbeat = reconciler.heartbeat();
    let reconcile_cancel = CancellationToken::new();
    let reconcile_handle = {
        let cancel = reconcile_cancel.clone();
        tokio::spawn(async move { reconciler.run(cancel).await })
    };

    // --- CORS ---
    let cors = build_cors_layer(&config);

    // --- App state ---
    let state = AppState {
        pool,
        config: Arc::new(config.clone()),
        store,
        submitter: Arc::clone(&submitter),
        heartbeat,
    };

    // --- Request ID header name ---
    let request_id_header = HeaderName::from_static("x-request-id");

    // --- Router ---
    let app = Router::new()
        // Health check at root level (not under /api/v1).
        .merge(routes::health::router())
        .nest("/api/v1", routes::api_routes())
        // -- Middleware stack (applied bottom-up) --
        .layer(CatchPanicLayer::new())
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(config.request_timeout_secs),
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

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    reconcile_cancel.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(5), reconcile_handle).await;
    tracing::info!("Reconciler stopped");

    let drain_timeout = Duration::from_secs(config.shutdown_timeout_secs);
    if submitter.shutdown(drain_timeout).await {
        tracing::info!("In-flight submissions drained");
    } else {
        tracing::warn!(
            pending = submitter.in_flight(),
            "Shutdown timeout reached with submissions still in flight",
        );
    }

    tracing::info!("Graceful shutdown complete");
}

/// Install the global subscriber. `LOG_FORMAT=json` switches to
/// newline-delimited JSON output.
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into());
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix) so the server
/// shuts down cleanly whether stopped interactively or by the kubelet.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}

/// Build the CORS middleware layer from server configuration.
///
/// Panics at startup if any configured origin is invalid.
fn build_cors_layer(config: &ServerConfig) -> CorsLayer {
    let origins: Vec<_> = config
        .cors_origins
        .iter()
        .map(|o| {
            o.parse()
                .unwrap_or_else(|e| panic!("Invalid CORS origin '{o}': {e}"))
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(3600))
}
