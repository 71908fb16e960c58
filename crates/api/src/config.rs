use std::time::Duration;

use scriptexec_core::reconcile::{ReconcilePolicy, DEFAULT_QUEUE_TIMEOUT_SECS};

/// Server configuration loaded from environment variables.
///
/// All fields have sensible defaults suitable for local development.
/// In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Upper bound on draining background work after the listener stops
    /// (default: `30`).
    pub shutdown_timeout_secs: u64,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                | Default                    |
    /// |------------------------|----------------------------|
    /// | `HOST`                 | `0.0.0.0`                  |
    /// | `PORT`                 | `3000`                     |
    /// | `CORS_ORIGINS`         | `http://localhost:5173`    |
    /// | `REQUEST_TIMEOUT_SECS` | `30`                       |
    /// | `SHUTDOWN_TIMEOUT_SECS`| `30`                       |
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "3000".into())
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs: u64 = std::env::var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("REQUEST_TIMEOUT_SECS must be a valid u64");

        let shutdown_timeout_secs: u64 = std::env::var("SHUTDOWN_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("SHUTDOWN_TIMEOUT_SECS must be a valid u64");

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            shutdown_timeout_secs,
        }
    }
}

/// Default period between reconcile ticks.
pub const DEFAULT_RECONCILE_INTERVAL: Duration = Duration::from_millis(3000);

/// Reconciliation loop configuration.
#[derive(Debug, Clone)]
pub struct ReconcileConfig {
    /// Time between tick starts.
    pub interval: Duration,
    /// Queue timeout applied to every candidate.
    pub policy: ReconcilePolicy,
    /// Backend label selector matching every job this service owns.
    pub selector: String,
}

impl ReconcileConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                      | Default |
    /// |------------------------------|---------|
    /// | `EXEC_QUEUE_TIMEOUT_SECONDS` | `300`   |
    /// | `RECONCILE_INTERVAL_MS`      | `3000`  |
    pub fn from_env(selector: String) -> Self {
        let queue_timeout_secs: u64 = std::env::var("EXEC_QUEUE_TIMEOUT_SECONDS")
            .unwrap_or_else(|_| DEFAULT_QUEUE_TIMEOUT_SECS.to_string())
            .parse()
            .expect("EXEC_QUEUE_TIMEOUT_SECONDS must be a valid u64");

        let interval_ms: u64 = std::env::var("RECONCILE_INTERVAL_MS")
            .unwrap_or_else(|_| "3000".into())
            .parse()
            .expect("RECONCILE_INTERVAL_MS must be a valid u64");
        assert!(interval_ms > 0, "RECONCILE_INTERVAL_MS must be positive");

        Self {
            interval: Duration::from_millis(interval_ms),
            policy: ReconcilePolicy { queue_timeout_secs },
            selector,
        }
    }
}

/// Default cap on concurrent backend submissions.
pub const DEFAULT_SUBMIT_MAX_CONCURRENCY: usize = 16;

/// Job submitter configuration.
#[derive(Debug, Clone)]
pub struct SubmitterConfig {
    /// Maximum submissions in flight at once (default: `16`).
    pub max_concurrency: usize,
}

impl SubmitterConfig {
    /// Load configuration from `SUBMIT_MAX_CONCURRENCY`.
    pub fn from_env() -> Self {
        let max_concurrency: usize = std::env::var("SUBMIT_MAX_CONCURRENCY")
            .unwrap_or_else(|_| DEFAULT_SUBMIT_MAX_CONCURRENCY.to_string())
            .parse()
            .expect("SUBMIT_MAX_CONCURRENCY must be a valid usize");
        assert!(max_concurrency > 0, "SUBMIT_MAX_CONCURRENCY must be positive");

        Self { max_concurrency }
    }
}

impl Default for SubmitterConfig {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_SUBMIT_MAX_CONCURRENCY,
        }
    }
}
