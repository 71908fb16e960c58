//! Kubernetes connection and job template settings.
//!
//! Inside a pod the API address and service-account credentials are
//! discovered from the standard environment and mount points; outside a
//! cluster the client falls back to a local `kubectl proxy`.

use std::path::{Path, PathBuf};
use std::time::Duration;

/// Service-account token mounted into every pod.
pub const IN_CLUSTER_TOKEN_FILE: &str = "/var/run/secrets/kubernetes.io/serviceaccount/token";

/// Cluster CA bundle mounted next to the service-account token.
pub const IN_CLUSTER_CA_FILE: &str = "/var/run/secrets/kubernetes.io/serviceaccount/ca.crt";

/// API address used outside a cluster (`kubectl proxy` default).
pub const LOCAL_PROXY_URL: &str = "http://127.0.0.1:8001";

/// Upper bound on connecting to and hearing back from the API server.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Kubernetes backend configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct KubeConfig {
    /// Base URL of the Kubernetes API server.
    pub api_url: String,
    /// Namespace jobs are created and listed in (default: `default`).
    pub namespace: String,
    /// Bearer token file, if the API requires one.
    pub token_file: Option<PathBuf>,
    /// Extra root certificate for the API server's TLS chain.
    pub ca_file: Option<PathBuf>,
    /// Container image the script runs in (default: `alpine:3.20`).
    pub image: String,
    /// Value of the `app` label put on every job (default: `executor-api`).
    pub app_label: String,
    /// Hard limit on a job's running phase (default: `720`).
    pub active_deadline_seconds: i64,
    /// How long finished jobs are kept before cluster cleanup (default: `300`).
    pub ttl_seconds_after_finished: i32,
    /// Per-request connect and response deadline (default: 10 s).
    pub request_timeout: Duration,
}

impl KubeConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                           | Default                          |
    /// |-----------------------------------|----------------------------------|
    /// | `KUBE_API_URL`                    | in-cluster service, else proxy   |
    /// | `K8S_NAMESPACE`                   | `default`                        |
    /// | `KUBE_TOKEN_FILE`                 | service-account token in-cluster |
    /// | `KUBE_CA_FILE`                    | service-account CA in-cluster    |
    /// | `EXEC_IMAGE`                      | `alpine:3.20`                    |
    /// | `EXEC_APP_LABEL`                  | `executor-api`                   |
    /// | `EXEC_ACTIVE_DEADLINE_SECONDS`    | `720`                            |
    /// | `EXEC_TTL_SECONDS_AFTER_FINISHED` | `300`                            |
    /// | `KUBE_REQUEST_TIMEOUT_SECS`       | `10`                             |
    pub fn from_env() -> Self {
        let service_host = std::env::var("KUBERNETES_SERVICE_HOST").ok();
        let in_cluster = service_host.is_some() || Path::new(IN_CLUSTER_TOKEN_FILE).exists();

        let api_url = std::env::var("KUBE_API_URL").unwrap_or_else(|_| {
            match service_host {
                Some(host) => {
                    let port = std::env::var("KUBERNETES_SERVICE_PORT")
                        .unwrap_or_else(|_| "443".into());
                    in_cluster_url(&host, &port)
                }
                None => LOCAL_PROXY_URL.to_string(),
            }
        });

        let token_file = std::env::var("KUBE_TOKEN_FILE")
            .ok()
            .map(PathBuf::from)
            .or_else(|| in_cluster.then(|| PathBuf::from(IN_CLUSTER_TOKEN_FILE)));

        let ca_file = std::env::var("KUBE_CA_FILE")
            .ok()
            .map(PathBuf::from)
            .or_else(|| in_cluster.then(|| PathBuf::from(IN_CLUSTER_CA_FILE)));

        let namespace = std::env::var("K8S_NAMESPACE").unwrap_or_else(|_| "default".into());
        let image = std::env::var("EXEC_IMAGE").unwrap_or_else(|_| "alpine:3.20".into());
        let app_label =
            std::env::var("EXEC_APP_LABEL").unwrap_or_else(|_| "executor-api".into());

        let active_deadline_seconds: i64 = std::env::var("EXEC_ACTIVE_DEADLINE_SECONDS")
            .unwrap_or_else(|_| "720".into())
            .parse()
            .expect("EXEC_ACTIVE_DEADLINE_SECONDS must be a valid i64");

        let ttl_seconds_after_finished: i32 = std::env::var("EXEC_TTL_SECONDS_AFTER_FINISHED")
            .unwrap_or_else(|_| "300".into())
            .parse()
            .expect("EXEC_TTL_SECONDS_AFTER_FINISHED must be a valid i32");

        let request_timeout = std::env::var("KUBE_REQUEST_TIMEOUT_SECS")
            .ok()
            .map(|v| {
                v.parse::<u64>()
                    .expect("KUBE_REQUEST_TIMEOUT_SECS must be a valid u64")
            })
            .filter(|secs| *secs > 0)
            .map_or(DEFAULT_REQUEST_TIMEOUT, Duration::from_secs);

        Self {
            api_url,
            namespace,
            token_file,
            ca_file,
            image,
            app_label,
            active_deadline_seconds,
            ttl_seconds_after_finished,
            request_timeout,
        }
    }

    /// Label selector matching every job this service created.
    pub fn label_selector(&self) -> String {
        format!("app={}", self.app_label)
    }
}

/// HTTPS URL of the API server as seen from inside a pod.
///
/// IPv6 service hosts need brackets around the address.
pub fn in_cluster_url(host: &str, port: &str) -> String {
    if host.contains(':') {
        format!("https://[{host}]:{port}")
    } else {
        format!("https://{host}:{port}")
    }
}
