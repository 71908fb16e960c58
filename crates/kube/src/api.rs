//! REST client for the Kubernetes `batch/v1` Jobs endpoints.
//!
//! Wraps job creation and label-selected listing in one namespace using
//! [`reqwest`]. The bearer token file is read again for every request so
//! that projected service-account tokens, which the kubelet rotates in
//! place, are picked up without a restart.

use std::path::PathBuf;

use crate::config::KubeConfig;
use crate::manifest::{Job, JobList};

/// Longest error description kept from a non-`Status` response body.
const MAX_ERROR_BODY_CHARS: usize = 512;

/// HTTP client for one namespace of a Kubernetes API server.
pub struct KubeApi {
    client: reqwest::Client,
    api_url: String,
    namespace: String,
    token_file: Option<PathBuf>,
}

/// Errors from the Kubernetes REST layer.
#[derive(Debug, thiserror::Error)]
pub enum KubeApiError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The API server returned a non-2xx status code.
    #[error("Kubernetes API error ({status}): {message}")]
    ApiError {
        /// HTTP status code.
        status: u16,
        /// The `Status` object's message, or the start of the raw body.
        message: String,
    },

    /// A credential file could not be read.
    #[error("Failed to read {path}: {source}")]
    Credentials {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl KubeApi {
    /// Build a client from configuration, loading the CA bundle if
    /// configured.
    ///
    /// Every request is bounded by `config.request_timeout`, so a server that
    /// accepts connections but never answers surfaces as
    /// [`KubeApiError::Request`] instead of hanging the caller. The token
    /// file is read once here only to fail fast on a bad path.
    pub fn from_config(config: &KubeConfig) -> Result<Self, KubeApiError> {
        let mut builder = reqwest::Client::builder()
            .connect_timeout(config.request_timeout)
            .timeout(config.request_timeout);

        if let Some(ca_file) = &config.ca_file {
            let pem = read_file(ca_file)?;
            builder = builder.add_root_certificate(reqwest::Certificate::from_pem(&pem)?);
        }

        if let Some(path) = &config.token_file {
            read_token(path)?;
        }

        Ok(Self {
            client: builder.build()?,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            namespace: config.namespace.clone(),
            token_file: config.token_file.clone(),
        })
    }

    /// Create an API client reusing an existing [`reqwest::Client`]
    /// with no authentication (e.g. behind `kubectl proxy`).
    pub fn with_client(client: reqwest::Client, api_url: String, namespace: String) -> Self {
        Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            namespace,
            token_file: None,
        }
    }

    /// Create a Job in the configured namespace.
    ///
    /// Sends `POST /apis/batch/v1/namespaces/{ns}/jobs`. Admission and
    /// quota rejections surface as [`KubeApiError::ApiError`].
    pub async fn create_job(&self, job: &Job) -> Result<(), KubeApiError> {
        let response = self
            .authorized(self.client.post(self.jobs_url()))?
            .json(job)
            .send()
            .await?;

        Self::check_status(response).await
    }

    /// List Jobs matching `label_selector` in the configured namespace.
    ///
    /// Sends `GET /apis/batch/v1/namespaces/{ns}/jobs?labelSelector=...`.
    pub async fn list_jobs(&self, label_selector: &str) -> Result<JobList, KubeApiError> {
        let response = self
            .authorized(self.client.get(self.jobs_url()))?
            .query(&[("labelSelector", label_selector)])
            .send()
            .await?;

        Self::parse_response(response).await
    }

    // ---- private helpers ----

    fn jobs_url(&self) -> String {
        format!(
            "{}/apis/batch/v1/namespaces/{}/jobs",
            self.api_url, self.namespace
        )
    }

    fn authorized(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::RequestBuilder, KubeApiError> {
        match &self.token_file {
            Some(path) => Ok(request.bearer_auth(read_token(path)?)),
            None => Ok(request),
        }
    }

    /// Ensure the response has a success status code. Returns the
    /// response unchanged on success, or a [`KubeApiError::ApiError`]
    /// carrying the status and a readable failure description.
    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, KubeApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(KubeApiError::ApiError {
                status: status.as_u16(),
                message: describe_error_body(&body),
            });
        }
        Ok(response)
    }

    /// Parse a successful JSON response body into the expected type.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, KubeApiError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }

    /// Assert the response has a success status code, discarding the body.
    async fn check_status(response: reqwest::Response) -> Result<(), KubeApiError> {
        Self::ensure_success(response).await?;
        Ok(())
    }
}

/// Subset of the `meta/v1` `Status` object returned with API errors.
#[derive(serde::Deserialize)]
struct StatusBody {
    message: Option<String>,
}

/// The `message` of a `Status` body, or the body itself cut to
/// [`MAX_ERROR_BODY_CHARS`].
fn describe_error_body(body: &str) -> String {
    let message = serde_json::from_str::<StatusBody>(body)
        .ok()
        .and_then(|status| status.message)
        .filter(|m| !m.trim().is_empty());
    if let Some(message) = message {
        return message;
    }

    let body = body.trim();
    match body.char_indices().nth(MAX_ERROR_BODY_CHARS) {
        Some((cut, _)) => format!("{}...", &body[..cut]),
        None => body.to_string(),
    }
}

fn read_token(path: &std::path::Path) -> Result<String, KubeApiError> {
    let raw = read_file(path)?;
    Ok(String::from_utf8_lossy(&raw).trim().to_string())
}

fn read_file(path: &std::path::Path) -> Result<Vec<u8>, KubeApiError> {
    std::fs::read(path).map_err(|source| KubeApiError::Credentials {
        path: path.display().to_string(),
        source,
    })
}
