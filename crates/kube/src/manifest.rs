//! `batch/v1` Job manifests and list responses.
//!
//! Only the fields this service writes or reads are modelled; everything
//! else in the Kubernetes schema is left to server defaults or ignored.

use std::collections::{BTreeMap, HashMap};

use scriptexec_core::execution::JobCounters;
use serde::{Deserialize, Serialize};

use crate::config::KubeConfig;

/// Name of the single container in every job pod.
pub const CONTAINER_NAME: &str = "runner";

/// Label carrying the job name on both the Job and its pods.
pub const JOB_NAME_LABEL: &str = "jobName";

/// CPU and memory quantities applied as both requests and limits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceLimits {
    pub cpu: String,
    pub memory: String,
}

/// Command line that runs `script` with the image's POSIX shell.
pub fn shell_command(script: &str) -> Vec<String> {
    vec!["/bin/sh".to_string(), "-c".to_string(), script.to_string()]
}

// ---------------------------------------------------------------------------
// Outgoing manifest
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub api_version: &'static str,
    pub kind: &'static str,
    pub metadata: ObjectMeta,
    pub spec: JobSpec,
}

#[derive(Debug, Clone, Serialize)]
pub struct ObjectMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub labels: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSpec {
    pub template: PodTemplateSpec,
    pub backoff_limit: i32,
    pub active_deadline_seconds: i64,
    pub ttl_seconds_after_finished: i32,
}

#[derive(Debug, Clone, Serialize)]
pub struct PodTemplateSpec {
    pub metadata: ObjectMeta,
    pub spec: PodSpec,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PodSpec {
    pub restart_policy: &'static str,
    pub containers: Vec<Container>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Container {
    pub name: &'static str,
    pub image: String,
    pub command: Vec<String>,
    pub resources: ResourceRequirements,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResourceRequirements {
    pub requests: BTreeMap<String, String>,
    pub limits: BTreeMap<String, String>,
}

/// Build a single-attempt Job running `command`.
///
/// The pod never restarts and the Job never retries, so one failed pod
/// means a failed job. The running phase is capped by the configured
/// deadline and the Job is garbage-collected after the configured TTL.
pub fn build_job(
    config: &KubeConfig,
    job_name: &str,
    command: &[String],
    resources: &ResourceLimits,
) -> Job {
    let labels = BTreeMap::from([
        ("app".to_string(), config.app_label.clone()),
        (JOB_NAME_LABEL.to_string(), job_name.to_string()),
    ]);

    let quantities = BTreeMap::from([
        ("cpu".to_string(), resources.cpu.clone()),
        ("memory".to_string(), resources.memory.clone()),
    ]);

    let container = Container {
        name: CONTAINER_NAME,
        image: config.image.clone(),
        command: command.to_vec(),
        resources: ResourceRequirements {
            requests: quantities.clone(),
            limits: quantities,
        },
    };

    Job {
        api_version: "batch/v1",
        kind: "Job",
        metadata: ObjectMeta {
            name: Some(job_name.to_string()),
            labels: labels.clone(),
        },
        spec: JobSpec {
            template: PodTemplateSpec {
                metadata: ObjectMeta { name: None, labels },
                spec: PodSpec {
                    restart_policy: "Never",
                    containers: vec![container],
                },
            },
            backoff_limit: 0,
            active_deadline_seconds: config.active_deadline_seconds,
            ttl_seconds_after_finished: config.ttl_seconds_after_finished,
        },
    }
}

// ---------------------------------------------------------------------------
// Incoming list response
// ---------------------------------------------------------------------------

/// Response body of `GET /apis/batch/v1/namespaces/{ns}/jobs`.
#[derive(Debug, Deserialize)]
pub struct JobList {
    #[serde(default)]
    pub items: Vec<JobItem>,
}

#[derive(Debug, Deserialize)]
pub struct JobItem {
    #[serde(default)]
    pub metadata: ItemMeta,
    pub status: Option<JobStatus>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ItemMeta {
    pub name: Option<String>,
}

/// Pod counters reported on a Job. Kubernetes omits zero counters.
#[derive(Debug, Default, Deserialize)]
pub struct JobStatus {
    pub active: Option<u32>,
    pub succeeded: Option<u32>,
    pub failed: Option<u32>,
}

impl JobList {
    /// Index counters by job name. Unnamed items are skipped and missing
    /// counters read as zero.
    pub fn into_counters(self) -> HashMap<String, JobCounters> {
        self.items
            .into_iter()
            .filter_map(|item| {
                let name = item.metadata.name?;
                let status = item.status.unwrap_or_default();
                let counters = JobCounters::new(
                    status.active.unwrap_or(0),
                    status.succeeded.unwrap_or(0),
                    status.failed.unwrap_or(0),
                );
                Some((name, counters))
            })
            .collect()
    }
}
