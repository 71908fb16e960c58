//! Execution entity model and create DTO.

use scriptexec_core::error::CoreError;
use scriptexec_core::execution::{ExecutionStatus, StatusId};
use scriptexec_core::types::{ExecutionId, Timestamp};
use scriptexec_core::validation::{CPU_PATTERN, DEFAULT_CPU, DEFAULT_MEMORY, MEMORY_PATTERN};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// A row from the `executions` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Execution {
    pub id: ExecutionId,
    pub status_id: StatusId,
    pub script: String,
    pub requested_cpu: String,
    pub requested_memory: String,
    pub job_name: Option<String>,
    pub outcome: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Execution {
    /// Decode the stored status ID.
    pub fn status(&self) -> Result<ExecutionStatus, CoreError> {
        ExecutionStatus::from_id(self.status_id)
    }
}

/// Resource request for a script run. Both fields default when omitted.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ExecutionResources {
    #[serde(default = "default_cpu")]
    #[validate(regex(path = *CPU_PATTERN, message = "cpu must be like '500m' or '1' or '1.5'"))]
    pub cpu: String,
    #[serde(default = "default_memory")]
    #[validate(regex(path = *MEMORY_PATTERN, message = "memory must be like '256Mi' or '1Gi'"))]
    pub memory: String,
}

impl Default for ExecutionResources {
    fn default() -> Self {
        Self {
            cpu: default_cpu(),
            memory: default_memory(),
        }
    }
}

fn default_cpu() -> String {
    DEFAULT_CPU.to_string()
}

fn default_memory() -> String {
    DEFAULT_MEMORY.to_string()
}

/// DTO for `POST /api/v1/executions`.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateExecution {
    #[validate(length(min = 1, message = "script must not be blank"))]
    pub script: String,
    #[serde(default)]
    #[validate(nested)]
    pub resources: ExecutionResources,
}

/// Flatten `validator` errors into one human-readable line.
///
/// Field order is sorted so the message is stable across runs.
pub fn describe_validation_errors(errors: &validator::ValidationErrors) -> String {
    let mut messages: Vec<String> = Vec::new();
    collect_messages(errors, &mut messages);
    messages.sort();
    if messages.is_empty() {
        "invalid request".to_string()
    } else {
        messages.join("; ")
    }
}

fn collect_messages(errors: &validator::ValidationErrors, out: &mut Vec<String>) {
    for (field, kind) in errors.errors() {
        match kind {
            validator::ValidationErrorsKind::Field(list) => {
                for err in list {
                    match &err.message {
                        Some(msg) => out.push(msg.to_string()),
                        None => out.push(format!("{field} is invalid")),
                    }
                }
            }
            validator::ValidationErrorsKind::Struct(nested) => collect_messages(nested, out),
            validator::ValidationErrorsKind::List(items) => {
                for nested in items.values() {
                    collect_messages(nested, out);
                }
            }
        }
    }
}
