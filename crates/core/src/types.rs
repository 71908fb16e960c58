/// Executions are keyed by UUID (v7, so ids sort by creation time).
pub type ExecutionId = uuid::Uuid;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
