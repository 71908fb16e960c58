//! In-memory fakes of the store and backend seams for engine tests.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Duration;
use scriptexec_core::execution::{ExecutionStatus, JobCounters};
use scriptexec_core::types::{ExecutionId, Timestamp};
use scriptexec_db::models::execution::{CreateExecution, Execution};
use scriptexec_kube::backend::{BackendError, JobBackend};
use scriptexec_kube::manifest::ResourceLimits;
use tokio::sync::{Notify, Semaphore};

use super::store::ExecutionStore;

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Executions held in a map, with the same write guards as the SQL store.
#[derive(Default)]
pub struct MemoryStore {
    rows: Mutex<BTreeMap<ExecutionId, Execution>>,
    pub status_batches: AtomicUsize,
    pub outcome_batches: AtomicUsize,
    pub fail_writes: AtomicBool,
}

impl MemoryStore {
    /// Seed a row directly, bypassing `create`.
    pub fn insert(
        &self,
        job_name: &str,
        status: ExecutionStatus,
        created_at: Timestamp,
    ) -> ExecutionId {
        let id = ExecutionId::now_v7();
        let row = Execution {
            id,
            status_id: status.id(),
            script: "echo hi".into(),
            requested_cpu: "500m".into(),
            requested_memory: "256Mi".into(),
            job_name: Some(job_name.to_string()),
            outcome: None,
            created_at,
            updated_at: created_at,
        };
        self.rows.lock().unwrap().insert(id, row);
        id
    }

    pub fn get(&self, id: ExecutionId) -> Execution {
        self.rows.lock().unwrap()[&id].clone()
    }

    /// `(job_name, status, outcome)` of every row, sorted by job name.
    pub fn snapshot(&self) -> Vec<(String, ExecutionStatus, Option<String>)> {
        let mut rows: Vec<_> = self
            .rows
            .lock()
            .unwrap()
            .values()
            .map(|row| {
                (
                    row.job_name.clone().unwrap_or_default(),
                    row.status().unwrap(),
                    row.outcome.clone(),
                )
            })
            .collect();
        rows.sort();
        rows
    }

    pub fn write_batches(&self) -> usize {
        self.status_batches.load(Ordering::SeqCst) + self.outcome_batches.load(Ordering::SeqCst)
    }

    fn check_writable(&self) -> Result<(), sqlx::Error> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(sqlx::Error::PoolTimedOut);
        }
        Ok(())
    }
}

#[async_trait]
impl ExecutionStore for MemoryStore {
    async fn create(
        &self,
        input: &CreateExecution,
        job_name: &str,
    ) -> Result<Execution, sqlx::Error> {
        self.check_writable()?;
        let now = chrono::Utc::now();
        let row = Execution {
            id: ExecutionId::now_v7(),
            status_id: ExecutionStatus::Queued.id(),
            script: input.script.clone(),
            requested_cpu: input.resources.cpu.clone(),
            requested_memory: input.resources.memory.clone(),
            job_name: Some(job_name.to_string()),
            outcome: None,
            created_at: now,
            updated_at: now,
        };
        self.rows.lock().unwrap().insert(row.id, row.clone());
        Ok(row)
    }

    async fn find_by_id(&self, id: ExecutionId) -> Result<Option<Execution>, sqlx::Error> {
        Ok(self.rows.lock().unwrap().get(&id).cloned())
    }

    async fn find_by_job_name(&self, job_name: &str) -> Result<Option<Execution>, sqlx::Error> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .values()
            .find(|row| row.job_name.as_deref() == Some(job_name))
            .cloned())
    }

    async fn find_active(&self) -> Result<Vec<Execution>, sqlx::Error> {
        let mut active: Vec<Execution> = self
            .rows
            .lock()
            .unwrap()
            .values()
            .filter(|row| {
                row.status_id != ExecutionStatus::Finished.id() && row.job_name.is_some()
            })
            .cloned()
            .collect();
        active.sort_by_key(|row| (row.created_at, row.id));
        Ok(active)
    }

    async fn batch_update_status(
        &self,
        updates: &BTreeMap<ExecutionId, ExecutionStatus>,
    ) -> Result<u64, sqlx::Error> {
        self.check_writable()?;
        self.status_batches.fetch_add(1, Ordering::SeqCst);
        let mut rows = self.rows.lock().unwrap();
        let mut changed = 0;
        for (id, status) in updates {
            if let Some(row) = rows.get_mut(id) {
                if row.status_id < status.id() {
                    row.status_id = status.id();
                    changed += 1;
                }
            }
        }
        Ok(changed)
    }

    async fn batch_update_outcome(
        &self,
        updates: &BTreeMap<ExecutionId, String>,
    ) -> Result<u64, sqlx::Error> {
        self.check_writable()?;
        self.outcome_batches.fetch_add(1, Ordering::SeqCst);
        let mut rows = self.rows.lock().unwrap();
        let mut changed = 0;
        for (id, outcome) in updates {
            if let Some(row) = rows.get_mut(id) {
                if row.outcome.is_none() && row.status_id == ExecutionStatus::Finished.id() {
                    row.outcome = Some(outcome.clone());
                    changed += 1;
                }
            }
        }
        Ok(changed)
    }

    async fn force_finish_by_job_name(
        &self,
        job_name: &str,
        outcome: &str,
    ) -> Result<bool, sqlx::Error> {
        self.check_writable()?;
        let mut rows = self.rows.lock().unwrap();
        let row = rows.values_mut().find(|row| {
            row.job_name.as_deref() == Some(job_name)
                && row.status_id != ExecutionStatus::Finished.id()
        });
        match row {
            Some(row) => {
                row.status_id = ExecutionStatus::Finished.id();
                row.outcome = Some(outcome.to_string());
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

// ---------------------------------------------------------------------------
// Backend
// ---------------------------------------------------------------------------

/// Backend returning canned counters and recording submissions.
#[derive(Default)]
pub struct FakeBackend {
    counters: Mutex<HashMap<String, JobCounters>>,
    pub submitted: Mutex<Vec<(String, Vec<String>, ResourceLimits)>>,
    pub selectors: Mutex<Vec<String>>,
    pub query_calls: AtomicUsize,
    pub fail_queries: AtomicBool,
    pub reject_submissions: Mutex<Option<String>>,
    gate: Option<QueryGate>,
}

/// Holds `list_counters` open until the test releases it.
pub struct QueryGate {
    pub entered: Arc<Notify>,
    pub release: Arc<Semaphore>,
}

impl FakeBackend {
    /// A backend whose queries block until `release` gets a permit.
    pub fn gated() -> (Self, Arc<Notify>, Arc<Semaphore>) {
        let entered = Arc::new(Notify::new());
        let release = Arc::new(Semaphore::new(0));
        let backend = Self {
            gate: Some(QueryGate {
                entered: Arc::clone(&entered),
                release: Arc::clone(&release),
            }),
            ..Self::default()
        };
        (backend, entered, release)
    }

    pub fn set(&self, job_name: &str, counters: JobCounters) {
        self.counters
            .lock()
            .unwrap()
            .insert(job_name.to_string(), counters);
    }

    pub fn queries(&self) -> usize {
        self.query_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl JobBackend for FakeBackend {
    async fn submit(
        &self,
        job_name: &str,
        command: &[String],
        resources: &ResourceLimits,
    ) -> Result<(), BackendError> {
        let rejection = self.reject_submissions.lock().unwrap().clone();
        if let Some(message) = rejection {
            return Err(BackendError::Submission(message));
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
        selector: &str,
    ) -> Result<HashMap<String, JobCounters>, BackendError> {
        self.query_calls.fetch_add(1, Ordering::SeqCst);
        self.selectors.lock().unwrap().push(selector.to_string());

        if let Some(gate) = &self.gate {
            gate.entered.notify_one();
            gate.release.acquire().await.unwrap().forget();
        }

        if self.fail_queries.load(Ordering::SeqCst) {
            return Err(BackendError::Query("connection refused".into()));
        }
        Ok(self.counters.lock().unwrap().clone())
    }
}

/// `base - secs`, for seeding creation times.
pub fn seconds_before(base: Timestamp, secs: i64) -> Timestamp {
    base - Duration::seconds(secs)
}
