//! Job runner.
//!
//! Runs every registered aggregation for a [`JobKey`], one key at a time:
//! concurrent runs of the same key wait for each other, different keys run
//! in parallel. Each run leaves a row in the `aggregation_job_run` ledger.

use std::sync::Arc;

use backoffice_core::{
    ApiEvent, BackofficeError, Database, EventPublisher, Record, TaskStatus, Transaction,
};
use backoffice_telemetry::metrics;
use dashmap::DashMap;
use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{error, info, instrument, warn};

use crate::ec_daily::EcDaily;
use crate::error::{TaskError, TaskResult};
use crate::job::{AggregationJob, JobKey, JobOutput};
use crate::product_daily::ProductDaily;
use crate::transaction_daily::TransactionDaily;

/// Ledger of aggregation runs, one row per `(store_id, target_day, job)`.
pub const LEDGER_TABLE: &str = "aggregation_job_run";

/// Task name used in progress events.
pub const DAILY_TASK: &str = "daily_calculate";

/// Result of one job for one key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobOutcome {
    /// Job name.
    pub job: &'static str,
    /// What it wrote.
    #[serde(flatten)]
    pub output: JobOutput,
}

/// Result of running every job for one key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    /// The key that ran.
    pub key: JobKey,
    /// Per-job results, in registration order.
    pub jobs: Vec<JobOutcome>,
}

/// Runs aggregation jobs by key.
pub struct JobRunner {
    jobs: Vec<Arc<dyn AggregationJob>>,
    locks: DashMap<JobKey, Arc<Mutex<()>>>,
    publisher: Option<Arc<dyn EventPublisher>>,
}

impl std::fmt::Debug for JobRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobRunner")
            .field("jobs", &self.job_names())
            .field("publisher", &self.publisher.is_some())
            .finish()
    }
}

impl Default for JobRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl JobRunner {
    /// A runner with no jobs.
    pub fn new() -> Self {
        Self {
            jobs: Vec::new(),
            locks: DashMap::new(),
            publisher: None,
        }
    }

    /// A runner with `transaction_daily`, `product_daily` and `ec_daily`.
    pub fn daily() -> Self {
        let mut runner = Self::new();
        runner.jobs.push(Arc::new(TransactionDaily));
        runner.jobs.push(Arc::new(ProductDaily));
        runner.jobs.push(Arc::new(EcDaily));
        runner
    }

    /// Registers a job. Names must be unique.
    pub fn register(&mut self, job: impl AggregationJob) -> TaskResult<()> {
        if self.jobs.iter().any(|j| j.name() == job.name()) {
            return Err(TaskError::DuplicateJob(job.name().to_string()));
        }
        self.jobs.push(Arc::new(job));
        Ok(())
    }

    /// Publishes progress of [`run`](Self::run) through `publisher`.
    #[must_use]
    pub fn with_publisher(mut self, publisher: Arc<dyn EventPublisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    /// Registered job names, in run order.
    pub fn job_names(&self) -> Vec<&'static str> {
        self.jobs.iter().map(|j| j.name()).collect()
    }

    /// Runs every job for `key` inside a caller-owned transaction.
    ///
    /// Nothing is published; the caller commits and reports. The first
    /// failing job aborts the run and the caller must roll back.
    pub async fn run_in(&self, tx: &mut dyn Transaction, key: JobKey) -> TaskResult<RunReport> {
        let _guard = self.lock_key(key).await;
        self.execute(tx, key).await
    }

    /// Runs every job for `key` in its own transaction.
    ///
    /// The transaction is opened before the key lock is taken, matching
    /// [`run_in`](Self::run_in) callers. On failure the transaction is rolled
    /// back and the ledger records the failing job in a separate transaction
    /// after the key lock is released.
    #[instrument(skip(self, database), fields(store_id = key.store_id, target_day = %key.target_day))]
    pub async fn run(&self, database: &dyn Database, key: JobKey) -> TaskResult<RunReport> {
        self.progress(key, TaskStatus::Running, Value::Null);
        let mut tx = database.begin().await?;

        let result = {
            let _guard = self.lock_key(key).await;
            match self.execute(tx.as_mut(), key).await {
                Ok(report) => tx.commit().await.map(|()| report).map_err(TaskError::from),
                Err(err) => {
                    if let Err(e) = tx.rollback().await {
                        warn!(error = %e, "rollback failed");
                    }
                    Err(err)
                }
            }
        };

        match result {
            Ok(report) => {
                info!(jobs = report.jobs.len(), "daily aggregation committed");
                self.progress(key, TaskStatus::Succeeded, json!({ "jobs": &report.jobs }));
                Ok(report)
            }
            Err(err) => {
                error!(error = %err, "daily aggregation failed");
                if let TaskError::Job { job, .. } = &err {
                    if let Err(e) = self.record_failure(database, key, job).await {
                        warn!(error = %e, "could not record failed run");
                    }
                }
                self.progress(key, TaskStatus::Failed, json!({ "error": err.to_string() }));
                Err(err)
            }
        }
    }

    async fn execute(&self, tx: &mut dyn Transaction, key: JobKey) -> TaskResult<RunReport> {
        let mut outcomes = Vec::with_capacity(self.jobs.len());
        for job in &self.jobs {
            let output = match job.compute(tx, &key).await {
                Ok(output) => output,
                Err(source) => {
                    metrics::record_job_run(job.name(), TaskStatus::Failed.as_str());
                    return Err(TaskError::job(job.name(), key, source));
                }
            };
            record_ledger(tx, key, job.name(), TaskStatus::Succeeded, output.rows).await?;
            metrics::record_job_run(job.name(), TaskStatus::Succeeded.as_str());
            info!(job = job.name(), key = %key, rows = output.rows, removed = output.removed, "job finished");
            outcomes.push(JobOutcome {
                job: job.name(),
                output,
            });
        }
        Ok(RunReport { key, jobs: outcomes })
    }

    async fn record_failure(&self, database: &dyn Database, key: JobKey, job: &str) -> TaskResult<()> {
        let mut tx = database.begin().await?;
        record_ledger(tx.as_mut(), key, job, TaskStatus::Failed, 0).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Waits for exclusive use of `key`.
    async fn lock_key(&self, key: JobKey) -> KeyGuard<'_> {
        let mut guard = KeyGuard {
            locks: &self.locks,
            key,
            held: None,
        };
        let lock = Arc::clone(self.locks.entry(key).or_default().value());
        guard.held = Some(lock.lock_owned().await);
        guard
    }

    /// Keys with a run in progress or waiting.
    pub fn locked_keys(&self) -> usize {
        self.locks.len()
    }

    fn progress(&self, key: JobKey, status: TaskStatus, detail: Value) {
        if let Some(publisher) = &self.publisher {
            publisher.publish(progress_event(key, status, detail));
        }
    }
}

/// Exclusive use of one key. Dropping it forgets the key's lock once no
/// other run holds or awaits it.
struct KeyGuard<'a> {
    locks: &'a DashMap<JobKey, Arc<Mutex<()>>>,
    key: JobKey,
    held: Option<OwnedMutexGuard<()>>,
}

impl Drop for KeyGuard<'_> {
    fn drop(&mut self) {
        drop(self.held.take());
        self.locks.remove_if(&self.key, |_, lock| Arc::strong_count(lock) == 1);
    }
}

/// A `TaskProgress` event for the daily calculation of `key`.
pub fn progress_event(key: JobKey, status: TaskStatus, detail: Value) -> ApiEvent {
    ApiEvent::TaskProgress {
        store_id: key.store_id,
        task: DAILY_TASK.to_string(),
        target_day: Some(key.day_string()),
        status,
        detail,
    }
}

async fn record_ledger(
    tx: &mut dyn Transaction,
    key: JobKey,
    job: &str,
    status: TaskStatus,
    rows: usize,
) -> Result<Record, BackofficeError> {
    let mut row = Record::new();
    row.insert("status".to_string(), Value::from(status.as_str()));
    row.insert("rows".to_string(), Value::from(rows));
    tx.upsert(LEDGER_TABLE, &key.scope().eq("job", job), row.clone(), row)
        .await
}

/// Ledger rows of `key`.
pub async fn ledger(tx: &mut dyn Transaction, key: JobKey) -> Result<Vec<Record>, BackofficeError> {
    tx.find_many(LEDGER_TABLE, &key.scope()).await
}
