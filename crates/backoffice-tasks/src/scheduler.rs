//! Cron-driven daily aggregation.
//!
//! On every cron fire the scheduler aggregates *yesterday* for every active
//! store, one store at a time. A failing store is logged and counted; the
//! remaining stores still run.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use backoffice_core::{Database, Filter, STORE_TABLE};
use chrono::{DateTime, NaiveDate, Utc};
use cron::Schedule;
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::{TaskError, TaskResult};
use crate::job::{int, JobKey};
use crate::runner::JobRunner;

/// Outcome of one scheduled day.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    /// Day that was aggregated.
    pub target_day: Option<NaiveDate>,
    /// Stores that committed.
    pub succeeded: Vec<i64>,
    /// Stores whose run failed and was rolled back.
    pub failed: Vec<i64>,
}

struct Inner {
    runner: Arc<JobRunner>,
    database: Arc<dyn Database>,
    schedule: Schedule,
    cron: String,
    tick_interval: Duration,
}

impl Inner {
    async fn run_for_day(&self, day: NaiveDate) -> TaskResult<BatchSummary> {
        let stores = {
            let mut tx = self.database.begin().await?;
            let rows = tx
                .find_many(STORE_TABLE, &Filter::new().eq("is_active", true))
                .await?;
            tx.rollback().await?;
            rows
        };

        let mut summary = BatchSummary {
            target_day: Some(day),
            ..BatchSummary::default()
        };
        for store in &stores {
            let store_id = int(store, "id");
            match self.runner.run(self.database.as_ref(), JobKey::new(store_id, day)).await {
                Ok(_) => summary.succeeded.push(store_id),
                Err(err) => {
                    warn!(store_id, error = %err, retry = err.should_retry(), "store aggregation failed");
                    summary.failed.push(store_id);
                }
            }
        }

        info!(
            target_day = %day,
            succeeded = summary.succeeded.len(),
            failed = summary.failed.len(),
            "daily aggregation batch finished"
        );
        Ok(summary)
    }
}

/// Runs the daily aggregation on a cron schedule.
pub struct DailyScheduler {
    inner: Arc<Inner>,
    /// Whether the loop is running.
    running: AtomicBool,
    /// Shutdown signal sender.
    shutdown_tx: RwLock<Option<mpsc::Sender<()>>>,
    /// Scheduler loop handle.
    loop_handle: RwLock<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for DailyScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DailyScheduler")
            .field("cron", &self.inner.cron)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

impl DailyScheduler {
    /// Creates a scheduler firing on `cron_expr` (six fields, seconds first).
    pub fn new(
        runner: Arc<JobRunner>,
        database: Arc<dyn Database>,
        cron_expr: &str,
    ) -> TaskResult<Self> {
        let schedule: Schedule = cron_expr
            .parse()
            .map_err(|e: cron::error::Error| TaskError::invalid_cron(e.to_string()))?;

        Ok(Self {
            inner: Arc::new(Inner {
                runner,
                database,
                schedule,
                cron: cron_expr.to_string(),
                tick_interval: Duration::from_secs(1),
            }),
            running: AtomicBool::new(false),
            shutdown_tx: RwLock::new(None),
            loop_handle: RwLock::new(None),
        })
    }

    /// The cron expression.
    pub fn cron(&self) -> &str {
        &self.inner.cron
    }

    /// Check if the loop is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// The first fire time strictly after `after`.
    pub fn next_run_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.inner.schedule.after(&after).next()
    }

    /// Aggregates `day` for every active store.
    ///
    /// Only listing the stores can fail; per-store failures land in
    /// [`BatchSummary::failed`].
    pub async fn run_for_day(&self, day: NaiveDate) -> TaskResult<BatchSummary> {
        self.inner.run_for_day(day).await
    }

    /// Starts the loop on the current runtime.
    pub fn start(&self) -> TaskResult<()> {
        if self.running.swap(true, Ordering::AcqRel) {
            return Err(TaskError::invalid_config("scheduler already running"));
        }

        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        *self.shutdown_tx.write() = Some(shutdown_tx);

        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(inner.tick_interval);
            let mut next_run = inner.schedule.upcoming(Utc).next();
            debug!(next_run = ?next_run, "scheduler armed");

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let now = Utc::now();
                        if !next_run.is_some_and(|next| next <= now) {
                            continue;
                        }
                        let day = JobKey::yesterday(0, now).target_day;
                        if let Err(e) = inner.run_for_day(day).await {
                            error!(target_day = %day, error = %e, "could not start daily aggregation");
                        }
                        next_run = inner.schedule.after(&now).next();
                        debug!(next_run = ?next_run, "scheduler re-armed");
                    }
                    _ = shutdown_rx.recv() => {
                        info!("scheduler received shutdown signal");
                        break;
                    }
                }
            }
        });

        *self.loop_handle.write() = Some(handle);
        info!(cron = %self.inner.cron, "scheduler started");
        Ok(())
    }

    /// Stops the loop, letting a batch in progress finish.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::AcqRel) {
            return;
        }

        let tx = self.shutdown_tx.write().take();
        if let Some(tx) = tx {
            let _ = tx.send(()).await;
        }

        let handle = self.loop_handle.write().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }

        info!("scheduler stopped");
    }
}

impl Drop for DailyScheduler {
    fn drop(&mut self) {
        if self.running.load(Ordering::Acquire) {
            if let Some(tx) = self.shutdown_tx.write().take() {
                let _ = tx.try_send(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use backoffice_core::{BackofficeError, BackofficeResult, MemoryDatabase, Record, Transaction};
    use serde_json::json;

    use crate::job::{AggregationJob, JobOutput};

    /// Fails for one store.
    struct FailFor(i64);

    #[async_trait]
    impl AggregationJob for FailFor {
        fn name(&self) -> &'static str {
            "fail_for"
        }

        async fn compute(&self, _tx: &mut dyn Transaction, key: &JobKey) -> BackofficeResult<JobOutput> {
            if key.store_id == self.0 {
                Err(BackofficeError::unknown("broken store"))
            } else {
                Ok(JobOutput::default())
            }
        }
    }

    fn store(id: i64, active: bool) -> Record {
        json!({ "id": id, "corporation_id": 1, "is_active": active })
            .as_object()
            .cloned()
            .unwrap()
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
    }

    #[tokio::test]
    async fn test_invalid_cron() {
        let db = Arc::new(MemoryDatabase::new());
        let err = DailyScheduler::new(Arc::new(JobRunner::daily()), db, "not a cron").unwrap_err();
        assert!(matches!(err, TaskError::InvalidCron(_)));
    }

    #[tokio::test]
    async fn test_next_run_after() {
        let db = Arc::new(MemoryDatabase::new());
        let scheduler = DailyScheduler::new(Arc::new(JobRunner::daily()), db, "0 10 0 * * *").unwrap();
        let now = DateTime::parse_from_rfc3339("2024-03-01T12:00:00Z").unwrap().with_timezone(&Utc);
        let next = scheduler.next_run_after(now).unwrap();
        assert_eq!(next.to_rfc3339(), "2024-03-02T00:10:00+00:00");
    }

    #[tokio::test]
    async fn test_run_for_day_covers_active_stores() {
        let db = MemoryDatabase::new();
        db.seed(STORE_TABLE, [store(1, true), store(2, false), store(3, true)]).await;
        let scheduler =
            DailyScheduler::new(Arc::new(JobRunner::daily()), Arc::new(db.clone()), "0 10 0 * * *").unwrap();

        let summary = scheduler.run_for_day(day()).await.unwrap();
        assert_eq!(summary.succeeded, vec![1, 3]);
        assert!(summary.failed.is_empty());

        let stores: Vec<i64> = db
            .rows("summary_daily_product")
            .await
            .iter()
            .filter_map(|r| r["store_id"].as_i64())
            .collect();
        assert_eq!(stores, vec![1, 3]);
    }

    #[tokio::test]
    async fn test_one_failing_store_does_not_stop_the_batch() {
        let db = MemoryDatabase::new();
        db.seed(STORE_TABLE, [store(1, true), store(2, true), store(3, true)]).await;
        let mut runner = JobRunner::new();
        runner.register(FailFor(2)).unwrap();
        let scheduler = DailyScheduler::new(Arc::new(runner), Arc::new(db.clone()), "0 10 0 * * *").unwrap();

        let summary = scheduler.run_for_day(day()).await.unwrap();
        assert_eq!(summary.succeeded, vec![1, 3]);
        assert_eq!(summary.failed, vec![2]);
    }

    #[tokio::test]
    async fn test_start_and_stop() {
        let db = Arc::new(MemoryDatabase::new());
        let scheduler = DailyScheduler::new(Arc::new(JobRunner::daily()), db, "0 10 0 * * *").unwrap();

        scheduler.start().unwrap();
        assert!(scheduler.is_running());
        assert!(matches!(scheduler.start(), Err(TaskError::InvalidConfig(_))));

        scheduler.stop().await;
        assert!(!scheduler.is_running());

        // Stopping twice is a no-op.
        scheduler.stop().await;
    }
}
