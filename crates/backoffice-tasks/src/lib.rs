//! # Backoffice Tasks
//!
//! Daily aggregation for the POS back-office.
//!
//! This crate provides three pieces:
//!
//! 1. **Jobs**: [`TransactionDaily`], [`ProductDaily`] and [`EcDaily`]
//!    recompute fact and summary rows for one store and one day
//! 2. **Runner**: [`JobRunner`] runs every job for a [`JobKey`] in one
//!    transaction, serializes runs of the same key and records each run
//! 3. **Scheduler**: [`DailyScheduler`] fires on a cron expression and
//!    aggregates yesterday for every active store
//!
//! ## Idempotence
//!
//! Jobs replace the rows of their key rather than adding to them. Running
//! the same key twice leaves the same rows, with the same ids, as running
//! it once.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use backoffice_core::MemoryDatabase;
//! use backoffice_tasks::{DailyScheduler, JobKey, JobRunner};
//! use chrono::NaiveDate;
//!
//! #[tokio::main]
//! async fn main() {
//!     let db = Arc::new(MemoryDatabase::new());
//!     let runner = Arc::new(JobRunner::daily());
//!
//!     let day = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
//!     runner.run(db.as_ref(), JobKey::new(3, day)).await.unwrap();
//!
//!     // Every night at 00:10 UTC
//!     let scheduler = DailyScheduler::new(runner, db, "0 10 0 * * *").unwrap();
//!     scheduler.start().unwrap();
//!     // ...
//!     scheduler.stop().await;
//! }
//! ```
//!
//! ## Cron Expression Format
//!
//! Six fields, seconds first:
//!
//! ```text
//! ┌───────────── second (0 - 59)
//! │ ┌───────────── minute (0 - 59)
//! │ │ ┌───────────── hour (0 - 23)
//! │ │ │ ┌───────────── day of month (1 - 31)
//! │ │ │ │ ┌───────────── month (1 - 12)
//! │ │ │ │ │ ┌───────────── day of week (0 - 6)
//! │ │ │ │ │ │
//! * * * * * *
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod ec_daily;
mod error;
mod job;
pub mod product_daily;
mod runner;
mod scheduler;
pub mod transaction_daily;

pub use ec_daily::EcDaily;
pub use error::{TaskError, TaskResult};
pub use job::{replace_rows, AggregationJob, JobKey, JobOutput};
pub use product_daily::ProductDaily;
pub use runner::{ledger, progress_event, JobOutcome, JobRunner, RunReport, DAILY_TASK, LEDGER_TABLE};
pub use scheduler::{BatchSummary, DailyScheduler};
pub use transaction_daily::TransactionDaily;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::error::{TaskError, TaskResult};
    pub use crate::job::{AggregationJob, JobKey, JobOutput};
    pub use crate::runner::{JobRunner, RunReport};
    pub use crate::scheduler::{BatchSummary, DailyScheduler};
}
