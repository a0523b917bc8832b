//! The aggregation job abstraction.
//!
//! A job recomputes derived rows for one [`JobKey`] from source rows. Jobs
//! never accumulate: they write the full result for the key and remove rows
//! the recomputation no longer produces, so running a key twice leaves the
//! same state as running it once.

use std::collections::HashSet;
use std::fmt;

use async_trait::async_trait;
use backoffice_core::{BackofficeResult, Filter, Record, Transaction};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Idempotency key of an aggregation: one store, one calendar day (UTC).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobKey {
    /// Store the rows belong to.
    pub store_id: i64,
    /// Day being aggregated.
    pub target_day: NaiveDate,
}

impl JobKey {
    /// Creates a key.
    pub const fn new(store_id: i64, target_day: NaiveDate) -> Self {
        Self {
            store_id,
            target_day,
        }
    }

    /// The key for the day before `now`.
    pub fn yesterday(store_id: i64, now: DateTime<Utc>) -> Self {
        let today = now.date_naive();
        Self::new(store_id, today.pred_opt().unwrap_or(today))
    }

    /// `target_day` as stored in aggregate rows (`YYYY-MM-DD`).
    pub fn day_string(&self) -> String {
        self.target_day.format("%Y-%m-%d").to_string()
    }

    /// Whether `instant` falls on `target_day`.
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant.date_naive() == self.target_day
    }

    /// Filter selecting every aggregate row of this key.
    pub fn scope(&self) -> Filter {
        Filter::new()
            .eq("store_id", self.store_id)
            .eq("target_day", self.day_string())
    }

    /// Base record carrying the key columns.
    pub fn record(&self) -> Record {
        let mut row = Record::new();
        row.insert("store_id".to_string(), Value::from(self.store_id));
        row.insert("target_day".to_string(), Value::from(self.day_string()));
        row
    }
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "store {} @ {}", self.store_id, self.target_day)
    }
}

/// What a job wrote.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobOutput {
    /// Rows written or refreshed.
    pub rows: usize,
    /// Rows removed because the recomputation no longer produces them.
    pub removed: usize,
}

impl JobOutput {
    /// Adds another table's counts.
    #[must_use]
    pub const fn merge(self, other: Self) -> Self {
        Self {
            rows: self.rows + other.rows,
            removed: self.removed + other.removed,
        }
    }
}

/// A daily aggregation over one store.
#[async_trait]
pub trait AggregationJob: Send + Sync + 'static {
    /// Stable job name, used in logs, metrics and the run ledger.
    fn name(&self) -> &'static str;

    /// Recomputes every row of `key` inside `tx`.
    async fn compute(&self, tx: &mut dyn Transaction, key: &JobKey) -> BackofficeResult<JobOutput>;
}

/// Replaces the rows of `table` under `scope`.
///
/// Each row is upserted on `scope` plus its `sub_key` columns, which keeps
/// ids stable across reruns; rows under `scope` that are not in `rows` are
/// deleted afterwards.
pub async fn replace_rows(
    tx: &mut dyn Transaction,
    table: &str,
    scope: &Filter,
    sub_key: &[&str],
    rows: Vec<Record>,
) -> BackofficeResult<JobOutput> {
    let mut kept = HashSet::with_capacity(rows.len());
    let written = rows.len();

    for row in rows {
        let mut key = scope.clone();
        for field in sub_key {
            key = key.eq(*field, row.get(*field).cloned().unwrap_or(Value::Null));
        }
        let stored = tx.upsert(table, &key, row.clone(), row).await?;
        if let Some(id) = stored.get("id") {
            kept.insert(id.to_string());
        }
    }

    let stale: Vec<Value> = tx
        .find_many(table, scope)
        .await?
        .into_iter()
        .filter_map(|row| row.get("id").cloned())
        .filter(|id| !kept.contains(&id.to_string()))
        .collect();
    let removed = if stale.is_empty() {
        0
    } else {
        tx.delete_many(table, &scope.clone().is_in("id", stale)).await?
    };

    Ok(JobOutput {
        rows: written,
        removed: usize::try_from(removed).unwrap_or(usize::MAX),
    })
}

/// Integer column, 0 when absent. Fractional values are truncated.
pub(crate) fn int(row: &Record, field: &str) -> i64 {
    row.get(field).map_or(0, |v| {
        v.as_i64()
            .or_else(|| v.as_f64().map(|f| f as i64))
            .unwrap_or(0)
    })
}

/// Boolean column, false when absent.
pub(crate) fn flag(row: &Record, field: &str) -> bool {
    row.get(field).and_then(Value::as_bool).unwrap_or(false)
}

/// RFC 3339 timestamp column.
pub(crate) fn timestamp(row: &Record, field: &str) -> Option<DateTime<Utc>> {
    row.get(field)
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc))
}
