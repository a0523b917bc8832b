//! In-memory [`Database`] used by tests and local development.
//!
//! A transaction takes the table lock for its whole lifetime and works on a
//! private copy, so transactions are serialized and a rolled-back or dropped
//! transaction leaves no trace.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::db::{Database, Filter, Record, Transaction};
use crate::error::BackofficeResult;

type Tables = BTreeMap<String, Vec<Record>>;

#[derive(Debug, Default)]
struct Counters {
    next_id: AtomicI64,
    commits: AtomicUsize,
    rollbacks: AtomicUsize,
}

/// Shared in-memory tables. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct MemoryDatabase {
    tables: Arc<Mutex<Tables>>,
    counters: Arc<Counters>,
}

impl MemoryDatabase {
    /// Creates an empty database.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts rows outside any transaction, assigning ids where absent.
    pub async fn seed(&self, table: &str, rows: impl IntoIterator<Item = Record>) {
        let mut tables = self.tables.lock().await;
        let target = tables.entry(table.to_string()).or_default();
        for row in rows {
            target.push(self.counters.with_id(row));
        }
    }

    /// Committed rows of `table`.
    pub async fn rows(&self, table: &str) -> Vec<Record> {
        self.tables
            .lock()
            .await
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    /// Number of committed transactions.
    #[must_use]
    pub fn commits(&self) -> usize {
        self.counters.commits.load(Ordering::SeqCst)
    }

    /// Number of rolled-back or abandoned transactions.
    #[must_use]
    pub fn rollbacks(&self) -> usize {
        self.counters.rollbacks.load(Ordering::SeqCst)
    }
}

impl Counters {
    fn with_id(&self, mut row: Record) -> Record {
        match row.get("id").and_then(Value::as_i64) {
            Some(id) => {
                self.next_id.fetch_max(id, Ordering::SeqCst);
            }
            None => {
                let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
                row.insert("id".to_string(), Value::from(id));
            }
        }
        row
    }
}

#[async_trait]
impl Database for MemoryDatabase {
    async fn begin(&self) -> BackofficeResult<Box<dyn Transaction>> {
        let guard = Arc::clone(&self.tables).lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryTransaction {
            guard,
            working,
            counters: Arc::clone(&self.counters),
            finished: false,
        }))
    }
}

struct MemoryTransaction {
    guard: OwnedMutexGuard<Tables>,
    working: Tables,
    counters: Arc<Counters>,
    finished: bool,
}

#[async_trait]
impl Transaction for MemoryTransaction {
    async fn find_many(&mut self, table: &str, filter: &Filter) -> BackofficeResult<Vec<Record>> {
        Ok(self
            .working
            .get(table)
            .map(|rows| rows.iter().filter(|r| filter.matches(r)).cloned().collect())
            .unwrap_or_default())
    }

    async fn create(&mut self, table: &str, data: Record) -> BackofficeResult<Record> {
        let row = self.counters.with_id(data);
        self.working
            .entry(table.to_string())
            .or_default()
            .push(row.clone());
        Ok(row)
    }

    async fn update_many(&mut self, table: &str, filter: &Filter, patch: Record) -> BackofficeResult<u64> {
        let mut touched = 0;
        if let Some(rows) = self.working.get_mut(table) {
            for row in rows.iter_mut().filter(|r| filter.matches(r)) {
                row.extend(patch.clone());
                touched += 1;
            }
        }
        Ok(touched)
    }

    async fn delete_many(&mut self, table: &str, filter: &Filter) -> BackofficeResult<u64> {
        let Some(rows) = self.working.get_mut(table) else {
            return Ok(0);
        };
        let before = rows.len();
        rows.retain(|r| !filter.matches(r));
        Ok((before - rows.len()) as u64)
    }

    async fn commit(self: Box<Self>) -> BackofficeResult<()> {
        let mut this = self;
        *this.guard = std::mem::take(&mut this.working);
        this.finished = true;
        this.counters.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> BackofficeResult<()> {
        let mut this = self;
        this.finished = true;
        this.counters.rollbacks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl Drop for MemoryTransaction {
    fn drop(&mut self) {
        if !self.finished {
            self.counters.rollbacks.fetch_add(1, Ordering::SeqCst);
        }
    }
}
