//! The ORM collaborator.
//!
//! The runtime only needs a transaction-scoped handle with find/create/update/
//! upsert/delete over JSON records. Schema ownership lives elsewhere; rows are
//! plain [`Record`]s and tables are named by string.
//!
//! A [`Transaction`] is consumed by [`Transaction::commit`] or
//! [`Transaction::rollback`], so it cannot be finished twice. Dropping one
//! without finishing it rolls it back.

use std::cmp::Ordering;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::{BackofficeError, BackofficeResult};

/// One row.
pub type Record = Map<String, Value>;

/// A single predicate on a field.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// `field == value`
    Eq(String, Value),
    /// `field >= value`
    Gte(String, Value),
    /// `field < value`
    Lt(String, Value),
    /// `field IN values`
    In(String, Vec<Value>),
}

/// Conjunction of conditions. An empty filter matches every row.
///
/// # Example
///
/// ```
/// use backoffice_core::db::Filter;
/// use serde_json::json;
///
/// let filter = Filter::new()
///     .eq("store_id", 3)
///     .gte("finished_at", "2024-03-01T00:00:00.000Z")
///     .lt("finished_at", "2024-03-02T00:00:00.000Z");
///
/// let row = json!({ "store_id": 3, "finished_at": "2024-03-01T12:30:00.000Z" });
/// assert!(filter.matches(row.as_object().unwrap()));
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: Vec<Condition>,
}

impl Filter {
    /// An empty filter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `field == value`.
    #[must_use]
    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.push(Condition::Eq(field.into(), value.into()));
        self
    }

    /// Adds `field >= value`.
    #[must_use]
    pub fn gte(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.push(Condition::Gte(field.into(), value.into()));
        self
    }

    /// Adds `field < value`.
    #[must_use]
    pub fn lt(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.push(Condition::Lt(field.into(), value.into()));
        self
    }

    /// Adds `field IN values`.
    #[must_use]
    pub fn is_in<V: Into<Value>>(
        mut self,
        field: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        self.conditions.push(Condition::In(
            field.into(),
            values.into_iter().map(Into::into).collect(),
        ));
        self
    }

    /// Returns the conditions.
    #[must_use]
    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    /// Equality conditions as a record, used to seed upserted rows.
    #[must_use]
    pub fn equalities(&self) -> Record {
        self.conditions
            .iter()
            .filter_map(|c| match c {
                Condition::Eq(field, value) => Some((field.clone(), value.clone())),
                _ => None,
            })
            .collect()
    }

    /// Evaluates the filter against a row.
    #[must_use]
    pub fn matches(&self, record: &Record) -> bool {
        self.conditions.iter().all(|condition| match condition {
            Condition::Eq(field, value) => {
                record.get(field).map_or(value.is_null(), |v| loose_eq(v, value))
            }
            Condition::Gte(field, value) => record
                .get(field)
                .and_then(|v| compare(v, value))
                .is_some_and(|o| o != Ordering::Less),
            Condition::Lt(field, value) => record
                .get(field)
                .and_then(|v| compare(v, value))
                .is_some_and(|o| o == Ordering::Less),
            Condition::In(field, values) => record
                .get(field)
                .is_some_and(|v| values.iter().any(|candidate| loose_eq(v, candidate))),
        })
    }
}

fn loose_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(_), Value::Number(_)) => compare(a, b) == Some(Ordering::Equal),
        _ => a == b,
    }
}

/// Orders numbers numerically and strings lexically; other pairs are unordered.
fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => Some(x.cmp(&y)),
            _ => x.as_f64()?.partial_cmp(&y.as_f64()?),
        },
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// A transaction-scoped handle.
#[async_trait]
pub trait Transaction: Send {
    /// Rows of `table` matching `filter`, in insertion order.
    async fn find_many(&mut self, table: &str, filter: &Filter) -> BackofficeResult<Vec<Record>>;

    /// First matching row.
    async fn find_first(&mut self, table: &str, filter: &Filter) -> BackofficeResult<Option<Record>> {
        Ok(self.find_many(table, filter).await?.into_iter().next())
    }

    /// Inserts a row, assigning an integer `id` if absent. Returns the stored row.
    async fn create(&mut self, table: &str, data: Record) -> BackofficeResult<Record>;

    /// Merges `patch` into every matching row. Returns the number of rows touched.
    async fn update_many(&mut self, table: &str, filter: &Filter, patch: Record) -> BackofficeResult<u64>;

    /// Updates the single row matching `key` or creates one.
    ///
    /// The created row is `create` plus the equality conditions of `key`.
    /// More than one match is a [`BackofficeError::Conflict`].
    async fn upsert(
        &mut self,
        table: &str,
        key: &Filter,
        create: Record,
        update: Record,
    ) -> BackofficeResult<Record> {
        let existing = self.find_many(table, key).await?;
        match existing.len() {
            0 => {
                let mut row = key.equalities();
                row.extend(create);
                self.create(table, row).await
            }
            1 => {
                self.update_many(table, key, update.clone()).await?;
                let mut row = existing.into_iter().next().unwrap_or_default();
                row.extend(update);
                Ok(row)
            }
            n => Err(BackofficeError::conflict(format!(
                "upsert key on '{table}' matched {n} rows"
            ))),
        }
    }

    /// Deletes matching rows. Returns the number removed.
    async fn delete_many(&mut self, table: &str, filter: &Filter) -> BackofficeResult<u64>;

    /// Makes every write visible.
    async fn commit(self: Box<Self>) -> BackofficeResult<()>;

    /// Discards every write.
    async fn rollback(self: Box<Self>) -> BackofficeResult<()>;
}

impl std::fmt::Debug for dyn Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Transaction")
    }
}

/// Source of transactions.
#[async_trait]
pub trait Database: Send + Sync {
    /// Opens a transaction.
    async fn begin(&self) -> BackofficeResult<Box<dyn Transaction>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(v: Value) -> Record {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn test_filter_conditions() {
        let r = row(json!({ "id": 4, "store_id": 3, "kind": "SELL", "total": 1200.0 }));

        assert!(Filter::new().matches(&r));
        assert!(Filter::new().eq("store_id", 3).eq("kind", "SELL").matches(&r));
        assert!(!Filter::new().eq("store_id", 4).matches(&r));
        assert!(Filter::new().eq("total", 1200).matches(&r));
        assert!(Filter::new().gte("total", 1200).lt("total", 1201).matches(&r));
        assert!(!Filter::new().lt("total", 1200).matches(&r));
        assert!(Filter::new().is_in("kind", ["SELL", "BUY"]).matches(&r));
        assert!(!Filter::new().is_in("id", [1, 2]).matches(&r));
    }

    #[test]
    fn test_eq_null_matches_missing_field() {
        let r = row(json!({ "id": 1 }));
        assert!(Filter::new().eq("deleted_at", Value::Null).matches(&r));
        assert!(!Filter::new().gte("deleted_at", "2024").matches(&r));
    }

    #[test]
    fn test_equalities() {
        let f = Filter::new().eq("store_id", 1).gte("day", "x").eq("product_id", 9);
        assert_eq!(Value::Object(f.equalities()), json!({ "store_id": 1, "product_id": 9 }));
    }
}
